mod common;

use anyhow::Result as AnyResult;
use common::{
    AUDITED, CREATED, RENAMED, audit_pipeline, contract, event, plain_pipeline, types_of,
    versions_of,
};
use evstore_domain::domain_event::AggregateId;
use evstore_domain::error::DomainError;
use evstore_domain::migration::MigrationPipeline;
use evstore_domain::persist::{EventStore, SqliteEventStore, SqliteStoreConfig, same_history};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

async fn store_with(pipeline: MigrationPipeline) -> AnyResult<SqliteEventStore> {
    let config = SqliteStoreConfig::builder().build();
    Ok(SqliteEventStore::connect(config, pipeline).await?)
}

async fn store() -> AnyResult<SqliteEventStore> {
    store_with(plain_pipeline()).await
}

fn database_url(dir: &TempDir) -> String {
    format!("sqlite://{}", dir.path().join("events.db").display())
}

/// 临时文件数据库，多个连接并发写入；`dir` 须在测试期间存活
async fn file_store(dir: &TempDir, connections: u32) -> AnyResult<SqliteEventStore> {
    let config = SqliteStoreConfig::builder()
        .database_url(database_url(dir))
        .max_connections(connections)
        .build();
    Ok(SqliteEventStore::connect(config, plain_pipeline()).await?)
}

#[tokio::test]
async fn saves_and_reads_history() -> AnyResult<()> {
    contract::saves_and_reads_history(&store().await?).await
}

#[tokio::test]
async fn insertion_orders_follow_call_order() -> AnyResult<()> {
    contract::insertion_orders_follow_call_order(&store().await?).await
}

#[tokio::test]
async fn rejects_stale_versions() -> AnyResult<()> {
    contract::rejects_stale_versions(&store().await?).await
}

#[tokio::test]
async fn rejects_duplicate_event_ids() -> AnyResult<()> {
    contract::rejects_duplicate_event_ids(&store().await?).await
}

#[tokio::test]
async fn batches_are_atomic() -> AnyResult<()> {
    contract::batches_are_atomic(&store().await?).await
}

#[tokio::test]
async fn streams_in_batches() -> AnyResult<()> {
    contract::streams_in_batches(&store().await?).await
}

#[tokio::test]
async fn lists_aggregates_in_creation_order() -> AnyResult<()> {
    contract::lists_aggregates_in_creation_order(&store().await?).await
}

#[tokio::test]
async fn deletes_one_aggregate() -> AnyResult<()> {
    contract::deletes_one_aggregate(&store().await?).await
}

#[tokio::test]
async fn persisted_migrations_are_transparent() -> AnyResult<()> {
    contract::persisted_migrations_are_transparent(&store_with(audit_pipeline()).await?).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_writers_have_one_winner() -> AnyResult<()> {
    let dir = TempDir::new()?;
    contract::racing_writers_have_one_winner(Arc::new(file_store(&dir, 8).await?)).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_get_distinct_orders() -> AnyResult<()> {
    let dir = TempDir::new()?;
    contract::concurrent_writers_get_distinct_orders(Arc::new(file_store(&dir, 8).await?)).await
}

/// 写事务在开始时即取得写锁：短 busy_timeout 下第二个写者等不到锁而失败，
/// 先开始的事务不受影响
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn write_transactions_take_the_lock_up_front() -> AnyResult<()> {
    let dir = TempDir::new()?;
    let config = SqliteStoreConfig::builder()
        .database_url(database_url(&dir))
        .max_connections(2)
        .busy_timeout(Duration::from_millis(50))
        .build();
    let store = SqliteEventStore::connect(config, plain_pipeline()).await?;

    let id = AggregateId::random();
    let mut holder = store.begin_write().await?;
    store
        .save_events_in(&mut holder, vec![event(id, 1, CREATED)])
        .await?;

    assert!(store.begin_write().await.is_err());

    holder.commit().await?;
    assert_eq!(versions_of(&store.get_aggregate_history(id).await?), vec![1]);
    Ok(())
}

#[tokio::test]
async fn caller_transaction_spans_several_aggregates() -> AnyResult<()> {
    let store = store_with(audit_pipeline()).await?;
    let first = AggregateId::random();
    let second = AggregateId::random();

    let mut tx = store.begin_write().await?;
    store
        .save_events_in(&mut tx, vec![event(first, 1, CREATED)])
        .await?;
    let committed = store
        .save_events_in(&mut tx, vec![event(first, 2, RENAMED), event(second, 1, CREATED)])
        .await?;
    assert_eq!(committed.get(first).map(|v| v.value()), Some(3));
    assert_eq!(committed.get(second).map(|v| v.value()), Some(1));
    // 事务内可读到尚未提交的写入
    assert_eq!(
        types_of(&store.get_aggregate_history_in(&mut tx, first).await?),
        vec![CREATED, AUDITED, RENAMED]
    );
    tx.rollback().await?;

    assert!(store.get_aggregate_history(first).await?.is_empty());
    assert!(store.get_aggregate_history(second).await?.is_empty());

    let mut tx = store.begin_write().await?;
    store
        .save_events_in(&mut tx, vec![event(first, 1, CREATED), event(second, 1, CREATED)])
        .await?;
    // 冲突只让本次调用失败，事务由调用方提交
    let err = store
        .save_events_in(&mut tx, vec![event(second, 1, RENAMED)])
        .await
        .unwrap_err();
    assert!(err.is_concurrency_conflict());
    tx.commit().await?;

    assert_eq!(store.get_aggregate_history(first).await?.len(), 1);
    assert_eq!(store.get_aggregate_history(second).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn saves_on_a_plain_connection() -> AnyResult<()> {
    let store = store().await?;
    let id = AggregateId::random();
    {
        let mut conn = store.pool().acquire().await?;
        let committed = store
            .save_events_on(&mut conn, vec![event(id, 1, CREATED), event(id, 2, RENAMED)])
            .await?;
        assert_eq!(committed.get(id).map(|v| v.value()), Some(2));

        let err = store
            .save_events_on(&mut conn, vec![event(id, 2, RENAMED)])
            .await
            .unwrap_err();
        assert!(err.is_concurrency_conflict());
    }
    assert_eq!(versions_of(&store.get_aggregate_history(id).await?), vec![1, 2]);
    Ok(())
}

#[tokio::test]
async fn migrations_persist_inside_caller_transaction() -> AnyResult<()> {
    let store = store_with(audit_pipeline()).await?;
    let id = AggregateId::random();
    store
        .save_events(vec![event(id, 1, CREATED), event(id, 2, RENAMED)])
        .await?;

    let mut tx = store.begin_write().await?;
    let report = store.persist_migrations_in(&mut tx).await?;
    assert_eq!(report.aggregates_rewritten, 1);
    tx.rollback().await?;

    let raw = store.get_raw_aggregate_history(id).await?;
    assert_eq!(types_of(&raw), vec![CREATED, RENAMED]);
    Ok(())
}

#[tokio::test]
async fn in_memory_database_requires_single_connection() {
    let config = SqliteStoreConfig::builder().max_connections(4).build();
    let err = SqliteEventStore::connect(config, plain_pipeline())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidConfiguration { .. }));
}

/// 另一进程（不同迁移配置）共享同一数据库：持久化前后读取结果一致
#[tokio::test]
async fn persisted_migrations_are_visible_to_other_readers() -> AnyResult<()> {
    let writer = store().await?;
    let migrating = SqliteEventStore::new(writer.pool().clone(), audit_pipeline());

    let id = AggregateId::random();
    writer
        .save_events(vec![event(id, 1, CREATED), event(id, 2, RENAMED)])
        .await?;

    assert_eq!(
        types_of(&writer.get_aggregate_history(id).await?),
        vec![CREATED, RENAMED]
    );
    let migrated = migrating.get_aggregate_history(id).await?;
    assert_eq!(types_of(&migrated), vec![CREATED, AUDITED, RENAMED]);

    let report = migrating.persist_migrations().await?;
    assert_eq!(report.aggregates_rewritten, 1);

    // 未配置迁移的读者直接看到持久化后的结果
    let seen_by_writer = writer.get_aggregate_history(id).await?;
    assert!(same_history(&migrated, &seen_by_writer));
    assert!(same_history(
        &migrated,
        &migrating.get_aggregate_history(id).await?
    ));
    Ok(())
}
