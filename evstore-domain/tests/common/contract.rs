//! 事件存储契约：内存与 SQLite 实现共用同一组断言
use anyhow::Result as AnyResult;
use chrono::{Duration, Utc};
use evstore_domain::domain_event::AggregateId;
use evstore_domain::error::DomainError;
use evstore_domain::event_type::EventTypeFilter;
use evstore_domain::persist::{EventStore, StoredEvent, same_history};
use serde_json::json;
use std::sync::Arc;

use super::{AUDITED, CREATED, RENAMED, event, event_at, registry, types_of, versions_of};

async fn global_stream<S: EventStore>(store: &S) -> AnyResult<Vec<StoredEvent>> {
    let mut all = Vec::new();
    store
        .stream_events(100, &mut |batch: Vec<StoredEvent>| {
            all.extend(batch);
            Ok(())
        })
        .await?;
    Ok(all)
}

pub async fn saves_and_reads_history<S: EventStore>(store: &S) -> AnyResult<()> {
    let id = AggregateId::random();
    let created = event(id, 1, CREATED);
    let renamed = event(id, 2, RENAMED);
    let committed = store
        .save_events(vec![created.clone(), renamed.clone()])
        .await?;
    assert_eq!(committed.get(id).map(|v| v.value()), Some(2));

    let history = store.get_aggregate_history(id).await?;
    assert_eq!(types_of(&history), vec![CREATED, RENAMED]);
    assert_eq!(versions_of(&history), vec![1, 2]);
    assert_eq!(history[0].event_id(), created.event_id());
    assert_eq!(history[1].payload(), renamed.payload());
    assert_eq!(history[0].occurred_at(), created.occurred_at());
    assert!(history.iter().all(|e| e.insertion_order().is_some()));

    assert!(store.get_aggregate_history(AggregateId::random()).await?.is_empty());
    Ok(())
}

pub async fn insertion_orders_follow_call_order<S: EventStore>(store: &S) -> AnyResult<()> {
    let a = AggregateId::random();
    let b = AggregateId::random();
    let batch = vec![event(a, 1, CREATED), event(b, 1, CREATED), event(a, 2, RENAMED)];
    let expected: Vec<_> = batch.iter().map(|e| e.event_id()).collect();
    store.save_events(batch).await?;
    store.save_events(vec![event(b, 2, RENAMED)]).await?;

    let all = global_stream(store).await?;
    let ours: Vec<&StoredEvent> = all
        .iter()
        .filter(|e| e.aggregate_id() == a || e.aggregate_id() == b)
        .collect();
    assert_eq!(ours.len(), 4);
    assert_eq!(
        ours[..3].iter().map(|e| e.event_id()).collect::<Vec<_>>(),
        expected
    );

    let orders: Vec<i64> = ours.iter().filter_map(|e| e.insertion_order()).collect();
    assert_eq!(orders.len(), 4);
    assert!(orders.windows(2).all(|w| w[0] < w[1]), "{orders:?}");
    Ok(())
}

pub async fn rejects_stale_versions<S: EventStore>(store: &S) -> AnyResult<()> {
    let id = AggregateId::random();
    store.save_events(vec![event(id, 1, CREATED)]).await?;

    let err = store
        .save_events(vec![event(id, 1, RENAMED)])
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            DomainError::ConcurrencyConflict {
                expected: 0,
                actual: 1,
                ..
            }
        ),
        "{err}"
    );

    let err = store
        .save_events(vec![event(id, 3, RENAMED)])
        .await
        .unwrap_err();
    assert!(err.is_concurrency_conflict());

    assert_eq!(store.get_aggregate_history(id).await?.len(), 1);
    Ok(())
}

pub async fn rejects_duplicate_event_ids<S: EventStore>(store: &S) -> AnyResult<()> {
    let first = event(AggregateId::random(), 1, CREATED);
    store.save_events(vec![first.clone()]).await?;

    let other = AggregateId::random();
    let copy = StoredEvent::builder()
        .event_id(first.event_id())
        .event_type(CREATED.into())
        .aggregate_id(other)
        .aggregate_version(1.into())
        .occurred_at(Utc::now())
        .payload(json!({}))
        .build();

    let err = store.save_events(vec![copy]).await.unwrap_err();
    assert!(matches!(err, DomainError::DuplicateEvent { event_id } if event_id == first.event_id()));
    assert!(store.get_aggregate_history(other).await?.is_empty());
    Ok(())
}

pub async fn batches_are_atomic<S: EventStore>(store: &S) -> AnyResult<()> {
    let existing = AggregateId::random();
    store.save_events(vec![event(existing, 1, CREATED)]).await?;

    let fresh = AggregateId::random();
    let err = store
        .save_events(vec![event(fresh, 1, CREATED), event(existing, 1, RENAMED)])
        .await
        .unwrap_err();
    assert!(err.is_concurrency_conflict());

    assert!(store.get_aggregate_history(fresh).await?.is_empty());
    assert_eq!(store.get_aggregate_history(existing).await?.len(), 1);
    Ok(())
}

pub async fn streams_in_batches<S: EventStore>(store: &S) -> AnyResult<()> {
    let id = AggregateId::random();
    store
        .save_events((1..=5).map(|v| event(id, v, RENAMED)).collect())
        .await?;

    let mut sizes = Vec::new();
    let mut versions = Vec::new();
    store
        .stream_events(2, &mut |batch: Vec<StoredEvent>| {
            sizes.push(batch.len());
            versions.extend(
                batch
                    .iter()
                    .filter(|e| e.aggregate_id() == id)
                    .map(|e| e.aggregate_version().value()),
            );
            Ok(())
        })
        .await?;

    assert!(sizes.iter().all(|&size| size <= 2));
    assert_eq!(versions, vec![1, 2, 3, 4, 5]);

    let err = store.stream_events(0, &mut |_| Ok(())).await.unwrap_err();
    assert!(matches!(err, DomainError::InvalidConfiguration { .. }));
    Ok(())
}

pub async fn lists_aggregates_in_creation_order<S: EventStore>(store: &S) -> AnyResult<()> {
    let base = Utc::now() - Duration::days(365);
    let late = AggregateId::random();
    let early = AggregateId::random();
    let foreign = AggregateId::random();

    store
        .save_events(vec![
            event_at(late, 1, CREATED, json!({"name": "late"}), base + Duration::seconds(10)),
            event_at(early, 1, CREATED, json!({"name": "early"}), base),
            event_at(foreign, 1, "Billing.Invoiced", json!({}), base - Duration::seconds(5)),
        ])
        .await?;

    let ids = store.stream_aggregate_ids_in_creation_order(None).await?;
    let position = |id: AggregateId| ids.iter().position(|x| *x == id);
    assert!(position(foreign) < position(early));
    assert!(position(early) < position(late));

    let customers = registry().type_ids_of::<super::CustomerEvent>()?;
    let ids = store
        .stream_aggregate_ids_in_creation_order(Some(&customers))
        .await?;
    assert!(!ids.contains(&foreign));
    let position = |id: AggregateId| ids.iter().position(|x| *x == id);
    assert!(position(early).is_some());
    assert!(position(early) < position(late));

    let none = store
        .stream_aggregate_ids_in_creation_order(Some(&EventTypeFilter::default()))
        .await?;
    assert!(none.is_empty());
    Ok(())
}

pub async fn deletes_one_aggregate<S: EventStore>(store: &S) -> AnyResult<()> {
    let doomed = AggregateId::random();
    let kept = AggregateId::random();
    store
        .save_events(vec![
            event(doomed, 1, CREATED),
            event(kept, 1, CREATED),
            event(doomed, 2, RENAMED),
        ])
        .await?;

    store.delete_events(doomed).await?;

    assert!(store.get_aggregate_history(doomed).await?.is_empty());
    assert!(store.get_raw_aggregate_history(doomed).await?.is_empty());
    assert_eq!(store.get_aggregate_history(kept).await?.len(), 1);
    assert!(
        !store
            .stream_aggregate_ids_in_creation_order(None)
            .await?
            .contains(&doomed)
    );

    // 删除后可重新从版本 1 开始
    store.save_events(vec![event(doomed, 1, CREATED)]).await?;
    assert_eq!(store.get_aggregate_history(doomed).await?.len(), 1);
    Ok(())
}

/// 要求 `store` 使用 `audit_pipeline()`
pub async fn persisted_migrations_are_transparent<S: EventStore>(store: &S) -> AnyResult<()> {
    let renamed_twice = AggregateId::random();
    let untouched = AggregateId::random();
    let committed = store
        .save_events(vec![
            event(renamed_twice, 1, CREATED),
            event(untouched, 1, CREATED),
            event(renamed_twice, 2, RENAMED),
        ])
        .await?;
    // 返回的是写入后的有效版本，包含插入的审计事件
    assert_eq!(committed.len(), 2);
    assert_eq!(committed.get(renamed_twice).map(|v| v.value()), Some(3));
    assert_eq!(committed.get(untouched).map(|v| v.value()), Some(1));

    let committed = store.save_events(vec![event(renamed_twice, 4, RENAMED)]).await?;
    assert_eq!(committed.get(renamed_twice).map(|v| v.value()), Some(5));

    let raw = store.get_raw_aggregate_history(renamed_twice).await?;
    assert_eq!(types_of(&raw), vec![CREATED, RENAMED, RENAMED]);
    assert_eq!(versions_of(&raw), vec![1, 2, 3]);

    let before = store.get_aggregate_history(renamed_twice).await?;
    assert_eq!(types_of(&before), vec![CREATED, AUDITED, RENAMED, AUDITED, RENAMED]);
    assert_eq!(versions_of(&before), vec![1, 2, 3, 4, 5]);
    let stream_before = global_stream(store).await?;

    let report = store.persist_migrations().await?;
    assert!(report.aggregates_scanned >= 2);
    assert_eq!(report.aggregates_rewritten, 1);
    assert_eq!(report.events_written, 5);

    let after = store.get_aggregate_history(renamed_twice).await?;
    assert!(same_history(&before, &after));
    let raw = store.get_raw_aggregate_history(renamed_twice).await?;
    assert_eq!(types_of(&raw), vec![CREATED, AUDITED, RENAMED, AUDITED, RENAMED]);
    assert!(same_history(&stream_before, &global_stream(store).await?));

    let again = store.persist_migrations().await?;
    assert_eq!(again.aggregates_rewritten, 0);
    assert!(same_history(&before, &store.get_aggregate_history(renamed_twice).await?));

    // 持久化后写入仍按有效版本校验
    store.save_events(vec![event(renamed_twice, 6, CREATED)]).await?;
    assert_eq!(store.get_aggregate_history(renamed_twice).await?.len(), 6);
    Ok(())
}

/// 并发写入同一聚合的版本 1：恰好一个成功
pub async fn racing_writers_have_one_winner<S: EventStore + 'static>(store: Arc<S>) -> AnyResult<()> {
    let id = AggregateId::random();
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            store.save_events(vec![event(id, 1, CREATED)]).await
        }));
    }

    let mut won = 0;
    for task in tasks {
        match task.await? {
            Ok(_) => won += 1,
            Err(err) => assert!(err.is_concurrency_conflict(), "{err}"),
        }
    }

    assert_eq!(won, 1);
    assert_eq!(store.get_aggregate_history(id).await?.len(), 1);
    Ok(())
}

/// 并发写入不同聚合：写入序号全局唯一
pub async fn concurrent_writers_get_distinct_orders<S: EventStore + 'static>(
    store: Arc<S>,
) -> AnyResult<()> {
    let ids: Vec<AggregateId> = (0..6).map(|_| AggregateId::random()).collect();
    let mut tasks = Vec::new();
    for &id in &ids {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            for version in 1..=5 {
                store.save_events(vec![event(id, version, RENAMED)]).await?;
            }
            Ok::<(), DomainError>(())
        }));
    }
    for task in tasks {
        task.await??;
    }

    let mut orders = Vec::new();
    for &id in &ids {
        let history = store.get_aggregate_history(id).await?;
        assert_eq!(versions_of(&history), vec![1, 2, 3, 4, 5]);
        orders.extend(history.iter().filter_map(|e| e.insertion_order()));
    }
    let total = orders.len();
    orders.sort_unstable();
    orders.dedup();
    assert_eq!(orders.len(), total);
    assert_eq!(total, 30);
    Ok(())
}
