//! SQLite 事件存储（sqlx）
//!
//! 表结构：
//! - `event_type`：持久化类型标识查找表；
//! - `event`：事件行，`insertion_order` 为自增主键，`(aggregate_id, aggregate_version)`
//!   与 `event_id` 唯一，`read_order_major/minor` 记录迁移后的有效读取位置。
//!
//! 每个写操作在单个 `BEGIN IMMEDIATE` 事务中完成，写者按 busy_timeout 排队；
//! 调用方也可以传入自己的事务（`*_in`）把多个聚合的写入合并提交。
//! 并发写入同一版本由版本校验或唯一约束检测并转换为 `ConcurrencyConflict`。
//!
use async_trait::async_trait;
use bon::Builder;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Connection, QueryBuilder, Row, Sqlite, Transaction};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use super::event_store::{
    BatchHandler, BatchPlan, CommittedVersions, EventStore, MigrationReport, deliver_in_batches,
};
use super::stored_event::{ReadOrder, StoredEvent, group_by_aggregate};
use crate::domain_event::{AggregateId, EventId};
use crate::error::{DomainError, DomainResult as Result};
use crate::event_type::{EventTypeFilter, EventTypeId};
use crate::migration::MigrationPipeline;
use crate::value_object::Version;

const BEGIN_WRITE: &str = "BEGIN IMMEDIATE";

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS event_type (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        identifier TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS event (
        insertion_order INTEGER PRIMARY KEY AUTOINCREMENT,
        aggregate_id BLOB NOT NULL,
        aggregate_version INTEGER NOT NULL CHECK (aggregate_version >= 1),
        timestamp TEXT NOT NULL,
        event_type_id INTEGER NOT NULL REFERENCES event_type (id),
        event_id BLOB NOT NULL UNIQUE,
        payload TEXT NOT NULL,
        read_order_major INTEGER NULL,
        read_order_minor INTEGER NOT NULL DEFAULT 0,
        UNIQUE (aggregate_id, aggregate_version)
    )",
    "CREATE INDEX IF NOT EXISTS idx_event_read_order
        ON event (COALESCE(read_order_major, insertion_order), read_order_minor)",
];

const SELECT_AGGREGATE: &str = "SELECT e.insertion_order, e.aggregate_id, e.aggregate_version, \
     e.timestamp, t.identifier AS identifier, e.event_id, e.payload, e.read_order_major, e.read_order_minor \
     FROM event e JOIN event_type t ON t.id = e.event_type_id \
     WHERE e.aggregate_id = ? ORDER BY e.aggregate_version";

const SELECT_ALL: &str = "SELECT e.insertion_order, e.aggregate_id, e.aggregate_version, \
     e.timestamp, t.identifier AS identifier, e.event_id, e.payload, e.read_order_major, e.read_order_minor \
     FROM event e JOIN event_type t ON t.id = e.event_type_id \
     ORDER BY COALESCE(e.read_order_major, e.insertion_order), e.read_order_minor, e.insertion_order";

const INSERT_EVENT: &str = "INSERT INTO event (insertion_order, aggregate_id, aggregate_version, \
     timestamp, event_type_id, event_id, payload, read_order_major, read_order_minor) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";

/// SQLite 存储配置
#[derive(Debug, Clone, Builder)]
pub struct SqliteStoreConfig {
    /// 连接串，例如 `sqlite://events.db` 或 `sqlite::memory:`
    #[builder(into, default = String::from("sqlite::memory:"))]
    database_url: String,
    /// 连接池大小；内存数据库每个连接各自独立，必须为 1
    #[builder(default = 1)]
    max_connections: u32,
    /// 连接后是否创建表结构
    #[builder(default = true)]
    create_schema: bool,
    /// 等待其他写事务释放数据库锁的最长时间
    #[builder(default = Duration::from_secs(5))]
    busy_timeout: Duration,
}

impl SqliteStoreConfig {
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn max_connections(&self) -> u32 {
        self.max_connections
    }

    pub fn create_schema(&self) -> bool {
        self.create_schema
    }

    pub fn busy_timeout(&self) -> Duration {
        self.busy_timeout
    }

    fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(DomainError::invalid_configuration(
                "max_connections must be greater than zero",
            ));
        }
        if self.database_url.contains(":memory:") && self.max_connections != 1 {
            return Err(DomainError::invalid_configuration(
                "in-memory sqlite databases require exactly one pooled connection",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SqliteEventStore {
    pool: SqlitePool,
    pipeline: MigrationPipeline,
}

impl SqliteEventStore {
    pub fn new(pool: SqlitePool, pipeline: MigrationPipeline) -> Self {
        Self { pool, pipeline }
    }

    /// 按配置建立连接池（可选建表）
    pub async fn connect(config: SqliteStoreConfig, pipeline: MigrationPipeline) -> Result<Self> {
        config.validate()?;

        let options = SqliteConnectOptions::from_str(config.database_url())?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout());
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections())
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self::new(pool, pipeline);
        if config.create_schema() {
            store.create_schema().await?;
        }
        Ok(store)
    }

    pub async fn create_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn pipeline(&self) -> &MigrationPipeline {
        &self.pipeline
    }

    /// 开启写事务（`BEGIN IMMEDIATE`）
    ///
    /// 写锁在事务开始时获取，并发写者在 busy_timeout 内排队，
    /// 而不是在读锁升级为写锁时直接失败。
    pub async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with(BEGIN_WRITE).await?)
    }

    /// 在调用方的事务中追加事件，由调用方决定提交或回滚
    ///
    /// 多个聚合的写入可以共用同一事务，从而整体原子提交。版本校验在写入前完成；
    /// 写入阶段出错时本次调用可能已留下部分事件，调用方应回滚事务。
    pub async fn save_events_in(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        events: Vec<StoredEvent>,
    ) -> Result<CommittedVersions> {
        self.append(&mut **tx, events).await
    }

    /// 在调用方提供的连接上追加事件
    ///
    /// 连接不应处于事务中（事务内请使用 `save_events_in`）；本操作记录警告后
    /// 在该连接上开启自己的写事务。
    pub async fn save_events_on(
        &self,
        conn: &mut SqliteConnection,
        events: Vec<StoredEvent>,
    ) -> Result<CommittedVersions> {
        tracing::warn!(
            events = events.len(),
            "saving events outside a caller transaction; committing on its own"
        );
        let mut tx = conn.begin_with(BEGIN_WRITE).await?;
        let committed = self.append(&mut tx, events).await?;
        tx.commit().await?;
        Ok(committed)
    }

    /// 在调用方的连接或事务中读取聚合历史（已应用迁移）
    pub async fn get_aggregate_history_in(
        &self,
        conn: &mut SqliteConnection,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>> {
        let raw = load_aggregate(conn, aggregate_id).await?;
        self.pipeline.migrate_aggregate(raw)
    }

    /// 在调用方的事务中持久化迁移结果
    pub async fn persist_migrations_in(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
    ) -> Result<MigrationReport> {
        let conn = &mut **tx;

        let stream = load_all(conn).await?;
        let results = self.pipeline.migrate_each(stream)?;

        let mut report = MigrationReport {
            aggregates_scanned: results.len(),
            ..MigrationReport::default()
        };

        for aggregate in results.into_iter().filter(|a| a.is_changed()) {
            sqlx::query("DELETE FROM event WHERE aggregate_id = ?")
                .bind(Uuid::from(aggregate.aggregate_id))
                .execute(&mut *conn)
                .await?;

            for event in &aggregate.migrated {
                let type_key = event_type_key(conn, event.event_type()).await?;
                insert_event(conn, event, type_key, event.aggregate_version()).await?;
            }

            report.aggregates_rewritten += 1;
            report.events_written += aggregate.migrated.len();
        }

        Ok(report)
    }

    async fn append(
        &self,
        conn: &mut SqliteConnection,
        events: Vec<StoredEvent>,
    ) -> Result<CommittedVersions> {
        if events.is_empty() {
            return Ok(CommittedVersions::default());
        }

        let mut batch_ids = HashSet::new();
        for event in &events {
            if !batch_ids.insert(event.event_id()) || event_exists(conn, event.event_id()).await? {
                return Err(DomainError::DuplicateEvent {
                    event_id: event.event_id(),
                });
            }
        }

        let mut plan = BatchPlan::default();
        for (aggregate_id, incoming) in group_by_aggregate(events.clone()) {
            let raw = load_aggregate(conn, aggregate_id).await?;
            plan.add(&self.pipeline, aggregate_id, raw, &incoming)?;
        }
        let versions = events
            .iter()
            .map(|event| plan.stored_version(event))
            .collect::<Result<Vec<Version>>>()?;

        let count = events.len();
        for (mut event, version) in events.into_iter().zip(versions) {
            let requested = event.aggregate_version();
            event.set_aggregate_version(version);
            event.set_insertion_order(None);
            event.clear_read_order();

            let type_key = event_type_key(conn, event.event_type()).await?;
            insert_event(conn, &event, type_key, requested).await?;
        }

        tracing::debug!(events = count, "events appended to sqlite store");
        Ok(plan.into_committed())
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn save_events(&self, events: Vec<StoredEvent>) -> Result<CommittedVersions> {
        if events.is_empty() {
            return Ok(CommittedVersions::default());
        }
        let mut tx = self.begin_write().await?;
        let committed = self.save_events_in(&mut tx, events).await?;
        tx.commit().await?;
        Ok(committed)
    }

    async fn get_aggregate_history(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>> {
        let raw = self.get_raw_aggregate_history(aggregate_id).await?;
        self.pipeline.migrate_aggregate(raw)
    }

    async fn get_raw_aggregate_history(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>> {
        let mut conn = self.pool.acquire().await?;
        load_aggregate(&mut conn, aggregate_id).await
    }

    async fn stream_events(&self, batch_size: usize, handler: &mut BatchHandler<'_>) -> Result<()> {
        // 全局迁移需要完整的原始流，整表读入内存后再分批投递
        let raw = {
            let mut conn = self.pool.acquire().await?;
            load_all(&mut conn).await?
        };
        let migrated = self.pipeline.migrate_global(raw)?;
        deliver_in_batches(migrated, batch_size, handler)
    }

    async fn stream_aggregate_ids_in_creation_order(
        &self,
        filter: Option<&EventTypeFilter>,
    ) -> Result<Vec<AggregateId>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT e.aggregate_id AS aggregate_id FROM event e \
             JOIN event_type t ON t.id = e.event_type_id",
        );
        if let Some(filter) = filter {
            if filter.is_empty() {
                return Ok(Vec::new());
            }
            qb.push(" WHERE t.identifier IN (");
            let mut separated = qb.separated(", ");
            for identifier in filter.iter() {
                separated.push_bind(identifier.as_str().to_string());
            }
            separated.push_unseparated(")");
        }
        qb.push(" GROUP BY e.aggregate_id ORDER BY MIN(e.timestamp), MIN(e.insertion_order)");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| Ok(AggregateId::from(row.try_get::<Uuid, _>("aggregate_id")?)))
            .collect()
    }

    async fn delete_events(&self, aggregate_id: AggregateId) -> Result<()> {
        let result = sqlx::query("DELETE FROM event WHERE aggregate_id = ?")
            .bind(Uuid::from(aggregate_id))
            .execute(&self.pool)
            .await?;
        tracing::debug!(
            aggregate_id = %aggregate_id,
            events = result.rows_affected(),
            "events deleted from sqlite store"
        );
        Ok(())
    }

    async fn persist_migrations(&self) -> Result<MigrationReport> {
        let mut tx = self.begin_write().await?;
        // 迁移失败时事务随 tx 丢弃而回滚
        let report = self.persist_migrations_in(&mut tx).await?;
        tx.commit().await?;

        tracing::info!(
            aggregates_scanned = report.aggregates_scanned,
            aggregates_rewritten = report.aggregates_rewritten,
            events_written = report.events_written,
            "migrations persisted to sqlite store"
        );
        Ok(report)
    }
}

// ---- row helpers ----

fn format_timestamp(at: DateTime<Utc>) -> String {
    // 固定宽度，保证按文本比较即按时间比较
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_row(row: &SqliteRow) -> Result<StoredEvent> {
    let insertion_order: i64 = row.try_get("insertion_order")?;
    let aggregate_id: Uuid = row.try_get("aggregate_id")?;
    let aggregate_version: i64 = row.try_get("aggregate_version")?;
    let timestamp: String = row.try_get("timestamp")?;
    let identifier: String = row.try_get("identifier")?;
    let event_id: Uuid = row.try_get("event_id")?;
    let payload: String = row.try_get("payload")?;
    let major: Option<i64> = row.try_get("read_order_major")?;
    let minor: i64 = row.try_get("read_order_minor")?;

    let aggregate_version = usize::try_from(aggregate_version).map_err(|_| DomainError::Parse {
        reason: format!("invalid aggregate version {aggregate_version}"),
    })?;
    let occurred_at = DateTime::parse_from_rfc3339(&timestamp)?.with_timezone(&Utc);
    let payload: Value = serde_json::from_str(&payload)?;

    Ok(StoredEvent::builder()
        .event_id(event_id)
        .event_type(EventTypeId::new(identifier))
        .aggregate_id(AggregateId::from(aggregate_id))
        .aggregate_version(Version::from_value(aggregate_version))
        .insertion_order(insertion_order)
        .maybe_read_order(major.map(|major| ReadOrder::new(major, minor)))
        .occurred_at(occurred_at)
        .payload(payload)
        .build())
}

async fn load_aggregate(
    conn: &mut SqliteConnection,
    aggregate_id: AggregateId,
) -> Result<Vec<StoredEvent>> {
    let rows = sqlx::query(SELECT_AGGREGATE)
        .bind(Uuid::from(aggregate_id))
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(decode_row).collect()
}

async fn load_all(conn: &mut SqliteConnection) -> Result<Vec<StoredEvent>> {
    let rows = sqlx::query(SELECT_ALL).fetch_all(&mut *conn).await?;
    rows.iter().map(decode_row).collect()
}

async fn event_exists(conn: &mut SqliteConnection, event_id: EventId) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM event WHERE event_id = ?")
        .bind(event_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count > 0)
}

// 类型标识不做缓存：迁移持久化可能在事务中新增类型
async fn event_type_key(conn: &mut SqliteConnection, identifier: &EventTypeId) -> Result<i64> {
    sqlx::query("INSERT OR IGNORE INTO event_type (identifier) VALUES (?)")
        .bind(identifier.as_str())
        .execute(&mut *conn)
        .await?;
    let key: i64 = sqlx::query_scalar("SELECT id FROM event_type WHERE identifier = ?")
        .bind(identifier.as_str())
        .fetch_one(&mut *conn)
        .await?;
    Ok(key)
}

async fn insert_event(
    conn: &mut SqliteConnection,
    event: &StoredEvent,
    type_key: i64,
    requested: Version,
) -> Result<()> {
    let read_order = event.read_order();
    let payload = serde_json::to_string(event.payload())?;

    sqlx::query(INSERT_EVENT)
        .bind(event.insertion_order())
        .bind(Uuid::from(event.aggregate_id()))
        .bind(event.aggregate_version().value() as i64)
        .bind(format_timestamp(event.occurred_at()))
        .bind(type_key)
        .bind(event.event_id())
        .bind(payload)
        .bind(read_order.map(|r| r.major))
        .bind(read_order.map_or(0, |r| r.minor))
        .execute(&mut *conn)
        .await
        .map_err(|err| write_error(err, event, requested))?;
    Ok(())
}

fn write_error(err: sqlx::Error, event: &StoredEvent, requested: Version) -> DomainError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            if db.message().contains("event_id") {
                DomainError::DuplicateEvent {
                    event_id: event.event_id(),
                }
            } else {
                DomainError::ConcurrencyConflict {
                    aggregate_id: event.aggregate_id(),
                    expected: requested.value().saturating_sub(1),
                    actual: requested.value(),
                }
            }
        }
        _ => err.into(),
    }
}
