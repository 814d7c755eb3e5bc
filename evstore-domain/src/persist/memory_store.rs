//! 内存事件存储
//!
//! 单把互斥锁保护全部状态；整批事件校验通过后才修改状态，保证写入原子性。
//! 与 SQLite 实现遵循完全相同的外部契约，适用于测试与单进程场景。
//!
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

use super::event_store::{
    BatchHandler, BatchPlan, CommittedVersions, EventStore, MigrationReport, deliver_in_batches,
};
use super::stored_event::{StoredEvent, group_by_aggregate};
use crate::domain_event::{AggregateId, EventId};
use crate::error::{DomainError, DomainResult as Result};
use crate::event_type::EventTypeFilter;
use crate::migration::MigrationPipeline;
use crate::value_object::Version;

#[derive(Debug, Default)]
struct State {
    // 按有效读取位置排序
    events: Vec<StoredEvent>,
    event_ids: HashSet<EventId>,
    last_insertion_order: i64,
}

impl State {
    fn raw_history(&self, aggregate_id: AggregateId) -> Vec<StoredEvent> {
        let mut history: Vec<StoredEvent> = self
            .events
            .iter()
            .filter(|e| e.aggregate_id() == aggregate_id)
            .cloned()
            .collect();
        history.sort_by_key(|e| e.aggregate_version());
        history
    }

    fn remove_aggregate(&mut self, aggregate_id: AggregateId) {
        let event_ids = &mut self.event_ids;
        self.events.retain(|e| {
            let keep = e.aggregate_id() != aggregate_id;
            if !keep {
                event_ids.remove(&e.event_id());
            }
            keep
        });
    }

    fn next_insertion_order(&mut self) -> i64 {
        self.last_insertion_order += 1;
        self.last_insertion_order
    }

    fn sort(&mut self) {
        self.events.sort_by_key(|e| e.effective_read_order());
    }
}

#[derive(Debug)]
pub struct InMemoryEventStore {
    pipeline: MigrationPipeline,
    state: Mutex<State>,
}

impl InMemoryEventStore {
    pub fn new(pipeline: MigrationPipeline) -> Self {
        Self {
            pipeline,
            state: Mutex::new(State::default()),
        }
    }

    pub fn pipeline(&self) -> &MigrationPipeline {
        &self.pipeline
    }

    /// 当前存储的原始事件总数
    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn save_sync(&self, events: Vec<StoredEvent>) -> Result<CommittedVersions> {
        if events.is_empty() {
            return Ok(CommittedVersions::default());
        }

        let mut state = self.state.lock();

        // 先整批校验，再统一写入
        let mut batch_ids = HashSet::new();
        for event in &events {
            let id = event.event_id();
            if state.event_ids.contains(&id) || !batch_ids.insert(id) {
                return Err(DomainError::DuplicateEvent { event_id: id });
            }
        }

        let mut plan = BatchPlan::default();
        for (aggregate_id, incoming) in group_by_aggregate(events.clone()) {
            let raw = state.raw_history(aggregate_id);
            plan.add(&self.pipeline, aggregate_id, raw, &incoming)?;
        }
        let versions = events
            .iter()
            .map(|event| plan.stored_version(event))
            .collect::<Result<Vec<Version>>>()?;

        let count = events.len();
        for (mut event, version) in events.into_iter().zip(versions) {
            let insertion_order = state.next_insertion_order();
            event.set_aggregate_version(version);
            event.set_insertion_order(Some(insertion_order));
            event.clear_read_order();
            state.event_ids.insert(event.event_id());
            state.events.push(event);
        }

        tracing::debug!(events = count, "events appended to in-memory store");
        Ok(plan.into_committed())
    }

    fn raw_history_sync(&self, aggregate_id: AggregateId) -> Vec<StoredEvent> {
        self.state.lock().raw_history(aggregate_id)
    }

    fn all_events_sync(&self) -> Vec<StoredEvent> {
        self.state.lock().events.clone()
    }

    fn aggregate_ids_sync(&self, filter: Option<&EventTypeFilter>) -> Vec<AggregateId> {
        let state = self.state.lock();

        // 每个聚合的最早（匹配）事件：(时间, 写入序号)
        let mut first_seen: HashMap<AggregateId, (chrono::DateTime<chrono::Utc>, i64)> =
            HashMap::new();
        for event in &state.events {
            if let Some(filter) = filter {
                if !filter.contains(event.event_type()) {
                    continue;
                }
            }
            let key = (event.occurred_at(), event.insertion_order().unwrap_or(i64::MAX));
            first_seen
                .entry(event.aggregate_id())
                .and_modify(|current| {
                    current.0 = current.0.min(key.0);
                    current.1 = current.1.min(key.1);
                })
                .or_insert(key);
        }

        let mut ids: Vec<(AggregateId, (chrono::DateTime<chrono::Utc>, i64))> =
            first_seen.into_iter().collect();
        ids.sort_by_key(|(_, key)| *key);
        ids.into_iter().map(|(id, _)| id).collect()
    }

    fn delete_sync(&self, aggregate_id: AggregateId) {
        self.state.lock().remove_aggregate(aggregate_id);
    }

    fn persist_migrations_sync(&self) -> Result<MigrationReport> {
        let mut state = self.state.lock();

        let results = self.pipeline.migrate_each(state.events.clone())?;
        let mut report = MigrationReport {
            aggregates_scanned: results.len(),
            ..MigrationReport::default()
        };

        for aggregate in results.into_iter().filter(|a| a.is_changed()) {
            let aggregate_id = aggregate.aggregate_id;
            state.remove_aggregate(aggregate_id);

            report.aggregates_rewritten += 1;
            report.events_written += aggregate.migrated.len();

            for mut event in aggregate.migrated {
                if event.insertion_order().is_none() {
                    let insertion_order = state.next_insertion_order();
                    event.set_insertion_order(Some(insertion_order));
                }
                state.event_ids.insert(event.event_id());
                state.events.push(event);
            }
        }

        state.sort();
        tracing::info!(
            aggregates_scanned = report.aggregates_scanned,
            aggregates_rewritten = report.aggregates_rewritten,
            events_written = report.events_written,
            "migrations persisted to in-memory store"
        );
        Ok(report)
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn save_events(&self, events: Vec<StoredEvent>) -> Result<CommittedVersions> {
        self.save_sync(events)
    }

    async fn get_aggregate_history(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>> {
        let raw = self.raw_history_sync(aggregate_id);
        self.pipeline.migrate_aggregate(raw)
    }

    async fn get_raw_aggregate_history(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>> {
        Ok(self.raw_history_sync(aggregate_id))
    }

    async fn stream_events(&self, batch_size: usize, handler: &mut BatchHandler<'_>) -> Result<()> {
        let migrated = self.pipeline.migrate_global(self.all_events_sync())?;
        deliver_in_batches(migrated, batch_size, handler)
    }

    async fn stream_aggregate_ids_in_creation_order(
        &self,
        filter: Option<&EventTypeFilter>,
    ) -> Result<Vec<AggregateId>> {
        Ok(self.aggregate_ids_sync(filter))
    }

    async fn delete_events(&self, aggregate_id: AggregateId) -> Result<()> {
        self.delete_sync(aggregate_id);
        Ok(())
    }

    async fn persist_migrations(&self) -> Result<MigrationReport> {
        self.persist_migrations_sync()
    }
}
