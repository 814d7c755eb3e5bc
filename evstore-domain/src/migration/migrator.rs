use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain_event::{AggregateId, EventId};
use crate::error::DomainResult as Result;
use crate::event_type::EventTypeId;
use crate::persist::{ReadOrder, StoredEvent};
use crate::value_object::Version;

/// 事件迁移
///
/// 迁移本身是无状态的描述；每个聚合的改写由 `migrator()` 创建的
/// `AggregateMigrator` 完成，后者可以在聚合范围内缓存状态（前瞻/回看）。
pub trait EventMigration: Send + Sync {
    /// 迁移名称，在同一管线内必须唯一（参与合成事件 ID 的计算）
    fn name(&self) -> &str;

    /// 迁移可能产生的事件类型，构建管线时校验其可解析
    fn produces(&self) -> Vec<EventTypeId> {
        Vec::new()
    }

    /// 为单个聚合创建迁移器
    fn migrator(&self) -> Box<dyn AggregateMigrator + '_>;
}

impl<T> EventMigration for Arc<T>
where
    T: EventMigration + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn produces(&self) -> Vec<EventTypeId> {
        (**self).produces()
    }

    fn migrator(&self) -> Box<dyn AggregateMigrator + '_> {
        (**self).migrator()
    }
}

/// 单个聚合范围内的迁移器
///
/// 每个事件恰好调用一次 `migrate`，全部事件之后调用一次 `end_of_aggregate`。
pub trait AggregateMigrator: Send {
    fn migrate(&mut self, event: StoredEvent, ctx: &mut MigrationContext) -> Result<MigrationOutcome>;

    /// 聚合结束信号，可追加尾部事件
    fn end_of_aggregate(&mut self, _ctx: &mut MigrationContext) -> Result<Vec<StoredEvent>> {
        Ok(Vec::new())
    }
}

/// 迁移结果：单个、多个、或丢弃
#[allow(clippy::large_enum_variant)]
pub enum MigrationOutcome {
    One(StoredEvent),
    Many(Vec<StoredEvent>),
    Drop,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Anchor {
    event_id: EventId,
    occurred_at: DateTime<Utc>,
    version: Version,
    major: i64,
}

impl Anchor {
    pub(crate) fn of(event: &StoredEvent) -> Self {
        Self {
            event_id: event.event_id(),
            occurred_at: event.occurred_at(),
            version: event.aggregate_version(),
            major: event.effective_read_order().major,
        }
    }
}

/// 迁移上下文
///
/// 锚点为当前正在处理的输入事件（聚合结束时为最后一个输入事件）。
/// 合成事件的 ID 由锚点事件 ID、迁移名称与序号确定性生成，
/// 因此重复迁移得到相同的事件，持久化后再次读取结果不变。
pub struct MigrationContext<'a> {
    migration: &'a str,
    aggregate_id: AggregateId,
    anchor: Anchor,
    ordinal: usize,
    at_end: bool,
    emitted: Vec<StoredEvent>,
}

impl<'a> MigrationContext<'a> {
    pub(crate) fn new(migration: &'a str, aggregate_id: AggregateId, anchor: Anchor) -> Self {
        Self {
            migration,
            aggregate_id,
            anchor,
            ordinal: 0,
            at_end: false,
            emitted: Vec::new(),
        }
    }

    pub fn migration(&self) -> &str {
        self.migration
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    /// 本迁移迄今为止输出的事件（回看）
    pub fn emitted(&self) -> &[StoredEvent] {
        &self.emitted
    }

    pub fn last_emitted(&self) -> Option<&StoredEvent> {
        self.emitted.last()
    }

    pub fn is_at_end(&self) -> bool {
        self.at_end
    }

    /// 在锚点位置合成新事件
    pub fn new_event(&mut self, event_type: impl Into<EventTypeId>, payload: Value) -> StoredEvent {
        let name = if self.at_end {
            format!("{}/end/{}", self.migration, self.ordinal)
        } else {
            format!("{}/{}", self.migration, self.ordinal)
        };
        self.ordinal += 1;

        StoredEvent::builder()
            .event_id(Uuid::new_v5(&self.anchor.event_id, name.as_bytes()))
            .event_type(event_type.into())
            .aggregate_id(self.aggregate_id)
            .aggregate_version(self.anchor.version)
            .read_order(ReadOrder::new(self.anchor.major, 0))
            .occurred_at(self.anchor.occurred_at)
            .payload(payload)
            .build()
    }

    pub(crate) fn anchor_at(&mut self, event: &StoredEvent) {
        self.anchor = Anchor::of(event);
        self.ordinal = 0;
    }

    pub(crate) fn finish(&mut self) {
        self.at_end = true;
        self.ordinal = 0;
    }

    /// 接收输出；所有输出事件归入锚点的读取位置
    pub(crate) fn accept(&mut self, outcome: MigrationOutcome) {
        let events = match outcome {
            MigrationOutcome::One(e) => vec![e],
            MigrationOutcome::Many(v) => v,
            MigrationOutcome::Drop => vec![],
        };
        for mut event in events {
            event.set_read_order(ReadOrder::new(self.anchor.major, 0));
            self.emitted.push(event);
        }
    }

    pub(crate) fn into_emitted(self) -> Vec<StoredEvent> {
        self.emitted
    }
}
