//! 事件持久化模型（StoredEvent）
//!
//! 定义事件在持久化层与迁移管线中的标准形态：类型以持久化标识表示，
//! 载荷为不含类型信息的 JSON。
//!
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::domain_event::{AggregateId, EventId};
use crate::event_type::EventTypeId;
use crate::value_object::Version;

/// 全局有效读取位置。
///
/// 未经迁移的事件位于 `(insertion_order, 0)`；迁移产生的事件继承其锚点事件的
/// `major`，在同一 `major` 内按输出顺序编号 `minor`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadOrder {
    pub major: i64,
    pub minor: i64,
}

impl ReadOrder {
    pub const fn new(major: i64, minor: i64) -> Self {
        Self { major, minor }
    }

    pub const fn at_insertion(insertion_order: i64) -> Self {
        Self::new(insertion_order, 0)
    }
}

impl PartialOrd for ReadOrder {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReadOrder {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor).cmp(&(other.major, other.minor))
    }
}

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct StoredEvent {
    /// 事件唯一标识符
    event_id: EventId,
    /// 持久化事件类型标识
    event_type: EventTypeId,
    /// 聚合 ID，标识事件所属的聚合根实例
    aggregate_id: AggregateId,
    /// 聚合版本，用于乐观锁和并发控制
    aggregate_version: Version,
    /// 全局写入序号，由存储层在持久化时赋值
    insertion_order: Option<i64>,
    /// 全局有效读取位置，由存储层或迁移管线赋值
    read_order: Option<ReadOrder>,
    /// 事件发生时间
    occurred_at: DateTime<Utc>,
    /// 事件负载
    payload: Value,
}

impl StoredEvent {
    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn event_type(&self) -> &EventTypeId {
        &self.event_type
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_version(&self) -> Version {
        self.aggregate_version
    }

    pub fn insertion_order(&self) -> Option<i64> {
        self.insertion_order
    }

    pub fn read_order(&self) -> Option<ReadOrder> {
        self.read_order
    }

    /// 排序用读取位置；缺失时退化为写入序号
    pub fn effective_read_order(&self) -> ReadOrder {
        self.read_order
            .unwrap_or_else(|| ReadOrder::at_insertion(self.insertion_order.unwrap_or(0)))
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// 替换类型与载荷，保留身份与位置信息
    pub fn with_content(mut self, event_type: EventTypeId, payload: Value) -> Self {
        self.event_type = event_type;
        self.payload = payload;
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub(crate) fn set_event_type(&mut self, event_type: EventTypeId) {
        self.event_type = event_type;
    }

    pub(crate) fn set_aggregate_version(&mut self, version: Version) {
        self.aggregate_version = version;
    }

    pub(crate) fn set_insertion_order(&mut self, insertion_order: Option<i64>) {
        self.insertion_order = insertion_order;
    }

    pub(crate) fn set_read_order(&mut self, read_order: ReadOrder) {
        self.read_order = Some(read_order);
    }

    pub(crate) fn clear_read_order(&mut self) {
        self.read_order = None;
    }

    /// 除写入序号（存储内部细节）外逐字段相等；读取位置按有效值比较
    pub fn same_content(&self, other: &StoredEvent) -> bool {
        self.event_id == other.event_id
            && self.event_type == other.event_type
            && self.aggregate_id == other.aggregate_id
            && self.aggregate_version == other.aggregate_version
            && self.effective_read_order() == other.effective_read_order()
            && self.occurred_at == other.occurred_at
            && self.payload == other.payload
    }
}

/// 两段事件流是否逐条 `same_content`
pub fn same_history(left: &[StoredEvent], right: &[StoredEvent]) -> bool {
    left.len() == right.len() && left.iter().zip(right).all(|(l, r)| l.same_content(r))
}

/// 按聚合分组，保持各聚合首次出现的顺序与组内顺序
pub(crate) fn group_by_aggregate(events: Vec<StoredEvent>) -> Vec<(AggregateId, Vec<StoredEvent>)> {
    let mut order: Vec<AggregateId> = Vec::new();
    let mut groups: HashMap<AggregateId, Vec<StoredEvent>> = HashMap::new();
    for event in events {
        let id = event.aggregate_id();
        groups
            .entry(id)
            .or_insert_with(|| {
                order.push(id);
                Vec::new()
            })
            .push(event);
    }
    order
        .into_iter()
        .filter_map(|id| groups.remove(&id).map(|events| (id, events)))
        .collect()
}
