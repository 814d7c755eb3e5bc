use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::aggregate_id::{AggregateId, EventId};
use crate::value_object::Version;

/// 元数据
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    event_id: EventId,
    aggregate_id: AggregateId,
    aggregate_version: Version,
    /// 全局写入序号，由存储层在持久化后赋值
    insertion_order: Option<i64>,
    occurred_at: DateTime<Utc>,
}

impl Metadata {
    pub fn event_id(&self) -> EventId {
        self.event_id
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

    pub fn occurred_at(&self) -> &DateTime<Utc> {
        &self.occurred_at
    }
}
