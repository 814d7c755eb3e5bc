use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::aggregate_id::AggregateId;
use super::event_family::EventFamily;
use super::metadata::Metadata;
use crate::value_object::Version;

/// 事件信封，包含事件载荷与元数据
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope<E>
where
    E: EventFamily,
{
    pub metadata: Metadata,
    pub payload: E,
}

impl<E> EventEnvelope<E>
where
    E: EventFamily,
{
    /// 为新产生的事件创建信封（尚未持久化，无写入序号）
    pub fn new(
        aggregate_id: AggregateId,
        aggregate_version: Version,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        let metadata = Metadata::builder()
            .event_id(Uuid::new_v4())
            .aggregate_id(aggregate_id)
            .aggregate_version(aggregate_version)
            .occurred_at(occurred_at)
            .build();

        Self { metadata, payload }
    }

    pub fn type_name(&self) -> &'static str {
        self.payload.type_name()
    }
}
