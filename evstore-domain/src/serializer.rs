//! 事件序列化（EventSerializer）
//!
//! 负责类型化事件与持久化形态之间的转换：
//! - 类型通过 `EventTypeRegistry` 映射为持久化标识（新写入使用当前标识）；
//! - 载荷编码为 JSON，不携带运行时类型名称，因而不受类型改名影响。
//!
use serde_json::Value;
use std::sync::Arc;

use crate::domain_event::{EventEnvelope, EventFamily, Metadata};
use crate::error::{DomainError, DomainResult as Result};
use crate::event_type::{EventTypeId, EventTypeRegistry};
use crate::persist::StoredEvent;

#[derive(Debug, Clone)]
pub struct EventSerializer {
    registry: Arc<EventTypeRegistry>,
}

impl EventSerializer {
    pub fn new(registry: Arc<EventTypeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<EventTypeRegistry> {
        &self.registry
    }

    /// 序列化事件，返回当前类型标识与载荷
    pub fn serialize<E: EventFamily>(&self, event: &E) -> Result<(EventTypeId, Value)> {
        let event_type = self.registry.identifier_for(event.type_name())?.clone();
        let payload = event.to_payload()?;
        Ok((event_type, payload))
    }

    /// 按类型标识（当前或历史）反序列化事件
    pub fn deserialize<E: EventFamily>(&self, event_type: &EventTypeId, payload: &Value) -> Result<E> {
        let type_name = self.registry.resolve(event_type)?;
        match E::from_payload(type_name, payload) {
            Some(Ok(event)) => Ok(event),
            Some(Err(err)) => Err(DomainError::CorruptPayload {
                event_type: event_type.to_string(),
                reason: err.to_string(),
            }),
            None => Err(DomainError::UnresolvedEventType {
                identifier: event_type.to_string(),
            }),
        }
    }

    pub fn to_stored<E: EventFamily>(&self, envelope: &EventEnvelope<E>) -> Result<StoredEvent> {
        let (event_type, payload) = self.serialize(&envelope.payload)?;
        let metadata = &envelope.metadata;

        Ok(StoredEvent::builder()
            .event_id(metadata.event_id())
            .event_type(event_type)
            .aggregate_id(metadata.aggregate_id())
            .aggregate_version(metadata.aggregate_version())
            .maybe_insertion_order(metadata.insertion_order())
            .occurred_at(*metadata.occurred_at())
            .payload(payload)
            .build())
    }

    pub fn from_stored<E: EventFamily>(&self, stored: &StoredEvent) -> Result<EventEnvelope<E>> {
        let payload = self.deserialize::<E>(stored.event_type(), stored.payload())?;
        let metadata = Metadata::builder()
            .event_id(stored.event_id())
            .aggregate_id(stored.aggregate_id())
            .aggregate_version(stored.aggregate_version())
            .maybe_insertion_order(stored.insertion_order())
            .occurred_at(stored.occurred_at())
            .build();

        Ok(EventEnvelope { metadata, payload })
    }

    pub fn serialize_events<E: EventFamily>(
        &self,
        events: &[EventEnvelope<E>],
    ) -> Result<Vec<StoredEvent>> {
        events.iter().map(|e| self.to_stored(e)).collect()
    }

    pub fn deserialize_events<E: EventFamily>(
        &self,
        events: &[StoredEvent],
    ) -> Result<Vec<EventEnvelope<E>>> {
        events.iter().map(|e| self.from_stored(e)).collect()
    }
}
