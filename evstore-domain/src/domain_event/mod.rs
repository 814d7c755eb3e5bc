//! 领域事件（Domain Event）与事件集合
//!
//! 定义事件家族需要实现的最小接口（`EventFamily`/`FamilyMember`），以及将事件与
//! 元数据封装后的 `EventEnvelope` 与辅助集合类型 `AggregateEvents`。

mod aggregate_events;
mod aggregate_id;
mod event_envelope;
mod event_family;
mod metadata;

pub use aggregate_events::AggregateEvents;
pub use aggregate_id::{AggregateId, EventId};
pub use event_envelope::EventEnvelope;
pub use event_family::{EventFamily, FamilyMember, decode_member, encode_member};
pub use metadata::Metadata;
