//! 持久化与事件溯源（persist）
//!
//! - 事件的持久化形态（`StoredEvent`）与有效读取位置（`ReadOrder`）；
//! - 事件存储协议（`EventStore`）及内存、SQLite 两种实现；
//! - 基于事件存储的聚合仓储（`AggregateRepository`/`EventSourcedRepository`）。
//!
mod aggregate_repository;
mod event_store;
mod memory_store;
#[cfg(feature = "infra-sqlx")]
mod sqlite_store;
mod stored_event;

pub use aggregate_repository::{AggregateRepository, EventSourcedRepository, RepositoryConfig};
pub use event_store::{BatchHandler, CommittedVersions, EventStore, MigrationReport};
pub use memory_store::InMemoryEventStore;
#[cfg(feature = "infra-sqlx")]
pub use sqlite_store::{SqliteEventStore, SqliteStoreConfig};
pub(crate) use stored_event::group_by_aggregate;
pub use stored_event::{ReadOrder, StoredEvent, same_history};
