//! 事件迁移（Event Migration）
//!
//! 历史事件结构演进时，通过迁移对每个聚合的事件流进行改写（插入、删除、替换、
//! 改类型）。同一条管线既用于每次读取时的临时迁移，也用于永久持久化迁移结果，
//! 两种模式输出完全一致。
//!
pub mod builtin;
mod migrator;
mod pipeline;

pub use migrator::{AggregateMigrator, EventMigration, MigrationContext, MigrationOutcome};
pub use pipeline::{MigratedAggregate, MigrationPipeline};
