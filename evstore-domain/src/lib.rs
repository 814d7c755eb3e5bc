//! 事件溯源聚合持久化核心（evstore-domain）
//!
//! 从只追加的事件日志重建领域对象状态，保证并发写入安全，并支持在不破坏
//! 已持久化历史的前提下在线演进事件结构（迁移）：
//! - 事件模型（`domain_event`）与序列化边界（`serializer`）
//! - 事件类型注册表（`event_type`）：持久化标识与运行时类型之间的映射，容忍改名
//! - 迁移管线（`migration`）：读取时临时应用，或永久持久化
//! - 事件存储（`persist`）：内存实现与 SQLite 实现，外部契约一致
//! - 聚合重建（`aggregate`）：分发表、钩子与嵌套子实体集合
//! - 聚合仓储（`persist::AggregateRepository`）
//!
//! 典型用法：
//! 1. 以 `#[event_family]` 定义事件家族，启动时构建 `EventTypeRegistry` 并校验映射；
//! 2. 用注册表与迁移列表构建 `MigrationPipeline`，再构建事件存储；
//! 3. 通过 `EventSourcedRepository` 读取、修改并保存聚合。
//!
pub mod aggregate;
pub mod clock;
pub mod domain_event;
pub mod error;
pub mod event_type;
pub mod migration;
pub mod persist;
pub mod serializer;
pub mod value_object;

// 允许在本 crate 内部通过 ::evstore_domain 进行自引用，
// 以便过程宏在本 crate 的单元测试中也能解析到 ::evstore_domain 路径。
extern crate self as evstore_domain;

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}
