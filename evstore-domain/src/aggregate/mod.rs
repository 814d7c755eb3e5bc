//! 聚合（Aggregate）重建
//!
//! 聚合状态完全由事件重放得到：
//! - `Aggregate`：聚合根接口，`raise` 同步应用新事件并放入待提交缓冲；
//! - `EventDispatcher`：静态分发表，支持 before/on/after 钩子与“接口”处理器；
//! - `EntityCollection`：由创建事件实例化、按实体 ID 路由后续事件的子实体集合。
//!
mod aggregate_root;
mod dispatcher;
mod entity_collection;

pub use aggregate_root::{Aggregate, AggregateCore};
pub use dispatcher::EventDispatcher;
pub use entity_collection::{ChildEntity, EntityCollection, EntityCreation};
