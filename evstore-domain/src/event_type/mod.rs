//! 事件类型映射（Event Type Registry）
//!
//! 维护运行时事件类型名称与持久化标识之间的双向映射，并通过重命名规则
//! 推导历史标识，使类型改名/迁移命名空间后旧数据仍可解析：
//! - 新写入始终使用当前标识；
//! - 读取时当前标识与所有历史别名都可解析到同一类型。
//!
mod filter;
mod identifier;
mod registry;
mod rename;

pub use filter::EventTypeFilter;
pub use identifier::EventTypeId;
pub use registry::{EventTypeRegistry, TypeMappingEntry};
pub use rename::{PathRewrite, RenameRule, RenamedFrom};
