//! 事件溯源过程宏
//!
//! - `#[event_family]`：将“变体包裹载荷结构体”的枚举声明为事件家族，
//!   生成 `EventFamily`、`FamilyMember` 与 `From` 实现。
//!
use proc_macro::TokenStream;

mod derive_utils;
mod event_family;

/// 事件家族宏
///
/// 仅支持形如：
/// ```ignore
/// #[event_family(prefix = "Accounts")]
/// pub enum UserEvent {
///     #[event(event_type = "Accounts.UserRegistered")]
///     Registered(UserRegistered),
///     Renamed(UserRenamed),
/// }
/// ```
/// 的单字段元组变体：
/// - 类型名称默认 `{prefix}.{Variant}`，`prefix` 缺省为枚举名；
/// - 变体可通过 `#[event(event_type = "...")]` 覆写类型名称；
/// - 自动合并派生 `Debug, Clone, PartialEq`。
#[proc_macro_attribute]
pub fn event_family(attr: TokenStream, item: TokenStream) -> TokenStream {
    event_family::expand(attr, item)
}
