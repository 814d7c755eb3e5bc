use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;

/// 事件家族：某一聚合可应用/产生的全部事件组成的和类型（通常为枚举）。
///
/// 每个变体对应一个具有稳定运行时名称的事件类型；持久化标识与运行时名称之间
/// 的映射由 `EventTypeRegistry` 维护。通常由 `#[event_family]` 宏生成实现。
pub trait EventFamily: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// 家族内全部事件类型的运行时名称（注册顺序）
    const TYPE_NAMES: &'static [&'static str];

    /// 当前事件的运行时类型名称
    fn type_name(&self) -> &'static str;

    /// 编码事件载荷（不含类型信息）
    fn to_payload(&self) -> serde_json::Result<Value>;

    /// 按运行时类型名称解码载荷；类型不属于本家族时返回 `None`
    fn from_payload(type_name: &str, payload: &Value) -> Option<serde_json::Result<Self>>;
}

/// 事件家族成员：可以从家族中选出、也可以包装回家族的具体事件类型
pub trait FamilyMember<E: EventFamily>: Into<E> + Send + Sync + 'static {
    const TYPE_NAME: &'static str;

    fn select(event: &E) -> Option<&Self>;
}

/// 编码单个成员载荷（供宏生成代码使用）
pub fn encode_member<T: Serialize>(member: &T) -> serde_json::Result<Value> {
    serde_json::to_value(member)
}

/// 解码单个成员载荷（供宏生成代码使用）
pub fn decode_member<T: DeserializeOwned>(payload: &Value) -> serde_json::Result<T> {
    T::deserialize(payload)
}
