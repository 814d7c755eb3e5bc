use serde::{Deserialize, Serialize};
use std::fmt;

/// 持久化事件类型标识（GUID 文本或路径形式的名称），与运行时类型名称解耦
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventTypeId(String);

impl EventTypeId {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self(identifier.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EventTypeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EventTypeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for EventTypeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
