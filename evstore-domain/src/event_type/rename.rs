use std::fmt;

use super::identifier::EventTypeId;

/// 重命名规则：由某个已知名称推导出一个历史标识
///
/// 规则按注册顺序应用，每条规则都能看到前序规则推导出的别名，从而可以串联
/// （先改命名空间，再改类型名）。
pub trait RenameRule: Send + Sync + fmt::Debug {
    fn historical_name(&self, type_name: &str, known: &EventTypeId) -> Option<EventTypeId>;
}

/// 命名空间/路径改写：当前以 `current_prefix` 开头的名称，历史上以 `historical_prefix` 开头
#[derive(Debug, Clone)]
pub struct PathRewrite {
    current_prefix: String,
    historical_prefix: String,
}

impl PathRewrite {
    pub fn new(current_prefix: impl Into<String>, historical_prefix: impl Into<String>) -> Self {
        Self {
            current_prefix: current_prefix.into(),
            historical_prefix: historical_prefix.into(),
        }
    }
}

impl RenameRule for PathRewrite {
    fn historical_name(&self, _type_name: &str, known: &EventTypeId) -> Option<EventTypeId> {
        known
            .as_str()
            .strip_prefix(self.current_prefix.as_str())
            .map(|rest| EventTypeId::new(format!("{}{}", self.historical_prefix, rest)))
    }
}

/// 显式旧名：指定类型曾经使用过的名称。
///
/// `old_name` 不含路径分隔符时只替换最后一段，保留（可能已被改写的）路径；
/// 否则视为完整的历史标识。
#[derive(Debug, Clone)]
pub struct RenamedFrom {
    type_name: &'static str,
    old_name: String,
}

impl RenamedFrom {
    pub fn new(type_name: &'static str, old_name: impl Into<String>) -> Self {
        Self {
            type_name,
            old_name: old_name.into(),
        }
    }
}

const SEPARATORS: [char; 2] = ['.', '/'];

impl RenameRule for RenamedFrom {
    fn historical_name(&self, type_name: &str, known: &EventTypeId) -> Option<EventTypeId> {
        if type_name != self.type_name {
            return None;
        }

        if self.old_name.contains(SEPARATORS) {
            return Some(EventTypeId::new(self.old_name.clone()));
        }

        let known = known.as_str();
        let renamed = match known.rfind(SEPARATORS) {
            Some(idx) => format!("{}{}", &known[..=idx], self.old_name),
            None => self.old_name.clone(),
        };
        Some(EventTypeId::new(renamed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_rewrite_only_touches_matching_prefix() {
        let rule = PathRewrite::new("Accounts.Domain.", "Legacy.Accounts.");

        let hit = rule.historical_name("x", &"Accounts.Domain.UserRegistered".into());
        assert_eq!(hit, Some("Legacy.Accounts.UserRegistered".into()));

        let miss = rule.historical_name("x", &"Billing.InvoiceSent".into());
        assert_eq!(miss, None);
    }

    #[test]
    fn renamed_from_keeps_path_for_short_names() {
        let rule = RenamedFrom::new("UserEvent.Registered", "UserCreated");

        let alias = rule.historical_name("UserEvent.Registered", &"Accounts.UserRegistered".into());
        assert_eq!(alias, Some("Accounts.UserCreated".into()));

        let other = rule.historical_name("UserEvent.Renamed", &"Accounts.UserRenamed".into());
        assert_eq!(other, None);

        let absolute = RenamedFrom::new("UserEvent.Registered", "legacy/user-created")
            .historical_name("UserEvent.Registered", &"Accounts.UserRegistered".into());
        assert_eq!(absolute, Some("legacy/user-created".into()));
    }
}
