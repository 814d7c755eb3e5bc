use std::collections::HashMap;
use std::sync::Arc;

use super::filter::EventTypeFilter;
use super::identifier::EventTypeId;
use super::rename::RenameRule;
use crate::domain_event::EventFamily;
use crate::error::{DomainError, DomainResult as Result};

/// 类型映射条目：运行时类型名称、当前标识与累积的历史别名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMappingEntry {
    type_name: &'static str,
    identifier: EventTypeId,
    aliases: Vec<EventTypeId>,
}

impl TypeMappingEntry {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 当前标识（用于所有新写入）
    pub fn identifier(&self) -> &EventTypeId {
        &self.identifier
    }

    /// 历史别名（仅用于读取旧数据）
    pub fn aliases(&self) -> &[EventTypeId] {
        &self.aliases
    }

    fn known_names(&self) -> Vec<EventTypeId> {
        std::iter::once(self.identifier.clone())
            .chain(self.aliases.iter().cloned())
            .collect()
    }
}

/// 事件类型注册表
///
/// 在进程启动时构建一次，随后以 `Arc` 显式传递给序列化器、迁移管线与存储。
#[derive(Debug, Default)]
pub struct EventTypeRegistry {
    entries: Vec<TypeMappingEntry>,
    by_type: HashMap<&'static str, usize>,
    by_identifier: HashMap<EventTypeId, usize>,
    rules: Vec<Arc<dyn RenameRule>>,
}

impl EventTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册 `type_name -> identifier`。
    ///
    /// 重复注册完全相同的映射是幂等的；标识已被其他类型占用、或类型已映射到
    /// 其他标识时返回 `DuplicateEventTypeMapping`。
    pub fn register(
        &mut self,
        type_name: &'static str,
        identifier: impl Into<EventTypeId>,
    ) -> Result<()> {
        let identifier = identifier.into();

        if let Some(&idx) = self.by_type.get(type_name) {
            let existing = &self.entries[idx];
            if existing.identifier == identifier {
                return Ok(());
            }
            return Err(DomainError::DuplicateEventTypeMapping {
                identifier: identifier.to_string(),
                existing: existing.identifier.to_string(),
                requested: type_name.to_string(),
            });
        }

        self.ensure_unclaimed(&identifier, type_name)?;

        let idx = self.entries.len();
        self.entries.push(TypeMappingEntry {
            type_name,
            identifier: identifier.clone(),
            aliases: Vec::new(),
        });
        self.by_type.insert(type_name, idx);
        self.by_identifier.insert(identifier, idx);

        let rules = self.rules.clone();
        for rule in &rules {
            self.apply_rule(idx, rule.as_ref())?;
        }

        Ok(())
    }

    /// 以运行时名称作为标识注册整个事件家族；已显式注册的类型保持不变
    pub fn register_family<E: EventFamily>(&mut self) -> Result<()> {
        for &type_name in E::TYPE_NAMES {
            if !self.by_type.contains_key(type_name) {
                self.register(type_name, type_name)?;
            }
        }
        Ok(())
    }

    /// 追加重命名规则，并立即对已有条目生效
    pub fn add_rename_rule(&mut self, rule: impl RenameRule + 'static) -> Result<()> {
        let rule: Arc<dyn RenameRule> = Arc::new(rule);
        for idx in 0..self.entries.len() {
            self.apply_rule(idx, rule.as_ref())?;
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn with_rename_rule(mut self, rule: impl RenameRule + 'static) -> Result<Self> {
        self.add_rename_rule(rule)?;
        Ok(self)
    }

    /// 标识（当前或历史）解析为运行时类型名称
    pub fn resolve(&self, identifier: &EventTypeId) -> Result<&'static str> {
        self.by_identifier
            .get(identifier)
            .map(|&idx| self.entries[idx].type_name)
            .ok_or_else(|| DomainError::UnresolvedEventType {
                identifier: identifier.to_string(),
            })
    }

    /// 运行时类型名称对应的当前标识
    pub fn identifier_for(&self, type_name: &str) -> Result<&EventTypeId> {
        self.by_type
            .get(type_name)
            .map(|&idx| &self.entries[idx].identifier)
            .ok_or_else(|| DomainError::UnmappedEventType {
                type_name: type_name.to_string(),
            })
    }

    /// 将历史别名规范化为当前标识；未知标识返回 `None`
    pub fn canonical(&self, identifier: &EventTypeId) -> Option<&EventTypeId> {
        self.by_identifier
            .get(identifier)
            .map(|&idx| &self.entries[idx].identifier)
    }

    pub fn is_resolvable(&self, identifier: &EventTypeId) -> bool {
        self.by_identifier.contains_key(identifier)
    }

    /// 启动期校验：家族内所有类型都必须已注册
    pub fn ensure_family_mapped<E: EventFamily>(&self) -> Result<()> {
        for &type_name in E::TYPE_NAMES {
            self.identifier_for(type_name)?;
        }
        Ok(())
    }

    /// 家族内全部类型的当前与历史标识，作为“事件基类型”过滤器
    pub fn type_ids_of<E: EventFamily>(&self) -> Result<EventTypeFilter> {
        let mut ids = Vec::new();
        for &type_name in E::TYPE_NAMES {
            let idx = self
                .by_type
                .get(type_name)
                .copied()
                .ok_or_else(|| DomainError::UnmappedEventType {
                    type_name: type_name.to_string(),
                })?;
            ids.extend(self.entries[idx].known_names());
        }
        Ok(ids.into_iter().collect())
    }

    pub fn entries(&self) -> &[TypeMappingEntry] {
        &self.entries
    }

    fn ensure_unclaimed(&self, identifier: &EventTypeId, type_name: &str) -> Result<()> {
        match self.by_identifier.get(identifier) {
            Some(&idx) if self.entries[idx].type_name != type_name => {
                Err(DomainError::DuplicateEventTypeMapping {
                    identifier: identifier.to_string(),
                    existing: self.entries[idx].type_name.to_string(),
                    requested: type_name.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    fn apply_rule(&mut self, idx: usize, rule: &dyn RenameRule) -> Result<()> {
        let type_name = self.entries[idx].type_name;
        for known in self.entries[idx].known_names() {
            let Some(alias) = rule.historical_name(type_name, &known) else {
                continue;
            };
            if self.by_identifier.contains_key(&alias) {
                self.ensure_unclaimed(&alias, type_name)?;
                continue;
            }
            self.by_identifier.insert(alias.clone(), idx);
            self.entries[idx].aliases.push(alias);
        }
        Ok(())
    }
}
