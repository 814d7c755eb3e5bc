//! 内置迁移
//!
//! 覆盖常见的事件流改写：丢弃、改类型、替换、前插与尾部追加。
//! 均对自身输出幂等，可以安全地在已持久化的迁移结果上重复执行。
//!
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use super::migrator::{AggregateMigrator, EventMigration, MigrationContext, MigrationOutcome};
use crate::error::DomainResult as Result;
use crate::event_type::EventTypeId;
use crate::persist::StoredEvent;

/// 由原事件计算新载荷
pub type PayloadFn = Arc<dyn Fn(&StoredEvent) -> Result<Value> + Send + Sync>;

/// 由原事件计算替换事件列表（类型与载荷）
pub type ReplaceFn = Arc<dyn Fn(&StoredEvent) -> Result<Vec<(EventTypeId, Value)>> + Send + Sync>;

/// 丢弃指定类型的事件
#[derive(Debug, Clone)]
pub struct DropEvents {
    name: String,
    types: HashSet<EventTypeId>,
}

impl DropEvents {
    pub fn new<T: Into<EventTypeId>>(
        name: impl Into<String>,
        types: impl IntoIterator<Item = T>,
    ) -> Self {
        Self {
            name: name.into(),
            types: types.into_iter().map(Into::into).collect(),
        }
    }
}

impl EventMigration for DropEvents {
    fn name(&self) -> &str {
        &self.name
    }

    fn migrator(&self) -> Box<dyn AggregateMigrator + '_> {
        Box::new(self)
    }
}

impl AggregateMigrator for &DropEvents {
    fn migrate(&mut self, event: StoredEvent, _ctx: &mut MigrationContext) -> Result<MigrationOutcome> {
        if self.types.contains(event.event_type()) {
            Ok(MigrationOutcome::Drop)
        } else {
            Ok(MigrationOutcome::One(event))
        }
    }
}

/// 改变事件类型（可选同时转换载荷），保留事件身份
#[derive(Clone)]
pub struct RetypeEvents {
    name: String,
    from: EventTypeId,
    to: EventTypeId,
    transform: Option<PayloadFn>,
}

impl RetypeEvents {
    pub fn new(
        name: impl Into<String>,
        from: impl Into<EventTypeId>,
        to: impl Into<EventTypeId>,
    ) -> Self {
        Self {
            name: name.into(),
            from: from.into(),
            to: to.into(),
            transform: None,
        }
    }

    pub fn with_payload(
        mut self,
        transform: impl Fn(&StoredEvent) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }
}

impl EventMigration for RetypeEvents {
    fn name(&self) -> &str {
        &self.name
    }

    fn produces(&self) -> Vec<EventTypeId> {
        vec![self.to.clone()]
    }

    fn migrator(&self) -> Box<dyn AggregateMigrator + '_> {
        Box::new(self)
    }
}

impl AggregateMigrator for &RetypeEvents {
    fn migrate(&mut self, event: StoredEvent, _ctx: &mut MigrationContext) -> Result<MigrationOutcome> {
        if event.event_type() != &self.from {
            return Ok(MigrationOutcome::One(event));
        }
        let payload = match &self.transform {
            Some(transform) => transform(&event)?,
            None => event.payload().clone(),
        };
        Ok(MigrationOutcome::One(event.with_content(self.to.clone(), payload)))
    }
}

/// 以零个或多个新事件替换指定类型的事件
#[derive(Clone)]
pub struct ReplaceEvents {
    name: String,
    target: EventTypeId,
    produces: Vec<EventTypeId>,
    replace: ReplaceFn,
}

impl ReplaceEvents {
    pub fn new<T: Into<EventTypeId>>(
        name: impl Into<String>,
        target: impl Into<EventTypeId>,
        produces: impl IntoIterator<Item = T>,
        replace: impl Fn(&StoredEvent) -> Result<Vec<(EventTypeId, Value)>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            produces: produces.into_iter().map(Into::into).collect(),
            replace: Arc::new(replace),
        }
    }
}

impl EventMigration for ReplaceEvents {
    fn name(&self) -> &str {
        &self.name
    }

    fn produces(&self) -> Vec<EventTypeId> {
        self.produces.clone()
    }

    fn migrator(&self) -> Box<dyn AggregateMigrator + '_> {
        Box::new(self)
    }
}

impl AggregateMigrator for &ReplaceEvents {
    fn migrate(&mut self, event: StoredEvent, ctx: &mut MigrationContext) -> Result<MigrationOutcome> {
        if event.event_type() != &self.target {
            return Ok(MigrationOutcome::One(event));
        }
        let replacements = (self.replace)(&event)?
            .into_iter()
            .map(|(event_type, payload)| ctx.new_event(event_type, payload))
            .collect();
        Ok(MigrationOutcome::Many(replacements))
    }
}

/// 在每个指定类型的事件之前插入一个新事件（已存在时跳过）
#[derive(Clone)]
pub struct InsertBefore {
    name: String,
    target: EventTypeId,
    inserted: EventTypeId,
    payload: PayloadFn,
}

impl InsertBefore {
    pub fn new(
        name: impl Into<String>,
        target: impl Into<EventTypeId>,
        inserted: impl Into<EventTypeId>,
        payload: impl Fn(&StoredEvent) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            inserted: inserted.into(),
            payload: Arc::new(payload),
        }
    }
}

impl EventMigration for InsertBefore {
    fn name(&self) -> &str {
        &self.name
    }

    fn produces(&self) -> Vec<EventTypeId> {
        vec![self.inserted.clone()]
    }

    fn migrator(&self) -> Box<dyn AggregateMigrator + '_> {
        Box::new(self)
    }
}

impl AggregateMigrator for &InsertBefore {
    fn migrate(&mut self, event: StoredEvent, ctx: &mut MigrationContext) -> Result<MigrationOutcome> {
        if event.event_type() != &self.target {
            return Ok(MigrationOutcome::One(event));
        }
        let already_inserted = ctx
            .last_emitted()
            .is_some_and(|prev| prev.event_type() == &self.inserted);
        if already_inserted {
            return Ok(MigrationOutcome::One(event));
        }
        let payload = (self.payload)(&event)?;
        let inserted = ctx.new_event(self.inserted.clone(), payload);
        Ok(MigrationOutcome::Many(vec![inserted, event]))
    }
}

/// 聚合结束时追加一个事件（聚合中已存在该类型时跳过）
#[derive(Debug, Clone)]
pub struct AppendAtEnd {
    name: String,
    event_type: EventTypeId,
    payload: Value,
}

impl AppendAtEnd {
    pub fn new(name: impl Into<String>, event_type: impl Into<EventTypeId>, payload: Value) -> Self {
        Self {
            name: name.into(),
            event_type: event_type.into(),
            payload,
        }
    }
}

impl EventMigration for AppendAtEnd {
    fn name(&self) -> &str {
        &self.name
    }

    fn produces(&self) -> Vec<EventTypeId> {
        vec![self.event_type.clone()]
    }

    fn migrator(&self) -> Box<dyn AggregateMigrator + '_> {
        Box::new(self)
    }
}

impl AggregateMigrator for &AppendAtEnd {
    fn migrate(&mut self, event: StoredEvent, _ctx: &mut MigrationContext) -> Result<MigrationOutcome> {
        Ok(MigrationOutcome::One(event))
    }

    fn end_of_aggregate(&mut self, ctx: &mut MigrationContext) -> Result<Vec<StoredEvent>> {
        let present = ctx
            .emitted()
            .iter()
            .any(|e| e.event_type() == &self.event_type);
        if present || ctx.emitted().is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![ctx.new_event(self.event_type.clone(), self.payload.clone())])
    }
}
