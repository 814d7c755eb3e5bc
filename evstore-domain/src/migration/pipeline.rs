use std::collections::HashSet;
use std::sync::Arc;

use super::migrator::{Anchor, EventMigration, MigrationContext, MigrationOutcome};
use crate::domain_event::AggregateId;
use crate::error::{DomainError, DomainResult as Result, MigrationFailure};
use crate::event_type::EventTypeRegistry;
use crate::persist::{ReadOrder, StoredEvent, group_by_aggregate, same_history};
use crate::value_object::Version;

/// 迁移管线：按注册顺序对每个聚合的事件流依次应用迁移
///
/// 临时模式（`migrate_aggregate`）与批量模式（`migrate_global`/`migrate_each`）
/// 共用同一条单聚合代码路径，输出逐条一致。
#[derive(Clone)]
pub struct MigrationPipeline {
    registry: Arc<EventTypeRegistry>,
    migrations: Vec<Arc<dyn EventMigration>>,
}

/// 单个聚合的迁移结果
#[derive(Debug, Clone)]
pub struct MigratedAggregate {
    pub aggregate_id: AggregateId,
    pub original: Vec<StoredEvent>,
    pub migrated: Vec<StoredEvent>,
}

impl MigratedAggregate {
    /// 迁移结果与存储内容是否不同（需要持久化）
    pub fn is_changed(&self) -> bool {
        !same_history(&self.original, &self.migrated)
    }
}

impl std::fmt::Debug for MigrationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationPipeline")
            .field(
                "migrations",
                &self.migrations.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl MigrationPipeline {
    /// 构建管线并立即校验：迁移名称唯一、产出类型均可解析
    pub fn new(
        registry: Arc<EventTypeRegistry>,
        migrations: Vec<Arc<dyn EventMigration>>,
    ) -> Result<Self> {
        let mut names = HashSet::new();
        for migration in &migrations {
            if !names.insert(migration.name().to_string()) {
                return Err(DomainError::invalid_configuration(format!(
                    "duplicate migration name: {}",
                    migration.name()
                )));
            }
            for produced in migration.produces() {
                if !registry.is_resolvable(&produced) {
                    return Err(DomainError::invalid_configuration(format!(
                        "migration {} produces unregistered event type {}",
                        migration.name(),
                        produced
                    )));
                }
            }
        }

        Ok(Self {
            registry,
            migrations,
        })
    }

    /// 不含任何迁移的管线（仅做类型规范化与版本编号）
    pub fn empty(registry: Arc<EventTypeRegistry>) -> Self {
        Self {
            registry,
            migrations: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Arc<EventTypeRegistry> {
        &self.registry
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// 临时模式：迁移单个聚合的原始事件流
    ///
    /// 失败时返回 `MigrationFailed`，其中携带未经迁移的原始事件流；
    /// 不会返回部分迁移的结果。
    pub fn migrate_aggregate(&self, mut raw: Vec<StoredEvent>) -> Result<Vec<StoredEvent>> {
        raw.sort_by_key(|e| e.aggregate_version());
        if raw.is_empty() {
            return Ok(raw);
        }
        let aggregate_id = raw[0].aggregate_id();

        let mut events: Vec<StoredEvent> = raw.iter().cloned().map(|e| self.normalize(e)).collect();
        let fallback = match events.last() {
            Some(e) => Anchor::of(e),
            None => return Ok(events),
        };

        for migration in &self.migrations {
            let name = migration.name();
            let stage = Self::run_stage(&**migration, aggregate_id, fallback, events);
            events = match stage {
                Ok(events) => events,
                Err(err) => {
                    tracing::warn!(
                        migration = name,
                        aggregate_id = %aggregate_id,
                        error = %err,
                        "event migration failed"
                    );
                    return Err(MigrationFailure {
                        migration: name.to_string(),
                        aggregate_id,
                        reason: err.to_string(),
                        unmigrated: raw,
                    }
                    .into());
                }
            };
        }

        Self::renumber(&mut events);
        Ok(events)
    }

    /// 批量模式：按聚合分组迁移全局事件流，返回每个聚合的迁移结果
    ///
    /// 输入需按读取位置排序；分组按各聚合首次出现的顺序返回。
    pub fn migrate_each(&self, stream: Vec<StoredEvent>) -> Result<Vec<MigratedAggregate>> {
        group_by_aggregate(stream)
            .into_iter()
            .map(|(aggregate_id, original)| {
                let migrated = self.migrate_aggregate(original.clone())?;
                Ok(MigratedAggregate {
                    aggregate_id,
                    original,
                    migrated,
                })
            })
            .collect()
    }

    /// 批量模式：迁移全局事件流并按有效读取位置合并
    pub fn migrate_global(&self, stream: Vec<StoredEvent>) -> Result<Vec<StoredEvent>> {
        let mut merged: Vec<StoredEvent> = self
            .migrate_each(stream)?
            .into_iter()
            .flat_map(|aggregate| aggregate.migrated)
            .collect();
        merged.sort_by_key(|e| e.effective_read_order());
        Ok(merged)
    }

    // 历史别名统一为当前标识；未知标识保持原样，在反序列化时报错
    fn normalize(&self, mut event: StoredEvent) -> StoredEvent {
        if let Some(current) = self.registry.canonical(event.event_type()) {
            if current != event.event_type() {
                let current = current.clone();
                event.set_event_type(current);
            }
        }
        let read_order = event.effective_read_order();
        event.set_read_order(read_order);
        event
    }

    fn run_stage(
        migration: &dyn EventMigration,
        aggregate_id: AggregateId,
        fallback: Anchor,
        events: Vec<StoredEvent>,
    ) -> Result<Vec<StoredEvent>> {
        let mut migrator = migration.migrator();
        let mut ctx = MigrationContext::new(migration.name(), aggregate_id, fallback);

        for event in events {
            ctx.anchor_at(&event);
            let outcome = migrator.migrate(event, &mut ctx)?;
            ctx.accept(outcome);
        }

        ctx.finish();
        let trailing = migrator.end_of_aggregate(&mut ctx)?;
        ctx.accept(MigrationOutcome::Many(trailing));

        Ok(ctx.into_emitted())
    }

    // 版本自 1 起连续编号；同一 major 内按输出顺序编号 minor
    fn renumber(events: &mut [StoredEvent]) {
        let mut current_major: Option<i64> = None;
        let mut minor = 0;
        for (idx, event) in events.iter_mut().enumerate() {
            event.set_aggregate_version(Version::from_value(idx + 1));
            let major = event.effective_read_order().major;
            if current_major == Some(major) {
                minor += 1;
            } else {
                current_major = Some(major);
                minor = 0;
            }
            event.set_read_order(ReadOrder::new(major, minor));
        }
    }
}
