use async_trait::async_trait;
use std::collections::HashMap;

use super::stored_event::StoredEvent;
use crate::domain_event::{AggregateId, EventId};
use crate::error::{DomainError, DomainResult as Result};
use crate::event_type::EventTypeFilter;
use crate::migration::MigrationPipeline;
use crate::value_object::Version;

/// 批量投递回调
pub type BatchHandler<'a> = dyn FnMut(Vec<StoredEvent>) -> Result<()> + Send + 'a;

/// 事件存储
///
/// 写入使用“有效版本”（迁移后的版本）：一批事件中每个聚合的首个新版本必须等于
/// 该聚合迁移后的事件数 + 1，否则返回 `ConcurrencyConflict`。读取默认应用临时迁移。
#[async_trait]
pub trait EventStore: Send + Sync {
    /// 追加事件；整批原子提交，按调用顺序分配递增的写入序号
    ///
    /// 返回写入后各聚合的有效版本。读取时的迁移可能在新事件之间插入事件，
    /// 调用方应以此作为聚合的当前版本。
    async fn save_events(&self, events: Vec<StoredEvent>) -> Result<CommittedVersions>;

    /// 按版本排序的聚合历史（已应用迁移）
    async fn get_aggregate_history(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>>;

    /// 未经迁移的原始聚合历史（运维/诊断用）
    async fn get_raw_aggregate_history(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>>;

    /// 按读取位置分批投递全部历史（已应用迁移）
    ///
    /// 迁移需要每个聚合的完整事件流，实现会先读出全部事件再迁移；
    /// `batch_size` 只决定回调粒度，不限制内存占用。
    async fn stream_events(&self, batch_size: usize, handler: &mut BatchHandler<'_>) -> Result<()>;

    /// 按最早（匹配）事件时间排序的聚合 ID；可按事件类型过滤
    async fn stream_aggregate_ids_in_creation_order(
        &self,
        filter: Option<&EventTypeFilter>,
    ) -> Result<Vec<AggregateId>>;

    /// 永久删除聚合的全部事件（测试/重置工具使用）
    async fn delete_events(&self, aggregate_id: AggregateId) -> Result<()>;

    /// 以批量模式运行迁移并持久化结果；失败时存储保持原状
    async fn persist_migrations(&self) -> Result<MigrationReport>;
}

/// 迁移持久化报告
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub aggregates_scanned: usize,
    pub aggregates_rewritten: usize,
    pub events_written: usize,
}

/// 一次写入涉及的各聚合在提交后的有效版本
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommittedVersions {
    versions: HashMap<AggregateId, Version>,
}

impl CommittedVersions {
    pub fn get(&self, aggregate_id: AggregateId) -> Option<Version> {
        self.versions.get(&aggregate_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AggregateId, Version)> + '_ {
        self.versions.iter().map(|(id, version)| (*id, *version))
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

}

/// 单个聚合的版本规划
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VersionPlan {
    /// 与新事件一一对应的存储版本
    pub(crate) stored: Vec<Version>,
    /// 写入后的有效版本
    pub(crate) effective_after: Version,
}

/// 将有效版本换算为存储版本
///
/// `raw` 为聚合当前的原始历史。存储版本在原始最大版本之后连续递增，
/// 数据库唯一约束仍可检测并发写入。
pub(crate) fn plan_versions(
    pipeline: &MigrationPipeline,
    aggregate_id: AggregateId,
    raw: Vec<StoredEvent>,
    incoming: &[StoredEvent],
) -> Result<VersionPlan> {
    let raw_max = raw
        .iter()
        .map(|e| e.aggregate_version().value())
        .max()
        .unwrap_or(0);
    let effective = if pipeline.is_empty() {
        raw.len()
    } else {
        pipeline.migrate_aggregate(raw.clone())?.len()
    };

    let stored = incoming
        .iter()
        .enumerate()
        .map(|(k, event)| {
            let requested = event.aggregate_version().value();
            if requested != effective + k + 1 {
                return Err(DomainError::ConcurrencyConflict {
                    aggregate_id,
                    expected: requested.saturating_sub(1),
                    actual: effective + k,
                });
            }
            Ok(Version::from_value(raw_max + k + 1))
        })
        .collect::<Result<Vec<Version>>>()?;

    let effective_after = if pipeline.is_empty() {
        effective + incoming.len()
    } else {
        let mut after = raw;
        after.extend(incoming.iter().zip(&stored).map(|(event, version)| {
            let mut event = event.clone();
            event.set_aggregate_version(*version);
            event.set_insertion_order(None);
            event.clear_read_order();
            event
        }));
        pipeline.migrate_aggregate(after)?.len()
    };

    Ok(VersionPlan {
        stored,
        effective_after: Version::from_value(effective_after),
    })
}

/// 整批写入的版本规划：按事件 ID 查存储版本，并汇总提交后的有效版本
#[derive(Debug, Default)]
pub(crate) struct BatchPlan {
    stored: HashMap<EventId, Version>,
    committed: CommittedVersions,
}

impl BatchPlan {
    pub(crate) fn add(
        &mut self,
        pipeline: &MigrationPipeline,
        aggregate_id: AggregateId,
        raw: Vec<StoredEvent>,
        incoming: &[StoredEvent],
    ) -> Result<()> {
        let plan = plan_versions(pipeline, aggregate_id, raw, incoming)?;
        self.stored
            .extend(incoming.iter().map(|e| e.event_id()).zip(plan.stored));
        self.committed
            .versions
            .insert(aggregate_id, plan.effective_after);
        Ok(())
    }

    /// 规划中缺失的事件说明分组与规划不一致，整批拒绝
    pub(crate) fn stored_version(&self, event: &StoredEvent) -> Result<Version> {
        self.stored
            .get(&event.event_id())
            .copied()
            .ok_or_else(|| DomainError::Internal {
                reason: format!("event {} missing from version plan", event.event_id()),
            })
    }

    pub(crate) fn into_committed(self) -> CommittedVersions {
        self.committed
    }
}

/// 以固定批大小投递事件
pub(crate) fn deliver_in_batches(
    events: Vec<StoredEvent>,
    batch_size: usize,
    handler: &mut BatchHandler<'_>,
) -> Result<()> {
    if batch_size == 0 {
        return Err(DomainError::invalid_configuration(
            "stream batch size must be greater than zero",
        ));
    }
    let mut events = events.into_iter().peekable();
    while events.peek().is_some() {
        let batch: Vec<StoredEvent> = events.by_ref().take(batch_size).collect();
        handler(batch)?;
    }
    Ok(())
}
