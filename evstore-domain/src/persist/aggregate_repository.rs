//! 聚合仓储
//!
//! 组合事件存储、序列化器与聚合重建：读取历史（已应用临时迁移）后重放为聚合；
//! 保存时提取待提交事件写入存储，存储接受后才清空待提交缓冲。
//!
use async_trait::async_trait;
use bon::Builder;
use std::collections::HashMap;
use std::sync::Arc;

use super::event_store::EventStore;
use super::stored_event::StoredEvent;
use crate::aggregate::{Aggregate, AggregateCore};
use crate::clock::Clock;
use crate::domain_event::{AggregateEvents, AggregateId};
use crate::error::{DomainError, DomainResult as Result};
use crate::serializer::EventSerializer;
use crate::value_object::Version;

#[async_trait]
pub trait AggregateRepository<A>: Send + Sync
where
    A: Aggregate,
{
    /// 读取聚合；不存在时返回 `AggregateNotFound`
    async fn get(&self, aggregate_id: AggregateId) -> Result<A>;

    async fn try_get(&self, aggregate_id: AggregateId) -> Result<Option<A>>;

    /// 保存新聚合；待提交事件中必须包含版本 1 的事件
    async fn add(&self, aggregate: &mut A) -> Result<()>;

    /// 保存已有聚合的待提交事件；没有待提交事件时不做任何事
    async fn save(&self, aggregate: &mut A) -> Result<()>;

    /// 仅重放到指定版本（含）
    async fn get_version(&self, aggregate_id: AggregateId, version: Version) -> Result<A>;

    async fn get_history(&self, aggregate_id: AggregateId) -> Result<AggregateEvents<A::Event>>;
}

#[async_trait]
impl<A, T> AggregateRepository<A> for Arc<T>
where
    A: Aggregate,
    T: AggregateRepository<A> + ?Sized,
{
    async fn get(&self, aggregate_id: AggregateId) -> Result<A> {
        (**self).get(aggregate_id).await
    }

    async fn try_get(&self, aggregate_id: AggregateId) -> Result<Option<A>> {
        (**self).try_get(aggregate_id).await
    }

    async fn add(&self, aggregate: &mut A) -> Result<()> {
        (**self).add(aggregate).await
    }

    async fn save(&self, aggregate: &mut A) -> Result<()> {
        (**self).save(aggregate).await
    }

    async fn get_version(&self, aggregate_id: AggregateId, version: Version) -> Result<A> {
        (**self).get_version(aggregate_id, version).await
    }

    async fn get_history(&self, aggregate_id: AggregateId) -> Result<AggregateEvents<A::Event>> {
        (**self).get_history(aggregate_id).await
    }
}

/// 仓储配置
#[derive(Debug, Clone, Builder)]
pub struct RepositoryConfig {
    /// 全量加载时每批读取的事件数
    #[builder(default = 1000)]
    stream_batch_size: usize,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RepositoryConfig {
    pub fn stream_batch_size(&self) -> usize {
        self.stream_batch_size
    }
}

/// 基于事件存储的通用聚合仓储实现
pub struct EventSourcedRepository<S> {
    store: Arc<S>,
    serializer: EventSerializer,
    clock: Arc<dyn Clock>,
    config: RepositoryConfig,
}

impl<S> EventSourcedRepository<S>
where
    S: EventStore,
{
    pub fn new(store: Arc<S>, serializer: EventSerializer, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            serializer,
            clock,
            config: RepositoryConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RepositoryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn serializer(&self) -> &EventSerializer {
        &self.serializer
    }

    /// 启动期校验：聚合事件家族的全部类型都已注册
    pub fn ensure_mapped<A: Aggregate>(&self) -> Result<()> {
        self.serializer.registry().ensure_family_mapped::<A::Event>()
    }

    /// 按创建顺序加载某类聚合的全部实例（分批读取全局事件流）
    pub async fn load_all<A: Aggregate>(&self) -> Result<Vec<A>> {
        let filter = self.serializer.registry().type_ids_of::<A::Event>()?;

        let mut order: Vec<AggregateId> = Vec::new();
        let mut histories: HashMap<AggregateId, Vec<StoredEvent>> = HashMap::new();
        let mut collect = |batch: Vec<StoredEvent>| -> Result<()> {
            for event in batch {
                if !filter.contains(event.event_type()) {
                    continue;
                }
                let id = event.aggregate_id();
                histories
                    .entry(id)
                    .or_insert_with(|| {
                        order.push(id);
                        Vec::new()
                    })
                    .push(event);
            }
            Ok(())
        };
        self.store
            .stream_events(self.config.stream_batch_size(), &mut collect)
            .await?;

        order
            .into_iter()
            .filter_map(|id| histories.remove(&id).map(|events| (id, events)))
            .map(|(id, mut events)| {
                events.sort_by_key(|e| e.aggregate_version());
                self.replay::<A>(id, &events, None)
            })
            .collect()
    }

    fn history_of<A: Aggregate>(&self, events: &[StoredEvent]) -> Result<AggregateEvents<A::Event>> {
        Ok(AggregateEvents::new(
            self.serializer.deserialize_events::<A::Event>(events)?,
        ))
    }

    fn replay<A: Aggregate>(
        &self,
        aggregate_id: AggregateId,
        events: &[StoredEvent],
        up_to: Option<Version>,
    ) -> Result<A> {
        let mut history = self.history_of::<A>(events)?;
        if let Some(version) = up_to {
            history = history.up_to(version);
        }
        let mut aggregate = A::with_core(AggregateCore::new(aggregate_id, self.clock.clone()));
        aggregate.load_from_history(&history)?;
        Ok(aggregate)
    }

    async fn persist_pending<A: Aggregate>(&self, aggregate: &mut A) -> Result<()> {
        let stored = self
            .serializer
            .serialize_events(aggregate.pending_events())?;
        let count = stored.len();

        let committed = self.store.save_events(stored).await?;
        let version = committed.get(aggregate.id()).unwrap_or(aggregate.version());
        aggregate.core_mut().mark_committed(version);

        tracing::debug!(
            aggregate_type = A::TYPE,
            aggregate_id = %aggregate.id(),
            version = aggregate.version().value(),
            events = count,
            "aggregate saved"
        );
        Ok(())
    }
}

#[async_trait]
impl<A, S> AggregateRepository<A> for EventSourcedRepository<S>
where
    A: Aggregate,
    S: EventStore,
{
    async fn get(&self, aggregate_id: AggregateId) -> Result<A> {
        AggregateRepository::<A>::try_get(self, aggregate_id)
            .await?
            .ok_or(DomainError::AggregateNotFound { aggregate_id })
    }

    async fn try_get(&self, aggregate_id: AggregateId) -> Result<Option<A>> {
        let events = self.store.get_aggregate_history(aggregate_id).await?;
        if events.is_empty() {
            return Ok(None);
        }
        self.replay::<A>(aggregate_id, &events, None).map(Some)
    }

    async fn add(&self, aggregate: &mut A) -> Result<()> {
        let has_creation = aggregate
            .pending_events()
            .first()
            .is_some_and(|e| e.metadata.aggregate_version() == Version::from_value(1));
        if !has_creation {
            return Err(DomainError::EmptyAggregateSave {
                aggregate_id: aggregate.id(),
            });
        }
        self.persist_pending(aggregate).await
    }

    async fn save(&self, aggregate: &mut A) -> Result<()> {
        if aggregate.version().is_new() {
            return Err(DomainError::EmptyAggregateSave {
                aggregate_id: aggregate.id(),
            });
        }
        if aggregate.pending_events().is_empty() {
            return Ok(());
        }
        self.persist_pending(aggregate).await
    }

    async fn get_version(&self, aggregate_id: AggregateId, version: Version) -> Result<A> {
        let events = self.store.get_aggregate_history(aggregate_id).await?;
        if events.is_empty() {
            return Err(DomainError::AggregateNotFound { aggregate_id });
        }
        self.replay::<A>(aggregate_id, &events, Some(version))
    }

    async fn get_history(&self, aggregate_id: AggregateId) -> Result<AggregateEvents<A::Event>> {
        let events = self.store.get_aggregate_history(aggregate_id).await?;
        self.history_of::<A>(&events)
    }
}
