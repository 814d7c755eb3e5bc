use std::fmt;
use std::sync::Arc;

use super::dispatcher::EventDispatcher;
use crate::clock::{Clock, SystemClock};
use crate::domain_event::{AggregateId, EventEnvelope, EventFamily};
use crate::error::{DomainError, DomainResult as Result};
use crate::value_object::Version;

/// 聚合公共状态：标识、版本、待提交事件与时间源
#[derive(Clone)]
pub struct AggregateCore<E>
where
    E: EventFamily,
{
    id: AggregateId,
    version: Version,
    pending: Vec<EventEnvelope<E>>,
    clock: Arc<dyn Clock>,
}

impl<E> AggregateCore<E>
where
    E: EventFamily,
{
    pub fn new(id: AggregateId, clock: Arc<dyn Clock>) -> Self {
        Self {
            id,
            version: Version::new(),
            pending: Vec::new(),
            clock,
        }
    }

    /// 使用系统时钟
    pub fn with_system_clock(id: AggregateId) -> Self {
        Self::new(id, Arc::new(SystemClock))
    }

    pub fn id(&self) -> AggregateId {
        self.id
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn pending_events(&self) -> &[EventEnvelope<E>] {
        &self.pending
    }

    /// 存储接受后清空待提交缓冲，并采用存储报告的有效版本
    ///
    /// 迁移可能在写入的事件之间插入事件，有效版本因此可能大于本地计数。
    pub fn mark_committed(&mut self, version: Version) {
        self.pending.clear();
        self.version = version;
    }
}

impl<E> fmt::Debug for AggregateCore<E>
where
    E: EventFamily,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateCore")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// 聚合根接口
///
/// 实现者持有一个 `AggregateCore` 并提供静态分发表；其余行为由默认方法提供。
pub trait Aggregate: Sized + Send + Sync + 'static {
    const TYPE: &'static str;

    /// 该聚合可应用/产生的事件家族
    type Event: EventFamily;

    /// 以公共状态构造空聚合（版本 0）
    fn with_core(core: AggregateCore<Self::Event>) -> Self;

    fn core(&self) -> &AggregateCore<Self::Event>;

    fn core_mut(&mut self) -> &mut AggregateCore<Self::Event>;

    /// 静态分发表（通常以 `OnceLock` 构建一次）
    fn event_dispatcher() -> &'static EventDispatcher<Self, Self::Event>;

    fn create(id: AggregateId, clock: Arc<dyn Clock>) -> Self {
        Self::with_core(AggregateCore::new(id, clock))
    }

    fn id(&self) -> AggregateId {
        self.core().id()
    }

    fn version(&self) -> Version {
        self.core().version()
    }

    fn pending_events(&self) -> &[EventEnvelope<Self::Event>] {
        self.core().pending_events()
    }

    /// 产生新事件：分配下一版本、立即应用到自身、放入待提交缓冲
    ///
    /// 应用失败时聚合版本与缓冲保持不变。
    fn raise(&mut self, event: impl Into<Self::Event>) -> Result<()> {
        let event = event.into();
        let previous = self.version();
        let version = previous.next();
        let occurred_at = self.core().clock().now();

        self.core_mut().version = version;
        if let Err(err) = Self::event_dispatcher().dispatch(self, &event) {
            self.core_mut().version = previous;
            return Err(err);
        }

        let envelope = EventEnvelope::new(self.id(), version, occurred_at, event);
        self.core_mut().pending.push(envelope);
        Ok(())
    }

    /// 按版本顺序重放历史事件
    fn load_from_history<'a, I>(&mut self, history: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a EventEnvelope<Self::Event>>,
    {
        for envelope in history {
            let expected = self.version().next();
            let found = envelope.metadata.aggregate_version();
            if found != expected {
                return Err(DomainError::VersionMismatch {
                    aggregate_id: self.id(),
                    expected: expected.value(),
                    found: found.value(),
                });
            }
            self.core_mut().version = found;
            Self::event_dispatcher().dispatch(self, &envelope.payload)?;
        }
        Ok(())
    }
}
