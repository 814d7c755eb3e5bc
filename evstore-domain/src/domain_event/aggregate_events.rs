use chrono::{DateTime, Utc};
use std::ops::Deref;
use std::slice::Iter;
use std::vec::IntoIter;

use super::event_envelope::EventEnvelope;
use super::event_family::EventFamily;
use crate::value_object::Version;

/// 聚合事件集合，按聚合版本顺序排列，便于获取创建/修改时间等信息
#[derive(Debug, Clone)]
pub struct AggregateEvents<E>
where
    E: EventFamily,
{
    events: Vec<EventEnvelope<E>>,
}

impl<E> AggregateEvents<E>
where
    E: EventFamily,
{
    pub fn new(events: Vec<EventEnvelope<E>>) -> Self {
        Self { events }
    }

    /// 获取创建时间（第一个事件的发生时间）
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.events.first().map(|e| *e.metadata.occurred_at())
    }

    /// 获取最后修改时间（最后一个事件的发生时间）
    pub fn last_modified_at(&self) -> Option<DateTime<Utc>> {
        self.events.last().map(|e| *e.metadata.occurred_at())
    }

    /// 最新版本（空集合为初始版本）
    pub fn version(&self) -> Version {
        self.events
            .last()
            .map(|e| e.metadata.aggregate_version())
            .unwrap_or_default()
    }

    /// 获取事件列表的不可变引用
    pub fn events(&self) -> &[EventEnvelope<E>] {
        &self.events
    }

    /// 截断到指定版本（含）
    pub fn up_to(mut self, version: Version) -> Self {
        self.events
            .retain(|e| e.metadata.aggregate_version() <= version);
        self
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// 迭代事件引用（不消费 AggregateEvents）
    pub fn iter(&self) -> Iter<'_, EventEnvelope<E>> {
        self.events.iter()
    }
}

impl<E> IntoIterator for AggregateEvents<E>
where
    E: EventFamily,
{
    type Item = EventEnvelope<E>;
    type IntoIter = IntoIter<EventEnvelope<E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl<'a, E> IntoIterator for &'a AggregateEvents<E>
where
    E: EventFamily,
{
    type Item = &'a EventEnvelope<E>;
    type IntoIter = Iter<'a, EventEnvelope<E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

impl<E> Deref for AggregateEvents<E>
where
    E: EventFamily,
{
    type Target = [EventEnvelope<E>];

    fn deref(&self) -> &Self::Target {
        &self.events
    }
}
