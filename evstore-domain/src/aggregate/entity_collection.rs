use std::collections::HashMap;
use std::fmt::{self, Display};
use std::hash::Hash;
use std::marker::PhantomData;

use super::dispatcher::EventDispatcher;
use crate::domain_event::EventFamily;
use crate::error::{DomainError, DomainResult as Result};

/// 聚合内的子实体
///
/// 子实体只能由创建事件实例化（`created_by`），其余事件通过 `target_of` 路由到
/// 对应实体；子实体自身的分发表可以继续嵌套下一级集合。
pub trait ChildEntity<E>: Sized + Send + Sync + 'static
where
    E: EventFamily,
{
    type Id: Clone + Eq + Hash + Display + Send + Sync + 'static;

    /// 若事件创建一个子实体，返回其 ID
    fn created_by(event: &E) -> Option<Self::Id>;

    /// 若事件作用于某个已存在的子实体，返回其 ID
    fn target_of(event: &E) -> Option<Self::Id>;

    /// 实例化子实体；`EntityCreation` 只由集合在处理创建事件时发放
    fn create(id: Self::Id, token: EntityCreation) -> Self;

    fn event_dispatcher() -> &'static EventDispatcher<Self, E>;
}

/// 子实体的构造凭证
///
/// 无法在本 crate 之外构造，子实体因此只能经由创建事件实例化。
#[derive(Debug)]
pub struct EntityCreation {
    _private: (),
}

impl EntityCreation {
    fn new() -> Self {
        Self { _private: () }
    }
}

/// 子实体集合，保持创建顺序
pub struct EntityCollection<E, C>
where
    E: EventFamily,
    C: ChildEntity<E>,
{
    entities: Vec<C>,
    index: HashMap<C::Id, usize>,
    _family: PhantomData<fn() -> E>,
}

impl<E, C> Default for EntityCollection<E, C>
where
    E: EventFamily,
    C: ChildEntity<E>,
{
    fn default() -> Self {
        Self {
            entities: Vec::new(),
            index: HashMap::new(),
            _family: PhantomData,
        }
    }
}

impl<E, C> Clone for EntityCollection<E, C>
where
    E: EventFamily,
    C: ChildEntity<E> + Clone,
{
    fn clone(&self) -> Self {
        Self {
            entities: self.entities.clone(),
            index: self.index.clone(),
            _family: PhantomData,
        }
    }
}

impl<E, C> fmt::Debug for EntityCollection<E, C>
where
    E: EventFamily,
    C: ChildEntity<E> + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entities.iter()).finish()
    }
}

impl<E, C> EntityCollection<E, C>
where
    E: EventFamily,
    C: ChildEntity<E>,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &C::Id) -> Option<&C> {
        self.index.get(id).map(|&idx| &self.entities[idx])
    }

    pub fn contains(&self, id: &C::Id) -> bool {
        self.index.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &C> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// 检查事件能否被路由并处理，不修改集合
    pub(crate) fn check(&mut self, event: &E) -> Result<bool> {
        if let Some(id) = C::created_by(event) {
            if self.index.contains_key(&id) {
                return Err(DomainError::DuplicateEntity {
                    entity_id: id.to_string(),
                });
            }
            let mut entity = C::create(id, EntityCreation::new());
            C::event_dispatcher().check(&mut entity, event)?;
            return Ok(true);
        }

        if let Some(id) = C::target_of(event) {
            let idx = self.position(&id)?;
            C::event_dispatcher().check(&mut self.entities[idx], event)?;
            return Ok(true);
        }

        Ok(false)
    }

    pub(crate) fn route(&mut self, event: &E) -> Result<bool> {
        if let Some(id) = C::created_by(event) {
            if self.index.contains_key(&id) {
                return Err(DomainError::DuplicateEntity {
                    entity_id: id.to_string(),
                });
            }
            let mut entity = C::create(id.clone(), EntityCreation::new());
            C::event_dispatcher().dispatch(&mut entity, event)?;
            self.index.insert(id, self.entities.len());
            self.entities.push(entity);
            return Ok(true);
        }

        if let Some(id) = C::target_of(event) {
            let idx = self.position(&id)?;
            C::event_dispatcher().dispatch(&mut self.entities[idx], event)?;
            return Ok(true);
        }

        Ok(false)
    }

    fn position(&self, id: &C::Id) -> Result<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| DomainError::EntityNotFound {
                entity_id: id.to_string(),
            })
    }
}
