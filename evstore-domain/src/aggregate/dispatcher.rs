use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::entity_collection::{ChildEntity, EntityCollection};
use crate::domain_event::{EventFamily, FamilyMember};
use crate::error::{DomainError, DomainResult as Result};

// accepts 只判断是否命中并校验子实体路由，不修改状态
struct Handler<S, E> {
    accepts: Box<dyn Fn(&mut S, &E) -> Result<bool> + Send + Sync>,
    apply: Box<dyn Fn(&mut S, &E) -> Result<()> + Send + Sync>,
}

/// 事件分发表
///
/// 同一事件依次执行 before 钩子、主处理器、after 钩子，各类别内按注册顺序。
/// 没有任何处理器命中且未被忽略时返回 `UnhandledEvent`。
///
/// 分发分两步：先检查所有处理器（含子实体的创建与路由），全部通过后才执行；
/// 失败的事件不会留下执行了一半的状态。
pub struct EventDispatcher<S, E>
where
    E: EventFamily,
{
    before: Vec<Handler<S, E>>,
    primary: Vec<Handler<S, E>>,
    after: Vec<Handler<S, E>>,
    ignored: HashSet<&'static str>,
    ignore_unhandled: bool,
}

impl<S, E> Default for EventDispatcher<S, E>
where
    E: EventFamily,
{
    fn default() -> Self {
        Self {
            before: Vec::new(),
            primary: Vec::new(),
            after: Vec::new(),
            ignored: HashSet::new(),
            ignore_unhandled: false,
        }
    }
}

impl<S, E> fmt::Debug for EventDispatcher<S, E>
where
    E: EventFamily,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("before", &self.before.len())
            .field("primary", &self.primary.len())
            .field("after", &self.after.len())
            .field("ignored", &self.ignored)
            .field("ignore_unhandled", &self.ignore_unhandled)
            .finish()
    }
}

impl<S, E> EventDispatcher<S, E>
where
    S: 'static,
    E: EventFamily,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// 具体事件类型的主处理器
    pub fn on<T>(mut self, handler: impl Fn(&mut S, &T) + Send + Sync + 'static) -> Self
    where
        T: FamilyMember<E>,
    {
        self.primary.push(member_handler(handler));
        self
    }

    pub fn before<T>(mut self, handler: impl Fn(&mut S, &T) + Send + Sync + 'static) -> Self
    where
        T: FamilyMember<E>,
    {
        self.before.push(member_handler(handler));
        self
    }

    pub fn after<T>(mut self, handler: impl Fn(&mut S, &T) + Send + Sync + 'static) -> Self
    where
        T: FamilyMember<E>,
    {
        self.after.push(member_handler(handler));
        self
    }

    /// “接口”处理器：`selector` 从事件中选出实现某一能力的视图（如 `&dyn Trait`），
    /// 可匹配家族中任意多个事件类型
    pub fn on_matching<T>(
        mut self,
        selector: impl for<'a> Fn(&'a E) -> Option<&'a T> + Send + Sync + 'static,
        handler: impl Fn(&mut S, &T) + Send + Sync + 'static,
    ) -> Self
    where
        T: ?Sized + 'static,
    {
        self.primary.push(matching_handler(selector, handler));
        self
    }

    pub fn before_matching<T>(
        mut self,
        selector: impl for<'a> Fn(&'a E) -> Option<&'a T> + Send + Sync + 'static,
        handler: impl Fn(&mut S, &T) + Send + Sync + 'static,
    ) -> Self
    where
        T: ?Sized + 'static,
    {
        self.before.push(matching_handler(selector, handler));
        self
    }

    pub fn after_matching<T>(
        mut self,
        selector: impl for<'a> Fn(&'a E) -> Option<&'a T> + Send + Sync + 'static,
        handler: impl Fn(&mut S, &T) + Send + Sync + 'static,
    ) -> Self
    where
        T: ?Sized + 'static,
    {
        self.after.push(matching_handler(selector, handler));
        self
    }

    /// 嵌套子实体集合：创建事件实例化子实体，其余事件按实体 ID 路由
    pub fn entities<C>(
        mut self,
        accessor: impl Fn(&mut S) -> &mut EntityCollection<E, C> + Send + Sync + 'static,
    ) -> Self
    where
        C: ChildEntity<E>,
    {
        let accessor = Arc::new(accessor);
        let checking = Arc::clone(&accessor);
        self.primary.push(Handler {
            accepts: Box::new(move |state, event| (*checking)(state).check(event)),
            apply: Box::new(move |state, event| (*accessor)(state).route(event).map(drop)),
        });
        self
    }

    /// 显式忽略某一事件类型
    pub fn ignore<T>(mut self) -> Self
    where
        T: FamilyMember<E>,
    {
        self.ignored.insert(T::TYPE_NAME);
        self
    }

    /// 忽略所有未处理的事件
    pub fn ignore_unhandled(mut self) -> Self {
        self.ignore_unhandled = true;
        self
    }

    pub fn dispatch(&self, state: &mut S, event: &E) -> Result<()> {
        if !self.check(state, event)? {
            return Ok(());
        }
        for handler in self.handlers() {
            (handler.apply)(state, event)?;
        }
        Ok(())
    }

    /// 事件是否可被完整处理：命中返回 `true`，被忽略返回 `false`
    pub(crate) fn check(&self, state: &mut S, event: &E) -> Result<bool> {
        let mut handled = false;
        for handler in self.handlers() {
            handled |= (handler.accepts)(state, event)?;
        }
        if handled {
            return Ok(true);
        }

        if self.ignore_unhandled || self.ignored.contains(event.type_name()) {
            tracing::trace!(
                target_type = std::any::type_name::<S>(),
                event_type = event.type_name(),
                "event ignored"
            );
            return Ok(false);
        }

        Err(DomainError::UnhandledEvent {
            aggregate_type: std::any::type_name::<S>().to_string(),
            event_type: event.type_name().to_string(),
        })
    }

    fn handlers(&self) -> impl Iterator<Item = &Handler<S, E>> {
        self.before.iter().chain(&self.primary).chain(&self.after)
    }
}

fn member_handler<S, E, T>(handler: impl Fn(&mut S, &T) + Send + Sync + 'static) -> Handler<S, E>
where
    S: 'static,
    E: EventFamily,
    T: FamilyMember<E>,
{
    Handler {
        accepts: Box::new(|_, event| Ok(T::select(event).is_some())),
        apply: Box::new(move |state, event| {
            if let Some(member) = T::select(event) {
                handler(state, member);
            }
            Ok(())
        }),
    }
}

fn matching_handler<S, E, T>(
    selector: impl for<'a> Fn(&'a E) -> Option<&'a T> + Send + Sync + 'static,
    handler: impl Fn(&mut S, &T) + Send + Sync + 'static,
) -> Handler<S, E>
where
    S: 'static,
    E: EventFamily,
    T: ?Sized + 'static,
{
    let selector = Arc::new(selector);
    let checking = Arc::clone(&selector);
    Handler {
        accepts: Box::new(move |_, event| Ok((*checking)(event).is_some())),
        apply: Box::new(move |state, event| {
            if let Some(view) = (*selector)(event) {
                handler(state, view);
            }
            Ok(())
        }),
    }
}
