use std::collections::BTreeSet;

use super::identifier::EventTypeId;

/// 事件基类型过滤器：持有某一事件家族全部当前与历史标识
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventTypeFilter {
    ids: BTreeSet<EventTypeId>,
}

impl EventTypeFilter {
    pub fn contains(&self, id: &EventTypeId) -> bool {
        self.ids.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventTypeId> {
        self.ids.iter()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<EventTypeId> for EventTypeFilter {
    fn from_iter<I: IntoIterator<Item = EventTypeId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}
