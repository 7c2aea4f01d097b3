use std::sync::Arc;

use super::topic::{Subscription, Topic};
use crate::service::{Entity, Operation};

/// Start or finish of one tracked operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadingEvent {
    pub entity: Entity,
    pub operation: Operation,
    pub loading: bool,
}

/// Per-entity loading signal, so consumers can react to mutations started
/// by someone else.
#[derive(Clone)]
pub struct LoadingBus {
    inner: Arc<LoadingTopics>,
}

struct LoadingTopics {
    items: Topic<LoadingEvent>,
    users: Topic<LoadingEvent>,
}

impl LoadingBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LoadingTopics {
                items: Topic::new("loading.items"),
                users: Topic::new("loading.users"),
            }),
        }
    }

    fn topic(&self, entity: Entity) -> &Topic<LoadingEvent> {
        match entity {
            Entity::Items => &self.inner.items,
            Entity::Users => &self.inner.users,
        }
    }

    pub fn subscribe<F>(&self, entity: Entity, callback: F) -> Subscription
    where
        F: Fn(bool, Operation) + Send + Sync + 'static,
    {
        self.topic(entity)
            .subscribe(move |event: &LoadingEvent| callback(event.loading, event.operation))
    }

    pub fn publish(&self, event: LoadingEvent) -> usize {
        self.topic(event.entity).publish(&event)
    }

    pub fn subscriber_count(&self, entity: Entity) -> usize {
        self.topic(entity).subscriber_count()
    }

    pub fn clear(&self) {
        self.inner.items.clear();
        self.inner.users.clear();
    }
}

impl Default for LoadingBus {
    fn default() -> Self {
        Self::new()
    }
}
