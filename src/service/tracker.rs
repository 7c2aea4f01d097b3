use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use super::record::Entity;
use crate::bus::{LoadingBus, LoadingEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Fetch,
    Add,
    Remove,
    Filter,
}

/// A tracked facade operation: one per (entity, verb) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    FetchItems,
    AddItem,
    RemoveItem,
    FilterItems,
    FetchUsers,
    AddUser,
    RemoveUser,
    FilterUsers,
}

impl Operation {
    pub const ALL: [Operation; 8] = [
        Operation::FetchItems,
        Operation::AddItem,
        Operation::RemoveItem,
        Operation::FilterItems,
        Operation::FetchUsers,
        Operation::AddUser,
        Operation::RemoveUser,
        Operation::FilterUsers,
    ];

    pub fn new(entity: Entity, verb: Verb) -> Self {
        match (entity, verb) {
            (Entity::Items, Verb::Fetch) => Operation::FetchItems,
            (Entity::Items, Verb::Add) => Operation::AddItem,
            (Entity::Items, Verb::Remove) => Operation::RemoveItem,
            (Entity::Items, Verb::Filter) => Operation::FilterItems,
            (Entity::Users, Verb::Fetch) => Operation::FetchUsers,
            (Entity::Users, Verb::Add) => Operation::AddUser,
            (Entity::Users, Verb::Remove) => Operation::RemoveUser,
            (Entity::Users, Verb::Filter) => Operation::FilterUsers,
        }
    }

    pub fn entity(self) -> Entity {
        match self {
            Operation::FetchItems
            | Operation::AddItem
            | Operation::RemoveItem
            | Operation::FilterItems => Entity::Items,
            _ => Entity::Users,
        }
    }

    pub fn verb(self) -> Verb {
        match self {
            Operation::FetchItems | Operation::FetchUsers => Verb::Fetch,
            Operation::AddItem | Operation::AddUser => Verb::Add,
            Operation::RemoveItem | Operation::RemoveUser => Verb::Remove,
            Operation::FilterItems | Operation::FilterUsers => Verb::Filter,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::FetchItems => "fetchItems",
            Operation::AddItem => "addItem",
            Operation::RemoveItem => "removeItem",
            Operation::FilterItems => "filterItems",
            Operation::FetchUsers => "fetchUsers",
            Operation::AddUser => "addUser",
            Operation::RemoveUser => "removeUser",
            Operation::FilterUsers => "filterUsers",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OperationState {
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Default)]
struct Slot {
    in_flight: usize,
    error: Option<String>,
}

/// Loading and last-error state for every facade operation.
///
/// `loading` is true while at least one call of the operation is in flight.
/// Each start and finish is also published on the [`LoadingBus`].
#[derive(Clone)]
pub struct OperationTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    slots: Mutex<HashMap<Operation, Slot>>,
    bus: LoadingBus,
}

impl OperationTracker {
    pub fn new(bus: LoadingBus) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                slots: Mutex::new(HashMap::new()),
                bus,
            }),
        }
    }

    pub fn loading_bus(&self) -> &LoadingBus {
        &self.inner.bus
    }

    /// Start one call of `operation`. The returned guard ends it on drop.
    pub fn begin(&self, operation: Operation) -> OperationGuard {
        {
            let mut slots = self.inner.slots.lock();
            let slot = slots.entry(operation).or_default();
            slot.in_flight += 1;
            slot.error = None;
        }
        tracing::debug!(%operation, "Operation started");
        self.inner.bus.publish(LoadingEvent {
            entity: operation.entity(),
            operation,
            loading: true,
        });
        OperationGuard {
            tracker: self.clone(),
            operation,
            error: None,
        }
    }

    fn finish(&self, operation: Operation, error: Option<String>) {
        let still_loading = {
            let mut slots = self.inner.slots.lock();
            let slot = slots.entry(operation).or_default();
            slot.in_flight = slot.in_flight.saturating_sub(1);
            if error.is_some() {
                slot.error = error.clone();
            }
            slot.in_flight > 0
        };
        match &error {
            Some(e) => tracing::debug!(%operation, error = %e, "Operation failed"),
            None => tracing::debug!(%operation, "Operation finished"),
        }
        self.inner.bus.publish(LoadingEvent {
            entity: operation.entity(),
            operation,
            loading: still_loading,
        });
    }

    pub fn state(&self, operation: Operation) -> OperationState {
        let slots = self.inner.slots.lock();
        slots
            .get(&operation)
            .map(|s| OperationState {
                loading: s.in_flight > 0,
                error: s.error.clone(),
            })
            .unwrap_or_default()
    }

    pub fn is_loading(&self, operation: Operation) -> bool {
        self.state(operation).loading
    }

    /// Loading flag for every operation.
    pub fn loaders(&self) -> BTreeMap<Operation, bool> {
        let slots = self.inner.slots.lock();
        Operation::ALL
            .iter()
            .map(|op| (*op, slots.get(op).is_some_and(|s| s.in_flight > 0)))
            .collect()
    }

    /// Last error of every operation that currently has one.
    pub fn errors(&self) -> BTreeMap<Operation, String> {
        let slots = self.inner.slots.lock();
        slots
            .iter()
            .filter_map(|(op, s)| s.error.clone().map(|e| (*op, e)))
            .collect()
    }
}

/// In-flight marker for one operation call.
pub struct OperationGuard {
    tracker: OperationTracker,
    operation: Operation,
    error: Option<String>,
}

impl OperationGuard {
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Record the failure reason; it is stored when the guard drops.
    pub fn fail(&mut self, reason: impl fmt::Display) {
        self.error = Some(reason.to_string());
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.tracker.finish(self.operation, self.error.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_roundtrip_entity_verb() {
        for op in Operation::ALL {
            assert_eq!(Operation::new(op.entity(), op.verb()), op);
        }
    }

    #[test]
    fn test_guard_brackets_loading() {
        let tracker = OperationTracker::new(LoadingBus::new());
        assert!(!tracker.is_loading(Operation::AddItem));
        {
            let _guard = tracker.begin(Operation::AddItem);
            assert!(tracker.is_loading(Operation::AddItem));
            assert!(!tracker.is_loading(Operation::AddUser));
        }
        assert!(!tracker.is_loading(Operation::AddItem));
    }

    #[test]
    fn test_overlapping_calls_keep_loading_until_last() {
        let tracker = OperationTracker::new(LoadingBus::new());
        let first = tracker.begin(Operation::FetchItems);
        let second = tracker.begin(Operation::FetchItems);
        drop(first);
        assert!(tracker.is_loading(Operation::FetchItems));
        drop(second);
        assert!(!tracker.is_loading(Operation::FetchItems));
    }

    #[test]
    fn test_error_cleared_on_next_attempt() {
        let tracker = OperationTracker::new(LoadingBus::new());
        {
            let mut guard = tracker.begin(Operation::RemoveUser);
            guard.fail("boom");
        }
        assert_eq!(
            tracker.errors().get(&Operation::RemoveUser).map(String::as_str),
            Some("boom")
        );

        let guard = tracker.begin(Operation::RemoveUser);
        assert!(tracker.state(Operation::RemoveUser).error.is_none());
        drop(guard);
        assert!(tracker.errors().is_empty());
    }

    #[test]
    fn test_events_published_on_begin_and_finish() {
        let bus = LoadingBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let _sub = bus.subscribe(Entity::Items, move |loading, op| s.lock().push((loading, op)));

        let tracker = OperationTracker::new(bus);
        drop(tracker.begin(Operation::FilterItems));

        assert_eq!(
            *seen.lock(),
            vec![(true, Operation::FilterItems), (false, Operation::FilterItems)]
        );
    }
}
