use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::error::ServiceError;
use super::record::{Draft, Entity, Record, RecordId};
use super::store::BackingStore;
use super::tracker::{Operation, OperationTracker, Verb};
use crate::bus::{
    Category, DataChange, DataChangeBus, LoadingBus, NotificationSummary, Subscription,
};

/// How mutations reach subscribers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsistencyMode {
    /// Broadcast only the authoritative list re-read after the mutation.
    #[default]
    Refetch,
    /// Patch and broadcast the local snapshot first, then refetch.
    Optimistic,
}

impl FromStr for ConsistencyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "refetch" => Ok(ConsistencyMode::Refetch),
            "optimistic" => Ok(ConsistencyMode::Optimistic),
            other => Err(format!(
                "unknown consistency mode '{}', expected 'refetch' or 'optimistic'",
                other
            )),
        }
    }
}

impl fmt::Display for ConsistencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyMode::Refetch => f.write_str("refetch"),
            ConsistencyMode::Optimistic => f.write_str("optimistic"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServiceSettings {
    pub consistency: ConsistencyMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Pending,
    Ready,
    Unmounted,
}

/// Handle to the shared service facade.
///
/// Every clone refers to the same facade; compare handles with
/// [`ServiceApi::ptr_eq`]. All store access and all broadcasts of
/// authoritative data go through here.
#[derive(Clone)]
pub struct ServiceApi {
    inner: Arc<ApiInner>,
}

struct ApiInner {
    store: Arc<dyn BackingStore>,
    bus: DataChangeBus,
    tracker: OperationTracker,
    settings: ServiceSettings,
    readiness: watch::Sender<Readiness>,
    snapshots: Mutex<HashMap<Entity, Vec<Record>>>,
}

impl ServiceApi {
    /// Create a facade in the `Pending` state.
    pub fn new(store: Arc<dyn BackingStore>, bus: DataChangeBus, settings: ServiceSettings) -> Self {
        let (readiness, _) = watch::channel(Readiness::Pending);
        Self {
            inner: Arc::new(ApiInner {
                store,
                bus,
                tracker: OperationTracker::new(LoadingBus::new()),
                settings,
                readiness,
                snapshots: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn ptr_eq(&self, other: &ServiceApi) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn consistency(&self) -> ConsistencyMode {
        self.inner.settings.consistency
    }

    pub fn bus(&self) -> &DataChangeBus {
        &self.inner.bus
    }

    // -- readiness --

    /// Move `Pending` to `Ready`. Has no effect once unmounted.
    pub(crate) fn mark_ready(&self) -> bool {
        let changed = self.inner.readiness.send_if_modified(|state| {
            if *state == Readiness::Pending {
                *state = Readiness::Ready;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::info!(consistency = %self.consistency(), "Service facade ready");
        }
        changed
    }

    pub fn readiness(&self) -> Readiness {
        *self.inner.readiness.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.readiness() == Readiness::Ready
    }

    pub fn subscribe_readiness(&self) -> watch::Receiver<Readiness> {
        self.inner.readiness.subscribe()
    }

    /// Wait until the facade is ready.
    pub async fn ready(&self) -> Result<(), ServiceError> {
        let mut rx = self.inner.readiness.subscribe();
        let state = rx
            .wait_for(|s| *s != Readiness::Pending)
            .await
            .map(|s| *s)
            .unwrap_or(Readiness::Unmounted);
        match state {
            Readiness::Ready => Ok(()),
            _ => Err(ServiceError::Unmounted),
        }
    }

    /// Shut the facade down. Later operations fail with `Unmounted`.
    pub fn unmount(&self) {
        let changed = self.inner.readiness.send_if_modified(|state| {
            if *state == Readiness::Unmounted {
                false
            } else {
                *state = Readiness::Unmounted;
                true
            }
        });
        if changed {
            self.inner.snapshots.lock().clear();
            self.inner.tracker.loading_bus().clear();
            tracing::info!("Service facade unmounted");
        }
    }

    fn ensure_ready(&self) -> Result<(), ServiceError> {
        match self.readiness() {
            Readiness::Ready => Ok(()),
            Readiness::Pending => Err(ServiceError::NotReady),
            Readiness::Unmounted => Err(ServiceError::Unmounted),
        }
    }

    // -- generic operations --

    /// Read every record of `entity` and replace the local snapshot.
    pub async fn fetch(&self, entity: Entity) -> Result<Vec<Record>, ServiceError> {
        self.ensure_ready()?;
        self.fetch_tracked(entity).await
    }

    async fn fetch_tracked(&self, entity: Entity) -> Result<Vec<Record>, ServiceError> {
        let operation = Operation::new(entity, Verb::Fetch);
        let mut guard = self.inner.tracker.begin(operation);
        match self.inner.store.list(entity, None).await {
            Ok(records) => {
                self.inner.snapshots.lock().insert(entity, records.clone());
                Ok(records)
            }
            Err(e) => {
                guard.fail(&e);
                tracing::warn!(%operation, error = %e, "Fetch failed");
                Err(ServiceError::OperationFailure {
                    operation,
                    source: e,
                })
            }
        }
    }

    /// Create a record, then refetch and broadcast `entity`.
    pub async fn add(&self, entity: Entity, draft: Draft) -> Result<Record, ServiceError> {
        self.ensure_ready()?;
        if draft.is_empty() {
            return Err(ServiceError::InvalidArgument(format!(
                "{} name must not be empty",
                entity.singular()
            )));
        }

        let provisional = match self.consistency() {
            ConsistencyMode::Optimistic => Some(self.patch_add(entity, &draft)),
            ConsistencyMode::Refetch => None,
        };

        let operation = Operation::new(entity, Verb::Add);
        let result = {
            let mut guard = self.inner.tracker.begin(operation);
            let result = self.inner.store.create(entity, &draft).await;
            if let Err(e) = &result {
                guard.fail(e);
            }
            result
        };

        match (&result, &provisional) {
            (Ok(record), Some(id)) => self.confirm_add(entity, id, record),
            (Err(_), Some(id)) => self.rollback_add(entity, id),
            _ => {}
        }

        self.refetch_and_broadcast(entity).await;

        match result {
            Ok(record) => {
                tracing::info!(%operation, id = %record.id, name = %record.name, "Record added");
                Ok(record)
            }
            Err(e) => {
                tracing::warn!(%operation, error = %e, "Add failed");
                Err(ServiceError::OperationFailure {
                    operation,
                    source: e,
                })
            }
        }
    }

    /// Delete a record, then refetch and broadcast `entity`.
    pub async fn remove(&self, entity: Entity, id: impl Into<RecordId>) -> Result<(), ServiceError> {
        self.ensure_ready()?;
        let id = id.into();
        if id.is_empty() {
            return Err(ServiceError::InvalidArgument(format!(
                "{} id must not be empty",
                entity.singular()
            )));
        }

        let removed = match self.consistency() {
            ConsistencyMode::Optimistic => self.patch_remove(entity, &id),
            ConsistencyMode::Refetch => None,
        };

        let operation = Operation::new(entity, Verb::Remove);
        let result = {
            let mut guard = self.inner.tracker.begin(operation);
            let result = self.inner.store.delete(entity, &id).await;
            if let Err(e) = &result {
                guard.fail(e);
            }
            result
        };

        if let (Err(_), Some((index, record))) = (&result, removed) {
            self.rollback_remove(entity, index, record);
        }

        self.refetch_and_broadcast(entity).await;

        match result {
            Ok(()) => {
                tracing::info!(%operation, %id, "Record removed");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(%operation, %id, error = %e, "Remove failed");
                Err(ServiceError::OperationFailure {
                    operation,
                    source: e,
                })
            }
        }
    }

    /// Query the store. A blank query returns the current snapshot without
    /// touching the network.
    pub async fn filter(&self, entity: Entity, query: &str) -> Result<Vec<Record>, ServiceError> {
        self.ensure_ready()?;
        let query = query.trim();
        if query.is_empty() {
            return Ok(self.snapshot(entity));
        }

        let operation = Operation::new(entity, Verb::Filter);
        let mut guard = self.inner.tracker.begin(operation);
        match self.inner.store.list(entity, Some(query)).await {
            Ok(records) => Ok(records),
            Err(e) => {
                guard.fail(&e);
                tracing::warn!(%operation, query, error = %e, "Filter failed");
                Err(ServiceError::OperationFailure {
                    operation,
                    source: e,
                })
            }
        }
    }

    /// Re-read `entity` under its fetch bracket and publish the result.
    /// A failed refetch publishes nothing; the failure is in the fetch slot.
    async fn refetch_and_broadcast(&self, entity: Entity) {
        if self.readiness() == Readiness::Unmounted {
            return;
        }
        let refetch = async {
            self.fetch_tracked(entity)
                .await
                .map(|records| DataChange::records(entity, records))
        };
        if let Ok(delivered) = self.inner.bus.publish_from_refetch(entity.into(), refetch).await {
            tracing::debug!(%entity, delivered, "Broadcast refreshed snapshot");
        }
    }

    // -- optimistic patches --

    fn publish_snapshot(&self, entity: Entity) {
        let records = self.snapshot(entity);
        self.inner.bus.publish(DataChange::records(entity, records));
    }

    fn patch_add(&self, entity: Entity, draft: &Draft) -> RecordId {
        let id = RecordId::Text(format!("pending-{}", uuid::Uuid::new_v4()));
        let record = Record {
            id: id.clone(),
            name: draft.name.clone(),
            extra: draft.extra.clone(),
        };
        self.inner
            .snapshots
            .lock()
            .entry(entity)
            .or_default()
            .push(record);
        self.publish_snapshot(entity);
        id
    }

    /// Swap the provisional record for the one the store created. Not
    /// published; the refetch that follows broadcasts the authoritative list.
    fn confirm_add(&self, entity: Entity, provisional: &RecordId, record: &Record) {
        if let Some(records) = self.inner.snapshots.lock().get_mut(&entity) {
            if let Some(slot) = records.iter_mut().find(|r| &r.id == provisional) {
                *slot = record.clone();
            }
        }
    }

    fn rollback_add(&self, entity: Entity, id: &RecordId) {
        if let Some(records) = self.inner.snapshots.lock().get_mut(&entity) {
            records.retain(|r| &r.id != id);
        }
        tracing::debug!(%entity, %id, "Rolled back optimistic add");
        self.publish_snapshot(entity);
    }

    fn patch_remove(&self, entity: Entity, id: &RecordId) -> Option<(usize, Record)> {
        let removed = {
            let mut snapshots = self.inner.snapshots.lock();
            let records = snapshots.get_mut(&entity)?;
            let index = records.iter().position(|r| r.id.matches(id))?;
            (index, records.remove(index))
        };
        self.publish_snapshot(entity);
        Some(removed)
    }

    fn rollback_remove(&self, entity: Entity, index: usize, record: Record) {
        {
            let mut snapshots = self.inner.snapshots.lock();
            let records = snapshots.entry(entity).or_default();
            if !records.iter().any(|r| r.id.matches(&record.id)) {
                let index = index.min(records.len());
                records.insert(index, record);
            }
        }
        tracing::debug!(%entity, "Rolled back optimistic remove");
        self.publish_snapshot(entity);
    }

    // -- entity shorthands --

    pub async fn fetch_items(&self) -> Result<Vec<Record>, ServiceError> {
        self.fetch(Entity::Items).await
    }

    pub async fn add_item(&self, draft: impl Into<Draft>) -> Result<Record, ServiceError> {
        self.add(Entity::Items, draft.into()).await
    }

    pub async fn remove_item(&self, id: impl Into<RecordId>) -> Result<(), ServiceError> {
        self.remove(Entity::Items, id).await
    }

    pub async fn filter_items(&self, query: &str) -> Result<Vec<Record>, ServiceError> {
        self.filter(Entity::Items, query).await
    }

    pub async fn fetch_users(&self) -> Result<Vec<Record>, ServiceError> {
        self.fetch(Entity::Users).await
    }

    pub async fn add_user(&self, draft: impl Into<Draft>) -> Result<Record, ServiceError> {
        self.add(Entity::Users, draft.into()).await
    }

    pub async fn remove_user(&self, id: impl Into<RecordId>) -> Result<(), ServiceError> {
        self.remove(Entity::Users, id).await
    }

    pub async fn filter_users(&self, query: &str) -> Result<Vec<Record>, ServiceError> {
        self.filter(Entity::Users, query).await
    }

    // -- broadcast surface --

    pub fn on_data_change<F>(&self, category: Category, callback: F) -> Subscription
    where
        F: Fn(&DataChange) + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(category, callback)
    }

    pub fn on_records<F>(&self, entity: Entity, callback: F) -> Subscription
    where
        F: Fn(&[Record]) + Send + Sync + 'static,
    {
        self.inner.bus.on_records(entity, callback)
    }

    pub fn on_notifications<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&NotificationSummary) + Send + Sync + 'static,
    {
        self.inner.bus.on_notifications(callback)
    }

    /// Publish a non-CRUD payload, such as aggregated statistics.
    pub fn notify_data_change(&self, change: DataChange) -> Result<usize, ServiceError> {
        self.ensure_ready()?;
        Ok(self.inner.bus.publish(change))
    }

    pub fn on_loading_change<F>(&self, entity: Entity, callback: F) -> Subscription
    where
        F: Fn(bool, Operation) + Send + Sync + 'static,
    {
        self.inner.tracker.loading_bus().subscribe(entity, callback)
    }

    pub fn loaders(&self) -> BTreeMap<Operation, bool> {
        self.inner.tracker.loaders()
    }

    pub fn errors(&self) -> BTreeMap<Operation, String> {
        self.inner.tracker.errors()
    }

    pub fn operation_state(&self, operation: Operation) -> super::OperationState {
        self.inner.tracker.state(operation)
    }

    /// Last authoritative (or optimistically patched) list for `entity`.
    pub fn snapshot(&self, entity: Entity) -> Vec<Record> {
        self.inner
            .snapshots
            .lock()
            .get(&entity)
            .cloned()
            .unwrap_or_default()
    }
}

impl fmt::Debug for ServiceApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceApi")
            .field("readiness", &self.readiness())
            .field("consistency", &self.consistency())
            .finish()
    }
}
