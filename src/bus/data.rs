use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::topic::{Subscription, Topic};
use crate::service::{Entity, Record};

/// Partition key for broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Items,
    Users,
    Notifications,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Items, Category::Users, Category::Notifications];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Items => "items",
            Category::Users => "users",
            Category::Notifications => "notifications",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Entity> for Category {
    fn from(entity: Entity) -> Self {
        match entity {
            Entity::Items => Category::Items,
            Entity::Users => Category::Users,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityStats {
    pub total_users: usize,
    pub total_items: usize,
    pub recent_activity: usize,
}

/// Aggregate statistics broadcast on [`Category::Notifications`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSummary {
    pub stats: ActivityStats,
    pub last_activity: Option<SystemTime>,
    pub total_activity: usize,
}

/// Authoritative payload for one category.
#[derive(Debug, Clone, PartialEq)]
pub enum DataChange {
    Items(Vec<Record>),
    Users(Vec<Record>),
    Notifications(NotificationSummary),
}

impl DataChange {
    pub fn records(entity: Entity, records: Vec<Record>) -> Self {
        match entity {
            Entity::Items => DataChange::Items(records),
            Entity::Users => DataChange::Users(records),
        }
    }

    pub fn category(&self) -> Category {
        match self {
            DataChange::Items(_) => Category::Items,
            DataChange::Users(_) => Category::Users,
            DataChange::Notifications(_) => Category::Notifications,
        }
    }

    pub fn as_records(&self) -> Option<&[Record]> {
        match self {
            DataChange::Items(r) | DataChange::Users(r) => Some(r),
            DataChange::Notifications(_) => None,
        }
    }
}

/// Category-partitioned publish/subscribe registry.
///
/// Cloning yields another handle to the same bus. Each test or container
/// creates its own instance; nothing here is process-global.
#[derive(Clone)]
pub struct DataChangeBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    items: Topic<DataChange>,
    users: Topic<DataChange>,
    notifications: Topic<DataChange>,
    disposed: AtomicBool,
}

impl DataChangeBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                items: Topic::new("items"),
                users: Topic::new("users"),
                notifications: Topic::new("notifications"),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    fn topic(&self, category: Category) -> &Topic<DataChange> {
        match category {
            Category::Items => &self.inner.items,
            Category::Users => &self.inner.users,
            Category::Notifications => &self.inner.notifications,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Drop every subscriber and refuse new ones.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        for category in Category::ALL {
            self.topic(category).clear();
        }
        tracing::debug!("Data change bus disposed");
    }

    pub fn subscribe<F>(&self, category: Category, callback: F) -> Subscription
    where
        F: Fn(&DataChange) + Send + Sync + 'static,
    {
        if self.is_disposed() {
            tracing::warn!(%category, "Subscribe on disposed bus ignored");
            return Subscription::inert();
        }
        self.topic(category).subscribe(callback)
    }

    /// Subscribe to the record snapshots of one entity.
    pub fn on_records<F>(&self, entity: Entity, callback: F) -> Subscription
    where
        F: Fn(&[Record]) + Send + Sync + 'static,
    {
        self.subscribe(entity.into(), move |change| {
            if let Some(records) = change.as_records() {
                callback(records);
            }
        })
    }

    pub fn on_notifications<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&NotificationSummary) + Send + Sync + 'static,
    {
        self.subscribe(Category::Notifications, move |change| {
            if let DataChange::Notifications(summary) = change {
                callback(summary);
            }
        })
    }

    /// Deliver `change` to the subscribers of its own category.
    pub fn publish(&self, change: DataChange) -> usize {
        let category = change.category();
        if self.is_disposed() {
            tracing::debug!(%category, "Publish on disposed bus dropped");
            return 0;
        }
        let delivered = self.topic(category).publish(&change);
        tracing::debug!(%category, delivered, "Published data change");
        delivered
    }

    /// Await `refetch` and publish its result on `category`.
    ///
    /// A failed refetch publishes nothing and hands the error back. A payload
    /// whose category differs from `category` is dropped.
    pub async fn publish_from_refetch<F, E>(&self, category: Category, refetch: F) -> Result<usize, E>
    where
        F: Future<Output = Result<DataChange, E>>,
        E: fmt::Display,
    {
        match refetch.await {
            Ok(change) if change.category() == category => Ok(self.publish(change)),
            Ok(change) => {
                tracing::error!(
                    expected = %category,
                    actual = %change.category(),
                    "Refetch produced payload for another category, not published"
                );
                Ok(0)
            }
            Err(e) => {
                tracing::warn!(%category, error = %e, "Refetch failed, nothing published");
                Err(e)
            }
        }
    }

    pub fn subscriber_count(&self, category: Category) -> usize {
        self.topic(category).subscriber_count()
    }
}

impl Default for DataChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DataChangeBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataChangeBus")
            .field("items", &self.subscriber_count(Category::Items))
            .field("users", &self.subscriber_count(Category::Users))
            .field("notifications", &self.subscriber_count(Category::Notifications))
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
