use std::collections::VecDeque;
use std::time::SystemTime;

use crate::bus::{ActivityStats, DataChange, NotificationSummary};
use crate::mount::{MountArgs, MountError, MountedInstance, Mountable};
use crate::service::{Entity, Record, ServiceApi};

use super::{runtime, Resources, View};

pub const NOTIFICATIONS_MODULE: &str = "notifications_mfe/mount";

/// Activity entries kept, newest first.
pub const MAX_ACTIVITIES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    ItemAdded,
    ItemRemoved,
    UserAdded,
    UserRemoved,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub kind: ActivityKind,
    pub message: String,
    pub at: SystemTime,
}

#[derive(Default)]
struct NotificationsState {
    stats: ActivityStats,
    activities: VecDeque<Activity>,
}

impl NotificationsState {
    fn push(&mut self, activity: Activity) {
        self.activities.push_front(activity);
        self.activities.truncate(MAX_ACTIVITIES);
    }

    /// Record a new snapshot of `entity`. Growth counts as an addition,
    /// anything else as a removal.
    fn record_change(&mut self, entity: Entity, records: &[Record]) {
        let previous = match entity {
            Entity::Items => &mut self.stats.total_items,
            Entity::Users => &mut self.stats.total_users,
        };
        let added = records.len() > *previous;
        *previous = records.len();
        self.stats.recent_activity += 1;

        let (kind, message) = match (entity, added) {
            (Entity::Items, true) => (ActivityKind::ItemAdded, "Item added"),
            (Entity::Items, false) => (ActivityKind::ItemRemoved, "Item removed"),
            (Entity::Users, true) => (ActivityKind::UserAdded, "User added"),
            (Entity::Users, false) => (ActivityKind::UserRemoved, "User removed"),
        };
        self.push(Activity {
            kind,
            message: message.to_string(),
            at: SystemTime::now(),
        });
    }

    fn summary(&self) -> NotificationSummary {
        NotificationSummary {
            stats: self.stats.clone(),
            last_activity: self.activities.front().map(|a| a.at),
            total_activity: self.activities.len(),
        }
    }
}

fn render_notifications(state: &NotificationsState) -> Vec<String> {
    let mut lines = vec![format!(
        "Activity: {} items, {} users, {} recent",
        state.stats.total_items, state.stats.total_users, state.stats.recent_activity
    )];
    lines.extend(state.activities.iter().map(|a| format!("  - {}", a.message)));
    lines
}

fn broadcast(api: &ServiceApi, summary: NotificationSummary) {
    if let Err(e) = api.notify_data_change(DataChange::Notifications(summary)) {
        tracing::debug!(module = NOTIFICATIONS_MODULE, error = %e, "Summary not broadcast");
    }
}

/// Activity feed (`notifications_mfe`).
///
/// Counts items and users, keeps the last [`MAX_ACTIVITIES`] changes and
/// broadcasts a [`NotificationSummary`] after every change.
pub struct NotificationsPanel;

impl Mountable for NotificationsPanel {
    fn mount(&self, args: MountArgs) -> Result<Box<dyn MountedInstance>, MountError> {
        let api = args.require_service(NOTIFICATIONS_MODULE)?;
        let runtime = runtime(NOTIFICATIONS_MODULE)?;

        let view = View::new(
            args.anchor.clone(),
            NotificationsState::default(),
            render_notifications,
        );
        let mut resources = Resources::default();

        for entity in Entity::ALL {
            resources.subscriptions.push(api.on_records(entity, {
                let view = view.clone();
                let api = api.clone();
                move |records| {
                    let summary = view.update(|s| {
                        s.record_change(entity, records);
                        s.summary()
                    });
                    if let Some(summary) = summary {
                        broadcast(&api, summary);
                    }
                }
            }));
        }

        resources.tasks.push(runtime.spawn({
            let view = view.clone();
            let api = api.clone();
            async move {
                let (users, items) = tokio::join!(api.fetch_users(), api.fetch_items());
                let (users, items) = match (users, items) {
                    (Ok(users), Ok(items)) => (users, items),
                    (Err(e), _) | (_, Err(e)) => {
                        tracing::warn!(module = NOTIFICATIONS_MODULE, error = %e, "Initial load failed");
                        return;
                    }
                };
                let summary = view.update(|s| {
                    s.stats = ActivityStats {
                        total_users: users.len(),
                        total_items: items.len(),
                        recent_activity: 0,
                    };
                    s.activities.clear();
                    s.push(Activity {
                        kind: ActivityKind::System,
                        message: "Notifications system initialized".to_string(),
                        at: SystemTime::now(),
                    });
                    s.summary()
                });
                if let Some(summary) = summary {
                    broadcast(&api, summary);
                }
            }
        }));

        Ok(Box::new(NotificationsInstance { view, resources }))
    }
}

struct NotificationsInstance {
    view: View<NotificationsState>,
    resources: Resources,
}

impl MountedInstance for NotificationsInstance {
    fn unmount(&mut self) {
        self.resources.release();
        self.view.close();
    }
}
