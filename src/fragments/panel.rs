use crate::bus::NotificationSummary;
use crate::mount::{MountArgs, MountError, MountedInstance, Mountable};
use crate::service::{Entity, Record};

use super::{runtime, Resources, View};

pub const ITEMS_MODULE: &str = "mfe_1/mount";
pub const USERS_MODULE: &str = "users_mfe/mount";

struct PanelState {
    entity: Entity,
    records: Vec<Record>,
    loading: bool,
    error: Option<String>,
    summary: Option<NotificationSummary>,
}

fn render_panel(state: &PanelState) -> Vec<String> {
    let title = match state.entity {
        Entity::Items => "Items",
        Entity::Users => "Users",
    };
    let mut lines = vec![format!("{} ({})", title, state.records.len())];
    if state.loading {
        lines.push("  loading...".to_string());
    }
    if let Some(err) = &state.error {
        lines.push(format!("  error: {}", err));
    }
    for record in &state.records {
        lines.push(format!("  {:>6}  {}", record.id.to_string(), record.name));
    }
    if let Some(summary) = &state.summary {
        lines.push(format!(
            "  [activity: {} items, {} users, {} recent]",
            summary.stats.total_items, summary.stats.total_users, summary.stats.recent_activity
        ));
    }
    lines
}

/// Mount a list view of `entity`: initial fetch, then live updates from the
/// bus plus the notification summary.
fn mount_panel(
    module: &'static str,
    entity: Entity,
    args: MountArgs,
) -> Result<Box<dyn MountedInstance>, MountError> {
    let api = args.require_service(module)?;
    let runtime = runtime(module)?;

    let view = View::new(
        args.anchor.clone(),
        PanelState {
            entity,
            records: Vec::new(),
            loading: true,
            error: None,
            summary: None,
        },
        render_panel,
    );
    let mut resources = Resources::default();

    resources.subscriptions.push(api.on_records(entity, {
        let view = view.clone();
        move |records| {
            view.update(|s| {
                s.records = records.to_vec();
                s.loading = false;
                s.error = None;
            });
        }
    }));
    resources.subscriptions.push(api.on_notifications({
        let view = view.clone();
        move |summary| {
            view.update(|s| s.summary = Some(summary.clone()));
        }
    }));

    resources.tasks.push(runtime.spawn({
        let view = view.clone();
        let api = api.clone();
        async move {
            let result = api.fetch(entity).await;
            view.update(|s| {
                s.loading = false;
                match result {
                    Ok(records) => s.records = records,
                    Err(e) => {
                        tracing::warn!(module, error = %e, "Initial fetch failed");
                        s.error = Some(e.to_string());
                    }
                }
            });
        }
    }));

    tracing::debug!(module, anchor = %args.anchor.id(), "Panel mounted");
    Ok(Box::new(PanelInstance { view, resources }))
}

struct PanelInstance {
    view: View<PanelState>,
    resources: Resources,
}

impl MountedInstance for PanelInstance {
    fn unmount(&mut self) {
        self.resources.release();
        self.view.close();
    }
}

/// Item list (`mfe_1`).
pub struct ItemsPanel;

impl Mountable for ItemsPanel {
    fn mount(&self, args: MountArgs) -> Result<Box<dyn MountedInstance>, MountError> {
        mount_panel(ITEMS_MODULE, Entity::Items, args)
    }
}

/// User list (`users_mfe`).
pub struct UsersPanel;

impl Mountable for UsersPanel {
    fn mount(&self, args: MountArgs) -> Result<Box<dyn MountedInstance>, MountError> {
        mount_panel(USERS_MODULE, Entity::Users, args)
    }
}
