use tokio::runtime::Handle;

use crate::mount::{MountArgs, MountError, MountedInstance, Mountable, Props};
use crate::service::{Entity, Operation, Record, ServiceApi};

use super::{runtime, Resources, View};

pub const FILTER_MODULE: &str = "mfe_2/mount";

#[derive(Default)]
struct FilterState {
    items: Vec<Record>,
    current_filter: String,
    filtered: Vec<Record>,
    /// Operation another component is running on items, if any.
    external: Option<Operation>,
    error: Option<String>,
}

impl FilterState {
    fn refilter(&mut self) {
        self.filtered = if self.current_filter.is_empty() {
            self.items.clone()
        } else {
            self.items
                .iter()
                .filter(|r| r.name.to_lowercase().contains(&self.current_filter.to_lowercase()))
                .cloned()
                .collect()
        };
    }
}

fn render_filter(state: &FilterState) -> Vec<String> {
    let mut lines = vec![if state.current_filter.is_empty() {
        format!("Filter: (none)  {} of {}", state.filtered.len(), state.items.len())
    } else {
        format!(
            "Filter: \"{}\"  {} of {}",
            state.current_filter,
            state.filtered.len(),
            state.items.len()
        )
    }];
    if let Some(op) = state.external {
        lines.push(format!("  another component is running {}...", op));
    }
    if let Some(err) = &state.error {
        lines.push(format!("  error: {}", err));
    }
    for record in &state.filtered {
        lines.push(format!("  {:>6}  {}", record.id.to_string(), record.name));
    }
    lines
}

fn filter_prop(props: &Props) -> String {
    props
        .get("filter")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Filtered item list (`mfe_2`).
///
/// Reads its query from the `filter` prop and accepts prop updates in place.
/// A blank query shows every item without a request; otherwise the store is
/// queried. Later broadcasts are re-filtered locally by name.
pub struct ItemsFilter;

impl Mountable for ItemsFilter {
    fn mount(&self, args: MountArgs) -> Result<Box<dyn MountedInstance>, MountError> {
        let api = args.require_service(FILTER_MODULE)?;
        let runtime = runtime(FILTER_MODULE)?;

        let view = View::new(args.anchor.clone(), FilterState::default(), render_filter);
        let mut resources = Resources::default();

        resources.subscriptions.push(api.on_records(Entity::Items, {
            let view = view.clone();
            move |records| {
                view.update(|s| {
                    s.items = records.to_vec();
                    s.refilter();
                });
            }
        }));
        resources.subscriptions.push(api.on_loading_change(Entity::Items, {
            let view = view.clone();
            move |loading, operation| {
                view.update(|s| s.external = loading.then_some(operation));
            }
        }));

        let initial_filter = filter_prop(&args.props);
        resources.tasks.push(runtime.spawn({
            let view = view.clone();
            let api = api.clone();
            async move {
                match api.fetch_items().await {
                    Ok(items) => {
                        view.update(|s| {
                            s.items = items;
                            s.refilter();
                        });
                    }
                    Err(e) => {
                        tracing::warn!(module = FILTER_MODULE, error = %e, "Initial fetch failed");
                        view.update(|s| s.error = Some(e.to_string()));
                    }
                }
                apply_filter(&api, &view, initial_filter).await;
            }
        }));

        Ok(Box::new(FilterInstance {
            api,
            runtime,
            view,
            resources,
            filter_task: None,
        }))
    }
}

async fn apply_filter(api: &ServiceApi, view: &View<FilterState>, query: String) {
    if query.is_empty() {
        view.update(|s| {
            s.current_filter.clear();
            s.refilter();
        });
        return;
    }
    match api.filter_items(&query).await {
        Ok(filtered) => {
            view.update(|s| {
                s.filtered = filtered;
                s.current_filter = query;
                s.error = None;
            });
        }
        Err(e) => {
            tracing::warn!(module = FILTER_MODULE, query = %query, error = %e, "Filter failed");
            view.update(|s| s.error = Some(e.to_string()));
        }
    }
}

struct FilterInstance {
    api: ServiceApi,
    runtime: Handle,
    view: View<FilterState>,
    resources: Resources,
    filter_task: Option<tokio::task::JoinHandle<()>>,
}

impl MountedInstance for FilterInstance {
    fn unmount(&mut self) {
        if let Some(task) = self.filter_task.take() {
            task.abort();
        }
        self.resources.release();
        self.view.close();
    }

    fn supports_props_update(&self) -> bool {
        true
    }

    fn update_props(&mut self, props: &Props) {
        let query = filter_prop(props);
        let idle = self.filter_task.as_ref().map_or(true, |t| t.is_finished());
        if idle && self.view.read(|s| s.current_filter == query) {
            return;
        }
        // Latest filter wins
        if let Some(task) = self.filter_task.take() {
            task.abort();
        }
        let api = self.api.clone();
        let view = self.view.clone();
        self.filter_task = Some(self.runtime.spawn(async move {
            apply_filter(&api, &view, query).await;
        }));
    }
}
