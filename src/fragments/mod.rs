//! Headless consumer microfrontends. Each renders text lines into its anchor
//! and talks to the backing store only through the injected service API.

mod filter;
mod notifications;
mod panel;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::bus::Subscription;
use crate::mount::{Anchor, MountError};

pub use filter::{ItemsFilter, FILTER_MODULE};
pub use notifications::{Activity, ActivityKind, NotificationsPanel, NOTIFICATIONS_MODULE, MAX_ACTIVITIES};
pub use panel::{ItemsPanel, UsersPanel, ITEMS_MODULE, USERS_MODULE};

fn runtime(module: &str) -> Result<Handle, MountError> {
    Handle::try_current()
        .map_err(|e| MountError::Failed(format!("{} needs an async runtime: {}", module, e)))
}

/// Fragment state bound to an anchor. Every update re-renders.
struct View<S> {
    inner: Arc<Mutex<ViewInner<S>>>,
}

struct ViewInner<S> {
    state: S,
    anchor: Anchor,
    render: fn(&S) -> Vec<String>,
    closed: bool,
}

impl<S> Clone for View<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S> View<S> {
    fn new(anchor: Anchor, state: S, render: fn(&S) -> Vec<String>) -> Self {
        anchor.render(render(&state));
        Self {
            inner: Arc::new(Mutex::new(ViewInner {
                state,
                anchor,
                render,
                closed: false,
            })),
        }
    }

    fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> Option<R> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return None;
        }
        let result = f(&mut inner.state);
        let lines = (inner.render)(&inner.state);
        inner.anchor.render(lines);
        Some(result)
    }

    fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.inner.lock().state)
    }

    fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.anchor.render(Vec::new());
    }
}

/// Resources owned by one mounted fragment.
#[derive(Default)]
struct Resources {
    subscriptions: Vec<Subscription>,
    tasks: Vec<JoinHandle<()>>,
}

impl Resources {
    fn release(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}
