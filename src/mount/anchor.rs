use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use super::traits::MountError;

/// Attachment point for one microfrontend instance.
///
/// Cloning is cheap and every clone refers to the same anchor. At most one
/// module may occupy an anchor at a time; the lifecycle controller claims it
/// before calling `mount` and releases it after `unmount`.
#[derive(Clone)]
pub struct Anchor {
    inner: Arc<AnchorInner>,
}

struct AnchorInner {
    id: String,
    attached: watch::Sender<bool>,
    state: Mutex<AnchorState>,
}

#[derive(Default)]
struct AnchorState {
    occupant: Option<String>,
    content: Vec<String>,
}

impl Anchor {
    /// Create an attached, empty anchor.
    pub fn new(id: impl Into<String>) -> Self {
        let (attached, _) = watch::channel(true);
        Self {
            inner: Arc::new(AnchorInner {
                id: id.into(),
                attached,
                state: Mutex::new(AnchorState::default()),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn is_attached(&self) -> bool {
        *self.inner.attached.borrow()
    }

    /// Remove the anchor from the tree. Controllers watching it unmount.
    pub fn detach(&self) {
        self.inner.attached.send_if_modified(|attached| {
            let changed = *attached;
            *attached = false;
            changed
        });
    }

    pub fn reattach(&self) {
        self.inner.attached.send_if_modified(|attached| {
            let changed = !*attached;
            *attached = true;
            changed
        });
    }

    /// Receiver that observes attach/detach transitions.
    pub fn watch_attached(&self) -> watch::Receiver<bool> {
        self.inner.attached.subscribe()
    }

    /// Module currently mounted here, if any.
    pub fn occupant(&self) -> Option<String> {
        self.inner.state.lock().occupant.clone()
    }

    /// Replace the rendered content.
    pub fn render(&self, lines: Vec<String>) {
        self.inner.state.lock().content = lines;
    }

    pub fn content(&self) -> Vec<String> {
        self.inner.state.lock().content.clone()
    }

    pub fn ptr_eq(&self, other: &Anchor) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn claim(&self, module: &str) -> Result<(), MountError> {
        if !self.is_attached() {
            return Err(MountError::AnchorDetached {
                anchor: self.id().to_string(),
            });
        }
        let mut state = self.inner.state.lock();
        match &state.occupant {
            Some(occupant) => Err(MountError::AnchorOccupied {
                anchor: self.id().to_string(),
                occupant: occupant.clone(),
            }),
            None => {
                state.occupant = Some(module.to_string());
                Ok(())
            }
        }
    }

    /// Release the anchor if `module` holds it. Content is cleared.
    pub(crate) fn release(&self, module: &str) {
        let mut state = self.inner.state.lock();
        if state.occupant.as_deref() == Some(module) {
            state.occupant = None;
            state.content.clear();
        }
    }
}

impl std::fmt::Debug for Anchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Anchor")
            .field("id", &self.inner.id)
            .field("attached", &self.is_attached())
            .field("occupant", &self.occupant())
            .finish()
    }
}
