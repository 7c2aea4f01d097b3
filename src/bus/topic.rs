use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Ordered set of subscriber callbacks for one payload type.
///
/// Callbacks run synchronously on the publishing task in registration order.
/// No lock is held while a callback runs, so callbacks may subscribe,
/// unsubscribe or publish themselves. A panicking callback is logged and
/// skipped; it never reaches the publisher.
pub struct Topic<T> {
    inner: Arc<TopicInner<T>>,
}

struct TopicInner<T> {
    name: String,
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, Callback<T>)>>,
}

impl<T: 'static> Topic<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TopicInner {
                name: name.into(),
                next_id: AtomicU64::new(1),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .push((id, Arc::new(callback)));

        let weak: Weak<TopicInner<T>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.subscribers.lock().retain(|(sid, _)| *sid != id);
            }
        })
    }

    /// Deliver `payload` to every current subscriber.
    ///
    /// Returns the number of callbacks that completed without panicking.
    pub fn publish(&self, payload: &T) -> usize {
        let callbacks: Vec<Callback<T>> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();

        let mut delivered = 0;
        for callback in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(payload))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    tracing::error!(
                        topic = %self.inner.name,
                        panic = %panic_message(panic.as_ref()),
                        "Subscriber callback panicked"
                    );
                }
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Drop every subscriber. Outstanding [`Subscription`]s become no-ops.
    pub fn clear(&self) {
        self.inner.subscribers.lock().clear();
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Registration handle returned by `subscribe`.
///
/// `unsubscribe` removes exactly the callback it was created for and may be
/// called any number of times. Dropping the handle unsubscribes, so the
/// handle has to be kept:
///
/// ```compile_fail
/// #![deny(unused_must_use)]
/// use mfe_container::bus::DataChangeBus;
/// use mfe_container::service::Entity;
///
/// let bus = DataChangeBus::new();
/// bus.on_records(Entity::Items, |_| {});
/// ```
#[must_use = "dropping a Subscription unsubscribes"]
pub struct Subscription {
    remove: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    fn new(remove: impl FnOnce() + Send + 'static) -> Self {
        Self {
            remove: Mutex::new(Some(Box::new(remove))),
        }
    }

    /// A subscription that was never registered.
    pub fn inert() -> Self {
        Self {
            remove: Mutex::new(None),
        }
    }

    pub fn unsubscribe(&self) {
        let remove = self.remove.lock().take();
        if let Some(remove) = remove {
            remove();
        }
    }

    pub fn is_active(&self) -> bool {
        self.remove.lock().is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
