use std::time::Duration;

use crate::mount::{Anchor, Props};
use crate::service::ServiceApi;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Static configuration of one controller.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub module: String,
    pub retry_on_failure: bool,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Forward prop changes to a live instance instead of remounting.
    pub update_props_on_change: bool,
}

impl ControllerOptions {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            retry_on_failure: true,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            update_props_on_change: false,
        }
    }

    pub fn retry_on_failure(mut self, enabled: bool) -> Self {
        self.retry_on_failure = enabled;
        self
    }

    pub fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn update_props_on_change(mut self, enabled: bool) -> Self {
        self.update_props_on_change = enabled;
        self
    }
}

/// Desired state the controller drives its instance towards.
#[derive(Debug, Clone, Default)]
pub struct MountInputs {
    pub ready: bool,
    pub anchor: Option<Anchor>,
    pub props: Props,
    /// Any change (by value) forces unmount-then-remount.
    pub dependencies: Vec<serde_json::Value>,
    /// Any change (by identity) forces unmount-then-remount.
    pub service: Option<ServiceApi>,
}

impl MountInputs {
    /// Ready inputs for `anchor` with no props.
    pub fn new(anchor: Anchor) -> Self {
        Self {
            ready: true,
            anchor: Some(anchor),
            ..Self::default()
        }
    }

    pub fn ready(mut self, ready: bool) -> Self {
        self.ready = ready;
        self
    }

    pub fn props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    pub fn dependencies(mut self, dependencies: Vec<serde_json::Value>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn service(mut self, service: ServiceApi) -> Self {
        self.service = Some(service);
        self
    }
}

pub(crate) fn same_service(a: &Option<ServiceApi>, b: &Option<ServiceApi>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.ptr_eq(b),
        _ => false,
    }
}

pub(crate) fn same_anchor(a: &Option<Anchor>, b: &Option<Anchor>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.ptr_eq(b),
        _ => false,
    }
}
