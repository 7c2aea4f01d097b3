use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};

use super::options::{same_anchor, same_service, ControllerOptions, MountInputs};
use super::state::{ControllerStatus, Phase};
use crate::loader::{LoadError, ModuleRegistry};
use crate::mount::{Anchor, MountArgs, MountedInstance, Mountable, Props};
use crate::service::ServiceApi;

const COMMAND_BUFFER: usize = 32;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Controller for '{module}' has been torn down")]
    TornDown { module: String },
}

type LoadFuture = Pin<Box<dyn Future<Output = Result<Arc<dyn Mountable>, LoadError>> + Send>>;
type OnLoad = Box<dyn FnOnce() + Send>;

enum Command {
    SetReady(bool),
    SetAnchor(Option<Anchor>),
    SetProps(Props),
    SetDependencies(Vec<serde_json::Value>),
    SetService(Option<ServiceApi>),
    OnLoad(OnLoad),
    Teardown { respond_to: oneshot::Sender<()> },
}

/// Handle to the task that keeps one module mounted according to its inputs.
///
/// Clones share the same task. The task exits on [`teardown`] or once every
/// handle is dropped; either way the live instance is unmounted.
///
/// [`teardown`]: MicrofrontendController::teardown
#[derive(Clone)]
pub struct MicrofrontendController {
    module: Arc<str>,
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<ControllerStatus>,
}

impl MicrofrontendController {
    pub fn spawn(
        registry: Arc<ModuleRegistry>,
        options: ControllerOptions,
        inputs: MountInputs,
    ) -> Self {
        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        let (status_tx, status) = watch::channel(ControllerStatus::default());
        let module: Arc<str> = Arc::from(options.module.as_str());

        let actor = Actor {
            registry,
            options,
            inputs,
            instance: None,
            mounted_on: None,
            pending_load: None,
            retry_at: None,
            retries: 0,
            attached: None,
            on_load: None,
            status: ControllerStatus::default(),
            status_tx,
        };
        tokio::spawn(actor.run(receiver));

        Self {
            module,
            commands,
            status,
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    async fn send(&self, command: Command) -> Result<(), ControllerError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ControllerError::TornDown {
                module: self.module.to_string(),
            })
    }

    pub async fn set_ready(&self, ready: bool) -> Result<(), ControllerError> {
        self.send(Command::SetReady(ready)).await
    }

    pub async fn set_anchor(&self, anchor: Option<Anchor>) -> Result<(), ControllerError> {
        self.send(Command::SetAnchor(anchor)).await
    }

    pub async fn set_props(&self, props: Props) -> Result<(), ControllerError> {
        self.send(Command::SetProps(props)).await
    }

    pub async fn set_dependencies(
        &self,
        dependencies: Vec<serde_json::Value>,
    ) -> Result<(), ControllerError> {
        self.send(Command::SetDependencies(dependencies)).await
    }

    pub async fn set_service(&self, service: Option<ServiceApi>) -> Result<(), ControllerError> {
        self.send(Command::SetService(service)).await
    }

    /// Run `callback` once, after the first successful mount. Runs right
    /// away if that already happened.
    pub async fn on_load<F>(&self, callback: F) -> Result<(), ControllerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.send(Command::OnLoad(Box::new(callback))).await
    }

    pub fn status(&self) -> ControllerStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ControllerStatus> {
        self.status.clone()
    }

    /// Wait until the status satisfies `predicate`.
    pub async fn wait_for<P>(&self, mut predicate: P) -> Result<ControllerStatus, ControllerError>
    where
        P: FnMut(&ControllerStatus) -> bool,
    {
        let mut rx = self.status.clone();
        let result = rx.wait_for(|s| predicate(s)).await;
        result
            .map(|s| s.clone())
            .map_err(|_| ControllerError::TornDown {
                module: self.module.to_string(),
            })
    }

    /// Cancel any pending retry, unmount and stop the task.
    ///
    /// Safe to call repeatedly; later calls return immediately.
    pub async fn teardown(&self) {
        let (respond_to, done) = oneshot::channel();
        if self.commands.send(Command::Teardown { respond_to }).await.is_err() {
            return;
        }
        let _ = done.await;
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

impl std::fmt::Debug for MicrofrontendController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicrofrontendController")
            .field("module", &self.module)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

struct Actor {
    registry: Arc<ModuleRegistry>,
    options: ControllerOptions,
    inputs: MountInputs,
    instance: Option<Box<dyn MountedInstance>>,
    mounted_on: Option<Anchor>,
    pending_load: Option<LoadFuture>,
    retry_at: Option<Instant>,
    retries: u32,
    attached: Option<watch::Receiver<bool>>,
    on_load: Option<OnLoad>,
    status: ControllerStatus,
    status_tx: watch::Sender<ControllerStatus>,
}

impl Actor {
    fn module(&self) -> &str {
        &self.options.module
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        self.attached = self.inputs.anchor.as_ref().map(Anchor::watch_attached);
        tracing::debug!(module = %self.module(), "Controller started");
        if self.wants_mount() {
            self.start_attempt();
        }

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.apply(command) {
                            break;
                        }
                    }
                    None => {
                        self.shutdown();
                        break;
                    }
                },
                result = poll_load(&mut self.pending_load) => {
                    self.pending_load = None;
                    self.finish_attempt(result);
                }
                _ = sleep_until_opt(self.retry_at) => {
                    self.retry_at = None;
                    if self.wants_mount() {
                        self.start_attempt();
                    }
                }
                attached = attached_changed(&mut self.attached) => {
                    self.on_attached_changed(attached);
                }
            }
        }
        tracing::debug!(module = %self.module(), "Controller stopped");
    }

    fn publish(&mut self, phase: Phase) {
        self.status.phase = phase;
        self.status_tx.send_replace(self.status.clone());
    }

    fn wants_mount(&self) -> bool {
        self.inputs.ready && self.inputs.anchor.as_ref().is_some_and(Anchor::is_attached)
    }

    /// Returns false once the controller has been torn down.
    fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::SetReady(ready) => {
                if ready != self.inputs.ready {
                    self.inputs.ready = ready;
                    self.restart("ready changed");
                }
            }
            Command::SetAnchor(anchor) => {
                if !same_anchor(&anchor, &self.inputs.anchor) {
                    self.attached = anchor.as_ref().map(Anchor::watch_attached);
                    self.inputs.anchor = anchor;
                    self.restart("anchor changed");
                }
            }
            Command::SetProps(props) => {
                if props != self.inputs.props {
                    self.inputs.props = props;
                    self.props_changed();
                }
            }
            Command::SetDependencies(dependencies) => {
                if dependencies != self.inputs.dependencies {
                    self.inputs.dependencies = dependencies;
                    self.restart("dependencies changed");
                }
            }
            Command::SetService(service) => {
                if !same_service(&service, &self.inputs.service) {
                    self.inputs.service = service;
                    self.restart("service changed");
                }
            }
            Command::OnLoad(callback) => {
                if self.status.loaded {
                    callback();
                } else {
                    self.on_load = Some(callback);
                }
            }
            Command::Teardown { respond_to } => {
                self.shutdown();
                let _ = respond_to.send(());
                return false;
            }
        }
        true
    }

    fn props_changed(&mut self) {
        if self.options.update_props_on_change {
            if let Some(instance) = self.instance.as_mut() {
                if instance.supports_props_update() {
                    tracing::debug!(module = %self.options.module, "Forwarding props to live instance");
                    instance.update_props(&self.inputs.props);
                    return;
                }
            }
        }
        self.restart("props changed");
    }

    /// Unmount, forget the current cycle and start a fresh one if wanted.
    fn restart(&mut self, reason: &str) {
        tracing::debug!(module = %self.module(), reason, "Restarting mount cycle");
        self.cancel_pending();
        self.unmount();
        self.retries = 0;
        self.status.attempts = 0;
        self.status.failed = false;
        if self.wants_mount() {
            self.start_attempt();
        } else {
            self.publish(Phase::Idle);
        }
    }

    fn cancel_pending(&mut self) {
        self.pending_load = None;
        self.retry_at = None;
    }

    fn start_attempt(&mut self) {
        if self.instance.is_some() || self.pending_load.is_some() {
            return;
        }
        self.retry_at = None;
        self.status.attempts += 1;
        self.status.total_attempts += 1;
        tracing::debug!(
            module = %self.module(),
            attempt = self.status.attempts,
            "Loading microfrontend"
        );

        let registry = self.registry.clone();
        let name = self.options.module.clone();
        self.pending_load = Some(Box::pin(async move { registry.load(&name).await }));
        self.publish(Phase::Mounting);
    }

    fn finish_attempt(&mut self, result: Result<Arc<dyn Mountable>, LoadError>) {
        // The anchor may have gone away while the load was in flight
        if !self.wants_mount() {
            tracing::debug!(module = %self.module(), "Anchor gone after load, attempt dropped");
            self.publish(Phase::Idle);
            return;
        }

        let module = match result {
            Ok(module) => module,
            Err(e) => {
                let retryable = e.is_retryable();
                self.handle_failure(e.to_string(), retryable);
                return;
            }
        };

        let Some(anchor) = self.inputs.anchor.clone() else {
            self.publish(Phase::Idle);
            return;
        };
        if let Err(e) = anchor.claim(self.module()) {
            self.handle_failure(e.to_string(), true);
            return;
        }

        let args = MountArgs {
            anchor: anchor.clone(),
            props: self.inputs.props.clone(),
            service: self.inputs.service.clone(),
        };
        match module.mount(args) {
            Ok(instance) => {
                self.instance = Some(instance);
                self.mounted_on = Some(anchor);
                self.retries = 0;
                self.status.mounts += 1;
                self.status.failed = false;
                self.status.last_error = None;
                let first = !self.status.loaded;
                self.status.loaded = true;
                tracing::info!(
                    module = %self.module(),
                    attempt = self.status.attempts,
                    "Microfrontend mounted"
                );
                self.publish(Phase::Mounted);
                if first {
                    if let Some(callback) = self.on_load.take() {
                        callback();
                    }
                }
            }
            Err(e) => {
                anchor.release(self.module());
                self.handle_failure(e.to_string(), true);
            }
        }
    }

    fn handle_failure(&mut self, error: String, retryable: bool) {
        self.status.last_error = Some(error.clone());

        if retryable && self.options.retry_on_failure && self.retries < self.options.max_retries {
            self.retries += 1;
            tracing::warn!(
                module = %self.module(),
                error = %error,
                retry = self.retries,
                max_retries = self.options.max_retries,
                delay_ms = self.options.retry_delay.as_millis() as u64,
                "Microfrontend load failed, retrying"
            );
            self.retry_at = Some(Instant::now() + self.options.retry_delay);
            self.publish(Phase::Retrying);
        } else {
            tracing::error!(
                module = %self.module(),
                error = %error,
                attempts = self.status.attempts,
                "Microfrontend failed permanently"
            );
            self.status.failed = true;
            self.publish(Phase::Idle);
        }
    }

    fn on_attached_changed(&mut self, attached: bool) {
        if attached {
            tracing::debug!(module = %self.module(), "Anchor reattached");
            if self.instance.is_none() {
                self.restart("anchor reattached");
            }
        } else {
            tracing::debug!(module = %self.module(), "Anchor detached");
            self.cancel_pending();
            self.unmount();
            self.publish(Phase::Idle);
        }
    }

    /// Unmount the live instance, if any. Safe to call repeatedly.
    fn unmount(&mut self) {
        let Some(mut instance) = self.instance.take() else {
            return;
        };
        self.publish(Phase::Unmounting);
        instance.unmount();
        if let Some(anchor) = self.mounted_on.take() {
            anchor.release(&self.options.module);
        }
        tracing::info!(module = %self.module(), "Microfrontend unmounted");
        self.publish(Phase::Idle);
    }

    fn shutdown(&mut self) {
        self.cancel_pending();
        self.unmount();
        self.on_load = None;
        self.publish(Phase::Idle);
    }
}

async fn poll_load(slot: &mut Option<LoadFuture>) -> Result<Arc<dyn Mountable>, LoadError> {
    match slot {
        Some(load) => load.await,
        None => pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

/// Resolves with the new attached flag on the next transition.
async fn attached_changed(rx: &mut Option<watch::Receiver<bool>>) -> bool {
    match rx {
        Some(rx) => match rx.changed().await {
            Ok(()) => *rx.borrow_and_update(),
            Err(_) => pending().await,
        },
        None => pending().await,
    }
}
