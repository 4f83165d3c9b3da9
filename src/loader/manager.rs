//! Loader actor
//!
//! A single task owns the resolver state, so the in-flight table and the
//! pending queue are never shared behind locks. Handles talk to it over an
//! unbounded channel; activations run on their own tasks and report back
//! through the same channel.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::LoaderConfig;
use crate::loader::address::{AddressOptions, ResourceAddress};
use crate::loader::context::{Attempt, Continuation, ResolveOutcome, ResolveRequest};
use crate::loader::descriptor::{Dependency, ResourceName};
use crate::loader::diagnostics::DiagnosticSink;
use crate::loader::namespace::Namespace;
use crate::loader::no_conflict::{
    NoConflict, Registration, RegistrationSlot, TeardownCallback, TeardownController,
};
use crate::loader::resolver::{ActivationToken, Effect, ResolverState};
use crate::loader::traits::{ActivationError, LoaderError, ResourceActivator};
use crate::utils::timeout::with_timeout_opt;

/// Messages handled by the loader task
enum LoaderCommand {
    Resolve(ResolveRequest),
    ActivationFinished {
        resource: ResourceName,
        token: ActivationToken,
        result: Result<(), ActivationError>,
    },
    Status(oneshot::Sender<LoaderStatus>),
    Reset(oneshot::Sender<usize>),
    Shutdown,
}

/// Point-in-time view of a loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderStatus {
    /// Resources currently being activated, sorted
    pub in_flight: Vec<String>,
    /// Contexts waiting on an in-flight resource
    pub pending: usize,
    /// Whether no-conflict teardown has run
    pub torn_down: bool,
    /// Activations started since the loader was spawned
    pub activations: u64,
    pub passive: bool,
}

/// Builder for a loader task
pub struct LoaderBuilder {
    config: LoaderConfig,
    activator: Option<Arc<dyn ResourceActivator>>,
    namespace: Option<Namespace>,
    slot: Option<RegistrationSlot>,
    teardown_callback: Option<(TeardownCallback, Vec<Value>)>,
}

impl LoaderBuilder {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config,
            activator: None,
            namespace: None,
            slot: None,
            teardown_callback: None,
        }
    }

    /// Use `activator` instead of the default file activator
    pub fn activator<A: ResourceActivator + 'static>(mut self, activator: A) -> Self {
        self.activator = Some(Arc::new(activator));
        self
    }

    /// Use an activator shared with other owners
    pub fn shared_activator(mut self, activator: Arc<dyn ResourceActivator>) -> Self {
        self.activator = Some(activator);
        self
    }

    /// Resolve against an existing namespace
    pub fn namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = Some(namespace);
        self
    }

    /// Register the loader in `slot` once spawned
    pub fn register(mut self, slot: RegistrationSlot) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Run `callback(args)` and clear the slot once all work drains
    ///
    /// Takes precedence over the `no_conflict` flag.
    pub fn no_conflict_callback<F>(mut self, callback: F, args: Vec<Value>) -> Self
    where
        F: FnOnce(Vec<Value>) + Send + 'static,
    {
        self.teardown_callback = Some((Box::new(callback), args));
        self
    }

    /// Validate the configuration and start the loader task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(self) -> Result<LoaderHandle, LoaderError> {
        self.config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let namespace = self.namespace.unwrap_or_default();
        let handle = LoaderHandle {
            id: Uuid::new_v4(),
            tx,
            namespace: namespace.clone(),
        };

        let mode = match self.teardown_callback {
            Some((callback, args)) => NoConflict::Callback { callback, args },
            None => NoConflict::from_flag(self.config.no_conflict),
        };
        let registration = self
            .slot
            .map(|slot| Registration::install(slot, handle.clone()));

        let activator = self
            .activator
            .unwrap_or_else(|| Arc::new(default_activator()));

        let actor = LoaderActor {
            id: handle.id,
            rx,
            weak_tx: handle.tx.downgrade(),
            state: ResolverState::new(self.config.pending_rescan),
            namespace,
            activator,
            address_options: self.config.address_options(),
            passive: self.config.passive,
            activation_timeout: self.config.activation_timeout(),
            sink: DiagnosticSink::new(self.config.logging),
            teardown: TeardownController::new(mode, registration),
            activations: 0,
        };

        info!(
            "Starting loader {} (base path {:?}, passive: {})",
            handle.id,
            actor.address_options.base_path(),
            actor.passive
        );
        tokio::spawn(actor.run());
        Ok(handle)
    }
}

#[cfg(feature = "http")]
fn default_activator() -> crate::loader::activator::HttpActivator {
    crate::loader::activator::HttpActivator::new()
}

#[cfg(not(feature = "http"))]
fn default_activator() -> crate::loader::activator::FileActivator {
    crate::loader::activator::FileActivator::new()
}

/// Handle to a running loader
#[derive(Debug, Clone)]
pub struct LoaderHandle {
    id: Uuid,
    tx: mpsc::UnboundedSender<LoaderCommand>,
    namespace: Namespace,
}

impl LoaderHandle {
    /// Spawn a loader with `config` and the default activator
    pub fn spawn(config: LoaderConfig) -> Result<Self, LoaderError> {
        LoaderBuilder::new(config).spawn()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Namespace the loader resolves against
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn send(&self, command: LoaderCommand) -> Result<(), LoaderError> {
        self.tx.send(command).map_err(|_| LoaderError::Stopped)
    }

    /// Queue a resolution and return the receiver its outcome arrives on
    pub fn submit(
        &self,
        dependencies: Vec<Dependency>,
        args: Vec<Value>,
    ) -> Result<oneshot::Receiver<ResolveOutcome>, LoaderError> {
        let (tx, rx) = oneshot::channel();
        self.send(LoaderCommand::Resolve(ResolveRequest::new(
            dependencies,
            args,
            Continuation::Channel(tx),
        )))?;
        Ok(rx)
    }

    /// Resolve `dependencies` and wait for the continuation arguments
    pub async fn resolve(&self, dependencies: Vec<Dependency>, args: Vec<Value>) -> ResolveOutcome {
        let rx = self.submit(dependencies, args)?;
        rx.await.map_err(|_| LoaderError::Stopped)?
    }

    /// Resolve `dependencies` and invoke `callback` with the outcome
    ///
    /// The callback runs on the loader task; it must not block.
    pub fn resolve_with<F>(
        &self,
        dependencies: Vec<Dependency>,
        args: Vec<Value>,
        callback: F,
    ) -> Result<(), LoaderError>
    where
        F: FnOnce(ResolveOutcome) + Send + 'static,
    {
        self.send(LoaderCommand::Resolve(ResolveRequest::new(
            dependencies,
            args,
            Continuation::Callback(Box::new(callback)),
        )))
    }

    pub async fn status(&self) -> Result<LoaderStatus, LoaderError> {
        let (tx, rx) = oneshot::channel();
        self.send(LoaderCommand::Status(tx))?;
        rx.await.map_err(|_| LoaderError::Stopped)
    }

    /// Abandon all outstanding resolutions
    ///
    /// Their continuations receive `LoaderError::Reset`. Returns how many
    /// were abandoned. Activations already running still finish, but their
    /// completions are ignored.
    pub async fn reset(&self) -> Result<usize, LoaderError> {
        let (tx, rx) = oneshot::channel();
        self.send(LoaderCommand::Reset(tx))?;
        rx.await.map_err(|_| LoaderError::Stopped)
    }

    /// Stop the loader; outstanding resolutions receive `LoaderError::Stopped`
    pub fn shutdown(&self) -> Result<(), LoaderError> {
        self.send(LoaderCommand::Shutdown)
    }

    /// Reference that does not keep the loader running
    pub fn downgrade(&self) -> WeakLoaderHandle {
        WeakLoaderHandle {
            id: self.id,
            tx: self.tx.downgrade(),
            namespace: self.namespace.clone(),
        }
    }
}

/// Non-owning reference to a loader, held by registration slots
#[derive(Debug, Clone)]
pub struct WeakLoaderHandle {
    id: Uuid,
    tx: mpsc::WeakUnboundedSender<LoaderCommand>,
    namespace: Namespace,
}

impl WeakLoaderHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// `None` once every `LoaderHandle` for the loader is gone
    pub fn upgrade(&self) -> Option<LoaderHandle> {
        Some(LoaderHandle {
            id: self.id,
            tx: self.tx.upgrade()?,
            namespace: self.namespace.clone(),
        })
    }
}

/// State owned by the loader task
struct LoaderActor {
    id: Uuid,
    rx: mpsc::UnboundedReceiver<LoaderCommand>,
    /// Weak so the task ends once every handle is gone
    weak_tx: mpsc::WeakUnboundedSender<LoaderCommand>,
    state: ResolverState,
    namespace: Namespace,
    activator: Arc<dyn ResourceActivator>,
    address_options: AddressOptions,
    passive: bool,
    activation_timeout: Option<Duration>,
    sink: DiagnosticSink,
    teardown: TeardownController,
    activations: u64,
}

impl LoaderActor {
    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            match command {
                LoaderCommand::Resolve(request) => {
                    let effects = self.state.submit(Attempt::Fresh(request), &self.namespace);
                    self.apply(effects);
                    self.check_idle();
                }
                LoaderCommand::ActivationFinished {
                    resource,
                    token,
                    result,
                } => {
                    match &result {
                        Ok(()) => self.sink.log(format!("\"{}\" is loaded complete.", resource)),
                        Err(e) => self.sink.log(format!("\"{}\" failed to load: {}", resource, e)),
                    };
                    let effects =
                        self.state
                            .activation_finished(&resource, token, result, &self.namespace);
                    self.apply(effects);
                    self.check_idle();
                }
                LoaderCommand::Status(reply) => {
                    let _ = reply.send(self.status());
                }
                LoaderCommand::Reset(reply) => {
                    let dropped = self.state.reset();
                    let count = dropped.len();
                    for context in dropped {
                        context.finish(Err(LoaderError::Reset));
                    }
                    info!("Loader {} reset, {} resolutions abandoned", self.id, count);
                    let _ = reply.send(count);
                }
                LoaderCommand::Shutdown => break,
            }
        }

        for context in self.state.reset() {
            context.finish(Err(LoaderError::Stopped));
        }
        info!("Loader {} stopped", self.id);
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Activate { resource, token } => self.activate(resource, token),
                Effect::Complete { context, outcome } => {
                    if let Err(LoaderError::Unresolvable {
                        capability,
                        resource,
                    }) = &outcome
                    {
                        self.sink.log(format!(
                            "\"{}\" isn't available because it is missing in \"{}\".",
                            capability, resource
                        ));
                    }
                    if let Err(e) = &outcome {
                        debug!("Context {} failed: {}", context.id(), e);
                    }
                    context.finish(outcome);
                }
            }
        }
    }

    fn activate(&mut self, resource: ResourceName, token: ActivationToken) {
        let address = ResourceAddress::build(&resource, &self.address_options);
        if self.passive {
            self.sink.log(format!(
                "Prevent loading \"{}\" in passive mode.",
                address
            ));
            return;
        }

        let tx = match self.weak_tx.upgrade() {
            Some(tx) => tx,
            None => {
                warn!("Loader {} has no handles left; not loading {}", self.id, resource);
                return;
            }
        };

        self.sink
            .log(format!("Initialize loading of \"{}\".", address));
        self.activations += 1;

        let activator = Arc::clone(&self.activator);
        let namespace = self.namespace.clone();
        let timeout = self.activation_timeout;
        tokio::spawn(async move {
            let result = with_timeout_opt(activator.activate(&address, &namespace), timeout)
                .await
                .unwrap_or_else(|| {
                    Err(ActivationError::Timeout(
                        timeout
                            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
                            .unwrap_or_default(),
                    ))
                });
            // Loader may have stopped meanwhile.
            let _ = tx.send(LoaderCommand::ActivationFinished {
                resource,
                token,
                result,
            });
        });
    }

    fn check_idle(&mut self) {
        if !self.state.is_idle() {
            return;
        }
        self.sink.log("All resources are loaded so far.");
        self.teardown.on_idle();
    }

    fn status(&self) -> LoaderStatus {
        LoaderStatus {
            in_flight: self
                .state
                .in_flight()
                .iter()
                .map(ToString::to_string)
                .collect(),
            pending: self.state.pending_len(),
            torn_down: self.teardown.is_torn_down(),
            activations: self.activations,
            passive: self.passive,
        }
    }
}
