//! Bot host - composes the event bus, plugin manager, service registry and
//! gateway client, and drives the phased startup protocol.
//!
//! Startup runs on one background task, strictly in this order:
//! 1. finalize the service registry and load plugins
//! 2. map gateway events onto the bus
//! 3. run every plugin `initialize` hook
//! 4. connect the gateway and wait for it to report ready (`Running`)
//! 5. run every plugin `start` hook
//! 6. park until cancelled
//!
//! Any failure faults the host and ends the task with that error.

mod handle;
mod session;
mod shared;
mod state;

use std::convert::Infallible;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::{oneshot, watch};
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::errors::BotError;
use crate::application::events::{EventBus, EventMapper};
use crate::application::services::ServiceCollection;
use crate::domain::events::ReadyEvent;
use crate::domain::traits::GatewayClient;
use crate::infrastructure::plugins::{DirectoryCollector, ModuleLoader, NativeModuleLoader};
use crate::plugins::trait_def::{
    ConstructPlugin, LibraryCollector, Plugin, PluginCatalog, PluginSource, PluginType,
};
use crate::plugins::PluginManager;

pub use handle::HostHandle;
pub use state::BotState;

use session::StartupSession;
use shared::HostShared;

/// Default command prefix handed to command plugins
pub const DEFAULT_COMMAND_PREFIX: &str = "/";

/// Fluent configuration surface for a [`BotHost`]
pub struct BotHostBuilder {
    client: Arc<dyn GatewayClient>,
    credentials: Option<String>,
    command_prefix: String,
    cancellation: Option<CancellationToken>,
    services: ServiceCollection,
    manager: PluginManager,
}

impl BotHostBuilder {
    pub fn new(client: Arc<dyn GatewayClient>) -> Self {
        Self {
            client,
            credentials: None,
            command_prefix: DEFAULT_COMMAND_PREFIX.to_string(),
            cancellation: None,
            services: ServiceCollection::new(),
            manager: PluginManager::new(Arc::new(NativeModuleLoader::new())),
        }
    }

    /// Login token passed to the gateway on connect
    pub fn with_credentials(mut self, token: impl Into<String>) -> Self {
        self.credentials = Some(token.into());
        self
    }

    pub fn with_command_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.command_prefix = prefix.into();
        self
    }

    /// Cancelling `token` aborts the session; the host's own token is a child of it
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Make `instance` resolvable by plugins
    pub fn with_service<T: std::any::Any + Send + Sync>(mut self, instance: Arc<T>) -> Self {
        self.services.add_singleton(instance);
        self
    }

    pub fn with_plugin<P: Plugin + 'static>(self, plugin: P) -> Self {
        self.with_plugin_instance(Arc::new(plugin))
    }

    pub fn with_plugin_instance(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.manager.add_source(PluginSource::Instance(plugin));
        self
    }

    /// Construct `P` from the plugin context when plugins load
    pub fn with_plugin_type<P: ConstructPlugin>(self) -> Self {
        self.with_plugin_constructor(PluginType::of::<P>())
    }

    pub fn with_plugin_constructor(mut self, plugin_type: PluginType) -> Self {
        self.manager.add_source(PluginSource::Type(plugin_type));
        self
    }

    /// Shared library file or plugin directory, loaded when plugins load
    pub fn with_plugin_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.manager.add_source(PluginSource::Library(path.into()));
        self
    }

    /// Every plugin library found directly under `dir` when plugins load
    pub fn with_plugin_directory(self, dir: impl Into<PathBuf>) -> Self {
        self.with_plugin_collector(Arc::new(DirectoryCollector::new(dir)))
    }

    pub fn with_plugin_collector(mut self, collector: Arc<dyn LibraryCollector>) -> Self {
        self.manager.add_source(PluginSource::Collector(collector));
        self
    }

    /// Replace the dynamic library loader
    pub fn with_module_loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.manager.set_loader(loader);
        self
    }

    pub fn build(self) -> BotHost {
        let credentials = self.credentials.filter(|t| !t.trim().is_empty());
        let initial = if credentials.is_some() {
            BotState::Configured
        } else {
            BotState::Unconfigured
        };
        let cancel = match self.cancellation {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };

        let shared = Arc::new(HostShared::new(
            initial,
            self.client.clone(),
            self.command_prefix,
            self.services,
            cancel,
        ));
        let mapper = EventMapper::new(self.client, shared.bus.clone());
        tracing::debug!("Bot host built with {} plugin sources", self.manager.sources().len());

        BotHost {
            shared,
            credentials,
            pending: Some((self.manager, mapper)),
            task: None,
            abort: None,
        }
    }
}

/// Orchestrates plugin loading, event mapping and the gateway connection
pub struct BotHost {
    shared: Arc<HostShared>,
    credentials: Option<String>,
    pending: Option<(PluginManager, EventMapper)>,
    task: Option<JoinHandle<Result<Infallible, BotError>>>,
    abort: Option<AbortHandle>,
}

impl BotHost {
    pub fn builder(client: Arc<dyn GatewayClient>) -> BotHostBuilder {
        BotHostBuilder::new(client)
    }

    pub fn state(&self) -> BotState {
        self.shared.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<BotState> {
        self.shared.state.subscribe()
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.shared.bus.clone()
    }

    pub fn handle(&self) -> HostHandle {
        HostHandle::new(&self.shared)
    }

    /// Metadata of loaded plugins, in load order
    pub fn catalog(&self) -> PluginCatalog {
        self.shared.catalog.clone()
    }

    pub fn command_prefix(&self) -> &str {
        &self.shared.command_prefix
    }

    /// Register a service for plugins; fails once startup has begun
    pub fn register_service<T: std::any::Any + Send + Sync>(&self, instance: Arc<T>) -> Result<(), BotError> {
        if !self.state().can_start() {
            return Err(BotError::config(format!(
                "cannot register services while {}",
                self.state()
            )));
        }
        self.shared.register(instance)
    }

    /// Launch the startup session on a background task
    pub fn start(&mut self) -> Result<(), BotError> {
        let state = self.state();
        if !state.can_start() {
            return Err(BotError::state(format!("cannot start while {}", state)));
        }
        let token = self
            .credentials
            .clone()
            .ok_or_else(|| BotError::config("login credentials are required before start"))?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| BotError::config("starting the bot host requires a tokio runtime"))?;
        let (manager, mapper) = self
            .pending
            .take()
            .ok_or_else(|| BotError::state("startup session was already launched"))?;

        self.shared
            .transition(&[BotState::Unconfigured, BotState::Configured], BotState::Starting);
        let session = StartupSession::new(self.shared.clone(), manager, mapper, token);
        let task = runtime.spawn(session.run());
        self.abort = Some(task.abort_handle());
        self.task = Some(task);

        info!("Bot host starting");
        Ok(())
    }

    /// Start and return once the gateway is ready and the host is `Running`
    ///
    /// The ready listener is single-shot: it unregisters itself after the
    /// first ready event, and is removed on every error path. Returns the
    /// session's error if it fails first.
    pub async fn start_and_wait(&mut self) -> Result<(), BotError> {
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let listener = self.shared.bus.once::<ReadyEvent, _>(move |_| {
            if let Some(tx) = tx.lock().unwrap_or_else(PoisonError::into_inner).take() {
                let _ = tx.send(());
            }
        });

        let outcome = self.wait_until_running(rx).await;
        self.shared.bus.remove_listener(&listener);
        outcome
    }

    async fn wait_until_running(&mut self, ready: oneshot::Receiver<()>) -> Result<(), BotError> {
        let mut states = self.subscribe_state();
        self.start()?;

        let outcome = {
            let task = self
                .task
                .as_mut()
                .ok_or_else(|| BotError::state("startup task is not available"))?;
            // A finished session wins over a ready signal it raised on the way out.
            tokio::select! {
                biased;
                joined = task => Err(settle(&self.shared, joined)),
                ready = ready => ready.map_err(|_| BotError::Internal("ready listener dropped".to_string())),
            }
        };
        if let Err(e) = outcome {
            self.task = None;
            return Err(e);
        }

        let state = states
            .wait_for(|s| *s != BotState::Starting)
            .await
            .map(|s| *s)
            .unwrap_or(BotState::Disposed);
        match state {
            BotState::Running => Ok(()),
            BotState::Faulted => match self.task.take() {
                Some(task) => Err(settle(&self.shared, task.await)),
                None => Err(BotError::state("host faulted right after the gateway was ready")),
            },
            other => Err(BotError::state(format!("host {} right after the gateway was ready", other))),
        }
    }

    /// Start and hand back the background session
    ///
    /// The returned task only ever resolves with the error that ended the
    /// session; a healthy session never completes.
    pub fn run(&mut self) -> Result<SessionTask, BotError> {
        self.start()?;
        let handle = self
            .task
            .take()
            .ok_or_else(|| BotError::state("startup task is not available"))?;
        Ok(SessionTask {
            handle,
            shared: self.shared.clone(),
        })
    }

    /// Cancel the session, release the gateway client and mark the host `Disposed`
    pub async fn dispose(&mut self) {
        if self.shared.force(BotState::Disposed) == BotState::Disposed {
            return;
        }

        self.shared.cancel.cancel();
        if let Some(abort) = self.abort.take() {
            abort.abort();
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.pending = None;
        self.shared.client.dispose().await;
        info!("Bot host disposed");
    }
}

impl Drop for BotHost {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

/// Background startup session returned by [`BotHost::run`]
pub struct SessionTask {
    handle: JoinHandle<Result<Infallible, BotError>>,
    shared: Arc<HostShared>,
}

impl SessionTask {
    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl Future for SessionTask {
    type Output = BotError;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        Pin::new(&mut this.handle)
            .poll(cx)
            .map(|joined| settle(&this.shared, joined))
    }
}

/// Turn a finished session task into the error that ended it
fn settle(shared: &HostShared, joined: Result<Result<Infallible, BotError>, JoinError>) -> BotError {
    match joined {
        Ok(Ok(never)) => match never {},
        Ok(Err(e)) => e,
        Err(e) if e.is_cancelled() => BotError::Cancelled,
        Err(e) => {
            let err = BotError::Internal(format!("startup task panicked: {}", e));
            shared.fault(&err);
            err
        }
    }
}
