use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::application::errors::BotError;
use crate::application::events::EventBus;
use crate::application::services::{Registry, ServiceCollection};
use crate::domain::events::LogEvent;
use crate::domain::traits::GatewayClient;
use crate::plugins::trait_def::{PluginCatalog, PluginContext};
use super::handle::HostHandle;
use super::state::BotState;

/// State shared between the host, its startup session and plugin handles
pub(crate) struct HostShared {
    pub(crate) state: watch::Sender<BotState>,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) client: Arc<dyn GatewayClient>,
    pub(crate) command_prefix: String,
    pub(crate) registry: Mutex<Registry>,
    pub(crate) catalog: PluginCatalog,
    pub(crate) cancel: CancellationToken,
}

impl HostShared {
    pub(crate) fn new(
        initial: BotState,
        client: Arc<dyn GatewayClient>,
        command_prefix: String,
        services: ServiceCollection,
        cancel: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            state,
            bus: Arc::new(EventBus::new()),
            client,
            command_prefix,
            registry: Mutex::new(Registry::new(services)),
            catalog: PluginCatalog::new(),
            cancel,
        }
    }

    pub(crate) fn state(&self) -> BotState {
        *self.state.borrow()
    }

    /// Move to `to` if the current state is one of `from`
    pub(crate) fn transition(&self, from: &[BotState], to: BotState) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if from.contains(current) {
                *current = to;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::debug!("Host state -> {}", to);
        }
        changed
    }

    /// Unconditionally move to `to`, returning the previous state
    pub(crate) fn force(&self, to: BotState) -> BotState {
        let previous = self.state.send_replace(to);
        tracing::debug!("Host state {} -> {}", previous, to);
        previous
    }

    /// Record a session failure unless the host was already torn down
    pub(crate) fn fault(&self, err: &BotError) {
        let faulted = self.transition(
            &[
                BotState::Unconfigured,
                BotState::Configured,
                BotState::Starting,
                BotState::Running,
            ],
            BotState::Faulted,
        );
        if faulted {
            tracing::error!("Bot host faulted: {}", err);
            self.bus.emit(&LogEvent::new(format!("startup failed: {}", err)));
        } else {
            tracing::debug!("Session ended after teardown: {}", err);
        }
    }

    pub(crate) fn register<T: std::any::Any + Send + Sync>(&self, instance: Arc<T>) -> Result<(), BotError> {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .register(instance)
    }

    /// Seal the registry and build the context handed to plugins
    pub(crate) fn plugin_context(self: &Arc<Self>) -> Result<PluginContext, BotError> {
        let handle = HostHandle::new(self);
        let provider = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .seal(|services| {
                services.add_singleton(self.bus.clone());
                services.add_singleton(Arc::new(handle.clone()));
                services.add_singleton(Arc::new(self.catalog.clone()));
            })?;
        tracing::debug!("Service registry finalized: {:?}", provider.names());
        Ok(PluginContext::new(handle, self.bus.clone(), provider, self.catalog.clone()))
    }
}
