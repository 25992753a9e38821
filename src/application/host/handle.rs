use std::sync::{Arc, Weak};

use super::shared::HostShared;
use super::state::BotState;

/// Weak handle to the host, passed explicitly to plugins
///
/// Plugins are owned by the host, so the handle never keeps it alive. Once
/// the host is dropped the handle reports `Disposed`.
#[derive(Clone, Default)]
pub struct HostHandle {
    shared: Weak<HostShared>,
}

impl HostHandle {
    pub(crate) fn new(shared: &Arc<HostShared>) -> Self {
        Self {
            shared: Arc::downgrade(shared),
        }
    }

    /// Handle that is not attached to any host
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.shared.strong_count() > 0
    }

    pub fn state(&self) -> BotState {
        self.shared
            .upgrade()
            .map(|shared| shared.state())
            .unwrap_or(BotState::Disposed)
    }

    /// Prefix that higher-level command plugins should react to
    pub fn command_prefix(&self) -> Option<String> {
        self.shared.upgrade().map(|shared| shared.command_prefix.clone())
    }

    pub fn platform(&self) -> Option<String> {
        self.shared.upgrade().map(|shared| shared.client.platform().to_string())
    }

    /// Cancel the running session; the host ends up `Faulted`
    pub fn request_shutdown(&self) {
        if let Some(shared) = self.shared.upgrade() {
            tracing::info!("Shutdown requested by plugin");
            shared.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for HostHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostHandle")
            .field("attached", &self.is_attached())
            .field("state", &self.state())
            .finish()
    }
}
