//! Application layer errors

use thiserror::Error;

/// Startup and lifecycle errors raised by the bot host
///
/// Every variant is fatal to startup; nothing is retried internally.
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid state: {0}")]
    State(String),

    #[error("Failed to resolve plugin '{plugin}': {source}")]
    Resolution {
        plugin: String,
        #[source]
        source: PluginError,
    },

    #[error("Plugin '{plugin}' failed during {hook}: {source}")]
    Lifecycle {
        plugin: String,
        hook: LifecycleHook,
        #[source]
        source: PluginError,
    },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Startup cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BotError {
    pub fn config(msg: impl Into<String>) -> Self {
        BotError::Configuration(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        BotError::State(msg.into())
    }
}

/// Lifecycle hook that raised a [`BotError::Lifecycle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleHook {
    Initialize,
    Start,
}

impl LifecycleHook {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleHook::Initialize => "initialize",
            LifecycleHook::Start => "start",
        }
    }
}

impl std::fmt::Display for LifecycleHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by plugin code and the module loader
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Load failed: {0}")]
    Load(String),

    #[error("{0}")]
    Hook(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type PluginResult<T> = Result<T, PluginError>;

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
