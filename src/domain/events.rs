//! Application events published on the event bus

use super::entities::Message;

/// Free-form log line raised by the gateway, the host or a plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub message: String,
}

impl LogEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Diagnostic marker emitted when a startup phase completes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub message: String,
}

impl TraceEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// The gateway connection is established and usable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyEvent;

/// A chat message arrived
#[derive(Debug, Clone)]
pub struct MessageReceived {
    pub message: Message,
}

/// The gateway connection dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectedEvent {
    pub reason: Option<String>,
}
