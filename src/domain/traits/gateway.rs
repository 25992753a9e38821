use async_trait::async_trait;
use std::sync::Arc;
use crate::application::errors::BotError;

/// Raw event kinds a gateway client can raise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawEventKind {
    Ready,
    Log,
    Debug,
    MessageCreate,
    Disconnected,
}

impl RawEventKind {
    pub const ALL: [RawEventKind; 5] = [
        RawEventKind::Ready,
        RawEventKind::Log,
        RawEventKind::Debug,
        RawEventKind::MessageCreate,
        RawEventKind::Disconnected,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            RawEventKind::Ready => "ready",
            RawEventKind::Log => "log",
            RawEventKind::Debug => "debug",
            RawEventKind::MessageCreate => "message_create",
            RawEventKind::Disconnected => "disconnected",
        }
    }
}

/// Native event as delivered by the client
///
/// The payload shapes are:
/// - `Log` / `Debug`: a JSON string, or an object with a `message` field
/// - `MessageCreate`: `{ id, chat_id, text, author: { id, username, display_name, is_bot }, timestamp }`
/// - `Disconnected`: an object with an optional `reason`
/// - `Ready`: ignored
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub kind: RawEventKind,
    pub payload: serde_json::Value,
}

impl RawEvent {
    pub fn new(kind: RawEventKind, payload: serde_json::Value) -> Self {
        Self { kind, payload }
    }

    pub fn bare(kind: RawEventKind) -> Self {
        Self::new(kind, serde_json::Value::Null)
    }

    pub fn text(kind: RawEventKind, text: impl Into<String>) -> Self {
        Self::new(kind, serde_json::Value::String(text.into()))
    }
}

/// Handler invoked synchronously on the client's thread of control
pub type RawEventHandler = Arc<dyn Fn(&RawEvent) + Send + Sync>;

/// Real-time gateway client wrapped by the bot host
///
/// The host only subscribes, connects and disposes; the wire protocol lives
/// entirely behind this trait.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Short platform name used in logs and message metadata
    fn platform(&self) -> &str;

    /// Every raw event kind this client can raise
    fn raw_events(&self) -> &[RawEventKind];

    /// Register a handler for one raw event kind
    fn subscribe(&self, kind: RawEventKind, handler: RawEventHandler);

    /// Open the connection with the given credential token
    async fn connect(&self, token: &str) -> Result<(), BotError>;

    /// Release connection resources; must be safe to call more than once
    async fn dispose(&self);
}
