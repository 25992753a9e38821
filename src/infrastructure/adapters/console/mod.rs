//! Console gateway for development/testing

use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::errors::BotError;
use crate::domain::traits::{GatewayClient, RawEvent, RawEventHandler, RawEventKind};
use super::handlers::HandlerTable;

const CONSOLE_EVENTS: [RawEventKind; 4] = [
    RawEventKind::Ready,
    RawEventKind::Log,
    RawEventKind::MessageCreate,
    RawEventKind::Disconnected,
];

/// Reads chat lines from stdin and raises them as messages
pub struct ConsoleGateway {
    handlers: Arc<HandlerTable>,
    chat_id: String,
    username: String,
    cancel: CancellationToken,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl ConsoleGateway {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(HandlerTable::new()),
            chat_id: "console".to_string(),
            username: std::env::var("USER").unwrap_or_else(|_| "console".to_string()),
            cancel: CancellationToken::new(),
            reader: Mutex::new(None),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Payload for one console line, in the gateway-neutral message shape
    pub fn message_payload(&self, text: &str) -> serde_json::Value {
        self.line().payload(text)
    }

    fn line(&self) -> ConsoleLine {
        ConsoleLine {
            chat_id: self.chat_id.clone(),
            username: self.username.clone(),
        }
    }

    fn spawn_reader(&self) -> JoinHandle<()> {
        let handlers = self.handlers.clone();
        let cancel = self.cancel.clone();
        let template = self.line();

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            let reason = loop {
                let line = tokio::select! {
                    _ = cancel.cancelled() => break "console gateway disposed",
                    line = lines.next_line() => line,
                };
                match line {
                    Ok(Some(text)) => {
                        let text = text.trim();
                        if !text.is_empty() {
                            handlers.raise(RawEvent::new(RawEventKind::MessageCreate, template.payload(text)));
                        }
                    }
                    Ok(None) => break "stdin closed",
                    Err(e) => {
                        handlers.raise(RawEvent::text(RawEventKind::Log, format!("console read failed: {}", e)));
                        break "stdin error";
                    }
                }
            };
            handlers.raise(RawEvent::new(RawEventKind::Disconnected, json!({ "reason": reason })));
        })
    }
}

struct ConsoleLine {
    chat_id: String,
    username: String,
}

impl ConsoleLine {
    fn payload(&self, text: &str) -> serde_json::Value {
        json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "chat_id": self.chat_id,
            "text": text,
            "author": { "id": self.username, "username": self.username },
            "timestamp": chrono::Utc::now(),
        })
    }
}

impl Default for ConsoleGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GatewayClient for ConsoleGateway {
    fn platform(&self) -> &str {
        "console"
    }

    fn raw_events(&self) -> &[RawEventKind] {
        &CONSOLE_EVENTS
    }

    fn subscribe(&self, kind: RawEventKind, handler: RawEventHandler) {
        self.handlers.subscribe(kind, handler);
    }

    async fn connect(&self, token: &str) -> Result<(), BotError> {
        if token.trim().is_empty() {
            return Err(BotError::Connection("console gateway needs a non-empty token".to_string()));
        }
        if self.cancel.is_cancelled() {
            return Err(BotError::Connection("console gateway was disposed".to_string()));
        }

        tracing::info!("Starting console gateway (dev mode)");
        self.handlers.raise(RawEvent::text(RawEventKind::Log, "console gateway connected"));
        let reader = self.spawn_reader();
        *self.reader.lock().unwrap_or_else(PoisonError::into_inner) = Some(reader);
        self.handlers.raise(RawEvent::bare(RawEventKind::Ready));
        Ok(())
    }

    async fn dispose(&self) {
        self.cancel.cancel();
        let reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(reader) = reader {
            let _ = reader.await;
        }
    }
}
