//! Event mapper - translates raw gateway events into typed application events

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::application::errors::BotError;
use crate::domain::entities::{Content, Message, User};
use crate::domain::events::{DisconnectedEvent, LogEvent, MessageReceived, ReadyEvent, TraceEvent};
use crate::domain::traits::{GatewayClient, RawEvent, RawEventKind};
use super::EventBus;

#[derive(Debug, Deserialize)]
struct MessagePayload {
    id: Option<String>,
    chat_id: String,
    text: Option<String>,
    author: Option<AuthorPayload>,
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct AuthorPayload {
    id: String,
    username: Option<String>,
    display_name: Option<String>,
    #[serde(default)]
    is_bot: bool,
}

#[derive(Debug, Default, Deserialize)]
struct DisconnectPayload {
    reason: Option<String>,
}

/// Binds every raw client event to the bus
pub struct EventMapper {
    client: Arc<dyn GatewayClient>,
    bus: Arc<EventBus>,
    mapped: AtomicBool,
}

impl EventMapper {
    pub fn new(client: Arc<dyn GatewayClient>, bus: Arc<EventBus>) -> Self {
        Self {
            client,
            bus,
            mapped: AtomicBool::new(false),
        }
    }

    /// Register a translator for every raw event the client exposes
    ///
    /// Must run once, before the client connects. A second call fails and
    /// registers nothing. Returns the number of event kinds bound.
    pub fn map_all_events(&self) -> Result<usize, BotError> {
        if self.mapped.swap(true, Ordering::SeqCst) {
            return Err(BotError::config("gateway events are already mapped"));
        }

        let platform: Arc<str> = Arc::from(self.client.platform());
        let kinds = self.client.raw_events();
        for kind in kinds {
            let bus = self.bus.clone();
            let platform = platform.clone();
            self.client.subscribe(*kind, Arc::new(move |event: &RawEvent| {
                translate(&bus, &platform, event);
            }));
            debug!("Mapped raw event: {}", kind.as_str());
        }

        Ok(kinds.len())
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped.load(Ordering::SeqCst)
    }
}

/// Publish the typed counterpart(s) of one raw event
pub fn translate(bus: &EventBus, platform: &str, event: &RawEvent) {
    match event.kind {
        RawEventKind::Ready => bus.emit(&ReadyEvent),
        RawEventKind::Log => bus.emit(&LogEvent::new(payload_text(&event.payload))),
        RawEventKind::Debug => bus.emit(&TraceEvent::new(payload_text(&event.payload))),
        RawEventKind::MessageCreate => match decode_message(platform, &event.payload) {
            Ok(message) => bus.emit(&MessageReceived { message }),
            Err(e) => {
                warn!("Dropping malformed {} payload: {}", event.kind.as_str(), e);
                bus.emit(&LogEvent::new(format!("dropped malformed message payload: {}", e)));
            }
        },
        RawEventKind::Disconnected => {
            let payload: DisconnectPayload =
                serde_json::from_value(event.payload.clone()).unwrap_or_default();
            let line = match &payload.reason {
                Some(reason) => format!("gateway disconnected: {}", reason),
                None => "gateway disconnected".to_string(),
            };
            bus.emit(&DisconnectedEvent { reason: payload.reason });
            bus.emit(&LogEvent::new(line));
        }
    }
}

fn payload_text(payload: &serde_json::Value) -> String {
    match payload {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(map) => map
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| payload.to_string()),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn decode_message(platform: &str, payload: &serde_json::Value) -> Result<Message, serde_json::Error> {
    let decoded: MessagePayload = serde_json::from_value(payload.clone())?;

    let mut message = Message::new(decoded.chat_id, Content::from(decoded.text))
        .with_platform(platform)
        .with_raw(payload.clone());
    if let Some(id) = decoded.id {
        message = message.with_id(id);
    }
    if let Some(ts) = decoded.timestamp {
        message = message.with_timestamp(ts);
    }
    if let Some(author) = decoded.author {
        let mut user = User::new(author.id).as_bot(author.is_bot);
        if let Some(username) = author.username {
            user = user.with_username(username);
        }
        if let Some(name) = author.display_name {
            user = user.with_display_name(name);
        }
        message = message.with_sender(user);
    }
    Ok(message)
}
