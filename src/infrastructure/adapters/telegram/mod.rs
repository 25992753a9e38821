//! Telegram gateway - long-polling Bot API client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::errors::BotError;
use crate::domain::traits::{GatewayClient, RawEvent, RawEventHandler, RawEventKind};
use super::handlers::HandlerTable;

/// Telegram API base URL
const API_BASE: &str = "https://api.telegram.org";

/// Long-poll timeout passed to getUpdates
const POLL_TIMEOUT_SECS: i64 = 30;

/// Pause after a failed poll
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Telegram update type
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub date: Option<i64>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BotInfoResponse {
    username: Option<String>,
    first_name: String,
}

impl Message {
    /// Gateway-neutral payload raised as `MessageCreate`
    pub fn to_payload(&self) -> serde_json::Value {
        let author = self.from.as_ref().map(|u| {
            json!({
                "id": u.id.to_string(),
                "username": u.username,
                "display_name": u.first_name,
                "is_bot": u.is_bot,
            })
        });
        let timestamp = self
            .date
            .and_then(|secs| chrono::DateTime::<chrono::Utc>::from_timestamp(secs, 0));
        json!({
            "id": self.message_id.to_string(),
            "chat_id": self.chat.id.to_string(),
            "text": self.text,
            "author": author,
            "timestamp": timestamp,
        })
    }
}

/// Connection to the Telegram Bot API
struct Connection {
    client: Client,
    api_base: String,
    token: String,
}

impl Connection {
    /// Get the API URL for a method
    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Fetch bot info, validating the token
    async fn get_me(&self) -> Result<BotInfoResponse, BotError> {
        let response = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| BotError::Connection(e.to_string()))?;

        let status = response.status();
        let data: ApiResponse<BotInfoResponse> = response
            .json()
            .await
            .map_err(|e| BotError::Connection(format!("unexpected getMe response ({}): {}", status, e)))?;

        match data.result {
            Some(info) if data.ok => Ok(info),
            _ => Err(BotError::Connection(format!(
                "Telegram rejected the credentials: {}",
                data.description.unwrap_or_else(|| status.to_string())
            ))),
        }
    }

    /// Get updates from Telegram using getUpdates API
    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, String> {
        #[derive(Serialize)]
        struct GetUpdatesRequest {
            offset: i64,
            timeout: i64,
            allowed_updates: Vec<String>,
        }

        let request = GetUpdatesRequest {
            offset,
            timeout: POLL_TIMEOUT_SECS,
            allowed_updates: vec!["message".to_string()],
        };

        let response = self
            .client
            .post(self.api_url("getUpdates"))
            .json(&request)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("Telegram API error: {}", response.status()));
        }

        let data: ApiResponse<Vec<Update>> = response.json().await.map_err(|e| e.to_string())?;
        Ok(data.result.unwrap_or_default())
    }
}

/// Get the next update offset
pub fn next_offset(current: i64, updates: &[Update]) -> i64 {
    updates
        .iter()
        .map(|u| u.update_id + 1)
        .max()
        .unwrap_or(current)
        .max(current)
}

/// Telegram gateway client
pub struct TelegramGateway {
    client: Client,
    api_base: String,
    handlers: Arc<HandlerTable>,
    cancel: CancellationToken,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl TelegramGateway {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            api_base: API_BASE.to_string(),
            handlers: Arc::new(HandlerTable::new()),
            cancel: CancellationToken::new(),
            poller: Mutex::new(None),
        }
    }

    /// Point the client at a different Bot API server
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn spawn_poller(&self, connection: Connection) -> JoinHandle<()> {
        let handlers = self.handlers.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;
            loop {
                let polled = tokio::select! {
                    _ = cancel.cancelled() => break,
                    polled = connection.get_updates(offset) => polled,
                };

                match polled {
                    Ok(updates) => {
                        if !updates.is_empty() {
                            tracing::debug!("Received {} updates", updates.len());
                        }
                        offset = next_offset(offset, &updates);
                        for message in updates.iter().filter_map(|u| u.message.as_ref()) {
                            handlers.raise(RawEvent::new(RawEventKind::MessageCreate, message.to_payload()));
                        }
                    }
                    Err(e) => {
                        handlers.raise(RawEvent::text(RawEventKind::Log, format!("Telegram poll failed: {}", e)));
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(RETRY_DELAY) => {}
                        }
                    }
                }
            }
            handlers.raise(RawEvent::new(RawEventKind::Disconnected, json!({ "reason": "gateway disposed" })));
        })
    }
}

impl Default for TelegramGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GatewayClient for TelegramGateway {
    fn platform(&self) -> &str {
        "telegram"
    }

    fn raw_events(&self) -> &[RawEventKind] {
        &RawEventKind::ALL
    }

    fn subscribe(&self, kind: RawEventKind, handler: RawEventHandler) {
        self.handlers.subscribe(kind, handler);
    }

    async fn connect(&self, token: &str) -> Result<(), BotError> {
        if self.cancel.is_cancelled() {
            return Err(BotError::Connection("Telegram gateway was disposed".to_string()));
        }

        let token_preview: String = token.chars().take(8).collect();
        tracing::info!("Connecting to Telegram (token: {}...)", token_preview);
        let connection = Connection {
            client: self.client.clone(),
            api_base: self.api_base.clone(),
            token: token.to_string(),
        };
        self.handlers.raise(RawEvent::text(RawEventKind::Debug, "validating Telegram token"));
        let info = connection.get_me().await?;
        self.handlers.raise(RawEvent::text(
            RawEventKind::Log,
            format!("logged in as @{}", info.username.unwrap_or(info.first_name)),
        ));

        let poller = self.spawn_poller(connection);
        *self.poller.lock().unwrap_or_else(PoisonError::into_inner) = Some(poller);
        self.handlers.raise(RawEvent::bare(RawEventKind::Ready));
        Ok(())
    }

    async fn dispose(&self) {
        self.cancel.cancel();
        let poller = self.poller.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(poller) = poller {
            let _ = poller.await;
        }
    }
}
