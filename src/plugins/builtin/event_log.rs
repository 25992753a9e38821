//! Event log plugin - forwards bus traffic to `tracing`

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::application::errors::PluginResult;
use crate::application::events::{EventBus, Listener};
use crate::domain::events::{DisconnectedEvent, LogEvent, MessageReceived, TraceEvent};
use crate::plugins::trait_def::{ConstructPlugin, Plugin, PluginContext};

pub struct EventLogPlugin {
    bus: Arc<EventBus>,
    log_messages: bool,
    forwarders: Mutex<Forwarders>,
}

#[derive(Default)]
struct Forwarders {
    log: Option<Listener<LogEvent>>,
    trace: Option<Listener<TraceEvent>>,
    disconnected: Option<Listener<DisconnectedEvent>>,
    messages: Option<Listener<MessageReceived>>,
}

impl EventLogPlugin {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            log_messages: true,
            forwarders: Mutex::new(Forwarders::default()),
        }
    }

    /// Also log every incoming chat message at debug level
    pub fn with_message_log(mut self, enabled: bool) -> Self {
        self.log_messages = enabled;
        self
    }

    /// Detach every forwarder registered by `initialize`
    pub fn detach(&self) {
        let forwarders = std::mem::take(&mut *self.forwarders.lock().unwrap_or_else(PoisonError::into_inner));
        if let Some(l) = forwarders.log {
            self.bus.remove_listener(&l);
        }
        if let Some(l) = forwarders.trace {
            self.bus.remove_listener(&l);
        }
        if let Some(l) = forwarders.disconnected {
            self.bus.remove_listener(&l);
        }
        if let Some(l) = forwarders.messages {
            self.bus.remove_listener(&l);
        }
    }
}

#[async_trait]
impl Plugin for EventLogPlugin {
    fn name(&self) -> &str {
        "event-log"
    }

    fn description(&self) -> &str {
        "Forwards log, trace and connection events to the process log"
    }

    fn metadata(&self) -> HashMap<String, String> {
        HashMap::from([("messages".to_string(), self.log_messages.to_string())])
    }

    async fn initialize(&self, _ctx: &PluginContext) -> PluginResult<()> {
        self.detach();
        let mut forwarders = Forwarders {
            log: Some(self.bus.on::<LogEvent, _>(|e| info!(target: "lintas_bot::events", "{}", e.message))),
            trace: Some(self.bus.on::<TraceEvent, _>(|e| debug!(target: "lintas_bot::events", "trace: {}", e.message))),
            disconnected: Some(self.bus.on::<DisconnectedEvent, _>(|e| {
                warn!(target: "lintas_bot::events", "disconnected: {}", e.reason.as_deref().unwrap_or("no reason given"));
            })),
            messages: None,
        };
        if self.log_messages {
            forwarders.messages = Some(self.bus.on::<MessageReceived, _>(|e| {
                let sender = e.message.sender.as_ref().map(|u| u.label().to_string()).unwrap_or_default();
                let preview: String = e.message.content.text().unwrap_or("").chars().take(50).collect();
                debug!(target: "lintas_bot::events", "[{}] {}: {}", e.message.chat_id, sender, preview);
            }));
        }
        *self.forwarders.lock().unwrap_or_else(PoisonError::into_inner) = forwarders;
        Ok(())
    }

    async fn start(&self, ctx: &PluginContext) -> PluginResult<()> {
        info!(
            "{} plugins active on {}: {}",
            ctx.catalog().len(),
            ctx.host().platform().unwrap_or_default(),
            ctx.catalog().names().join(", ")
        );
        Ok(())
    }
}

impl ConstructPlugin for EventLogPlugin {
    fn construct(ctx: &PluginContext) -> PluginResult<Self> {
        Ok(Self::new(ctx.resolve::<EventBus>()?))
    }
}
