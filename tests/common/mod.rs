//! Shared fixtures for host integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::sync::mpsc;

use lintas_bot::domain::events::TraceEvent;
use lintas_bot::infrastructure::adapters::HandlerTable;
use lintas_bot::{
    BotError, ConstructPlugin, EventBus, GatewayClient, LifecycleHook, Plugin, PluginContext,
    PluginError, PluginResult, RawEvent, RawEventKind,
};

static INIT: Once = Once::new();

pub fn ensure_init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Ordered record of hook and connect calls, shared across fixtures
#[derive(Default)]
pub struct Journal(Mutex<Vec<String>>);

impl Journal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.0.lock().unwrap().iter().any(|e| e == entry)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    /// Connect succeeds and the gateway reports ready immediately
    Ready,
    /// Connect succeeds but ready never arrives
    Silent,
    /// Connect fails
    Reject,
    /// Connect panics
    Panic,
}

/// In-memory gateway that records `connect` into a journal
pub struct ScriptedGateway {
    handlers: HandlerTable,
    journal: Arc<Journal>,
    behavior: ConnectBehavior,
    disposed: AtomicBool,
}

impl ScriptedGateway {
    pub fn new(journal: Arc<Journal>, behavior: ConnectBehavior) -> Arc<Self> {
        Arc::new(Self {
            handlers: HandlerTable::new(),
            journal,
            behavior,
            disposed: AtomicBool::new(false),
        })
    }

    /// Raise a raw event as if it came off the wire
    pub fn raise(&self, event: RawEvent) {
        self.handlers.raise(event);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GatewayClient for ScriptedGateway {
    fn platform(&self) -> &str {
        "scripted"
    }

    fn raw_events(&self) -> &[RawEventKind] {
        &RawEventKind::ALL
    }

    fn subscribe(&self, kind: RawEventKind, handler: lintas_bot::domain::traits::RawEventHandler) {
        self.handlers.subscribe(kind, handler);
    }

    async fn connect(&self, token: &str) -> Result<(), BotError> {
        self.journal.push("connect");
        match self.behavior {
            ConnectBehavior::Reject => {
                Err(BotError::Connection(format!("token '{}' rejected", token)))
            }
            ConnectBehavior::Silent => Ok(()),
            ConnectBehavior::Panic => panic!("gateway bug"),
            ConnectBehavior::Ready => {
                self.handlers.raise(RawEvent::text(RawEventKind::Log, "scripted gateway connected"));
                self.handlers.raise(RawEvent::bare(RawEventKind::Ready));
                Ok(())
            }
        }
    }

    async fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }
}

/// Plugin that journals its hooks and optionally fails one of them
pub struct RecordingPlugin {
    name: String,
    journal: Arc<Journal>,
    fail_on: Option<LifecycleHook>,
    panic_on: Option<LifecycleHook>,
}

impl RecordingPlugin {
    pub fn new(name: &str, journal: Arc<Journal>) -> Self {
        Self {
            name: name.to_string(),
            journal,
            fail_on: None,
            panic_on: None,
        }
    }

    pub fn failing(mut self, hook: LifecycleHook) -> Self {
        self.fail_on = Some(hook);
        self
    }

    pub fn panicking(mut self, hook: LifecycleHook) -> Self {
        self.panic_on = Some(hook);
        self
    }

    fn record(&self, hook: LifecycleHook) -> PluginResult<()> {
        self.journal.push(format!("{}:{}", hook, self.name));
        if self.panic_on == Some(hook) {
            panic!("{} bug in {}", self.name, hook);
        }
        if self.fail_on == Some(hook) {
            return Err(PluginError::Hook(format!("{} refused to {}", self.name, hook)));
        }
        Ok(())
    }
}

#[async_trait]
impl Plugin for RecordingPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self, _ctx: &PluginContext) -> PluginResult<()> {
        self.record(LifecycleHook::Initialize)
    }

    async fn start(&self, _ctx: &PluginContext) -> PluginResult<()> {
        self.record(LifecycleHook::Start)
    }
}

/// Same behavior as [`RecordingPlugin`], constructed from the host's services
pub struct TypedPlugin(RecordingPlugin);

pub const TYPED_PLUGIN_NAME: &str = "typed";

#[async_trait]
impl Plugin for TypedPlugin {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn initialize(&self, ctx: &PluginContext) -> PluginResult<()> {
        self.0.initialize(ctx).await
    }

    async fn start(&self, ctx: &PluginContext) -> PluginResult<()> {
        self.0.start(ctx).await
    }
}

impl ConstructPlugin for TypedPlugin {
    fn construct(ctx: &PluginContext) -> PluginResult<Self> {
        let journal = ctx.resolve::<Journal>()?;
        Ok(Self(RecordingPlugin::new(TYPED_PLUGIN_NAME, journal)))
    }
}

/// Forward every trace message on `bus` into a channel
pub fn trace_channel(bus: &EventBus) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    bus.on::<TraceEvent, _>(move |e| {
        let _ = tx.send(e.message.clone());
    });
    rx
}

/// Collect trace messages until `last` arrives
pub async fn traces_until(rx: &mut mpsc::UnboundedReceiver<String>, last: &str) -> Vec<String> {
    let mut seen = Vec::new();
    let collect = async {
        while let Some(message) = rx.recv().await {
            let done = message == last;
            seen.push(message);
            if done {
                break;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), collect)
        .await
        .expect("timed out waiting for trace event");
    seen
}

/// Poll until `check` holds
pub async fn eventually(check: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never became true");
}
