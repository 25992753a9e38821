//! Bot host startup and teardown
//! Run with: cargo test --test host_lifecycle_test

mod common;

use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use common::*;
use lintas_bot::domain::events::{LogEvent, MessageReceived, ReadyEvent};
use lintas_bot::plugins::PluginCatalog;
use lintas_bot::{
    BotError, BotHost, BotState, EventBus, HostHandle, LifecycleHook, Plugin, PluginContext,
    PluginResult, RawEvent, RawEventKind,
};

fn host_with(gateway: Arc<ScriptedGateway>) -> lintas_bot::BotHostBuilder {
    ensure_init();
    BotHost::builder(gateway).with_credentials("test-token")
}

fn count_ready(bus: &EventBus) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    bus.on::<ReadyEvent, _>(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    count
}

#[tokio::test]
async fn test_zero_plugins_reach_running() {
    let journal = Journal::new();
    let gateway = ScriptedGateway::new(journal.clone(), ConnectBehavior::Ready);
    let mut host = host_with(gateway).build();
    assert_eq!(host.state(), BotState::Configured);
    let mut traces = trace_channel(&host.bus());

    host.start_and_wait().await.unwrap();

    assert_eq!(host.state(), BotState::Running);
    assert_eq!(journal.entries(), vec!["connect"]);
    assert_eq!(
        traces_until(&mut traces, "plugins started").await,
        vec![
            "plugins loaded: 0",
            "events mapped: 5",
            "plugins initialized",
            "plugins started",
        ]
    );
    host.dispose().await;
}

#[tokio::test]
async fn test_hooks_and_connect_run_in_phase_order() {
    let journal = Journal::new();
    let gateway = ScriptedGateway::new(journal.clone(), ConnectBehavior::Ready);
    let mut host = host_with(gateway)
        .with_plugin(RecordingPlugin::new("A", journal.clone()))
        .with_plugin(RecordingPlugin::new("B", journal.clone()))
        .build();
    let mut traces = trace_channel(&host.bus());

    host.start_and_wait().await.unwrap();
    traces_until(&mut traces, "plugins started").await;

    assert_eq!(
        journal.entries(),
        vec!["initialize:A", "initialize:B", "connect", "start:A", "start:B"]
    );
    assert_eq!(host.catalog().names(), vec!["A", "B"]);
    host.dispose().await;
}

#[tokio::test]
async fn test_initialize_failure_faults_before_connecting() {
    let journal = Journal::new();
    let gateway = ScriptedGateway::new(journal.clone(), ConnectBehavior::Ready);
    let mut host = host_with(gateway)
        .with_plugin(RecordingPlugin::new("A", journal.clone()).failing(LifecycleHook::Initialize))
        .with_plugin(RecordingPlugin::new("B", journal.clone()))
        .build();
    let ready = count_ready(&host.bus());
    let logs = Arc::new(Mutex::new(Vec::new()));
    let l = logs.clone();
    host.bus().on::<LogEvent, _>(move |e| l.lock().unwrap().push(e.message.clone()));

    let err = host.start_and_wait().await.unwrap_err();

    match err {
        BotError::Lifecycle { plugin, hook, .. } => {
            assert_eq!(plugin, "A");
            assert_eq!(hook, LifecycleHook::Initialize);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(host.state(), BotState::Faulted);
    assert_eq!(journal.entries(), vec!["initialize:A"]);
    assert_eq!(ready.load(Ordering::SeqCst), 0);
    assert!(logs.lock().unwrap().iter().any(|m| m.starts_with("startup failed")));
}

#[tokio::test]
async fn test_start_failure_faults_a_running_host() {
    let journal = Journal::new();
    let gateway = ScriptedGateway::new(journal.clone(), ConnectBehavior::Ready);
    let mut host = host_with(gateway)
        .with_plugin(RecordingPlugin::new("A", journal.clone()).failing(LifecycleHook::Start))
        .with_plugin(RecordingPlugin::new("B", journal.clone()))
        .build();
    let task = host.run().unwrap();

    match task.await {
        BotError::Lifecycle { plugin, hook, .. } => {
            assert_eq!(plugin, "A");
            assert_eq!(hook, LifecycleHook::Start);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(host.state(), BotState::Faulted);
    assert!(!journal.contains("start:B"));
}

#[tokio::test]
async fn test_start_and_wait_reports_the_start_hook_failure() {
    for _ in 0..20 {
        let journal = Journal::new();
        let gateway = ScriptedGateway::new(journal.clone(), ConnectBehavior::Ready);
        let mut host = host_with(gateway)
            .with_plugin(RecordingPlugin::new("A", journal.clone()).failing(LifecycleHook::Start))
            .build();

        match host.start_and_wait().await {
            Err(BotError::Lifecycle { plugin, hook, .. }) => {
                assert_eq!(plugin, "A");
                assert_eq!(hook, LifecycleHook::Start);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(host.state(), BotState::Faulted);
    }
}

#[tokio::test]
async fn test_panicking_start_hook_faults_the_host() {
    let journal = Journal::new();
    let gateway = ScriptedGateway::new(journal.clone(), ConnectBehavior::Ready);
    let mut host = host_with(gateway)
        .with_plugin(RecordingPlugin::new("A", journal.clone()).panicking(LifecycleHook::Start))
        .build();

    let err = host.start_and_wait().await.unwrap_err();

    match err {
        BotError::Lifecycle { plugin, hook, source } => {
            assert_eq!(plugin, "A");
            assert_eq!(hook, LifecycleHook::Start);
            assert!(source.to_string().contains("A bug in start"), "{source}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(host.state(), BotState::Faulted);
}

#[tokio::test]
async fn test_panicking_gateway_faults_without_joining_the_session() {
    let journal = Journal::new();
    let gateway = ScriptedGateway::new(journal.clone(), ConnectBehavior::Panic);
    let mut host = host_with(gateway).build();
    let mut states = host.subscribe_state();

    let _session = host.run().unwrap();
    let state = tokio::time::timeout(Duration::from_secs(5), states.wait_for(|s| s.is_terminal()))
        .await
        .unwrap()
        .map(|s| *s)
        .unwrap();

    assert_eq!(state, BotState::Faulted);
    assert_eq!(host.bus().listener_count::<ReadyEvent>(), 0);
}

#[tokio::test]
async fn test_failed_start_and_wait_leaves_no_ready_listener() {
    let journal = Journal::new();
    let gateway = ScriptedGateway::new(journal.clone(), ConnectBehavior::Ready);
    let mut unconfigured = BotHost::builder(gateway).build();
    for _ in 0..3 {
        assert!(matches!(
            unconfigured.start_and_wait().await,
            Err(BotError::Configuration(_))
        ));
    }
    assert_eq!(unconfigured.bus().listener_count::<ReadyEvent>(), 0);

    let gateway = ScriptedGateway::new(journal.clone(), ConnectBehavior::Ready);
    let mut faulted = host_with(gateway)
        .with_plugin(RecordingPlugin::new("A", journal.clone()).failing(LifecycleHook::Initialize))
        .build();
    assert!(faulted.start_and_wait().await.is_err());
    assert!(matches!(faulted.start_and_wait().await, Err(BotError::State(_))));
    assert_eq!(faulted.bus().listener_count::<ReadyEvent>(), 0);
}

#[tokio::test]
async fn test_second_start_is_rejected() {
    let journal = Journal::new();
    let gateway = ScriptedGateway::new(journal.clone(), ConnectBehavior::Silent);
    let mut host = host_with(gateway).build();

    host.start().unwrap();
    assert_eq!(host.state(), BotState::Starting);
    assert!(matches!(host.start(), Err(BotError::State(_))));
    assert!(matches!(host.run(), Err(BotError::State(_))));

    eventually(|| journal.contains("connect")).await;
    host.dispose().await;
    assert_eq!(journal.entries(), vec!["connect"]);
}

#[tokio::test]
async fn test_missing_credentials_fail_fast() {
    let journal = Journal::new();
    let gateway = ScriptedGateway::new(journal.clone(), ConnectBehavior::Ready);
    let mut host = BotHost::builder(gateway.clone()).build();
    assert_eq!(host.state(), BotState::Unconfigured);

    assert!(matches!(host.start(), Err(BotError::Configuration(_))));
    assert_eq!(host.state(), BotState::Unconfigured);

    let blank = BotHost::builder(gateway).with_credentials("   ").build();
    assert_eq!(blank.state(), BotState::Unconfigured);
    assert!(journal.entries().is_empty());
}

#[test]
fn test_start_requires_a_runtime() {
    let journal = Journal::new();
    let gateway = ScriptedGateway::new(journal, ConnectBehavior::Ready);
    let mut host = BotHost::builder(gateway).with_credentials("token").build();

    assert!(matches!(host.start(), Err(BotError::Configuration(_))));
    assert_eq!(host.state(), BotState::Configured);
}

#[tokio::test]
async fn test_type_and_instance_sources_behave_alike() {
    async fn run(by_type: bool) -> Vec<String> {
        let journal = Journal::new();
        let gateway = ScriptedGateway::new(journal.clone(), ConnectBehavior::Ready);
        let builder = host_with(gateway).with_service(journal.clone());
        let mut host = if by_type {
            builder.with_plugin_type::<TypedPlugin>().build()
        } else {
            builder
                .with_plugin(RecordingPlugin::new(TYPED_PLUGIN_NAME, journal.clone()))
                .build()
        };
        let mut traces = trace_channel(&host.bus());
        host.start_and_wait().await.unwrap();
        traces_until(&mut traces, "plugins started").await;
        host.dispose().await;
        journal.entries()
    }

    let by_type = run(true).await;
    assert_eq!(by_type, vec!["initialize:typed", "connect", "start:typed"]);
    assert_eq!(by_type, run(false).await);
}

#[tokio::test]
async fn test_unresolvable_type_aborts_startup() {
    let journal = Journal::new();
    let gateway = ScriptedGateway::new(journal.clone(), ConnectBehavior::Ready);
    // No Journal service registered
    let mut host = host_with(gateway).with_plugin_type::<TypedPlugin>().build();

    let err = host.start_and_wait().await.unwrap_err();
    assert!(matches!(err, BotError::Resolution { .. }), "{err}");
    assert_eq!(host.state(), BotState::Faulted);
    assert!(journal.entries().is_empty());
}

#[tokio::test]
async fn test_gateway_rejection_is_a_connection_error() {
    let journal = Journal::new();
    let gateway = ScriptedGateway::new(journal.clone(), ConnectBehavior::Reject);
    let mut host = host_with(gateway)
        .with_plugin(RecordingPlugin::new("A", journal.clone()))
        .build();

    let err = host.start_and_wait().await.unwrap_err();

    assert!(matches!(err, BotError::Connection(_)), "{err}");
    assert_eq!(host.state(), BotState::Faulted);
    assert_eq!(journal.entries(), vec!["initialize:A", "connect"]);
    assert_eq!(host.bus().listener_count::<ReadyEvent>(), 0);
}

#[tokio::test]
async fn test_caller_cancellation_faults_a_starting_host() {
    let journal = Journal::new();
    let gateway = ScriptedGateway::new(journal.clone(), ConnectBehavior::Silent);
    let token = CancellationToken::new();
    let mut host = host_with(gateway)
        .with_plugin(RecordingPlugin::new("A", journal.clone()))
        .with_cancellation(token.clone())
        .build();

    let task = host.run().unwrap();
    eventually(|| journal.contains("connect")).await;
    assert_eq!(host.state(), BotState::Starting);

    token.cancel();
    let err = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap();
    assert!(matches!(err, BotError::Cancelled), "{err}");
    assert_eq!(host.state(), BotState::Faulted);
    assert!(!journal.contains("start:A"));
}

#[tokio::test]
async fn test_dispose_tears_down_a_running_host() {
    let journal = Journal::new();
    let gateway = ScriptedGateway::new(journal.clone(), ConnectBehavior::Ready);
    let mut host = host_with(gateway.clone()).build();
    let handle = host.handle();

    host.start_and_wait().await.unwrap();
    assert_eq!(handle.state(), BotState::Running);

    host.dispose().await;
    assert_eq!(host.state(), BotState::Disposed);
    assert_eq!(handle.state(), BotState::Disposed);
    assert!(gateway.is_disposed());

    host.dispose().await;
    assert!(matches!(host.start(), Err(BotError::State(_))));
}

#[tokio::test]
async fn test_services_are_frozen_once_started() {
    let journal = Journal::new();
    let gateway = ScriptedGateway::new(journal.clone(), ConnectBehavior::Ready);
    let mut host = host_with(gateway).with_plugin_type::<TypedPlugin>().build();

    host.register_service(journal.clone()).unwrap();
    host.start_and_wait().await.unwrap();

    assert!(matches!(
        host.register_service(Arc::new(42u32)),
        Err(BotError::Configuration(_))
    ));
    assert!(journal.contains("initialize:typed"));
    host.dispose().await;
}

#[tokio::test]
async fn test_ready_listeners_are_single_shot() {
    let journal = Journal::new();
    let gateway = ScriptedGateway::new(journal, ConnectBehavior::Ready);
    let mut host = host_with(gateway.clone()).build();
    let ready = count_ready(&host.bus());

    host.start_and_wait().await.unwrap();
    assert_eq!(host.bus().listener_count::<ReadyEvent>(), 1);

    gateway.raise(RawEvent::bare(RawEventKind::Ready));
    assert_eq!(ready.load(Ordering::SeqCst), 2);
    assert_eq!(host.state(), BotState::Running);
    host.dispose().await;
}

#[tokio::test]
async fn test_messages_reach_the_bus_once_running() {
    let journal = Journal::new();
    let gateway = ScriptedGateway::new(journal, ConnectBehavior::Ready);
    let mut host = host_with(gateway.clone()).build();
    let received = Arc::new(Mutex::new(Vec::new()));
    let r = received.clone();
    host.bus().on::<MessageReceived, _>(move |e| {
        r.lock().unwrap().push((
            e.message.platform.clone(),
            e.message.content.text().map(str::to_string),
        ));
    });

    host.start_and_wait().await.unwrap();
    gateway.raise(RawEvent::new(
        RawEventKind::MessageCreate,
        json!({ "chat_id": "room-1", "text": "/ping", "author": { "id": "u1" } }),
    ));

    assert_eq!(
        *received.lock().unwrap(),
        vec![("scripted".to_string(), Some("/ping".to_string()))]
    );
    host.dispose().await;
}

struct IntrospectingPlugin {
    journal: Arc<Journal>,
}

#[async_trait::async_trait]
impl Plugin for IntrospectingPlugin {
    fn name(&self) -> &str {
        "introspect"
    }

    async fn initialize(&self, ctx: &PluginContext) -> PluginResult<()> {
        let handle = ctx.resolve::<HostHandle>()?;
        ctx.resolve::<EventBus>()?;
        ctx.resolve::<PluginCatalog>()?;
        self.journal.push(format!("initialize:{}", handle.state()));
        self.journal.push(format!("prefix:{}", handle.command_prefix().unwrap_or_default()));
        Ok(())
    }

    async fn start(&self, ctx: &PluginContext) -> PluginResult<()> {
        self.journal.push(format!("start:{}", ctx.host().state()));
        self.journal.push(format!("catalog:{}", ctx.catalog().names().join(",")));
        Ok(())
    }
}

#[tokio::test]
async fn test_plugins_see_the_host_through_services() {
    let journal = Journal::new();
    let gateway = ScriptedGateway::new(journal.clone(), ConnectBehavior::Ready);
    let mut host = host_with(gateway)
        .with_command_prefix("!")
        .with_plugin(IntrospectingPlugin { journal: journal.clone() })
        .build();
    let mut traces = trace_channel(&host.bus());

    host.start_and_wait().await.unwrap();
    traces_until(&mut traces, "plugins started").await;

    assert_eq!(
        journal.entries(),
        vec![
            "initialize:starting",
            "prefix:!",
            "connect",
            "start:running",
            "catalog:introspect",
        ]
    );
    host.dispose().await;
}
