//! Startup session - the phased protocol run on the background task

use std::convert::Infallible;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::errors::{panic_message, BotError};
use crate::application::events::{EventBus, EventMapper, Listener};
use crate::domain::events::{ReadyEvent, TraceEvent};
use crate::plugins::PluginManager;
use super::shared::HostShared;
use super::state::BotState;

pub(crate) struct StartupSession {
    shared: Arc<HostShared>,
    manager: PluginManager,
    mapper: EventMapper,
    token: String,
}

impl StartupSession {
    pub(crate) fn new(
        shared: Arc<HostShared>,
        manager: PluginManager,
        mapper: EventMapper,
        token: String,
    ) -> Self {
        Self {
            shared,
            manager,
            mapper,
            token,
        }
    }

    /// Drive every phase; only ever completes with the failure that stopped it
    ///
    /// A panic anywhere in the phases faults the host like any other failure.
    pub(crate) async fn run(mut self) -> Result<Infallible, BotError> {
        let err = match AssertUnwindSafe(self.drive()).catch_unwind().await {
            Ok(Ok(never)) => match never {},
            Ok(Err(e)) => e,
            Err(payload) => BotError::Internal(format!(
                "startup session panicked: {}",
                panic_message(payload.as_ref())
            )),
        };
        self.shared.fault(&err);
        Err(err)
    }

    async fn drive(&mut self) -> Result<Infallible, BotError> {
        let cancel = self.shared.cancel.clone();
        let bus = self.shared.bus.clone();

        // 1. load plugins
        let ctx = self.shared.plugin_context()?;
        let loaded = guarded(&cancel, self.manager.load_all(&ctx)).await?;

        // 2. map events
        let mapped = self.mapper.map_all_events()?;
        info!("Mapped {} gateway events", mapped);
        bus.emit(&TraceEvent::new(format!("events mapped: {}", mapped)));

        // 3. initialize hooks
        guarded(&cancel, self.manager.invoke_initialize()).await?;

        // 4. connect and wait for the gateway to report ready
        let ready = ReadySignal::arm(&bus);
        info!("Connecting to {} with {} plugins", self.shared.client.platform(), loaded);
        guarded(&cancel, self.shared.client.connect(&self.token)).await?;
        guarded(&cancel, ready.wait()).await?;
        if !self.shared.transition(&[BotState::Starting], BotState::Running) {
            return Err(BotError::state(format!(
                "host left the starting state ({}) before the gateway was ready",
                self.shared.state()
            )));
        }
        info!("Gateway ready, bot host running");

        // 5. start hooks
        guarded(&cancel, self.manager.invoke_start()).await?;

        // 6. stay alive for the lifetime of the connection
        cancel.cancelled().await;
        Err(BotError::Cancelled)
    }
}

/// Race a phase against cancellation
async fn guarded<T>(
    cancel: &CancellationToken,
    phase: impl Future<Output = Result<T, BotError>>,
) -> Result<T, BotError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BotError::Cancelled),
        result = phase => result,
    }
}

/// One-shot subscription to the gateway ready event
///
/// The listener is removed when the signal is dropped, fired or not.
pub(crate) struct ReadySignal {
    bus: Arc<EventBus>,
    listener: Listener<ReadyEvent>,
    rx: oneshot::Receiver<()>,
}

impl ReadySignal {
    pub(crate) fn arm(bus: &Arc<EventBus>) -> Self {
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let listener = bus.once::<ReadyEvent, _>(move |_| {
            if let Some(tx) = tx.lock().unwrap_or_else(PoisonError::into_inner).take() {
                let _ = tx.send(());
            }
        });
        Self {
            bus: bus.clone(),
            listener,
            rx,
        }
    }

    pub(crate) async fn wait(mut self) -> Result<(), BotError> {
        (&mut self.rx)
            .await
            .map_err(|_| BotError::Connection("ready signal was dropped".to_string()))
    }
}

impl Drop for ReadySignal {
    fn drop(&mut self) {
        self.bus.remove_listener(&self.listener);
    }
}
