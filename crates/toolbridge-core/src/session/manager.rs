//! Connection manager: the public operation surface of one hop

use super::{HopClient, InstallationProbe};
use crate::engine::{ChannelClosed, ChannelId, CloseReason};
use crate::error::{BridgeError, BridgeResult};
use crate::state::{ConnectionEvent, ConnectionState, Effect, Transition, transition};
use crate::types::{ServerInfo, ToolDescriptor, ToolResult};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard, Notify, broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

struct ManagerState {
    state: ConnectionState,
    /// Channel the current `Connected`/`Executing` state belongs to
    channel: Option<ChannelId>,
    in_flight: usize,
    server_info: Option<ServerInfo>,
    /// Cancels the connect attempt running under `op_lock`, if any
    connecting: Option<CancellationToken>,
}

/// State value plus its change feed. Every write goes through [`Tracker::apply`].
struct Tracker {
    inner: Mutex<ManagerState>,
    state_tx: watch::Sender<ConnectionState>,
    /// Fired whenever a connect attempt enters `Connecting`
    connect_started: Notify,
}

impl Tracker {
    fn apply_locked(
        &self,
        inner: &mut ManagerState,
        event: ConnectionEvent,
    ) -> BridgeResult<Transition> {
        let next = transition(inner.state, event)?;
        if next.next != inner.state {
            debug!("{} -> {} on {:?}", inner.state, next.next, event);
            inner.state = next.next;
            self.state_tx.send_replace(next.next);
        }
        if !next.next.has_channel() {
            inner.channel = None;
            inner.in_flight = 0;
            inner.server_info = None;
            inner.connecting = None;
        }
        Ok(next)
    }

    fn apply(&self, event: ConnectionEvent) -> BridgeResult<Transition> {
        let mut inner = self.inner.lock();
        self.apply_locked(&mut inner, event)
    }

    fn begin_connect(&self) -> BridgeResult<(Transition, CancellationToken)> {
        let mut inner = self.inner.lock();
        let plan = self.apply_locked(&mut inner, ConnectionEvent::ConnectRequested)?;
        let cancel = CancellationToken::new();
        inner.channel = None;
        inner.in_flight = 0;
        inner.server_info = None;
        inner.connecting = Some(cancel.clone());
        drop(inner);
        self.connect_started.notify_waiters();
        Ok((plan, cancel))
    }

    fn connected(&self, channel: ChannelId, info: ServerInfo) -> BridgeResult<()> {
        let mut inner = self.inner.lock();
        self.apply_locked(&mut inner, ConnectionEvent::HandshakeSucceeded)?;
        inner.channel = Some(channel);
        inner.server_info = Some(info);
        inner.connecting = None;
        Ok(())
    }

    /// Move a `Connecting` hop to rest and cancel its attempt.
    ///
    /// Runs without `op_lock`, which the attempt itself is holding.
    fn abort_connect(&self, installed: bool) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != ConnectionState::Connecting {
            return false;
        }
        if let Some(cancel) = inner.connecting.take() {
            cancel.cancel();
        }
        match self.apply_locked(&mut inner, ConnectionEvent::DisconnectRequested { installed }) {
            Ok(_) => true,
            Err(e) => {
                warn!("Ignoring connect abort: {}", e);
                false
            }
        }
    }

    fn begin_call(self: &Arc<Self>) -> BridgeResult<CallGuard> {
        let mut inner = self.inner.lock();
        self.apply_locked(&mut inner, ConnectionEvent::CallIssued)?;
        inner.in_flight += 1;
        Ok(CallGuard {
            tracker: Arc::clone(self),
            channel: inner.channel,
        })
    }

    fn end_call(&self, channel: Option<ChannelId>) {
        let mut inner = self.inner.lock();
        if inner.channel != channel || inner.in_flight == 0 {
            // The channel the call ran on is gone; its count was reset
            return;
        }
        inner.in_flight -= 1;
        let remaining = inner.in_flight;
        if let Err(e) = self.apply_locked(&mut inner, ConnectionEvent::CallCompleted { remaining }) {
            debug!("Ignoring call completion: {}", e);
        }
    }

    /// Apply `ChannelDied` if `channel` is still the live one
    fn channel_died(&self, channel: ChannelId, installed: bool) -> bool {
        let mut inner = self.inner.lock();
        if inner.channel != Some(channel) {
            return false;
        }
        match self.apply_locked(&mut inner, ConnectionEvent::ChannelDied { installed }) {
            Ok(_) => true,
            Err(e) => {
                warn!("Ignoring loss of channel {}: {}", channel, e);
                false
            }
        }
    }

    fn require_connected(&self) -> BridgeResult<()> {
        if self.inner.lock().state.is_connected() {
            Ok(())
        } else {
            Err(BridgeError::NotConnected)
        }
    }
}

/// Marks one call in flight; completes it on drop
struct CallGuard {
    tracker: Arc<Tracker>,
    channel: Option<ChannelId>,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.tracker.end_call(self.channel);
    }
}

/// Drives one hop through install, connect, call and disconnect.
///
/// Every operation either reaches its target state or settles in a known
/// resting state before returning.
pub struct ConnectionManager<C: HopClient> {
    client: Arc<C>,
    probe: Arc<dyn InstallationProbe>,
    call_timeout: Option<Duration>,
    tracker: Arc<Tracker>,
    /// Serializes connect and disconnect
    op_lock: AsyncMutex<()>,
}

impl<C: HopClient> ConnectionManager<C> {
    pub fn new(client: C, probe: impl InstallationProbe + 'static) -> Self {
        let initial = ConnectionState::resting(probe.is_installed());
        let (state_tx, _) = watch::channel(initial);
        Self {
            client: Arc::new(client),
            probe: Arc::new(probe),
            call_timeout: None,
            tracker: Arc::new(Tracker {
                inner: Mutex::new(ManagerState {
                    state: initial,
                    channel: None,
                    in_flight: 0,
                    server_info: None,
                    connecting: None,
                }),
                state_tx,
                connect_started: Notify::new(),
            }),
            op_lock: AsyncMutex::new(()),
        }
    }

    /// Bound every round-trip; `None` waits indefinitely
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn state(&self) -> ConnectionState {
        self.tracker.inner.lock().state
    }

    /// Server metadata from the last successful handshake
    pub fn server_info(&self) -> Option<ServerInfo> {
        self.tracker.inner.lock().server_info.clone()
    }

    /// Calls currently awaiting a reply
    pub fn in_flight(&self) -> usize {
        self.tracker.inner.lock().in_flight
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.tracker.state_tx.subscribe()
    }

    /// Re-check the executable; only moves between resting states
    pub fn refresh_installation(&self) -> ConnectionState {
        let installed = self.probe.is_installed();
        match self.tracker.apply(ConnectionEvent::PresenceChecked { installed }) {
            Ok(t) => t.next,
            Err(_) => self.state(),
        }
    }

    /// An external installer started writing the executable
    pub fn begin_install(&self) -> BridgeResult<ConnectionState> {
        Ok(self.tracker.apply(ConnectionEvent::InstallStarted)?.next)
    }

    pub fn finish_install(&self, success: bool) -> BridgeResult<ConnectionState> {
        let success = success && self.probe.is_installed();
        Ok(self
            .tracker
            .apply(ConnectionEvent::InstallFinished { success })?
            .next)
    }

    /// Tear down any existing channel, open a fresh one and handshake.
    #[instrument(skip(self), fields(peer = %self.client.name()))]
    pub async fn connect(&self) -> BridgeResult<ServerInfo> {
        let _op = self.op_lock.lock().await;

        let installed = self.probe.is_installed();
        self.tracker
            .apply(ConnectionEvent::PresenceChecked { installed })?;
        if !installed {
            return Err(BridgeError::not_installed(self.probe.describe()));
        }

        let (plan, cancel) = self.tracker.begin_connect()?;
        // Subscribe before spawning so an early death is not missed
        let closed = self.client.subscribe_closed();

        let outcome = tokio::select! {
            outcome = self.run_connect_effects(&plan.effects) => outcome,
            _ = cancel.cancelled() => Err(BridgeError::Disconnected),
        };

        match outcome {
            Ok((channel, info)) => {
                if let Err(e) = self.tracker.connected(channel, info.clone()) {
                    // Disconnected between the handshake reply and here
                    self.client.teardown();
                    debug!("Dropping handshake on channel {}: {}", channel, e);
                    return Err(BridgeError::Disconnected);
                }
                self.spawn_monitor(channel, closed);
                info!(
                    "Connected to {} {} on channel {}",
                    info.name, info.version, channel
                );
                Ok(info)
            }
            Err(e) => {
                let installed = self.probe.is_installed();
                match self.tracker.apply(ConnectionEvent::ConnectFailed { installed }) {
                    Ok(rollback) => {
                        self.run_teardown(&rollback.effects);
                        warn!("Connect to {} failed: {}", self.client.name(), e);
                    }
                    // A disconnect already moved the state to rest
                    Err(_) => {
                        self.client.teardown();
                        info!("Connect to {} interrupted by disconnect", self.client.name());
                    }
                }
                Err(e)
            }
        }
    }

    async fn run_connect_effects(
        &self,
        effects: &[Effect],
    ) -> BridgeResult<(ChannelId, ServerInfo)> {
        let mut channel = None;
        let mut info = None;
        for effect in effects {
            match effect {
                Effect::TeardownChannel => {
                    self.client.teardown();
                }
                Effect::SpawnChannel => channel = Some(self.client.open().await?),
                Effect::Handshake => info = Some(self.round_trip(self.client.handshake()).await?),
            }
        }
        match (channel, info) {
            (Some(channel), Some(info)) => Ok((channel, info)),
            _ => Err(BridgeError::invalid_state(
                ConnectionState::Connecting,
                "connect without spawning and handshaking",
            )),
        }
    }

    fn run_teardown(&self, effects: &[Effect]) {
        if effects.contains(&Effect::TeardownChannel) {
            self.client.teardown();
        }
    }

    /// Watch for the channel dying on its own
    fn spawn_monitor(&self, channel: ChannelId, mut closed: broadcast::Receiver<ChannelClosed>) {
        let tracker = Arc::clone(&self.tracker);
        let probe = Arc::clone(&self.probe);
        let client = Arc::clone(&self.client);

        tokio::spawn(async move {
            loop {
                match closed.recv().await {
                    Ok(event) if event.channel != channel => continue,
                    // Local teardowns update the state themselves
                    Ok(ChannelClosed {
                        reason: CloseReason::Teardown,
                        ..
                    }) => return,
                    Ok(event) => {
                        // The engine has already swept the channel
                        if tracker.channel_died(channel, probe.is_installed()) {
                            warn!("Channel {} lost ({:?})", channel, event.reason);
                        }
                        return;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Monitor for {} skipped {} close events", channel, skipped);
                        if client.current_channel() != Some(channel) {
                            tracker.channel_died(channel, probe.is_installed());
                            return;
                        }
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        });
    }

    /// List the peer's tools
    #[instrument(skip(self))]
    pub async fn list_tools(&self) -> BridgeResult<Vec<ToolDescriptor>> {
        self.tracker.require_connected()?;
        self.round_trip(self.client.list_tools()).await
    }

    /// Invoke a tool. A tool-level failure comes back as `Ok` with
    /// `is_error` set; transport, protocol and remote failures are `Err`.
    #[instrument(skip(self, arguments))]
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> BridgeResult<ToolResult> {
        let _call = self.tracker.begin_call()?;
        self.round_trip(self.client.call_tool(name, arguments))
            .await
            .map_err(|e| match e {
                BridgeError::Timeout { .. } => e.with_context(format!("calling tool '{}'", name)),
                other => other,
            })
    }

    /// Tear the channel down. Safe to call in any state, any number of times.
    #[instrument(skip(self), fields(peer = %self.client.name()))]
    pub async fn disconnect(&self) -> BridgeResult<()> {
        let (_op, aborted) = self.lock_aborting_connects().await;

        let had_channel = aborted || self.state().has_channel();
        let installed = self.probe.is_installed();
        let plan = self
            .tracker
            .apply(ConnectionEvent::DisconnectRequested { installed })?;

        if plan.effects.contains(&Effect::TeardownChannel) {
            self.client.close().await;
        }
        if had_channel {
            info!("Disconnected from {}", self.client.name());
        }
        Ok(())
    }

    /// Take `op_lock`, cancelling every connect attempt that holds or
    /// acquires it first
    async fn lock_aborting_connects(&self) -> (MutexGuard<'_, ()>, bool) {
        let mut aborted = false;
        loop {
            let started = self.tracker.connect_started.notified();
            tokio::pin!(started);
            started.as_mut().enable();

            if self.tracker.abort_connect(self.probe.is_installed()) {
                self.client.teardown();
                aborted = true;
            }
            tokio::select! {
                guard = self.op_lock.lock() => return (guard, aborted),
                _ = &mut started => {}
            }
        }
    }

    async fn round_trip<T>(&self, call: impl Future<Output = BridgeResult<T>>) -> BridgeResult<T> {
        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| BridgeError::timeout(limit))?,
            None => call.await,
        }
    }
}

impl<C: HopClient> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        self.client.teardown();
    }
}
