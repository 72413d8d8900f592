//! The engine core: send, dispatch, teardown

use super::channel::{BoxedReader, BoxedWriter, Channel};
use super::pending::{PendingCall, PendingTable};
use super::{LineProtocol, LoggingNotificationHandler, NotificationHandler};
use crate::error::{BridgeError, BridgeResult};
use crate::framing::{FrameReader, encode_line};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::process::Child;
use tokio::sync::{Mutex as AsyncMutex, broadcast, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of the channel-closed broadcast
const CLOSED_EVENT_CAPACITY: usize = 16;

/// Longest inbound line echoed into a decode warning
const LOG_PREVIEW_BYTES: usize = 200;

/// Identifies one attached channel for the lifetime of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a channel stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Local teardown (disconnect, reconnect, drop)
    Teardown,
    /// The peer closed its output
    EndOfStream,
    /// Reading from the peer failed
    ReadError,
}

/// Published once per channel when it is swept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelClosed {
    pub channel: ChannelId,
    pub reason: CloseReason,
}

struct LiveChannel {
    id: ChannelId,
    writer: Arc<AsyncMutex<BoxedWriter>>,
    process: Option<Child>,
    cancel: CancellationToken,
}

struct EngineState<P: LineProtocol> {
    channel: Option<LiveChannel>,
    pending: PendingTable<P::Id, P::Inbound>,
}

pub(super) struct Shared<P: LineProtocol> {
    state: Mutex<EngineState<P>>,
    closed_tx: broadcast::Sender<ChannelClosed>,
    notifications: RwLock<Arc<dyn NotificationHandler<P>>>,
}

impl<P: LineProtocol> Shared<P> {
    /// Drop the channel handle and fail every pending call.
    ///
    /// Caller holds the state lock, so no entry can be registered between the
    /// handle being cleared and the table being drained.
    fn sweep(state: &mut EngineState<P>) -> Option<ChannelId> {
        let channel = state.channel.take()?;
        channel.cancel.cancel();
        if let Some(mut process) = channel.process {
            if let Err(e) = process.start_kill() {
                debug!("{} channel {}: kill failed: {}", P::NAME, channel.id, e);
            }
        }

        let drained = state.pending.drain();
        if !drained.is_empty() {
            debug!(
                "{} channel {}: failing {} pending call(s)",
                P::NAME,
                channel.id,
                drained.len()
            );
        }
        for (_, resolver) in drained {
            let _ = resolver.send(Err(BridgeError::Disconnected));
        }
        Some(channel.id)
    }

    fn publish_closed(&self, channel: ChannelId, reason: CloseReason) {
        // No subscribers is fine
        let _ = self.closed_tx.send(ChannelClosed { channel, reason });
    }

    /// Reader-side sweep: only touches the channel the reader belonged to
    fn channel_died(&self, channel: ChannelId, reason: CloseReason) {
        let swept = {
            let mut state = self.state.lock();
            let is_current = state.channel.as_ref().map(|c| c.id) == Some(channel);
            if is_current {
                Self::sweep(&mut state)
            } else {
                None
            }
        };
        if let Some(id) = swept {
            info!("{} channel {} closed ({:?})", P::NAME, id, reason);
            self.publish_closed(id, reason);
        }
    }

    fn dispatch(&self, channel: ChannelId, line: &[u8]) {
        let message: P::Inbound = match serde_json::from_slice(line) {
            Ok(message) => message,
            Err(e) => {
                let preview = String::from_utf8_lossy(&line[..line.len().min(LOG_PREVIEW_BYTES)]);
                warn!(
                    "{} channel {}: skipping undecodable line ({}): {}",
                    P::NAME,
                    channel,
                    e,
                    preview
                );
                return;
            }
        };

        let Some(id) = P::inbound_id(&message) else {
            let handler = Arc::clone(&*self.notifications.read());
            handler.handle(&message);
            return;
        };

        let mut state = self.state.lock();
        if state.channel.as_ref().map(|c| c.id) != Some(channel) {
            debug!(
                "{} channel {}: dropping response {} from a stale reader",
                P::NAME,
                channel,
                id
            );
            return;
        }
        match state.pending.take(&id) {
            Some(resolver) => {
                if resolver.send(Ok(message)).is_err() {
                    debug!("{}: caller for {} went away before delivery", P::NAME, id);
                }
            }
            None => {
                debug!("{}: dropping response for unknown request {}", P::NAME, id);
            }
        }
    }

    pub(super) fn forget(&self, id: &P::Id) {
        if self.state.lock().pending.take(id).is_some() {
            debug!("{}: abandoned pending request {}", P::NAME, id);
        }
    }
}

/// Correlated request/response engine over one line-framed channel
pub struct RpcEngine<P: LineProtocol> {
    shared: Arc<Shared<P>>,
    next_channel: AtomicU64,
}

impl<P: LineProtocol> Default for RpcEngine<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: LineProtocol> RpcEngine<P> {
    pub fn new() -> Self {
        let (closed_tx, _) = broadcast::channel(CLOSED_EVENT_CAPACITY);
        let handler: Arc<dyn NotificationHandler<P>> = Arc::new(LoggingNotificationHandler);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(EngineState {
                    channel: None,
                    pending: PendingTable::new(),
                }),
                closed_tx,
                notifications: RwLock::new(handler),
            }),
            next_channel: AtomicU64::new(1),
        }
    }

    /// Replace the handler for identifier-less inbound messages
    pub fn set_notification_handler(&self, handler: Arc<dyn NotificationHandler<P>>) {
        *self.shared.notifications.write() = handler;
    }

    /// Install a channel and start its reader task.
    ///
    /// A channel that is already attached is torn down first.
    pub fn attach(&self, channel: Channel) -> ChannelId {
        let id = ChannelId(self.next_channel.fetch_add(1, Ordering::SeqCst));
        let cancel = CancellationToken::new();

        let replaced = {
            let mut state = self.shared.state.lock();
            let replaced = Shared::sweep(&mut state);
            state.channel = Some(LiveChannel {
                id,
                writer: Arc::new(AsyncMutex::new(channel.writer)),
                process: channel.process,
                cancel: cancel.clone(),
            });
            replaced
        };
        if let Some(old) = replaced {
            self.shared.publish_closed(old, CloseReason::Teardown);
        }

        tokio::spawn(reader_loop(
            Arc::clone(&self.shared),
            id,
            channel.reader,
            cancel,
        ));
        debug!("{} channel {} attached", P::NAME, id);
        id
    }

    /// Write a request and register it under `id`.
    ///
    /// Fails with [`BridgeError::NotConnected`] when no channel is attached;
    /// nothing is registered in that case.
    pub async fn send(&self, id: P::Id, message: &P::Outbound) -> BridgeResult<PendingCall<P>> {
        let bytes = encode_line(message)?;
        let (tx, rx) = oneshot::channel();

        let writer = {
            let mut state = self.shared.state.lock();
            let writer = match &state.channel {
                Some(live) => Arc::clone(&live.writer),
                None => return Err(BridgeError::NotConnected),
            };
            state.pending.insert(id.clone(), tx)?;
            writer
        };
        let call = PendingCall::new(id.clone(), rx, Arc::clone(&self.shared));

        if let Err(e) = write_frame(&writer, &bytes).await {
            // Already swept means the channel died under us
            let still_pending = self.shared.state.lock().pending.contains(&id);
            drop(call);
            return Err(if still_pending {
                BridgeError::transport(e.to_string())
                    .with_context(format!("writing {} request {}", P::NAME, id))
            } else {
                BridgeError::Disconnected
            });
        }
        Ok(call)
    }

    /// Write a message that expects no reply
    pub async fn notify(&self, message: &P::Outbound) -> BridgeResult<()> {
        let bytes = encode_line(message)?;
        let writer = self
            .shared
            .state
            .lock()
            .channel
            .as_ref()
            .map(|live| Arc::clone(&live.writer))
            .ok_or(BridgeError::NotConnected)?;

        write_frame(&writer, &bytes)
            .await
            .map_err(|e| BridgeError::transport(e.to_string()).with_context("writing notification"))
    }

    /// Close the channel and fail every pending call with `Disconnected`.
    ///
    /// Returns `false` when nothing was attached. Safe to call repeatedly.
    pub fn teardown(&self) -> bool {
        let swept = {
            let mut state = self.shared.state.lock();
            Shared::sweep(&mut state)
        };
        match swept {
            Some(id) => {
                debug!("{} channel {} torn down", P::NAME, id);
                self.shared.publish_closed(id, CloseReason::Teardown);
                true
            }
            None => false,
        }
    }

    /// Subscribe to channel-closed events
    pub fn subscribe_closed(&self) -> broadcast::Receiver<ChannelClosed> {
        self.shared.closed_tx.subscribe()
    }

    pub fn is_attached(&self) -> bool {
        self.shared.state.lock().channel.is_some()
    }

    pub fn current_channel(&self) -> Option<ChannelId> {
        self.shared.state.lock().channel.as_ref().map(|c| c.id)
    }

    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().pending.len()
    }
}

impl<P: LineProtocol> Drop for RpcEngine<P> {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn write_frame(writer: &AsyncMutex<BoxedWriter>, bytes: &[u8]) -> std::io::Result<()> {
    let mut writer = writer.lock().await;
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// Drains one channel until end-of-stream, read error, or cancellation
async fn reader_loop<P: LineProtocol>(
    shared: Arc<Shared<P>>,
    channel: ChannelId,
    reader: BoxedReader,
    cancel: CancellationToken,
) {
    let mut frames = FrameReader::new(reader);

    let reason = loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("{} channel {}: reader cancelled", P::NAME, channel);
                return;
            }
            frame = frames.next_frame() => frame,
        };

        match frame {
            Ok(Some(line)) => shared.dispatch(channel, &line),
            Ok(None) => break CloseReason::EndOfStream,
            Err(e) => {
                warn!("{} channel {}: read failed: {}", P::NAME, channel, e);
                break CloseReason::ReadError;
            }
        }
    };

    shared.channel_died(channel, reason);
}
