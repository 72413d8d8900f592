//! Correlated duplex line-RPC engine
//!
//! One [`RpcEngine`] owns one channel to a peer process: it writes framed
//! requests, tracks each one in a pending table keyed by identifier, and runs
//! a background reader that matches responses back to their callers. Both
//! hops of the relay chain are instances of this engine with a different
//! [`LineProtocol`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use toolbridge_core::engine::{RpcEngine, SpawnSpec, ProcessConnector, Connector};
//! use toolbridge_core::mcp::McpProtocol;
//!
//! let engine = RpcEngine::<McpProtocol>::new();
//! let connector = ProcessConnector::new(SpawnSpec::new("mcp-server"));
//! engine.attach(connector.connect().await?);
//! let reply = engine.send(1, &request).await?.wait().await?;
//! ```

mod channel;
mod pending;
mod rpc;


pub use channel::{
    BoxedReader, BoxedWriter, Channel, Connector, FnConnector, ProcessConnector, SpawnSpec,
};
pub use pending::PendingCall;
pub use rpc::{ChannelClosed, ChannelId, CloseReason, RpcEngine};

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::hash::Hash;
use tracing::debug;

/// Message schema spoken on one hop
pub trait LineProtocol: Send + Sync + 'static {
    /// Short name used in log lines
    const NAME: &'static str;

    /// Correlation key; must be unique among outstanding calls
    type Id: Eq + Hash + Clone + fmt::Display + fmt::Debug + Send + Sync + 'static;

    /// Messages written to the peer
    type Outbound: Serialize + Send + Sync;

    /// Messages read from the peer
    type Inbound: DeserializeOwned + fmt::Debug + Send + 'static;

    /// Identifier carried by an inbound message, if it answers a call
    fn inbound_id(message: &Self::Inbound) -> Option<Self::Id>;
}

/// Receives inbound messages that carry no identifier.
pub trait NotificationHandler<P: LineProtocol>: Send + Sync {
    fn handle(&self, message: &P::Inbound);
}

/// Default handler that logs notifications
pub struct LoggingNotificationHandler;

impl<P: LineProtocol> NotificationHandler<P> for LoggingNotificationHandler {
    fn handle(&self, message: &P::Inbound) {
        debug!("{} notification: {:?}", P::NAME, message);
    }
}
