//! Pending call table

use super::LineProtocol;
use super::rpc::Shared;
use crate::error::{BridgeError, BridgeResult};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::oneshot;

pub(super) type Resolver<M> = oneshot::Sender<BridgeResult<M>>;

/// Identifier -> single-use completion handle.
///
/// An entry leaves the table exactly once: taken by a matching response, by
/// the disconnect sweep, or by its caller giving up. Whoever takes it is the
/// only party able to resolve it.
pub(super) struct PendingTable<K, M> {
    entries: HashMap<K, Resolver<M>>,
}

impl<K: Eq + Hash + Clone + std::fmt::Display, M> PendingTable<K, M> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register `id`. An identifier that is still live is rejected.
    pub fn insert(&mut self, id: K, resolver: Resolver<M>) -> BridgeResult<()> {
        if self.entries.contains_key(&id) {
            return Err(BridgeError::invalid_state(
                format!("request {} is pending", id),
                "reuse its identifier",
            ));
        }
        self.entries.insert(id, resolver);
        Ok(())
    }

    pub fn take(&mut self, id: &K) -> Option<Resolver<M>> {
        self.entries.remove(id)
    }

    pub fn drain(&mut self) -> Vec<(K, Resolver<M>)> {
        self.entries.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, id: &K) -> bool {
        self.entries.contains_key(id)
    }
}

/// Handle to an outstanding call.
///
/// Dropping it before [`PendingCall::wait`] completes removes the entry, so a
/// late response for it is treated as an orphan.
pub struct PendingCall<P: LineProtocol> {
    id: P::Id,
    rx: oneshot::Receiver<BridgeResult<P::Inbound>>,
    shared: Arc<Shared<P>>,
    settled: bool,
}

impl<P: LineProtocol> PendingCall<P> {
    pub(super) fn new(
        id: P::Id,
        rx: oneshot::Receiver<BridgeResult<P::Inbound>>,
        shared: Arc<Shared<P>>,
    ) -> Self {
        Self {
            id,
            rx,
            shared,
            settled: false,
        }
    }

    pub fn id(&self) -> &P::Id {
        &self.id
    }

    /// Wait for the matching response or the disconnect sweep.
    ///
    /// There is no deadline here; wrap in `tokio::time::timeout` if needed.
    pub async fn wait(mut self) -> BridgeResult<P::Inbound> {
        let outcome = match (&mut self.rx).await {
            Ok(outcome) => outcome,
            Err(_) => Err(BridgeError::Disconnected),
        };
        self.settled = true;
        outcome
    }
}

impl<P: LineProtocol> fmt::Debug for PendingCall<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall")
            .field("protocol", &P::NAME)
            .field("id", &self.id)
            .field("settled", &self.settled)
            .finish()
    }
}

impl<P: LineProtocol> Drop for PendingCall<P> {
    fn drop(&mut self) {
        if !self.settled {
            self.shared.forget(&self.id);
        }
    }
}
