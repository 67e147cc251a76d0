//! Async request/reply correlation (§4.8, §9).
//!
//! Outbound requests to the node or token service are keyed by a random
//! `u256` request id; a `tokio::sync::oneshot` sender keyed on the same id
//! resolves the matching reply when it arrives, or is GC'd unresolved past
//! its deadline.

use std::time::{Duration, Instant};

use alloy_primitives::U256;
use dashmap::DashMap;
use rand::RngCore;
use tokio::sync::oneshot;

/// How long an unresolved correlation id is kept before GC drops it (§4.8,
/// §8 scenario 4: a reply at 11s sees nothing, one at 9s still resolves).
pub const CORRELATION_TTL: Duration = Duration::from_secs(10);

struct Entry {
    reply: oneshot::Sender<Vec<u8>>,
    expires_at: Instant,
}

/// A map of outstanding requests awaiting an asynchronous reply, shared
/// between the node-receive task (which resolves entries) and the
/// dispatcher/tick tasks (which insert them).
#[derive(Default)]
pub struct CorrelationMap {
    inner: DashMap<U256, Entry>,
}

impl CorrelationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh random 256-bit id, registers a waiter for it, and
    /// returns both. The id doubles as the cross-chain request id embedded
    /// in the outgoing message.
    pub fn register(&self) -> (U256, oneshot::Receiver<Vec<u8>>) {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        let id = U256::from_be_bytes(bytes);
        let (tx, rx) = oneshot::channel();
        self.inner.insert(
            id,
            Entry {
                reply: tx,
                expires_at: Instant::now() + CORRELATION_TTL,
            },
        );
        (id, rx)
    }

    /// Resolves a pending correlation, if any remains (it may already have
    /// been GC'd). Returns `true` if a waiter was woken.
    pub fn resolve(&self, id: U256, payload: Vec<u8>) -> bool {
        match self.inner.remove(&id) {
            Some((_, entry)) => entry.reply.send(payload).is_ok(),
            None => false,
        }
    }

    /// Drops every entry past its deadline. Run on a 10 s tick.
    pub fn gc(&self) {
        let now = Instant::now();
        self.inner.retain(|_, entry| entry.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_wakes_the_waiter() {
        let map = CorrelationMap::new();
        let (id, rx) = map.register();
        assert!(map.resolve(id, vec![1, 2, 3]));
        assert_eq!(rx.await.unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn resolve_on_unknown_id_is_a_no_op() {
        let map = CorrelationMap::new();
        assert!(!map.resolve(U256::from(42), vec![]));
    }

    #[tokio::test]
    async fn gc_drops_expired_entries_only() {
        let map = CorrelationMap::new();
        let (fresh_id, _fresh_rx) = map.register();
        let (stale_id, _stale_rx) = map.register();
        map.inner.get_mut(&stale_id).unwrap().expires_at = Instant::now() - Duration::from_secs(1);
        map.gc();
        assert_eq!(map.len(), 1);
        assert!(map.inner.contains_key(&fresh_id));
    }
}
