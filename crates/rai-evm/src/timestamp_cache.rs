//! Block-timestamp cache with a confirmed/unconfirmed split (§4.3).
//!
//! Confirmed heights map straight to a timestamp and are bounded at 200 000
//! entries, evicted oldest-first. Unconfirmed (reorg-able) heights instead
//! map to `{timestamp, tx-hash set}` and are purged once they pass
//! `head − confirmations`.

use std::collections::{HashSet, VecDeque};

use dashmap::DashMap;

use crate::error::EvmError;

const MAX_CONFIRMED_ENTRIES: usize = 200_000;

struct PendingBlock {
    timestamp: u64,
    tx_hashes: HashSet<[u8; 32]>,
}

#[derive(Default)]
pub struct TimestampCache {
    confirmed: DashMap<u64, u64>,
    confirmed_order: std::sync::Mutex<VecDeque<u64>>,
    pending: DashMap<u64, PendingBlock>,
}

impl TimestampCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_pending(&self, height: u64, timestamp: u64, tx_hashes: HashSet<[u8; 32]>) {
        self.pending.insert(height, PendingBlock { timestamp, tx_hashes });
    }

    /// Moves a pending height into the confirmed cache, evicting the oldest
    /// confirmed entry if the cache is at capacity.
    pub fn confirm(&self, height: u64) {
        if let Some((_, block)) = self.pending.remove(&height) {
            self.confirmed.insert(height, block.timestamp);
            let mut order = self.confirmed_order.lock().unwrap();
            order.push_back(height);
            if order.len() > MAX_CONFIRMED_ENTRIES {
                if let Some(oldest) = order.pop_front() {
                    self.confirmed.remove(&oldest);
                }
            }
        }
    }

    /// Drops pending entries once they pass `head − confirmations` without
    /// ever having been confirmed (a height the adapter stopped tracking).
    pub fn purge_pending_before(&self, floor_height: u64) {
        self.pending.retain(|&height, _| height >= floor_height);
    }

    /// `transaction_timestamp(height, hash)` (§4.3): `synchronizing` above
    /// the current head, `fork` if the hash isn't in the pending set for
    /// that height, else the timestamp.
    pub fn transaction_timestamp(
        &self,
        height: u64,
        hash: [u8; 32],
        head: u64,
    ) -> Result<u64, EvmError> {
        if height > head {
            return Err(EvmError::Synchronizing { height });
        }
        if let Some(ts) = self.confirmed.get(&height) {
            return Ok(*ts);
        }
        match self.pending.get(&height) {
            Some(block) if block.tx_hashes.contains(&hash) => Ok(block.timestamp),
            _ => Err(EvmError::Fork { height }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmed_lookup_wins_over_pending() {
        let cache = TimestampCache::new();
        cache.insert_pending(10, 1000, HashSet::from([[1u8; 32]]));
        cache.confirm(10);
        assert_eq!(cache.transaction_timestamp(10, [1u8; 32], 50).unwrap(), 1000);
    }

    #[test]
    fn unknown_hash_at_pending_height_is_a_fork() {
        let cache = TimestampCache::new();
        cache.insert_pending(10, 1000, HashSet::from([[1u8; 32]]));
        assert!(matches!(
            cache.transaction_timestamp(10, [2u8; 32], 50),
            Err(EvmError::Fork { height: 10 })
        ));
    }

    #[test]
    fn height_above_head_is_synchronizing() {
        let cache = TimestampCache::new();
        assert!(matches!(
            cache.transaction_timestamp(100, [0u8; 32], 50),
            Err(EvmError::Synchronizing { height: 100 })
        ));
    }

    #[test]
    fn purge_drops_stale_pending_heights() {
        let cache = TimestampCache::new();
        cache.insert_pending(5, 100, HashSet::new());
        cache.purge_pending_before(10);
        assert!(matches!(
            cache.transaction_timestamp(5, [0u8; 32], 50),
            Err(EvmError::Fork { height: 5 })
        ));
    }
}
