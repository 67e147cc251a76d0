//! Per-chain validator-set roster: weight-ordered list, confirmation-depth
//! activity tracking, and the `top_validators`/`weight_threshold` queries the
//! attestation and proposal engines drive off of (§4.4).

use std::collections::HashMap;

use alloy_primitives::Address;
use rai_types::ValidatorFullInfo;

/// Floor applied to the on-chain total weight, matching the node's own
/// bootstrap floor so a freshly-deployed chain with few validators still has
/// a usable quorum denominator.
pub const TOTAL_WEIGHT_FLOOR: u128 = 20_000_000_000_000_000;

/// Pending on-chain activity (`ValidatorSubmitted`/`ValidatorPurged` log)
/// waiting for confirmation depth before it is folded into the roster.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatorActivity {
    pub log_height: u64,
    pub sync_height: u64,
}

/// A single chain's weight-ordered validator roster.
///
/// Invariant: `order` is sorted by weight descending and `index` maps every
/// member's validator id to its exact position in `order`; both are rebuilt
/// together on every mutation (§3, §8).
#[derive(Debug, Clone, Default)]
pub struct RosterState {
    order: Vec<ValidatorFullInfo>,
    index: HashMap<[u8; 32], usize>,
    /// `max(genesis_weight + Σ weights, raw_total_weight_floor)`.
    total_weight: u128,
    /// The raw on-chain total, before the floor is applied.
    raw_total_weight: u128,
    activities: HashMap<[u8; 32], ValidatorActivity>,
    pub genesis_validator: Option<[u8; 32]>,
    pub genesis_signer: Option<Address>,
    initialized: bool,
}

impl RosterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    pub fn roster(&self) -> &[ValidatorFullInfo] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, validator: &[u8; 32]) -> Option<&ValidatorFullInfo> {
        self.index.get(validator).map(|&i| &self.order[i])
    }

    /// `max(0, total_weight − Σ roster weight)`, the weight carried by the
    /// genesis validator outside the explicit roster (§3, §4.4).
    pub fn genesis_weight(&self) -> u128 {
        let roster_sum: u128 = self.order.iter().map(|v| v.weight).sum();
        self.total_weight.saturating_sub(roster_sum)
    }

    /// `weight_of_validator` — genesis resolves to its implied weight rather
    /// than an explicit roster entry.
    pub fn weight_of_validator(&self, validator: &[u8; 32]) -> u128 {
        if Some(*validator) == self.genesis_validator {
            return self.genesis_weight();
        }
        self.get(validator).map(|v| v.weight).unwrap_or(0)
    }

    pub fn signer_of_validator(&self, validator: &[u8; 32]) -> Option<Address> {
        if Some(*validator) == self.genesis_validator {
            return self.genesis_signer;
        }
        self.get(validator).map(|v| v.signer)
    }

    pub fn total_weight(&self) -> u128 {
        self.total_weight
    }

    /// Sets the on-chain total, applying the configured floor (§3, §4.4).
    pub fn set_raw_total_weight(&mut self, raw: u128) {
        self.raw_total_weight = raw;
        self.total_weight = raw.max(TOTAL_WEIGHT_FLOOR);
    }

    pub fn raw_total_weight(&self) -> u128 {
        self.raw_total_weight
    }

    /// Inserts or edits a validator entry by `validator` id, then resorts and
    /// rebuilds the index so the ordering invariant always holds (§4.4).
    pub fn update_validator(&mut self, entry: ValidatorFullInfo) {
        if let Some(&pos) = self.index.get(&entry.validator) {
            self.order[pos] = entry;
        } else {
            self.order.push(entry);
        }
        self.resort();
    }

    pub fn remove_validator(&mut self, validator: &[u8; 32]) {
        self.order.retain(|v| &v.validator != validator);
        self.resort();
        self.activities.remove(validator);
    }

    fn resort(&mut self) {
        self.order.sort();
        self.index = self
            .order
            .iter()
            .enumerate()
            .map(|(i, v)| (v.validator, i))
            .collect();
    }

    pub fn record_activity_log(&mut self, validator: [u8; 32], log_height: u64) {
        let activity = self.activities.entry(validator).or_default();
        activity.log_height = activity.log_height.max(log_height);
    }

    pub fn activity(&self, validator: &[u8; 32]) -> Option<ValidatorActivity> {
        self.activities.get(validator).copied()
    }

    /// Validators whose confirmation window has elapsed: `sync_height` (the
    /// provided current height) must be `≥ log_height + confirmations`, or
    /// the cached `sync_height` is behind `log_height` (meaning a re-read is
    /// still owed).
    pub fn pending_confirmations(&self, current_height: u64, confirmations: u64) -> Vec<[u8; 32]> {
        self.activities
            .iter()
            .filter(|(_, a)| {
                current_height >= a.log_height.saturating_add(confirmations)
                    || a.sync_height < a.log_height
            })
            .map(|(v, _)| *v)
            .collect()
    }

    /// Purges an activity only once confirmed (§3, §8): never before
    /// `sync_height ≥ log_height + confirmations`.
    pub fn confirm_and_maybe_purge(&mut self, validator: [u8; 32], sync_height: u64, confirmations: u64) {
        let purge = match self.activities.get_mut(&validator) {
            Some(a) => {
                a.sync_height = sync_height;
                sync_height >= a.log_height.saturating_add(confirmations)
            }
            None => false,
        };
        if purge {
            self.activities.remove(&validator);
        }
    }

    /// The smallest weight-ordered prefix (genesis inserted at its correct
    /// rank) whose cumulative weight reaches `percent · total_weight`.
    ///
    /// `numerator`/`denominator` express the percent as an exact integer
    /// ratio (e.g. `(4, 5)` for 0.8) so the comparison never touches
    /// floating point (§9).
    pub fn top_validators(&self, numerator: u128, denominator: u128) -> Vec<[u8; 32]> {
        let target = self.total_weight.saturating_mul(numerator) / denominator;
        let genesis_weight = self.genesis_weight();

        let mut merged: Vec<([u8; 32], u128)> =
            self.order.iter().map(|v| (v.validator, v.weight)).collect();
        if let Some(genesis) = self.genesis_validator {
            if genesis_weight > 0 {
                let pos = merged
                    .iter()
                    .position(|(_, w)| *w < genesis_weight)
                    .unwrap_or(merged.len());
                merged.insert(pos, (genesis, genesis_weight));
            }
        }

        let mut acc: u128 = 0;
        let mut out = Vec::new();
        for (validator, weight) in merged {
            if acc >= target {
                break;
            }
            out.push(validator);
            acc = acc.saturating_add(weight);
        }
        out
    }

    /// The smallest weight `w` such that `{v : weight(v) ≥ w} ∪ {genesis}`
    /// cumulatively reaches `percent · total_weight` (§4.4, §8).
    pub fn weight_threshold(&self, numerator: u128, denominator: u128) -> u128 {
        let target = self.total_weight.saturating_mul(numerator) / denominator;
        let genesis_weight = self.genesis_weight();

        let mut merged: Vec<u128> = self.order.iter().map(|v| v.weight).collect();
        if genesis_weight > 0 {
            merged.push(genesis_weight);
        }
        merged.sort_unstable_by(|a, b| b.cmp(a));

        let mut acc: u128 = 0;
        for weight in merged {
            acc = acc.saturating_add(weight);
            if acc >= target {
                return weight;
            }
        }
        // Nothing reaches the target: only the full roster's weight (plus
        // genesis) qualifies, i.e. the smallest weight present, or zero if
        // the roster is empty.
        self.order.last().map(|v| v.weight).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(id: u8, weight: u128) -> ValidatorFullInfo {
        ValidatorFullInfo {
            validator: [id; 32],
            signer: Address::with_last_byte(id),
            weight,
            gas_price: Default::default(),
            last_submit: 0,
            epoch: 0,
        }
    }

    fn roster_40_30_20_10() -> RosterState {
        let mut r = RosterState::new();
        for (id, w) in [(1u8, 40u128), (2, 30), (3, 20), (4, 10)] {
            r.update_validator(validator(id, w * 1_000_000_000_000_000_000));
        }
        r.set_raw_total_weight(100_000_000_000_000_000_000);
        r
    }

    #[test]
    fn roster_stays_weight_ordered_after_updates() {
        let r = roster_40_30_20_10();
        let weights: Vec<u128> = r.roster().iter().map(|v| v.weight).collect();
        let mut sorted = weights.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(weights, sorted);
        assert_eq!(r.len(), 4);
    }

    #[test]
    fn index_matches_order_after_edit() {
        let mut r = roster_40_30_20_10();
        r.update_validator(validator(2, 90_000_000_000_000_000_000));
        assert_eq!(r.roster()[0].validator, [2; 32]);
        assert_eq!(r.get(&[2; 32]).unwrap().weight, 90_000_000_000_000_000_000);
    }

    #[test]
    fn genesis_weight_is_total_minus_roster_sum() {
        let mut r = roster_40_30_20_10();
        r.genesis_validator = Some([99; 32]);
        r.set_raw_total_weight(150_000_000_000_000_000_000);
        assert_eq!(r.genesis_weight(), 50_000_000_000_000_000_000);
    }

    #[test]
    fn total_weight_floor_applies_when_on_chain_total_is_small() {
        let mut r = RosterState::new();
        r.set_raw_total_weight(5);
        assert_eq!(r.total_weight(), TOTAL_WEIGHT_FLOOR);
    }

    #[test]
    fn top_validators_reaches_the_requested_fraction() {
        let r = roster_40_30_20_10();
        // 0.8 of 100e18 = 80e18; #1(40)+#2(30)+#3(20) = 90 >= 80.
        let top = r.top_validators(4, 5);
        assert_eq!(top.len(), 3);
        assert_eq!(top, vec![[1; 32], [2; 32], [3; 32]]);
    }

    #[test]
    fn top_validators_inserts_genesis_at_correct_rank() {
        let mut r = roster_40_30_20_10();
        r.genesis_validator = Some([99; 32]);
        r.set_raw_total_weight(125_000_000_000_000_000_000); // genesis weight = 25e18
        let top = r.top_validators(1, 2); // target = 62.5e18
        // order: #1(40), genesis(25), #2(30)... wait genesis(25) < 30 so it
        // sits after #2: 40, 30, 25, 20, 10.
        assert_eq!(top, vec![[1; 32], [2; 32], [99; 32]]);
    }

    #[test]
    fn weight_threshold_is_achievable_by_members_at_or_above_it() {
        let r = roster_40_30_20_10();
        let threshold = r.weight_threshold(2, 3); // ~66.67e18
        // #1+#2 = 70e18 >= 66.67e18, so threshold == #2's weight (30e18).
        assert_eq!(threshold, 30_000_000_000_000_000_000);
        let qualifying: u128 = r
            .roster()
            .iter()
            .filter(|v| v.weight >= threshold)
            .map(|v| v.weight)
            .sum();
        assert!(qualifying * 3 >= r.total_weight() * 2);
    }

    #[test]
    fn activity_purged_only_after_confirmation_depth() {
        let mut r = RosterState::new();
        r.record_activity_log([1; 32], 100);
        r.confirm_and_maybe_purge([1; 32], 110, 30);
        assert!(r.activity(&[1; 32]).is_some());
        r.confirm_and_maybe_purge([1; 32], 130, 30);
        assert!(r.activity(&[1; 32]).is_none());
    }

    #[test]
    fn second_update_at_same_weight_is_idempotent() {
        let mut r = roster_40_30_20_10();
        let before = r.roster().to_vec();
        r.update_validator(validator(1, 40_000_000_000_000_000_000));
        assert_eq!(r.roster().to_vec(), before);
    }
}
