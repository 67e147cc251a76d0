//! Validator roster entries and the attestation submission state.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// One entry in an EVM chain's validator-set roster.
///
/// Ordered by `weight` descending; equality and identity are by `validator`
/// alone, matching the on-chain roster's own key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ValidatorFullInfo {
    /// Raw 32-byte native account of the validator.
    pub validator: [u8; 32],
    /// The EVM address authorized to sign on the validator's behalf.
    pub signer: Address,
    pub weight: u128,
    pub gas_price: U256,
    /// Unix seconds of the validator's last accepted `submitValidator` call.
    pub last_submit: u32,
    pub epoch: u32,
}

impl PartialEq for ValidatorFullInfo {
    fn eq(&self, other: &Self) -> bool {
        self.validator == other.validator
    }
}
impl Eq for ValidatorFullInfo {}

impl PartialOrd for ValidatorFullInfo {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ValidatorFullInfo {
    /// Descending by weight, ties broken by validator id for a total order.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .weight
            .cmp(&self.weight)
            .then_with(|| self.validator.cmp(&other.validator))
    }
}

/// Pending on-chain activity (a `ValidatorSubmitted`/`ValidatorPurged` log)
/// waiting for confirmation depth before it is folded into the roster.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatorActivity {
    pub log_height: u64,
    pub sync_height: u64,
}

/// Reply to a `weight_query`, accepted only if the replier currently clears
/// the 0.99 weight threshold and answers for the active submission epoch.
#[derive(Debug, Clone, Copy)]
pub struct WeightInfo {
    pub replier: [u8; 32],
    pub epoch: u32,
    pub weight: u128,
}

/// A single accepted `SubmitValidator`/proposal signature, keyed by the
/// signing validator to deduplicate repeat replies.
#[derive(Debug, Clone, Copy)]
pub struct SignatureInfo {
    pub validator: [u8; 32],
    pub signer: Address,
    pub signature: [u8; 65],
    pub epoch: Option<u32>,
}

/// State of the per-chain attestation submit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmissionState {
    #[default]
    Idle,
    WeightQuery,
    CollectSignatures,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_weight_descending() {
        let a = ValidatorFullInfo {
            validator: [1; 32],
            signer: Address::ZERO,
            weight: 10,
            gas_price: U256::ZERO,
            last_submit: 0,
            epoch: 0,
        };
        let mut b = a;
        b.validator = [2; 32];
        b.weight = 20;
        let mut roster = vec![a, b];
        roster.sort();
        assert_eq!(roster[0].weight, 20);
        assert_eq!(roster[1].weight, 10);
    }

    #[test]
    fn equality_ignores_weight() {
        let a = ValidatorFullInfo {
            validator: [1; 32],
            signer: Address::ZERO,
            weight: 10,
            gas_price: U256::ZERO,
            last_submit: 0,
            epoch: 0,
        };
        let mut b = a;
        b.weight = 999;
        assert_eq!(a, b);
    }
}
