//! Epoch-based weight-attestation state machine (§4.5).
//!
//! Every signing validator periodically re-proves its weight to the roster
//! and submits a fresh `submitValidator` call. The state machine is driven
//! one step per chain tick; replies that arrive out-of-band (over the node
//! link) are folded in via [`ChainAttestation::ingest_weight_reply`] and
//! [`ChainAttestation::ingest_signature_reply`] as they come in, and the
//! next tick's [`ChainAttestation::step`] call decides whether enough has
//! accumulated to advance.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::{Address, B256, U256};
use rai_eip712::{self as eip712, VerifyingContract};
use rai_evm::RosterState;
use rai_types::SubmissionState;

/// `EPOCH_TIME` (GLOSSARY): validator rewards/epochs are bound to
/// `⌊unix / EPOCH_TIME⌋`.
pub const EPOCH_TIME: u64 = 72 * 3600;
/// `REWARD_TIME` (GLOSSARY): the submission-eligible portion of an epoch.
pub const REWARD_TIME: u64 = 71 * 3600;
const HOUR: u64 = 3600;
/// Minimum spacing between successive `submitValidator` calls (§4.5).
pub const MIN_RESUBMIT_INTERVAL: u64 = 300;
/// Collection rounds before `COLLECT_SIGNATURES` gives up for this window.
const MAX_COLLECTION_ROUNDS: u32 = 10;

pub fn current_epoch(now: u64) -> u32 {
    (now / EPOCH_TIME) as u32
}

pub fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

/// `in_reward_time_range` (§4.5): `last_submit == 0` is always rewardable
/// (Open Question resolution, DESIGN.md), bypassing the formula below.
pub fn in_reward_time_range(last_submit: u64, now: u64) -> bool {
    if last_submit == 0 {
        return true;
    }
    let check = |at: u64| -> bool {
        let l = (last_submit % EPOCH_TIME).min(REWARD_TIME);
        let d = (l + REWARD_TIME - HOUR) % REWARD_TIME;
        let d = d.min(REWARD_TIME - HOUR);
        (at % EPOCH_TIME) >= d
    };
    check(now) && check(now.saturating_sub(30))
}

/// A reply to `weight_query`, kept per replier for the active round.
#[derive(Debug, Clone, Copy)]
struct WeightReply {
    epoch: u32,
    weight: u128,
}

/// An accepted `SubmitValidator` signature, deduplicated by signer.
#[derive(Debug, Clone)]
struct SigReply {
    signer: Address,
    signature: [u8; 65],
}

/// Widening probe percentages used by `WEIGHT_QUERY` (§4.5): 0.8 at round
/// 0, then 0.9, then 0.99 for every subsequent round.
const WEIGHT_PROBE_STEPS: &[(u128, u128)] = &[(4, 5), (9, 10), (99, 100)];

pub struct ChainAttestation {
    state: SubmissionState,
    submission_epoch: u32,
    round: u32,
    weight_replies: HashMap<[u8; 32], WeightReply>,
    submission_weight: Option<u128>,
    signatures: HashMap<Address, SigReply>,
    last_submit: u64,
}

impl Default for ChainAttestation {
    fn default() -> Self {
        Self::new()
    }
}

/// A `submitValidator` call ready to be sent on-chain.
pub struct SubmitValidatorCall {
    pub validator: [u8; 32],
    pub signer: Address,
    pub weight: u128,
    pub epoch: u32,
    pub reward_to: Address,
    pub packed_signatures: Vec<u8>,
}

pub enum Outbound {
    WeightQuery { targets: Vec<[u8; 32]> },
    WeightSign { targets: Vec<[u8; 32]> },
    Submit(SubmitValidatorCall),
    None,
}

impl ChainAttestation {
    pub fn new() -> Self {
        Self {
            state: SubmissionState::Idle,
            submission_epoch: 0,
            round: 0,
            weight_replies: HashMap::new(),
            submission_weight: None,
            signatures: HashMap::new(),
            last_submit: 0,
        }
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    /// The weight value certified by [`Self::compute_submission_weight`] for
    /// the round currently in `CollectSignatures`, if any — the value the
    /// outgoing `WeightSign` request asks peers to counter-sign.
    pub fn submission_weight(&self) -> Option<u128> {
        self.submission_weight
    }

    /// Pulls the local validator's own on-chain roster row (if any) into
    /// `last_submit` so the reward window is reconstructed from chain state
    /// rather than trusting a process-local field that starts at `0` on
    /// every restart (spec.md's "all state is reconstructed from chain +
    /// peer messages on restart" non-goal). Idempotent: only ever advances
    /// `last_submit`, never rewinds it behind a submission this process
    /// already knows about but the roster hasn't confirmed yet.
    fn seed_last_submit_from_roster(&mut self, roster: &RosterState, local_validator: [u8; 32]) {
        if let Some(info) = roster.get(&local_validator) {
            self.last_submit = self.last_submit.max(info.last_submit as u64);
        }
    }

    /// The rewardable predicate (§4.5), minus the parts the caller already
    /// knows (chain sync, node attach, bind status, genesis identity, node-
    /// synced snapshot) — those are checked by the tick runtime before
    /// calling [`Self::step`]. If the local validator already has a roster
    /// row, its on-chain `epoch` must be behind the current epoch — a row
    /// already current for this epoch means we already submitted and
    /// on-chain state has caught up, so there is nothing left to reward.
    pub fn rewardable(&self, now: u64, roster: &RosterState, local_validator: [u8; 32]) -> bool {
        if self.state != SubmissionState::Idle {
            return false;
        }
        if now < self.last_submit + MIN_RESUBMIT_INTERVAL {
            return false;
        }
        if let Some(info) = roster.get(&local_validator) {
            if info.epoch >= current_epoch(now) {
                return false;
            }
        }
        in_reward_time_range(self.last_submit, now)
    }

    /// Advances the state machine by one tick. `local_validator` is this
    /// node's own validator id; `local_signer`/`local_weight` describe how
    /// it would appear in the `submitValidator` call once a round succeeds.
    pub fn step(
        &mut self,
        roster: &RosterState,
        now: u64,
        local_validator: [u8; 32],
        local_signer: Address,
    ) -> Outbound {
        self.seed_last_submit_from_roster(roster, local_validator);
        let epoch = current_epoch(now);
        match self.state {
            SubmissionState::Idle => {
                if self.rewardable(now, roster, local_validator) {
                    self.submission_epoch = epoch;
                    self.round = 0;
                    self.weight_replies.clear();
                    self.submission_weight = None;
                    self.state = SubmissionState::WeightQuery;
                    let (num, den) = WEIGHT_PROBE_STEPS[0];
                    return Outbound::WeightQuery {
                        targets: roster.top_validators(num, den),
                    };
                }
                Outbound::None
            }
            SubmissionState::WeightQuery => {
                if epoch != self.submission_epoch {
                    self.reset_to_idle();
                    return Outbound::None;
                }
                if let Some(weight) = self.compute_submission_weight(roster) {
                    self.submission_weight = Some(weight);
                    self.signatures.clear();
                    self.state = SubmissionState::CollectSignatures;
                    self.round = 0;
                    let (num, den) = WEIGHT_PROBE_STEPS[WEIGHT_PROBE_STEPS.len() - 1];
                    return Outbound::WeightSign {
                        targets: roster.top_validators(num, den),
                    };
                }
                let step = (self.round as usize + 1).min(WEIGHT_PROBE_STEPS.len() - 1);
                self.round += 1;
                let (num, den) = WEIGHT_PROBE_STEPS[step];
                Outbound::WeightQuery {
                    targets: roster.top_validators(num, den),
                }
            }
            SubmissionState::CollectSignatures => {
                if epoch != self.submission_epoch {
                    self.reset_to_idle();
                    return Outbound::None;
                }
                let half = roster.total_weight() / 2;
                let accepted_weight: u128 = self
                    .signatures
                    .keys()
                    .map(|signer| {
                        roster
                            .roster()
                            .iter()
                            .find(|v| v.signer == *signer)
                            .map(|v| v.weight)
                            .unwrap_or(0)
                    })
                    .sum();
                if accepted_weight > half {
                    let mut sorted: Vec<&SigReply> = self.signatures.values().collect();
                    sorted.sort_by_key(|s| s.signer);
                    let mut packed = Vec::with_capacity(sorted.len() * 65);
                    for s in &sorted {
                        packed.extend_from_slice(&s.signature);
                    }
                    let weight = self.submission_weight.unwrap_or(0);
                    self.last_submit = now;
                    self.reset_to_idle();
                    return Outbound::Submit(SubmitValidatorCall {
                        validator: local_validator,
                        signer: local_signer,
                        weight,
                        epoch,
                        reward_to: local_signer,
                        packed_signatures: packed,
                    });
                }
                self.round += 1;
                if self.round >= MAX_COLLECTION_ROUNDS {
                    self.reset_to_idle();
                    return Outbound::None;
                }
                Outbound::WeightSign {
                    targets: roster.top_validators(99, 100),
                }
            }
        }
    }

    fn reset_to_idle(&mut self) {
        self.state = SubmissionState::Idle;
        self.weight_replies.clear();
        self.signatures.clear();
        self.submission_weight = None;
        self.round = 0;
    }

    /// Sort accepted replies by weight descending, walk through those
    /// clearing `weight_threshold(0.99)`, accumulate replier weight until
    /// it reaches ⅔ of `total_weight`; that reply's weight is the
    /// certified `submission_weight` (§4.5).
    fn compute_submission_weight(&self, roster: &RosterState) -> Option<u128> {
        let floor = roster.weight_threshold(99, 100);
        let mut replies: Vec<(&[u8; 32], &WeightReply)> = self
            .weight_replies
            .iter()
            .filter(|(_, r)| r.epoch == self.submission_epoch)
            .collect();
        replies.sort_by_key(|(_, r)| std::cmp::Reverse(r.weight));

        let target = roster.total_weight().saturating_mul(2) / 3;
        let mut acc: u128 = 0;
        for (replier, reply) in replies {
            let replier_weight = roster.weight_of_validator(replier);
            if replier_weight < floor {
                continue;
            }
            acc = acc.saturating_add(replier_weight);
            if acc >= target {
                return Some(reply.weight);
            }
        }
        None
    }

    pub fn ingest_weight_reply(&mut self, replier: [u8; 32], epoch: u32, weight: u128) {
        if self.state != SubmissionState::WeightQuery || epoch != self.submission_epoch {
            return;
        }
        self.weight_replies.insert(replier, WeightReply { epoch, weight });
    }

    /// Verifies an EIP-712 `SubmitValidator` signature against the
    /// replier's known roster/genesis signer, and rejects it if the
    /// replier's weight is below the 0.99 threshold or it disagrees on
    /// `(weight, epoch)` (§4.5).
    #[allow(clippy::too_many_arguments)]
    pub fn ingest_signature_reply(
        &mut self,
        roster: &RosterState,
        evm_chain_id: u64,
        contract: Address,
        replier: [u8; 32],
        epoch: u32,
        weight: u128,
        signature: [u8; 65],
    ) {
        if self.state != SubmissionState::CollectSignatures || epoch != self.submission_epoch {
            return;
        }
        let Some(expected_weight) = self.submission_weight else {
            return;
        };
        if weight != expected_weight {
            return;
        }
        let floor = roster.weight_threshold(99, 100);
        if roster.weight_of_validator(&replier) < floor {
            return;
        }
        let Some(signer) = roster.signer_of_validator(&replier) else {
            return;
        };
        let msg = eip712::SubmitValidator {
            validator: B256::from(replier),
            signer,
            weight: U256::from(weight),
            epoch,
        };
        let hash = eip712::hash_submit_validator(evm_chain_id, VerifyingContract::Validator(contract), &msg);
        if !eip712::verify(hash, &signature, signer) {
            return;
        }
        self.signatures.insert(signer, SigReply { signer, signature });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_window_matches_scenario_3() {
        let now = 1_000_000_000u64;
        let last_submit = now - 71 * HOUR + 60;
        assert!(!in_reward_time_range(last_submit, now));
        assert!(in_reward_time_range(last_submit, now + 2 * HOUR));
    }

    #[test]
    fn zero_last_submit_is_always_rewardable() {
        assert!(in_reward_time_range(0, 123456));
    }

    #[test]
    fn idle_with_no_reward_window_emits_nothing() {
        let mut machine = ChainAttestation::new();
        machine.last_submit = now_unix();
        let roster = RosterState::new();
        let out = machine.step(&roster, now_unix(), [1; 32], Address::ZERO);
        assert!(matches!(out, Outbound::None));
    }

    fn validator_row(epoch: u32, last_submit: u32) -> rai_types::ValidatorFullInfo {
        rai_types::ValidatorFullInfo {
            validator: [1; 32],
            signer: Address::ZERO,
            weight: 1,
            gas_price: Default::default(),
            last_submit,
            epoch,
        }
    }

    /// A restart starts `last_submit` at `0`, but a roster row showing the
    /// local validator already submitted this epoch must still block a
    /// second round — this is the "reconstructed from chain state" guard.
    #[test]
    fn roster_row_current_for_epoch_blocks_restart_resubmission() {
        let now = now_unix();
        let mut roster = RosterState::new();
        roster.update_validator(validator_row(current_epoch(now), now as u32));

        let mut machine = ChainAttestation::new();
        let out = machine.step(&roster, now, [1; 32], Address::ZERO);
        assert!(matches!(out, Outbound::None));
    }

    /// Once the on-chain row's epoch falls behind the current epoch, the
    /// validator becomes rewardable again even though `last_submit` was
    /// seeded from that same row.
    #[test]
    fn roster_row_from_a_past_epoch_is_rewardable() {
        let now = 1_000_000_000u64;
        let mut roster = RosterState::new();
        roster.update_validator(validator_row(current_epoch(now) - 1, (now - 71 * HOUR) as u32));

        let mut machine = ChainAttestation::new();
        let out = machine.step(&roster, now, [1; 32], Address::ZERO);
        assert!(!matches!(out, Outbound::None));
    }

    #[test]
    fn seed_last_submit_never_rewinds_a_more_recent_local_value() {
        let now = now_unix();
        let mut roster = RosterState::new();
        roster.update_validator(validator_row(0, 10));

        let mut machine = ChainAttestation::new();
        machine.last_submit = now;
        machine.seed_last_submit_from_roster(&roster, [1; 32]);
        assert_eq!(machine.last_submit, now);
    }
}
