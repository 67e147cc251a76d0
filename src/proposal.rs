//! Proposal file watcher and per-chain governance submission (§4.6).
//!
//! The file itself is parsed by [`rai_types::proposal`]; this module adds
//! the 5 s hash/re-parse watcher and the per-chain `IDLE → COLLECT_SIGNATURES`
//! submission cycle that turns an adopted proposal into a signed
//! `upgrade`/`updateTokenVolatile` call.

use std::collections::HashMap;
use std::path::PathBuf;

use alloy_primitives::{Address, U256};
use rai_eip712::{self as eip712, VerifyingContract};
use rai_evm::RosterState;
use rai_types::proposal::{content_hash, ProposalFile};
use rai_types::{Proposal, ProposalMethod};

const MIN_RESUBMIT_INTERVAL: u64 = 300;
const MAX_COLLECTION_ROUNDS: u32 = 12;
const PROBE_STEPS: &[(u128, u128)] = &[(11, 20), (3, 4), (19, 20), (99, 100)]; // 0.55, 0.75, 0.95, 0.99

/// Watches the proposal file and keeps the last-good parse around, per §4.6:
/// a malformed file is logged and the previous table is kept.
#[derive(Default)]
pub struct ProposalWatcher {
    last_hash: Option<[u8; 32]>,
    file: ProposalFile,
}

impl ProposalWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-reads `path` if its content hash changed since the last call.
    /// Returns `true` if the table was replaced.
    pub fn refresh(&mut self, path: Option<&PathBuf>) -> bool {
        let content = match path {
            Some(p) => std::fs::read_to_string(p).unwrap_or_default(),
            None => String::new(),
        };
        let hash = content_hash(&content);
        if self.last_hash == Some(hash) {
            return false;
        }
        match ProposalFile::parse(if content.trim().is_empty() { "[]" } else { &content }) {
            Ok(file) => {
                self.file = file;
                self.last_hash = Some(hash);
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "proposal file malformed, keeping previous table");
                self.last_hash = Some(hash);
                false
            }
        }
    }

    pub fn active_for_chain(&self, chain_id: u32, now_unix: i64) -> Vec<&Proposal> {
        self.file.active_for_chain(chain_id, now_unix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    CollectSignatures,
}

struct SigReply {
    signer: Address,
    signature: [u8; 65],
}

/// Submission cycle for one chain's governance proposals.
pub struct ProposalSubmission {
    state: State,
    last_submit: u64,
    round: u32,
    active: Option<Proposal>,
    signatures: HashMap<Address, SigReply>,
}

pub enum Outbound {
    Sign { proposal: Proposal, targets: Vec<[u8; 32]> },
    Submit { proposal: Proposal, packed_signatures: Vec<u8> },
    None,
}

impl Default for ProposalSubmission {
    fn default() -> Self {
        Self::new()
    }
}

impl ProposalSubmission {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            last_submit: 0,
            round: 0,
            active: None,
            signatures: HashMap::new(),
        }
    }

    /// One tick of the per-chain proposal submission state machine.
    /// `on_chain_nonce` is read fresh by the caller from the target
    /// contract; `candidates` is the set of proposals currently active for
    /// this chain (from [`ProposalWatcher::active_for_chain`]).
    pub fn step(&mut self, roster: &RosterState, now: u64, on_chain_nonce: U256, candidates: &[Proposal]) -> Outbound {
        match self.state {
            State::Idle => {
                if now < self.last_submit + MIN_RESUBMIT_INTERVAL {
                    return Outbound::None;
                }
                let chosen = candidates
                    .iter()
                    .filter(|p| p.nonce == on_chain_nonce)
                    .max_by_key(|p| p.id)
                    .cloned();
                let Some(proposal) = chosen else {
                    return Outbound::None;
                };
                self.active = Some(proposal.clone());
                self.signatures.clear();
                self.round = 0;
                self.state = State::CollectSignatures;
                let (num, den) = PROBE_STEPS[0];
                Outbound::Sign {
                    proposal,
                    targets: roster.top_validators(num, den),
                }
            }
            State::CollectSignatures => {
                let Some(proposal) = self.active.clone() else {
                    self.state = State::Idle;
                    return Outbound::None;
                };
                if now as i64 > proposal.end {
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
                    self.last_submit = now;
                    self.reset_to_idle();
                    return Outbound::Submit { proposal, packed_signatures: packed };
                }
                self.round += 1;
                if self.round >= MAX_COLLECTION_ROUNDS {
                    self.reset_to_idle();
                    return Outbound::None;
                }
                let step = (self.round as usize).min(PROBE_STEPS.len() - 1);
                let (num, den) = PROBE_STEPS[step];
                Outbound::Sign {
                    proposal,
                    targets: roster.top_validators(num, den),
                }
            }
        }
    }

    fn reset_to_idle(&mut self) {
        self.state = State::Idle;
        self.active = None;
        self.signatures.clear();
        self.round = 0;
    }

    /// Verifies an EIP-712 `Upgrade`/`UpdateTokenVolatile` signature against
    /// the replier's roster signer before accepting it (§4.6).
    pub fn ingest_signature_reply(
        &mut self,
        roster: &RosterState,
        evm_chain_id: u64,
        contract: Address,
        replier: [u8; 32],
        signature: [u8; 65],
    ) {
        if self.state != State::CollectSignatures {
            return;
        }
        let Some(proposal) = &self.active else { return };
        let Some(signer) = roster.signer_of_validator(&replier) else { return };
        let verifying = VerifyingContract::Core(contract);
        let hash = match proposal.method {
            ProposalMethod::Upgrade => {
                let Ok(target) = proposal.target.parse::<Address>() else { return };
                let msg = eip712::Upgrade { newImplementation: target, nonce: proposal.nonce };
                eip712::hash_upgrade(evm_chain_id, verifying, &msg)
            }
            ProposalMethod::UpdateTokenVolatile => {
                let Ok(target) = proposal.target.parse::<Address>() else { return };
                let msg = eip712::UpdateTokenVolatile {
                    token: target,
                    volatile: proposal.volatile,
                    nonce: proposal.nonce,
                };
                eip712::hash_update_token_volatile(evm_chain_id, verifying, &msg)
            }
        };
        if !eip712::verify(hash, &signature, signer) {
            return;
        }
        self.signatures.insert(signer, SigReply { signer, signature });
    }
}

