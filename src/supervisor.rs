//! The explicit per-process context shared by every long-lived task, in
//! place of scattered mutable singletons.
//!
//! A [`ValidatorSupervisor`] is built once at startup and handed, as an
//! `Arc`, to every long-lived task: the per-chain tickers, the node and
//! token-service transport tasks, and the dispatcher. Each [`ChainValidator`]
//! is itself further shared the same way — its roster is mutated by exactly
//! one task (that chain's ticker) between suspension points, with a lock
//! existing only so other tasks can read a consistent, cloned-out snapshot
//! (§5's "copy-under-lock" rule).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use alloy_primitives::{Address, U256};
use rai_evm::{ContractAddresses, EvmAdapter, RosterState};
use rai_types::{ChainId, ValidatorFullInfo};
use tokio::sync::{Mutex, RwLock};

use crate::attestation::ChainAttestation;
use crate::config::{ChainConfig, Config};
use crate::correlation::CorrelationMap;
use crate::node_link::{NodeLink, SharedNodeLink};
use crate::proposal::{ProposalSubmission, ProposalWatcher};
use crate::transport::token_service::{SharedTokenServiceLink, TokenServiceLink};

/// A point-in-time copy of one chain's tracked state, cloned out from under
/// the roster's read lock so callers never hold it across an `.await` (§5).
pub struct ChainInfoSnapshot {
    pub chain_id: ChainId,
    pub confirmations: u64,
    pub fee: U256,
    pub height: u64,
    pub total_weight: u128,
    pub genesis_validator: Option<[u8; 32]>,
    pub genesis_signer: Option<Address>,
    pub genesis_weight: u128,
    pub validators: Vec<ValidatorFullInfo>,
}

/// One EVM chain's adapter, roster, and the two submission state machines
/// driven off of it.
pub struct ChainValidator {
    pub config: ChainConfig,
    pub adapter: EvmAdapter,
    pub roster: RwLock<RosterState>,
    pub attestation: Mutex<ChainAttestation>,
    pub proposal: Mutex<ProposalSubmission>,
    pub fee: RwLock<U256>,
    pub synced_height: AtomicU64,
    /// Whether the node's mirrored bound signer for our own validator account
    /// already matches the configured signer key (§4.4 `bind()`).
    pub bound: AtomicBool,
    /// Whether a `bind_query_ack` has been received since the last time this
    /// flag was cleared. `bind()` must wait for a fresh ack before deciding
    /// whether a `bind` call is needed (§4.4, §4.8).
    pub binding_status_synced: AtomicBool,
}

impl ChainValidator {
    pub fn new(config: ChainConfig) -> Self {
        let signer = config.signer_key.clone();
        let adapter = EvmAdapter::new(
            config.endpoints.clone(),
            config.evm_chain_id,
            ContractAddresses {
                core: config.core_address,
                validator: config.validator_address,
            },
            signer,
        );
        for (address, symbol) in &config.symbol_patch {
            adapter.metadata.seed(*address, symbol.clone());
        }
        Self {
            config,
            adapter,
            roster: RwLock::new(RosterState::new()),
            attestation: Mutex::new(ChainAttestation::new()),
            proposal: Mutex::new(ProposalSubmission::new()),
            fee: RwLock::new(U256::ZERO),
            synced_height: AtomicU64::new(0),
            bound: AtomicBool::new(false),
            binding_status_synced: AtomicBool::new(false),
        }
    }

    pub async fn snapshot(&self) -> ChainInfoSnapshot {
        let roster = self.roster.read().await;
        ChainInfoSnapshot {
            chain_id: self.config.chain_id,
            confirmations: self.config.confirmations,
            fee: *self.fee.read().await,
            height: self.synced_height.load(Ordering::SeqCst),
            total_weight: roster.total_weight(),
            genesis_validator: roster.genesis_validator,
            genesis_signer: roster.genesis_signer,
            genesis_weight: roster.genesis_weight(),
            validators: roster.roster().to_vec(),
        }
    }

    /// Own validator id derived from the configured signer key, if any —
    /// the local node account doubles as the validator identity (§4.4,
    /// §4.5 rewardable predicate).
    pub fn local_signer_address(&self) -> Option<Address> {
        self.config.signer_key.as_ref().map(alloy_signer_local::PrivateKeySigner::address)
    }
}

/// The root context shared by every long-lived task.
pub struct ValidatorSupervisor {
    pub chains: HashMap<ChainId, Arc<ChainValidator>>,
    pub node: SharedNodeLink,
    pub token_service: SharedTokenServiceLink,
    pub correlation: Arc<CorrelationMap>,
    pub proposals: Mutex<ProposalWatcher>,
    pub config: Config,
    /// Fires a chain's numeric id whenever that chain's tracked state
    /// changes (§4.4 step 5), so the dispatcher can push `chain_info`
    /// notices to clients subscribed via `service_subscribe` (§4.7). Client
    /// handlers that aren't listening simply miss stale notices; there is no
    /// backlog to catch up on reconnect, matching the "no back-pressure
    /// queue beyond the socket's own buffer" rule (§5).
    pub chain_notify: tokio::sync::broadcast::Sender<u32>,
}

impl ValidatorSupervisor {
    pub fn new(config: Config) -> Arc<Self> {
        let chains = config
            .chains
            .iter()
            .map(|(id, cfg)| (*id, Arc::new(ChainValidator::new(cfg.clone()))))
            .collect();
        let (chain_notify, _) = tokio::sync::broadcast::channel(64);
        Arc::new(Self {
            chains,
            node: Arc::new(NodeLink::new()),
            token_service: Arc::new(TokenServiceLink::new()),
            correlation: Arc::new(CorrelationMap::new()),
            proposals: Mutex::new(ProposalWatcher::new()),
            config,
            chain_notify,
        })
    }

    pub fn chain(&self, id: ChainId) -> Option<Arc<ChainValidator>> {
        self.chains.get(&id).cloned()
    }
}
