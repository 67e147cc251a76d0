//! Task supervision (§5): one ticker per configured EVM chain, plus the
//! fixed-interval node-sync, correlation-GC, token-service-reconnect, and
//! proposal-file-watch tasks. Every task is handed the same
//! [`CancellationToken`] and exits cleanly when it fires.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use alloy_primitives::{Bytes, U256};
use rai_types::{ChainId, CrossChainMessage, ProposalMethod};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::attestation::{self, Outbound as AttestationOutbound};
use crate::proposal::Outbound as ProposalOutbound;
use crate::supervisor::{ChainValidator, ValidatorSupervisor};
use crate::transport::{node, token_service};

/// Spawns every long-lived task and returns their handles so `main` can
/// await them after the cancellation token fires.
pub fn spawn_all(supervisor: Arc<ValidatorSupervisor>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    for chain_id in supervisor.chains.keys().copied().collect::<Vec<_>>() {
        let supervisor = supervisor.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(run_chain_ticker(supervisor, chain_id, cancel)));
    }

    handles.push(tokio::spawn(node::node_sync_tick(supervisor.clone(), cancel.clone())));
    handles.push(tokio::spawn(run_correlation_gc(supervisor.clone(), cancel.clone())));
    handles.push(tokio::spawn(run_proposal_watch(supervisor.clone(), cancel.clone())));

    let token_service_url = supervisor.config.token_service_url.clone();
    handles.push(tokio::spawn(token_service::run_token_service_link(
        supervisor.token_service.clone(),
        supervisor.correlation.clone(),
        token_service_url,
        cancel.clone(),
    )));

    handles
}

/// 10 s correlation-map GC (§4.7, §5).
async fn run_correlation_gc(supervisor: Arc<ValidatorSupervisor>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(10));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => supervisor.correlation.gc(),
        }
    }
}

/// 5 s proposal-file hash/re-parse watch (§4.6, §5).
async fn run_proposal_watch(supervisor: Arc<ValidatorSupervisor>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {
                let mut proposals = supervisor.proposals.lock().await;
                if proposals.refresh(supervisor.config.proposals_file.as_ref()) {
                    tracing::info!("proposal file reloaded");
                }
            }
        }
    }
}

/// One EVM chain's sync + attestation + proposal pipeline, ticking at the
/// chain's configured `period` (§4.3-§4.6).
async fn run_chain_ticker(supervisor: Arc<ValidatorSupervisor>, chain_id: ChainId, cancel: CancellationToken) {
    let Some(chain) = supervisor.chain(chain_id) else { return };
    let mut interval = tokio::time::interval(chain.config.period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {
                match sync_chain(&chain).await {
                    Ok(changed) if changed => {
                        let _ = supervisor.chain_notify.send(chain_id.numeric_id());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(chain = %chain_id, error = %e, "chain sync failed this tick");
                        continue;
                    }
                }
                check_bind(&supervisor, &chain).await;
                run_attestation_step(&supervisor, &chain).await;
                run_proposal_step(&supervisor, &chain).await;
            }
        }
    }
}

/// One chain's fee/validator sync (§4.3-§4.4). Returns `true` if anything
/// observable changed (roster contents, total weight, or the synced height
/// itself advanced) — callers use this to gate the `chain_info` notify
/// (§4.4 step 5, §8 "a second sync at the same block number produces no
/// notification").
async fn sync_chain(chain: &Arc<ChainValidator>) -> Result<bool, rai_evm::EvmError> {
    let height = chain.adapter.block_number().await?;
    let previous_height = chain.synced_height.load(Ordering::SeqCst);
    if height <= previous_height && chain.roster.read().await.is_initialized() {
        return Ok(false);
    }
    chain.synced_height.store(height, Ordering::SeqCst);

    let mut changed = height > previous_height;
    let mut roster = chain.roster.write().await;
    if !roster.is_initialized() {
        roster.genesis_validator = chain.adapter.genesis_validator().await.ok();
        roster.genesis_signer = chain.adapter.genesis_signer().await.ok();
        let total = chain.adapter.get_total_weight().await?;
        roster.set_raw_total_weight(total.try_into().unwrap_or(u128::MAX));
        for entry in chain.adapter.get_validators_paged().await? {
            roster.update_validator(entry);
        }
        roster.mark_initialized();
        changed = true;
    } else if height > previous_height {
        for (validator, log_height) in chain.adapter.get_validator_logs(previous_height + 1, height).await? {
            roster.record_activity_log(validator, log_height);
        }
        let total = chain.adapter.get_total_weight().await?;
        if total.try_into().unwrap_or(u128::MAX) != roster.raw_total_weight() {
            changed = true;
        }
        roster.set_raw_total_weight(total.try_into().unwrap_or(u128::MAX));
    }

    for validator in roster.pending_confirmations(height, chain.config.confirmations) {
        if let Ok(entry) = chain.adapter.get_validator_info(validator).await {
            if entry.weight == 0 {
                roster.remove_validator(&validator);
            } else {
                roster.update_validator(entry);
            }
        } else {
            roster.remove_validator(&validator);
        }
        roster.confirm_and_maybe_purge(validator, height, chain.config.confirmations);
        changed = true;
    }
    drop(roster);

    if let Ok(fee) = chain.adapter.fee().await {
        let mut current = chain.fee.write().await;
        if *current != fee {
            changed = true;
        }
        *current = fee;
    }
    Ok(changed)
}

/// Mirrors the node's bound-signer state for our own validator id, asking it
/// to resolve the link when we don't have a fresh answer cached, and issuing
/// `bind` once we know the mirrored signer disagrees with the configured key
/// (§4.4, §4.8).
async fn check_bind(supervisor: &Arc<ValidatorSupervisor>, chain: &Arc<ChainValidator>) {
    let Some(local_signer) = chain.local_signer_address() else { return };
    let Some(local_account) = supervisor.node.account().await else { return };
    if let Some(genesis_signer) = chain.roster.read().await.genesis_signer {
        if local_signer == genesis_signer {
            return;
        }
    }

    if !chain.binding_status_synced.load(Ordering::SeqCst) {
        supervisor
            .node
            .send(json!({
                "action": "bind_query",
                "chain_id": chain.config.chain_id.numeric_id(),
                "validator": rai_types::account::encode(&local_account).unwrap_or_default(),
            }))
            .await;
        return;
    }

    if chain.bound.load(Ordering::SeqCst) {
        return;
    }

    supervisor
        .node
        .send(json!({
            "action": "bind",
            "chain_id": chain.config.chain_id.numeric_id(),
            "signer": format!("0x{}", hex::encode(address_to_bytes32(local_signer))),
        }))
        .await;
    chain.binding_status_synced.store(false, Ordering::SeqCst);
}

async fn run_attestation_step(supervisor: &Arc<ValidatorSupervisor>, chain: &Arc<ChainValidator>) {
    if !supervisor.node.is_attached() || !chain.bound.load(Ordering::SeqCst) {
        return;
    }
    let Some(local_account) = supervisor.node.account().await else { return };
    let Some(local_signer) = chain.local_signer_address() else { return };
    let now = attestation::now_unix();

    let roster = chain.roster.read().await;
    if Some(local_account) == roster.genesis_validator || Some(local_signer) == roster.genesis_signer {
        return;
    }
    let snapshot = supervisor.node.snapshot().await;
    if snapshot.epoch != attestation::current_epoch(now) {
        return;
    }
    let snapshot_weight = snapshot.weights.get(&local_account).map(|e| e.weight).unwrap_or(0);
    if snapshot_weight == 0 && roster.weight_of_validator(&local_account) == 0 {
        return;
    }

    let mut attestation = chain.attestation.lock().await;
    let outbound = attestation.step(&roster, now, local_account, local_signer);
    let submission_weight = attestation.submission_weight();
    drop(attestation);
    drop(roster);

    match outbound {
        AttestationOutbound::WeightQuery { targets } => {
            // Bootstrap case: an entirely empty roster (no genesis, no
            // validators yet) yields no targets; query ourselves so the
            // first-ever validator isn't stuck waiting on peers that don't
            // exist.
            let targets: Vec<[u8; 32]> = if targets.is_empty() { vec![local_account] } else { targets };
            for target in targets {
                supervisor
                    .node
                    .send(json!({
                        "action": "weight_query",
                        "chain_id": chain.config.chain_id.numeric_id(),
                        "representative": rai_types::account::encode(&local_account).unwrap_or_default(),
                        "replier": rai_types::account::encode(&target).unwrap_or_default(),
                    }))
                    .await;
            }
        }
        AttestationOutbound::WeightSign { targets } => {
            let message = CrossChainMessage::WeightSign {
                is_request: true,
                validator: U256::from_be_bytes(local_account),
                signer: U256::from_be_bytes(address_to_bytes32(local_signer)),
                weight: submission_weight.unwrap_or(0),
                epoch: attestation::current_epoch(now),
                signature: None,
            };
            let Ok(payload) = message.encode() else { return };
            for target in targets {
                send_cross_chain(supervisor, chain, local_account, target, &payload).await;
            }
        }
        AttestationOutbound::Submit(call) => {
            let weight = U256::from(call.weight);
            match chain
                .adapter
                .submit_validator(call.validator, call.signer, weight, call.epoch, call.reward_to, Bytes::from(call.packed_signatures))
                .await
            {
                Ok(tx) => tracing::info!(chain = %chain.config.chain_id, tx = %hex::encode(tx), "submitValidator sent"),
                Err(e) => tracing::warn!(chain = %chain.config.chain_id, error = %e, "submitValidator failed"),
            }
        }
        AttestationOutbound::None => {}
    }
}

async fn run_proposal_step(supervisor: &Arc<ValidatorSupervisor>, chain: &Arc<ChainValidator>) {
    if !supervisor.config.execute_proposals {
        return;
    }
    if !supervisor.node.is_attached() || !chain.bound.load(Ordering::SeqCst) {
        return;
    }
    if chain.synced_height.load(Ordering::SeqCst) == 0 || !chain.roster.read().await.is_initialized() {
        return;
    }
    let Some(local_account) = supervisor.node.account().await else { return };
    let now = attestation::now_unix();
    let on_chain_nonce = match chain.adapter.nonce(chain.config.core_address).await {
        Ok(n) => n,
        Err(_) => return,
    };

    let proposals = supervisor.proposals.lock().await;
    let candidates: Vec<_> = proposals
        .active_for_chain(chain.config.chain_id.numeric_id(), now as i64)
        .into_iter()
        .cloned()
        .collect();
    drop(proposals);

    let roster = chain.roster.read().await;
    let outbound = chain.proposal.lock().await.step(&roster, now, on_chain_nonce, &candidates);
    drop(roster);

    match outbound {
        ProposalOutbound::Sign { proposal, targets } => {
            let Ok(target_address) = proposal.target.parse() else { return };
            let message = match proposal.method {
                ProposalMethod::Upgrade => CrossChainMessage::UpgradeSign {
                    is_request: true,
                    proposal_id: proposal.id,
                    implementation: U256::from_be_bytes(address_to_bytes32(target_address)),
                    nonce: proposal.nonce,
                    signature: None,
                },
                ProposalMethod::UpdateTokenVolatile => CrossChainMessage::UpdateTokenVolatile {
                    is_request: true,
                    proposal_id: proposal.id,
                    token: U256::from_be_bytes(address_to_bytes32(target_address)),
                    volatile: proposal.volatile,
                    nonce: proposal.nonce,
                    signature: None,
                },
            };
            let Ok(payload) = message.encode() else { return };
            for target in targets {
                send_cross_chain(supervisor, chain, local_account, target, &payload).await;
            }
        }
        ProposalOutbound::Submit { proposal, packed_signatures } => {
            let Ok(target_address) = proposal.target.parse() else { return };
            let result = match proposal.method {
                ProposalMethod::Upgrade => chain.adapter.upgrade(target_address, proposal.nonce, Bytes::from(packed_signatures)).await,
                ProposalMethod::UpdateTokenVolatile => {
                    chain
                        .adapter
                        .update_token_volatile(target_address, proposal.volatile, proposal.nonce, Bytes::from(packed_signatures))
                        .await
                }
            };
            match result {
                Ok(tx) => tracing::info!(chain = %chain.config.chain_id, tx = %hex::encode(tx), "proposal submitted"),
                Err(e) => tracing::warn!(chain = %chain.config.chain_id, error = %e, "proposal submission failed"),
            }
        }
        ProposalOutbound::None => {}
    }
}

async fn send_cross_chain(
    supervisor: &Arc<ValidatorSupervisor>,
    chain: &Arc<ChainValidator>,
    source: [u8; 32],
    destination: [u8; 32],
    payload: &[u8],
) {
    supervisor
        .node
        .send(json!({
            "action": "cross_chain",
            "source": rai_types::account::encode(&source).unwrap_or_default(),
            "destination": rai_types::account::encode(&destination).unwrap_or_default(),
            "chain_id": chain.config.chain_id.numeric_id(),
            "payload": hex::encode(payload),
        }))
        .await;
}

fn address_to_bytes32(address: alloy_primitives::Address) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    bytes[12..].copy_from_slice(address.as_slice());
    bytes
}
