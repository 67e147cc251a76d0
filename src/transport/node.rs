//! Inbound WebSocket from the attached native-chain node (§4.8, §6).
//!
//! Exactly one node is attached at a time, admitted only from the configured
//! `NODE_IP` (optionally resolved through a trusted `CF-Connecting-IP` or
//! `X-Real-IP` header, §6). Once accepted, a receive loop folds every action
//! into the [`crate::supervisor::ValidatorSupervisor`]'s per-chain state, and
//! a 5 s sync tick emits `node_account`/`weight_snapshot` requests.

use std::sync::Arc;

use alloy_primitives::{Address, B256};
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use rai_eip712::{self as eip712, VerifyingContract};
use rai_types::account;
use rai_types::{ChainId, CrossChainEnvelope, CrossChainMessage, ProposalMethod, TransferOperation};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::attestation::now_unix;
use crate::node_link::WeightSnapshot;
use crate::supervisor::ValidatorSupervisor;
use crate::transport::token_service;

/// Drives one accepted node connection until it closes or is cancelled.
pub async fn handle_node_socket(socket: WebSocket, supervisor: Arc<ValidatorSupervisor>, cancel: CancellationToken) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    supervisor.node.attach(tx).await;

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.to_string().into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<Value>(&text) {
                            Ok(value) => handle_node_frame(&supervisor, value).await,
                            Err(e) => tracing::warn!(error = %e, "malformed node frame, dropping"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "node socket error");
                        break;
                    }
                }
            }
        }
    }

    supervisor.node.detach();
    send_task.abort();
}

async fn handle_node_frame(supervisor: &Arc<ValidatorSupervisor>, value: Value) {
    let Some(action) = value.get("action").and_then(Value::as_str) else {
        return;
    };
    match action {
        "node_account_ack" => {
            if let Some(account_hex) = value.get("account").and_then(Value::as_str) {
                if let Ok(raw) = account::decode_any(account_hex) {
                    supervisor.node.set_account(raw).await;
                }
            }
        }
        "weight_snapshot_ack" => {
            let epoch = value.get("epoch").and_then(Value::as_u64).unwrap_or(0) as u32;
            let mut snapshot = WeightSnapshot { epoch, weights: Default::default() };
            if let Some(entries) = value.get("weights").and_then(Value::as_array) {
                for entry in entries {
                    let Some(rep_hex) = entry.get("representative").and_then(Value::as_str) else { continue };
                    let Ok(raw) = account::decode_any(rep_hex) else { continue };
                    let weight = entry
                        .get("weight")
                        .and_then(Value::as_str)
                        .and_then(|s| s.parse::<u128>().ok())
                        .unwrap_or(0);
                    snapshot.weights.insert(raw, crate::node_link::WeightSnapshotEntry { weight });
                }
            }
            supervisor.node.set_snapshot(snapshot).await;
        }
        "weight_query_ack" => handle_weight_query_ack(supervisor, &value).await,
        "bind_query_ack" => handle_bind_query_ack(supervisor, &value).await,
        "cross_chain" => handle_cross_chain(supervisor, &value).await,
        "keeplive" => supervisor.node.send(value).await,
        other => tracing::debug!(action = other, "unhandled node action"),
    }
}

async fn handle_weight_query_ack(supervisor: &Arc<ValidatorSupervisor>, value: &Value) {
    let Some(chain_id) = parse_chain_id(value) else { return };
    let Some(chain) = supervisor.chain(chain_id) else { return };
    let Some(replier_hex) = value.get("replier_hex").and_then(Value::as_str) else { return };
    let Ok(replier) = account::decode_any(replier_hex) else { return };
    let epoch = value.get("epoch").and_then(Value::as_u64).unwrap_or(0) as u32;
    let Some(weight) = value.get("weight").and_then(Value::as_str).and_then(|s| s.parse::<u128>().ok()) else {
        return;
    };
    chain.attestation.lock().await.ingest_weight_reply(replier, epoch, weight);
}

async fn handle_bind_query_ack(supervisor: &Arc<ValidatorSupervisor>, value: &Value) {
    let Some(chain_id) = parse_chain_id(value) else { return };
    let Some(chain) = supervisor.chain(chain_id) else { return };
    let Some(signer_hex) = value.get("signer").and_then(Value::as_str) else { return };
    let Some(signer) = parse_address_flexible(signer_hex) else { return };
    let bound = chain.local_signer_address().is_some_and(|local| local == signer);
    chain.bound.store(bound, std::sync::atomic::Ordering::SeqCst);
    chain.binding_status_synced.store(true, std::sync::atomic::Ordering::SeqCst);
}

/// Parses an address carried either as a native 20-byte `0x`-prefixed hex
/// string or as a 32-byte zero-padded one (the wire width `bind`/`bind_query`
/// use for the signer field, §6).
fn parse_address_flexible(raw: &str) -> Option<Address> {
    let stripped = raw.trim_start_matches("0x");
    match stripped.len() {
        40 => stripped.parse::<Address>().ok(),
        64 if stripped[..24].bytes().all(|b| b == b'0') => stripped[24..].parse::<Address>().ok(),
        _ => None,
    }
}

async fn handle_cross_chain(supervisor: &Arc<ValidatorSupervisor>, value: &Value) {
    let Some(chain_id) = parse_chain_id(value) else { return };
    let Some(chain) = supervisor.chain(chain_id) else { return };
    let Some(source_hex) = value.get("source_hex").and_then(Value::as_str) else { return };
    let Some(destination_hex) = value.get("destination_hex").and_then(Value::as_str) else { return };
    let Some(payload_hex) = value.get("payload").and_then(Value::as_str) else { return };
    let Ok(source) = account::decode_any(source_hex) else { return };
    let Ok(destination) = account::decode_any(destination_hex) else { return };
    let Ok(payload) = hex::decode(payload_hex.trim_start_matches("0x")) else { return };
    let envelope = CrossChainEnvelope { source, destination, chain_id: chain_id.numeric_id(), source_signer: None, payload };

    let message = match CrossChainMessage::decode(&envelope.payload) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(error = %e, "malformed cross-chain payload, dropping");
            return;
        }
    };

    match message {
        CrossChainMessage::WeightSign { is_request, validator, signer, weight, epoch, signature } => {
            if is_request {
                reply_weight_sign(supervisor, &chain, envelope.source, validator, weight, epoch).await;
            } else if let (Some(sig), evm_chain_id) = (signature, chain.config.evm_chain_id) {
                let roster = chain.roster.read().await;
                let sig: [u8; 65] = match sig.as_slice().try_into() {
                    Ok(s) => s,
                    Err(_) => return,
                };
                let validator_id: [u8; 32] = u256_to_bytes(validator);
                let _ = signer;
                chain
                    .attestation
                    .lock()
                    .await
                    .ingest_signature_reply(&roster, evm_chain_id, chain.config.validator_address, validator_id, epoch, weight, sig);
            }
        }
        CrossChainMessage::TransferSign { is_request, account, height, operation, request_id, signature } => {
            if is_request {
                reply_transfer_sign(supervisor, &chain, envelope.source, account, height, operation, request_id).await;
            } else if let Some(sig) = signature {
                supervisor.correlation.resolve(request_id, sig);
            }
        }
        CrossChainMessage::CreationSign { is_request, original_chain_id, original_contract, request_id, signature } => {
            if is_request {
                reply_creation_sign(supervisor, &chain, envelope.source, original_chain_id, original_contract, request_id).await;
            } else if let Some(sig) = signature {
                supervisor.correlation.resolve(request_id, sig);
            }
        }
        CrossChainMessage::UpgradeSign { is_request, proposal_id, implementation, nonce, signature } => {
            if is_request {
                reply_upgrade_sign(supervisor, &chain, envelope.source, proposal_id, implementation, nonce).await;
            } else if let Some(sig) = signature {
                let roster = chain.roster.read().await;
                let sig: [u8; 65] = match sig.as_slice().try_into() {
                    Ok(s) => s,
                    Err(_) => return,
                };
                chain
                    .proposal
                    .lock()
                    .await
                    .ingest_signature_reply(&roster, chain.config.evm_chain_id, chain.config.core_address, envelope.source, sig);
            }
        }
        CrossChainMessage::UpdateTokenVolatile { is_request, proposal_id, token, volatile, nonce, signature } => {
            if is_request {
                reply_update_token_volatile(supervisor, &chain, envelope.source, proposal_id, token, volatile, nonce).await;
            } else if let Some(sig) = signature {
                let roster = chain.roster.read().await;
                let sig: [u8; 65] = match sig.as_slice().try_into() {
                    Ok(s) => s,
                    Err(_) => return,
                };
                chain
                    .proposal
                    .lock()
                    .await
                    .ingest_signature_reply(&roster, chain.config.evm_chain_id, chain.config.core_address, envelope.source, sig);
            }
        }
    }
}

fn u256_to_bytes(v: alloy_primitives::U256) -> [u8; 32] {
    v.to_be_bytes()
}

async fn reply_weight_sign(
    supervisor: &Arc<ValidatorSupervisor>,
    chain: &Arc<crate::supervisor::ChainValidator>,
    destination: [u8; 32],
    validator: alloy_primitives::U256,
    weight: u128,
    epoch: u32,
) {
    let Some(signer) = chain.config.signer_key.as_ref() else { return };
    let msg = eip712::SubmitValidator {
        validator: B256::from(u256_to_bytes(validator)),
        signer: signer.address(),
        weight: alloy_primitives::U256::from(weight),
        epoch,
    };
    let Ok(sig) = eip712::sign_submit_validator(
        signer,
        chain.config.evm_chain_id,
        VerifyingContract::Validator(chain.config.validator_address),
        &msg,
    )
    .await
    else {
        return;
    };
    let reply = CrossChainMessage::WeightSign {
        is_request: false,
        validator,
        signer: address_to_u256(signer.address()),
        weight,
        epoch,
        signature: Some(sig.to_vec()),
    };
    send_cross_chain_reply(supervisor, chain.config.chain_id, destination, reply).await;
}

/// Answers an inbound `TransferSign` request by querying the token-metadata
/// service for the underlying unmap/wrap proof and signing it (§4.7, §4.8).
/// Only `unmap`/`wrap` ever reach this side — `map`/`unwrap` are proven on
/// the native chain, which is the node's domain, not this adapter's.
async fn reply_transfer_sign(
    supervisor: &Arc<ValidatorSupervisor>,
    chain: &Arc<crate::supervisor::ChainValidator>,
    destination: [u8; 32],
    account: alloy_primitives::U256,
    height: u64,
    operation: u8,
    request_id: alloy_primitives::U256,
) {
    if chain.config.signer_key.is_none() {
        return;
    }
    let Ok(op) = TransferOperation::from_u8(operation) else { return };
    let account_raw = u256_to_bytes(account);
    let Ok(account_str) = account::encode(&account_raw) else { return };

    let action = match op {
        TransferOperation::Unmap => "token_unmap_info",
        TransferOperation::Wrap => "token_wrap_info",
        _ => return,
    };
    let query = json!({"action": action, "account": account_str, "height": height.to_string()});
    let Some(ack) = token_service::query(&supervisor.correlation, &supervisor.token_service, query).await else { return };

    let signature = match op {
        TransferOperation::Unmap => sign_unmap_from_ack(chain, &ack, account_raw, height).await,
        TransferOperation::Wrap => sign_wrap_from_ack(chain, &ack, account_raw, height).await,
        _ => None,
    };
    let Some(signature) = signature else { return };

    let reply = CrossChainMessage::TransferSign {
        is_request: false,
        account,
        height,
        operation,
        request_id,
        signature: Some(signature.to_vec()),
    };
    send_cross_chain_reply(supervisor, chain.config.chain_id, destination, reply).await;
}

async fn sign_unmap_from_ack(
    chain: &Arc<crate::supervisor::ChainValidator>,
    ack: &Value,
    account_raw: [u8; 32],
    height: u64,
) -> Option<eip712::PackedSignature> {
    if ack.get("ack").and_then(Value::as_str) != Some("token_unmap_info") {
        return None;
    }
    let ack_chain_id: u32 = ack.get("chain_id").and_then(Value::as_str)?.parse().ok()?;
    if ack_chain_id != chain.config.chain_id.numeric_id() {
        return None;
    }
    let signer = chain.config.signer_key.as_ref()?;
    let to: Address = ack.get("to_raw").and_then(Value::as_str)?.parse().ok()?;
    let value: alloy_primitives::U256 = ack.get("value").and_then(Value::as_str)?.parse().ok()?;
    let txn_hash = parse_b256(ack.get("source_transaction").and_then(Value::as_str)?)?;
    let address_raw = ack.get("address_raw").and_then(Value::as_str)?;
    let contract = VerifyingContract::Core(chain.config.core_address);

    if is_native_token(address_raw) {
        let msg = eip712::UnmapETH {
            sender: B256::from(account_raw),
            recipient: to,
            txnHash: txn_hash,
            txnHeight: height,
            amount: value,
        };
        eip712::sign_unmap_eth(signer, chain.config.evm_chain_id, contract, &msg).await.ok()
    } else {
        let token: Address = format!("0x{address_raw}").parse().ok()?;
        match ack.get("type").and_then(Value::as_str)? {
            "20" => {
                let msg = eip712::UnmapERC20 {
                    token,
                    sender: B256::from(account_raw),
                    recipient: to,
                    txnHash: txn_hash,
                    txnHeight: height,
                    share: value,
                };
                eip712::sign_unmap_erc20(signer, chain.config.evm_chain_id, contract, &msg).await.ok()
            }
            "721" => {
                let msg = eip712::UnmapERC721 {
                    token,
                    sender: B256::from(account_raw),
                    recipient: to,
                    txnHash: txn_hash,
                    txnHeight: height,
                    tokenId: value,
                };
                eip712::sign_unmap_erc721(signer, chain.config.evm_chain_id, contract, &msg).await.ok()
            }
            _ => None,
        }
    }
}

async fn sign_wrap_from_ack(
    chain: &Arc<crate::supervisor::ChainValidator>,
    ack: &Value,
    account_raw: [u8; 32],
    height: u64,
) -> Option<eip712::PackedSignature> {
    if ack.get("ack").and_then(Value::as_str) != Some("token_wrap_info") {
        return None;
    }
    let to_chain_id: u32 = ack.get("to_chain_id").and_then(Value::as_str)?.parse().ok()?;
    if to_chain_id != chain.config.chain_id.numeric_id() {
        return None;
    }
    let signer = chain.config.signer_key.as_ref()?;
    let original_chain_id: u32 = ack.get("chain_id").and_then(Value::as_str)?.parse().ok()?;
    let address_raw = ack.get("address_raw").and_then(Value::as_str)?;
    let original_contract = parse_b256(&format!("0x{:0>64}", address_raw.trim_start_matches("0x")))?;
    let to: Address = ack.get("to_account_raw").and_then(Value::as_str)?.parse().ok()?;
    let value: alloy_primitives::U256 = ack.get("value").and_then(Value::as_str)?.parse().ok()?;
    let txn_hash = parse_b256(ack.get("source_transaction").and_then(Value::as_str)?)?;
    let contract = VerifyingContract::Core(chain.config.core_address);

    match ack.get("type").and_then(Value::as_str)? {
        "20" => {
            let msg = eip712::WrapERC20Token {
                originalChainId: original_chain_id,
                originalContract: original_contract,
                sender: B256::from(account_raw),
                recipient: to,
                txnHash: txn_hash,
                txnHeight: height,
                amount: value,
            };
            eip712::sign_wrap_erc20(signer, chain.config.evm_chain_id, contract, &msg).await.ok()
        }
        "721" => {
            let msg = eip712::WrapERC721Token {
                originalChainId: original_chain_id,
                originalContract: original_contract,
                sender: B256::from(account_raw),
                recipient: to,
                txnHash: txn_hash,
                txnHeight: height,
                tokenId: value,
            };
            eip712::sign_wrap_erc721(signer, chain.config.evm_chain_id, contract, &msg).await.ok()
        }
        _ => None,
    }
}

/// A token address encoded as the literal integer `1` marks the chain's
/// native coin rather than an ERC-20/721 contract.
fn is_native_token(address_raw: &str) -> bool {
    let stripped = address_raw.trim_start_matches("0x");
    alloy_primitives::U256::from_str_radix(stripped, 16).is_ok_and(|v| v == alloy_primitives::U256::from(1u8))
}

fn parse_b256(hex_str: &str) -> Option<B256> {
    let bytes = hex::decode(hex_str.trim_start_matches("0x")).ok()?;
    if bytes.len() != 32 {
        return None;
    }
    Some(B256::from_slice(&bytes))
}

/// Answers an inbound `CreationSign` request: queries the token-metadata
/// service for the original token's on-chain type, then derives its wrapped
/// name/symbol from the *other* tracked chain's own validator state before
/// signing (§4.7, §4.8). Skipped if this chain *is* the original chain.
async fn reply_creation_sign(
    supervisor: &Arc<ValidatorSupervisor>,
    chain: &Arc<crate::supervisor::ChainValidator>,
    destination: [u8; 32],
    original_chain_id: u32,
    original_contract: alloy_primitives::U256,
    request_id: alloy_primitives::U256,
) {
    if chain.config.chain_id.numeric_id() == original_chain_id {
        return;
    }
    let Some(signer) = chain.config.signer_key.as_ref() else { return };
    let contract_bytes = u256_to_bytes(original_contract);
    let address_raw = hex::encode(&contract_bytes[12..]);
    let query = json!({"action": "token_info", "chain_id": original_chain_id.to_string(), "address_raw": address_raw});
    let Some(ack) = token_service::query(&supervisor.correlation, &supervisor.token_service, query).await else { return };
    if ack.get("ack").and_then(Value::as_str) != Some("token_info") {
        return;
    }
    let Some(ack_address_raw) = ack.get("address_raw").and_then(Value::as_str) else { return };
    if !ack_address_raw.eq_ignore_ascii_case(&address_raw) {
        return;
    }
    let Some(token_type) = ack.get("type").and_then(Value::as_str) else { return };

    let Some(original_chain) = ChainId::from_numeric_id(original_chain_id) else { return };
    let Some(original) = supervisor.chain(original_chain) else { return };
    let Ok(token_address) = format!("0x{ack_address_raw}").parse::<Address>() else { return };
    let Ok(meta) = original.adapter.token_info(token_address, token_type == "721").await else { return };
    let wrapped_symbol = format!("r{}", meta.symbol);
    let wrapped_name = format!("{} from {}", meta.symbol, original_chain.display_name());
    let original_chain_name = original_chain.display_name().to_string();
    let contract = VerifyingContract::Core(chain.config.core_address);

    let signature = match token_type {
        "20" => {
            let Some(decimals) = ack.get("decimals").and_then(Value::as_str).and_then(|s| s.parse::<u8>().ok()) else {
                return;
            };
            let msg = eip712::CreateWrappedERC20Token {
                name: wrapped_name,
                symbol: wrapped_symbol,
                originalChain: original_chain_name,
                originalChainId: original_chain_id,
                originalContract: B256::from(contract_bytes),
                decimals,
            };
            eip712::sign_create_wrapped_erc20(signer, chain.config.evm_chain_id, contract, &msg).await.ok()
        }
        "721" => {
            let msg = eip712::CreateWrappedERC721Token {
                name: wrapped_name,
                symbol: wrapped_symbol,
                originalChain: original_chain_name,
                originalChainId: original_chain_id,
                originalContract: B256::from(contract_bytes),
            };
            eip712::sign_create_wrapped_erc721(signer, chain.config.evm_chain_id, contract, &msg).await.ok()
        }
        _ => None,
    };
    let Some(signature) = signature else { return };

    let reply = CrossChainMessage::CreationSign {
        is_request: false,
        original_chain_id,
        original_contract,
        request_id,
        signature: Some(signature.to_vec()),
    };
    send_cross_chain_reply(supervisor, chain.config.chain_id, destination, reply).await;
}

async fn reply_upgrade_sign(
    supervisor: &Arc<ValidatorSupervisor>,
    chain: &Arc<crate::supervisor::ChainValidator>,
    destination: [u8; 32],
    proposal_id: u32,
    implementation: alloy_primitives::U256,
    nonce: alloy_primitives::U256,
) {
    let Some(signer) = chain.config.signer_key.as_ref() else { return };
    let proposals = supervisor.proposals.lock().await;
    let now = now_unix() as i64;
    let found = proposals
        .active_for_chain(chain.config.chain_id.numeric_id(), now)
        .into_iter()
        .find(|p| p.id == proposal_id && p.method == ProposalMethod::Upgrade && p.nonce == nonce)
        .cloned();
    drop(proposals);
    let Some(proposal) = found else { return };
    let Ok(target) = proposal.target.parse::<Address>() else { return };
    let msg = eip712::Upgrade { newImplementation: target, nonce };
    let Ok(sig) = eip712::sign_upgrade(signer, chain.config.evm_chain_id, VerifyingContract::Core(chain.config.core_address), &msg).await else {
        return;
    };
    let reply = CrossChainMessage::UpgradeSign {
        is_request: false,
        proposal_id,
        implementation,
        nonce,
        signature: Some(sig.to_vec()),
    };
    send_cross_chain_reply(supervisor, chain.config.chain_id, destination, reply).await;
}

async fn reply_update_token_volatile(
    supervisor: &Arc<ValidatorSupervisor>,
    chain: &Arc<crate::supervisor::ChainValidator>,
    destination: [u8; 32],
    proposal_id: u32,
    token: alloy_primitives::U256,
    volatile: bool,
    nonce: alloy_primitives::U256,
) {
    let Some(signer) = chain.config.signer_key.as_ref() else { return };
    let proposals = supervisor.proposals.lock().await;
    let now = now_unix() as i64;
    let found = proposals
        .active_for_chain(chain.config.chain_id.numeric_id(), now)
        .into_iter()
        .find(|p| p.id == proposal_id && p.method == ProposalMethod::UpdateTokenVolatile && p.nonce == nonce)
        .cloned();
    drop(proposals);
    let Some(proposal) = found else { return };
    let Ok(target) = proposal.target.parse::<Address>() else { return };
    let msg = eip712::UpdateTokenVolatile { token: target, volatile: proposal.volatile, nonce };
    let Ok(sig) = eip712::sign_update_token_volatile(signer, chain.config.evm_chain_id, VerifyingContract::Core(chain.config.core_address), &msg).await else {
        return;
    };
    let reply = CrossChainMessage::UpdateTokenVolatile {
        is_request: false,
        proposal_id,
        token,
        volatile,
        nonce,
        signature: Some(sig.to_vec()),
    };
    send_cross_chain_reply(supervisor, chain.config.chain_id, destination, reply).await;
}

async fn send_cross_chain_reply(
    supervisor: &Arc<ValidatorSupervisor>,
    chain_id: rai_types::ChainId,
    destination: [u8; 32],
    message: CrossChainMessage,
) {
    let Ok(payload) = message.encode() else { return };
    let Some(my_account) = supervisor.node.account().await else { return };
    let frame = json!({
        "action": "cross_chain",
        "source": account::encode(&my_account).unwrap_or_default(),
        "destination": account::encode(&destination).unwrap_or_default(),
        "chain_id": chain_id.numeric_id(),
        "payload": hex::encode(payload),
    });
    supervisor.node.send(frame).await;
}

fn address_to_u256(address: Address) -> alloy_primitives::U256 {
    let mut bytes = [0u8; 32];
    bytes[12..].copy_from_slice(address.as_slice());
    alloy_primitives::U256::from_be_bytes(bytes)
}

fn parse_chain_id(value: &Value) -> Option<rai_types::ChainId> {
    let raw = value.get("chain_id")?;
    let numeric = raw.as_u64().or_else(|| raw.as_str().and_then(|s| s.parse().ok()))?;
    rai_types::ChainId::from_numeric_id(numeric as u32)
}

/// 5 s tick emitting `node_account`/`weight_snapshot` requests while unsynced (§4.8).
pub async fn node_sync_tick(supervisor: Arc<ValidatorSupervisor>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if !supervisor.node.is_attached() {
                    continue;
                }
                if supervisor.node.account().await.is_none() {
                    supervisor.node.send(json!({"action": "node_account"})).await;
                }
                let snapshot = supervisor.node.snapshot().await;
                if snapshot.epoch != crate::attestation::current_epoch(now_unix()) {
                    supervisor.node.send(json!({"action": "weight_snapshot"})).await;
                }
            }
        }
    }
}
