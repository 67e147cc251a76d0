//! Client request dispatcher (§4.7): the allow-listed JSON actions a
//! connected wallet/service may send over the public WebSocket.

use std::collections::HashSet;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use governor::{Quota, RateLimiter as GovernorRateLimiter};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::clock::DefaultClock;
use rai_types::account;
use rai_types::{ChainId, CrossChainMessage, TransferOperation};
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::supervisor::ValidatorSupervisor;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("action not allowed")]
    NotAllowed,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unknown chain")]
    UnknownChain,
    #[error("Messaging too quickly")]
    RateLimited,
}

/// The allow-listed client actions (§4.7); also the `actions` list a client
/// sees in the `register` frame sent right after the socket upgrades (§6).
pub const ALLOWED_ACTIONS: &[&str] = &[
    "service_subscribe",
    "chain_info",
    "chain_head_height",
    "sign_transfer",
    "sign_creation",
    "token_symbol",
    "token_name",
    "token_type",
    "token_decimals",
    "token_wrapped",
    "creation_parameters",
    "transaction_timestamp",
];

/// Per-connection state: which `chain_id` values this client subscribed to
/// (only key recognised by `service_subscribe`, §4.7).
#[derive(Default)]
pub struct ClientSession {
    pub subscribed_chains: HashSet<u32>,
}

impl ClientSession {
    pub fn accepts(&self, chain_id: u32) -> bool {
        self.subscribed_chains.is_empty() || self.subscribed_chains.contains(&chain_id)
    }
}

type KeyedLimiter = GovernorRateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Optional per-IP token bucket (§4.7): burst is `limit · 100`, refill is
/// `limit` per second. `None` when `RATE_LIMIT_PER_SECOND` is unset.
pub struct RateLimiter(Option<KeyedLimiter>);

impl RateLimiter {
    pub fn new(per_second: Option<u32>) -> Self {
        let Some(limit) = per_second.and_then(NonZeroU32::new) else {
            return Self(None);
        };
        let burst = NonZeroU32::new(limit.get().saturating_mul(100)).unwrap_or(limit);
        let quota = Quota::per_second(limit).allow_burst(burst);
        Self(Some(GovernorRateLimiter::keyed(quota)))
    }

    pub fn check(&self, ip: IpAddr) -> bool {
        match &self.0 {
            Some(limiter) => limiter.check_key(&ip).is_ok(),
            None => true,
        }
    }
}

/// Handles one client JSON message. Returns the immediate reply to send, if
/// any — `sign_transfer`/`sign_creation` also spawn a task that later pushes
/// a second frame down `outbound` once the correlated signature arrives.
pub async fn dispatch(
    supervisor: &Arc<ValidatorSupervisor>,
    session: &mut ClientSession,
    outbound: mpsc::UnboundedSender<Value>,
    msg: Value,
) -> Value {
    let Some(action) = msg.get("action").and_then(Value::as_str) else {
        return json!({"error": DispatchError::InvalidRequest("missing action".into()).to_string()});
    };
    if !ALLOWED_ACTIONS.contains(&action) {
        return json!({"error": DispatchError::NotAllowed.to_string()});
    }

    match action {
        "service_subscribe" => handle_subscribe(session, &msg),
        "chain_info" => handle_chain_info(supervisor, &msg).await,
        "chain_head_height" => handle_chain_head_height(supervisor, &msg).await,
        "token_symbol" | "token_name" | "token_type" | "token_decimals" | "token_wrapped" => {
            handle_token_query(supervisor, action, &msg).await
        }
        "creation_parameters" => handle_creation_parameters(supervisor, &msg).await,
        "transaction_timestamp" => handle_transaction_timestamp(supervisor, &msg).await,
        "sign_transfer" => handle_sign_transfer(supervisor, outbound, &msg).await,
        "sign_creation" => handle_sign_creation(supervisor, outbound, &msg).await,
        _ => json!({"error": DispatchError::NotAllowed.to_string()}),
    }
}

fn parse_chain_id(msg: &Value) -> Option<ChainId> {
    let raw = msg.get("chain_id")?;
    let numeric = raw.as_u64().or_else(|| raw.as_str().and_then(|s| s.parse().ok()))?;
    ChainId::from_numeric_id(numeric as u32)
}

fn handle_subscribe(session: &mut ClientSession, msg: &Value) -> Value {
    let Some(filters) = msg.get("filters").and_then(Value::as_array) else {
        return json!({"error": DispatchError::InvalidRequest("missing filters".into()).to_string()});
    };
    session.subscribed_chains.clear();
    for filter in filters {
        let key = filter.get("key").and_then(Value::as_str).map(str::to_lowercase);
        if key.as_deref() != Some("chain_id") {
            continue;
        }
        if let Some(value) = filter.get("value") {
            let normalized = match value {
                Value::String(s) => s.to_lowercase(),
                other => other.to_string(),
            };
            if let Ok(id) = normalized.parse::<u32>() {
                session.subscribed_chains.insert(id);
            }
        }
    }
    json!({"action": "service_subscribe", "result": "ok"})
}

async fn handle_chain_info(supervisor: &Arc<ValidatorSupervisor>, msg: &Value) -> Value {
    let Some(chain_id) = parse_chain_id(msg) else {
        return json!({"error": DispatchError::UnknownChain.to_string()});
    };
    match build_chain_info(supervisor, chain_id).await {
        Some(body) => body,
        None => json!({"error": DispatchError::UnknownChain.to_string()}),
    }
}

/// Builds the `chain_info` body (§6) for one chain — shared by the
/// synchronous `chain_info` action and the push notice sent to subscribers
/// whenever that chain's tracked state changes (§4.4 step 5, §4.7).
pub async fn build_chain_info(supervisor: &Arc<ValidatorSupervisor>, chain_id: ChainId) -> Option<Value> {
    let chain = supervisor.chain(chain_id)?;
    let snapshot = chain.snapshot().await;
    Some(json!({
        "action": "chain_info",
        "chain": chain_id.display_name(),
        "chain_id": chain_id.numeric_id().to_string(),
        "confirmations": snapshot.confirmations.to_string(),
        "fee": snapshot.fee.to_string(),
        "total_weight": snapshot.total_weight.to_string(),
        "genesis_validator": snapshot.genesis_validator.map(|v| account::encode(&v).unwrap_or_default()),
        "genesis_signer": snapshot.genesis_signer.map(|s| s.to_string()),
        "genesis_weight": snapshot.genesis_weight.to_string(),
        "height": snapshot.height.to_string(),
        "validators": snapshot.validators.iter().map(|v| json!({
            "validator": account::encode(&v.validator).unwrap_or_default(),
            "signer": v.signer.to_string(),
            "weight": v.weight.to_string(),
            "gas_price": v.gas_price.to_string(),
            "last_submit": v.last_submit,
            "epoch": v.epoch,
        })).collect::<Vec<_>>(),
    }))
}

async fn handle_chain_head_height(supervisor: &Arc<ValidatorSupervisor>, msg: &Value) -> Value {
    let Some(chain_id) = parse_chain_id(msg) else {
        return json!({"error": DispatchError::UnknownChain.to_string()});
    };
    let Some(chain) = supervisor.chain(chain_id) else {
        return json!({"error": DispatchError::UnknownChain.to_string()});
    };
    json!({
        "action": "chain_head_height",
        "chain_id": chain_id.numeric_id(),
        "height": chain.synced_height.load(std::sync::atomic::Ordering::SeqCst),
    })
}

fn parse_token_address(msg: &Value) -> Option<Address> {
    msg.get("token").and_then(Value::as_str).and_then(|s| s.parse::<Address>().ok())
}

async fn handle_token_query(supervisor: &Arc<ValidatorSupervisor>, action: &str, msg: &Value) -> Value {
    let Some(chain_id) = parse_chain_id(msg) else {
        return json!({"error": DispatchError::UnknownChain.to_string()});
    };
    let Some(chain) = supervisor.chain(chain_id) else {
        return json!({"error": DispatchError::UnknownChain.to_string()});
    };
    let Some(token) = parse_token_address(msg) else {
        return json!({"error": DispatchError::InvalidRequest("missing token".into()).to_string()});
    };
    if action == "token_wrapped" {
        return match chain.adapter.token_core_info(token).await {
            Ok(info) => json!({"action": action, "chain_id": chain_id.numeric_id(), "token": token.to_string(), "wrapped": info.wrapped}),
            Err(e) => json!({"error": e.to_string()}),
        };
    }
    let core_info = chain.adapter.token_core_info(token).await.ok();
    let erc721 = core_info.map(|i| i.erc721).unwrap_or(false);
    match chain.adapter.token_info(token, erc721).await {
        Ok(meta) => {
            let body = match action {
                "token_symbol" => json!({"symbol": meta.symbol}),
                "token_name" => json!({"name": meta.name}),
                "token_decimals" => json!({"decimals": meta.decimals}),
                "token_type" => json!({"token_type": if erc721 { "erc721" } else { "erc20" }}),
                _ => json!({}),
            };
            let mut out = json!({"action": action, "chain_id": chain_id.numeric_id(), "token": token.to_string()});
            out.as_object_mut().unwrap().extend(body.as_object().unwrap().clone());
            out
        }
        Err(e) => json!({"error": e.to_string()}),
    }
}

async fn handle_creation_parameters(supervisor: &Arc<ValidatorSupervisor>, msg: &Value) -> Value {
    let Some(chain_id) = parse_chain_id(msg) else {
        return json!({"error": DispatchError::UnknownChain.to_string()});
    };
    let Some(chain) = supervisor.chain(chain_id) else {
        return json!({"error": DispatchError::UnknownChain.to_string()});
    };
    let Some(token) = parse_token_address(msg) else {
        return json!({"error": DispatchError::InvalidRequest("missing token".into()).to_string()});
    };
    match chain.adapter.token_core_info(token).await {
        Ok(info) => json!({
            "action": "creation_parameters",
            "chain_id": chain_id.numeric_id(),
            "token": token.to_string(),
            "wrapped": info.wrapped,
            "original_chain_id": info.original_chain_id,
            "original_contract": hex::encode(info.original_contract),
            "erc721": info.erc721,
        }),
        Err(e) => json!({"error": e.to_string()}),
    }
}

async fn handle_transaction_timestamp(supervisor: &Arc<ValidatorSupervisor>, msg: &Value) -> Value {
    let Some(chain_id) = parse_chain_id(msg) else {
        return json!({"error": DispatchError::UnknownChain.to_string()});
    };
    let Some(chain) = supervisor.chain(chain_id) else {
        return json!({"error": DispatchError::UnknownChain.to_string()});
    };
    let Some(height) = msg.get("height").and_then(Value::as_u64) else {
        return json!({"error": DispatchError::InvalidRequest("missing height".into()).to_string()});
    };
    match chain.adapter.block(Some(height)).await {
        Ok((timestamp, _)) => json!({"action": "transaction_timestamp", "chain_id": chain_id.numeric_id(), "height": height, "timestamp": timestamp}),
        Err(e) => json!({"error": e.to_string()}),
    }
}

async fn handle_sign_transfer(supervisor: &Arc<ValidatorSupervisor>, outbound: mpsc::UnboundedSender<Value>, msg: &Value) -> Value {
    let Some(chain_id) = parse_chain_id(msg) else {
        return json!({"error": DispatchError::UnknownChain.to_string()});
    };
    if supervisor.chain(chain_id).is_none() {
        return json!({"error": DispatchError::UnknownChain.to_string()});
    }
    let Some(validator_hex) = msg.get("validator").and_then(Value::as_str) else {
        return json!({"error": DispatchError::InvalidRequest("missing validator".into()).to_string()});
    };
    let Some(account_hex) = msg.get("account").and_then(Value::as_str) else {
        return json!({"error": DispatchError::InvalidRequest("missing account".into()).to_string()});
    };
    let Some(height) = msg.get("height").and_then(Value::as_u64) else {
        return json!({"error": DispatchError::InvalidRequest("missing height".into()).to_string()});
    };
    let Some(operation) = msg.get("operation").and_then(Value::as_str).and_then(parse_operation) else {
        return json!({"error": DispatchError::InvalidRequest("invalid operation".into()).to_string()});
    };
    let Ok(validator) = account::decode_any(validator_hex) else {
        return json!({"error": DispatchError::InvalidRequest("invalid validator".into()).to_string()});
    };
    let Ok(account_raw) = account::decode_any(account_hex) else {
        return json!({"error": DispatchError::InvalidRequest("invalid account".into()).to_string()});
    };

    let (request_id, rx) = supervisor.correlation.register();
    let request = CrossChainMessage::TransferSign {
        is_request: true,
        account: U256::from_be_bytes(account_raw),
        height,
        operation: operation as u8,
        request_id,
        signature: None,
    };
    send_cross_chain_request(supervisor, chain_id, validator, request).await;

    let supervisor = supervisor.clone();
    tokio::spawn(async move {
        if let Ok(signature) = rx.await {
            let _ = outbound.send(json!({
                "action": "sign_transfer",
                "request_id": request_id.to_string(),
                "signature": hex::encode(signature),
            }));
        }
        let _ = supervisor;
    });

    json!({"pending": ""})
}

async fn handle_sign_creation(supervisor: &Arc<ValidatorSupervisor>, outbound: mpsc::UnboundedSender<Value>, msg: &Value) -> Value {
    let Some(chain_id) = parse_chain_id(msg) else {
        return json!({"error": DispatchError::UnknownChain.to_string()});
    };
    if supervisor.chain(chain_id).is_none() {
        return json!({"error": DispatchError::UnknownChain.to_string()});
    }
    let Some(validator_hex) = msg.get("validator").and_then(Value::as_str) else {
        return json!({"error": DispatchError::InvalidRequest("missing validator".into()).to_string()});
    };
    let Some(original_chain_id) = msg.get("original_chain_id").and_then(Value::as_u64) else {
        return json!({"error": DispatchError::InvalidRequest("missing original_chain_id".into()).to_string()});
    };
    let Some(original_contract_hex) = msg.get("original_contract").and_then(Value::as_str) else {
        return json!({"error": DispatchError::InvalidRequest("missing original_contract".into()).to_string()});
    };
    let Ok(validator) = account::decode_any(validator_hex) else {
        return json!({"error": DispatchError::InvalidRequest("invalid validator".into()).to_string()});
    };
    let Ok(original_contract) = hex::decode(original_contract_hex.trim_start_matches("0x")) else {
        return json!({"error": DispatchError::InvalidRequest("invalid original_contract".into()).to_string()});
    };
    let len = original_contract.len().min(32);
    let mut buf = [0u8; 32];
    buf[32 - len..].copy_from_slice(&original_contract[original_contract.len() - len..]);

    let (request_id, rx) = supervisor.correlation.register();
    let request = CrossChainMessage::CreationSign {
        is_request: true,
        original_chain_id: original_chain_id as u32,
        original_contract: U256::from_be_bytes(buf),
        request_id,
        signature: None,
    };
    send_cross_chain_request(supervisor, chain_id, validator, request).await;

    let supervisor = supervisor.clone();
    tokio::spawn(async move {
        if let Ok(signature) = rx.await {
            let _ = outbound.send(json!({
                "action": "sign_creation",
                "request_id": request_id.to_string(),
                "signature": hex::encode(signature),
            }));
        }
        let _ = supervisor;
    });

    json!({"pending": ""})
}

fn parse_operation(s: &str) -> Option<TransferOperation> {
    match s {
        "map" => Some(TransferOperation::Map),
        "unmap" => Some(TransferOperation::Unmap),
        "wrap" => Some(TransferOperation::Wrap),
        "unwrap" => Some(TransferOperation::Unwrap),
        _ => None,
    }
}

async fn send_cross_chain_request(supervisor: &Arc<ValidatorSupervisor>, chain_id: ChainId, destination: [u8; 32], message: CrossChainMessage) {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_operation_is_rejected() {
        assert!(parse_operation("burn").is_none());
    }

    #[test]
    fn all_four_operations_parse() {
        assert_eq!(parse_operation("map"), Some(TransferOperation::Map));
        assert_eq!(parse_operation("unmap"), Some(TransferOperation::Unmap));
        assert_eq!(parse_operation("wrap"), Some(TransferOperation::Wrap));
        assert_eq!(parse_operation("unwrap"), Some(TransferOperation::Unwrap));
    }

    #[test]
    fn parse_chain_id_accepts_numeric_and_string_forms() {
        let numeric = json!({"chain_id": 10040});
        let stringy = json!({"chain_id": "10040"});
        assert_eq!(parse_chain_id(&numeric), parse_chain_id(&stringy));
        assert!(parse_chain_id(&numeric).is_some());
    }

    #[test]
    fn parse_chain_id_rejects_unsupported_values() {
        assert!(parse_chain_id(&json!({"chain_id": 999999})).is_none());
        assert!(parse_chain_id(&json!({})).is_none());
    }

    #[test]
    fn session_with_no_subscriptions_accepts_everything() {
        let session = ClientSession::default();
        assert!(session.accepts(10040));
    }

    #[test]
    fn session_narrows_to_subscribed_chains() {
        let mut session = ClientSession::default();
        session.subscribed_chains.insert(10040);
        assert!(session.accepts(10040));
        assert!(!session.accepts(1));
    }

    #[test]
    fn rate_limiter_disabled_when_unset() {
        let limiter = RateLimiter::new(None);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        for _ in 0..1000 {
            assert!(limiter.check(ip));
        }
    }

    #[test]
    fn rate_limiter_exhausts_burst_then_blocks() {
        let limiter = RateLimiter::new(Some(1));
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let mut allowed = 0;
        for _ in 0..200 {
            if limiter.check(ip) {
                allowed += 1;
            }
        }
        // burst = limit * 100 = 100; the 101st+ call in the same instant is refused.
        assert!(allowed <= 100);
        assert!(allowed > 0);
    }
}
