//! Outbound link to the remote token-metadata service (§4.8).
//!
//! Distinct from [`crate::node_link::NodeLink`]: this side never tracks an
//! `account`/weight snapshot, just whether a socket is currently attached and
//! where to send frames. A 5 s supervisor in `scheduler.rs` owns reconnects;
//! this type only holds the current outbound sender and the attach flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use alloy_primitives::U256;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{RwLock, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::correlation::CorrelationMap;

pub struct TokenServiceLink {
    connected: AtomicBool,
    outbound: RwLock<Option<mpsc::UnboundedSender<serde_json::Value>>>,
}

impl Default for TokenServiceLink {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenServiceLink {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            outbound: RwLock::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub async fn attach(&self, sender: mpsc::UnboundedSender<serde_json::Value>) {
        *self.outbound.write().await = Some(sender);
        self.connected.store(true, Ordering::SeqCst);
    }

    pub fn detach(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub async fn send(&self, frame: serde_json::Value) {
        if let Some(tx) = self.outbound.read().await.as_ref() {
            let _ = tx.send(frame);
        }
    }
}

pub type SharedTokenServiceLink = Arc<TokenServiceLink>;

/// Sends a query carrying a fresh correlation id as `request_id`, and awaits
/// the matching ack (§4.8). Returns `None` on disconnect, GC timeout, or a
/// malformed ack.
pub async fn query(correlation: &CorrelationMap, link: &SharedTokenServiceLink, mut message: Value) -> Option<Value> {
    let (id, rx) = correlation.register();
    message
        .as_object_mut()?
        .insert("request_id".to_string(), Value::String(format!("{id:064x}")));
    link.send(message).await;
    let bytes = rx.await.ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Resolves the correlation entry named by an inbound frame's `request_id`,
/// if any (§4.8). Frames with no `request_id` (service `register`/`notify`
/// announcements) are ignored here.
fn handle_frame(correlation: &CorrelationMap, value: Value) {
    let Some(request_id) = value.get("request_id").and_then(Value::as_str) else { return };
    let Ok(id) = U256::from_str_radix(request_id.trim_start_matches("0x"), 16) else { return };
    let Ok(payload) = serde_json::to_vec(&value) else { return };
    correlation.resolve(id, payload);
}

/// Reconnect supervisor (§4.8, §5): tries every 5 s while disconnected, and
/// pumps frames both ways for the lifetime of one connection.
pub async fn run_token_service_link(
    link: SharedTokenServiceLink,
    correlation: Arc<CorrelationMap>,
    url: url::Url,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {}
        }
        if link.is_connected() {
            continue;
        }
        let socket = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((socket, _)) => socket,
            Err(e) => {
                tracing::warn!(error = %e, "token service connect failed, retrying in 5s");
                continue;
            }
        };
        tracing::info!("connected to token service");
        let (mut write, mut read) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<serde_json::Value>();
        link.attach(tx).await;

        let forward = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if write.send(Message::Text(frame.to_string().into())).await.is_err() {
                    break;
                }
            }
        });

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    forward.abort();
                    link.detach();
                    return;
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Ok(value) = serde_json::from_str::<Value>(&text) {
                                handle_frame(&correlation, value);
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "token service socket error");
                            break;
                        }
                    }
                }
            }
        }
        forward.abort();
        link.detach();
        tracing::warn!("token service disconnected, retrying in 5s");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_frame_resolves_matching_request_id() {
        let correlation = CorrelationMap::new();
        let (id, rx) = correlation.register();
        let ack = serde_json::json!({"ack": "token_info", "request_id": format!("{id:064x}"), "symbol": "RAI"});
        handle_frame(&correlation, ack.clone());
        let resolved = rx.try_recv().expect("waiter should be woken");
        let value: Value = serde_json::from_slice(&resolved).unwrap();
        assert_eq!(value, ack);
    }

    #[test]
    fn handle_frame_without_request_id_is_ignored() {
        let correlation = CorrelationMap::new();
        handle_frame(&correlation, serde_json::json!({"register": "token_service"}));
        assert!(correlation.is_empty());
    }
}
