//! HTTP/WebSocket entrypoints (§6): the client-facing `/` socket, the
//! node-facing `/callback/<token>` socket, and the optional loopback
//! `/debug` diagnostics endpoint.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::Router;
use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Json;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::dispatch::{self, ALLOWED_ACTIONS, ClientSession, RateLimiter};
use crate::supervisor::ValidatorSupervisor;
use crate::transport::node;
use rai_types::ChainId;

#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<ValidatorSupervisor>,
    pub config: Arc<Config>,
    pub rate_limiter: Arc<RateLimiter>,
    pub cancel: CancellationToken,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(client_ws))
        .route("/callback/{token}", get(node_ws))
        .route("/debug", post(debug))
        .with_state(state)
}

/// Resolves the address a peer is seen from, trusting a proxy header only
/// when the corresponding `USE_CLOUDFLARE`/`USE_NGINX` flag is set (§6).
fn peer_ip(config: &Config, headers: &HeaderMap, connect_info: IpAddr) -> IpAddr {
    if config.use_cloudflare {
        if let Some(ip) = header_ip(headers, "cf-connecting-ip") {
            return ip;
        }
    }
    if config.use_nginx {
        if let Some(ip) = header_ip(headers, "x-real-ip") {
            return ip;
        }
    }
    connect_info
}

fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// `GET /` — the public client WebSocket (§4.7, §6). Every text frame is a
/// JSON request; `service_subscribe` narrows which `chain_info` notices this
/// connection receives, everything else is a one-shot request/reply.
async fn client_ws(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let ip = peer_ip(&state.config, &headers, addr.ip());
    ws.on_upgrade(move |socket| handle_client_socket(socket, state, ip))
}

async fn handle_client_socket(socket: WebSocket, state: AppState, ip: IpAddr) {
    let (mut sink, mut stream) = socket.split();
    let register = json!({
        "register": "validator",
        "filters": ["chain_id"],
        "actions": ALLOWED_ACTIONS,
    });
    if sink.send(Message::Text(register.to_string().into())).await.is_err() {
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    let forward = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.to_string().into())).await.is_err() {
                break;
            }
        }
    });

    let mut session = ClientSession::default();
    let mut chain_notify = state.supervisor.chain_notify.subscribe();
    loop {
        tokio::select! {
            _ = state.cancel.cancelled() => break,
            notice = chain_notify.recv() => {
                // Lagging behind the broadcast just means this connection
                // misses stale notices — there is no backlog to replay
                // (§5's "no back-pressure queue" rule).
                let Ok(numeric_chain_id) = notice else { continue };
                if !session.accepts(numeric_chain_id) {
                    continue;
                }
                let Some(chain_id) = ChainId::from_numeric_id(numeric_chain_id) else { continue };
                if let Some(mut body) = dispatch::build_chain_info(&state.supervisor, chain_id).await {
                    if let Some(obj) = body.as_object_mut() {
                        obj.insert("service".to_string(), json!("validator"));
                        obj.insert("ack".to_string(), json!("chain_info"));
                    }
                    let _ = tx.send(body);
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !state.rate_limiter.check(ip) {
                            let _ = tx.send(json!({"error": "Messaging too quickly"}));
                            continue;
                        }
                        let parsed = match serde_json::from_str::<Value>(&text) {
                            Ok(v) => v,
                            Err(_) => {
                                let _ = tx.send(json!({"error": "invalid request"}));
                                continue;
                            }
                        };
                        let request_id = parsed.get("request_id").cloned();
                        let client_id = parsed.get("client_id").cloned();
                        let mut reply = dispatch::dispatch(&state.supervisor, &mut session, tx.clone(), parsed).await;
                        if let Some(obj) = reply.as_object_mut() {
                            obj.entry("service").or_insert(json!("validator"));
                            if let Some(action) = obj.get("action").cloned() {
                                obj.entry("ack").or_insert(action);
                            }
                            if let Some(rid) = request_id {
                                obj.insert("request_id".to_string(), rid);
                            }
                            if let Some(cid) = client_id {
                                obj.insert("client_id".to_string(), cid);
                            }
                        }
                        let _ = tx.send(reply);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
    forward.abort();
}

/// `GET /callback/<token>` — the single inbound native-chain node socket
/// (§4.8, §6). Rejected with 401 unless the token matches
/// `NODE_CALLBACK_KEY` and the peer resolves to the configured `NODE_IP`.
async fn node_ws(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if token != state.config.node_callback_key {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let ip = peer_ip(&state.config, &headers, addr.ip());
    if ip != state.config.node_ip {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(move |socket| node::handle_node_socket(socket, state.supervisor.clone(), state.cancel.clone()))
        .into_response()
}

/// `POST /debug` — local loopback-only diagnostics (§6, optional). Dumps a
/// one-line-per-chain synced-height/roster-size summary; never exposed past
/// loopback regardless of `USE_CLOUDFLARE`/`USE_NGINX`, since a debug build
/// is expected to sit behind no proxy at all.
async fn debug(State(state): State<AppState>, ConnectInfo(addr): ConnectInfo<SocketAddr>) -> impl IntoResponse {
    if !addr.ip().is_loopback() {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut chains = Vec::new();
    for (id, chain) in &state.supervisor.chains {
        let snapshot = chain.snapshot().await;
        chains.push(json!({
            "chain_id": id.numeric_id(),
            "height": snapshot.height,
            "total_weight": snapshot.total_weight.to_string(),
            "validator_count": snapshot.validators.len(),
            "bound": chain.bound.load(std::sync::atomic::Ordering::SeqCst),
        }));
    }
    Json(json!({
        "node_attached": state.supervisor.node.is_attached(),
        "correlations_pending": state.supervisor.correlation.len(),
        "chains": chains,
    }))
    .into_response()
}
