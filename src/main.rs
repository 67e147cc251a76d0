//! Raicoin validator entrypoint.
//!
//! This binary launches an Axum-based WebSocket server that fans requests
//! between light clients, a single attached native-chain node, and a remote
//! token-metadata service, while per-chain background tasks track EVM
//! validator sets and drive the weight-attestation and proposal-execution
//! state machines (§2, §5).
//!
//! Endpoints:
//! - `GET /` — client WebSocket (§4.7)
//! - `GET /callback/<token>` — native-chain node WebSocket (§4.8, §6)
//! - `POST /debug` — loopback-only diagnostics (§6, optional)
//!
//! Environment: `.env` loaded at startup; see `config.rs` for the full list
//! of `<CHAIN>_*` and top-level variables this binary reads.

mod attestation;
mod config;
mod correlation;
mod dispatch;
mod error;
mod http;
mod node_link;
mod proposal;
mod scheduler;
mod sig_down;
mod supervisor;
mod telemetry;
mod transport;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Method;
use tower_http::cors;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::dispatch::RateLimiter;
use crate::http::AppState;
use crate::sig_down::SigDown;
use crate::supervisor::ValidatorSupervisor;
use crate::telemetry::Telemetry;

/// Initializes the validator process.
///
/// - Parses CLI flags; `--key` prints a fresh callback key and exits.
/// - Loads `.env` and the rest of the environment into a [`Config`].
/// - Gates every configured chain's endpoints on `eth_chainId` (§4.3) —
///   a mismatch is a fatal configuration error (§8 scenario 1).
/// - Builds the [`ValidatorSupervisor`], spawns every long-lived task
///   (§5), and serves the client/node WebSocket endpoints until a shutdown
///   signal fires.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match Config::load() {
        Ok(Some(config)) => config,
        Ok(None) => return Ok(()),
        Err(e) => {
            // §6: configuration errors print a diagnostic and exit 0,
            // historical behavior preserved rather than signalling failure.
            eprintln!("configuration error: {e}");
            return Ok(());
        }
    };

    let _telemetry_guard = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_log_file(config.log_file.clone())
        .with_verbose_default(config.debug)
        .register();

    let supervisor = ValidatorSupervisor::new(config.clone());

    for (chain_id, chain) in &supervisor.chains {
        if let Err(e) = chain.adapter.endpoints.gate_chain_ids().await {
            tracing::error!(chain = %chain_id, error = %e, "endpoint chain-id gate failed, aborting");
            std::process::exit(1);
        }
        if let Err(e) = chain.config.validate_abi_files() {
            tracing::error!(chain = %chain_id, error = %e, "abi file validation failed, aborting");
            std::process::exit(1);
        }
    }

    let sig_down = SigDown::try_new()?;
    let cancel = sig_down.cancellation_token();

    let task_handles = scheduler::spawn_all(supervisor.clone(), cancel.clone());

    let state = AppState {
        supervisor,
        config: Arc::new(config.clone()),
        rate_limiter: Arc::new(RateLimiter::new(config.rate_limit_per_second)),
        cancel: cancel.clone(),
    };

    let app = http::routes(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host, config.port);
    tracing::info!("starting validator at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap_or_else(|e| {
        tracing::error!("failed to bind to {}: {}", addr, e);
        std::process::exit(1);
    });

    let shutdown_cancel = cancel.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown_cancel.cancelled().await })
    .await?;

    cancel.cancel();
    for handle in task_handles {
        let _ = handle.await;
    }

    Ok(())
}
