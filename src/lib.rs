//! Raicoin cross-chain bridge validator.
//!
//! A long-running agent that tracks EVM validator sets across multiple
//! chains, participates in an epoch-based weight-attestation protocol,
//! signs EIP-712 transfer/creation/governance messages, and fans requests
//! between light clients, a locally-attached native-chain node, and a
//! remote token-metadata service.
//!
//! # Modules
//!
//! - [`config`] — CLI flags layered over environment variables
//! - [`supervisor`] — the explicit per-process context shared by every
//!   long-lived task
//! - [`attestation`] — the per-chain weight-attestation state machine (§4.5)
//! - [`proposal`] — the proposal-file watcher and submission cycle (§4.6)
//! - [`correlation`] — async request/reply correlation (§4.7, §4.8)
//! - [`node_link`] — state mirrored from the inbound native-chain node (§4.8)
//! - [`dispatch`] — the client WebSocket action dispatcher (§4.7)
//! - [`transport`] — the node and token-service peer links (§4.8)
//! - [`scheduler`] — per-chain tickers and fixed-interval supervisor tasks (§5)
//! - [`http`] — the axum routes tying the WebSocket endpoints together (§6)
//! - [`telemetry`] — `tracing` subscriber setup
//! - [`sig_down`] — graceful-shutdown signal handling
//! - [`error`] — the top-level `AppError`

pub mod attestation;
pub mod config;
pub mod correlation;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod node_link;
pub mod proposal;
pub mod scheduler;
pub mod sig_down;
pub mod supervisor;
pub mod telemetry;
pub mod transport;

pub use error::AppError;
