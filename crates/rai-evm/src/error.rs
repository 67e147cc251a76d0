//! Error type for the EVM adapter and roster tracker.

use alloy_primitives::U256;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvmError {
    #[error("endpoint reported chain id {got}, expected {expected}; configuration is fatal")]
    ChainIdMismatch { expected: u64, got: u64 },
    #[error("every configured endpoint for this chain is marked bad")]
    AllEndpointsBad,
    #[error("RPC call failed: {0}")]
    Rpc(String),
    #[error("failed to decode RPC response: {0}")]
    Decode(String),
    #[error("gas estimation failed: {0}")]
    GasEstimate(String),
    #[error("no signer key configured for this chain, write call rejected")]
    SignerMissing,
    #[error("height {height} is above the current head, not yet synchronized")]
    Synchronizing { height: u64 },
    #[error("transaction hash does not match any pending block at height {height}: fork")]
    Fork { height: u64 },
    #[error("value {0} does not fit the target width")]
    Overflow(U256),
    #[error(transparent)]
    Wire(#[from] rai_types::WireError),
    #[error("abi file {path}: {reason}")]
    AbiMismatch { path: String, reason: String },
}
