//! Governance proposals read from the operator-maintained proposal file.
//!
//! Proposals are plain JSON records describing a pending `upgrade` or
//! `updateTokenVolatile` call on a chain's core contract, each valid only
//! within a `[begin, end)` window. The validator hashes the raw file content
//! with blake2b-256 so it can skip re-parsing when the file is untouched.

use alloy_primitives::U256;
use blake2::Blake2bVar;
use blake2::digest::{Update, VariableOutput};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::macros::format_description;
use time::PrimitiveDateTime;

use crate::ids::ChainId;

#[derive(Debug, Error)]
pub enum ProposalError {
    #[error("invalid proposal JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("timestamp `{0}` does not match the expected `YYYY-MM-DD HH:MM:SSUTC` format")]
    InvalidTimestamp(String),
    #[error("proposal references unknown chain id {0}")]
    UnknownChain(u32),
}

/// The action a proposal directs the validator set to take on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProposalMethod {
    Upgrade,
    UpdateTokenVolatile,
}

/// One pending governance action, as recorded in the proposal file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Proposal {
    pub id: u32,
    pub chain_id: u32,
    pub contract: String,
    pub method: ProposalMethod,
    /// `implementation` address for `Upgrade`, `token` address for `UpdateTokenVolatile`.
    pub target: String,
    /// Only meaningful for `UpdateTokenVolatile`.
    #[serde(default)]
    pub volatile: bool,
    /// Must match the contract's on-chain nonce for this proposal to be
    /// eligible for submission (§4.6).
    pub nonce: U256,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub begin: i64,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub end: i64,
}

impl Proposal {
    pub fn chain(&self) -> Option<ChainId> {
        ChainId::from_numeric_id(self.chain_id)
    }

    pub fn is_active(&self, now_unix: i64) -> bool {
        now_unix >= self.begin && now_unix < self.end
    }
}

fn deserialize_timestamp<'de, D>(de: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(de)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

/// Parses the proposal file's `"YYYY-MM-DD HH:MM:SSUTC"` timestamp format
/// into Unix seconds.
pub fn parse_timestamp(raw: &str) -> Result<i64, ProposalError> {
    let body = raw
        .strip_suffix("UTC")
        .ok_or_else(|| ProposalError::InvalidTimestamp(raw.to_string()))?;
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let parsed = PrimitiveDateTime::parse(body, &format)
        .map_err(|_| ProposalError::InvalidTimestamp(raw.to_string()))?;
    Ok(parsed.assume_utc().unix_timestamp())
}

/// The full proposal file: a flat JSON array of [`Proposal`] records.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProposalFile(pub Vec<Proposal>);

impl ProposalFile {
    pub fn parse(content: &str) -> Result<Self, ProposalError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn active_for_chain(&self, chain_id: u32, now_unix: i64) -> Vec<&Proposal> {
        self.0
            .iter()
            .filter(|p| p.chain_id == chain_id && p.is_active(now_unix))
            .collect()
    }
}

/// blake2b-256 content hash, used to detect whether the proposal file has
/// changed since it was last parsed.
pub fn content_hash(content: &str) -> [u8; 32] {
    let mut hasher = Blake2bVar::new(32).expect("32-byte blake2b output is valid");
    hasher.update(content.as_bytes());
    let mut digest = [0u8; 32];
    hasher
        .finalize_variable(&mut digest)
        .expect("digest buffer sized to output length");
    digest
}

/// Parses a proposal's `target` field (a hex EVM address or `U256`-encoded
/// native value) into a `U256` suitable for the `UpgradeSign`/
/// `UpdateTokenVolatile` cross-chain payloads.
pub fn target_as_u256(target: &str) -> Result<U256, crate::error::WireError> {
    crate::wire::parse_u256_flexible(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_documented_timestamp_format() {
        let ts = parse_timestamp("2026-01-15 12:30:00UTC").unwrap();
        assert_eq!(ts, 1768480200);
    }

    #[test]
    fn rejects_timestamp_without_utc_suffix() {
        assert!(parse_timestamp("2026-01-15 12:30:00").is_err());
    }

    #[test]
    fn parses_proposal_file_and_filters_active_window() {
        let json = r#"[
            {
                "id": 1,
                "chain_id": 10040,
                "contract": "0x0000000000000000000000000000000000000001",
                "method": "upgrade",
                "target": "0x0000000000000000000000000000000000000002",
                "nonce": "5",
                "begin": "2026-01-01 00:00:00UTC",
                "end": "2026-01-02 00:00:00UTC"
            }
        ]"#;
        let file = ProposalFile::parse(json).unwrap();
        assert_eq!(file.0.len(), 1);
        let mid_window = 1767225600 + 3600;
        assert_eq!(file.active_for_chain(10040, mid_window).len(), 1);
        assert_eq!(file.active_for_chain(10040, mid_window + 2 * 86400).len(), 0);
        assert_eq!(file.active_for_chain(1, mid_window).len(), 0);
    }

    #[test]
    fn content_hash_changes_with_content() {
        let a = content_hash("[]");
        let b = content_hash("[ ]");
        assert_ne!(a, b);
        assert_eq!(a, content_hash("[]"));
    }
}
