//! Chain identity types.
//!
//! `ChainId` is the tagged identity used throughout the validator's own
//! protocol (JSON responses, cross-chain envelopes). `EvmChainId` is the
//! numeric id the EVM itself expects inside `eth_chainId` replies and
//! EIP-712 domains; the mapping between the two is fixed per deployment.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the chains this validator tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainId {
    RaicoinMainnet,
    RaicoinTestnet,
    Ethereum,
    EthereumTestnet,
    BinanceSmartChain,
    BinanceSmartChainTestnet,
}

impl ChainId {
    /// The validator's own numeric identifier for this chain, as carried in
    /// client-facing JSON (`chain_id` field).
    pub const fn numeric_id(self) -> u32 {
        match self {
            ChainId::RaicoinMainnet => 1,
            ChainId::RaicoinTestnet => 2,
            ChainId::Ethereum => 10010,
            ChainId::EthereumTestnet => 10020,
            ChainId::BinanceSmartChain => 10030,
            ChainId::BinanceSmartChainTestnet => 10040,
        }
    }

    pub const fn from_numeric_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(ChainId::RaicoinMainnet),
            2 => Some(ChainId::RaicoinTestnet),
            10010 => Some(ChainId::Ethereum),
            10020 => Some(ChainId::EthereumTestnet),
            10030 => Some(ChainId::BinanceSmartChain),
            10040 => Some(ChainId::BinanceSmartChainTestnet),
            _ => None,
        }
    }

    /// Human-readable name matching the `chain` field in `chain_info` responses.
    pub const fn display_name(self) -> &'static str {
        match self {
            ChainId::RaicoinMainnet => "raicoin",
            ChainId::RaicoinTestnet => "raicoin test",
            ChainId::Ethereum => "ethereum",
            ChainId::EthereumTestnet => "ethereum sepolia",
            ChainId::BinanceSmartChain => "binance smart chain",
            ChainId::BinanceSmartChainTestnet => "binance smart chain testnet",
        }
    }

    /// Whether this chain id names an EVM chain (as opposed to the native chain).
    pub const fn is_evm(self) -> bool {
        !matches!(self, ChainId::RaicoinMainnet | ChainId::RaicoinTestnet)
    }

    /// Confirmation depth required before log-derived state is considered durable.
    pub const fn confirmations(self) -> u64 {
        match self {
            ChainId::Ethereum | ChainId::EthereumTestnet => 96,
            ChainId::BinanceSmartChain | ChainId::BinanceSmartChainTestnet => 30,
            ChainId::RaicoinMainnet | ChainId::RaicoinTestnet => 0,
        }
    }

    /// Default per-chain tick period.
    pub const fn default_tick_period_secs(self) -> u64 {
        match self {
            ChainId::Ethereum | ChainId::EthereumTestnet => 12,
            ChainId::BinanceSmartChain | ChainId::BinanceSmartChainTestnet => 5,
            ChainId::RaicoinMainnet | ChainId::RaicoinTestnet => 1,
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.numeric_id())
    }
}

impl FromStr for ChainId {
    type Err = ParseChainIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id: u32 = s.parse().map_err(|_| ParseChainIdError)?;
        ChainId::from_numeric_id(id).ok_or(ParseChainIdError)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognized chain id")]
pub struct ParseChainIdError;

/// The numeric chain id an EVM JSON-RPC endpoint reports via `eth_chainId`,
/// and the value used inside an EIP-712 domain's `chainId` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvmChainId(pub u64);

impl EvmChainId {
    pub const fn for_chain(chain: ChainId) -> Option<Self> {
        match chain {
            ChainId::Ethereum => Some(EvmChainId(1)),
            ChainId::EthereumTestnet => Some(EvmChainId(11155111)),
            ChainId::BinanceSmartChain => Some(EvmChainId(56)),
            ChainId::BinanceSmartChainTestnet => Some(EvmChainId(97)),
            ChainId::RaicoinMainnet | ChainId::RaicoinTestnet => None,
        }
    }
}

impl fmt::Display for EvmChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bsc_testnet_matches_documented_literal() {
        assert_eq!(ChainId::BinanceSmartChainTestnet.numeric_id(), 10040);
        assert_eq!(ChainId::BinanceSmartChainTestnet.confirmations(), 30);
        assert_eq!(
            EvmChainId::for_chain(ChainId::BinanceSmartChainTestnet),
            Some(EvmChainId(97))
        );
    }

    #[test]
    fn numeric_round_trip() {
        for chain in [
            ChainId::RaicoinMainnet,
            ChainId::RaicoinTestnet,
            ChainId::Ethereum,
            ChainId::EthereumTestnet,
            ChainId::BinanceSmartChain,
            ChainId::BinanceSmartChainTestnet,
        ] {
            assert_eq!(ChainId::from_numeric_id(chain.numeric_id()), Some(chain));
        }
    }
}
