//! Process-lifetime, append-only ERC-20/721 metadata caches (§4.3).
//!
//! Keyed by checksummed address, backed by `dashmap::DashMap` — a concurrent
//! map is the right shape here, since both the chain tick and the
//! dispatcher's synchronous `token_*` reads touch it.

use alloy_primitives::Address;
use dashmap::DashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenType {
    Erc20,
    Erc721,
}

#[derive(Debug, Clone)]
pub struct TokenMetadata {
    pub symbol: String,
    pub name: String,
    pub decimals: Option<u8>,
    pub wrapped: bool,
    pub token_type: TokenType,
}

/// Per-chain metadata cache, seeded from `ChainConfig::symbol_patch` for
/// tokens whose on-chain `symbol()` is known to misreport (§4.3).
#[derive(Default)]
pub struct MetadataCache {
    entries: DashMap<Address, TokenMetadata>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, address: Address, symbol: String) {
        self.entries.entry(address).or_insert(TokenMetadata {
            symbol,
            name: String::new(),
            decimals: None,
            wrapped: false,
            token_type: TokenType::Erc20,
        });
    }

    pub fn get(&self, address: &Address) -> Option<TokenMetadata> {
        self.entries.get(address).map(|e| e.clone())
    }

    pub fn insert(&self, address: Address, metadata: TokenMetadata) {
        self.entries.insert(address, metadata);
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.entries.contains_key(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_does_not_override_an_existing_entry() {
        let cache = MetadataCache::new();
        let addr = Address::with_last_byte(1);
        cache.insert(
            addr,
            TokenMetadata {
                symbol: "REAL".into(),
                name: "Real Token".into(),
                decimals: Some(18),
                wrapped: false,
                token_type: TokenType::Erc20,
            },
        );
        cache.seed(addr, "PATCHED".into());
        assert_eq!(cache.get(&addr).unwrap().symbol, "REAL");
    }
}
