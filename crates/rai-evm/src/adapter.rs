//! The EVM adapter: endpoint pool + contract bindings + metadata/timestamp
//! caches, exposing the read/write surface §4.3 describes.

use std::time::Duration;

use alloy_network::TransactionBuilder;
use alloy_primitives::{Address, Bytes, U256};
use alloy_provider::Provider;
use alloy_rpc_types_eth::{BlockNumberOrTag, Filter, TransactionRequest};
use alloy_signer_local::PrivateKeySigner;
use rai_types::ValidatorFullInfo;
use url::Url;

use crate::contracts::{
    ICore, IERC20Meta, IERC721Meta, IValidatorContract, VALIDATOR_PURGED_TOPIC,
    VALIDATOR_SUBMITTED_TOPIC,
};
use crate::error::EvmError;
use crate::metadata::{MetadataCache, TokenMetadata, TokenType};
use crate::timestamp_cache::TimestampCache;
use crate::EndpointPool;

/// Page size for `getValidators` (§4.3).
const VALIDATOR_PAGE_SIZE: u64 = 1000;
/// Sleep between pages to avoid hammering a single endpoint (§4.3).
const PAGE_SLEEP: Duration = Duration::from_millis(100);

pub struct ContractAddresses {
    pub core: Address,
    pub validator: Address,
}

/// A single EVM chain's adapter: its endpoint pool, contract addresses, an
/// optional signer for write calls, and process-lifetime caches.
pub struct EvmAdapter {
    pub endpoints: EndpointPool,
    pub contracts: ContractAddresses,
    pub signer: Option<PrivateKeySigner>,
    pub metadata: MetadataCache,
    pub timestamps: TimestampCache,
}

impl EvmAdapter {
    pub fn new(
        urls: Vec<Url>,
        expected_chain_id: u64,
        contracts: ContractAddresses,
        signer: Option<PrivateKeySigner>,
    ) -> Self {
        Self {
            endpoints: EndpointPool::new(urls, expected_chain_id),
            contracts,
            signer,
            metadata: MetadataCache::new(),
            timestamps: TimestampCache::new(),
        }
    }

    pub async fn block_number(&self) -> Result<u64, EvmError> {
        self.endpoints
            .call(|p| async move { p.get_block_number().await.map_err(|e| EvmError::Rpc(e.to_string())) })
            .await
    }

    pub async fn block(&self, height: Option<u64>) -> Result<(u64, Vec<[u8; 32]>), EvmError> {
        let tag = height.map(BlockNumberOrTag::Number).unwrap_or(BlockNumberOrTag::Latest);
        self.endpoints
            .call(|p| async move {
                let block = p
                    .get_block_by_number(tag)
                    .await
                    .map_err(|e| EvmError::Rpc(e.to_string()))?
                    .ok_or_else(|| EvmError::Rpc("block not found".into()))?;
                let hashes = block
                    .transactions
                    .hashes()
                    .map(|h| *h)
                    .collect::<Vec<_>>();
                Ok((block.header.timestamp, hashes))
            })
            .await
    }

    pub async fn fee(&self) -> Result<U256, EvmError> {
        let core = self.contracts.core;
        self.endpoints
            .call(|p| async move {
                let contract = ICore::new(core, p);
                contract
                    .fee()
                    .call()
                    .await
                    .map_err(|e| EvmError::Rpc(e.to_string()))
            })
            .await
    }

    pub async fn get_total_weight(&self) -> Result<U256, EvmError> {
        let validator_contract = self.contracts.validator;
        self.endpoints
            .call(|p| async move {
                let contract = IValidatorContract::new(validator_contract, p);
                contract
                    .getTotalWeight()
                    .call()
                    .await
                    .map_err(|e| EvmError::Rpc(e.to_string()))
            })
            .await
    }

    pub async fn get_validator_count(&self) -> Result<U256, EvmError> {
        let validator_contract = self.contracts.validator;
        self.endpoints
            .call(|p| async move {
                let contract = IValidatorContract::new(validator_contract, p);
                contract
                    .getValidatorCount()
                    .call()
                    .await
                    .map_err(|e| EvmError::Rpc(e.to_string()))
            })
            .await
    }

    /// Pages `getValidators` in windows of [`VALIDATOR_PAGE_SIZE`], sleeping
    /// [`PAGE_SLEEP`] between pages (§4.3).
    pub async fn get_validators_paged(&self) -> Result<Vec<ValidatorFullInfo>, EvmError> {
        let total = self.get_validator_count().await?;
        let total: u64 = total.try_into().map_err(|_| EvmError::Overflow(total))?;
        let mut out = Vec::new();
        let mut begin = 0u64;
        while begin < total {
            let end = (begin + VALIDATOR_PAGE_SIZE).min(total);
            let page = self.get_validators_range(begin, end).await?;
            out.extend(page);
            begin = end;
            if begin < total {
                tokio::time::sleep(PAGE_SLEEP).await;
            }
        }
        Ok(out)
    }

    async fn get_validators_range(&self, begin: u64, end: u64) -> Result<Vec<ValidatorFullInfo>, EvmError> {
        let validator_contract = self.contracts.validator;
        let raw = self
            .endpoints
            .call(|p| async move {
                let contract = IValidatorContract::new(validator_contract, p);
                contract
                    .getValidators(U256::from(begin), U256::from(end))
                    .call()
                    .await
                    .map_err(|e| EvmError::Rpc(e.to_string()))
            })
            .await?;
        decode_validator_page(&raw)
    }

    pub async fn get_validator_info(&self, validator: [u8; 32]) -> Result<ValidatorFullInfo, EvmError> {
        let validator_contract = self.contracts.validator;
        let raw = self
            .endpoints
            .call(|p| async move {
                let contract = IValidatorContract::new(validator_contract, p);
                contract
                    .getValidatorInfo(validator.into())
                    .call()
                    .await
                    .map_err(|e| EvmError::Rpc(e.to_string()))
            })
            .await?;
        decode_validator_entry(&raw)
    }

    pub async fn get_weight(&self, signer: Address) -> Result<u128, EvmError> {
        let validator_contract = self.contracts.validator;
        let weight = self
            .endpoints
            .call(|p| async move {
                let contract = IValidatorContract::new(validator_contract, p);
                contract
                    .getWeight(signer)
                    .call()
                    .await
                    .map_err(|e| EvmError::Rpc(e.to_string()))
            })
            .await?;
        weight.try_into().map_err(|_| EvmError::Overflow(weight))
    }

    pub async fn genesis_validator(&self) -> Result<[u8; 32], EvmError> {
        let validator_contract = self.contracts.validator;
        let raw = self
            .endpoints
            .call(|p| async move {
                let contract = IValidatorContract::new(validator_contract, p);
                contract
                    .genesisValidator()
                    .call()
                    .await
                    .map_err(|e| EvmError::Rpc(e.to_string()))
            })
            .await?;
        Ok(*raw)
    }

    pub async fn genesis_signer(&self) -> Result<Address, EvmError> {
        let validator_contract = self.contracts.validator;
        self.endpoints
            .call(|p| async move {
                let contract = IValidatorContract::new(validator_contract, p);
                contract
                    .genesisSigner()
                    .call()
                    .await
                    .map_err(|e| EvmError::Rpc(e.to_string()))
            })
            .await
    }

    /// Reads `getValidatorLogs(from..=to)` filtered by the validator
    /// contract and the `{ValidatorSubmitted, ValidatorPurged}` topic set
    /// (§4.3), returning `(validator, log_height)` pairs.
    pub async fn get_validator_logs(&self, from: u64, to: u64) -> Result<Vec<([u8; 32], u64)>, EvmError> {
        let validator_contract = self.contracts.validator;
        self.endpoints
            .call(|p| async move {
                let filter = Filter::new()
                    .address(validator_contract)
                    .from_block(from)
                    .to_block(to)
                    .event(VALIDATOR_SUBMITTED_TOPIC)
                    .event(VALIDATOR_PURGED_TOPIC);
                let logs = p
                    .get_logs(&filter)
                    .await
                    .map_err(|e| EvmError::Rpc(e.to_string()))?;
                let mut out = Vec::new();
                for log in logs {
                    if let Some(topic) = log.topics().get(1) {
                        let height = log.block_number.unwrap_or(to);
                        out.push((*topic, height));
                    }
                }
                Ok(out)
            })
            .await
    }

    pub async fn nonce(&self, target: Address) -> Result<U256, EvmError> {
        let core = self.contracts.core;
        let validator_contract = self.contracts.validator;
        self.endpoints
            .call(move |p| async move {
                if target == core {
                    ICore::new(core, p).nonce().call().await
                } else {
                    IValidatorContract::new(validator_contract, p).nonce().call().await
                }
                .map_err(|e| EvmError::Rpc(e.to_string()))
            })
            .await
    }

    /// Gas-estimates, doubles the estimate, then submits with the local
    /// signer key (§4.3). All three write calls share this shape.
    async fn submit_write(&self, to: Address, calldata: Bytes) -> Result<[u8; 32], EvmError> {
        let signer = self.signer.as_ref().ok_or(EvmError::SignerMissing)?;
        let from = signer.address();
        self.endpoints
            .call(|p| async move {
                let tx = TransactionRequest::default()
                    .with_to(to)
                    .with_from(from)
                    .with_input(calldata);
                let estimate = p
                    .estimate_gas(tx.clone())
                    .await
                    .map_err(|e| EvmError::GasEstimate(e.to_string()))?;
                let tx = tx.with_gas_limit(estimate.saturating_mul(2));
                let pending = p
                    .send_transaction(tx)
                    .await
                    .map_err(|e| EvmError::Rpc(e.to_string()))?;
                Ok(*pending.tx_hash())
            })
            .await
    }

    pub async fn submit_validator(
        &self,
        validator: [u8; 32],
        signer: Address,
        weight: U256,
        epoch: u32,
        reward_to: Address,
        packed_signatures: Bytes,
    ) -> Result<[u8; 32], EvmError> {
        let validator_contract = self.contracts.validator;
        let call = IValidatorContract::submitValidatorCall {
            validator: validator.into(),
            signer,
            weight,
            epoch,
            rewardTo: reward_to,
            signatures: packed_signatures,
        };
        self.submit_write(validator_contract, alloy_sol_types::SolCall::abi_encode(&call).into())
            .await
    }

    pub async fn upgrade(
        &self,
        new_implementation: Address,
        nonce: U256,
        packed_signatures: Bytes,
    ) -> Result<[u8; 32], EvmError> {
        let core = self.contracts.core;
        let call = ICore::upgradeCall {
            newImplementation: new_implementation,
            nonce,
            signatures: packed_signatures,
        };
        self.submit_write(core, alloy_sol_types::SolCall::abi_encode(&call).into()).await
    }

    pub async fn update_token_volatile(
        &self,
        token: Address,
        volatile: bool,
        nonce: U256,
        packed_signatures: Bytes,
    ) -> Result<[u8; 32], EvmError> {
        let core = self.contracts.core;
        let call = ICore::updateTokenVolatileCall {
            token,
            volatile,
            nonce,
            signatures: packed_signatures,
        };
        self.submit_write(core, alloy_sol_types::SolCall::abi_encode(&call).into()).await
    }

    /// Reads `ICore.tokenInfo(token)` — whether `token` is a wrapped asset
    /// this bridge minted, its original chain/contract if so, and whether it
    /// is an ERC-20 or ERC-721 (backs the `token_wrapped`/`creation_parameters`
    /// dispatcher actions, §4.7). The contract packs the reply the same way
    /// `getValidatorInfo` packs a validator entry (fixed-width fields
    /// concatenated big-endian); see `DESIGN.md` for why this shape was
    /// inferred rather than taken from an ABI file.
    pub async fn token_core_info(&self, token: Address) -> Result<TokenCoreInfo, EvmError> {
        let core = self.contracts.core;
        let raw = self
            .endpoints
            .call(|p| async move {
                let contract = ICore::new(core, p);
                contract
                    .tokenInfo(token)
                    .call()
                    .await
                    .map_err(|e| EvmError::Rpc(e.to_string()))
            })
            .await?;
        decode_token_core_info(&raw)
    }

    /// ERC-20/721 metadata, process-lifetime cached, falling back to on-chain
    /// `name`/`symbol`/`decimals` reads when not yet cached (§4.3).
    pub async fn token_info(&self, token: Address, erc721: bool) -> Result<TokenMetadata, EvmError> {
        if let Some(cached) = self.metadata.get(&token) {
            return Ok(cached);
        }
        let metadata = if erc721 {
            self.endpoints
                .call(|p| async move {
                    let contract = IERC721Meta::new(token, p);
                    let name = contract.name().call().await.map_err(|e| EvmError::Rpc(e.to_string()))?;
                    let symbol = contract.symbol().call().await.map_err(|e| EvmError::Rpc(e.to_string()))?;
                    Ok(TokenMetadata {
                        symbol,
                        name,
                        decimals: None,
                        wrapped: false,
                        token_type: TokenType::Erc721,
                    })
                })
                .await?
        } else {
            self.endpoints
                .call(|p| async move {
                    let contract = IERC20Meta::new(token, p);
                    let name = contract.name().call().await.map_err(|e| EvmError::Rpc(e.to_string()))?;
                    let symbol = contract.symbol().call().await.map_err(|e| EvmError::Rpc(e.to_string()))?;
                    let decimals = contract.decimals().call().await.map_err(|e| EvmError::Rpc(e.to_string()))?;
                    Ok(TokenMetadata {
                        symbol,
                        name,
                        decimals: Some(decimals),
                        wrapped: false,
                        token_type: TokenType::Erc20,
                    })
                })
                .await?
        };
        self.metadata.insert(token, metadata.clone());
        Ok(metadata)
    }
}

/// Decodes the ABI-packed validator page returned by `getValidators` into
/// individual entries. The contract packs each entry identically to
/// `getValidatorInfo`'s single-entry encoding, concatenated.
fn decode_validator_page(raw: &[u8]) -> Result<Vec<ValidatorFullInfo>, EvmError> {
    const ENTRY_LEN: usize = 32 + 20 + 32 + 32 + 4 + 4;
    if raw.len() % ENTRY_LEN != 0 {
        return Err(EvmError::Decode("validator page length is not a multiple of entry size".into()));
    }
    raw.chunks_exact(ENTRY_LEN).map(decode_validator_entry).collect()
}

/// Decoded `ICore.tokenInfo` reply (§4.3, `EvmAdapter::token_core_info`).
#[derive(Debug, Clone, Copy)]
pub struct TokenCoreInfo {
    pub wrapped: bool,
    pub original_chain_id: u32,
    pub original_contract: [u8; 32],
    pub erc721: bool,
}

fn decode_token_core_info(raw: &[u8]) -> Result<TokenCoreInfo, EvmError> {
    const ENTRY_LEN: usize = 1 + 4 + 32 + 1;
    if raw.len() < ENTRY_LEN {
        return Err(EvmError::Decode("token info entry too short".into()));
    }
    Ok(TokenCoreInfo {
        wrapped: raw[0] != 0,
        original_chain_id: u32::from_be_bytes(raw[1..5].try_into().unwrap()),
        original_contract: raw[5..37].try_into().unwrap(),
        erc721: raw[37] != 0,
    })
}

fn decode_validator_entry(raw: &[u8]) -> Result<ValidatorFullInfo, EvmError> {
    if raw.len() < 32 + 20 + 32 + 32 + 4 + 4 {
        return Err(EvmError::Decode("validator entry too short".into()));
    }
    let mut off = 0;
    let validator: [u8; 32] = raw[off..off + 32].try_into().unwrap();
    off += 32;
    let signer = Address::from_slice(&raw[off..off + 20]);
    off += 20;
    let weight = U256::from_be_slice(&raw[off..off + 32]);
    off += 32;
    let gas_price = U256::from_be_slice(&raw[off..off + 32]);
    off += 32;
    let last_submit = u32::from_be_bytes(raw[off..off + 4].try_into().unwrap());
    off += 4;
    let epoch = u32::from_be_bytes(raw[off..off + 4].try_into().unwrap());
    Ok(ValidatorFullInfo {
        validator,
        signer,
        weight: weight.try_into().map_err(|_| EvmError::Overflow(weight))?,
        gas_price,
        last_submit,
        epoch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_single_packed_validator_entry() {
        let mut raw = vec![0u8; 32 + 20 + 32 + 32 + 4 + 4];
        raw[31] = 7; // validator low byte
        raw[32..52].copy_from_slice(&[1u8; 20]); // signer
        raw[52 + 31] = 9; // weight
        let last_submit_off = 52 + 32 + 32;
        raw[last_submit_off..last_submit_off + 4].copy_from_slice(&42u32.to_be_bytes());
        raw[last_submit_off + 4..last_submit_off + 8].copy_from_slice(&3u32.to_be_bytes());

        let entry = decode_validator_entry(&raw).unwrap();
        assert_eq!(entry.weight, 9);
        assert_eq!(entry.last_submit, 42);
        assert_eq!(entry.epoch, 3);
    }

    #[test]
    fn decodes_a_wrapped_erc721_token_info_reply() {
        let mut raw = vec![0u8; 1 + 4 + 32 + 1];
        raw[0] = 1; // wrapped
        raw[1..5].copy_from_slice(&10040u32.to_be_bytes());
        raw[5 + 31] = 7; // original_contract low byte
        raw[37] = 1; // erc721

        let info = decode_token_core_info(&raw).unwrap();
        assert!(info.wrapped);
        assert_eq!(info.original_chain_id, 10040);
        assert!(info.erc721);
    }
}
