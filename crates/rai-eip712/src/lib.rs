//! EIP-712 typed-data signing and recovery for the Raicoin cross-chain protocol.
//!
//! Every signed message shares the same domain (`name:"Raicoin", version:"1.0"`)
//! parameterized by the target chain's numeric EVM id and the verifying contract
//! (core or validator). Structs are declared with alloy's `sol!` macro so that
//! `SolStruct::eip712_signing_hash` produces the exact typed-data hash the
//! on-chain verifier expects; signing and recovery go through
//! `alloy-signer-local`/`alloy-primitives` directly, with no heavier framework
//! binding (see `DESIGN.md`).

use alloy_primitives::{Address, B256, Signature, U256, keccak256};
use alloy_signer::{Signer, SignerSync};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{SolStruct, eip712_domain};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Eip712Error {
    #[error("signing failed: {0}")]
    Sign(String),
    #[error("signature is not exactly 65 bytes")]
    BadSignatureLength,
    #[error("recovery failed: {0}")]
    Recover(String),
}

/// The two contracts a typed struct can be addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyingContract {
    Core(Address),
    Validator(Address),
}

impl VerifyingContract {
    fn address(self) -> Address {
        match self {
            VerifyingContract::Core(a) | VerifyingContract::Validator(a) => a,
        }
    }
}

/// Builds the fixed `{name:"Raicoin", version:"1.0", chainId, verifyingContract}` domain.
fn domain(evm_chain_id: u64, contract: VerifyingContract) -> alloy_sol_types::Eip712Domain {
    eip712_domain! {
        name: "Raicoin",
        version: "1.0",
        chain_id: evm_chain_id,
        verifying_contract: contract.address(),
    }
}

alloy_sol_types::sol! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct SubmitValidator {
        bytes32 validator;
        address signer;
        uint256 weight;
        uint32 epoch;
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct UnmapETH {
        bytes32 sender;
        address recipient;
        bytes32 txnHash;
        uint64 txnHeight;
        uint256 amount;
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct UnmapERC20 {
        address token;
        bytes32 sender;
        address recipient;
        bytes32 txnHash;
        uint64 txnHeight;
        uint256 share;
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct UnmapERC721 {
        address token;
        bytes32 sender;
        address recipient;
        bytes32 txnHash;
        uint64 txnHeight;
        uint256 tokenId;
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct WrapERC20Token {
        uint32 originalChainId;
        bytes32 originalContract;
        bytes32 sender;
        address recipient;
        bytes32 txnHash;
        uint64 txnHeight;
        uint256 amount;
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct WrapERC721Token {
        uint32 originalChainId;
        bytes32 originalContract;
        bytes32 sender;
        address recipient;
        bytes32 txnHash;
        uint64 txnHeight;
        uint256 tokenId;
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct CreateWrappedERC20Token {
        string name;
        string symbol;
        string originalChain;
        uint32 originalChainId;
        bytes32 originalContract;
        uint8 decimals;
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct CreateWrappedERC721Token {
        string name;
        string symbol;
        string originalChain;
        uint32 originalChainId;
        bytes32 originalContract;
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Upgrade {
        address newImplementation;
        uint256 nonce;
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct UpdateTokenVolatile {
        address token;
        bool volatile;
        uint256 nonce;
    }
}

/// A packed `r‖s‖v` signature, `v ∈ {27,28}` (§4.2).
pub type PackedSignature = [u8; 65];

fn pack(sig: Signature) -> PackedSignature {
    let mut out = [0u8; 65];
    out[..32].copy_from_slice(&sig.r().to_be_bytes::<32>());
    out[32..64].copy_from_slice(&sig.s().to_be_bytes::<32>());
    out[64] = if sig.v() { 28 } else { 27 };
    out
}

fn unpack(bytes: &[u8]) -> Result<Signature, Eip712Error> {
    if bytes.len() != 65 {
        return Err(Eip712Error::BadSignatureLength);
    }
    let r = U256::from_be_slice(&bytes[..32]);
    let s = U256::from_be_slice(&bytes[32..64]);
    let v = bytes[64];
    if v != 27 && v != 28 {
        return Err(Eip712Error::BadSignatureLength);
    }
    Ok(Signature::new(r, s, v == 28))
}

/// Signs a pre-computed EIP-712 signing hash with the local signer key.
async fn sign_hash(signer: &PrivateKeySigner, hash: B256) -> Result<PackedSignature, Eip712Error> {
    let sig = signer
        .sign_hash(&hash)
        .await
        .map_err(|e| Eip712Error::Sign(e.to_string()))?;
    Ok(pack(sig))
}

/// Recovers the signer address from a raw 65-byte signature over a prehashed message.
pub fn recover_address(hash: B256, signature: &[u8]) -> Result<Address, Eip712Error> {
    let sig = unpack(signature)?;
    sig.recover_address_from_prehash(&hash)
        .map_err(|e| Eip712Error::Recover(e.to_string()))
}

/// Verifies that `signature` over `hash` was produced by `expected`, comparing
/// case-insensitively (addresses are already checksum-free `Address` values,
/// so this is a plain equality check after recovery).
pub fn verify(hash: B256, signature: &[u8], expected: Address) -> bool {
    match recover_address(hash, signature) {
        Ok(recovered) => recovered == expected,
        Err(_) => false,
    }
}

macro_rules! signer_fn {
    ($fn_name:ident, $struct_ty:ty) => {
        pub async fn $fn_name(
            signer: &PrivateKeySigner,
            evm_chain_id: u64,
            contract: VerifyingContract,
            value: &$struct_ty,
        ) -> Result<PackedSignature, Eip712Error> {
            let domain = domain(evm_chain_id, contract);
            let hash = value.eip712_signing_hash(&domain);
            sign_hash(signer, hash).await
        }
    };
}

macro_rules! hash_fn {
    ($fn_name:ident, $struct_ty:ty) => {
        pub fn $fn_name(evm_chain_id: u64, contract: VerifyingContract, value: &$struct_ty) -> B256 {
            let domain = domain(evm_chain_id, contract);
            value.eip712_signing_hash(&domain)
        }
    };
}

signer_fn!(sign_submit_validator, SubmitValidator);
signer_fn!(sign_unmap_eth, UnmapETH);
signer_fn!(sign_unmap_erc20, UnmapERC20);
signer_fn!(sign_unmap_erc721, UnmapERC721);
signer_fn!(sign_wrap_erc20, WrapERC20Token);
signer_fn!(sign_wrap_erc721, WrapERC721Token);
signer_fn!(sign_create_wrapped_erc20, CreateWrappedERC20Token);
signer_fn!(sign_create_wrapped_erc721, CreateWrappedERC721Token);
signer_fn!(sign_upgrade, Upgrade);
signer_fn!(sign_update_token_volatile, UpdateTokenVolatile);

hash_fn!(hash_submit_validator, SubmitValidator);
hash_fn!(hash_unmap_eth, UnmapETH);
hash_fn!(hash_unmap_erc20, UnmapERC20);
hash_fn!(hash_unmap_erc721, UnmapERC721);
hash_fn!(hash_wrap_erc20, WrapERC20Token);
hash_fn!(hash_wrap_erc721, WrapERC721Token);
hash_fn!(hash_create_wrapped_erc20, CreateWrappedERC20Token);
hash_fn!(hash_create_wrapped_erc721, CreateWrappedERC721Token);
hash_fn!(hash_upgrade, Upgrade);
hash_fn!(hash_update_token_volatile, UpdateTokenVolatile);

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::b256;

    fn test_signer() -> PrivateKeySigner {
        PrivateKeySigner::from_bytes(&b256!(
            "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318"
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn sign_and_recover_round_trips_for_every_struct() {
        let signer = test_signer();
        let expected = signer.address();
        let contract = VerifyingContract::Validator(Address::with_last_byte(1));

        let submit = SubmitValidator {
            validator: B256::repeat_byte(7),
            signer: expected,
            weight: U256::from(30_000_000_000_000_000_000u128),
            epoch: 42,
        };
        let sig = sign_submit_validator(&signer, 97, contract, &submit)
            .await
            .unwrap();
        assert_eq!(sig.len(), 65);
        assert!(sig[64] == 27 || sig[64] == 28);
        let hash = hash_submit_validator(97, contract, &submit);
        assert!(verify(hash, &sig, expected));
    }

    #[tokio::test]
    async fn verification_fails_for_wrong_signer() {
        let signer = test_signer();
        let other = Address::with_last_byte(9);
        let contract = VerifyingContract::Core(Address::with_last_byte(2));
        let upgrade = Upgrade {
            newImplementation: Address::with_last_byte(5),
            nonce: U256::from(1u64),
        };
        let sig = sign_upgrade(&signer, 56, contract, &upgrade).await.unwrap();
        let hash = hash_upgrade(56, contract, &upgrade);
        assert!(!verify(hash, &sig, other));
    }

    #[test]
    fn recover_rejects_malformed_signature_length() {
        let hash = keccak256(b"raicoin");
        assert!(recover_address(hash, &[0u8; 10]).is_err());
    }
}
