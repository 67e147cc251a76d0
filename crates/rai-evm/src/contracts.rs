//! Minimal on-chain interfaces the adapter speaks to (§4.3).
//!
//! Declared with alloy's `sol!` macro: `#[sol(rpc)]` generates a typed
//! contract instance whose methods build `eth_call`/`eth_sendTransaction`
//! requests directly against an `alloy_provider::Provider`.

#![allow(missing_docs)]

alloy_sol_types::sol! {
    #[derive(Debug)]
    #[sol(rpc)]
    interface IValidatorContract {
        function getTotalWeight() external view returns (uint256);
        function getValidatorCount() external view returns (uint256);
        function getValidators(uint256 begin, uint256 end) external view returns (bytes memory);
        function getValidatorInfo(bytes32 validator) external view returns (bytes memory);
        function getWeight(address signer) external view returns (uint256);
        function genesisValidator() external view returns (bytes32);
        function genesisSigner() external view returns (address);
        function nonce() external view returns (uint256);
        function submitValidator(
            bytes32 validator,
            address signer,
            uint256 weight,
            uint32 epoch,
            address rewardTo,
            bytes calldata signatures
        ) external;

        event ValidatorSubmitted(bytes32 indexed validator, address indexed signer, uint256 weight, uint32 epoch);
        event ValidatorPurged(bytes32 indexed validator);
    }

    #[derive(Debug)]
    #[sol(rpc)]
    interface ICore {
        function fee() external view returns (uint256);
        function nonce() external view returns (uint256);
        function tokenInfo(address token) external view returns (bytes memory);
        function upgrade(address newImplementation, uint256 nonce, bytes calldata signatures) external;
        function updateTokenVolatile(address token, bool volatile, uint256 nonce, bytes calldata signatures) external;
    }

    #[derive(Debug)]
    #[sol(rpc)]
    interface IERC20Meta {
        function name() external view returns (string memory);
        function symbol() external view returns (string memory);
        function decimals() external view returns (uint8);
        function allowance(address owner, address spender) external view returns (uint256);
    }

    #[derive(Debug)]
    #[sol(rpc)]
    interface IERC721Meta {
        function name() external view returns (string memory);
        function symbol() external view returns (string memory);
        function supportsInterface(bytes4 interfaceId) external view returns (bool);
    }
}

/// Topic set the adapter filters `getValidatorLogs` by (§4.3).
pub const VALIDATOR_SUBMITTED_TOPIC: &str = "ValidatorSubmitted(bytes32,address,uint256,uint32)";
pub const VALIDATOR_PURGED_TOPIC: &str = "ValidatorPurged(bytes32)";

/// The function selectors this adapter calls on each interface, by
/// canonical `name(type,type,...)` signature (§6 ABI-file validation).
pub const VALIDATOR_CONTRACT_FUNCTIONS: &[&str] = &[
    "getTotalWeight()",
    "getValidatorCount()",
    "getValidators(uint256,uint256)",
    "getValidatorInfo(bytes32)",
    "getWeight(address)",
    "genesisValidator()",
    "genesisSigner()",
    "nonce()",
    "submitValidator(bytes32,address,uint256,uint32,address,bytes)",
];

pub const CORE_CONTRACT_FUNCTIONS: &[&str] = &[
    "fee()",
    "nonce()",
    "tokenInfo(address)",
    "upgrade(address,uint256,bytes)",
    "updateTokenVolatile(address,bool,uint256,bytes)",
];

pub const ERC20_META_FUNCTIONS: &[&str] = &["name()", "symbol()", "decimals()", "allowance(address,address)"];

pub const ERC721_META_FUNCTIONS: &[&str] = &["name()", "symbol()", "supportsInterface(bytes4)"];

/// One entry of a Solidity ABI JSON array; every other field (`outputs`,
/// `stateMutability`, `anonymous`, ...) is irrelevant to selector checking
/// and left for `serde_json` to ignore.
#[derive(serde::Deserialize)]
struct AbiEntry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    inputs: Vec<AbiParam>,
}

#[derive(serde::Deserialize)]
struct AbiParam {
    #[serde(rename = "type")]
    ty: String,
}

/// Confirms `path` parses as a Solidity ABI JSON array declaring every
/// function in `expected` (matched by canonical `name(type,type,...)`
/// signature, tuple-component expansion aside). An operator-supplied ABI
/// file is only useful if it actually exposes the functions this adapter
/// calls against it, so a missing one is configuration-fatal (§6).
pub fn validate_abi_file(path: &std::path::Path, expected: &[&str]) -> Result<(), crate::error::EvmError> {
    let path_str = path.display().to_string();
    let raw = std::fs::read_to_string(path).map_err(|e| crate::error::EvmError::AbiMismatch {
        path: path_str.clone(),
        reason: format!("failed to read file: {e}"),
    })?;
    let entries: Vec<AbiEntry> = serde_json::from_str(&raw).map_err(|e| crate::error::EvmError::AbiMismatch {
        path: path_str.clone(),
        reason: format!("not a Solidity ABI JSON array: {e}"),
    })?;
    let declared: std::collections::HashSet<String> = entries
        .iter()
        .filter(|e| e.kind == "function")
        .map(|e| {
            let params = e.inputs.iter().map(|p| p.ty.as_str()).collect::<Vec<_>>().join(",");
            format!("{}({})", e.name, params)
        })
        .collect();
    let missing: Vec<&str> = expected.iter().copied().filter(|sig| !declared.contains(*sig)).collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(crate::error::EvmError::AbiMismatch { path: path_str, reason: format!("missing function(s): {}", missing.join(", ")) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_abi_with_all_expected_functions() {
        let dir = std::env::temp_dir().join(format!("rai-evm-abi-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("core.json");
        std::fs::write(
            &path,
            r#"[
                {"type":"function","name":"fee","inputs":[],"outputs":[{"type":"uint256"}]},
                {"type":"function","name":"nonce","inputs":[],"outputs":[{"type":"uint256"}]},
                {"type":"function","name":"tokenInfo","inputs":[{"type":"address"}],"outputs":[{"type":"bytes"}]},
                {"type":"function","name":"upgrade","inputs":[{"type":"address"},{"type":"uint256"},{"type":"bytes"}],"outputs":[]},
                {"type":"function","name":"updateTokenVolatile","inputs":[{"type":"address"},{"type":"bool"},{"type":"uint256"},{"type":"bytes"}],"outputs":[]},
                {"type":"event","name":"SomethingElse","inputs":[]}
            ]"#,
        )
        .unwrap();
        assert!(validate_abi_file(&path, CORE_CONTRACT_FUNCTIONS).is_ok());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn rejects_abi_missing_a_function() {
        let dir = std::env::temp_dir().join(format!("rai-evm-abi-test-missing-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("validator.json");
        std::fs::write(&path, r#"[{"type":"function","name":"getTotalWeight","inputs":[],"outputs":[{"type":"uint256"}]}]"#).unwrap();
        let err = validate_abi_file(&path, VALIDATOR_CONTRACT_FUNCTIONS).unwrap_err();
        assert!(matches!(err, crate::error::EvmError::AbiMismatch { .. }));
        std::fs::remove_file(&path).ok();
    }
}
