//! Cross-chain envelope and the five binary payload variants it carries.

use alloy_primitives::U256;

use crate::error::WireError;
use crate::wire::{Reader, Writer};

/// Transfer opcodes carried in a `TransferSign` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOperation {
    Map = 1,
    Unmap = 2,
    Wrap = 3,
    Unwrap = 4,
}

impl TransferOperation {
    pub fn from_u8(v: u8) -> Result<Self, WireError> {
        match v {
            1 => Ok(TransferOperation::Map),
            2 => Ok(TransferOperation::Unmap),
            3 => Ok(TransferOperation::Wrap),
            4 => Ok(TransferOperation::Unwrap),
            _ => Err(WireError::UnknownMessageType(v)),
        }
    }
}

/// A 65-byte `r‖s‖v` signature, present on reply messages.
pub type RawSignature = Vec<u8>;

/// The five cross-chain payload kinds, tagged by their first wire byte.
#[derive(Debug, Clone, PartialEq)]
pub enum CrossChainMessage {
    WeightSign {
        is_request: bool,
        validator: U256,
        signer: U256,
        weight: u128,
        epoch: u32,
        signature: Option<RawSignature>,
    },
    TransferSign {
        is_request: bool,
        account: U256,
        height: u64,
        operation: u8,
        request_id: U256,
        signature: Option<RawSignature>,
    },
    CreationSign {
        is_request: bool,
        original_chain_id: u32,
        original_contract: U256,
        request_id: U256,
        signature: Option<RawSignature>,
    },
    UpgradeSign {
        is_request: bool,
        proposal_id: u32,
        implementation: U256,
        nonce: U256,
        signature: Option<RawSignature>,
    },
    UpdateTokenVolatile {
        is_request: bool,
        proposal_id: u32,
        token: U256,
        volatile: bool,
        nonce: U256,
        signature: Option<RawSignature>,
    },
}

impl CrossChainMessage {
    const TAG_WEIGHT_SIGN: u8 = 1;
    const TAG_TRANSFER_SIGN: u8 = 2;
    const TAG_CREATION_SIGN: u8 = 3;
    const TAG_UPGRADE_SIGN: u8 = 4;
    const TAG_UPDATE_TOKEN_VOLATILE: u8 = 5;

    pub fn is_request(&self) -> bool {
        match self {
            CrossChainMessage::WeightSign { is_request, .. }
            | CrossChainMessage::TransferSign { is_request, .. }
            | CrossChainMessage::CreationSign { is_request, .. }
            | CrossChainMessage::UpgradeSign { is_request, .. }
            | CrossChainMessage::UpdateTokenVolatile { is_request, .. } => *is_request,
        }
    }

    /// Trailing `[u16len sig]` field (§6): present (and always 65 bytes)
    /// on replies, absent entirely on requests.
    fn write_trailing_signature(w: &mut Writer, sig: &Option<RawSignature>) -> Result<(), WireError> {
        if let Some(sig) = sig {
            w.write_bytes(sig)?;
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut w = Writer::new();
        match self {
            CrossChainMessage::WeightSign {
                is_request,
                validator,
                signer,
                weight,
                epoch,
                signature,
            } => {
                w.write_u8(Self::TAG_WEIGHT_SIGN);
                w.write_bool(*is_request);
                w.write_u256(*validator);
                w.write_u256(*signer);
                w.write_u128(*weight);
                w.write_u32(*epoch);
                Self::write_trailing_signature(&mut w, signature)?;
            }
            CrossChainMessage::TransferSign {
                is_request,
                account,
                height,
                operation,
                request_id,
                signature,
            } => {
                w.write_u8(Self::TAG_TRANSFER_SIGN);
                w.write_bool(*is_request);
                w.write_u256(*account);
                w.write_u64(*height);
                w.write_u8(*operation);
                w.write_u256(*request_id);
                Self::write_trailing_signature(&mut w, signature)?;
            }
            CrossChainMessage::CreationSign {
                is_request,
                original_chain_id,
                original_contract,
                request_id,
                signature,
            } => {
                w.write_u8(Self::TAG_CREATION_SIGN);
                w.write_bool(*is_request);
                w.write_u32(*original_chain_id);
                w.write_u256(*original_contract);
                w.write_u256(*request_id);
                Self::write_trailing_signature(&mut w, signature)?;
            }
            CrossChainMessage::UpgradeSign {
                is_request,
                proposal_id,
                implementation,
                nonce,
                signature,
            } => {
                w.write_u8(Self::TAG_UPGRADE_SIGN);
                w.write_bool(*is_request);
                w.write_u32(*proposal_id);
                w.write_u256(*implementation);
                w.write_u256(*nonce);
                Self::write_trailing_signature(&mut w, signature)?;
            }
            CrossChainMessage::UpdateTokenVolatile {
                is_request,
                proposal_id,
                token,
                volatile,
                nonce,
                signature,
            } => {
                w.write_u8(Self::TAG_UPDATE_TOKEN_VOLATILE);
                w.write_bool(*is_request);
                w.write_u32(*proposal_id);
                w.write_u256(*token);
                w.write_bool(*volatile);
                w.write_u256(*nonce);
                Self::write_trailing_signature(&mut w, signature)?;
            }
        }
        Ok(w.into_bytes())
    }

    /// Reads the optional trailing `[u16len sig]` field, present only on
    /// replies (§6).
    fn read_trailing_signature(r: &mut Reader, is_request: bool) -> Result<Option<RawSignature>, WireError> {
        if is_request {
            return Ok(None);
        }
        if r.remaining() == 0 {
            return Ok(None);
        }
        Ok(Some(r.read_bytes()?))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(bytes);
        let tag = r.read_u8()?;
        let is_request = r.read_bool()?;
        let msg = match tag {
            Self::TAG_WEIGHT_SIGN => {
                let validator = r.read_u256()?;
                let signer = r.read_u256()?;
                let weight = r.read_u128()?;
                let epoch = r.read_u32()?;
                let signature = Self::read_trailing_signature(&mut r, is_request)?;
                CrossChainMessage::WeightSign {
                    is_request,
                    validator,
                    signer,
                    weight,
                    epoch,
                    signature,
                }
            }
            Self::TAG_TRANSFER_SIGN => {
                let account = r.read_u256()?;
                let height = r.read_u64()?;
                let operation = r.read_u8()?;
                let request_id = r.read_u256()?;
                let signature = Self::read_trailing_signature(&mut r, is_request)?;
                CrossChainMessage::TransferSign {
                    is_request,
                    account,
                    height,
                    operation,
                    request_id,
                    signature,
                }
            }
            Self::TAG_CREATION_SIGN => {
                let original_chain_id = r.read_u32()?;
                let original_contract = r.read_u256()?;
                let request_id = r.read_u256()?;
                let signature = Self::read_trailing_signature(&mut r, is_request)?;
                CrossChainMessage::CreationSign {
                    is_request,
                    original_chain_id,
                    original_contract,
                    request_id,
                    signature,
                }
            }
            Self::TAG_UPGRADE_SIGN => {
                let proposal_id = r.read_u32()?;
                let implementation = r.read_u256()?;
                let nonce = r.read_u256()?;
                let signature = Self::read_trailing_signature(&mut r, is_request)?;
                CrossChainMessage::UpgradeSign {
                    is_request,
                    proposal_id,
                    implementation,
                    nonce,
                    signature,
                }
            }
            Self::TAG_UPDATE_TOKEN_VOLATILE => {
                let proposal_id = r.read_u32()?;
                let token = r.read_u256()?;
                let volatile = r.read_bool()?;
                let nonce = r.read_u256()?;
                let signature = Self::read_trailing_signature(&mut r, is_request)?;
                CrossChainMessage::UpdateTokenVolatile {
                    is_request,
                    proposal_id,
                    token,
                    volatile,
                    nonce,
                    signature,
                }
            }
            other => return Err(WireError::UnknownMessageType(other)),
        };
        Ok(msg)
    }
}

/// Envelope wrapping a binary [`CrossChainMessage`] payload as it travels
/// through the native-chain node between validators.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossChainEnvelope {
    pub source: [u8; 32],
    pub destination: [u8; 32],
    pub chain_id: u32,
    pub source_signer: Option<[u8; 20]>,
    pub payload: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig() -> RawSignature {
        vec![0xAB; 65]
    }

    #[test]
    fn round_trips_all_variants_as_requests() {
        let variants = vec![
            CrossChainMessage::WeightSign {
                is_request: true,
                validator: U256::from(1),
                signer: U256::from(2),
                weight: 3,
                epoch: 4,
                signature: None,
            },
            CrossChainMessage::TransferSign {
                is_request: true,
                account: U256::from(5),
                height: 6,
                operation: TransferOperation::Unmap as u8,
                request_id: U256::from(7),
                signature: None,
            },
            CrossChainMessage::CreationSign {
                is_request: true,
                original_chain_id: 8,
                original_contract: U256::from(9),
                request_id: U256::from(10),
                signature: None,
            },
            CrossChainMessage::UpgradeSign {
                is_request: true,
                proposal_id: 11,
                implementation: U256::from(12),
                nonce: U256::from(13),
                signature: None,
            },
            CrossChainMessage::UpdateTokenVolatile {
                is_request: true,
                proposal_id: 14,
                token: U256::from(15),
                volatile: true,
                nonce: U256::from(16),
                signature: None,
            },
        ];
        for variant in variants {
            let encoded = variant.encode().unwrap();
            let decoded = CrossChainMessage::decode(&encoded).unwrap();
            assert_eq!(decoded, variant);
        }
    }

    #[test]
    fn round_trips_replies_with_signature() {
        let msg = CrossChainMessage::WeightSign {
            is_request: false,
            validator: U256::from(1),
            signer: U256::from(2),
            weight: 3,
            epoch: 4,
            signature: Some(sig()),
        };
        let encoded = msg.encode().unwrap();
        let decoded = CrossChainMessage::decode(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn unknown_tag_is_an_error() {
        assert!(CrossChainMessage::decode(&[0xFF, 0x00]).is_err());
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let msg = CrossChainMessage::TransferSign {
            is_request: true,
            account: U256::from(1),
            height: 2,
            operation: TransferOperation::Map as u8,
            request_id: U256::from(3),
            signature: None,
        };
        let mut encoded = msg.encode().unwrap();
        encoded.truncate(encoded.len() - 3);
        assert!(CrossChainMessage::decode(&encoded).is_err());
    }
}
