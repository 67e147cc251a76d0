//! Core types shared across the Raicoin bridge validator: account and wire
//! codecs, chain identity, validator roster state, cross-chain messages, and
//! governance proposals.
//!
//! # Modules
//!
//! - [`account`] - `rai_…` native-account codec (encode/decode/checksum)
//! - [`wire`] - big-endian fixed-width binary codec used for cross-chain payloads
//! - [`ids`] - `ChainId` and `EvmChainId` identity types
//! - [`validator`] - validator roster entries and attestation submission state
//! - [`message`] - the five `CrossChainMessage` payload variants and their envelope
//! - [`proposal`] - governance proposals read from the proposal file
//! - [`error`] - error types for the codec and data-model layers

pub mod account;
pub mod error;
pub mod ids;
pub mod message;
pub mod proposal;
pub mod validator;
pub mod wire;

pub use error::{AccountCodecError, WireError};
pub use ids::{ChainId, EvmChainId, ParseChainIdError};
pub use message::{CrossChainEnvelope, CrossChainMessage, RawSignature, TransferOperation};
pub use proposal::{Proposal, ProposalError, ProposalFile, ProposalMethod};
pub use validator::{SignatureInfo, SubmissionState, ValidatorActivity, ValidatorFullInfo, WeightInfo};
