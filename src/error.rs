//! Top-level error type.
//!
//! Every crate boundary owns its own `thiserror` enum; this one composes
//! them with `#[from]` so `main()` stays a plain `Result<(), AppError>`
//! without reaching for `anyhow`.

use rai_eip712::Eip712Error;
use rai_evm::EvmError;
use rai_types::{AccountCodecError, WireError};

use crate::config::ConfigError;
use crate::dispatch::DispatchError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Codec(#[from] WireError),
    #[error(transparent)]
    Account(#[from] AccountCodecError),
    #[error(transparent)]
    Eip712(#[from] Eip712Error),
    #[error(transparent)]
    Evm(#[from] EvmError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
