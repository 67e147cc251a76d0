//! Error types shared by the codec and data-model layers.

/// Errors raised by the native-account codec.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AccountCodecError {
    #[error("account string is shorter than 64 characters")]
    TooShort,
    #[error("account string is missing the `rai_` prefix")]
    MissingPrefix,
    #[error("account string contains whitespace")]
    Whitespace,
    #[error("account must start with '1' or '3' after the prefix")]
    InvalidLeadCharacter,
    #[error("account contains a character outside the base-32 alphabet")]
    InvalidCharacter,
    #[error("subaddress segment must be delimited by '_'")]
    MissingSubaddressDelimiter,
    #[error("checksum mismatch")]
    ChecksumMismatch,
    #[error("hex account must decode to exactly 32 bytes")]
    InvalidHexLength,
    #[error("not a valid hex string")]
    InvalidHex,
    #[error("encoding input must be exactly 32 bytes")]
    InvalidInputLength,
}

/// Errors raised by the big-endian binary wire codec.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    #[error("short read: expected {expected} more byte(s), buffer exhausted")]
    ShortRead { expected: usize },
    #[error("value does not fit the declared width")]
    Overflow,
    #[error("length-prefixed string is not valid UTF-8")]
    InvalidUtf8,
    #[error("unknown message type tag {0}")]
    UnknownMessageType(u8),
    #[error(transparent)]
    Account(#[from] AccountCodecError),
    #[error("not a valid u256 literal")]
    InvalidU256,
}
