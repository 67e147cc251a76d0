//! Bech32-like codec for native-chain accounts.
//!
//! An account is a 32-byte identifier rendered as `rai_` followed by 60
//! base-32 characters and a 40-bit blake2b checksum folded into the same
//! digit stream, matching the wire format used by native-chain nodes and
//! wallets. See module tests for worked round-trip examples.

use blake2::Blake2bVar;
use blake2::digest::{Update, VariableOutput};

use crate::error::AccountCodecError;

const PREFIX: &str = "rai_";
const ALPHABET: &[u8; 32] = b"13456789abcdefghijkmnopqrstuwxyz";
const ENCODED_BODY_LEN: usize = 60;
const RAW_LEN: usize = 32;
const CHECK_LEN: usize = 5;
const ACC_LEN: usize = RAW_LEN + CHECK_LEN;

fn char_decode(c: u8) -> Option<u8> {
    ALPHABET.iter().position(|&x| x == c).map(|p| p as u8)
}

fn char_encode(digit: u8) -> u8 {
    ALPHABET[digit as usize]
}

fn checksum(raw: &[u8; RAW_LEN]) -> [u8; CHECK_LEN] {
    let mut hasher = Blake2bVar::new(CHECK_LEN).expect("5-byte blake2b output is valid");
    hasher.update(raw);
    let mut digest = [0u8; CHECK_LEN];
    hasher
        .finalize_variable(&mut digest)
        .expect("digest buffer sized to output length");
    digest
}

/// Decodes a base-32 digit into the running 37-byte big-endian accumulator,
/// i.e. `acc = acc * 32 + digit`.
fn mul32_add(acc: &mut [u8; ACC_LEN], digit: u8) {
    let mut carry: u32 = digit as u32;
    for byte in acc.iter_mut().rev() {
        let v = (*byte as u32) * 32 + carry;
        *byte = (v & 0xFF) as u8;
        carry = v >> 8;
    }
}

/// Divides the 37-byte big-endian accumulator by 32 in place and returns the remainder digit.
fn divmod32(acc: &mut [u8; ACC_LEN]) -> u8 {
    let mut carry: u32 = 0;
    for byte in acc.iter_mut() {
        let cur = carry * 256 + *byte as u32;
        *byte = (cur / 32) as u8;
        carry = cur % 32;
    }
    carry as u8
}

/// The decoded form of a native account string: the raw 32 bytes plus an
/// optional trailing `_subaddress` segment carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAccount {
    pub raw: [u8; RAW_LEN],
    pub subaddress: Option<String>,
}

/// Encodes a raw 32-byte account identifier into its `rai_…` string form.
pub fn encode(raw: &[u8; RAW_LEN]) -> Result<String, AccountCodecError> {
    let check = checksum(raw);
    let mut acc = [0u8; ACC_LEN];
    acc[..RAW_LEN].copy_from_slice(raw);
    // check was computed as a little-endian integer; store it big-endian in
    // the accumulator's low bytes by reversing it.
    let mut check_be = check;
    check_be.reverse();
    acc[RAW_LEN..].copy_from_slice(&check_be);

    let mut digits = Vec::with_capacity(ENCODED_BODY_LEN);
    for _ in 0..ENCODED_BODY_LEN {
        digits.push(char_encode(divmod32(&mut acc)));
    }
    digits.extend_from_slice(b"_iar");
    digits.reverse();
    Ok(String::from_utf8(digits).expect("alphabet and literal are ASCII"))
}

/// Encodes from either raw bytes or a 64-hex-character (optionally `0x`-prefixed) string.
pub fn encode_hex(hex_or_bytes: &str) -> Result<String, AccountCodecError> {
    let stripped = hex_or_bytes.strip_prefix("0x").unwrap_or(hex_or_bytes);
    let bytes = hex::decode(stripped).map_err(|_| AccountCodecError::InvalidHex)?;
    let raw: [u8; RAW_LEN] = bytes
        .try_into()
        .map_err(|_| AccountCodecError::InvalidHexLength)?;
    encode(&raw)
}

/// Decodes a `rai_…` account string, rejecting malformed input per the rules
/// in the module documentation.
pub fn decode(input: &str) -> Result<DecodedAccount, AccountCodecError> {
    if input.len() < 64 {
        return Err(AccountCodecError::TooShort);
    }
    if !input.starts_with(PREFIX) {
        return Err(AccountCodecError::MissingPrefix);
    }
    if input
        .bytes()
        .any(|b| b == b' ' || b == b'\r' || b == b'\n' || b == b'\t')
    {
        return Err(AccountCodecError::Whitespace);
    }
    let bytes = input.as_bytes();
    if bytes.len() == 65 || (bytes.len() > 65 && bytes[64] != b'_') {
        return Err(AccountCodecError::MissingSubaddressDelimiter);
    }
    let lead = bytes[PREFIX.len()];
    if lead != b'1' && lead != b'3' {
        return Err(AccountCodecError::InvalidLeadCharacter);
    }

    let mut acc = [0u8; ACC_LEN];
    for &b in &bytes[PREFIX.len()..64] {
        let digit = char_decode(b).ok_or(AccountCodecError::InvalidCharacter)?;
        mul32_add(&mut acc, digit);
    }

    let raw: [u8; RAW_LEN] = acc[..RAW_LEN].try_into().expect("slice is 32 bytes");
    let check_be = &acc[RAW_LEN..];
    let mut digest = checksum(&raw);
    digest.reverse();
    if digest != check_be {
        return Err(AccountCodecError::ChecksumMismatch);
    }

    let subaddress = if bytes.len() == 64 {
        None
    } else {
        Some(input[65..].to_string())
    };
    Ok(DecodedAccount { raw, subaddress })
}

/// Accepts either a native account string or a 64-hex-character form and
/// returns the raw bytes, discarding any subaddress suffix.
pub fn decode_any(input: &str) -> Result<[u8; RAW_LEN], AccountCodecError> {
    if input.starts_with(PREFIX) {
        decode(input).map(|d| d.raw)
    } else {
        let stripped = input.strip_prefix("0x").unwrap_or(input);
        let bytes = hex::decode(stripped).map_err(|_| AccountCodecError::InvalidHex)?;
        bytes.try_into().map_err(|_| AccountCodecError::InvalidHexLength)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_zero_account() {
        let raw = [0u8; 32];
        let encoded = encode(&raw).unwrap();
        assert!(encoded.starts_with(PREFIX));
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.raw, raw);
        assert_eq!(decoded.subaddress, None);
    }

    #[test]
    fn round_trips_arbitrary_account() {
        let mut raw = [0u8; 32];
        for (i, b) in raw.iter_mut().enumerate() {
            *b = (i * 7 + 3) as u8;
        }
        let encoded = encode(&raw).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.raw, raw);
        assert_eq!(encode(&decoded.raw).unwrap(), encoded);
    }

    #[test]
    fn preserves_subaddress_suffix() {
        let raw = [9u8; 32];
        let encoded = encode(&raw).unwrap();
        let with_suffix = format!("{encoded}_wallet42");
        let decoded = decode(&with_suffix).unwrap();
        assert_eq!(decoded.raw, raw);
        assert_eq!(decoded.subaddress.as_deref(), Some("wallet42"));
    }

    #[test]
    fn rejects_single_bit_flip() {
        let raw = [5u8; 32];
        let mut encoded = encode(&raw).unwrap().into_bytes();
        let flip_at = PREFIX.len() + 5;
        encoded[flip_at] = if encoded[flip_at] == b'a' { b'b' } else { b'a' };
        let mutated = String::from_utf8(encoded).unwrap();
        assert!(decode(&mutated).is_err());
    }

    #[test]
    fn rejects_embedded_tab() {
        let raw = [1u8; 32];
        let encoded = encode(&raw).unwrap();
        let mut bytes = encoded.into_bytes();
        bytes[10] = b'\t';
        let with_tab = String::from_utf8(bytes).unwrap();
        assert_eq!(decode(&with_tab), Err(AccountCodecError::Whitespace));
    }

    #[test]
    fn rejects_missing_prefix() {
        assert_eq!(
            decode("xai_111111111111111111111111111111111111111111111111111111111111"),
            Err(AccountCodecError::MissingPrefix)
        );
    }

    #[test]
    fn rejects_invalid_lead_character() {
        let mut raw = [0u8; 32];
        raw[0] = 0xFF;
        let encoded = encode(&raw).unwrap();
        let mut bad = encoded.into_bytes();
        bad[PREFIX.len()] = b'9';
        let bad = String::from_utf8(bad).unwrap();
        assert_eq!(decode(&bad), Err(AccountCodecError::InvalidLeadCharacter));
    }

    #[test]
    fn encode_accepts_hex_input() {
        let raw = [7u8; 32];
        let hex_str = format!("0x{}", hex::encode(raw));
        assert_eq!(encode_hex(&hex_str).unwrap(), encode(&raw).unwrap());
    }
}
