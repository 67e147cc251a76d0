//! Big-endian, width-fixed binary codec used for cross-chain payloads.
//!
//! Mirrors the node's wire format: fixed-width integers up to `u256`,
//! `u16`-length-prefixed strings and byte blobs, and a `u8`-encoded bool.
//! Every read that runs past the end of the buffer returns
//! [`WireError::ShortRead`] instead of panicking.

use alloy_primitives::U256;

use crate::account;
use crate::error::WireError;

/// Cursor-based reader over a byte slice.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::ShortRead {
                expected: n - self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, WireError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(WireError::Overflow),
        }
    }

    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes(b.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes(b.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> Result<u64, WireError> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes(b.try_into().unwrap()))
    }

    pub fn read_u128(&mut self) -> Result<u128, WireError> {
        let b = self.take(16)?;
        Ok(u128::from_be_bytes(b.try_into().unwrap()))
    }

    pub fn read_u256(&mut self) -> Result<U256, WireError> {
        let b = self.take(32)?;
        Ok(U256::from_be_slice(b))
    }

    /// Reads a fixed-width byte array (e.g. a `bytes32` account or address slot).
    pub fn read_fixed<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let b = self.take(N)?;
        Ok(b.try_into().unwrap())
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, WireError> {
        let len = self.read_u16()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_string(&mut self) -> Result<String, WireError> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8)
    }
}

/// Growable byte-buffer writer.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.write_u8(if v { 1 } else { 0 });
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u128(&mut self, v: u128) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u256(&mut self, v: U256) {
        self.buf.extend_from_slice(&v.to_be_bytes::<32>());
    }

    /// Writes a `U256` into a declared `u128` wire slot, erroring if it doesn't fit.
    pub fn write_u256_as_u128(&mut self, v: U256) -> Result<(), WireError> {
        let narrowed: u128 = v.try_into().map_err(|_| WireError::Overflow)?;
        self.write_u128(narrowed);
        Ok(())
    }

    pub fn write_fixed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        let len: u16 = bytes.len().try_into().map_err(|_| WireError::Overflow)?;
        self.write_u16(len);
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub fn write_string(&mut self, s: &str) -> Result<(), WireError> {
        self.write_bytes(s.as_bytes())
    }
}

/// Parses a `u256` field from hex (`0x…`), plain decimal, or a native account
/// string (auto-decoded to its raw 32 bytes and reinterpreted big-endian).
pub fn parse_u256_flexible(s: &str) -> Result<U256, WireError> {
    if s.starts_with("rai_") {
        let raw = account::decode_any(s)?;
        return Ok(U256::from_be_bytes(raw));
    }
    if let Some(hex_body) = s.strip_prefix("0x") {
        return U256::from_str_radix(hex_body, 16).map_err(|_| WireError::InvalidU256);
    }
    U256::from_str_radix(s, 10).map_err(|_| WireError::InvalidU256)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_primitives() {
        let mut w = Writer::new();
        w.write_u8(7);
        w.write_bool(true);
        w.write_u16(1234);
        w.write_u32(0xdead_beef);
        w.write_u64(u64::MAX);
        w.write_u128(u128::MAX / 3);
        w.write_u256(U256::from(123456789u64));
        w.write_bytes(b"hello").unwrap();
        w.write_string("rai").unwrap();

        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_u8().unwrap(), 7);
        assert!(r.read_bool().unwrap());
        assert_eq!(r.read_u16().unwrap(), 1234);
        assert_eq!(r.read_u32().unwrap(), 0xdead_beef);
        assert_eq!(r.read_u64().unwrap(), u64::MAX);
        assert_eq!(r.read_u128().unwrap(), u128::MAX / 3);
        assert_eq!(r.read_u256().unwrap(), U256::from(123456789u64));
        assert_eq!(r.read_bytes().unwrap(), b"hello".to_vec());
        assert_eq!(r.read_string().unwrap(), "rai");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn short_read_is_an_error_not_a_panic() {
        let bytes = [0u8; 3];
        let mut r = Reader::new(&bytes);
        assert!(r.read_u64().is_err());
    }

    #[test]
    fn rejects_truncated_length_prefixed_payload() {
        let mut w = Writer::new();
        w.write_u16(10);
        w.write_fixed(b"short");
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert!(r.read_bytes().is_err());
    }

    #[test]
    fn flexible_u256_parses_hex_decimal_and_account() {
        assert_eq!(parse_u256_flexible("0x2a").unwrap(), U256::from(42));
        assert_eq!(parse_u256_flexible("42").unwrap(), U256::from(42));
        let raw = [0u8; 32];
        let encoded = account::encode(&raw).unwrap();
        assert_eq!(parse_u256_flexible(&encoded).unwrap(), U256::ZERO);
    }
}
