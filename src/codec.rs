//! Hex, byte and word conversions used at the edges of the engine.

use primitive_types::U256;

use crate::error::CodecError;

/// Decodes a hex string, with or without a `0x` prefix. Whitespace around the
/// string is ignored and the empty string decodes to no bytes.
pub fn hex_to_bytes(s: &str) -> Result<Vec<u8>, CodecError> {
    let s = s.trim();
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    hex::decode(digits).map_err(|e| CodecError::InvalidHex(format!("{s}: {e}")))
}

pub fn bytes_to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Big-endian unsigned interpretation. Inputs longer than 32 bytes keep only
/// their low 256 bits.
pub fn word_from_be_bytes(bytes: &[u8]) -> U256 {
    let start = bytes.len().saturating_sub(32);
    U256::from_big_endian(&bytes[start..])
}

pub fn word_to_be_bytes(word: U256) -> [u8; 32] {
    let mut buf = [0u8; 32];
    word.to_big_endian(&mut buf);
    buf
}

pub fn word_to_usize(word: U256) -> Option<usize> {
    if word > U256::from(usize::MAX) {
        None
    } else {
        Some(word.low_u64() as usize)
    }
}

/// Lowercase hex with no prefix and no padding (`0` for zero).
pub fn word_to_hex(word: U256) -> String {
    format!("{word:x}")
}

/// Parses a word from `0x`-prefixed hex or from decimal.
pub fn parse_word(s: &str) -> Result<U256, CodecError> {
    let s = s.trim();
    if let Some(digits) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if digits.is_empty() {
            return Ok(U256::zero());
        }
        if digits.len() > 64 {
            return Err(CodecError::TooLarge { bits: 256, input: s.to_string() });
        }
        U256::from_str_radix(digits, 16).map_err(|_| CodecError::InvalidNumber(s.to_string()))
    } else {
        U256::from_dec_str(s).map_err(|_| CodecError::InvalidNumber(s.to_string()))
    }
}
