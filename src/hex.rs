//! Textual buffer addresses
//!
//! Some hosts cannot pass native pointers across the export boundary and
//! send the address of their buffer as hexadecimal text instead
//! (`"0x7ffd1a2b"`, `"7FFD1A2B"`). Two decoders are provided:
//!
//! - [`parse_hex_address`]: strict. Optional `0x`/`0X` prefix followed by one
//!   or more hex digits; anything else is an error.
//! - [`decode_hex_lenient`]: the historical decoder. Never fails; characters
//!   that are not hex digits are skipped, excess high digits are shifted out.

use crate::error::HexAddressError;
use serde::{Deserialize, Serialize};

/// Which decoder the export layer applies to textual addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HexMode {
    /// Reject malformed input
    #[default]
    Strict,
    /// Accept anything, decode what looks like digits
    Lenient,
}

impl HexMode {
    /// Decode `text` according to this mode
    pub fn decode(self, text: &str) -> Result<usize, HexAddressError> {
        match self {
            HexMode::Strict => parse_hex_address(text),
            HexMode::Lenient => Ok(decode_hex_lenient(text)),
        }
    }
}

fn strip_prefix(text: &str) -> &str {
    text.strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text)
}

/// Parse a hexadecimal address, rejecting malformed input
///
/// # Examples
///
/// ```
/// use gme_shim::hex::parse_hex_address;
///
/// assert_eq!(parse_hex_address("0x1A2B"), Ok(0x1A2B));
/// assert_eq!(parse_hex_address("1a2b"), Ok(0x1A2B));
/// assert!(parse_hex_address("0x").is_err());
/// ```
pub fn parse_hex_address(text: &str) -> Result<usize, HexAddressError> {
    let digits = strip_prefix(text);
    if digits.is_empty() {
        return Err(HexAddressError::Empty);
    }
    let prefix_len = text.len() - digits.len();

    let mut value: usize = 0;
    for (i, ch) in digits.char_indices() {
        let nibble = ch.to_digit(16).ok_or(HexAddressError::InvalidDigit {
            ch,
            position: prefix_len + i,
        })?;
        value = value
            .checked_mul(16)
            .and_then(|v| v.checked_add(nibble as usize))
            .ok_or(HexAddressError::Overflow { bits: usize::BITS })?;
    }
    Ok(value)
}

/// Decode a hexadecimal address the permissive way
///
/// A prefix is dropped when the second character is `x` or `X`. Every hex
/// digit after that is accumulated left to right; other characters are
/// ignored. Input without any hex digit decodes to 0.
pub fn decode_hex_lenient(text: &str) -> usize {
    let bytes = text.as_bytes();
    let body = if matches!(bytes.get(1), Some(b'x' | b'X')) {
        &bytes[2..]
    } else {
        bytes
    };

    body.iter()
        .filter_map(|&b| (b as char).to_digit(16))
        .fold(0usize, |acc, nibble| (acc << 4) | nibble as usize)
}
