//! Hexadecimal Fingerprint Codec
//!
//! Converts between MSB-first upper-case hex text and `W`-bit vectors.
//! The first character carries the highest-index nibble:
//!
//! ```text
//! "8001"  (W = 16)
//!  │  └── bits 3..0   = 0x1
//!  └───── bits 15..12 = 0x8
//! ```
//!
//! Strings shorter than `W/4` characters are either zero-padded on the
//! left (missing high-order nibbles are zero) or rejected, depending on
//! the configured [`PaddingPolicy`]. `decode` always returns exactly
//! `W/4` characters.

use serde::{Deserialize, Serialize};

use crate::bitpack::{BitVector, VectorWidth};
use crate::{Result, TanimotoError};

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Treatment of hex strings shorter than the vector width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaddingPolicy {
    /// Missing high-order nibbles are zero
    #[default]
    ZeroPad,
    /// Anything but exactly `W/4` characters is malformed
    Reject,
}

/// Hex codec bound to one vector width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerprintCodec {
    width: VectorWidth,
    padding: PaddingPolicy,
}

impl FingerprintCodec {
    pub fn new(width: VectorWidth, padding: PaddingPolicy) -> Self {
        Self { width, padding }
    }

    #[inline]
    pub fn width(&self) -> VectorWidth {
        self.width
    }

    #[inline]
    pub fn padding(&self) -> PaddingPolicy {
        self.padding
    }

    /// Parse upper-case hex text into a vector
    pub fn encode(&self, text: &str) -> Result<BitVector> {
        let nibbles = self.width.nibbles();
        let bytes = text.as_bytes();

        if bytes.len() > nibbles {
            return Err(TanimotoError::MalformedInput(format!(
                "{} hex characters exceed the {} allowed for {}",
                bytes.len(),
                nibbles,
                self.width
            )));
        }
        if bytes.len() < nibbles && self.padding == PaddingPolicy::Reject {
            return Err(TanimotoError::MalformedInput(format!(
                "{} hex characters, expected exactly {}",
                bytes.len(),
                nibbles
            )));
        }

        let mut v = BitVector::zero(self.width);
        // Last character is nibble 0
        for (k, &c) in bytes.iter().rev().enumerate() {
            v.or_nibble(k, hex_value(c)?);
        }
        Ok(v)
    }

    /// Render a vector as exactly `W/4` upper-case hex characters
    pub fn decode(&self, data: &BitVector) -> String {
        debug_assert_eq!(data.width(), self.width);
        (0..self.width.nibbles())
            .rev()
            .map(|k| HEX_DIGITS[data.nibble(k) as usize] as char)
            .collect()
    }
}

#[inline]
fn hex_value(c: u8) -> Result<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(TanimotoError::MalformedInput(format!(
            "invalid hex character {:?} (only 0-9 and A-F are accepted)",
            c as char
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(bits: usize, padding: PaddingPolicy) -> FingerprintCodec {
        FingerprintCodec::new(VectorWidth::new(bits).unwrap(), padding)
    }

    #[test]
    fn test_encode_msb_first() {
        let c = codec(16, PaddingPolicy::Reject);
        let v = c.encode("8001").unwrap();
        assert!(v.get_bit(15));
        assert!(v.get_bit(0));
        assert_eq!(v.popcount(), 2);
        assert_eq!(v.to_be_bytes(), vec![0x80, 0x01]);
    }

    #[test]
    fn test_decode_pads_to_width() {
        let c = codec(32, PaddingPolicy::ZeroPad);
        let v = c.encode("F").unwrap();
        assert_eq!(c.decode(&v), "0000000F");
    }

    #[test]
    fn test_reject_short_input() {
        let c = codec(32, PaddingPolicy::Reject);
        assert!(matches!(c.encode("ABC"), Err(TanimotoError::MalformedInput(_))));
        assert!(c.encode("0000ABCD").is_ok());
    }

    #[test]
    fn test_reject_long_input() {
        let c = codec(8, PaddingPolicy::ZeroPad);
        assert!(c.encode("123").is_err());
    }

    #[test]
    fn test_reject_invalid_characters() {
        let c = codec(16, PaddingPolicy::ZeroPad);
        assert!(c.encode("00ab").is_err());
        assert!(c.encode("00G0").is_err());
        assert!(c.encode("0 00").is_err());
    }

    #[test]
    fn test_empty_string_is_zero_when_padding() {
        let c = codec(128, PaddingPolicy::ZeroPad);
        assert_eq!(c.encode("").unwrap().popcount(), 0);
    }

    #[test]
    fn test_roundtrip_920() {
        let c = codec(920, PaddingPolicy::Reject);
        let text: String = "0123456789ABCDEF".chars().cycle().take(230).collect();
        let v = c.encode(&text).unwrap();
        assert_eq!(c.decode(&v), text);
    }

    #[test]
    fn test_hex_matches_byte_dump() {
        let c = codec(24, PaddingPolicy::Reject);
        let v = c.encode("A1B2C3").unwrap();
        assert_eq!(v.to_be_bytes(), vec![0xA1, 0xB2, 0xC3]);
    }
}
