//! Wire representations for chain-facing scalar fields
//!
//! Amounts travel as JSON numbers while a double holds them exactly
//! (up to 2^53 - 1) and as decimal strings otherwise. Decoding additionally accepts `0x` hex strings. Floats
//! are only accepted when they are exact integers below 2^53.

use alloy_primitives::{Address, U256};

/// Largest integer a JSON double carries exactly
pub const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

/// Parse a decimal or `0x`-prefixed hex string into a `U256`
pub fn parse_uint(text: &str) -> Result<U256, String> {
    let text = text.trim();
    if let Some(digits) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("invalid hex integer '{}'", text));
        }
        return U256::from_str_radix(digits, 16).map_err(|e| format!("'{}': {}", text, e));
    }
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("invalid unsigned integer '{}'", text));
    }
    U256::from_str_radix(text, 10).map_err(|e| format!("'{}': {}", text, e))
}

/// Narrow a `U256` to `u64` when it fits
pub fn as_u64(value: &U256) -> Option<u64> {
    if value.bit_len() <= 64 {
        Some(value.as_limbs()[0])
    } else {
        None
    }
}

/// Parse a `0x`-prefixed 20-byte hex address
pub fn parse_address(text: &str) -> Result<Address, String> {
    let digits = text
        .trim()
        .strip_prefix("0x")
        .or_else(|| text.trim().strip_prefix("0X"))
        .ok_or_else(|| format!("address '{}' is missing the 0x prefix", text))?;
    let bytes = hex::decode(digits).map_err(|e| format!("address '{}': {}", text, e))?;
    if bytes.len() != 20 {
        return Err(format!("address '{}' must be 20 bytes, got {}", text, bytes.len()));
    }
    Ok(Address::from_slice(&bytes))
}

/// Serde adapter for `U256` amounts
pub mod uint256 {
    use std::fmt;

    use alloy_primitives::U256;
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    use super::MAX_SAFE_INTEGER;

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        match super::as_u64(value) {
            Some(small) if small <= MAX_SAFE_INTEGER => serializer.serialize_u64(small),
            _ => serializer.serialize_str(&value.to_string()),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        deserializer.deserialize_any(UintVisitor)
    }

    struct UintVisitor;

    impl<'de> Visitor<'de> for UintVisitor {
        type Value = U256;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an unsigned integer, a decimal string or a 0x-prefixed hex string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<U256, E> {
            Ok(U256::from(v))
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<U256, E> {
            Ok(U256::from(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<U256, E> {
            u64::try_from(v)
                .map(U256::from)
                .map_err(|_| E::custom(format!("negative amount {}", v)))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<U256, E> {
            if v >= 0.0 && v.fract() == 0.0 && v <= MAX_SAFE_INTEGER as f64 {
                Ok(U256::from(v as u64))
            } else {
                Err(E::custom(format!(
                    "amount {} is not an exact unsigned integer, send it as a decimal string",
                    v
                )))
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<U256, E> {
            super::parse_uint(v).map_err(E::custom)
        }
    }
}

/// Serde adapter for 20-byte addresses (checksummed on output)
pub mod address {
    use alloy_primitives::Address;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Address, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_checksum(None))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Address, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_address(&text).map_err(serde::de::Error::custom)
    }
}
