//! Solidity tightly packed encoding (`abi.encodePacked`)
//!
//! `bytes` are written raw, `address` as its 20 bytes, `uint256` as 32
//! big-endian bytes. No padding or length prefixes are added, so the token
//! order and types fully determine the layout.

use alloy_primitives::{Address, U256};

/// A typed value in a packed encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackedToken {
    Bytes(Vec<u8>),
    Address(Address),
    Uint256(U256),
}

impl PackedToken {
    fn encoded_len(&self) -> usize {
        match self {
            Self::Bytes(bytes) => bytes.len(),
            Self::Address(_) => 20,
            Self::Uint256(_) => 32,
        }
    }
}

/// Encode tokens back to back
pub fn encode_packed(tokens: &[PackedToken]) -> Vec<u8> {
    let mut out = Vec::with_capacity(tokens.iter().map(PackedToken::encoded_len).sum());
    for token in tokens {
        match token {
            PackedToken::Bytes(bytes) => out.extend_from_slice(bytes),
            PackedToken::Address(address) => out.extend_from_slice(address.as_slice()),
            PackedToken::Uint256(value) => out.extend_from_slice(&value.to_be_bytes::<32>()),
        }
    }
    out
}

/// Bytes of an identifier field: `0x` hex is decoded, anything else is UTF-8
pub fn identifier_bytes(identifier: &str) -> Vec<u8> {
    if let Some(digits) = identifier.strip_prefix("0x") {
        if digits.len() % 2 == 0 {
            if let Ok(bytes) = hex::decode(digits) {
                return bytes;
            }
        }
    }
    identifier.as_bytes().to_vec()
}
