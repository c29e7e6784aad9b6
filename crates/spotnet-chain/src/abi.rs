//! Minimal ABI encoding for the handful of view calls the agent makes

use alloy_primitives::{Address, U256};
use spotnet_crypto::function_selector;
use spotnet_types::wire::as_u64;

use crate::{ChainError, ChainResult};

const WORD: usize = 32;

/// Calldata for a call without arguments
pub fn encode_call(signature: &str) -> Vec<u8> {
    function_selector(signature).to_vec()
}

/// Calldata for a call taking a single `address`
pub fn encode_call_with_address(signature: &str, address: Address) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + WORD);
    data.extend_from_slice(&function_selector(signature));
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(address.as_slice());
    data
}

/// Decode `0x`-prefixed hex returned by `eth_call`
pub fn decode_hex_data(text: &str) -> ChainResult<Vec<u8>> {
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::Decode(format!("expected 0x-prefixed data, got '{}'", text)))?;
    hex::decode(digits).map_err(|e| ChainError::Decode(e.to_string()))
}

fn word_at(data: &[u8], offset: usize) -> ChainResult<U256> {
    let end = offset
        .checked_add(WORD)
        .ok_or_else(|| ChainError::Decode("offset overflow".to_string()))?;
    let word: [u8; WORD] = data
        .get(offset..end)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| {
            ChainError::Decode(format!(
                "return data too short: need {} bytes, have {}",
                end,
                data.len()
            ))
        })?;
    Ok(U256::from_be_bytes(word))
}

fn word_as_usize(value: U256) -> ChainResult<usize> {
    as_u64(&value)
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| ChainError::Decode(format!("length {} out of range", value)))
}

/// Decode a single `uint256` return value
pub fn decode_uint256(data: &[u8]) -> ChainResult<U256> {
    word_at(data, 0)
}

/// Decode a single dynamic `bytes` (or `string`) return value
pub fn decode_bytes(data: &[u8]) -> ChainResult<Vec<u8>> {
    let offset = word_as_usize(word_at(data, 0)?)?;
    let len = word_as_usize(word_at(data, offset)?)?;
    let start = offset + WORD;
    let end = start
        .checked_add(len)
        .ok_or_else(|| ChainError::Decode("length overflow".to_string()))?;
    data.get(start..end).map(<[u8]>::to_vec).ok_or_else(|| {
        ChainError::Decode(format!(
            "bytes payload truncated: need {} bytes, have {}",
            end,
            data.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(value: u64) -> [u8; 32] {
        U256::from(value).to_be_bytes::<32>()
    }

    #[test]
    fn test_encode_call_with_address() {
        let mut raw = [0u8; 20];
        raw[19] = 0x42;
        let data = encode_call_with_address("balanceOf(address)", Address::from_slice(&raw));
        assert_eq!(data.len(), 36);
        assert_eq!(hex::encode(&data[..4]), "70a08231");
        assert!(data[4..35].iter().all(|b| *b == 0));
        assert_eq!(data[35], 0x42);
        assert_eq!(encode_call("objective()").len(), 4);
    }

    #[test]
    fn test_decode_uint256() {
        assert_eq!(decode_uint256(&word(7)).unwrap(), U256::from(7u64));
        assert!(decode_uint256(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_decode_bytes() {
        let payload = b"QmObjectiveHash";
        let mut data = Vec::new();
        data.extend_from_slice(&word(32));
        data.extend_from_slice(&word(payload.len() as u64));
        let mut padded = payload.to_vec();
        padded.resize(32, 0);
        data.extend_from_slice(&padded);

        assert_eq!(decode_bytes(&data).unwrap(), payload.to_vec());
    }

    #[test]
    fn test_decode_bytes_rejects_truncation() {
        let mut data = Vec::new();
        data.extend_from_slice(&word(32));
        data.extend_from_slice(&word(64));
        data.extend_from_slice(&[0u8; 32]);
        assert!(matches!(decode_bytes(&data), Err(ChainError::Decode(_))));

        let mut bad_offset = Vec::new();
        bad_offset.extend_from_slice(&word(4096));
        assert!(decode_bytes(&bad_offset).is_err());
    }

    #[test]
    fn test_decode_hex_data() {
        assert_eq!(decode_hex_data("0x0a0b").unwrap(), vec![10, 11]);
        assert!(decode_hex_data("0a0b").is_err());
        assert!(decode_hex_data("0xzz").is_err());
    }
}
