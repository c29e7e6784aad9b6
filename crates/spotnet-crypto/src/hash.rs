//! Keccak-256 hashing

use sha3::{Digest, Keccak256};

/// Prefix applied by `eth_sign` / `personal_sign` to a 32-byte message
const PERSONAL_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Compute the Keccak-256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Hash a 32-byte digest the way wallets do before signing it
pub fn eth_message_hash(hash: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(PERSONAL_MESSAGE_PREFIX);
    hasher.update(hash);
    hasher.finalize().into()
}

/// First four bytes of the hash of a Solidity function signature
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}
