//! secp256k1 signing for offers
//!
//! Signatures follow the `eth_sign` convention: the 32-byte payload hash is
//! wrapped with the personal-message prefix, hashed again and signed with a
//! deterministic (RFC 6979) recoverable ECDSA signature. The result is
//! `r || s || v` with `v` in {27, 28}.

use std::fmt;

use alloy_primitives::Address;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint as _;
use rand::rngs::OsRng;
use spotnet_types::{Signature, SIGNATURE_LENGTH};

use crate::hash::{eth_message_hash, keccak256};
use crate::{CryptoError, CryptoResult};

/// Holds the agent's private key and its derived address
#[derive(Clone)]
pub struct AgentSigner {
    signing_key: SigningKey,
    address: Address,
}

impl AgentSigner {
    /// Generate a new random key
    pub fn generate() -> Self {
        Self::from_key(SigningKey::random(&mut OsRng))
    }

    /// Create from raw 32-byte private key material
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyFormat(format!(
                "private key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let signing_key = SigningKey::from_slice(bytes)
            .map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))?;
        Ok(Self::from_key(signing_key))
    }

    /// Create from a hex private key, with or without `0x`
    pub fn from_hex(text: &str) -> CryptoResult<Self> {
        let text = text.trim();
        let digits = text.strip_prefix("0x").unwrap_or(text);
        let bytes = hex::decode(digits).map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    fn from_key(signing_key: SigningKey) -> Self {
        let address = address_of(signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    /// The Ethereum address controlled by this key
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a 32-byte payload hash
    pub fn sign_hash(&self, hash: &[u8; 32]) -> CryptoResult<Signature> {
        let digest = eth_message_hash(hash);
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

        let mut bytes = [0u8; SIGNATURE_LENGTH];
        bytes[..64].copy_from_slice(&signature.to_bytes());
        bytes[64] = 27 + recovery_id.to_byte();
        Ok(Signature::from_bytes(bytes))
    }
}

impl fmt::Debug for AgentSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Derive the Ethereum address of a public key
pub fn address_of(key: &VerifyingKey) -> Address {
    let encoded = key.to_encoded_point(false);
    // skip the 0x04 uncompressed prefix
    let hash = keccak256(&encoded.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Recover the address that produced `signature` over a payload hash
pub fn recover_signer(hash: &[u8; 32], signature: &Signature) -> CryptoResult<Address> {
    let digest = eth_message_hash(hash);
    let ecdsa = EcdsaSignature::from_slice(signature.rs())
        .map_err(|e| CryptoError::RecoveryFailed(e.to_string()))?;
    let v = match signature.v() {
        v @ (27 | 28) => v - 27,
        v @ (0 | 1) => v,
        other => {
            return Err(CryptoError::RecoveryFailed(format!("invalid v byte {}", other)));
        }
    };
    let recovery_id = RecoveryId::from_byte(v)
        .ok_or_else(|| CryptoError::RecoveryFailed(format!("invalid recovery id {}", v)))?;
    let key = VerifyingKey::recover_from_prehash(&digest, &ecdsa, recovery_id)
        .map_err(|e| CryptoError::RecoveryFailed(e.to_string()))?;
    Ok(address_of(&key))
}
