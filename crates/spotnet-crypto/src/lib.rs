//! Spotnet Crypto - hashing and signing for settlement-verifiable offers
//!
//! This crate provides:
//! - Keccak-256 and the Ethereum personal-message hash
//! - Solidity tightly packed encoding (`abi.encodePacked`)
//! - secp256k1 offer signing with recoverable signatures
//!
//! # Security Invariant
//!
//! **The agent's private key never leaves [`AgentSigner`].**

pub mod hash;
pub mod packed;
pub mod signable;
pub mod signer;

pub use hash::*;
pub use packed::*;
pub use signable::*;
pub use signer::*;

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Signature recovery failed: {0}")]
    RecoveryFailed(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
