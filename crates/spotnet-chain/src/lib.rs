//! Spotnet Chain - the read-only contract client used during negotiation
//!
//! The agent needs three reads from the chain:
//! - the current block height (offer deadlines)
//! - its own nonce on the factory contract (offer replay protection)
//! - the objective stored in a liability contract
//!
//! [`ContractClient`] is the seam; [`RpcContractClient`] talks Ethereum
//! JSON-RPC and [`TimeoutContractClient`] bounds every call.

pub mod abi;
pub mod client;
pub mod rpc;
pub mod timeout;

pub use client::{ChainSnapshot, ContractClient};
pub use rpc::RpcContractClient;
pub use timeout::TimeoutContractClient;

use std::time::Duration;

use thiserror::Error;

/// Chain access errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{call} timed out after {limit:?}")]
    Timeout { call: &'static str, limit: Duration },

    #[error("Malformed chain response: {0}")]
    Decode(String),

    #[error("Objective is not valid UTF-8: {0}")]
    InvalidUtf8(String),
}

pub type ChainResult<T> = Result<T, ChainError>;
