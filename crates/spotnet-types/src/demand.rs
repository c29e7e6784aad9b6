//! Demand announcements

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::wire;

/// A request to perform a compute task, published by a requester.
///
/// `model` and `objective` are opaque identifiers (typically IPFS hashes)
/// kept exactly as received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demand {
    pub model: String,
    pub objective: String,
    #[serde(with = "wire::address")]
    pub token: Address,
    #[serde(with = "wire::uint256")]
    pub cost: U256,
    #[serde(with = "wire::address")]
    pub validator: Address,
    #[serde(with = "wire::address")]
    pub lighthouse: Address,
    /// Requester address
    #[serde(with = "wire::address")]
    pub sender: Address,
}

impl Demand {
    /// Whether this demand asks for the given model
    pub fn requests_model(&self, model: &str) -> bool {
        self.model == model
    }
}
