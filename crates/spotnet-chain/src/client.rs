//! Contract client trait

use alloy_primitives::{Address, U256};
use async_trait::async_trait;

use crate::ChainResult;

/// Chain state an offer is built against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainSnapshot {
    pub block_height: u64,
    pub nonce: U256,
}

/// Read-only access to the settlement contracts
#[async_trait]
pub trait ContractClient: Send + Sync {
    /// Current block number
    async fn block_height(&self) -> ChainResult<u64>;

    /// The factory's next nonce for `account`
    async fn nonce_of(&self, account: Address) -> ChainResult<U256>;

    /// Raw `objective()` bytes of a liability contract
    async fn objective_of(&self, liability: Address) -> ChainResult<Vec<u8>>;
}
