//! Bounded chain calls

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;

use crate::client::ContractClient;
use crate::{ChainError, ChainResult};

/// Await `call`, failing with [`ChainError::Timeout`] once `limit` elapses
pub async fn bounded<T, F>(name: &'static str, limit: Duration, call: F) -> ChainResult<T>
where
    F: Future<Output = ChainResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ChainError::Timeout { call: name, limit }),
    }
}

/// Wraps a client so that no call can stall the agent indefinitely
pub struct TimeoutContractClient {
    inner: Arc<dyn ContractClient>,
    limit: Duration,
}

impl TimeoutContractClient {
    pub fn new(inner: Arc<dyn ContractClient>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl ContractClient for TimeoutContractClient {
    async fn block_height(&self) -> ChainResult<u64> {
        bounded("block_height", self.limit, self.inner.block_height()).await
    }

    async fn nonce_of(&self, account: Address) -> ChainResult<U256> {
        bounded("nonce_of", self.limit, self.inner.nonce_of(account)).await
    }

    async fn objective_of(&self, liability: Address) -> ChainResult<Vec<u8>> {
        bounded("objective_of", self.limit, self.inner.objective_of(liability)).await
    }
}
