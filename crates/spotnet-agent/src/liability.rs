//! Liability objective lookup

use std::sync::Arc;

use alloy_primitives::Address;
use spotnet_chain::{ChainError, ContractClient};
use spotnet_types::LiabilityBinding;

use crate::error::AgentResult;

/// Reads the objective a liability contract was created for
pub struct LiabilityResolver {
    chain: Arc<dyn ContractClient>,
}

impl LiabilityResolver {
    pub fn new(chain: Arc<dyn ContractClient>) -> Self {
        Self { chain }
    }

    /// One `objective()` read, no retry
    pub async fn resolve(&self, liability: Address) -> AgentResult<LiabilityBinding> {
        let raw = self.chain.objective_of(liability).await?;
        let objective =
            String::from_utf8(raw).map_err(|e| ChainError::InvalidUtf8(e.to_string()))?;
        Ok(LiabilityBinding::new(liability, objective))
    }
}
