//! Offer construction
//!
//! An offer copies the demand's terms, stamps them with chain state and the
//! provider's address, and signs the packed payload the settlement contract
//! re-derives.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use spotnet_chain::{ChainSnapshot, ContractClient};
use spotnet_crypto::{sign, AgentSigner};
use spotnet_types::{Demand, Offer, OfferTerms};

use crate::error::{AgentError, AgentResult};

/// Fee paid to the lighthouse for every offer
pub const LIGHTHOUSE_FEE: u64 = 1;

/// Blocks an offer stays valid for
pub const DEADLINE_HORIZON: u64 = 100_000;

pub struct OfferBuilder {
    signer: AgentSigner,
    chain: Arc<dyn ContractClient>,
}

impl OfferBuilder {
    pub fn new(signer: AgentSigner, chain: Arc<dyn ContractClient>) -> Self {
        Self { signer, chain }
    }

    /// The provider address offers are issued from
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Read block height and our factory nonce, one call each
    pub async fn snapshot(&self) -> AgentResult<ChainSnapshot> {
        let block_height = self.chain.block_height().await?;
        let nonce = self.chain.nonce_of(self.address()).await?;
        Ok(ChainSnapshot {
            block_height,
            nonce,
        })
    }

    /// Build and sign an offer against a known snapshot
    pub fn build(&self, demand: &Demand, snapshot: &ChainSnapshot) -> AgentResult<Offer> {
        let deadline = U256::from(snapshot.block_height)
            .checked_add(U256::from(DEADLINE_HORIZON))
            .ok_or(AgentError::Overflow("deadline"))?;
        let terms = OfferTerms::from_demand(
            demand,
            self.address(),
            U256::from(LIGHTHOUSE_FEE),
            deadline,
            snapshot.nonce,
        );
        let signature = sign(&self.signer, &terms)?;
        Ok(terms.into_offer(signature))
    }

    /// Snapshot the chain, then build. Nothing is returned if either read fails.
    pub async fn create(&self, demand: &Demand) -> AgentResult<Offer> {
        let snapshot = self.snapshot().await?;
        tracing::debug!(
            block_height = snapshot.block_height,
            nonce = %snapshot.nonce,
            "chain snapshot taken"
        );
        self.build(demand, &snapshot)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use spotnet_chain::{ChainError, ChainResult};
    use spotnet_crypto::verify_offer;

    use super::*;

    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[derive(Default)]
    struct FixedChain {
        fail_nonce: bool,
        height_calls: AtomicUsize,
        nonce_calls: AtomicUsize,
    }

    #[async_trait]
    impl ContractClient for FixedChain {
        async fn block_height(&self) -> ChainResult<u64> {
            self.height_calls.fetch_add(1, Ordering::SeqCst);
            Ok(500)
        }

        async fn nonce_of(&self, _account: Address) -> ChainResult<U256> {
            self.nonce_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_nonce {
                return Err(ChainError::Transport("connection refused".to_string()));
            }
            Ok(U256::from(3u64))
        }

        async fn objective_of(&self, _liability: Address) -> ChainResult<Vec<u8>> {
            Err(ChainError::Transport("unused".to_string()))
        }
    }

    fn addr(last: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = last;
        Address::from_slice(&bytes)
    }

    fn demand() -> Demand {
        Demand {
            model: "QmModel".to_string(),
            objective: "QmObjective".to_string(),
            token: addr(1),
            cost: U256::from(10u64),
            validator: addr(2),
            lighthouse: addr(3),
            sender: addr(4),
        }
    }

    fn builder(chain: Arc<FixedChain>) -> OfferBuilder {
        OfferBuilder::new(AgentSigner::from_hex(KEY).unwrap(), chain)
    }

    #[tokio::test]
    async fn test_create_stamps_chain_state() {
        let chain = Arc::new(FixedChain::default());
        let builder = builder(chain.clone());

        let offer = builder.create(&demand()).await.unwrap();
        assert_eq!(offer.deadline, U256::from(100_500u64));
        assert_eq!(offer.nonce, U256::from(3u64));
        assert_eq!(offer.lighthouse_fee, U256::from(1u64));
        assert_eq!(offer.sender, builder.address());
        assert_eq!(offer.model, "QmModel");
        assert_eq!(offer.cost, U256::from(10u64));
        assert!(verify_offer(&offer).unwrap());

        assert_eq!(chain.height_calls.load(Ordering::SeqCst), 1);
        assert_eq!(chain.nonce_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_build_is_deterministic() {
        let builder = builder(Arc::new(FixedChain::default()));
        let snapshot = ChainSnapshot {
            block_height: 500,
            nonce: U256::from(3u64),
        };
        let a = builder.build(&demand(), &snapshot).unwrap();
        let b = builder.build(&demand(), &snapshot).unwrap();
        assert_eq!(a, b);

        let later = builder
            .build(
                &demand(),
                &ChainSnapshot {
                    block_height: 501,
                    ..snapshot
                },
            )
            .unwrap();
        assert_ne!(a.signature, later.signature);
    }

    #[test]
    fn test_deadline_at_u64_max_does_not_wrap() {
        let builder = builder(Arc::new(FixedChain::default()));
        let offer = builder
            .build(
                &demand(),
                &ChainSnapshot {
                    block_height: u64::MAX,
                    nonce: U256::ZERO,
                },
            )
            .unwrap();
        assert_eq!(offer.deadline, U256::from(u64::MAX) + U256::from(DEADLINE_HORIZON));
    }

    #[tokio::test]
    async fn test_no_offer_when_nonce_read_fails() {
        let chain = Arc::new(FixedChain {
            fail_nonce: true,
            ..Default::default()
        });
        let result = builder(chain).create(&demand()).await;
        assert!(matches!(
            result,
            Err(AgentError::ChainCall(ChainError::Transport(_)))
        ));
    }
}
