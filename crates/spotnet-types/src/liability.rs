//! Liability bindings

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::message::OutboundMessage;
use crate::wire;

/// A liability contract and the objective read from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiabilityBinding {
    #[serde(with = "wire::address")]
    pub liability: Address,
    pub objective: String,
}

impl LiabilityBinding {
    pub fn new(liability: Address, objective: impl Into<String>) -> Self {
        Self {
            liability,
            objective: objective.into(),
        }
    }

    /// Consume the binding into the `{objective}` reply
    pub fn into_reply(self) -> OutboundMessage {
        OutboundMessage::Objective {
            objective: self.objective,
        }
    }
}
