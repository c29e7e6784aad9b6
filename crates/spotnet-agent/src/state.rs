//! Negotiation state

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use spotnet_types::Demand;

use crate::queue::DemandQueue;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    #[default]
    Available,
    Busy,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Busy => "BUSY",
        }
    }
}

/// Everything the agent remembers between events.
///
/// `Busy` holds exactly when an offer for `current_demand` has been published
/// and not yet finalized. The queue is only ever non-empty while busy.
#[derive(Debug, Clone, Default)]
pub struct AgentState {
    status: AgentStatus,
    current_demand: Option<Demand>,
    queue: DemandQueue,
    liability_address: Option<Address>,
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn is_busy(&self) -> bool {
        self.status == AgentStatus::Busy
    }

    pub fn current_demand(&self) -> Option<&Demand> {
        self.current_demand.as_ref()
    }

    pub fn queue(&self) -> &DemandQueue {
        &self.queue
    }

    /// Last liability contract assigned to this agent
    pub fn liability_address(&self) -> Option<Address> {
        self.liability_address
    }

    /// Both halves of the status invariant hold
    pub fn is_consistent(&self) -> bool {
        match self.status {
            AgentStatus::Busy => self.current_demand.is_some(),
            AgentStatus::Available => self.current_demand.is_none() && self.queue.is_empty(),
        }
    }

    /// An offer for `demand` is out
    pub(crate) fn begin(&mut self, demand: Demand) {
        self.status = AgentStatus::Busy;
        self.current_demand = Some(demand);
    }

    /// Close the current cycle, returning the demand it was for
    pub(crate) fn finish(&mut self) -> Option<Demand> {
        self.status = AgentStatus::Available;
        self.current_demand.take()
    }

    pub(crate) fn enqueue(&mut self, demand: Demand) -> usize {
        self.queue.push(demand)
    }

    pub(crate) fn next_queued(&mut self) -> Option<Demand> {
        self.queue.pop()
    }

    pub(crate) fn record_liability(&mut self, liability: Address) {
        self.liability_address = Some(liability);
    }
}
