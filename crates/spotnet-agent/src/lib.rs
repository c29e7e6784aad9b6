//! Spotnet Agent - the provider side of the negotiation protocol
//!
//! The agent listens for demands, answers the first one it can with a signed
//! offer, queues the rest while busy, and works through the queue as each
//! cycle is finalized. It also answers liability assignments with the
//! objective stored on chain and relays results between roles.
//!
//! # Invariant
//!
//! **At most one demand is in flight.** Status is `Busy` exactly when an
//! offer has been published for the current demand and not yet finalized.

pub mod agent;
pub mod error;
pub mod liability;
pub mod offer;
pub mod queue;
pub mod state;
pub mod trace;

pub use agent::{
    AgentConfig, Capabilities, DispatchOutcome, IgnoreReason, NegotiationAgent,
    DEFAULT_CALL_TIMEOUT,
};
pub use error::{AgentError, AgentResult};
pub use liability::LiabilityResolver;
pub use offer::{OfferBuilder, DEADLINE_HORIZON, LIGHTHOUSE_FEE};
pub use queue::DemandQueue;
pub use state::{AgentState, AgentStatus};
pub use trace::{NegotiationStage, NegotiationTrace, NegotiationTraceEvent};
