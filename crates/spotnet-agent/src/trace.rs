//! Negotiation trace artifacts for replay and audit
//!
//! Every handled message leaves one event stamped with the agent's status and
//! queue depth after handling, so a trace reads as the state machine's
//! history rather than a log. Events carry a session-wide sequence number
//! that keeps counting when the bound evicts old entries.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::{AgentState, AgentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NegotiationStage {
    Offer,
    Queue,
    Finalize,
    Liability,
    Relay,
    Ignore,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationTraceEvent {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub stage: NegotiationStage,
    pub message: String,
    /// Status once the message was handled
    pub status: AgentStatus,
    /// Demands waiting once the message was handled
    pub queued: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl NegotiationTraceEvent {
    fn same_outcome(&self, other: &NegotiationTraceEvent) -> bool {
        self.seq == other.seq
            && self.stage == other.stage
            && self.message == other.message
            && self.status == other.status
            && self.queued == other.queued
            && self.data == other.data
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationTrace {
    pub session_id: Uuid,
    /// Checksummed provider address
    pub agent: String,
    pub created_at: DateTime<Utc>,
    pub events: VecDeque<NegotiationTraceEvent>,
    /// Events pushed out by `max_entries`
    pub evicted: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<usize>,
}

impl NegotiationTrace {
    pub fn new(agent: impl Into<String>, max_entries: Option<usize>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            agent: agent.into(),
            created_at: Utc::now(),
            events: VecDeque::new(),
            evicted: 0,
            max_entries,
        }
    }

    /// Record a handled message against the state it left behind
    pub fn record(
        &mut self,
        stage: NegotiationStage,
        message: impl Into<String>,
        state: &AgentState,
        data: Option<serde_json::Value>,
    ) {
        let seq = self.evicted + self.events.len() as u64;
        self.events.push_back(NegotiationTraceEvent {
            seq,
            timestamp: Utc::now(),
            stage,
            message: message.into(),
            status: state.status(),
            queued: state.queue().len(),
            data,
        });

        let max = self.max_entries.unwrap_or(usize::MAX);
        while self.events.len() > max {
            self.events.pop_front();
            self.evicted += 1;
        }
    }

    /// Events recorded at `stage`, oldest first
    pub fn events_at(&self, stage: NegotiationStage) -> impl Iterator<Item = &NegotiationTraceEvent> {
        self.events.iter().filter(move |e| e.stage == stage)
    }

    /// Number of offers the session has published among the retained events
    pub fn offers_published(&self) -> usize {
        self.events_at(NegotiationStage::Offer).count()
    }

    /// Two sessions fed the same messages against the same chain produce the
    /// same sequence of stages, payloads and resulting states. Timestamps and
    /// session ids differ between runs and are not compared.
    pub fn is_replayable_with(&self, other: &NegotiationTrace) -> bool {
        self.evicted == other.evicted
            && self.events.len() == other.events.len()
            && self
                .events
                .iter()
                .zip(other.events.iter())
                .all(|(a, b)| a.same_outcome(b))
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, U256};
    use serde_json::json;
    use spotnet_types::Demand;

    use super::*;

    fn demand(objective: &str) -> Demand {
        Demand {
            model: "QmModel".to_string(),
            objective: objective.to_string(),
            token: Address::ZERO,
            cost: U256::from(1u64),
            validator: Address::ZERO,
            lighthouse: Address::ZERO,
            sender: Address::ZERO,
        }
    }

    #[test]
    fn test_events_carry_resulting_state() {
        let mut state = AgentState::new();
        let mut trace = NegotiationTrace::new("0xagent", None);

        state.begin(demand("QmFirst"));
        trace.record(NegotiationStage::Offer, "offer published", &state, None);
        state.enqueue(demand("QmSecond"));
        trace.record(NegotiationStage::Queue, "demand queued", &state, None);

        let events: Vec<_> = trace.events.iter().map(|e| (e.seq, e.status, e.queued)).collect();
        assert_eq!(
            events,
            vec![(0, AgentStatus::Busy, 0), (1, AgentStatus::Busy, 1)]
        );
        assert_eq!(trace.offers_published(), 1);
    }

    #[test]
    fn test_bound_evicts_oldest_and_keeps_counting() {
        let state = AgentState::new();
        let mut trace = NegotiationTrace::new("0xagent", Some(2));
        trace.record(NegotiationStage::Offer, "one", &state, None);
        trace.record(NegotiationStage::Queue, "two", &state, None);
        trace.record(NegotiationStage::Finalize, "three", &state, None);

        let kept: Vec<(u64, &str)> = trace
            .events
            .iter()
            .map(|e| (e.seq, e.message.as_str()))
            .collect();
        assert_eq!(kept, vec![(1, "two"), (2, "three")]);
        assert_eq!(trace.evicted, 1);
        assert_eq!(trace.offers_published(), 0);
    }

    #[test]
    fn test_replay_compares_outcomes_not_sessions() {
        let mut state = AgentState::new();
        let mut a = NegotiationTrace::new("0xagent", None);
        let mut b = NegotiationTrace::new("0xagent", None);
        assert_ne!(a.session_id, b.session_id);

        state.begin(demand("QmFirst"));
        a.record(NegotiationStage::Offer, "offer published", &state, Some(json!({"nonce": 3})));
        b.record(NegotiationStage::Offer, "offer published", &state, Some(json!({"nonce": 3})));
        assert!(a.is_replayable_with(&b));

        // Same message and payload, different resulting queue
        let idle = AgentState::new();
        a.record(NegotiationStage::Finalize, "cycle finalized", &idle, None);
        state.enqueue(demand("QmSecond"));
        b.record(NegotiationStage::Finalize, "cycle finalized", &state, None);
        assert!(!a.is_replayable_with(&b));
    }
}
