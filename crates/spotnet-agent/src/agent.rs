//! Provider negotiation agent
//!
//! The agent consumes one bus message at a time and reacts according to its
//! status:
//!
//! ```text
//!            demand / offer published
//! AVAILABLE ---------------------------> BUSY ---+ demand / queued
//!     ^                                   |  ^   |
//!     |  finalized, queue empty           |  +---+
//!     +-----------------------------------+
//!            finalized, queue non-empty: pop head, offer it, stay BUSY
//! ```
//!
//! Liability assignments and results are handled in either status and never
//! change it.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use serde_json::{json, Value};
use spotnet_bus::{BusMessage, MessageBus};
use spotnet_chain::{ContractClient, TimeoutContractClient};
use spotnet_crypto::AgentSigner;
use spotnet_types::{Demand, InboundEvent, Offer, OutboundMessage};

use crate::error::{AgentError, AgentResult};
use crate::liability::LiabilityResolver;
use crate::offer::OfferBuilder;
use crate::state::{AgentState, AgentStatus};
use crate::trace::{NegotiationStage, NegotiationTrace};

/// Default bound on each chain read
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Optional behaviours, both on by default
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Queue demands that arrive while busy instead of dropping them
    pub queueing: bool,
    /// Answer liability assignments with the contract's objective
    pub liability_resolution: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            queueing: true,
            liability_resolution: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Demands and finalizations arrive here; offers and results go out here
    pub provider_topic: String,
    /// Liability assignments and results arrive here; objectives go out here
    pub spot_topic: String,
    /// The only model this agent serves
    pub model: String,
    pub capabilities: Capabilities,
    /// Demand senders to serve; empty serves everyone
    pub allowed_requesters: Vec<Address>,
    /// Bus peers to listen to; empty listens to everyone
    pub trusted_peers: Vec<String>,
    pub call_timeout: Duration,
    pub trace_max_entries: Option<usize>,
}

impl AgentConfig {
    pub fn new(
        provider_topic: impl Into<String>,
        spot_topic: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider_topic: provider_topic.into(),
            spot_topic: spot_topic.into(),
            model: model.into(),
            capabilities: Capabilities::default(),
            allowed_requesters: Vec::new(),
            trusted_peers: Vec::new(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            trace_max_entries: Some(1024),
        }
    }
}

/// Why a well-formed message was not acted on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// One of our own publications coming back
    Echo,
    /// The event is not handled on the topic it arrived on
    WrongTopic,
    ModelMismatch,
    QueueingDisabled,
    LiabilityResolutionDisabled,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Echo => "echo",
            Self::WrongTopic => "wrong_topic",
            Self::ModelMismatch => "model_mismatch",
            Self::QueueingDisabled => "queueing_disabled",
            Self::LiabilityResolutionDisabled => "liability_resolution_disabled",
        }
    }
}

/// What handling one message amounted to
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Demand accepted while available
    OfferPublished(Box<Offer>),
    /// Demand appended to the backlog at `position`
    Queued { position: usize },
    /// Cycle closed. `offer` is set when a queued demand was taken up;
    /// `discarded` counts queued demands that failed on the way
    Released {
        offer: Option<Box<Offer>>,
        discarded: usize,
    },
    ObjectivePublished { liability: Address, objective: String },
    ResultForwarded,
    Ignored(IgnoreReason),
    /// The message could not be acted on; state is as before it arrived
    Dropped(AgentError),
}

pub struct NegotiationAgent {
    config: AgentConfig,
    builder: OfferBuilder,
    resolver: LiabilityResolver,
    bus: Arc<dyn MessageBus>,
    state: AgentState,
    trace: NegotiationTrace,
}

impl NegotiationAgent {
    /// Every chain call the agent makes is bounded by `config.call_timeout`
    pub fn new(
        config: AgentConfig,
        signer: AgentSigner,
        chain: Arc<dyn ContractClient>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        let chain: Arc<dyn ContractClient> =
            Arc::new(TimeoutContractClient::new(chain, config.call_timeout));
        let trace = NegotiationTrace::new(
            signer.address().to_checksum(None),
            config.trace_max_entries,
        );
        Self {
            builder: OfferBuilder::new(signer, chain.clone()),
            resolver: LiabilityResolver::new(chain),
            bus,
            state: AgentState::new(),
            trace,
            config,
        }
    }

    pub fn address(&self) -> Address {
        self.builder.address()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn status(&self) -> AgentStatus {
        self.state.status()
    }

    pub fn trace(&self) -> &NegotiationTrace {
        &self.trace
    }

    /// Handle one bus message to completion. Never fails: problems are
    /// logged and reported through the outcome.
    pub async fn dispatch(&mut self, message: &BusMessage) -> DispatchOutcome {
        let event = match InboundEvent::decode(&message.data) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(topic = %message.topic, error = %e, "dropping malformed message");
                return self.drop_with(AgentError::Parse(e));
            }
        };

        if let Some(reason) = self.echo_or_misrouted(&message.topic, &event) {
            tracing::debug!(
                topic = %message.topic,
                kind = event.kind(),
                reason = reason.as_str(),
                "ignoring message"
            );
            return self.ignore(reason);
        }

        if let Err(e) = self.check_peer(message.from.as_deref()) {
            tracing::warn!(topic = %message.topic, error = %e, "dropping message from untrusted peer");
            return self.drop_with(e);
        }

        match event {
            InboundEvent::DemandAnnounced(demand) => self.on_demand(demand).await,
            InboundEvent::Finalized => self.on_finalized().await,
            InboundEvent::LiabilityAssigned { liability } => self.on_liability(liability).await,
            InboundEvent::ResultAvailable { result } => self.on_result(result).await,
            InboundEvent::OfferSeen(_) | InboundEvent::ObjectiveSeen { .. } => {
                self.ignore(IgnoreReason::Echo)
            }
        }
    }

    fn echo_or_misrouted(&self, topic: &str, event: &InboundEvent) -> Option<IgnoreReason> {
        let on_provider = topic == self.config.provider_topic;
        let on_spot = topic == self.config.spot_topic;
        match event {
            InboundEvent::OfferSeen(_) | InboundEvent::ObjectiveSeen { .. } => {
                Some(IgnoreReason::Echo)
            }
            InboundEvent::DemandAnnounced(demand) if demand.sender == self.address() => {
                Some(IgnoreReason::Echo)
            }
            InboundEvent::ResultAvailable { .. } if on_provider => Some(IgnoreReason::Echo),
            InboundEvent::DemandAnnounced(_) | InboundEvent::Finalized if !on_provider => {
                Some(IgnoreReason::WrongTopic)
            }
            InboundEvent::LiabilityAssigned { .. } | InboundEvent::ResultAvailable { .. }
                if !on_spot =>
            {
                Some(IgnoreReason::WrongTopic)
            }
            _ => None,
        }
    }

    fn check_peer(&self, from: Option<&str>) -> AgentResult<()> {
        let trusted = &self.config.trusted_peers;
        if trusted.is_empty() {
            return Ok(());
        }
        match from {
            Some(peer) if trusted.iter().any(|t| t == peer) => Ok(()),
            Some(peer) => Err(AgentError::IdentityMismatch(format!("peer {} is not trusted", peer))),
            None => Err(AgentError::IdentityMismatch("message has no origin peer".to_string())),
        }
    }

    async fn on_demand(&mut self, demand: Demand) -> DispatchOutcome {
        if !demand.requests_model(&self.config.model) {
            tracing::debug!(model = %demand.model, "demand for another model");
            return self.ignore(IgnoreReason::ModelMismatch);
        }

        let allowed = &self.config.allowed_requesters;
        if !allowed.is_empty() && !allowed.contains(&demand.sender) {
            let e = AgentError::IdentityMismatch(format!("requester {} is not served", demand.sender));
            tracing::warn!(error = %e, "dropping demand");
            return self.drop_with(e);
        }

        match self.state.status() {
            AgentStatus::Available => match self.accept(demand).await {
                Ok(offer) => DispatchOutcome::OfferPublished(Box::new(offer)),
                Err(e) => self.drop_with(e),
            },
            AgentStatus::Busy if !self.config.capabilities.queueing => {
                tracing::warn!(
                    objective = %demand.objective,
                    "busy and queueing disabled, dropping demand"
                );
                self.ignore(IgnoreReason::QueueingDisabled)
            }
            AgentStatus::Busy => {
                let objective = demand.objective.clone();
                let position = self.state.enqueue(demand);
                tracing::info!(%objective, position, "busy, demand queued");
                self.trace.record(
                    NegotiationStage::Queue,
                    "demand queued",
                    &self.state,
                    Some(json!({"objective": objective, "position": position})),
                );
                DispatchOutcome::Queued { position }
            }
        }
    }

    /// Build, sign and publish an offer, committing to BUSY only once it is out
    async fn accept(&mut self, demand: Demand) -> AgentResult<Offer> {
        let offer = self.builder.create(&demand).await?;
        self.send(&self.config.provider_topic, &OutboundMessage::Offer(offer.clone()))
            .await?;
        self.state.begin(demand);

        tracing::info!(
            objective = %offer.objective,
            nonce = %offer.nonce,
            deadline = %offer.deadline,
            "offer published"
        );
        self.trace.record(
            NegotiationStage::Offer,
            "offer published",
            &self.state,
            serde_json::to_value(&offer).ok(),
        );
        Ok(offer)
    }

    async fn on_finalized(&mut self) -> DispatchOutcome {
        match self.state.finish() {
            Some(done) => {
                tracing::info!(objective = %done.objective, "cycle finalized");
                self.trace.record(
                    NegotiationStage::Finalize,
                    "cycle finalized",
                    &self.state,
                    Some(json!({"objective": done.objective})),
                );
            }
            None => tracing::debug!("finalized while available"),
        }

        let mut discarded = 0;
        while let Some(next) = self.state.next_queued() {
            match self.accept(next).await {
                Ok(offer) => {
                    return DispatchOutcome::Released {
                        offer: Some(Box::new(offer)),
                        discarded,
                    }
                }
                Err(e) => {
                    discarded += 1;
                    self.record_failure("queued demand discarded", &e);
                }
            }
        }
        DispatchOutcome::Released {
            offer: None,
            discarded,
        }
    }

    async fn on_liability(&mut self, liability: Address) -> DispatchOutcome {
        if !self.config.capabilities.liability_resolution {
            tracing::debug!(%liability, "liability resolution disabled");
            return self.ignore(IgnoreReason::LiabilityResolutionDisabled);
        }

        self.state.record_liability(liability);
        match self.answer_liability(liability).await {
            Ok(objective) => {
                tracing::info!(%liability, %objective, "objective published");
                self.trace.record(
                    NegotiationStage::Liability,
                    "objective published",
                    &self.state,
                    Some(json!({"liability": liability.to_checksum(None), "objective": objective})),
                );
                DispatchOutcome::ObjectivePublished {
                    liability,
                    objective,
                }
            }
            Err(e) => self.drop_with(e),
        }
    }

    async fn answer_liability(&self, liability: Address) -> AgentResult<String> {
        let binding = self.resolver.resolve(liability).await?;
        let objective = binding.objective.clone();
        self.send(&self.config.spot_topic, &binding.into_reply()).await?;
        Ok(objective)
    }

    async fn send(&self, topic: &str, message: &OutboundMessage) -> AgentResult<()> {
        let bytes = message.to_bytes()?;
        tracing::debug!(topic, kind = message.kind(), size = bytes.len(), "publishing");
        self.bus.publish(topic, bytes).await?;
        Ok(())
    }

    async fn on_result(&mut self, result: Value) -> DispatchOutcome {
        let forwarded = OutboundMessage::Result { result };
        match self.send(&self.config.provider_topic, &forwarded).await {
            Ok(()) => {
                tracing::info!(topic = %self.config.provider_topic, "result forwarded");
                self.trace.record(NegotiationStage::Relay, "result forwarded", &self.state, None);
                DispatchOutcome::ResultForwarded
            }
            Err(e) => self.drop_with(e),
        }
    }

    fn ignore(&mut self, reason: IgnoreReason) -> DispatchOutcome {
        self.trace.record(
            NegotiationStage::Ignore,
            "message ignored",
            &self.state,
            Some(json!({"reason": reason.as_str()})),
        );
        DispatchOutcome::Ignored(reason)
    }

    fn drop_with(&mut self, error: AgentError) -> DispatchOutcome {
        self.record_failure("message dropped", &error);
        DispatchOutcome::Dropped(error)
    }

    fn record_failure(&mut self, message: &'static str, error: &AgentError) {
        match error {
            AgentError::Parse(_) | AgentError::IdentityMismatch(_) => {}
            _ => tracing::error!(kind = error.kind(), error = %error, "{}", message),
        }
        self.trace.record(
            NegotiationStage::Error,
            message,
            &self.state,
            Some(json!({"kind": error.kind(), "error": error.to_string()})),
        );
    }
}
