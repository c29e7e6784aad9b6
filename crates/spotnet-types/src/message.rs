//! Bus message codec
//!
//! Inbound payloads carry no type tag; the variant is chosen from the keys
//! present, in this order:
//!
//! | Key present | Variant |
//! |---|---|
//! | `signature` or `lighthouseFee` | [`InboundEvent::OfferSeen`] |
//! | `liability` | [`InboundEvent::LiabilityAssigned`] |
//! | `finalized` (must be `true`) | [`InboundEvent::Finalized`] |
//! | `result` | [`InboundEvent::ResultAvailable`] |
//! | `model` | [`InboundEvent::DemandAnnounced`] |
//! | `objective` | [`InboundEvent::ObjectiveSeen`] |
//!
//! Anything else is a [`TypesError::UnrecognizedShape`].

use alloy_primitives::Address;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::demand::Demand;
use crate::error::{Result, TypesError};
use crate::offer::Offer;
use crate::wire;

/// A classified inbound bus message
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// `{model, objective, token, cost, validator, lighthouse, sender}`
    DemandAnnounced(Demand),
    /// `{finalized: true}`
    Finalized,
    /// `{liability}`
    LiabilityAssigned { liability: Address },
    /// `{result}`, payload kept verbatim
    ResultAvailable { result: Value },
    /// A full signed offer (ours echoed back, or a competitor's)
    OfferSeen(Box<Offer>),
    /// A bare `{objective}` reply
    ObjectiveSeen { objective: String },
}

impl InboundEvent {
    /// Classify raw bus bytes
    pub fn decode(data: &[u8]) -> Result<Self> {
        let value: Value =
            serde_json::from_slice(data).map_err(|e| TypesError::InvalidJson(e.to_string()))?;
        Self::from_value(value)
    }

    /// Classify an already-parsed JSON value
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(fields) = value else {
            return Err(TypesError::NotAnObject);
        };

        if fields.contains_key("signature") || fields.contains_key("lighthouseFee") {
            let offer: Offer = decode_as("offer", fields)?;
            return Ok(Self::OfferSeen(Box::new(offer)));
        }

        if let Some(liability) = fields.get("liability") {
            let text = liability.as_str().ok_or_else(|| invalid("liability", "address must be a string"))?;
            let liability = wire::parse_address(text).map_err(|e| invalid("liability", e))?;
            return Ok(Self::LiabilityAssigned { liability });
        }

        if let Some(finalized) = fields.get("finalized") {
            return match finalized {
                Value::Bool(true) => Ok(Self::Finalized),
                other => Err(invalid("finalized", format!("expected true, got {}", other))),
            };
        }

        if fields.contains_key("result") {
            let mut fields = fields;
            let result = fields.remove("result").unwrap_or(Value::Null);
            return Ok(Self::ResultAvailable { result });
        }

        if fields.contains_key("model") {
            let demand: Demand = decode_as("demand", fields)?;
            return Ok(Self::DemandAnnounced(demand));
        }

        if let Some(objective) = fields.get("objective") {
            let objective = objective
                .as_str()
                .ok_or_else(|| invalid("objective", "objective must be a string"))?;
            return Ok(Self::ObjectiveSeen {
                objective: objective.to_string(),
            });
        }

        let mut keys: Vec<&str> = fields.keys().map(String::as_str).collect();
        keys.sort_unstable();
        Err(TypesError::UnrecognizedShape {
            keys: keys.join(","),
        })
    }

    /// Short name used in logs and traces
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DemandAnnounced(_) => "demand",
            Self::Finalized => "finalized",
            Self::LiabilityAssigned { .. } => "liability",
            Self::ResultAvailable { .. } => "result",
            Self::OfferSeen(_) => "offer",
            Self::ObjectiveSeen { .. } => "objective",
        }
    }
}

fn decode_as<T: serde::de::DeserializeOwned>(
    message: &'static str,
    fields: Map<String, Value>,
) -> Result<T> {
    serde_json::from_value(Value::Object(fields)).map_err(|e| invalid(message, e.to_string()))
}

fn invalid(message: &'static str, reason: impl Into<String>) -> TypesError {
    TypesError::InvalidMessage {
        message,
        reason: reason.into(),
    }
}

/// Messages the agent publishes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Offer(Offer),
    Objective { objective: String },
    Result { result: Value },
}

impl OutboundMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| TypesError::Encode(e.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Offer(_) => "offer",
            Self::Objective { .. } => "objective",
            Self::Result { .. } => "result",
        }
    }
}
