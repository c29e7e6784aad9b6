//! Spotnet Types - canonical data model for the provider negotiation agent
//!
//! This crate defines the messages exchanged on the pubsub bus:
//! - [`Demand`] announcements published by requesters
//! - signed [`Offer`]s published by the provider agent
//! - liability assignment, finalization and result notices
//!
//! All amounts are carried as 256-bit unsigned integers and all addresses as
//! 20-byte values, so nothing is truncated between the bus and the chain.

pub mod demand;
pub mod error;
pub mod liability;
pub mod message;
pub mod offer;
pub mod wire;

pub use alloy_primitives::{Address, U256};

pub use demand::Demand;
pub use error::{Result, TypesError};
pub use liability::LiabilityBinding;
pub use message::{InboundEvent, OutboundMessage};
pub use offer::{Offer, OfferTerms, Signature, SIGNATURE_LENGTH};
