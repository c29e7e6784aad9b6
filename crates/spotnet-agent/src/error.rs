//! Agent error taxonomy

use spotnet_bus::BusError;
use spotnet_chain::ChainError;
use spotnet_crypto::CryptoError;
use spotnet_types::TypesError;
use thiserror::Error;

/// Why a single inbound event could not be acted on.
///
/// None of these are fatal: the agent logs them and keeps serving.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Parse error: {0}")]
    Parse(#[from] TypesError),

    #[error("Identity mismatch: {0}")]
    IdentityMismatch(String),

    #[error("Chain call failed: {0}")]
    ChainCall(#[from] ChainError),

    #[error("Signing failed: {0}")]
    Signing(#[from] CryptoError),

    #[error("Publish failed: {0}")]
    Publish(#[from] BusError),

    #[error("{0} overflows uint256")]
    Overflow(&'static str),
}

impl AgentError {
    /// Short name used in logs and traces
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parse",
            Self::IdentityMismatch(_) => "identity_mismatch",
            Self::ChainCall(_) => "chain_call",
            Self::Signing(_) => "signing",
            Self::Publish(_) => "publish",
            Self::Overflow(_) => "overflow",
        }
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
