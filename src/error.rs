use rust_decimal::Decimal;
use thiserror::Error;

use crate::broker::gateway::BrokerError;

/// Coarse class used for dispatch decisions: retry, surface, or escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    Retryable,
    NonFatal,
    Fatal,
    Network,
    Mismatch,
    Critical,
}

/// Engine-level error taxonomy. Every failure crossing a component boundary
/// is one of these; nothing is signalled by panic.
#[derive(Error, Debug, Clone)]
pub enum TradeError {
    /// Rejected before any venue call was made.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Venue rejected the request with a coded status.
    #[error("broker rejected ({class:?}, retcode {retcode}): {description}")]
    Rejected {
        class: ErrorClass,
        retcode: u32,
        description: String,
    },

    /// Transport failure: timeout, connection loss, unreachable bridge.
    #[error("network error: {0}")]
    Network(String),

    /// The broker answered, but the response was missing attributes that a
    /// well-formed result must carry. Never inferred as success.
    #[error("malformed broker result: {0}")]
    Malformed(String),

    /// The live position drifted from the submitted intent beyond tolerance.
    /// The defensive close has already been dispatched by the time the
    /// caller sees this.
    #[error("position {ticket} mismatch on {field}: expected {expected}, observed {observed}")]
    Mismatch {
        ticket: u64,
        field: &'static str,
        expected: Decimal,
        observed: Decimal,
    },

    /// Unrecoverable state. The circuit breaker has been engaged.
    #[error("critical failure: {0}")]
    Critical(String),
}

impl TradeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            TradeError::Validation(_) => ErrorClass::Validation,
            TradeError::Rejected { class, .. } => *class,
            TradeError::Network(_) => ErrorClass::Network,
            TradeError::Malformed(_) => ErrorClass::NonFatal,
            TradeError::Mismatch { .. } => ErrorClass::Mismatch,
            TradeError::Critical(_) => ErrorClass::Critical,
        }
    }

    /// True when a fresh-price resubmission is worth attempting.
    pub fn is_retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::Retryable | ErrorClass::Network)
    }
}

impl From<BrokerError> for TradeError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Network(msg) => TradeError::Network(msg),
            BrokerError::Malformed(msg) => TradeError::Malformed(msg),
            BrokerError::Api(msg) => TradeError::Network(msg),
        }
    }
}
