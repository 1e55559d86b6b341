//! Saga error types.

use domain::DomainError;
use store::AggregateId;
use thiserror::Error;

/// Errors that can occur during saga operations.
///
/// Participant failures are not errors: they arrive as FAILURE replies and
/// drive compensation.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A saga definition is malformed.
    #[error("Invalid saga definition: {0}")]
    InvalidDefinition(String),

    /// No definition is registered for the saga type.
    #[error("Unknown saga type: {0}")]
    UnknownSagaType(String),

    /// Domain error (persistence of the saga instance).
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The message transport refused a message.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed correlation id: {0:?}")]
    MalformedCorrelationId(String),

    /// A reply payload did not match what the step expects.
    #[error("Reply for step '{step}' could not be decoded: {reason}")]
    ReplyDecode { step: String, reason: String },

    #[error("Saga instance not found: {0}")]
    NotFound(AggregateId),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
