//! Command and reply envelopes exchanged with saga participants.

use std::str::FromStr;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use store::AggregateId;

use crate::error::SagaError;
use crate::state::Direction;

/// Links a command to its reply: which instance, which step, which way.
///
/// The direction tag keeps a late forward reply from being taken for the
/// reply to that step's compensation. Serialized as
/// `"{saga_id}/{step_index}/{direction}"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct CorrelationId {
    pub saga_id: AggregateId,
    pub step_index: usize,
    pub direction: Direction,
}

impl CorrelationId {
    pub fn new(saga_id: AggregateId, step_index: usize, direction: Direction) -> Self {
        Self {
            saga_id,
            step_index,
            direction,
        }
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.saga_id, self.step_index, self.direction)
    }
}

impl FromStr for CorrelationId {
    type Err = SagaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || SagaError::MalformedCorrelationId(s.to_string());
        let mut parts = s.split('/');
        let (Some(saga_id), Some(step_index), Some(direction), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };

        Ok(Self {
            saga_id: saga_id.parse().map_err(|_| malformed())?,
            step_index: step_index.parse().map_err(|_| malformed())?,
            direction: direction.parse().map_err(|_| malformed())?,
        })
    }
}

impl From<CorrelationId> for String {
    fn from(id: CorrelationId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for CorrelationId {
    type Error = SagaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    Failure,
}

/// A command a saga sends to a participant.
pub trait SagaCommand: Serialize {
    fn command_type(&self) -> &'static str;
}

/// A command addressed to a participant channel, before correlation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandWithDestination {
    pub destination: String,
    pub command_type: String,
    pub payload: serde_json::Value,
}

impl CommandWithDestination {
    pub fn new<C: SagaCommand>(
        destination: impl Into<String>,
        command: &C,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            destination: destination.into(),
            command_type: command.command_type().to_string(),
            payload: serde_json::to_value(command)?,
        })
    }
}

/// Engine → participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub correlation_id: CorrelationId,
    pub command_type: String,

    /// Where the participant must send its reply.
    pub reply_channel: String,

    pub payload: serde_json::Value,
}

impl CommandEnvelope {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Deserializes the command payload.
    pub fn decode<C: DeserializeOwned>(&self) -> Result<C, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Participant → engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    pub correlation_id: CorrelationId,
    pub outcome: Outcome,
    pub reply_type: String,
    pub payload: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct FailurePayload {
    reason: String,
}

impl ReplyEnvelope {
    /// A success reply carrying a typed payload.
    pub fn success<R: Serialize>(
        correlation_id: CorrelationId,
        reply_type: impl Into<String>,
        reply: &R,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            correlation_id,
            outcome: Outcome::Success,
            reply_type: reply_type.into(),
            payload: serde_json::to_value(reply)?,
        })
    }

    /// A success reply with no payload.
    pub fn success_empty(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            outcome: Outcome::Success,
            reply_type: "Success".to_string(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn failure(correlation_id: CorrelationId, reason: impl Into<String>) -> Self {
        Self {
            correlation_id,
            outcome: Outcome::Failure,
            reply_type: "Failure".to_string(),
            payload: serde_json::json!({ "reason": reason.into() }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// The reason carried by a failure reply.
    pub fn failure_reason(&self) -> String {
        serde_json::from_value::<FailurePayload>(self.payload.clone())
            .map(|p| p.reason)
            .unwrap_or_else(|_| format!("{} reply", self.reply_type))
    }

    pub fn decode<R: DeserializeOwned>(&self) -> Result<R, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
