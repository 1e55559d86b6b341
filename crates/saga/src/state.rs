//! Saga status and walk direction.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The status of a saga instance.
///
/// State transitions:
/// ```text
/// IN_PROGRESS ──┬──► COMPLETED
///               └──► COMPENSATING ──┬──► COMPENSATED
///                                   └──► FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStatus {
    /// Forward steps are being executed.
    #[default]
    InProgress,

    /// All steps completed successfully (terminal state).
    Completed,

    /// A step failed and compensations are being sent.
    Compensating,

    /// Every completed step was undone (terminal state).
    Compensated,

    /// A compensation could not be delivered; needs an operator (terminal state).
    Failed,
}

impl SagaStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaStatus::Completed | SagaStatus::Compensated | SagaStatus::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::InProgress => "IN_PROGRESS",
            SagaStatus::Completed => "COMPLETED",
            SagaStatus::Compensating => "COMPENSATING",
            SagaStatus::Compensated => "COMPENSATED",
            SagaStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SagaStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "IN_PROGRESS" => Ok(SagaStatus::InProgress),
            "COMPLETED" => Ok(SagaStatus::Completed),
            "COMPENSATING" => Ok(SagaStatus::Compensating),
            "COMPENSATED" => Ok(SagaStatus::Compensated),
            "FAILED" => Ok(SagaStatus::Failed),
            other => Err(format!("unknown saga status: {other}")),
        }
    }
}

/// Which way the instance is walking its steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    #[default]
    Forward,
    Compensating,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Compensating => "compensating",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forward" => Ok(Direction::Forward),
            "compensating" => Ok(Direction::Compensating),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}
