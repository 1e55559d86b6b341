//! Saga lifecycle events, written to the outbox with each instance change.

use domain::DomainEvent;
use serde::{Deserialize, Serialize};

/// Events that occur during saga execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaEvent {
    SagaStarted { saga_type: String },

    /// A forward step completed (or a local step was passed).
    StepCompleted { step_index: usize, step_name: String },

    /// A forward step failed and the walk turned around.
    CompensationStarted { failed_step: usize, reason: String },

    CompensationStepCompleted { step_index: usize, step_name: String },

    SagaCompleted,

    SagaCompensated,

    /// The saga is stuck and needs an operator.
    SagaFailed { reason: String },
}

impl DomainEvent for SagaEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SagaEvent::SagaStarted { .. } => "SagaStarted",
            SagaEvent::StepCompleted { .. } => "StepCompleted",
            SagaEvent::CompensationStarted { .. } => "CompensationStarted",
            SagaEvent::CompensationStepCompleted { .. } => "CompensationStepCompleted",
            SagaEvent::SagaCompleted => "SagaCompleted",
            SagaEvent::SagaCompensated => "SagaCompensated",
            SagaEvent::SagaFailed { .. } => "SagaFailed",
        }
    }
}
