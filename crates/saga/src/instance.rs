//! Persisted saga instance.

use chrono::{DateTime, Utc};
use domain::Aggregate;
use serde::{Deserialize, Serialize};
use store::{AggregateId, Version};

use crate::events::SagaEvent;
use crate::message::{CommandEnvelope, CommandWithDestination, CorrelationId};
use crate::state::{Direction, SagaStatus};

/// The command an instance is waiting on a reply for.
///
/// Kept in full so a resend (after a timeout or a restart) emits exactly
/// the same envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingCommand {
    pub correlation_id: CorrelationId,
    pub destination: String,
    pub command_type: String,
    pub payload: serde_json::Value,

    /// Number of sends so far, including the first.
    pub attempts: u32,

    pub first_sent_at: DateTime<Utc>,
    pub last_sent_at: DateTime<Utc>,
}

impl PendingCommand {
    pub fn envelope(&self, reply_channel: &str) -> CommandEnvelope {
        CommandEnvelope {
            correlation_id: self.correlation_id,
            command_type: self.command_type.clone(),
            reply_channel: reply_channel.to_string(),
            payload: self.payload.clone(),
        }
    }
}

/// One execution of a saga definition.
///
/// Owned by the orchestrator and saved after every transition, so a
/// restarted process resumes from the last saved step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaInstance {
    id: Option<AggregateId>,
    #[serde(default)]
    version: Version,
    saga_type: String,
    step_index: usize,
    direction: Direction,
    status: SagaStatus,
    data: serde_json::Value,

    /// Indices of steps that completed forward, in completion order.
    completed_steps: Vec<usize>,

    failed_step: Option<usize>,
    failure_reason: Option<String>,
    pending: Option<PendingCommand>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Aggregate for SagaInstance {
    type Event = SagaEvent;

    fn aggregate_type() -> &'static str {
        "SagaInstance"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn assign_id(&mut self, id: AggregateId) {
        self.id = Some(id);
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

impl SagaInstance {
    /// Creates an unsaved instance at step 0, forward, in progress.
    ///
    /// The id is assigned up front because correlation ids embed it.
    pub fn new(saga_type: impl Into<String>, data: serde_json::Value, now: DateTime<Utc>) -> Self {
        Self {
            id: Some(AggregateId::new()),
            version: Version::initial(),
            saga_type: saga_type.into(),
            step_index: 0,
            direction: Direction::Forward,
            status: SagaStatus::InProgress,
            data,
            completed_steps: Vec::new(),
            failed_step: None,
            failure_reason: None,
            pending: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn saga_id(&self) -> AggregateId {
        // Assigned in `new`; records always carry it
        self.id.unwrap_or_default()
    }

    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn status(&self) -> SagaStatus {
        self.status
    }

    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    pub fn completed_steps(&self) -> &[usize] {
        &self.completed_steps
    }

    pub fn failed_step(&self) -> Option<usize> {
        self.failed_step
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn pending(&self) -> Option<&PendingCommand> {
        self.pending.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn has_completed(&self, step_index: usize) -> bool {
        self.completed_steps.contains(&step_index)
    }
}

// Transitions, driven by the orchestrator
impl SagaInstance {
    pub(crate) fn data_mut(&mut self) -> &mut serde_json::Value {
        &mut self.data
    }

    pub(crate) fn issue(
        &mut self,
        step_index: usize,
        direction: Direction,
        command: CommandWithDestination,
        now: DateTime<Utc>,
    ) -> PendingCommand {
        self.step_index = step_index;
        let pending = PendingCommand {
            correlation_id: CorrelationId::new(self.saga_id(), step_index, direction),
            destination: command.destination,
            command_type: command.command_type,
            payload: command.payload,
            attempts: 1,
            first_sent_at: now,
            last_sent_at: now,
        };
        self.pending = Some(pending.clone());
        self.updated_at = now;
        pending
    }

    /// Records another send of the pending command.
    pub(crate) fn record_resend(&mut self, now: DateTime<Utc>) -> Option<PendingCommand> {
        let pending = self.pending.as_mut()?;
        pending.attempts += 1;
        pending.last_sent_at = now;
        self.updated_at = now;
        Some(pending.clone())
    }

    pub(crate) fn mark_step_completed(&mut self, step_index: usize, now: DateTime<Utc>) {
        if !self.completed_steps.contains(&step_index) {
            self.completed_steps.push(step_index);
        }
        self.pending = None;
        self.step_index = step_index + 1;
        self.updated_at = now;
    }

    pub(crate) fn begin_compensation(
        &mut self,
        failed_step: usize,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.direction = Direction::Compensating;
        self.status = SagaStatus::Compensating;
        self.failed_step = Some(failed_step);
        self.failure_reason = Some(reason.into());
        self.pending = None;
        self.updated_at = now;
    }

    pub(crate) fn note_failure(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.failure_reason = Some(reason.into());
        self.updated_at = now;
    }

    pub(crate) fn complete(&mut self, now: DateTime<Utc>) {
        self.status = SagaStatus::Completed;
        self.pending = None;
        self.updated_at = now;
    }

    pub(crate) fn compensated(&mut self, now: DateTime<Utc>) {
        self.status = SagaStatus::Compensated;
        self.step_index = 0;
        self.pending = None;
        self.updated_at = now;
    }

    /// Marks the instance stuck. The pending command and data are kept for
    /// the operator.
    pub(crate) fn fail(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.status = SagaStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.updated_at = now;
    }
}
