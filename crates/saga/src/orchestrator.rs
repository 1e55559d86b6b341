//! Message-driven saga orchestrator.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use store::AggregateId;

use crate::config::SagaConfig;
use crate::definition::{SagaData, SagaDefinition, SagaRunner};
use crate::error::{Result, SagaError};
use crate::events::SagaEvent;
use crate::gateway::{CommandGateway, MessageTransport};
use crate::instance::{PendingCommand, SagaInstance};
use crate::locks::InstanceLocks;
use crate::message::ReplyEnvelope;
use crate::observer::{NoopObserver, SagaObserver};
use crate::state::{Direction, SagaStatus};
use crate::store::SagaInstanceStore;

/// What `handle_reply` did with a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyDisposition {
    /// The reply advanced the instance.
    Applied,
    Discarded(DiscardReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// No instance with the embedded saga id.
    UnknownSaga,
    /// The instance already finished.
    AlreadyTerminal,
    /// The instance is not waiting on this correlation id (duplicate or late).
    Stale,
    /// The payload did not decode as the step's reply type.
    Malformed,
}

/// Follow-up signals the sweep reports once the transition is saved.
enum SweepAction {
    Resent { step: &'static str, attempt: u32 },
    Escalated { step: &'static str },
}

/// Drives saga instances from replies and timeouts.
///
/// Every transition runs under the instance's lock and is saved before any
/// command it produces is sent, so a crash between the two is repaired by
/// a resend with the same correlation id.
pub struct SagaOrchestrator<S: SagaInstanceStore, T: MessageTransport> {
    store: S,
    gateway: CommandGateway<T>,
    registry: HashMap<&'static str, Arc<dyn SagaRunner>>,
    locks: InstanceLocks,
    config: SagaConfig,
    observer: Arc<dyn SagaObserver>,
}

impl<S: SagaInstanceStore, T: MessageTransport> SagaOrchestrator<S, T> {
    pub fn new(store: S, transport: T, reply_channel: impl Into<String>, config: SagaConfig) -> Self {
        Self {
            store,
            gateway: CommandGateway::new(transport, reply_channel),
            registry: HashMap::new(),
            locks: InstanceLocks::new(),
            config,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SagaObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Makes a definition available to `start` and to reply handling.
    pub fn register<D: SagaData>(&mut self, definition: SagaDefinition<D>) {
        let saga_type = definition.saga_type();
        if self.registry.insert(saga_type, Arc::new(definition)).is_some() {
            tracing::warn!(saga_type, "saga definition replaced");
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn gateway(&self) -> &CommandGateway<T> {
        &self.gateway
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    pub fn observer(&self) -> &Arc<dyn SagaObserver> {
        &self.observer
    }

    pub async fn find(&self, id: AggregateId) -> Result<Option<SagaInstance>> {
        self.store.find(id).await
    }

    /// Creates and saves a new instance, then sends the first command.
    ///
    /// Leading steps without an action are passed immediately. Returns the
    /// saga id; progress continues as replies arrive.
    #[tracing::instrument(skip(self, definition, data), fields(saga_type = definition.saga_type()))]
    pub async fn start<D: SagaData>(
        &self,
        definition: &SagaDefinition<D>,
        data: &D,
    ) -> Result<AggregateId> {
        let runner = self.runner(definition.saga_type())?;
        let now = Utc::now();
        let mut instance = SagaInstance::new(runner.saga_type(), serde_json::to_value(data)?, now);
        let saga_id = instance.saga_id();
        let _guard = self.locks.lock(saga_id).await;

        let mut events = vec![SagaEvent::SagaStarted {
            saga_type: runner.saga_type().to_string(),
        }];
        let next = advance_forward(runner.as_ref(), &mut instance, &mut events, now)?;

        let instance = self.store.save(instance, events.clone()).await?;
        tracing::info!(%saga_id, "saga started");
        self.dispatch(&instance, next).await;
        self.notify(&instance, runner.as_ref(), &events);
        self.release_if_terminal(&instance).await;

        Ok(saga_id)
    }

    /// Applies a participant reply to the instance named by its correlation id.
    ///
    /// Replies for unknown or finished instances, replies whose correlation
    /// id is not the one the instance waits on, and replies that do not
    /// decode are discarded without changing anything.
    #[tracing::instrument(skip(self, reply), fields(correlation_id = %reply.correlation_id, outcome = ?reply.outcome))]
    pub async fn handle_reply(&self, reply: ReplyEnvelope) -> Result<ReplyDisposition> {
        let correlation_id = reply.correlation_id;
        let saga_id = correlation_id.saga_id;
        let _guard = self.locks.lock(saga_id).await;

        let Some(mut instance) = self.store.find(saga_id).await? else {
            return Ok(ReplyDisposition::Discarded(DiscardReason::UnknownSaga));
        };
        if instance.is_terminal() {
            tracing::debug!(status = %instance.status(), "reply for finished saga discarded");
            return Ok(ReplyDisposition::Discarded(DiscardReason::AlreadyTerminal));
        }
        if instance.pending().map(|p| p.correlation_id) != Some(correlation_id) {
            tracing::debug!("stale reply discarded");
            return Ok(ReplyDisposition::Discarded(DiscardReason::Stale));
        }

        let runner = self.runner(instance.saga_type())?;
        let step_index = correlation_id.step_index;
        let step_name = runner.step_name(step_index);
        let now = Utc::now();
        let mut events = Vec::new();

        let next = match (correlation_id.direction, reply.is_success()) {
            (Direction::Forward, true) => {
                match runner.apply_reply(step_index, instance.data_mut(), &reply) {
                    Ok(()) => {}
                    Err(SagaError::ReplyDecode { step, reason }) => {
                        tracing::warn!(%step, %reason, "protocol violation: undecodable reply");
                        self.observer
                            .on_protocol_violation(&format!("reply for step '{step}': {reason}"));
                        return Ok(ReplyDisposition::Discarded(DiscardReason::Malformed));
                    }
                    Err(e) => return Err(e),
                }
                instance.mark_step_completed(step_index, now);
                events.push(SagaEvent::StepCompleted {
                    step_index,
                    step_name: step_name.to_string(),
                });
                advance_forward(runner.as_ref(), &mut instance, &mut events, now)?
            }
            (Direction::Forward, false) => {
                let reason = reply.failure_reason();
                tracing::info!(step = step_name, %reason, "step failed, compensating");
                instance.begin_compensation(step_index, reason.clone(), now);
                events.push(SagaEvent::CompensationStarted {
                    failed_step: step_index,
                    reason,
                });
                continue_compensation(runner.as_ref(), &mut instance, &mut events, step_index, now)?
            }
            (Direction::Compensating, true) => {
                events.push(SagaEvent::CompensationStepCompleted {
                    step_index,
                    step_name: step_name.to_string(),
                });
                continue_compensation(runner.as_ref(), &mut instance, &mut events, step_index, now)?
            }
            (Direction::Compensating, false) => {
                let reason = reply.failure_reason();
                let attempts = instance.pending().map_or(0, |p| p.attempts);
                if attempts >= self.config.max_attempts {
                    let reason = format!("compensation of step '{step_name}' failed: {reason}");
                    instance.fail(reason.clone(), now);
                    events.push(SagaEvent::SagaFailed { reason });
                } else {
                    tracing::warn!(step = step_name, attempts, %reason, "compensation failed, will retry");
                    instance.note_failure(reason, now);
                }
                None
            }
        };

        let instance = self.store.save(instance, events.clone()).await?;
        self.dispatch(&instance, next).await;
        self.notify(&instance, runner.as_ref(), &events);
        self.release_if_terminal(&instance).await;

        Ok(ReplyDisposition::Applied)
    }

    /// Resends or escalates pending commands whose reply is overdue at `now`.
    ///
    /// A command is resent once its backoff has elapsed since the last send.
    /// When the step timeout has elapsed since the first send, or the retry
    /// budget is spent, a forward step is treated as failed and a
    /// compensating step fails the saga. Returns the number of instances
    /// acted on.
    #[tracing::instrument(skip(self))]
    pub async fn process_timeouts(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut handled = 0;

        for candidate in self.store.find_active().await? {
            let saga_id = candidate.saga_id();
            let _guard = self.locks.lock(saga_id).await;

            // Reload under the lock; a reply may have moved it on
            let Some(mut instance) = self.store.find(saga_id).await? else {
                continue;
            };
            if instance.is_terminal() {
                continue;
            }
            let Some(pending) = instance.pending().cloned() else {
                continue;
            };
            let runner = match self.runner(instance.saga_type()) {
                Ok(runner) => runner,
                Err(e) => {
                    tracing::warn!(%saga_id, error = %e, "skipping saga with unregistered type");
                    continue;
                }
            };

            let step_index = pending.correlation_id.step_index;
            let step = runner.step_name(step_index);
            let backoff_elapsed =
                elapsed(pending.last_sent_at, now) >= self.config.backoff(pending.attempts);
            let timed_out = elapsed(pending.first_sent_at, now) >= self.config.step_timeout;
            let exhausted = pending.attempts >= self.config.max_attempts;

            let mut events = Vec::new();
            let (next, action) = if timed_out || (exhausted && backoff_elapsed) {
                let reason = if timed_out {
                    format!("step '{step}' timed out")
                } else {
                    format!("step '{step}' retries exhausted")
                };
                tracing::warn!(%saga_id, step, attempts = pending.attempts, %reason, "no reply");
                let next = match pending.correlation_id.direction {
                    Direction::Forward => {
                        instance.begin_compensation(step_index, reason.clone(), now);
                        events.push(SagaEvent::CompensationStarted {
                            failed_step: step_index,
                            reason,
                        });
                        continue_compensation(runner.as_ref(), &mut instance, &mut events, step_index, now)?
                    }
                    Direction::Compensating => {
                        instance.fail(reason.clone(), now);
                        events.push(SagaEvent::SagaFailed { reason });
                        None
                    }
                };
                (next, SweepAction::Escalated { step })
            } else if backoff_elapsed {
                let Some(resent) = instance.record_resend(now) else {
                    continue;
                };
                let attempt = resent.attempts;
                (Some(resent), SweepAction::Resent { step, attempt })
            } else {
                continue;
            };

            let instance = self.store.save(instance, events.clone()).await?;
            self.dispatch(&instance, next).await;
            match action {
                SweepAction::Resent { step, attempt } => {
                    self.observer.on_step_retried(&instance, step, attempt)
                }
                SweepAction::Escalated { step } => self.observer.on_step_timed_out(&instance, step),
            }
            self.notify(&instance, runner.as_ref(), &events);
            self.release_if_terminal(&instance).await;
            handled += 1;
        }

        Ok(handled)
    }

    /// Resends the pending command of every unfinished instance. Run once at
    /// start-up so commands lost in a crash are delivered.
    #[tracing::instrument(skip(self))]
    pub async fn recover(&self) -> Result<usize> {
        let mut resent = 0;

        for candidate in self.store.find_active().await? {
            let saga_id = candidate.saga_id();
            let _guard = self.locks.lock(saga_id).await;

            let Some(mut instance) = self.store.find(saga_id).await? else {
                continue;
            };
            if instance.is_terminal() {
                continue;
            }
            let Some(pending) = instance.record_resend(Utc::now()) else {
                tracing::warn!(%saga_id, "active saga has no pending command");
                continue;
            };

            let instance = self.store.save(instance, vec![]).await?;
            self.dispatch(&instance, Some(pending)).await;
            resent += 1;
        }

        tracing::info!(resent, "saga recovery complete");
        Ok(resent)
    }

    /// Runs `process_timeouts` every `sweep_interval` until the task is dropped.
    pub async fn run_timeouts(&self) {
        let mut interval = tokio::time::interval(self.config.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Err(e) = self.process_timeouts(Utc::now()).await {
                tracing::error!(error = %e, "timeout sweep failed");
            }
        }
    }

    pub async fn find_by_status(&self, status: SagaStatus) -> Result<Vec<SagaInstance>> {
        self.store.find_by_status(status).await
    }

    fn runner(&self, saga_type: &str) -> Result<Arc<dyn SagaRunner>> {
        self.registry
            .get(saga_type)
            .cloned()
            .ok_or_else(|| SagaError::UnknownSagaType(saga_type.to_string()))
    }

    async fn dispatch(&self, instance: &SagaInstance, next: Option<PendingCommand>) {
        let Some(pending) = next else {
            return;
        };
        if let Err(e) = self.gateway.send(&pending).await {
            // Already saved as pending; the sweep resends it
            tracing::warn!(
                saga_id = %instance.saga_id(),
                correlation_id = %pending.correlation_id,
                error = %e,
                "command send failed"
            );
        }
    }

    fn notify(&self, instance: &SagaInstance, runner: &dyn SagaRunner, events: &[SagaEvent]) {
        for event in events {
            match event {
                SagaEvent::SagaStarted { .. } => self.observer.on_saga_started(instance),
                SagaEvent::StepCompleted { step_name, .. } => {
                    self.observer.on_step_completed(instance, step_name)
                }
                SagaEvent::CompensationStarted { failed_step, reason } => self
                    .observer
                    .on_compensation_started(instance, runner.step_name(*failed_step), reason),
                SagaEvent::CompensationStepCompleted { step_name, .. } => {
                    tracing::debug!(step = %step_name, "compensation step completed")
                }
                SagaEvent::SagaCompleted => {
                    tracing::info!(saga_id = %instance.saga_id(), "saga completed");
                    self.observer.on_saga_completed(instance)
                }
                SagaEvent::SagaCompensated => {
                    tracing::info!(saga_id = %instance.saga_id(), "saga compensated");
                    self.observer.on_saga_compensated(instance)
                }
                SagaEvent::SagaFailed { reason } => {
                    tracing::error!(saga_id = %instance.saga_id(), %reason, "saga failed");
                    self.observer.on_saga_failed(instance, reason)
                }
            }
        }
    }

    async fn release_if_terminal(&self, instance: &SagaInstance) {
        if instance.is_terminal() {
            self.locks.remove(instance.saga_id()).await;
        }
    }
}

/// Moves forward from the current step: passes steps without an action and
/// issues the first command found. Completes the saga past the last step.
fn advance_forward(
    runner: &dyn SagaRunner,
    instance: &mut SagaInstance,
    events: &mut Vec<SagaEvent>,
    now: DateTime<Utc>,
) -> Result<Option<PendingCommand>> {
    loop {
        let index = instance.step_index();
        if index >= runner.step_count() {
            instance.complete(now);
            events.push(SagaEvent::SagaCompleted);
            return Ok(None);
        }

        match runner.forward_command(index, instance.data())? {
            Some(command) => {
                return Ok(Some(instance.issue(index, Direction::Forward, command, now)));
            }
            None => {
                instance.mark_step_completed(index, now);
                events.push(SagaEvent::StepCompleted {
                    step_index: index,
                    step_name: runner.step_name(index).to_string(),
                });
            }
        }
    }
}

/// Issues the compensation of the nearest completed step below `from`, or
/// marks the saga compensated when none is left.
fn continue_compensation(
    runner: &dyn SagaRunner,
    instance: &mut SagaInstance,
    events: &mut Vec<SagaEvent>,
    from: usize,
    now: DateTime<Utc>,
) -> Result<Option<PendingCommand>> {
    for index in (0..from).rev() {
        if !instance.has_completed(index) {
            continue;
        }
        if let Some(command) = runner.compensation_command(index, instance.data())? {
            return Ok(Some(instance.issue(index, Direction::Compensating, command, now)));
        }
    }

    instance.compensated(now);
    events.push(SagaEvent::SagaCompensated);
    Ok(None)
}

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}
