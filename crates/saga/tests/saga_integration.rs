//! Integration tests for the saga orchestration engine.

use std::time::Duration;

use chrono::{DateTime, Utc};
use saga::{
    CommandEnvelope, DiscardReason, Direction, InMemoryTransport, RecordSagaInstanceStore,
    ReplyDispatcher, ReplyDisposition, ReplyEnvelope, SagaCommand, SagaConfig, SagaDefinition,
    SagaInstanceStore, SagaOrchestrator, SagaStatus, Step,
};
use serde::{Deserialize, Serialize};
use store::{AggregateId, InMemoryRecordStore, RecordStore};

const PARTICIPANT: &str = "participant";
const REPLIES: &str = "replies";

type TestOrchestrator =
    SagaOrchestrator<RecordSagaInstanceStore<InMemoryRecordStore>, InMemoryTransport>;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct TripData {
    trip_id: u32,
    booking: Option<String>,
}

#[derive(Serialize)]
struct TestCommand {
    name: &'static str,
    trip_id: u32,
}

impl SagaCommand for TestCommand {
    fn command_type(&self) -> &'static str {
        self.name
    }
}

#[derive(Serialize, Deserialize)]
struct Booked {
    reference: String,
}

/// A step sending `name` forward and, if given, `compensation` on unwind.
fn step(name: &'static str, compensation: Option<&'static str>) -> Step<TripData> {
    let step = Step::new(name).invoke(PARTICIPANT, move |d: &TripData| TestCommand {
        name,
        trip_id: d.trip_id,
    });
    match compensation {
        Some(c) => step.with_compensation(PARTICIPANT, move |d: &TripData| TestCommand {
            name: c,
            trip_id: d.trip_id,
        }),
        None => step,
    }
}

/// A step with no command of its own, only a compensation.
fn local_step(name: &'static str, compensation: &'static str) -> Step<TripData> {
    Step::new(name).with_compensation(PARTICIPANT, move |d: &TripData| TestCommand {
        name: compensation,
        trip_id: d.trip_id,
    })
}

struct TestHarness {
    records: InMemoryRecordStore,
    transport: InMemoryTransport,
    orchestrator: TestOrchestrator,
    definition: SagaDefinition<TripData>,
}

impl TestHarness {
    fn new(steps: Vec<Step<TripData>>) -> Self {
        Self::with_config(steps, SagaConfig::default())
    }

    fn with_config(steps: Vec<Step<TripData>>, config: SagaConfig) -> Self {
        let records = InMemoryRecordStore::new();
        let transport = InMemoryTransport::recording();
        let definition = SagaDefinition::new("TripSaga", steps).unwrap();
        let orchestrator = Self::orchestrator(&records, &transport, &definition, config);

        Self {
            records,
            transport,
            orchestrator,
            definition,
        }
    }

    fn orchestrator(
        records: &InMemoryRecordStore,
        transport: &InMemoryTransport,
        definition: &SagaDefinition<TripData>,
        config: SagaConfig,
    ) -> TestOrchestrator {
        let mut orchestrator = SagaOrchestrator::new(
            RecordSagaInstanceStore::new(records.clone()),
            transport.clone(),
            REPLIES,
            config,
        );
        orchestrator.register(definition.clone());
        orchestrator
    }

    async fn start(&self) -> AggregateId {
        self.orchestrator
            .start(&self.definition, &TripData { trip_id: 7, booking: None })
            .await
            .unwrap()
    }

    async fn commands(&self) -> Vec<CommandEnvelope> {
        self.transport.commands(PARTICIPANT).await
    }

    async fn command_names(&self) -> Vec<String> {
        self.commands()
            .await
            .into_iter()
            .map(|c| c.command_type)
            .collect()
    }

    async fn last_command(&self) -> CommandEnvelope {
        self.commands().await.pop().expect("no command sent")
    }

    async fn succeed(&self) -> ReplyDisposition {
        let command = self.last_command().await;
        self.orchestrator
            .handle_reply(ReplyEnvelope::success_empty(command.correlation_id))
            .await
            .unwrap()
    }

    async fn fail(&self, reason: &str) -> ReplyDisposition {
        let command = self.last_command().await;
        self.orchestrator
            .handle_reply(ReplyEnvelope::failure(command.correlation_id, reason))
            .await
            .unwrap()
    }

    async fn instance(&self, id: AggregateId) -> saga::SagaInstance {
        self.orchestrator.find(id).await.unwrap().unwrap()
    }

    async fn first_sent_at(&self, id: AggregateId) -> DateTime<Utc> {
        self.instance(id).await.pending().unwrap().first_sent_at
    }
}

fn after(t: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    t + chrono::Duration::from_std(d).unwrap()
}

mod forward {
    use super::*;

    #[tokio::test]
    async fn test_steps_run_in_order_to_completion() {
        let h = TestHarness::new(vec![step("a1", Some("c1")), step("a2", None), step("a3", None)]);
        let id = h.start().await;

        assert_eq!(h.command_names().await, ["a1"]);
        assert_eq!(h.succeed().await, ReplyDisposition::Applied);
        assert_eq!(h.succeed().await, ReplyDisposition::Applied);
        assert_eq!(h.succeed().await, ReplyDisposition::Applied);

        let instance = h.instance(id).await;
        assert_eq!(instance.status(), SagaStatus::Completed);
        assert_eq!(instance.completed_steps(), &[0, 1, 2]);
        assert!(instance.pending().is_none());
        assert_eq!(h.command_names().await, ["a1", "a2", "a3"]);
    }

    #[tokio::test]
    async fn test_commands_carry_reply_channel_and_direction() {
        let h = TestHarness::new(vec![step("a1", None)]);
        let id = h.start().await;

        let command = h.last_command().await;
        assert_eq!(command.reply_channel, REPLIES);
        assert_eq!(command.correlation_id.saga_id, id);
        assert_eq!(command.correlation_id.step_index, 0);
        assert_eq!(command.correlation_id.direction, Direction::Forward);
        assert_eq!(command.payload["trip_id"], 7);
    }

    #[tokio::test]
    async fn test_local_steps_are_passed_without_a_command() {
        let h = TestHarness::new(vec![local_step("create", "reject"), step("a2", None)]);
        let id = h.start().await;

        let instance = h.instance(id).await;
        assert_eq!(instance.completed_steps(), &[0]);
        assert_eq!(instance.step_index(), 1);
        assert_eq!(h.command_names().await, ["a2"]);
    }

    #[tokio::test]
    async fn test_reply_handler_updates_saga_data() {
        let h = TestHarness::new(vec![
            step("book", None).on_reply(|d: &mut TripData, r: Booked| d.booking = Some(r.reference)),
            step("confirm", None),
        ]);
        let id = h.start().await;
        let command = h.last_command().await;

        h.orchestrator
            .handle_reply(
                ReplyEnvelope::success(
                    command.correlation_id,
                    "Booked",
                    &Booked {
                        reference: "BK-1".to_string(),
                    },
                )
                .unwrap(),
            )
            .await
            .unwrap();

        let instance = h.instance(id).await;
        assert_eq!(instance.data()["booking"], "BK-1");
        assert_eq!(instance.step_index(), 1);
    }

    #[tokio::test]
    async fn test_lifecycle_events_are_written_to_outbox() {
        let h = TestHarness::new(vec![step("a1", None), step("a2", None)]);
        let id = h.start().await;
        h.succeed().await;
        h.succeed().await;

        let types: Vec<String> = h
            .records
            .get_events_for_aggregate(id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect();

        assert_eq!(
            types,
            ["SagaStarted", "StepCompleted", "StepCompleted", "SagaCompleted"]
        );
    }
}

mod compensation {
    use super::*;

    #[tokio::test]
    async fn test_only_completed_steps_with_compensations_are_undone() {
        let h = TestHarness::new(vec![step("s1", Some("c1")), step("s2", None), step("s3", Some("c3"))]);
        let id = h.start().await;
        h.succeed().await;
        h.succeed().await;

        h.fail("declined").await;

        let instance = h.instance(id).await;
        assert_eq!(instance.status(), SagaStatus::Compensating);
        assert_eq!(instance.direction(), Direction::Compensating);
        assert_eq!(instance.failed_step(), Some(2));
        assert_eq!(instance.failure_reason(), Some("declined"));
        assert_eq!(h.command_names().await, ["s1", "s2", "s3", "c1"]);

        h.succeed().await;

        let instance = h.instance(id).await;
        assert_eq!(instance.status(), SagaStatus::Compensated);
        assert_eq!(h.command_names().await, ["s1", "s2", "s3", "c1"]);
    }

    #[tokio::test]
    async fn test_compensations_run_in_reverse_completion_order() {
        let h = TestHarness::new(vec![
            step("s1", Some("c1")),
            step("s2", None),
            step("s3", Some("c3")),
            step("s4", Some("c4")),
        ]);
        let id = h.start().await;
        h.succeed().await;
        h.succeed().await;
        h.succeed().await;

        h.fail("out of stock").await;
        let compensating = h.last_command().await;
        assert_eq!(compensating.command_type, "c3");
        assert_eq!(compensating.correlation_id.direction, Direction::Compensating);
        assert_eq!(compensating.correlation_id.step_index, 2);

        h.succeed().await;
        assert_eq!(h.last_command().await.command_type, "c1");

        h.succeed().await;
        assert_eq!(h.instance(id).await.status(), SagaStatus::Compensated);
        assert_eq!(
            h.command_names().await,
            ["s1", "s2", "s3", "s4", "c3", "c1"]
        );
    }

    #[tokio::test]
    async fn test_failure_of_first_step_compensates_immediately() {
        let h = TestHarness::new(vec![step("s1", Some("c1")), step("s2", Some("c2"))]);
        let id = h.start().await;

        h.fail("nope").await;

        let instance = h.instance(id).await;
        assert_eq!(instance.status(), SagaStatus::Compensated);
        assert_eq!(h.command_names().await, ["s1"]);
    }

    #[tokio::test]
    async fn test_local_step_compensation_is_sent() {
        let h = TestHarness::new(vec![local_step("create", "reject"), step("s2", None)]);
        let id = h.start().await;

        h.fail("consumer invalid").await;

        assert_eq!(h.command_names().await, ["s2", "reject"]);
        h.succeed().await;
        assert_eq!(h.instance(id).await.status(), SagaStatus::Compensated);
    }

    #[tokio::test]
    async fn test_compensation_failures_are_retried_then_fail_the_saga() {
        let config = SagaConfig {
            max_attempts: 2,
            ..SagaConfig::default()
        };
        let h = TestHarness::with_config(vec![step("s1", Some("c1")), step("s2", None)], config);
        let id = h.start().await;
        h.succeed().await;
        h.fail("declined").await;

        h.fail("ledger unavailable").await;
        let instance = h.instance(id).await;
        assert_eq!(instance.status(), SagaStatus::Compensating);
        assert_eq!(instance.pending().unwrap().attempts, 1);

        let last_sent = instance.pending().unwrap().last_sent_at;
        let resent = h
            .orchestrator
            .process_timeouts(after(last_sent, config.backoff(1)))
            .await
            .unwrap();
        assert_eq!(resent, 1);
        assert_eq!(h.command_names().await, ["s1", "s2", "c1", "c1"]);

        h.fail("ledger unavailable").await;

        let instance = h.instance(id).await;
        assert_eq!(instance.status(), SagaStatus::Failed);
        assert!(instance.failure_reason().unwrap().contains("ledger unavailable"));
        assert_eq!(instance.data()["trip_id"], 7);
        assert!(instance.pending().is_some());
    }
}

mod idempotence {
    use super::*;

    #[tokio::test]
    async fn test_replayed_reply_is_a_no_op() {
        let h = TestHarness::new(vec![step("a1", None), step("a2", None)]);
        let id = h.start().await;
        let first = h.last_command().await;
        let reply = ReplyEnvelope::success_empty(first.correlation_id);

        let applied = h.orchestrator.handle_reply(reply.clone()).await.unwrap();
        let after_first = h.instance(id).await;
        let replayed = h.orchestrator.handle_reply(reply).await.unwrap();
        let after_second = h.instance(id).await;

        assert_eq!(applied, ReplyDisposition::Applied);
        assert_eq!(replayed, ReplyDisposition::Discarded(DiscardReason::Stale));
        assert_eq!(after_first, after_second);
        assert_eq!(h.command_names().await, ["a1", "a2"]);
    }

    #[tokio::test]
    async fn test_late_reply_cannot_reopen_finished_saga() {
        let h = TestHarness::new(vec![step("a1", Some("c1"))]);
        let id = h.start().await;
        let command = h.last_command().await;
        h.succeed().await;

        let late = h
            .orchestrator
            .handle_reply(ReplyEnvelope::failure(command.correlation_id, "too late"))
            .await
            .unwrap();

        assert_eq!(late, ReplyDisposition::Discarded(DiscardReason::AlreadyTerminal));
        assert_eq!(h.instance(id).await.status(), SagaStatus::Completed);
    }

    #[tokio::test]
    async fn test_reply_for_unknown_saga_is_discarded() {
        let h = TestHarness::new(vec![step("a1", None)]);
        let stray = saga::CorrelationId::new(AggregateId::new(), 0, Direction::Forward);

        let disposition = h
            .orchestrator
            .handle_reply(ReplyEnvelope::success_empty(stray))
            .await
            .unwrap();

        assert_eq!(disposition, ReplyDisposition::Discarded(DiscardReason::UnknownSaga));
    }

    #[tokio::test]
    async fn test_undecodable_reply_leaves_instance_untouched() {
        let h = TestHarness::new(vec![
            step("book", None).on_reply(|d: &mut TripData, r: Booked| d.booking = Some(r.reference)),
        ]);
        let id = h.start().await;
        let before = h.instance(id).await;

        let disposition = h.succeed().await;

        assert_eq!(disposition, ReplyDisposition::Discarded(DiscardReason::Malformed));
        assert_eq!(h.instance(id).await, before);
    }
}

mod recovery {
    use super::*;

    #[tokio::test]
    async fn test_restarted_orchestrator_resumes_from_saved_step() {
        let h = TestHarness::new(vec![step("s1", Some("c1")), step("s2", None), step("s3", None)]);
        let id = h.start().await;
        h.succeed().await;
        let before = h.instance(id).await;

        // New process over the same storage and transport
        let restarted = TestHarness::orchestrator(
            &h.records,
            &h.transport,
            &h.definition,
            SagaConfig::default(),
        );
        let reloaded = restarted.find(id).await.unwrap().unwrap();
        assert_eq!(reloaded.step_index(), before.step_index());
        assert_eq!(reloaded.direction(), before.direction());
        assert_eq!(reloaded.data(), before.data());

        let resent = restarted.recover().await.unwrap();
        assert_eq!(resent, 1);

        let messages = h.transport.messages(PARTICIPANT).await;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1], messages[2]);

        let command = h.last_command().await;
        restarted
            .handle_reply(ReplyEnvelope::success_empty(command.correlation_id))
            .await
            .unwrap();
        let command = h.last_command().await;
        assert_eq!(command.command_type, "s3");
        restarted
            .handle_reply(ReplyEnvelope::success_empty(command.correlation_id))
            .await
            .unwrap();

        assert_eq!(
            restarted.find(id).await.unwrap().unwrap().status(),
            SagaStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_recover_skips_finished_sagas() {
        let h = TestHarness::new(vec![step("s1", None)]);
        h.start().await;
        h.succeed().await;

        assert_eq!(h.orchestrator.recover().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_send_failure_is_repaired_by_sweep() {
        let h = TestHarness::new(vec![step("s1", None)]);
        h.transport.set_fail_on_publish(true).await;
        let id = h.start().await;
        assert!(h.commands().await.is_empty());

        h.transport.set_fail_on_publish(false).await;
        let first = h.first_sent_at(id).await;
        h.orchestrator
            .process_timeouts(after(first, Duration::from_millis(500)))
            .await
            .unwrap();

        assert_eq!(h.command_names().await, ["s1"]);
    }
}

mod timeouts {
    use super::*;

    #[tokio::test]
    async fn test_nothing_happens_before_backoff() {
        let h = TestHarness::new(vec![step("s1", None)]);
        let id = h.start().await;
        let first = h.first_sent_at(id).await;

        let handled = h
            .orchestrator
            .process_timeouts(after(first, Duration::from_millis(100)))
            .await
            .unwrap();

        assert_eq!(handled, 0);
        assert_eq!(h.commands().await.len(), 1);
    }

    #[tokio::test]
    async fn test_overdue_command_is_resent_with_same_correlation_id() {
        let h = TestHarness::new(vec![step("s1", None)]);
        let id = h.start().await;
        let first = h.first_sent_at(id).await;

        let handled = h
            .orchestrator
            .process_timeouts(after(first, Duration::from_millis(600)))
            .await
            .unwrap();

        assert_eq!(handled, 1);
        let commands = h.commands().await;
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0], commands[1]);
        assert_eq!(h.instance(id).await.pending().unwrap().attempts, 2);
    }

    #[tokio::test]
    async fn test_step_timeout_starts_compensation() {
        let h = TestHarness::new(vec![step("s1", Some("c1")), step("s2", None)]);
        let id = h.start().await;
        h.succeed().await;
        let first = h.first_sent_at(id).await;

        h.orchestrator
            .process_timeouts(after(first, Duration::from_secs(31)))
            .await
            .unwrap();

        let instance = h.instance(id).await;
        assert_eq!(instance.status(), SagaStatus::Compensating);
        assert_eq!(instance.failed_step(), Some(1));
        assert!(instance.failure_reason().unwrap().contains("timed out"));
        assert_eq!(h.command_names().await, ["s1", "s2", "c1"]);
    }

    #[tokio::test]
    async fn test_compensation_timeout_fails_saga() {
        let h = TestHarness::new(vec![step("s1", Some("c1")), step("s2", None)]);
        let id = h.start().await;
        h.succeed().await;
        h.fail("declined").await;
        let first = h.first_sent_at(id).await;

        h.orchestrator
            .process_timeouts(after(first, Duration::from_secs(31)))
            .await
            .unwrap();

        let instance = h.instance(id).await;
        assert_eq!(instance.status(), SagaStatus::Failed);
        assert_eq!(instance.pending().unwrap().command_type, "c1");

        // A failed saga is left alone by later sweeps
        let handled = h
            .orchestrator
            .process_timeouts(after(first, Duration::from_secs(120)))
            .await
            .unwrap();
        assert_eq!(handled, 0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_escalate_to_compensation() {
        let config = SagaConfig {
            max_attempts: 2,
            ..SagaConfig::default()
        };
        let h = TestHarness::with_config(vec![step("s1", Some("c1"))], config);
        let id = h.start().await;
        let first = h.first_sent_at(id).await;

        let resend_at = after(first, config.backoff(1));
        h.orchestrator.process_timeouts(resend_at).await.unwrap();
        assert_eq!(h.instance(id).await.pending().unwrap().attempts, 2);

        h.orchestrator
            .process_timeouts(after(resend_at, config.backoff(2)))
            .await
            .unwrap();

        let instance = h.instance(id).await;
        assert_eq!(instance.status(), SagaStatus::Compensated);
        assert!(instance.failure_reason().unwrap().contains("retries exhausted"));
        assert_eq!(h.command_names().await, ["s1", "s1"]);
    }
}

mod dispatcher {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_malformed_messages_do_not_stop_dispatcher() {
        let records = InMemoryRecordStore::new();
        let transport = InMemoryTransport::recording();
        let definition = SagaDefinition::new("TripSaga", vec![step("s1", None)]).unwrap();
        let orchestrator = Arc::new(TestHarness::orchestrator(
            &records,
            &transport,
            &definition,
            SagaConfig::default(),
        ));
        let id = orchestrator
            .start(&definition, &TripData::default())
            .await
            .unwrap();
        let command = transport.commands(PARTICIPANT).await.remove(0);

        let dispatcher = ReplyDispatcher::new(orchestrator.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(dispatcher.run(rx));

        tx.send(b"not json".to_vec()).unwrap();
        tx.send(br#"{"correlation_id":"bogus","outcome":"SUCCESS","reply_type":"x","payload":null}"#.to_vec())
            .unwrap();
        tx.send(
            ReplyEnvelope::success_empty(command.correlation_id)
                .to_bytes()
                .unwrap(),
        )
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        let instance = orchestrator.find(id).await.unwrap().unwrap();
        assert_eq!(instance.status(), SagaStatus::Completed);
    }

    #[tokio::test]
    async fn test_on_message_reports_disposition() {
        let h = TestHarness::new(vec![step("s1", None)]);
        h.start().await;
        let command = h.last_command().await;
        let dispatcher = ReplyDispatcher::new(Arc::new(h.orchestrator));
        let bytes = ReplyEnvelope::success_empty(command.correlation_id)
            .to_bytes()
            .unwrap();

        assert_eq!(dispatcher.on_message(b"{}").await, None);
        assert_eq!(
            dispatcher.on_message(&bytes).await,
            Some(ReplyDisposition::Applied)
        );
        assert_eq!(
            dispatcher.on_message(&bytes).await,
            Some(ReplyDisposition::Discarded(DiscardReason::AlreadyTerminal))
        );
    }
}

mod store_queries {
    use super::*;

    #[tokio::test]
    async fn test_failed_sagas_are_listed_for_operators() {
        let h = TestHarness::new(vec![step("s1", Some("c1")), step("s2", None)]);
        let id = h.start().await;
        h.succeed().await;
        h.fail("declined").await;
        let first = h.first_sent_at(id).await;
        h.orchestrator
            .process_timeouts(after(first, Duration::from_secs(31)))
            .await
            .unwrap();

        let failed = h
            .orchestrator
            .store()
            .find_by_status(SagaStatus::Failed)
            .await
            .unwrap();

        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].saga_id(), id);
    }
}

mod concurrency {
    use super::*;
    use std::sync::Arc;

    const DELIVERIES: usize = 16;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_reply_delivered_concurrently_applies_once() {
        let h = Arc::new(TestHarness::new(vec![step("a1", None), step("a2", None)]));
        let id = h.start().await;
        let reply = ReplyEnvelope::success_empty(h.last_command().await.correlation_id);

        let tasks: Vec<_> = (0..DELIVERIES)
            .map(|_| {
                let h = h.clone();
                let reply = reply.clone();
                tokio::spawn(async move { h.orchestrator.handle_reply(reply).await })
            })
            .collect();
        let mut dispositions = Vec::new();
        for task in tasks {
            dispositions.push(task.await.unwrap().unwrap());
        }

        let applied = dispositions
            .iter()
            .filter(|d| **d == ReplyDisposition::Applied)
            .count();
        let stale = dispositions
            .iter()
            .filter(|d| **d == ReplyDisposition::Discarded(DiscardReason::Stale))
            .count();
        assert_eq!(applied, 1);
        assert_eq!(stale, DELIVERIES - 1);
        assert_eq!(h.command_names().await, ["a1", "a2"]);

        let instance = h.instance(id).await;
        assert_eq!(instance.completed_steps(), &[0]);
        assert_eq!(instance.pending().unwrap().attempts, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reply_racing_sweep_keeps_sends_and_attempts_in_step() {
        for _ in 0..20 {
            let h = Arc::new(TestHarness::new(vec![step("a1", None), step("a2", None)]));
            let id = h.start().await;
            let reply = ReplyEnvelope::success_empty(h.last_command().await.correlation_id);
            // Past the first backoff, well before the step timeout
            let sweep_at = after(h.first_sent_at(id).await, Duration::from_secs(1));

            let replier = {
                let h = h.clone();
                tokio::spawn(async move { h.orchestrator.handle_reply(reply).await })
            };
            let sweeper = {
                let h = h.clone();
                tokio::spawn(async move { h.orchestrator.process_timeouts(sweep_at).await })
            };
            let disposition = replier.await.unwrap().unwrap();
            sweeper.await.unwrap().unwrap();

            // A resend keeps the correlation id, so the reply applies either way
            assert_eq!(disposition, ReplyDisposition::Applied);

            let instance = h.instance(id).await;
            assert_eq!(instance.completed_steps(), &[0]);
            let pending = instance.pending().unwrap();
            assert_eq!(pending.command_type, "a2");

            let names = h.command_names().await;
            let sent_a1 = names.iter().filter(|n| *n == "a1").count();
            let sent_a2 = names.iter().filter(|n| *n == "a2").count();
            assert_eq!(sent_a2, pending.attempts as usize);
            // Exactly one of the two steps was resent by the sweep
            assert_eq!(sent_a1 + sent_a2, 3);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_distinct_sagas_progress_in_parallel() {
        let h = Arc::new(TestHarness::new(vec![step("a1", None)]));
        let mut ids = Vec::new();
        for _ in 0..DELIVERIES {
            ids.push(h.start().await);
        }
        let commands = h.commands().await;

        let tasks: Vec<_> = commands
            .into_iter()
            .map(|command| {
                let h = h.clone();
                tokio::spawn(async move {
                    h.orchestrator
                        .handle_reply(ReplyEnvelope::success_empty(command.correlation_id))
                        .await
                })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), ReplyDisposition::Applied);
        }

        for id in ids {
            assert_eq!(h.instance(id).await.status(), SagaStatus::Completed);
        }
        assert_eq!(h.orchestrator.store().find_active().await.unwrap().len(), 0);
    }
}
