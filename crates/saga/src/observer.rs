//! Saga observer trait, injected into the orchestrator.

use crate::instance::SagaInstance;

/// Callbacks fired after a saga transition has been saved.
pub trait SagaObserver: Send + Sync + 'static {
    fn on_saga_started(&self, instance: &SagaInstance);
    fn on_step_completed(&self, instance: &SagaInstance, step: &str);
    fn on_step_retried(&self, instance: &SagaInstance, step: &str, attempt: u32);
    fn on_step_timed_out(&self, instance: &SagaInstance, step: &str);
    fn on_compensation_started(&self, instance: &SagaInstance, step: &str, reason: &str);
    fn on_saga_completed(&self, instance: &SagaInstance);
    fn on_saga_compensated(&self, instance: &SagaInstance);
    fn on_saga_failed(&self, instance: &SagaInstance, reason: &str);
    fn on_protocol_violation(&self, reason: &str);
}

/// No-op observer
pub struct NoopObserver;

impl SagaObserver for NoopObserver {
    fn on_saga_started(&self, _instance: &SagaInstance) {}
    fn on_step_completed(&self, _instance: &SagaInstance, _step: &str) {}
    fn on_step_retried(&self, _instance: &SagaInstance, _step: &str, _attempt: u32) {}
    fn on_step_timed_out(&self, _instance: &SagaInstance, _step: &str) {}
    fn on_compensation_started(&self, _instance: &SagaInstance, _step: &str, _reason: &str) {}
    fn on_saga_completed(&self, _instance: &SagaInstance) {}
    fn on_saga_compensated(&self, _instance: &SagaInstance) {}
    fn on_saga_failed(&self, _instance: &SagaInstance, _reason: &str) {}
    fn on_protocol_violation(&self, _reason: &str) {}
}

/// Emits counters and durations through the installed `metrics` recorder.
pub struct MetricsObserver;

impl MetricsObserver {
    fn record_duration(instance: &SagaInstance, outcome: &'static str) {
        let elapsed = (instance.updated_at() - instance.created_at())
            .to_std()
            .unwrap_or_default();
        metrics::histogram!(
            "saga_duration_seconds",
            "saga_type" => instance.saga_type().to_string(),
            "outcome" => outcome
        )
        .record(elapsed.as_secs_f64());
    }
}

impl SagaObserver for MetricsObserver {
    fn on_saga_started(&self, instance: &SagaInstance) {
        metrics::counter!("saga_started_total", "saga_type" => instance.saga_type().to_string())
            .increment(1);
    }

    fn on_step_completed(&self, instance: &SagaInstance, step: &str) {
        metrics::counter!(
            "saga_steps_completed_total",
            "saga_type" => instance.saga_type().to_string(),
            "step" => step.to_string()
        )
        .increment(1);
    }

    fn on_step_retried(&self, instance: &SagaInstance, step: &str, _attempt: u32) {
        metrics::counter!(
            "saga_step_retries_total",
            "saga_type" => instance.saga_type().to_string(),
            "step" => step.to_string()
        )
        .increment(1);
    }

    fn on_step_timed_out(&self, instance: &SagaInstance, step: &str) {
        metrics::counter!(
            "saga_step_timeouts_total",
            "saga_type" => instance.saga_type().to_string(),
            "step" => step.to_string()
        )
        .increment(1);
    }

    fn on_compensation_started(&self, instance: &SagaInstance, _step: &str, _reason: &str) {
        metrics::counter!(
            "saga_compensations_started_total",
            "saga_type" => instance.saga_type().to_string()
        )
        .increment(1);
    }

    fn on_saga_completed(&self, instance: &SagaInstance) {
        metrics::counter!("saga_completed_total", "saga_type" => instance.saga_type().to_string())
            .increment(1);
        Self::record_duration(instance, "completed");
    }

    fn on_saga_compensated(&self, instance: &SagaInstance) {
        metrics::counter!("saga_compensated_total", "saga_type" => instance.saga_type().to_string())
            .increment(1);
        Self::record_duration(instance, "compensated");
    }

    fn on_saga_failed(&self, instance: &SagaInstance, _reason: &str) {
        metrics::counter!("saga_failed_total", "saga_type" => instance.saga_type().to_string())
            .increment(1);
        Self::record_duration(instance, "failed");
    }

    fn on_protocol_violation(&self, _reason: &str) {
        metrics::counter!("saga_protocol_violations_total").increment(1);
    }
}
