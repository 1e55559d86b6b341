//! Prometheus scrape endpoint.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

const PROMETHEUS_TEXT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// GET /metrics: saga and order counters in the Prometheus text format.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, PROMETHEUS_TEXT)],
        handle.render(),
    )
}

/// Registers help text for the counters the order service emits.
pub fn describe() {
    metrics::describe_counter!("saga_started_total", "Sagas started, by saga type");
    metrics::describe_counter!("saga_completed_total", "Sagas that completed every step");
    metrics::describe_counter!("saga_compensated_total", "Sagas undone by compensation");
    metrics::describe_counter!(
        "saga_failed_total",
        "Sagas whose compensation gave up and need an operator"
    );
    metrics::describe_counter!("saga_step_retries_total", "Commands resent after a timeout");
    metrics::describe_counter!(
        "saga_protocol_violations_total",
        "Malformed or unroutable replies"
    );
    metrics::describe_histogram!(
        "saga_duration_seconds",
        metrics::Unit::Seconds,
        "Time from saga start to a terminal status"
    );
    metrics::describe_counter!(
        "order_commands_deduplicated_total",
        "Redelivered order commands answered from the reply cache"
    );
    metrics::describe_counter!(
        "store_concurrency_conflicts_total",
        "Saves rejected by optimistic concurrency"
    );
}
