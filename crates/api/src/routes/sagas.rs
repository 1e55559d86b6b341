//! Read-only saga inspection for operators.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use domain::Aggregate;
use saga::{SagaInstance, SagaInstanceStore, SagaStatus};
use serde::{Deserialize, Serialize};
use store::AggregateId;

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct PendingCommandResponse {
    pub correlation_id: String,
    pub destination: String,
    pub command_type: String,
    pub attempts: u32,
    pub first_sent_at: DateTime<Utc>,
    pub last_sent_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct SagaResponse {
    pub saga_id: String,
    pub saga_type: String,
    pub status: SagaStatus,
    pub direction: String,
    pub step_index: usize,
    pub completed_steps: Vec<usize>,
    pub failed_step: Option<usize>,
    pub failure_reason: Option<String>,
    pub pending: Option<PendingCommandResponse>,
    pub data: serde_json::Value,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&SagaInstance> for SagaResponse {
    fn from(instance: &SagaInstance) -> Self {
        Self {
            saga_id: instance.saga_id().to_string(),
            saga_type: instance.saga_type().to_string(),
            status: instance.status(),
            direction: instance.direction().to_string(),
            step_index: instance.step_index(),
            completed_steps: instance.completed_steps().to_vec(),
            failed_step: instance.failed_step(),
            failure_reason: instance.failure_reason().map(String::from),
            pending: instance.pending().map(|p| PendingCommandResponse {
                correlation_id: p.correlation_id.to_string(),
                destination: p.destination.clone(),
                command_type: p.command_type.clone(),
                attempts: p.attempts,
                first_sent_at: p.first_sent_at,
                last_sent_at: p.last_sent_at,
            }),
            data: instance.data().clone(),
            version: instance.version().as_i64(),
            created_at: instance.created_at(),
            updated_at: instance.updated_at(),
        }
    }
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

/// GET /sagas/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SagaResponse>, ApiError> {
    let saga_id: AggregateId = id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid saga id: {id}")))?;

    let instance = state
        .orchestrator
        .find(saga_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Saga {id} not found")))?;

    Ok(Json(SagaResponse::from(&instance)))
}

/// GET /sagas, optionally `?status=FAILED` to list sagas needing an operator.
#[tracing::instrument(skip(state, query))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<SagaResponse>>, ApiError> {
    let store = state.orchestrator.store();
    let instances = match query.status {
        Some(status) => {
            let status: SagaStatus = status.parse().map_err(ApiError::BadRequest)?;
            store.find_by_status(status).await?
        }
        None => store.find_all().await?,
    };

    Ok(Json(instances.iter().map(SagaResponse::from).collect()))
}
