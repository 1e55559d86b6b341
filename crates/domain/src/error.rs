//! Domain error types.

use store::{AggregateId, StoreError, Version};
use thiserror::Error;

use crate::order::OrderError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the record store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The order rejected the operation.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Aggregate not found.
    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    NotFound {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
    },

    /// Another writer saved the aggregate after it was read. Re-read and retry.
    #[error(
        "Concurrent modification of {aggregate_type} {aggregate_id}: read at version {expected}, store has {actual}"
    )]
    ConcurrentModification {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// True for errors a caller should resolve by re-reading and retrying.
    pub fn is_concurrent_modification(&self) -> bool {
        matches!(self, DomainError::ConcurrentModification { .. })
    }
}
