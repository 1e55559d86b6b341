use std::sync::Arc;

use async_trait::async_trait;

use crate::{AggregateId, EventEnvelope, Result, StoreError, StoredRecord, Version};

/// Options for saving a record.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Version the writer read. If None, no version check is performed.
    pub expected_version: Option<Version>,
}

impl SaveOptions {
    /// Creates options with no version check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expects the stored record to be at `version`.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Expects the record not to exist yet.
    pub fn expect_new() -> Self {
        Self::expect_version(Version::initial())
    }
}

/// Durable storage for versioned aggregate records.
///
/// Implementations must be thread-safe and must apply a save (record plus
/// outbox events) atomically.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Writes `record` and appends `events` to the outbox.
    ///
    /// Fails with `ConcurrencyConflict` when `options.expected_version` is set
    /// and differs from the stored version (0 when absent). Returns the
    /// version written.
    async fn save(
        &self,
        record: StoredRecord,
        events: Vec<EventEnvelope>,
        options: SaveOptions,
    ) -> Result<Version>;

    /// Loads the latest state of a record.
    async fn load(&self, id: AggregateId) -> Result<Option<StoredRecord>>;

    /// Loads every record of the given type.
    async fn load_by_type(&self, record_type: &str) -> Result<Vec<StoredRecord>>;

    /// Loads the records of the given type whose top-level string `field`
    /// is one of `values`, oldest update first.
    async fn load_by_type_where(
        &self,
        record_type: &str,
        field: &str,
        values: &[&str],
    ) -> Result<Vec<StoredRecord>>;

    /// Outbox events emitted by one aggregate, oldest first.
    async fn get_events_for_aggregate(&self, aggregate_id: AggregateId)
    -> Result<Vec<EventEnvelope>>;

    /// Outbox events of one type, oldest first.
    async fn get_events_by_type(&self, event_type: &str) -> Result<Vec<EventEnvelope>>;
}

#[async_trait]
impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    async fn save(
        &self,
        record: StoredRecord,
        events: Vec<EventEnvelope>,
        options: SaveOptions,
    ) -> Result<Version> {
        (**self).save(record, events, options).await
    }

    async fn load(&self, id: AggregateId) -> Result<Option<StoredRecord>> {
        (**self).load(id).await
    }

    async fn load_by_type(&self, record_type: &str) -> Result<Vec<StoredRecord>> {
        (**self).load_by_type(record_type).await
    }

    async fn load_by_type_where(
        &self,
        record_type: &str,
        field: &str,
        values: &[&str],
    ) -> Result<Vec<StoredRecord>> {
        (**self).load_by_type_where(record_type, field, values).await
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        (**self).get_events_for_aggregate(aggregate_id).await
    }

    async fn get_events_by_type(&self, event_type: &str) -> Result<Vec<EventEnvelope>> {
        (**self).get_events_by_type(event_type).await
    }
}

/// Checks that a save is internally consistent before touching storage.
pub(crate) fn validate_save(
    record: &StoredRecord,
    events: &[EventEnvelope],
    options: &SaveOptions,
) -> Result<()> {
    if let Some(expected) = options.expected_version
        && record.version != expected.next()
    {
        return Err(StoreError::InvalidSave(format!(
            "record {} must be written at version {}, got {}",
            record.id,
            expected.next(),
            record.version
        )));
    }

    if let Some(event) = events.iter().find(|e| e.aggregate_id != record.id) {
        return Err(StoreError::InvalidSave(format!(
            "event {} belongs to aggregate {}, not {}",
            event.event_type, event.aggregate_id, record.id
        )));
    }

    Ok(())
}
