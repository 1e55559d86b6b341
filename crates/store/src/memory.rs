use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::store::{RecordStore, SaveOptions, validate_save};
use crate::{AggregateId, EventEnvelope, Result, StoreError, StoredRecord, Version};

#[derive(Default)]
struct Inner {
    records: HashMap<AggregateId, StoredRecord>,
    outbox: Vec<EventEnvelope>,
}

/// In-memory record store for tests and single-process deployments.
///
/// Records and outbox share one lock, so a save is atomic.
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records.
    pub async fn record_count(&self) -> usize {
        self.inner.read().await.records.len()
    }

    /// Returns the number of outbox events.
    pub async fn event_count(&self) -> usize {
        self.inner.read().await.outbox.len()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn save(
        &self,
        record: StoredRecord,
        events: Vec<EventEnvelope>,
        options: SaveOptions,
    ) -> Result<Version> {
        validate_save(&record, &events, &options)?;

        let mut inner = self.inner.write().await;

        let current = inner
            .records
            .get(&record.id)
            .map(|r| r.version)
            .unwrap_or(Version::initial());

        if let Some(expected) = options.expected_version
            && current != expected
        {
            metrics::counter!("store_concurrency_conflicts_total").increment(1);
            return Err(StoreError::ConcurrencyConflict {
                aggregate_id: record.id,
                expected,
                actual: current,
            });
        }

        let version = record.version;
        inner.records.insert(record.id, record);
        inner.outbox.extend(events);

        Ok(version)
    }

    async fn load(&self, id: AggregateId) -> Result<Option<StoredRecord>> {
        Ok(self.inner.read().await.records.get(&id).cloned())
    }

    async fn load_by_type(&self, record_type: &str) -> Result<Vec<StoredRecord>> {
        let inner = self.inner.read().await;
        let mut records: Vec<_> = inner
            .records
            .values()
            .filter(|r| r.record_type == record_type)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.updated_at);
        Ok(records)
    }

    async fn load_by_type_where(
        &self,
        record_type: &str,
        field: &str,
        values: &[&str],
    ) -> Result<Vec<StoredRecord>> {
        let inner = self.inner.read().await;
        let mut records: Vec<_> = inner
            .records
            .values()
            .filter(|r| r.record_type == record_type)
            .filter(|r| {
                r.state
                    .get(field)
                    .and_then(|v| v.as_str())
                    .is_some_and(|v| values.contains(&v))
            })
            .cloned()
            .collect();
        records.sort_by_key(|r| r.updated_at);
        Ok(records)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let inner = self.inner.read().await;
        Ok(inner
            .outbox
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect())
    }

    async fn get_events_by_type(&self, event_type: &str) -> Result<Vec<EventEnvelope>> {
        let inner = self.inner.read().await;
        Ok(inner
            .outbox
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: AggregateId, version: i64, value: i32) -> StoredRecord {
        StoredRecord::from_state(
            id,
            "TestAggregate",
            Version::new(version),
            &serde_json::json!({ "value": value }),
        )
        .unwrap()
    }

    fn event(id: AggregateId, version: i64, event_type: &str) -> EventEnvelope {
        EventEnvelope::new(
            id,
            "TestAggregate",
            event_type,
            Version::new(version),
            &serde_json::json!({"test": true}),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn load_by_type_where_filters_on_state_field() {
        let store = InMemoryRecordStore::new();
        for (status, record_type) in [
            ("IN_PROGRESS", "Saga"),
            ("COMPLETED", "Saga"),
            ("COMPENSATING", "Saga"),
            ("IN_PROGRESS", "Other"),
        ] {
            let record = StoredRecord::from_state(
                AggregateId::new(),
                record_type,
                Version::first(),
                &serde_json::json!({ "status": status }),
            )
            .unwrap();
            store.save(record, vec![], SaveOptions::new()).await.unwrap();
        }
        // Non-string field values never match
        let numeric = StoredRecord::from_state(
            AggregateId::new(),
            "Saga",
            Version::first(),
            &serde_json::json!({ "status": 1 }),
        )
        .unwrap();
        store.save(numeric, vec![], SaveOptions::new()).await.unwrap();

        let found = store
            .load_by_type_where("Saga", "status", &["IN_PROGRESS", "COMPENSATING"])
            .await
            .unwrap();

        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|r| r.record_type == "Saga"));
        assert!(found.iter().all(|r| r.state["status"] != "COMPLETED"));
    }

    #[tokio::test]
    async fn save_new_record() {
        let store = InMemoryRecordStore::new();
        let id = AggregateId::new();

        let version = store
            .save(record(id, 1, 10), vec![], SaveOptions::expect_new())
            .await
            .unwrap();

        assert_eq!(version, Version::first());
        let loaded = store.load(id).await.unwrap().unwrap();
        assert_eq!(loaded.state["value"], 10);
    }

    #[tokio::test]
    async fn save_with_matching_version_replaces_state() {
        let store = InMemoryRecordStore::new();
        let id = AggregateId::new();
        store
            .save(record(id, 1, 10), vec![], SaveOptions::expect_new())
            .await
            .unwrap();

        let version = store
            .save(
                record(id, 2, 20),
                vec![],
                SaveOptions::expect_version(Version::first()),
            )
            .await
            .unwrap();

        assert_eq!(version, Version::new(2));
        assert_eq!(store.load(id).await.unwrap().unwrap().state["value"], 20);
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn stale_writer_gets_conflict() {
        let store = InMemoryRecordStore::new();
        let id = AggregateId::new();
        store
            .save(record(id, 1, 10), vec![], SaveOptions::expect_new())
            .await
            .unwrap();
        store
            .save(
                record(id, 2, 20),
                vec![],
                SaveOptions::expect_version(Version::first()),
            )
            .await
            .unwrap();

        // A second writer that also read version 1
        let result = store
            .save(
                record(id, 2, 99),
                vec![event(id, 2, "Lost")],
                SaveOptions::expect_version(Version::first()),
            )
            .await;

        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict { expected, actual, .. })
                if expected == Version::first() && actual == Version::new(2)
        ));
        // Nothing from the losing write is visible
        assert_eq!(store.load(id).await.unwrap().unwrap().state["value"], 20);
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn expect_new_fails_for_existing_record() {
        let store = InMemoryRecordStore::new();
        let id = AggregateId::new();
        store
            .save(record(id, 1, 10), vec![], SaveOptions::expect_new())
            .await
            .unwrap();

        let result = store
            .save(record(id, 1, 11), vec![], SaveOptions::expect_new())
            .await;
        assert!(matches!(result, Err(StoreError::ConcurrencyConflict { .. })));
    }

    #[tokio::test]
    async fn version_must_follow_expected() {
        let store = InMemoryRecordStore::new();
        let id = AggregateId::new();

        let result = store
            .save(record(id, 3, 10), vec![], SaveOptions::expect_new())
            .await;
        assert!(matches!(result, Err(StoreError::InvalidSave(_))));
    }

    #[tokio::test]
    async fn events_must_belong_to_record() {
        let store = InMemoryRecordStore::new();
        let id = AggregateId::new();

        let result = store
            .save(
                record(id, 1, 10),
                vec![event(AggregateId::new(), 1, "Foreign")],
                SaveOptions::expect_new(),
            )
            .await;
        assert!(matches!(result, Err(StoreError::InvalidSave(_))));
    }

    #[tokio::test]
    async fn outbox_is_written_with_the_record() {
        let store = InMemoryRecordStore::new();
        let id1 = AggregateId::new();
        let id2 = AggregateId::new();

        store
            .save(
                record(id1, 1, 1),
                vec![event(id1, 1, "OrderCreated")],
                SaveOptions::expect_new(),
            )
            .await
            .unwrap();
        store
            .save(
                record(id2, 1, 1),
                vec![event(id2, 1, "OrderCreated")],
                SaveOptions::expect_new(),
            )
            .await
            .unwrap();
        store
            .save(
                record(id1, 2, 2),
                vec![event(id1, 2, "OrderAuthorized")],
                SaveOptions::expect_version(Version::first()),
            )
            .await
            .unwrap();

        let for_id1 = store.get_events_for_aggregate(id1).await.unwrap();
        assert_eq!(for_id1.len(), 2);
        assert_eq!(for_id1[1].event_type, "OrderAuthorized");

        let created = store.get_events_by_type("OrderCreated").await.unwrap();
        assert_eq!(created.len(), 2);
    }

    #[tokio::test]
    async fn load_by_type_filters() {
        let store = InMemoryRecordStore::new();
        let id = AggregateId::new();
        store
            .save(record(id, 1, 1), vec![], SaveOptions::expect_new())
            .await
            .unwrap();
        let other = StoredRecord::from_state(
            AggregateId::new(),
            "Other",
            Version::first(),
            &serde_json::json!({}),
        )
        .unwrap();
        store
            .save(other, vec![], SaveOptions::expect_new())
            .await
            .unwrap();

        let records = store.load_by_type("TestAggregate").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
    }

    #[tokio::test]
    async fn missing_record_loads_as_none() {
        let store = InMemoryRecordStore::new();
        assert!(store.load(AggregateId::new()).await.unwrap().is_none());
    }
}
