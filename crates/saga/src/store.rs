//! Durable storage for saga instances.

use async_trait::async_trait;
use domain::Repository;
use store::{AggregateId, RecordStore};

use crate::error::Result;
use crate::events::SagaEvent;
use crate::instance::SagaInstance;
use crate::state::SagaStatus;

#[async_trait]
pub trait SagaInstanceStore: Send + Sync {
    /// Saves the instance and its lifecycle events atomically. Returns the
    /// copy at its new version.
    async fn save(&self, instance: SagaInstance, events: Vec<SagaEvent>) -> Result<SagaInstance>;

    async fn find(&self, id: AggregateId) -> Result<Option<SagaInstance>>;

    async fn find_all(&self) -> Result<Vec<SagaInstance>>;

    /// Instances that have not reached a terminal status.
    async fn find_active(&self) -> Result<Vec<SagaInstance>> {
        Ok(self
            .find_all()
            .await?
            .into_iter()
            .filter(|i| !i.is_terminal())
            .collect())
    }

    async fn find_by_status(&self, status: SagaStatus) -> Result<Vec<SagaInstance>> {
        Ok(self
            .find_all()
            .await?
            .into_iter()
            .filter(|i| i.status() == status)
            .collect())
    }
}

/// Name of the serialized `SagaInstance` status field.
const STATUS_FIELD: &str = "status";

/// Saga instances kept as versioned records in any `RecordStore`.
pub struct RecordSagaInstanceStore<S: RecordStore> {
    instances: Repository<S, SagaInstance>,
}

impl<S: RecordStore> RecordSagaInstanceStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            instances: Repository::new(store),
        }
    }
}

#[async_trait]
impl<S: RecordStore> SagaInstanceStore for RecordSagaInstanceStore<S> {
    async fn save(&self, instance: SagaInstance, events: Vec<SagaEvent>) -> Result<SagaInstance> {
        Ok(self.instances.save(instance, events).await?)
    }

    async fn find(&self, id: AggregateId) -> Result<Option<SagaInstance>> {
        Ok(self.instances.find_by_id(id).await?)
    }

    async fn find_all(&self) -> Result<Vec<SagaInstance>> {
        let mut instances = self.instances.find_all().await?;
        instances.sort_by_key(|i| i.created_at());
        Ok(instances)
    }

    async fn find_active(&self) -> Result<Vec<SagaInstance>> {
        self.find_with_status(&[SagaStatus::InProgress, SagaStatus::Compensating])
            .await
    }

    async fn find_by_status(&self, status: SagaStatus) -> Result<Vec<SagaInstance>> {
        self.find_with_status(&[status]).await
    }
}

impl<S: RecordStore> RecordSagaInstanceStore<S> {
    async fn find_with_status(&self, statuses: &[SagaStatus]) -> Result<Vec<SagaInstance>> {
        let values: Vec<&str> = statuses.iter().map(SagaStatus::as_str).collect();
        let mut instances = self.instances.find_where(STATUS_FIELD, &values).await?;
        instances.sort_by_key(|i| i.created_at());
        Ok(instances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::Aggregate;
    use store::{InMemoryRecordStore, SaveOptions, StoredRecord, Version};

    #[tokio::test]
    async fn test_save_and_find() {
        let store = RecordSagaInstanceStore::new(InMemoryRecordStore::new());
        let instance = SagaInstance::new("Test", serde_json::json!({ "a": 1 }), Utc::now());
        let id = instance.saga_id();

        let saved = store.save(instance, vec![]).await.unwrap();
        assert_eq!(saved.version(), Version::first());

        let found = store.find(id).await.unwrap().unwrap();
        assert_eq!(found, saved);
    }

    #[tokio::test]
    async fn test_find_active_skips_terminal() {
        let store = RecordSagaInstanceStore::new(InMemoryRecordStore::new());
        let now = Utc::now();

        let active = SagaInstance::new("Test", serde_json::json!({}), now);
        let mut done = SagaInstance::new("Test", serde_json::json!({}), now);
        done.complete(now);
        let active_id = active.saga_id();
        store.save(active, vec![]).await.unwrap();
        store.save(done, vec![]).await.unwrap();

        let found = store.find_active().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].saga_id(), active_id);
        assert_eq!(
            store
                .find_by_status(SagaStatus::Completed)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_find_active_never_decodes_finished_records() {
        let records = InMemoryRecordStore::new();
        let store = RecordSagaInstanceStore::new(records.clone());
        let now = Utc::now();

        let active = SagaInstance::new("Test", serde_json::json!({}), now);
        let active_id = active.saga_id();
        store.save(active, vec![]).await.unwrap();

        // Not a decodable SagaInstance: loading it would be an error
        let finished = StoredRecord::from_state(
            AggregateId::new(),
            SagaInstance::aggregate_type(),
            Version::first(),
            &serde_json::json!({ "status": "COMPLETED" }),
        )
        .unwrap();
        records
            .save(finished, vec![], SaveOptions::new())
            .await
            .unwrap();

        let found = store.find_active().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].saga_id(), active_id);
        assert!(store.find_all().await.is_err());
    }
}
