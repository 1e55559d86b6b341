//! Read-modify-write persistence for aggregates.

use std::marker::PhantomData;

use store::{
    AggregateId, EventEnvelope, RecordStore, SaveOptions, StoreError, StoredRecord, Version,
};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::error::DomainError;

/// Result of an update.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate as saved.
    pub aggregate: A,

    /// The events that were written to the outbox.
    pub events: Vec<A::Event>,

    /// The version the aggregate was saved at.
    pub new_version: Version,
}

/// Loads and saves one aggregate type through a record store.
///
/// Every save expects the version the aggregate was read at; a stale copy
/// fails with `DomainError::ConcurrentModification` and nothing is written.
pub struct Repository<S, A>
where
    S: RecordStore,
    A: Aggregate,
{
    store: S,
    _phantom: PhantomData<A>,
}

impl<S, A> Repository<S, A>
where
    S: RecordStore,
    A: Aggregate,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the underlying record store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an aggregate, returning None if it doesn't exist.
    pub async fn find_by_id(&self, id: AggregateId) -> Result<Option<A>, DomainError> {
        match self.store.load(id).await? {
            Some(record) => Ok(Some(Self::decode(record)?)),
            None => Ok(None),
        }
    }

    /// Loads an aggregate, failing with `NotFound` if it doesn't exist.
    pub async fn get(&self, id: AggregateId) -> Result<A, DomainError> {
        self.find_by_id(id).await?.ok_or(DomainError::NotFound {
            aggregate_type: A::aggregate_type(),
            aggregate_id: id,
        })
    }

    /// Loads every aggregate of this type.
    pub async fn find_all(&self) -> Result<Vec<A>, DomainError> {
        self.store
            .load_by_type(A::aggregate_type())
            .await?
            .into_iter()
            .map(Self::decode)
            .collect()
    }

    /// Loads the aggregates whose serialized `field` is one of `values`.
    /// The filter runs in the store, so other records are never decoded.
    pub async fn find_where(&self, field: &str, values: &[&str]) -> Result<Vec<A>, DomainError> {
        self.store
            .load_by_type_where(A::aggregate_type(), field, values)
            .await?
            .into_iter()
            .map(Self::decode)
            .collect()
    }

    /// Saves the aggregate and its events in one atomic write.
    ///
    /// Assigns an id on the first save. Returns the updated copy carrying the
    /// new version, which the caller must use for any further save.
    pub async fn save(&self, mut aggregate: A, events: Vec<A::Event>) -> Result<A, DomainError> {
        let id = match aggregate.id() {
            Some(id) => id,
            None => {
                let id = AggregateId::new();
                aggregate.assign_id(id);
                id
            }
        };

        let expected = aggregate.version();
        let new_version = expected.next();
        aggregate.set_version(new_version);

        let record = StoredRecord::from_state(id, A::aggregate_type(), new_version, &aggregate)?;
        let envelopes = events
            .iter()
            .map(|event| {
                EventEnvelope::new(
                    id,
                    A::aggregate_type(),
                    event.event_type(),
                    new_version,
                    event,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        match self
            .store
            .save(record, envelopes, SaveOptions::expect_version(expected))
            .await
        {
            Ok(_) => Ok(aggregate),
            Err(StoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            }) => Err(DomainError::ConcurrentModification {
                aggregate_type: A::aggregate_type(),
                aggregate_id,
                expected,
                actual,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads the aggregate, applies `command_fn` and saves the result.
    ///
    /// If `command_fn` fails nothing is written and the error is returned.
    pub async fn update<F, E>(
        &self,
        id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&mut A) -> Result<Vec<A::Event>, E>,
        DomainError: From<E>,
    {
        let mut aggregate = self.get(id).await?;
        let events = command_fn(&mut aggregate)?;
        let aggregate = self.save(aggregate, events.clone()).await?;
        let new_version = aggregate.version();

        Ok(CommandResult {
            aggregate,
            events,
            new_version,
        })
    }

    fn decode(record: StoredRecord) -> Result<A, DomainError> {
        let mut aggregate: A = record.decode()?;
        aggregate.set_version(record.version);
        Ok(aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use store::InMemoryRecordStore;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum CounterEvent {
        Incremented { value: i32 },
    }

    impl DomainEvent for CounterEvent {
        fn event_type(&self) -> &'static str {
            "CounterIncremented"
        }
    }

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    struct Counter {
        id: Option<AggregateId>,
        version: Version,
        value: i32,
    }

    impl Counter {
        fn increment(&mut self) -> Result<Vec<CounterEvent>, DomainError> {
            self.value += 1;
            Ok(vec![CounterEvent::Incremented { value: self.value }])
        }
    }

    impl Aggregate for Counter {
        type Event = CounterEvent;

        fn aggregate_type() -> &'static str {
            "Counter"
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

    #[tokio::test]
    async fn test_save_assigns_id_and_first_version() {
        let repo: Repository<_, Counter> = Repository::new(InMemoryRecordStore::new());

        let saved = repo.save(Counter::default(), vec![]).await.unwrap();

        assert!(saved.id().is_some());
        assert_eq!(saved.version(), Version::first());
    }

    #[tokio::test]
    async fn test_update_increments_version_and_writes_events() {
        let store = InMemoryRecordStore::new();
        let repo: Repository<_, Counter> = Repository::new(store.clone());
        let saved = repo.save(Counter::default(), vec![]).await.unwrap();
        let id = saved.id().unwrap();

        let result = repo.update(id, |c| c.increment()).await.unwrap();

        assert_eq!(result.new_version, Version::new(2));
        assert_eq!(result.aggregate.value, 1);
        assert_eq!(result.events.len(), 1);
        assert_eq!(store.get_events_for_aggregate(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_copy_is_a_concurrent_modification() {
        let repo: Repository<_, Counter> = Repository::new(InMemoryRecordStore::new());
        let saved = repo.save(Counter::default(), vec![]).await.unwrap();

        let first = saved.clone();
        let second = saved;
        repo.save(first, vec![]).await.unwrap();
        let result = repo.save(second, vec![]).await;

        assert!(matches!(
            result,
            Err(DomainError::ConcurrentModification { expected, actual, .. })
                if expected == Version::first() && actual == Version::new(2)
        ));
    }

    #[tokio::test]
    async fn test_update_missing_aggregate_is_not_found() {
        let repo: Repository<_, Counter> = Repository::new(InMemoryRecordStore::new());

        let result = repo.update(AggregateId::new(), |c| c.increment()).await;

        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_failed_command_writes_nothing() {
        let store = InMemoryRecordStore::new();
        let repo: Repository<_, Counter> = Repository::new(store.clone());
        let saved = repo.save(Counter::default(), vec![]).await.unwrap();
        let id = saved.id().unwrap();

        let result = repo
            .update(id, |_| {
                Err::<Vec<CounterEvent>, _>(DomainError::NotFound {
                    aggregate_type: "Counter",
                    aggregate_id: id,
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(
            repo.find_by_id(id).await.unwrap().unwrap().version(),
            Version::first()
        );
    }

    #[tokio::test]
    async fn test_find_all_returns_only_this_type() {
        let repo: Repository<_, Counter> = Repository::new(InMemoryRecordStore::new());
        repo.save(Counter::default(), vec![]).await.unwrap();
        repo.save(Counter::default(), vec![]).await.unwrap();

        assert_eq!(repo.find_all().await.unwrap().len(), 2);
    }
}
