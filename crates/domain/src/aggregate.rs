//! Core aggregate and domain event traits.

use serde::{Serialize, de::DeserializeOwned};
use store::{AggregateId, Version};

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name, used as the outbox event type.
    fn event_type(&self) -> &'static str;
}

/// Trait for aggregates persisted as whole-state records.
///
/// An aggregate is a consistency boundary. Its operations validate the
/// current state, mutate it, and return the events describing the change;
/// the repository writes state and events together.
pub trait Aggregate: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// The type of events this aggregate emits.
    type Event: DomainEvent;

    /// Returns the aggregate type name, used as the record type.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's identifier, or None before the first save.
    fn id(&self) -> Option<AggregateId>;

    /// Assigns the identifier. Called by the repository on the first save.
    fn assign_id(&mut self, id: AggregateId);

    /// Returns the version this copy was read at (0 if never saved).
    fn version(&self) -> Version;

    fn set_version(&mut self, version: Version);
}
