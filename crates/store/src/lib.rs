//! Versioned record persistence.
//!
//! Aggregates are stored as whole-state JSON records guarded by a version
//! counter. Each save may carry domain events, which land in an outbox in
//! the same atomic write.

pub mod error;
pub mod event;
pub mod id;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use error::{Result, StoreError};
pub use event::{EventEnvelope, EventId, Version};
pub use id::AggregateId;
pub use memory::InMemoryRecordStore;
pub use postgres::PostgresRecordStore;
pub use record::StoredRecord;
pub use store::{RecordStore, SaveOptions};
