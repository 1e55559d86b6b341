//! Saga orchestration engine.
//!
//! A saga is a fixed list of steps. Each step sends a command to a
//! participant over a message transport and waits for its reply. On a
//! failure reply (or a step that times out) the orchestrator walks back
//! over the steps that completed and sends their compensations in reverse
//! order.
//!
//! The engine knows nothing about the business domain: saga data is any
//! serializable type, and participants are plain channel names.

pub mod config;
pub mod definition;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod gateway;
pub mod instance;
pub mod locks;
pub mod message;
pub mod observer;
pub mod orchestrator;
pub mod state;
pub mod store;

pub use config::SagaConfig;
pub use definition::{SagaData, SagaDefinition, SagaRunner, Step};
pub use dispatcher::ReplyDispatcher;
pub use error::{Result, SagaError};
pub use events::SagaEvent;
pub use gateway::{CommandGateway, InMemoryTransport, MessageTransport};
pub use instance::{PendingCommand, SagaInstance};
pub use locks::InstanceLocks;
pub use message::{
    CommandEnvelope, CommandWithDestination, CorrelationId, Outcome, ReplyEnvelope, SagaCommand,
};
pub use observer::{MetricsObserver, NoopObserver, SagaObserver};
pub use orchestrator::{DiscardReason, ReplyDisposition, SagaOrchestrator};
pub use state::{Direction, SagaStatus};
pub use store::{RecordSagaInstanceStore, SagaInstanceStore};
