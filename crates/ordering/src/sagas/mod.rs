//! Saga definitions for the order lifecycle.

mod cancel_order;
mod create_order;
mod revise_order;

pub use cancel_order::{CANCEL_ORDER_SAGA, CancelOrderSagaData, cancel_order_saga};
pub use create_order::{CREATE_ORDER_SAGA, CreateOrderSagaData, create_order_saga};
pub use revise_order::{REVISE_ORDER_SAGA, ReviseOrderSagaData, revise_order_saga};

use saga::{MessageTransport, SagaDefinition, SagaInstanceStore, SagaOrchestrator};

/// The three order saga definitions, built once.
#[derive(Clone)]
pub struct OrderSagas {
    pub create_order: SagaDefinition<CreateOrderSagaData>,
    pub cancel_order: SagaDefinition<CancelOrderSagaData>,
    pub revise_order: SagaDefinition<ReviseOrderSagaData>,
}

impl OrderSagas {
    pub fn new() -> saga::Result<Self> {
        Ok(Self {
            create_order: create_order_saga()?,
            cancel_order: cancel_order_saga()?,
            revise_order: revise_order_saga()?,
        })
    }

    pub fn register<S: SagaInstanceStore, T: MessageTransport>(
        &self,
        orchestrator: &mut SagaOrchestrator<S, T>,
    ) {
        orchestrator.register(self.create_order.clone());
        orchestrator.register(self.cancel_order.clone());
        orchestrator.register(self.revise_order.clone());
    }
}
