//! The order service's saga layer.
//!
//! Defines the messages exchanged with the consumer, kitchen and accounting
//! services, the three order sagas, the order service's own participant
//! (`OrderCommandHandler`) and `OrderSagaService`, which creates orders and
//! starts the saga that sees each one through.

pub mod channels;
pub mod error;
pub mod handler;
pub mod messages;
pub mod sagas;
pub mod service;

pub use error::{OrderingError, Result};
pub use handler::OrderCommandHandler;
pub use sagas::{
    CancelOrderSagaData, CreateOrderSagaData, OrderSagas, ReviseOrderSagaData,
    cancel_order_saga, create_order_saga, revise_order_saga,
};
pub use service::OrderSagaService;
