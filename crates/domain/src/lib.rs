//! Domain layer for the food-order system.
//!
//! This crate provides:
//! - Aggregate trait for versioned, state-based entities
//! - Repository for read-modify-write against a record store
//! - Order aggregate with its approval, cancellation and revision state machine
//! - Restaurant menus used to price new orders

pub mod aggregate;
pub mod error;
pub mod observer;
pub mod order;
pub mod repository;
pub mod restaurant;

pub use aggregate::{Aggregate, DomainEvent};
pub use error::DomainError;
pub use observer::{MetricsOrderObserver, NoopOrderObserver, OrderObserver};
pub use order::{
    Address, ConsumerId, DeliveryInformation, LineItemQuantityChange, MenuItemIdAndQuantity,
    Money, Order, OrderDetails, OrderError, OrderEvent, OrderLimits, OrderLineItem, OrderRevision,
    OrderService, OrderState,
};
pub use repository::{CommandResult, Repository};
pub use restaurant::{
    InMemoryRestaurantRepository, MenuItem, MenuItemId, Restaurant, RestaurantId,
    RestaurantRepository,
};
