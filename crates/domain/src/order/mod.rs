//! Order aggregate and related types.

mod aggregate;
mod events;
mod service;
mod state;
mod value_objects;

pub use aggregate::Order;
pub use events::{OrderCreatedData, OrderEvent, OrderRevisionData};
pub use service::OrderService;
pub use state::OrderState;
pub use value_objects::{
    Address, ConsumerId, DeliveryInformation, LineItemQuantityChange, MenuItemIdAndQuantity,
    Money, OrderDetails, OrderLimits, OrderLineItem, OrderRevision, ParseMoneyError,
};

use thiserror::Error;

use crate::restaurant::{MenuItemId, RestaurantId};

/// Errors that can occur during order operations.
///
/// These are validation failures: the order is left unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The operation is not allowed in the order's current state.
    #[error("Unsupported state transition: cannot {operation} an order in state {state}")]
    UnsupportedStateTransition {
        state: OrderState,
        operation: &'static str,
    },

    /// The revised total reaches the configured limit.
    #[error("Order minimum not met: revised total {new_total} must stay below {limit}")]
    OrderMinimumNotMet { new_total: Money, limit: Money },

    #[error("Invalid menu item id: {0}")]
    InvalidMenuItemId(MenuItemId),

    #[error("Restaurant not found: {0}")]
    RestaurantNotFound(RestaurantId),

    /// Invalid quantity.
    #[error("Invalid quantity for {menu_item_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity {
        menu_item_id: MenuItemId,
        quantity: u32,
    },

    /// A revision names a line item the order doesn't have.
    #[error("Invalid line item: {0}")]
    InvalidLineItem(MenuItemId),

    /// A line or order total does not fit in an `i64` of cents.
    #[error("Order amount overflow")]
    AmountOverflow,
}
