//! Order domain events.

use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{Address, Money, OrderDetails, OrderRevision};

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was placed and awaits approval.
    OrderCreated(OrderCreatedData),

    OrderAuthorized,

    OrderRejected,

    OrderCancelled,

    /// A revision was accepted for confirmation by the other services.
    OrderRevisionProposed(OrderRevisionData),

    OrderRevised(OrderRevisionData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "OrderCreated",
            OrderEvent::OrderAuthorized => "OrderAuthorized",
            OrderEvent::OrderRejected => "OrderRejected",
            OrderEvent::OrderCancelled => "OrderCancelled",
            OrderEvent::OrderRevisionProposed(_) => "OrderRevisionProposed",
            OrderEvent::OrderRevised(_) => "OrderRevised",
        }
    }
}

/// Data for OrderCreated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedData {
    pub details: OrderDetails,
    pub delivery_address: Address,
    pub restaurant_name: String,
}

/// Data for OrderRevisionProposed and OrderRevised events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRevisionData {
    pub revision: OrderRevision,
    pub current_order_total: Money,
    pub new_order_total: Money,
}
