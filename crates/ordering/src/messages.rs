//! Commands and replies exchanged with saga participants.
//!
//! The command type on the wire is the struct name.

use std::collections::BTreeMap;

use domain::{ConsumerId, MenuItemId, Money, OrderRevision, RestaurantId};
use saga::{CommandEnvelope, SagaCommand};
use serde::{Deserialize, Serialize};
use store::AggregateId;

macro_rules! saga_commands {
    ($($name:ident),* $(,)?) => {
        $(
            impl SagaCommand for $name {
                fn command_type(&self) -> &'static str {
                    stringify!($name)
                }
            }
        )*
    };
}

// Order service

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectOrder {
    pub order_id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproveOrder {
    pub order_id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeginCancel {
    pub order_id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoBeginCancel {
    pub order_id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmCancelOrder {
    pub order_id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeginReviseOrder {
    pub order_id: AggregateId,
    pub revision: OrderRevision,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoBeginReviseOrder {
    pub order_id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmReviseOrder {
    pub order_id: AggregateId,
    pub revision: OrderRevision,
}

/// Reply to `BeginReviseOrder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginReviseOrderReply {
    pub revised_order_total: Money,

    /// `revised_order_total − current total`; what accounting must authorize.
    pub delta: Money,
}

/// A command addressed to the order service, decoded from its envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderServiceCommand {
    RejectOrder(RejectOrder),
    ApproveOrder(ApproveOrder),
    BeginCancel(BeginCancel),
    UndoBeginCancel(UndoBeginCancel),
    ConfirmCancelOrder(ConfirmCancelOrder),
    BeginReviseOrder(BeginReviseOrder),
    UndoBeginReviseOrder(UndoBeginReviseOrder),
    ConfirmReviseOrder(ConfirmReviseOrder),
}

/// Why an order service command could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum CommandDecodeError {
    #[error("unknown command type {0}")]
    UnknownType(String),

    #[error("invalid {command_type} payload: {source}")]
    Payload {
        command_type: String,
        source: serde_json::Error,
    },
}

impl OrderServiceCommand {
    pub fn decode(envelope: &CommandEnvelope) -> Result<Self, CommandDecodeError> {
        fn payload<C: serde::de::DeserializeOwned>(
            envelope: &CommandEnvelope,
        ) -> Result<C, CommandDecodeError> {
            envelope.decode().map_err(|source| CommandDecodeError::Payload {
                command_type: envelope.command_type.clone(),
                source,
            })
        }

        Ok(match envelope.command_type.as_str() {
            "RejectOrder" => Self::RejectOrder(payload(envelope)?),
            "ApproveOrder" => Self::ApproveOrder(payload(envelope)?),
            "BeginCancel" => Self::BeginCancel(payload(envelope)?),
            "UndoBeginCancel" => Self::UndoBeginCancel(payload(envelope)?),
            "ConfirmCancelOrder" => Self::ConfirmCancelOrder(payload(envelope)?),
            "BeginReviseOrder" => Self::BeginReviseOrder(payload(envelope)?),
            "UndoBeginReviseOrder" => Self::UndoBeginReviseOrder(payload(envelope)?),
            "ConfirmReviseOrder" => Self::ConfirmReviseOrder(payload(envelope)?),
            other => return Err(CommandDecodeError::UnknownType(other.to_string())),
        })
    }

    pub fn order_id(&self) -> AggregateId {
        match self {
            Self::RejectOrder(c) => c.order_id,
            Self::ApproveOrder(c) => c.order_id,
            Self::BeginCancel(c) => c.order_id,
            Self::UndoBeginCancel(c) => c.order_id,
            Self::ConfirmCancelOrder(c) => c.order_id,
            Self::BeginReviseOrder(c) => c.order_id,
            Self::UndoBeginReviseOrder(c) => c.order_id,
            Self::ConfirmReviseOrder(c) => c.order_id,
        }
    }
}

// Consumer service

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidateOrderByConsumer {
    pub consumer_id: ConsumerId,
    pub order_id: AggregateId,
    pub order_total: Money,
}

// Kitchen service

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketLineItem {
    pub menu_item_id: MenuItemId,
    pub name: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTicket {
    pub restaurant_id: RestaurantId,
    pub order_id: AggregateId,
    pub line_items: Vec<TicketLineItem>,
}

/// Reply to `CreateTicket`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTicketReply {
    pub ticket_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelCreateTicket {
    pub order_id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmCreateTicket {
    pub ticket_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeginCancelTicket {
    pub restaurant_id: RestaurantId,
    pub order_id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoBeginCancelTicket {
    pub restaurant_id: RestaurantId,
    pub order_id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmCancelTicket {
    pub restaurant_id: RestaurantId,
    pub order_id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeginReviseTicket {
    pub restaurant_id: RestaurantId,
    pub order_id: AggregateId,
    pub revised_line_item_quantities: BTreeMap<MenuItemId, u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoBeginReviseTicket {
    pub restaurant_id: RestaurantId,
    pub order_id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmReviseTicket {
    pub restaurant_id: RestaurantId,
    pub order_id: AggregateId,
    pub revised_line_item_quantities: BTreeMap<MenuItemId, u32>,
}

// Accounting service

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authorize {
    pub consumer_id: ConsumerId,
    pub order_id: AggregateId,
    pub order_total: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseAuthorization {
    pub consumer_id: ConsumerId,
    pub order_id: AggregateId,
    pub order_total: Money,
}

/// Authorizes the difference a revision makes, not the new total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviseAuthorization {
    pub consumer_id: ConsumerId,
    pub order_id: AggregateId,
    pub delta: Money,
}

saga_commands!(
    RejectOrder,
    ApproveOrder,
    BeginCancel,
    UndoBeginCancel,
    ConfirmCancelOrder,
    BeginReviseOrder,
    UndoBeginReviseOrder,
    ConfirmReviseOrder,
    ValidateOrderByConsumer,
    CreateTicket,
    CancelCreateTicket,
    ConfirmCreateTicket,
    BeginCancelTicket,
    UndoBeginCancelTicket,
    ConfirmCancelTicket,
    BeginReviseTicket,
    UndoBeginReviseTicket,
    ConfirmReviseTicket,
    Authorize,
    ReverseAuthorization,
    ReviseAuthorization,
);
