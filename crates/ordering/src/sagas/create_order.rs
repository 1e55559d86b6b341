//! Create-order saga: validates the consumer, opens a kitchen ticket,
//! authorizes the card, then approves the order.

use domain::OrderDetails;
use saga::{Result, SagaDefinition, Step};
use serde::{Deserialize, Serialize};
use store::AggregateId;

use crate::channels::{ACCOUNTING_SERVICE, CONSUMER_SERVICE, KITCHEN_SERVICE, ORDER_SERVICE};
use crate::messages::{
    ApproveOrder, Authorize, CancelCreateTicket, ConfirmCreateTicket, CreateTicket,
    CreateTicketReply, RejectOrder, TicketLineItem, ValidateOrderByConsumer,
};

pub const CREATE_ORDER_SAGA: &str = "CreateOrderSaga";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOrderSagaData {
    pub order_id: AggregateId,
    pub order_details: OrderDetails,

    /// Set from the kitchen's reply to `CreateTicket`.
    pub ticket_id: Option<u64>,
}

impl CreateOrderSagaData {
    pub fn new(order_id: AggregateId, order_details: OrderDetails) -> Self {
        Self {
            order_id,
            order_details,
            ticket_id: None,
        }
    }

    fn ticket_line_items(&self) -> Vec<TicketLineItem> {
        self.order_details
            .line_items
            .iter()
            .map(|li| TicketLineItem {
                menu_item_id: li.menu_item_id.clone(),
                name: li.name.clone(),
                quantity: li.quantity,
            })
            .collect()
    }
}

/// The order already exists in `APPROVAL_PENDING` when this saga starts, so
/// the first step only carries the compensation that rejects it.
pub fn create_order_saga() -> Result<SagaDefinition<CreateOrderSagaData>> {
    SagaDefinition::new(
        CREATE_ORDER_SAGA,
        vec![
            Step::new("create_order").with_compensation(ORDER_SERVICE, |d: &CreateOrderSagaData| {
                RejectOrder {
                    order_id: d.order_id,
                }
            }),
            Step::new("validate_consumer").invoke(CONSUMER_SERVICE, |d: &CreateOrderSagaData| {
                ValidateOrderByConsumer {
                    consumer_id: d.order_details.consumer_id,
                    order_id: d.order_id,
                    order_total: d.order_details.order_total,
                }
            }),
            Step::new("create_ticket")
                .invoke(KITCHEN_SERVICE, |d: &CreateOrderSagaData| CreateTicket {
                    restaurant_id: d.order_details.restaurant_id,
                    order_id: d.order_id,
                    line_items: d.ticket_line_items(),
                })
                .on_reply(|d: &mut CreateOrderSagaData, reply: CreateTicketReply| {
                    tracing::debug!(ticket_id = reply.ticket_id, "ticket created");
                    d.ticket_id = Some(reply.ticket_id);
                })
                .with_compensation(KITCHEN_SERVICE, |d: &CreateOrderSagaData| {
                    CancelCreateTicket {
                        order_id: d.order_id,
                    }
                }),
            Step::new("authorize_card").invoke(ACCOUNTING_SERVICE, |d: &CreateOrderSagaData| {
                Authorize {
                    consumer_id: d.order_details.consumer_id,
                    order_id: d.order_id,
                    order_total: d.order_details.order_total,
                }
            }),
            Step::new("confirm_ticket").invoke(KITCHEN_SERVICE, |d: &CreateOrderSagaData| {
                ConfirmCreateTicket {
                    ticket_id: d.ticket_id.unwrap_or_default(),
                }
            }),
            Step::new("approve_order").invoke(ORDER_SERVICE, |d: &CreateOrderSagaData| {
                ApproveOrder {
                    order_id: d.order_id,
                }
            }),
        ],
    )
}
