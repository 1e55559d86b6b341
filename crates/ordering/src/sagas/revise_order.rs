//! Revise-order saga: the order and ticket enter a pending revision, the
//! authorization is revised by the total's delta, then both are confirmed.

use domain::{ConsumerId, Money, Order, OrderRevision, RestaurantId};
use saga::{Result, SagaDefinition, Step};
use serde::{Deserialize, Serialize};
use store::AggregateId;

use crate::channels::{ACCOUNTING_SERVICE, KITCHEN_SERVICE, ORDER_SERVICE};
use crate::messages::{
    BeginReviseOrder, BeginReviseOrderReply, BeginReviseTicket, ConfirmReviseOrder,
    ConfirmReviseTicket, ReviseAuthorization, UndoBeginReviseOrder, UndoBeginReviseTicket,
};

pub const REVISE_ORDER_SAGA: &str = "ReviseOrderSaga";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviseOrderSagaData {
    pub order_id: AggregateId,
    pub consumer_id: ConsumerId,
    pub restaurant_id: RestaurantId,
    pub revision: OrderRevision,

    /// Both set from the order service's reply to `BeginReviseOrder`.
    pub revised_order_total: Option<Money>,
    pub delta: Option<Money>,
}

impl ReviseOrderSagaData {
    pub fn for_order(order_id: AggregateId, order: &Order, revision: OrderRevision) -> Self {
        Self {
            order_id,
            consumer_id: order.consumer_id(),
            restaurant_id: order.restaurant_id(),
            revision,
            revised_order_total: None,
            delta: None,
        }
    }
}

pub fn revise_order_saga() -> Result<SagaDefinition<ReviseOrderSagaData>> {
    SagaDefinition::new(
        REVISE_ORDER_SAGA,
        vec![
            Step::new("begin_revise_order")
                .invoke(ORDER_SERVICE, |d: &ReviseOrderSagaData| BeginReviseOrder {
                    order_id: d.order_id,
                    revision: d.revision.clone(),
                })
                .on_reply(|d: &mut ReviseOrderSagaData, reply: BeginReviseOrderReply| {
                    tracing::info!(
                        revised_order_total = %reply.revised_order_total,
                        delta = %reply.delta,
                        "order revision pending"
                    );
                    d.revised_order_total = Some(reply.revised_order_total);
                    d.delta = Some(reply.delta);
                })
                .with_compensation(ORDER_SERVICE, |d: &ReviseOrderSagaData| {
                    UndoBeginReviseOrder {
                        order_id: d.order_id,
                    }
                }),
            Step::new("begin_revise_ticket")
                .invoke(KITCHEN_SERVICE, |d: &ReviseOrderSagaData| BeginReviseTicket {
                    restaurant_id: d.restaurant_id,
                    order_id: d.order_id,
                    revised_line_item_quantities: d.revision.revised_line_item_quantities.clone(),
                })
                .with_compensation(KITCHEN_SERVICE, |d: &ReviseOrderSagaData| {
                    UndoBeginReviseTicket {
                        restaurant_id: d.restaurant_id,
                        order_id: d.order_id,
                    }
                }),
            Step::new("revise_authorization").invoke(
                ACCOUNTING_SERVICE,
                |d: &ReviseOrderSagaData| ReviseAuthorization {
                    consumer_id: d.consumer_id,
                    order_id: d.order_id,
                    delta: d.delta.unwrap_or_else(Money::zero),
                },
            ),
            Step::new("confirm_revise_ticket").invoke(KITCHEN_SERVICE, |d: &ReviseOrderSagaData| {
                ConfirmReviseTicket {
                    restaurant_id: d.restaurant_id,
                    order_id: d.order_id,
                    revised_line_item_quantities: d.revision.revised_line_item_quantities.clone(),
                }
            }),
            Step::new("confirm_revise_order").invoke(ORDER_SERVICE, |d: &ReviseOrderSagaData| {
                ConfirmReviseOrder {
                    order_id: d.order_id,
                    revision: d.revision.clone(),
                }
            }),
        ],
    )
}
