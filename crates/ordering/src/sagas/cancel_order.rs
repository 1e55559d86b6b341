//! Cancel-order saga.

use domain::{ConsumerId, Money, Order, RestaurantId};
use saga::{Result, SagaDefinition, Step};
use serde::{Deserialize, Serialize};
use store::AggregateId;

use crate::channels::{ACCOUNTING_SERVICE, KITCHEN_SERVICE, ORDER_SERVICE};
use crate::messages::{
    BeginCancel, BeginCancelTicket, ConfirmCancelOrder, ConfirmCancelTicket, ReverseAuthorization,
    UndoBeginCancel, UndoBeginCancelTicket,
};

pub const CANCEL_ORDER_SAGA: &str = "CancelOrderSaga";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelOrderSagaData {
    pub order_id: AggregateId,
    pub consumer_id: ConsumerId,
    pub restaurant_id: RestaurantId,
    pub order_total: Money,
}

impl CancelOrderSagaData {
    pub fn for_order(order_id: AggregateId, order: &Order) -> Self {
        Self {
            order_id,
            consumer_id: order.consumer_id(),
            restaurant_id: order.restaurant_id(),
            order_total: order.order_total(),
        }
    }
}

pub fn cancel_order_saga() -> Result<SagaDefinition<CancelOrderSagaData>> {
    SagaDefinition::new(
        CANCEL_ORDER_SAGA,
        vec![
            Step::new("begin_cancel")
                .invoke(ORDER_SERVICE, |d: &CancelOrderSagaData| BeginCancel {
                    order_id: d.order_id,
                })
                .with_compensation(ORDER_SERVICE, |d: &CancelOrderSagaData| UndoBeginCancel {
                    order_id: d.order_id,
                }),
            Step::new("begin_cancel_ticket")
                .invoke(KITCHEN_SERVICE, |d: &CancelOrderSagaData| BeginCancelTicket {
                    restaurant_id: d.restaurant_id,
                    order_id: d.order_id,
                })
                .with_compensation(KITCHEN_SERVICE, |d: &CancelOrderSagaData| {
                    UndoBeginCancelTicket {
                        restaurant_id: d.restaurant_id,
                        order_id: d.order_id,
                    }
                }),
            // The order has no state of its own for a reversed authorization
            Step::new("reverse_authorization").invoke(
                ACCOUNTING_SERVICE,
                |d: &CancelOrderSagaData| ReverseAuthorization {
                    consumer_id: d.consumer_id,
                    order_id: d.order_id,
                    order_total: d.order_total,
                },
            ),
            Step::new("confirm_cancel_ticket").invoke(KITCHEN_SERVICE, |d: &CancelOrderSagaData| {
                ConfirmCancelTicket {
                    restaurant_id: d.restaurant_id,
                    order_id: d.order_id,
                }
            }),
            Step::new("confirm_cancel_order").invoke(ORDER_SERVICE, |d: &CancelOrderSagaData| {
                ConfirmCancelOrder {
                    order_id: d.order_id,
                }
            }),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use saga::SagaRunner;

    fn data() -> serde_json::Value {
        serde_json::to_value(CancelOrderSagaData {
            order_id: AggregateId::new(),
            consumer_id: ConsumerId::new(),
            restaurant_id: RestaurantId::new(),
            order_total: Money::from_cents(2500),
        })
        .unwrap()
    }

    #[test]
    fn test_destinations_in_order() {
        let saga = cancel_order_saga().unwrap();
        let data = data();

        let sent: Vec<(String, String)> = (0..saga.step_count())
            .map(|i| {
                let cmd = saga.forward_command(i, &data).unwrap().unwrap();
                (cmd.destination, cmd.command_type)
            })
            .collect();

        assert_eq!(
            sent,
            [
                (ORDER_SERVICE.to_string(), "BeginCancel".to_string()),
                (KITCHEN_SERVICE.to_string(), "BeginCancelTicket".to_string()),
                (ACCOUNTING_SERVICE.to_string(), "ReverseAuthorization".to_string()),
                (KITCHEN_SERVICE.to_string(), "ConfirmCancelTicket".to_string()),
                (ORDER_SERVICE.to_string(), "ConfirmCancelOrder".to_string()),
            ]
        );
    }

    #[test]
    fn test_only_begin_steps_are_compensatable() {
        let saga = cancel_order_saga().unwrap();

        let compensated: Vec<_> = (0..saga.step_count())
            .filter(|&i| saga.has_compensation(i))
            .collect();

        assert_eq!(compensated, [0, 1]);
        let undo = saga.compensation_command(0, &data()).unwrap().unwrap();
        assert_eq!(undo.command_type, "UndoBeginCancel");
    }
}
