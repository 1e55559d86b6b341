//! Entry points that change an order through a saga.

use std::sync::Arc;

use domain::{
    Aggregate, ConsumerId, DeliveryInformation, MenuItemIdAndQuantity, Order,
    OrderRevision, OrderService, RestaurantId, RestaurantRepository,
};
use saga::{MessageTransport, SagaInstanceStore, SagaOrchestrator};
use store::{AggregateId, RecordStore};

use crate::error::{OrderingError, Result};
use crate::sagas::{CancelOrderSagaData, CreateOrderSagaData, OrderSagas, ReviseOrderSagaData};

/// Creates, cancels and revises orders.
///
/// Creation validates and saves the order synchronously, then starts the
/// create-order saga; validation errors start nothing. Cancel and revise
/// only start their saga: the order changes as the saga's commands arrive.
pub struct OrderSagaService<S, R, IS, T>
where
    S: RecordStore,
    R: RestaurantRepository,
    IS: SagaInstanceStore,
    T: MessageTransport,
{
    orders: Arc<OrderService<S, R>>,
    orchestrator: Arc<SagaOrchestrator<IS, T>>,
    sagas: OrderSagas,
}

impl<S, R, IS, T> OrderSagaService<S, R, IS, T>
where
    S: RecordStore,
    R: RestaurantRepository,
    IS: SagaInstanceStore,
    T: MessageTransport,
{
    /// `orchestrator` must have `sagas` registered.
    pub fn new(
        orders: Arc<OrderService<S, R>>,
        orchestrator: Arc<SagaOrchestrator<IS, T>>,
        sagas: OrderSagas,
    ) -> Self {
        Self {
            orders,
            orchestrator,
            sagas,
        }
    }

    pub fn orders(&self) -> &Arc<OrderService<S, R>> {
        &self.orders
    }

    pub fn orchestrator(&self) -> &Arc<SagaOrchestrator<IS, T>> {
        &self.orchestrator
    }

    /// Returns the saved order (in `APPROVAL_PENDING`) and the saga id.
    #[tracing::instrument(skip(self, delivery_information, items))]
    pub async fn create_order(
        &self,
        consumer_id: ConsumerId,
        restaurant_id: RestaurantId,
        delivery_information: DeliveryInformation,
        items: Vec<MenuItemIdAndQuantity>,
    ) -> Result<(Order, AggregateId)> {
        let order = self
            .orders
            .create_order(consumer_id, restaurant_id, delivery_information, items)
            .await?;
        let order_id = Self::order_id(&order)?;

        let data = CreateOrderSagaData::new(order_id, order.details());
        let saga_id = self
            .orchestrator
            .start(&self.sagas.create_order, &data)
            .await?;
        tracing::info!(%order_id, %saga_id, "create order saga started");

        Ok((order, saga_id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, order_id: AggregateId) -> Result<AggregateId> {
        let order = self.orders.get_order(order_id).await?;

        let data = CancelOrderSagaData::for_order(order_id, &order);
        let saga_id = self
            .orchestrator
            .start(&self.sagas.cancel_order, &data)
            .await?;
        tracing::info!(%saga_id, "cancel order saga started");

        Ok(saga_id)
    }

    #[tracing::instrument(skip(self, revision))]
    pub async fn revise_order(
        &self,
        order_id: AggregateId,
        revision: OrderRevision,
    ) -> Result<AggregateId> {
        let order = self.orders.get_order(order_id).await?;

        let data = ReviseOrderSagaData::for_order(order_id, &order, revision);
        let saga_id = self
            .orchestrator
            .start(&self.sagas.revise_order, &data)
            .await?;
        tracing::info!(%saga_id, "revise order saga started");

        Ok(saga_id)
    }

    fn order_id(order: &Order) -> Result<AggregateId> {
        order.id().ok_or(OrderingError::MissingOrderId)
    }
}
