//! Order service: the boundary between callers and the order aggregate.

use std::sync::Arc;

use store::{AggregateId, RecordStore};

use crate::aggregate::Aggregate;
use crate::error::DomainError;
use crate::observer::{NoopOrderObserver, OrderObserver};
use crate::repository::Repository;
use crate::restaurant::{MenuItem, Restaurant, RestaurantId, RestaurantRepository};

use super::{
    ConsumerId, DeliveryInformation, LineItemQuantityChange, MenuItemIdAndQuantity, Money, Order,
    OrderError, OrderLimits, OrderLineItem, OrderRevision,
};

/// Service for managing orders.
///
/// Each mutator is a single read-modify-write: load the order, apply one
/// state transition, save it together with its events. A lost version race
/// surfaces as `DomainError::ConcurrentModification`.
pub struct OrderService<S: RecordStore, R: RestaurantRepository> {
    orders: Repository<S, Order>,
    restaurants: R,
    limits: OrderLimits,
    observer: Arc<dyn OrderObserver>,
}

impl<S: RecordStore, R: RestaurantRepository> OrderService<S, R> {
    pub fn new(store: S, restaurants: R) -> Self {
        Self {
            orders: Repository::new(store),
            restaurants,
            limits: OrderLimits::default(),
            observer: Arc::new(NoopOrderObserver),
        }
    }

    pub fn with_limits(mut self, limits: OrderLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn OrderObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Returns a reference to the order repository.
    pub fn orders(&self) -> &Repository<S, Order> {
        &self.orders
    }

    pub fn restaurants(&self) -> &R {
        &self.restaurants
    }

    /// Registers a restaurant menu replicated from the restaurant service.
    #[tracing::instrument(skip(self, menu_items))]
    pub async fn create_menu(
        &self,
        id: RestaurantId,
        name: &str,
        menu_items: Vec<MenuItem>,
    ) -> Result<(), DomainError> {
        self.restaurants
            .save(Restaurant::new(id, name, menu_items))
            .await
    }

    /// Prices the requested items against the restaurant menu and saves a
    /// new order in `APPROVAL_PENDING`.
    ///
    /// Nothing is written if the restaurant or any menu item is unknown, if
    /// any quantity is zero, or if the total overflows.
    #[tracing::instrument(skip(self, delivery_information, items))]
    pub async fn create_order(
        &self,
        consumer_id: ConsumerId,
        restaurant_id: RestaurantId,
        delivery_information: DeliveryInformation,
        items: Vec<MenuItemIdAndQuantity>,
    ) -> Result<Order, DomainError> {
        let restaurant = self
            .restaurants
            .find_by_id(restaurant_id)
            .await?
            .ok_or(OrderError::RestaurantNotFound(restaurant_id))?;

        let line_items = Self::make_line_items(&restaurant, items)?;
        let (order, events) = Order::create(
            consumer_id,
            &restaurant,
            delivery_information,
            line_items,
            self.limits,
        );

        let order = self.orders.save(order, events).await?;
        tracing::info!(
            order_id = ?order.id(),
            total = %order.order_total(),
            "order created"
        );
        self.observer.on_order_placed(&order);
        Ok(order)
    }

    pub async fn get_order(&self, order_id: AggregateId) -> Result<Order, DomainError> {
        self.orders.get(order_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn approve_order(&self, order_id: AggregateId) -> Result<Order, DomainError> {
        let order = self
            .orders
            .update(order_id, |order| order.approve())
            .await?
            .aggregate;
        self.observer.on_order_approved(&order);
        Ok(order)
    }

    #[tracing::instrument(skip(self))]
    pub async fn reject_order(&self, order_id: AggregateId) -> Result<Order, DomainError> {
        let order = self
            .orders
            .update(order_id, |order| order.reject())
            .await?
            .aggregate;
        self.observer.on_order_rejected(&order);
        Ok(order)
    }

    #[tracing::instrument(skip(self))]
    pub async fn begin_cancel(&self, order_id: AggregateId) -> Result<Order, DomainError> {
        Ok(self
            .orders
            .update(order_id, |order| order.begin_cancel())
            .await?
            .aggregate)
    }

    #[tracing::instrument(skip(self))]
    pub async fn undo_cancel(&self, order_id: AggregateId) -> Result<Order, DomainError> {
        Ok(self
            .orders
            .update(order_id, |order| order.undo_cancel())
            .await?
            .aggregate)
    }

    #[tracing::instrument(skip(self))]
    pub async fn confirm_cancelled(&self, order_id: AggregateId) -> Result<Order, DomainError> {
        let order = self
            .orders
            .update(order_id, |order| order.confirm_cancel())
            .await?
            .aggregate;
        self.observer.on_order_cancelled(&order);
        Ok(order)
    }

    /// Starts a revision and returns the totals the other services must
    /// accept; accounting authorizes `change.delta`.
    #[tracing::instrument(skip(self, revision))]
    pub async fn begin_revise_order(
        &self,
        order_id: AggregateId,
        revision: &OrderRevision,
    ) -> Result<(Order, LineItemQuantityChange), DomainError> {
        let order = self
            .orders
            .update(order_id, |order| order.begin_revision(revision))
            .await?
            .aggregate;

        // Line items are unchanged while the revision is pending
        let change = order.line_item_quantity_change(revision)?;
        Ok((order, change))
    }

    #[tracing::instrument(skip(self))]
    pub async fn undo_pending_revision(&self, order_id: AggregateId) -> Result<Order, DomainError> {
        Ok(self
            .orders
            .update(order_id, |order| order.reject_revision())
            .await?
            .aggregate)
    }

    #[tracing::instrument(skip(self, revision))]
    pub async fn confirm_revision(
        &self,
        order_id: AggregateId,
        revision: &OrderRevision,
    ) -> Result<Order, DomainError> {
        let order = self
            .orders
            .update(order_id, |order| order.confirm_revision(revision))
            .await?
            .aggregate;
        self.observer.on_order_revised(&order);
        Ok(order)
    }

    fn make_line_items(
        restaurant: &Restaurant,
        items: Vec<MenuItemIdAndQuantity>,
    ) -> Result<Vec<OrderLineItem>, OrderError> {
        let line_items = items
            .into_iter()
            .map(|item| {
                if item.quantity == 0 {
                    return Err(OrderError::InvalidQuantity {
                        menu_item_id: item.menu_item_id,
                        quantity: item.quantity,
                    });
                }
                let menu_item = restaurant
                    .find_menu_item(&item.menu_item_id)
                    .ok_or_else(|| OrderError::InvalidMenuItemId(item.menu_item_id.clone()))?;
                Ok(OrderLineItem::new(
                    menu_item.id.clone(),
                    menu_item.name.clone(),
                    menu_item.price,
                    item.quantity,
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;

        line_items
            .iter()
            .try_fold(Money::zero(), |acc, line_item| {
                line_item.checked_total().and_then(|total| acc.checked_add(total))
            })
            .ok_or(OrderError::AmountOverflow)?;
        Ok(line_items)
    }
}
