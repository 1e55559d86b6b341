//! Order aggregate implementation.

use serde::{Deserialize, Serialize};
use store::{AggregateId, Version};

use crate::aggregate::Aggregate;
use crate::restaurant::{MenuItemId, Restaurant, RestaurantId};

use super::{
    ConsumerId, DeliveryInformation, LineItemQuantityChange, Money, OrderDetails, OrderError,
    OrderEvent, OrderLimits, OrderLineItem, OrderRevision, OrderState,
    events::{OrderCreatedData, OrderRevisionData},
};

/// Order aggregate root.
///
/// Operations check the current state first and only then mutate it, so a
/// rejected operation leaves the order exactly as it was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    id: Option<AggregateId>,

    /// Current version for optimistic concurrency.
    #[serde(default)]
    version: Version,

    state: OrderState,
    consumer_id: ConsumerId,
    restaurant_id: RestaurantId,
    line_items: Vec<OrderLineItem>,
    delivery_information: DeliveryInformation,

    /// Revisions reaching this total are refused.
    order_minimum: Money,
}

impl Aggregate for Order {
    type Event = OrderEvent;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn assign_id(&mut self, id: AggregateId) {
        self.id = Some(id);
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

// Query methods
impl Order {
    pub fn state(&self) -> OrderState {
        self.state
    }

    pub fn consumer_id(&self) -> ConsumerId {
        self.consumer_id
    }

    pub fn restaurant_id(&self) -> RestaurantId {
        self.restaurant_id
    }

    pub fn line_items(&self) -> &[OrderLineItem] {
        &self.line_items
    }

    pub fn delivery_information(&self) -> &DeliveryInformation {
        &self.delivery_information
    }

    /// Σ price × quantity over all line items.
    pub fn order_total(&self) -> Money {
        self.line_items.iter().map(OrderLineItem::total).sum()
    }

    pub fn details(&self) -> OrderDetails {
        OrderDetails {
            consumer_id: self.consumer_id,
            restaurant_id: self.restaurant_id,
            line_items: self.line_items.clone(),
            order_total: self.order_total(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn find_line_item(&self, menu_item_id: &MenuItemId) -> Option<&OrderLineItem> {
        self.line_items
            .iter()
            .find(|li| &li.menu_item_id == menu_item_id)
    }

    /// Computes the totals a revision would produce without applying it.
    ///
    /// The new total is the current total plus the folded per-line deltas.
    pub fn line_item_quantity_change(
        &self,
        revision: &OrderRevision,
    ) -> Result<LineItemQuantityChange, OrderError> {
        let current_order_total = self.order_total();
        let delta = revision.revised_line_item_quantities.iter().try_fold(
            Money::zero(),
            |acc, (menu_item_id, new_quantity)| {
                let line_item = self
                    .find_line_item(menu_item_id)
                    .ok_or_else(|| OrderError::InvalidLineItem(menu_item_id.clone()))?;
                line_item
                    .delta_for_changed_quantity(*new_quantity)
                    .and_then(|line_delta| acc.checked_add(line_delta))
                    .ok_or(OrderError::AmountOverflow)
            },
        )?;
        let new_order_total = current_order_total
            .checked_add(delta)
            .ok_or(OrderError::AmountOverflow)?;

        Ok(LineItemQuantityChange {
            current_order_total,
            new_order_total,
            delta,
        })
    }

    fn require_state(&self, expected: OrderState, operation: &'static str) -> Result<(), OrderError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(OrderError::UnsupportedStateTransition {
                state: self.state,
                operation,
            })
        }
    }
}

// Command methods (mutate and return events)
impl Order {
    /// Creates an order in `APPROVAL_PENDING`. The id is assigned on first save.
    pub fn create(
        consumer_id: ConsumerId,
        restaurant: &Restaurant,
        delivery_information: DeliveryInformation,
        line_items: Vec<OrderLineItem>,
        limits: OrderLimits,
    ) -> (Order, Vec<OrderEvent>) {
        let order = Order {
            id: None,
            version: Version::initial(),
            state: OrderState::ApprovalPending,
            consumer_id,
            restaurant_id: restaurant.id,
            line_items,
            delivery_information,
            order_minimum: limits.max_order_total,
        };

        let event = OrderEvent::OrderCreated(OrderCreatedData {
            details: order.details(),
            delivery_address: order.delivery_information.delivery_address.clone(),
            restaurant_name: restaurant.name.clone(),
        });

        (order, vec![event])
    }

    pub fn approve(&mut self) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_state(OrderState::ApprovalPending, "approve")?;
        self.state = OrderState::Approved;
        Ok(vec![OrderEvent::OrderAuthorized])
    }

    pub fn reject(&mut self) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_state(OrderState::ApprovalPending, "reject")?;
        self.state = OrderState::Rejected;
        Ok(vec![OrderEvent::OrderRejected])
    }

    pub fn begin_cancel(&mut self) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_state(OrderState::Approved, "begin cancel")?;
        self.state = OrderState::CancelPending;
        Ok(vec![])
    }

    pub fn undo_cancel(&mut self) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_state(OrderState::CancelPending, "undo cancel")?;
        self.state = OrderState::Approved;
        Ok(vec![])
    }

    pub fn confirm_cancel(&mut self) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_state(OrderState::CancelPending, "confirm cancel")?;
        self.state = OrderState::Cancelled;
        Ok(vec![OrderEvent::OrderCancelled])
    }

    /// Moves an approved order to `REVISION_PENDING`.
    ///
    /// Fails with `OrderMinimumNotMet` when the revised total would reach the
    /// order's limit. Line items are not changed until `confirm_revision`.
    pub fn begin_revision(
        &mut self,
        revision: &OrderRevision,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_state(OrderState::Approved, "begin revision")?;

        let change = self.line_item_quantity_change(revision)?;
        if change.new_order_total >= self.order_minimum {
            return Err(OrderError::OrderMinimumNotMet {
                new_total: change.new_order_total,
                limit: self.order_minimum,
            });
        }

        self.state = OrderState::RevisionPending;
        Ok(vec![OrderEvent::OrderRevisionProposed(OrderRevisionData {
            revision: revision.clone(),
            current_order_total: change.current_order_total,
            new_order_total: change.new_order_total,
        })])
    }

    pub fn reject_revision(&mut self) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_state(OrderState::RevisionPending, "reject revision")?;
        self.state = OrderState::Approved;
        Ok(vec![])
    }

    /// Applies a pending revision and returns the order to `APPROVED`.
    pub fn confirm_revision(
        &mut self,
        revision: &OrderRevision,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_state(OrderState::RevisionPending, "confirm revision")?;

        let change = self.line_item_quantity_change(revision)?;

        if let Some(delivery_information) = &revision.delivery_information {
            self.delivery_information = delivery_information.clone();
        }
        for line_item in &mut self.line_items {
            if let Some(quantity) = revision
                .revised_line_item_quantities
                .get(&line_item.menu_item_id)
            {
                line_item.quantity = *quantity;
            }
        }
        self.state = OrderState::Approved;

        Ok(vec![OrderEvent::OrderRevised(OrderRevisionData {
            revision: revision.clone(),
            current_order_total: change.current_order_total,
            new_order_total: change.new_order_total,
        })])
    }
}
