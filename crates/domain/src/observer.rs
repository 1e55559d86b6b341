//! Order lifecycle observer, injected into `OrderService`.

use crate::order::Order;

/// Callbacks fired after an order change has been saved.
pub trait OrderObserver: Send + Sync + 'static {
    fn on_order_placed(&self, order: &Order);
    fn on_order_approved(&self, order: &Order);
    fn on_order_rejected(&self, order: &Order);
    fn on_order_cancelled(&self, order: &Order);
    fn on_order_revised(&self, order: &Order);
}

/// No-op observer
pub struct NoopOrderObserver;

impl OrderObserver for NoopOrderObserver {
    fn on_order_placed(&self, _order: &Order) {}
    fn on_order_approved(&self, _order: &Order) {}
    fn on_order_rejected(&self, _order: &Order) {}
    fn on_order_cancelled(&self, _order: &Order) {}
    fn on_order_revised(&self, _order: &Order) {}
}

/// Counts order outcomes through the installed `metrics` recorder.
pub struct MetricsOrderObserver;

impl OrderObserver for MetricsOrderObserver {
    fn on_order_placed(&self, _order: &Order) {
        metrics::counter!("placed_orders").increment(1);
    }

    fn on_order_approved(&self, _order: &Order) {
        metrics::counter!("approved_orders").increment(1);
    }

    fn on_order_rejected(&self, _order: &Order) {
        metrics::counter!("rejected_orders").increment(1);
    }

    fn on_order_cancelled(&self, _order: &Order) {
        metrics::counter!("cancelled_orders").increment(1);
    }

    fn on_order_revised(&self, _order: &Order) {
        metrics::counter!("revised_orders").increment(1);
    }
}
