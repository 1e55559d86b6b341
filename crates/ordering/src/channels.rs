//! Command channel names of the saga participants.

pub const ORDER_SERVICE: &str = "orderService";
pub const CONSUMER_SERVICE: &str = "consumerService";
pub const KITCHEN_SERVICE: &str = "kitchenService";
pub const ACCOUNTING_SERVICE: &str = "accountingService";

/// Where participants send replies to order saga commands.
pub const ORDER_SAGA_REPLIES: &str = "orderSagaReplies";
