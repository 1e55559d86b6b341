//! The order service as a saga participant.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use domain::{DomainError, OrderService, RestaurantRepository};
use saga::{CommandEnvelope, CorrelationId, MessageTransport, ReplyEnvelope};
use store::RecordStore;
use tokio::sync::{Mutex, mpsc};

use crate::messages::{BeginReviseOrderReply, OrderServiceCommand};

const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;
const DEFAULT_REPLY_CACHE_SIZE: usize = 10_000;

/// Recent replies by correlation id, oldest evicted first.
struct ReplyCache {
    replies: HashMap<CorrelationId, ReplyEnvelope>,
    order: VecDeque<CorrelationId>,
    capacity: usize,
}

impl ReplyCache {
    fn new(capacity: usize) -> Self {
        Self {
            replies: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn get(&self, id: &CorrelationId) -> Option<&ReplyEnvelope> {
        self.replies.get(id)
    }

    fn insert(&mut self, reply: ReplyEnvelope) {
        let id = reply.correlation_id;
        if self.replies.insert(id, reply).is_none() {
            self.order.push_back(id);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.replies.remove(&oldest);
            }
        }
    }
}

/// Consumes the order service command channel, applies each command to
/// the order aggregate and replies on the envelope's reply channel.
///
/// Commands are delivered at least once. A redelivered correlation id gets
/// the reply already sent for it, without touching the order again.
pub struct OrderCommandHandler<S: RecordStore, R: RestaurantRepository, T: MessageTransport> {
    orders: Arc<OrderService<S, R>>,
    transport: T,
    replies: Mutex<ReplyCache>,
    max_conflict_retries: u32,
}

impl<S: RecordStore, R: RestaurantRepository, T: MessageTransport> OrderCommandHandler<S, R, T> {
    pub fn new(orders: Arc<OrderService<S, R>>, transport: T) -> Self {
        Self {
            orders,
            transport,
            replies: Mutex::new(ReplyCache::new(DEFAULT_REPLY_CACHE_SIZE)),
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    /// Handles one raw message and publishes its reply.
    pub async fn on_message(&self, message: &[u8]) {
        let envelope = match CommandEnvelope::from_slice(message) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "protocol violation: malformed command envelope");
                return;
            }
        };

        let Some(reply) = self.handle(&envelope).await else {
            return;
        };
        let bytes = match reply.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "reply serialization failed");
                return;
            }
        };
        if let Err(e) = self.transport.publish(&envelope.reply_channel, bytes).await {
            // The saga resends the command and gets the cached reply
            tracing::warn!(correlation_id = %envelope.correlation_id, error = %e, "reply publish failed");
        }
    }

    /// Applies a command and returns the reply to send.
    ///
    /// Returns `None` when no reply should be sent yet: the order stayed
    /// contended after the retry budget, or storage failed. The saga's
    /// resend brings the command back.
    #[tracing::instrument(
        skip(self, envelope),
        fields(correlation_id = %envelope.correlation_id, command_type = %envelope.command_type)
    )]
    pub async fn handle(&self, envelope: &CommandEnvelope) -> Option<ReplyEnvelope> {
        let correlation_id = envelope.correlation_id;
        if let Some(reply) = self.replies.lock().await.get(&correlation_id) {
            tracing::debug!("duplicate command, resending reply");
            metrics::counter!("order_commands_deduplicated_total").increment(1);
            return Some(reply.clone());
        }

        let reply = match OrderServiceCommand::decode(envelope) {
            Ok(command) => self.execute_with_retry(correlation_id, &command).await?,
            Err(e) => {
                tracing::warn!(error = %e, "protocol violation: undecodable command");
                ReplyEnvelope::failure(correlation_id, e.to_string())
            }
        };

        self.replies.lock().await.insert(reply.clone());
        Some(reply)
    }

    /// Consumes commands until the channel closes.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
        while let Some(message) = rx.recv().await {
            self.on_message(&message).await;
        }
        tracing::info!("order command channel closed, handler stopping");
    }

    async fn execute_with_retry(
        &self,
        correlation_id: CorrelationId,
        command: &OrderServiceCommand,
    ) -> Option<ReplyEnvelope> {
        let order_id = command.order_id();
        let mut retries = 0;

        loop {
            match self.execute(correlation_id, command).await {
                Ok(reply) => return Some(reply),
                Err(e) if e.is_concurrent_modification() => {
                    if retries >= self.max_conflict_retries {
                        tracing::warn!(%order_id, retries, "order still contended, not replying");
                        return None;
                    }
                    retries += 1;
                    tracing::debug!(%order_id, retries, "concurrent modification, retrying");
                }
                Err(e @ (DomainError::Order(_) | DomainError::NotFound { .. })) => {
                    tracing::info!(%order_id, error = %e, "command refused");
                    return Some(ReplyEnvelope::failure(correlation_id, e.to_string()));
                }
                Err(e) => {
                    tracing::error!(%order_id, error = %e, "command failed");
                    return None;
                }
            }
        }
    }

    async fn execute(
        &self,
        correlation_id: CorrelationId,
        command: &OrderServiceCommand,
    ) -> Result<ReplyEnvelope, DomainError> {
        match command {
            OrderServiceCommand::RejectOrder(c) => {
                self.orders.reject_order(c.order_id).await?;
            }
            OrderServiceCommand::ApproveOrder(c) => {
                self.orders.approve_order(c.order_id).await?;
            }
            OrderServiceCommand::BeginCancel(c) => {
                self.orders.begin_cancel(c.order_id).await?;
            }
            OrderServiceCommand::UndoBeginCancel(c) => {
                self.orders.undo_cancel(c.order_id).await?;
            }
            OrderServiceCommand::ConfirmCancelOrder(c) => {
                self.orders.confirm_cancelled(c.order_id).await?;
            }
            OrderServiceCommand::BeginReviseOrder(c) => {
                let (_, change) = self
                    .orders
                    .begin_revise_order(c.order_id, &c.revision)
                    .await?;
                let reply = BeginReviseOrderReply {
                    revised_order_total: change.new_order_total,
                    delta: change.delta,
                };
                return Ok(ReplyEnvelope::success(
                    correlation_id,
                    "BeginReviseOrderReply",
                    &reply,
                )?);
            }
            OrderServiceCommand::UndoBeginReviseOrder(c) => {
                self.orders.undo_pending_revision(c.order_id).await?;
            }
            OrderServiceCommand::ConfirmReviseOrder(c) => {
                self.orders.confirm_revision(c.order_id, &c.revision).await?;
            }
        }
        Ok(ReplyEnvelope::success_empty(correlation_id))
    }
}
