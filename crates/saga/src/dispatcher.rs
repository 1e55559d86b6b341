//! Routes raw reply messages to the orchestrator.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::gateway::MessageTransport;
use crate::message::ReplyEnvelope;
use crate::orchestrator::{DiscardReason, ReplyDisposition, SagaOrchestrator};
use crate::store::SagaInstanceStore;

/// Reply-channel consumer. Malformed or unroutable messages are logged and
/// dropped; nothing a participant sends can stop the loop.
pub struct ReplyDispatcher<S: SagaInstanceStore, T: MessageTransport> {
    orchestrator: Arc<SagaOrchestrator<S, T>>,
}

impl<S: SagaInstanceStore, T: MessageTransport> Clone for ReplyDispatcher<S, T> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
        }
    }
}

impl<S: SagaInstanceStore, T: MessageTransport> ReplyDispatcher<S, T> {
    pub fn new(orchestrator: Arc<SagaOrchestrator<S, T>>) -> Self {
        Self { orchestrator }
    }

    /// Handles one message. Returns `None` when the message never reached
    /// an instance.
    pub async fn on_message(&self, message: &[u8]) -> Option<ReplyDisposition> {
        let reply = match ReplyEnvelope::from_slice(message) {
            Ok(reply) => reply,
            Err(e) => {
                self.protocol_violation(&format!("malformed reply envelope: {e}"));
                return None;
            }
        };

        let correlation_id = reply.correlation_id;
        match self.orchestrator.handle_reply(reply).await {
            Ok(ReplyDisposition::Discarded(DiscardReason::UnknownSaga)) => {
                self.protocol_violation(&format!("reply for unknown saga {correlation_id}"));
                Some(ReplyDisposition::Discarded(DiscardReason::UnknownSaga))
            }
            Ok(disposition) => Some(disposition),
            Err(e) => {
                tracing::error!(%correlation_id, error = %e, "reply handling failed");
                None
            }
        }
    }

    /// Consumes messages until the channel closes.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
        while let Some(message) = rx.recv().await {
            self.on_message(&message).await;
        }
        tracing::info!("reply channel closed, dispatcher stopping");
    }

    fn protocol_violation(&self, reason: &str) {
        tracing::warn!(reason, "protocol violation");
        self.orchestrator.observer().on_protocol_violation(reason);
    }
}
