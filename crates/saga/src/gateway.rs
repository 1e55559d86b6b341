//! Command gateway and the message transport it sends through.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use crate::error::{Result, SagaError};
use crate::instance::PendingCommand;
use crate::message::{CommandEnvelope, ReplyEnvelope};

/// Fire-and-forget delivery of serialized messages to named channels.
///
/// Delivery is at-least-once: receivers must tolerate duplicates.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn publish(&self, channel: &str, message: Vec<u8>) -> Result<()>;
}

#[async_trait]
impl<T: MessageTransport + ?Sized> MessageTransport for Arc<T> {
    async fn publish(&self, channel: &str, message: Vec<u8>) -> Result<()> {
        (**self).publish(channel, message).await
    }
}

#[derive(Default)]
struct Inner {
    record: bool,
    log: HashMap<String, Vec<Vec<u8>>>,
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<Vec<u8>>>>,
    fail_on_publish: bool,
}

/// In-process transport that forwards each published message to the
/// channel's subscribers.
///
/// A transport built with `recording()` also keeps every message in a
/// per-channel log, read back with `messages`, `commands` and `replies`.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryTransport {
    /// Forwards only; nothing is retained after delivery.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forwards and keeps a log of everything published.
    pub fn recording() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                record: true,
                ..Inner::default()
            })),
        }
    }

    /// Receives every message published to `channel` from now on.
    pub async fn subscribe(&self, channel: &str) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .await
            .subscribers
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Raw messages published to `channel`, oldest first. Always empty
    /// unless the transport is recording.
    pub async fn messages(&self, channel: &str) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .await
            .log
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }

    /// Published messages that parse as commands.
    pub async fn commands(&self, channel: &str) -> Vec<CommandEnvelope> {
        self.messages(channel)
            .await
            .iter()
            .filter_map(|m| CommandEnvelope::from_slice(m).ok())
            .collect()
    }

    /// Published messages that parse as replies.
    pub async fn replies(&self, channel: &str) -> Vec<ReplyEnvelope> {
        self.messages(channel)
            .await
            .iter()
            .filter_map(|m| ReplyEnvelope::from_slice(m).ok())
            .collect()
    }

    /// Makes every publish fail until reset, for exercising send errors.
    pub async fn set_fail_on_publish(&self, fail: bool) {
        self.inner.lock().await.fail_on_publish = fail;
    }
}

#[async_trait]
impl MessageTransport for InMemoryTransport {
    async fn publish(&self, channel: &str, message: Vec<u8>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.fail_on_publish {
            return Err(SagaError::Transport(format!(
                "publish to {channel} refused"
            )));
        }

        if let Some(subscribers) = inner.subscribers.get_mut(channel) {
            subscribers.retain(|tx| tx.send(message.clone()).is_ok());
        }
        if inner.record {
            inner
                .log
                .entry(channel.to_string())
                .or_default()
                .push(message);
        }
        Ok(())
    }
}

/// Sends pending saga commands to their destinations, tagged with the
/// correlation id and the channel replies should come back on.
pub struct CommandGateway<T: MessageTransport> {
    transport: T,
    reply_channel: String,
}

impl<T: MessageTransport> CommandGateway<T> {
    pub fn new(transport: T, reply_channel: impl Into<String>) -> Self {
        Self {
            transport,
            reply_channel: reply_channel.into(),
        }
    }

    pub fn reply_channel(&self) -> &str {
        &self.reply_channel
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends (or resends) a pending command. A resend produces a byte-equal
    /// envelope.
    #[tracing::instrument(
        skip(self, pending),
        fields(
            correlation_id = %pending.correlation_id,
            destination = %pending.destination,
            command_type = %pending.command_type,
            attempt = pending.attempts
        )
    )]
    pub async fn send(&self, pending: &PendingCommand) -> Result<()> {
        let bytes = pending.envelope(&self.reply_channel).to_bytes()?;
        self.transport.publish(&pending.destination, bytes).await?;
        tracing::debug!("command sent");
        Ok(())
    }
}
