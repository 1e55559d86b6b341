//! Background tasks: the order participant, the reply dispatcher and the
//! timeout sweeper.

use std::sync::Arc;

use ordering::channels;
use saga::ReplyDispatcher;
use tokio::task::JoinHandle;

use crate::{AppState, Participant};

/// Handles of the spawned background tasks.
pub struct Workers {
    handles: Vec<JoinHandle<()>>,
}

impl Workers {
    /// Subscribes to the order service and reply channels and starts the
    /// sweeper.
    ///
    /// Call before `recover()` so replies to resent commands are consumed.
    pub async fn spawn(state: &AppState) -> Self {
        let commands = state.transport.subscribe(channels::ORDER_SERVICE).await;
        let replies = state
            .transport
            .subscribe(channels::ORDER_SAGA_REPLIES)
            .await;

        let participant = Arc::new(Participant::new(
            state.orders.clone(),
            state.transport.clone(),
        ));
        let dispatcher = ReplyDispatcher::new(state.orchestrator.clone());
        let sweeper = state.orchestrator.clone();

        let handles = vec![
            tokio::spawn(participant.run(commands)),
            tokio::spawn(dispatcher.run(replies)),
            tokio::spawn(async move { sweeper.run_timeouts().await }),
        ];
        tracing::info!(workers = handles.len(), "saga workers started");

        Self { handles }
    }

    /// Stops every task. In-flight sagas resume from their saved state on
    /// the next start.
    pub fn shutdown(self) {
        for handle in self.handles {
            handle.abort();
        }
        tracing::info!("saga workers stopped");
    }
}
