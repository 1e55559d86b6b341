//! Order state machine.

use serde::{Deserialize, Serialize};

/// The state of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// APPROVAL_PENDING ──► APPROVED ◄──► CANCEL_PENDING ──► CANCELLED
///        │                ▲ │
///        ▼                │ ▼
///     REJECTED       REVISION_PENDING
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    /// Created, waiting for the create-order saga.
    #[default]
    ApprovalPending,

    Approved,

    /// The create-order saga failed (terminal state).
    Rejected,

    /// A revision is awaiting confirmation from the other services.
    RevisionPending,

    /// A cancellation is awaiting confirmation from the other services.
    CancelPending,

    /// Order was cancelled (terminal state).
    Cancelled,
}

impl OrderState {
    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Rejected | OrderState::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::ApprovalPending => "APPROVAL_PENDING",
            OrderState::Approved => "APPROVED",
            OrderState::Rejected => "REJECTED",
            OrderState::RevisionPending => "REVISION_PENDING",
            OrderState::CancelPending => "CANCEL_PENDING",
            OrderState::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
