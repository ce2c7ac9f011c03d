//! Push state machine.
//!
//! Edges:
//! - draft → sending, scheduled → sending (dispatch start)
//! - sending → completed (all resolvable recipients attempted)
//! - sending → cancelled (pre-flight abort)
//! - draft → cancelled, scheduled → cancelled (operator cancel)
//! - draft → scheduled, scheduled → scheduled (editing)
//!
//! `completed` and `cancelled` are terminal. Every transition is applied with
//! a conditional update on the store, so two callers racing for the same edge
//! cannot both win.

use std::sync::Arc;

use thiserror::Error;

use pushcast_common::error::AppError;
use pushcast_common::types::{PushId, PushStatus};

use crate::store::PushStore;

/// Statuses from which a dispatch run may start.
pub const DISPATCHABLE: &[PushStatus] = &[PushStatus::Draft, PushStatus::Scheduled];

/// Whether a push in `status` may still be edited or deleted.
pub fn is_mutable(status: PushStatus) -> bool {
    matches!(status, PushStatus::Draft | PushStatus::Scheduled)
}

/// Whether `from → to` is an edge of the lifecycle graph.
pub fn can_transition(from: PushStatus, to: PushStatus) -> bool {
    use PushStatus::*;

    matches!(
        (from, to),
        (Draft, Sending)
            | (Scheduled, Sending)
            | (Sending, Completed)
            | (Sending, Cancelled)
            | (Draft, Cancelled)
            | (Scheduled, Cancelled)
            | (Draft, Scheduled)
            | (Scheduled, Scheduled)
    )
}

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("illegal transition {from} -> {to}")]
    Illegal { from: PushStatus, to: PushStatus },

    /// The push was not in any of the expected states when the update ran.
    #[error("push {push_id} is not in a state that allows moving to {to}")]
    Conflict { push_id: PushId, to: PushStatus },

    #[error(transparent)]
    Store(#[from] AppError),
}

/// Applies lifecycle transitions through a `PushStore`.
#[derive(Clone)]
pub struct PushStateMachine {
    store: Arc<dyn PushStore>,
}

impl PushStateMachine {
    pub fn new(store: Arc<dyn PushStore>) -> Self {
        Self { store }
    }

    /// Move a push from any of `from` to `to` in one atomic step.
    pub async fn transition(
        &self,
        push_id: PushId,
        from: &[PushStatus],
        to: PushStatus,
    ) -> Result<(), TransitionError> {
        if let Some(&bad) = from.iter().find(|&&f| !can_transition(f, to)) {
            return Err(TransitionError::Illegal { from: bad, to });
        }

        if self.store.compare_and_set_status(push_id, from, to).await? {
            tracing::info!(push_id, to = %to, "Push status changed");
            Ok(())
        } else {
            Err(TransitionError::Conflict { push_id, to })
        }
    }

    /// draft/scheduled → sending. The gate that keeps dispatch runs of one push exclusive.
    pub async fn start_dispatch(&self, push_id: PushId) -> Result<(), TransitionError> {
        self.transition(push_id, DISPATCHABLE, PushStatus::Sending)
            .await
    }

    /// sending → completed.
    pub async fn complete(&self, push_id: PushId) -> Result<(), TransitionError> {
        self.transition(push_id, &[PushStatus::Sending], PushStatus::Completed)
            .await
    }

    /// sending → cancelled, for runs that fail before any recipient is attempted.
    pub async fn abort(&self, push_id: PushId) -> Result<(), TransitionError> {
        self.transition(push_id, &[PushStatus::Sending], PushStatus::Cancelled)
            .await
    }

    /// draft/scheduled → cancelled, on operator request.
    pub async fn cancel(&self, push_id: PushId) -> Result<(), TransitionError> {
        self.transition(push_id, DISPATCHABLE, PushStatus::Cancelled)
            .await
    }
}
