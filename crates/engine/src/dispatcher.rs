//! Delivery executor: fans one push out to its live audience.
//!
//! A dispatch run:
//! 1. Moves the push to `sending` (atomic gate, rejects re-entrant runs) and
//!    reads back the claimed row
//! 2. Resolves content and audience; failure here cancels the push
//! 3. Attempts every recipient in order, one log row + counter update each,
//!    with a flat pause between attempts
//! 4. Moves the push to `completed`, whatever the per-recipient outcomes
//!
//! A run that errors after the claim is released to `cancelled`.
//! Recipients are processed sequentially within a run.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pushcast_common::config::AppConfig;
use pushcast_common::content::ResolvedContent;
use pushcast_common::error::AppError;
use pushcast_common::transport::{Transport, TransportError};
use pushcast_common::types::{MessageRef, NewDeliveryLog, Push, PushId, PushStatus, Recipient};

use crate::resolver::{ContentError, ContentResolver};
use crate::selector::{AudienceError, RecipientSelector};
use crate::state::{PushStateMachine, TransitionError};
use crate::store::{PushStore, RecipientStore};

/// Aggregate result of one dispatch run.
///
/// `attempted == succeeded + failed` always holds. An `Ok` summary does not
/// mean every recipient received the push; inspect `failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("push {0} not found")]
    NotFound(PushId),

    #[error("push {0} is already being sent or has finished")]
    AlreadyInFlightOrDone(PushId),

    #[error("push content is invalid: {0}")]
    ContentInvalid(#[from] ContentError),

    #[error("push audience is invalid: {0}")]
    AudienceInvalid(#[from] AudienceError),

    #[error(transparent)]
    Store(#[from] AppError),
}

impl From<TransitionError> for DispatchError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::Store(e) => DispatchError::Store(e),
            other => DispatchError::Store(AppError::Conflict(other.to_string())),
        }
    }
}

impl From<DispatchError> for AppError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::NotFound(_) => AppError::NotFound(e.to_string()),
            DispatchError::AlreadyInFlightOrDone(_) => AppError::Conflict(e.to_string()),
            DispatchError::ContentInvalid(_) | DispatchError::AudienceInvalid(_) => {
                AppError::Validation(e.to_string())
            }
            DispatchError::Store(inner) => inner,
        }
    }
}

/// Tuning knobs of a dispatch run.
#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    /// Flat pause inserted between two consecutive attempts.
    pub send_interval: Duration,
    /// Hard upper bound on one transport call, on top of the transport's own timeout.
    pub attempt_timeout: Duration,
}

impl DispatchOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            send_interval: Duration::from_millis(config.dispatch_send_interval_ms),
            // Leave the transport room to report its own timeout first
            attempt_timeout: Duration::from_secs(config.transport_timeout_secs.saturating_mul(2).max(1)),
        }
    }
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            send_interval: Duration::from_millis(100),
            attempt_timeout: Duration::from_secs(20),
        }
    }
}

/// Runs dispatches against a store, a recipient directory and a transport.
pub struct Dispatcher {
    store: Arc<dyn PushStore>,
    selector: RecipientSelector,
    transport: Arc<dyn Transport>,
    states: PushStateMachine,
    options: DispatchOptions,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn PushStore>,
        recipients: Arc<dyn RecipientStore>,
        transport: Arc<dyn Transport>,
        options: DispatchOptions,
    ) -> Self {
        Self {
            states: PushStateMachine::new(Arc::clone(&store)),
            selector: RecipientSelector::new(recipients),
            store,
            transport,
            options,
        }
    }

    /// Run a full dispatch of `push_id` and wait for it to finish.
    pub async fn dispatch(&self, push_id: PushId) -> Result<DispatchSummary, DispatchError> {
        let push = self.begin(push_id).await?;
        let result = self.run(push).await;
        if result.is_err() {
            self.release(push_id).await;
        }
        result
    }

    /// Claim a push for dispatch: move it to `sending`, then read it back.
    ///
    /// Exactly one caller can claim a given push; every other concurrent or
    /// later caller gets `AlreadyInFlightOrDone`. The returned snapshot is
    /// read after the claim, so edits committed before it are what gets sent.
    pub async fn begin(&self, push_id: PushId) -> Result<Push, DispatchError> {
        match self.states.start_dispatch(push_id).await {
            Ok(()) => {}
            Err(TransitionError::Conflict { .. }) => {
                let current = self
                    .store
                    .load(push_id)
                    .await?
                    .ok_or(DispatchError::NotFound(push_id))?;
                tracing::warn!(
                    push_id,
                    status = %current.status,
                    "Dispatch rejected, push already in flight or finished"
                );
                return Err(DispatchError::AlreadyInFlightOrDone(push_id));
            }
            Err(e) => return Err(e.into()),
        }

        let push = match self.store.load(push_id).await {
            Ok(Some(push)) if push.status == PushStatus::Sending => push,
            Ok(_) => {
                self.release(push_id).await;
                return Err(DispatchError::NotFound(push_id));
            }
            Err(e) => {
                self.release(push_id).await;
                return Err(e.into());
            }
        };

        tracing::info!(push_id, title = %push.title, "Dispatch started");
        Ok(push)
    }

    /// Best-effort `sending → cancelled` for a run that ended abnormally.
    ///
    /// A push that already reached a terminal state is left alone.
    pub async fn release(&self, push_id: PushId) {
        match self.states.abort(push_id).await {
            Ok(()) => tracing::warn!(push_id, "Interrupted dispatch cancelled"),
            Err(TransitionError::Conflict { .. }) => {}
            Err(e) => tracing::error!(
                push_id,
                error = %e,
                "Failed to cancel interrupted dispatch, push left in sending"
            ),
        }
    }

    /// Execute a claimed push (status `sending`) to its terminal state.
    pub async fn run(&self, push: Push) -> Result<DispatchSummary, DispatchError> {
        let push_id = push.push_id;

        let content = match ContentResolver::resolve(&push) {
            Ok(content) => content,
            Err(e) => {
                tracing::error!(push_id, error = %e, "Content resolution failed, cancelling push");
                self.states.abort(push_id).await?;
                return Err(e.into());
            }
        };

        let mut audience = match self.selector.select(&push) {
            Ok(audience) => audience,
            Err(e) => {
                tracing::error!(push_id, error = %e, "Audience resolution failed, cancelling push");
                self.states.abort(push_id).await?;
                return Err(e.into());
            }
        };

        tracing::info!(
            push_id,
            target_ids = audience.remaining_ids(),
            media = content.is_media(),
            "Delivering push"
        );

        let mut summary = DispatchSummary::default();

        while let Some(next) = audience.next().await {
            let recipient = match next {
                Ok(recipient) => recipient,
                Err((recipient_id, e)) => {
                    tracing::error!(push_id, recipient_id, error = %e, "Recipient lookup failed, skipping");
                    continue;
                }
            };

            if summary.attempted > 0 && !self.options.send_interval.is_zero() {
                tokio::time::sleep(self.options.send_interval).await;
            }

            let entry = match self.attempt(&recipient, &content).await {
                Ok(message_ref) => {
                    summary.succeeded += 1;
                    NewDeliveryLog::sent(push_id, recipient.recipient_id, message_ref)
                }
                Err(e) => {
                    tracing::warn!(
                        push_id,
                        recipient_id = recipient.recipient_id,
                        error = %e,
                        "Delivery failed"
                    );
                    summary.failed += 1;
                    NewDeliveryLog::failed(push_id, recipient.recipient_id, e.to_string())
                }
            };
            summary.attempted += 1;

            if let Err(e) = self.store.record_attempt(&entry).await {
                tracing::error!(
                    push_id,
                    recipient_id = recipient.recipient_id,
                    status = %entry.status(),
                    error = %e,
                    "Failed to record delivery attempt"
                );
            }
        }

        self.states.complete(push_id).await?;

        tracing::info!(
            push_id,
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Dispatch completed"
        );

        Ok(summary)
    }

    /// One delivery attempt, including the single text fallback for media.
    async fn attempt(
        &self,
        recipient: &Recipient,
        content: &ResolvedContent,
    ) -> Result<MessageRef, TransportError> {
        let address = recipient.address();

        let primary_err = match self.deliver(&address, content).await {
            Ok(message_ref) => return Ok(message_ref),
            Err(e) => e,
        };

        let Some(fallback) = ContentResolver::text_fallback(content) else {
            return Err(primary_err);
        };

        tracing::info!(
            recipient_id = recipient.recipient_id,
            error = %primary_err,
            "Media delivery failed, falling back to text"
        );

        self.deliver(&address, &fallback).await.map_err(|fallback_err| {
            TransportError::new(
                fallback_err.kind,
                format!(
                    "media send failed ({}); text fallback failed ({})",
                    primary_err, fallback_err
                ),
            )
        })
    }

    async fn deliver(
        &self,
        address: &str,
        content: &ResolvedContent,
    ) -> Result<MessageRef, TransportError> {
        match tokio::time::timeout(
            self.options.attempt_timeout,
            self.transport.deliver(address, content),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::network(format!(
                "delivery timed out after {:?}",
                self.options.attempt_timeout
            ))),
        }
    }
}
