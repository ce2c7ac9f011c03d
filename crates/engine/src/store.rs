//! Persistence interfaces consumed by the dispatch engine.
//!
//! `PgStore` is the production implementation; `MemoryStore` backs tests and
//! local runs without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use pushcast_common::error::AppError;
use pushcast_common::types::{
    AttemptOutcome, DeliveryLog, NewDeliveryLog, Push, PushId, PushStatus, Recipient, RecipientId,
};

/// Storage of pushes and their delivery log.
#[async_trait]
pub trait PushStore: Send + Sync {
    async fn load(&self, push_id: PushId) -> Result<Option<Push>, AppError>;

    /// Atomically move a push to `next` if its current status is one of
    /// `expected`. Returns `false` when the push was in any other state.
    async fn compare_and_set_status(
        &self,
        push_id: PushId,
        expected: &[PushStatus],
        next: PushStatus,
    ) -> Result<bool, AppError>;

    /// Append one delivery log row. Rows are never updated afterwards.
    async fn append_log(&self, entry: &NewDeliveryLog) -> Result<(), AppError>;

    async fn increment_sent_count(&self, push_id: PushId) -> Result<(), AppError>;

    /// Persist the outcome of one attempt: the log row and, for a sent
    /// attempt, the `sent_count` increment.
    ///
    /// Implementations backed by a transactional store must override this so
    /// that both writes commit together.
    async fn record_attempt(&self, entry: &NewDeliveryLog) -> Result<(), AppError> {
        self.append_log(entry).await?;
        if let AttemptOutcome::Sent { .. } = entry.outcome {
            self.increment_sent_count(entry.push_id).await?;
        }
        Ok(())
    }

    /// All `sent` log rows of a push, oldest first.
    async fn sent_logs(&self, push_id: PushId) -> Result<Vec<DeliveryLog>, AppError>;

    /// Ids of `scheduled` pushes whose scheduled time is at or before `now`.
    async fn due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<PushId>, AppError>;

    /// Move every push claimed (`sending`) before `claimed_before` to
    /// `cancelled`. Returns the ids swept.
    ///
    /// Run once at startup: a run that was in flight when the previous
    /// process stopped can never complete.
    async fn cancel_orphaned_sending(
        &self,
        claimed_before: DateTime<Utc>,
    ) -> Result<Vec<PushId>, AppError>;
}

/// Read access to registered recipients.
#[async_trait]
pub trait RecipientStore: Send + Sync {
    async fn get(&self, recipient_id: RecipientId) -> Result<Option<Recipient>, AppError>;
}
