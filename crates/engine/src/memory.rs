//! In-memory store for tests and database-less runs.
//!
//! Implements the same contracts as `PgStore`. All state lives behind one
//! async mutex, so every trait call is atomic with respect to the others.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use pushcast_common::error::AppError;
use pushcast_common::types::{
    AttemptOutcome, DeliveryLog, DeliveryStatus, NewDeliveryLog, Push, PushId, PushStatus,
    Recipient, RecipientId,
};

use crate::store::{PushStore, RecipientStore};

#[derive(Default)]
struct Inner {
    pushes: HashMap<PushId, Push>,
    recipients: HashMap<RecipientId, Recipient>,
    logs: Vec<DeliveryLog>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a push.
    pub async fn put_push(&self, push: Push) {
        self.inner.lock().await.pushes.insert(push.push_id, push);
    }

    /// Insert or replace a recipient.
    pub async fn put_recipient(&self, recipient: Recipient) {
        self.inner
            .lock()
            .await
            .recipients
            .insert(recipient.recipient_id, recipient);
    }

    /// Remove a recipient entirely. Returns whether it existed.
    pub async fn remove_recipient(&self, recipient_id: RecipientId) -> bool {
        self.inner
            .lock()
            .await
            .recipients
            .remove(&recipient_id)
            .is_some()
    }

    /// Flip a recipient's active flag. Returns whether the recipient exists.
    pub async fn set_active(&self, recipient_id: RecipientId, active: bool) -> bool {
        match self.inner.lock().await.recipients.get_mut(&recipient_id) {
            Some(recipient) => {
                recipient.is_active = active;
                recipient.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Snapshot of a push.
    pub async fn push(&self, push_id: PushId) -> Option<Push> {
        self.inner.lock().await.pushes.get(&push_id).cloned()
    }

    /// All log rows of a push, in insertion order.
    pub async fn logs(&self, push_id: PushId) -> Vec<DeliveryLog> {
        self.inner
            .lock()
            .await
            .logs
            .iter()
            .filter(|log| log.push_id == push_id)
            .cloned()
            .collect()
    }

    fn push_mut<'a>(inner: &'a mut Inner, push_id: PushId) -> Result<&'a mut Push, AppError> {
        inner
            .pushes
            .get_mut(&push_id)
            .ok_or_else(|| AppError::NotFound(format!("Push {} not found", push_id)))
    }

    fn append(inner: &mut Inner, entry: &NewDeliveryLog) -> Result<(), AppError> {
        if !inner.pushes.contains_key(&entry.push_id) {
            return Err(AppError::NotFound(format!(
                "Push {} not found",
                entry.push_id
            )));
        }

        let log_id = inner.logs.len() as i64 + 1;
        inner.logs.push(DeliveryLog {
            log_id,
            push_id: entry.push_id,
            recipient_id: entry.recipient_id,
            status: entry.status(),
            error_message: entry.error_message().map(str::to_string),
            message_ref: entry.message_ref(),
            sent_at: entry.sent_at(),
            delivered_at: None,
            read_at: None,
            created_at: Utc::now(),
        });
        Ok(())
    }
}

#[async_trait]
impl PushStore for MemoryStore {
    async fn load(&self, push_id: PushId) -> Result<Option<Push>, AppError> {
        Ok(self.push(push_id).await)
    }

    async fn compare_and_set_status(
        &self,
        push_id: PushId,
        expected: &[PushStatus],
        next: PushStatus,
    ) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().await;
        let Some(push) = inner.pushes.get_mut(&push_id) else {
            return Ok(false);
        };

        if !expected.contains(&push.status) {
            return Ok(false);
        }

        push.status = next;
        push.updated_at = Utc::now();
        Ok(true)
    }

    async fn append_log(&self, entry: &NewDeliveryLog) -> Result<(), AppError> {
        let mut inner = self.inner.lock().await;
        Self::append(&mut inner, entry)
    }

    async fn increment_sent_count(&self, push_id: PushId) -> Result<(), AppError> {
        let mut inner = self.inner.lock().await;
        Self::push_mut(&mut inner, push_id)?.sent_count += 1;
        Ok(())
    }

    async fn record_attempt(&self, entry: &NewDeliveryLog) -> Result<(), AppError> {
        // Held across both writes so readers never see one without the other
        let mut inner = self.inner.lock().await;
        Self::append(&mut inner, entry)?;
        if let AttemptOutcome::Sent { .. } = entry.outcome {
            Self::push_mut(&mut inner, entry.push_id)?.sent_count += 1;
        }
        Ok(())
    }

    async fn sent_logs(&self, push_id: PushId) -> Result<Vec<DeliveryLog>, AppError> {
        Ok(self
            .logs(push_id)
            .await
            .into_iter()
            .filter(|log| log.status == DeliveryStatus::Sent)
            .collect())
    }

    async fn due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<PushId>, AppError> {
        let inner = self.inner.lock().await;
        let mut due: Vec<&Push> = inner
            .pushes
            .values()
            .filter(|p| p.status == PushStatus::Scheduled)
            .filter(|p| p.scheduled_time.is_some_and(|t| t <= now))
            .collect();
        due.sort_by_key(|p| (p.scheduled_time, p.push_id));
        Ok(due.into_iter().map(|p| p.push_id).collect())
    }

    async fn cancel_orphaned_sending(
        &self,
        claimed_before: DateTime<Utc>,
    ) -> Result<Vec<PushId>, AppError> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let mut swept = Vec::new();

        for push in inner.pushes.values_mut() {
            if push.status == PushStatus::Sending && push.updated_at < claimed_before {
                push.status = PushStatus::Cancelled;
                push.updated_at = now;
                swept.push(push.push_id);
            }
        }

        swept.sort_unstable();
        Ok(swept)
    }
}

#[async_trait]
impl RecipientStore for MemoryStore {
    async fn get(&self, recipient_id: RecipientId) -> Result<Option<Recipient>, AppError> {
        Ok(self
            .inner
            .lock()
            .await
            .recipients
            .get(&recipient_id)
            .cloned())
    }
}
