//! Retraction executor: best-effort deletion of a push's delivered messages.
//!
//! Walks every `sent` log row of the push and asks the transport to delete
//! the message it produced. Failures are counted per row and never abort the
//! walk. Log rows and push status are left untouched.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pushcast_common::error::AppError;
use pushcast_common::transport::{Transport, TransportError};
use pushcast_common::types::{DeliveryLog, PushId};

use crate::store::{PushStore, RecipientStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetractionSummary {
    pub deleted_count: u64,
    pub failed_count: u64,
}

#[derive(Debug, Error)]
pub enum RetractionError {
    #[error("push {0} not found")]
    NotFound(PushId),

    #[error("push {0} has no sent messages to retract")]
    NoSentMessages(PushId),

    #[error(transparent)]
    Store(#[from] AppError),
}

impl From<RetractionError> for AppError {
    fn from(e: RetractionError) -> Self {
        match e {
            RetractionError::NotFound(_) => AppError::NotFound(e.to_string()),
            RetractionError::NoSentMessages(_) => AppError::Validation(e.to_string()),
            RetractionError::Store(inner) => inner,
        }
    }
}

pub struct Retractor {
    store: Arc<dyn PushStore>,
    recipients: Arc<dyn RecipientStore>,
    transport: Arc<dyn Transport>,
}

impl Retractor {
    pub fn new(
        store: Arc<dyn PushStore>,
        recipients: Arc<dyn RecipientStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            store,
            recipients,
            transport,
        }
    }

    /// Retract every delivered message of a push.
    pub async fn retract(&self, push_id: PushId) -> Result<RetractionSummary, RetractionError> {
        if self.store.load(push_id).await?.is_none() {
            return Err(RetractionError::NotFound(push_id));
        }

        let sent = self.store.sent_logs(push_id).await?;
        if sent.is_empty() {
            return Err(RetractionError::NoSentMessages(push_id));
        }

        tracing::info!(push_id, rows = sent.len(), "Retracting push");

        let mut summary = RetractionSummary::default();
        for log in &sent {
            match self.retract_one(log).await {
                Ok(()) => summary.deleted_count += 1,
                Err(reason) => {
                    tracing::warn!(
                        push_id,
                        recipient_id = log.recipient_id,
                        log_id = log.log_id,
                        error = %reason,
                        "Retraction failed"
                    );
                    summary.failed_count += 1;
                }
            }
        }

        tracing::info!(
            push_id,
            deleted = summary.deleted_count,
            failed = summary.failed_count,
            "Retraction finished"
        );

        Ok(summary)
    }

    async fn retract_one(&self, log: &DeliveryLog) -> Result<(), String> {
        let message_ref = log
            .message_ref
            .ok_or_else(|| "sent row has no message reference".to_string())?;

        let recipient = self
            .recipients
            .get(log.recipient_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("recipient {} no longer exists", log.recipient_id))?;

        self.transport
            .retract(&recipient.address(), message_ref)
            .await
            .map_err(|e: TransportError| e.to_string())
    }
}
