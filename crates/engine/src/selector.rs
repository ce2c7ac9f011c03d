//! Recipient selector: resolves a push's target list into the live audience.
//!
//! Membership is decided lazily, one lookup per id as the dispatch loop pulls
//! the next recipient, so deactivations that happen before a recipient's turn
//! are honoured. Missing and inactive ids are skipped without error.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

use pushcast_common::error::AppError;
use pushcast_common::types::{Push, Recipient, RecipientId, TargetList};

use crate::store::RecipientStore;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudienceError {
    #[error("target recipient list is malformed: {0}")]
    Malformed(String),
}

/// Resolves target lists against a recipient store.
pub struct RecipientSelector {
    recipients: Arc<dyn RecipientStore>,
}

impl RecipientSelector {
    pub fn new(recipients: Arc<dyn RecipientStore>) -> Self {
        Self { recipients }
    }

    /// Start resolving the audience of a push.
    ///
    /// Fails only when the stored target list cannot be decoded. The returned
    /// `Audience` is consumed as it is iterated; call `select` again for a
    /// fresh pass.
    pub fn select(&self, push: &Push) -> Result<Audience, AudienceError> {
        match &push.target_recipient_ids {
            TargetList::Ids(ids) => Ok(Audience {
                pending: ids.clone().into_iter(),
                seen: HashSet::new(),
                recipients: Arc::clone(&self.recipients),
            }),
            TargetList::Malformed(raw) => Err(AudienceError::Malformed(raw.clone())),
        }
    }
}

/// A lazily resolved, single-pass sequence of active recipients.
pub struct Audience {
    pending: std::vec::IntoIter<RecipientId>,
    seen: HashSet<RecipientId>,
    recipients: Arc<dyn RecipientStore>,
}

impl Audience {
    /// Number of target ids not yet examined (upper bound on what remains).
    pub fn remaining_ids(&self) -> usize {
        self.pending.len()
    }

    /// Next active recipient, or `None` when the target list is exhausted.
    ///
    /// Duplicate ids yield the recipient once. A store failure is returned
    /// for the id being looked up; the sequence continues with the next id
    /// on the following call.
    pub async fn next(&mut self) -> Option<Result<Recipient, (RecipientId, AppError)>> {
        for id in self.pending.by_ref() {
            if !self.seen.insert(id) {
                continue;
            }

            match self.recipients.get(id).await {
                Ok(Some(recipient)) if recipient.is_active => return Some(Ok(recipient)),
                Ok(Some(_)) => {
                    tracing::debug!(recipient_id = id, "Skipping inactive recipient");
                }
                Ok(None) => {
                    tracing::debug!(recipient_id = id, "Skipping unknown recipient");
                }
                Err(e) => return Some(Err((id, e))),
            }
        }
        None
    }
}
