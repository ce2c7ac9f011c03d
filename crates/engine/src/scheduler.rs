//! Scheduled dispatch poller.
//!
//! Periodically looks for `scheduled` pushes whose time has come and starts
//! them through the same claim + queue path as a manual send.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use pushcast_common::error::AppError;
use pushcast_common::types::PushId;

use crate::dispatcher::DispatchError;
use crate::queue::{DispatchHandle, DispatchQueue};
use crate::store::PushStore;

pub struct ScheduledDispatcher {
    store: Arc<dyn PushStore>,
    queue: DispatchQueue,
    poll_interval: Duration,
}

impl ScheduledDispatcher {
    pub fn new(store: Arc<dyn PushStore>, queue: DispatchQueue, poll_interval_secs: u64) -> Self {
        Self {
            store,
            queue,
            poll_interval: Duration::from_secs(poll_interval_secs.max(1)),
        }
    }

    /// Start every due push once. Returns the handles of the runs submitted.
    pub async fn tick(&self) -> Result<Vec<DispatchHandle>, AppError> {
        let due: Vec<PushId> = self.store.due_scheduled(Utc::now()).await?;
        let mut started = Vec::with_capacity(due.len());

        for push_id in due {
            match self.queue.start(push_id).await {
                Ok(handle) => {
                    tracing::info!(push_id, job_id = %handle.ticket().job_id, "Scheduled push started");
                    started.push(handle);
                }
                Err(DispatchError::AlreadyInFlightOrDone(_)) | Err(DispatchError::NotFound(_)) => {
                    // Another starter claimed it, or it was deleted since the scan
                    tracing::debug!(push_id, "Scheduled push no longer startable, skipping");
                }
                Err(e) => {
                    tracing::error!(push_id, error = %e, "Failed to start scheduled push");
                }
            }
        }

        Ok(started)
    }

    /// Run the polling loop. Runs indefinitely until the task is cancelled.
    pub async fn run(self) {
        tracing::info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            "Scheduled dispatcher started"
        );

        loop {
            if let Err(e) = self.tick().await {
                tracing::error!(error = %e, "Scheduled dispatch scan failed");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
