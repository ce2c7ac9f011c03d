//! Bounded dispatch worker pool.
//!
//! Claiming a push (`Dispatcher::begin`) happens on the caller's task so that
//! "not found" and "already in flight" are reported synchronously. The rest
//! of the run is spawned and waits for one of `workers` permits before it
//! starts delivering. A job that fails or panics after the claim releases
//! its push to `cancelled`.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

use pushcast_common::error::AppError;
use pushcast_common::types::{Push, PushId};

use crate::dispatcher::{DispatchError, DispatchSummary, Dispatcher};

/// Identifies a submitted dispatch run to API callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobTicket {
    pub job_id: Uuid,
    pub push_id: PushId,
}

/// A submitted dispatch run.
pub struct DispatchHandle {
    ticket: JobTicket,
    join: JoinHandle<Result<DispatchSummary, DispatchError>>,
}

impl DispatchHandle {
    pub fn ticket(&self) -> JobTicket {
        self.ticket
    }

    /// Wait for the run to finish.
    pub async fn join(self) -> Result<DispatchSummary, DispatchError> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => Err(DispatchError::Store(AppError::Internal(format!(
                "dispatch job {} panicked or was aborted: {}",
                self.ticket.job_id, e
            )))),
        }
    }
}

#[derive(Clone)]
pub struct DispatchQueue {
    dispatcher: Arc<Dispatcher>,
    permits: Arc<Semaphore>,
}

impl DispatchQueue {
    pub fn new(dispatcher: Arc<Dispatcher>, workers: usize) -> Self {
        Self {
            dispatcher,
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Claim `push_id` and submit its run.
    pub async fn start(&self, push_id: PushId) -> Result<DispatchHandle, DispatchError> {
        let push = self.dispatcher.begin(push_id).await?;
        Ok(self.submit(push))
    }

    /// Submit an already claimed push (status `sending`).
    pub fn submit(&self, push: Push) -> DispatchHandle {
        let ticket = JobTicket {
            job_id: Uuid::new_v4(),
            push_id: push.push_id,
        };

        let push_id = push.push_id;
        let dispatcher = Arc::clone(&self.dispatcher);
        let permits = Arc::clone(&self.permits);

        let join = tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    dispatcher.release(push_id).await;
                    return Err(DispatchError::Store(AppError::Internal(format!(
                        "dispatch pool closed: {}",
                        e
                    ))));
                }
            };

            tracing::debug!(job_id = %ticket.job_id, push_id, "Dispatch job running");

            // Inner task so a panicking run still reaches the release below
            let run = tokio::spawn({
                let dispatcher = Arc::clone(&dispatcher);
                async move { dispatcher.run(push).await }
            });
            let result = match run.await {
                Ok(result) => result,
                Err(e) => Err(DispatchError::Store(AppError::Internal(format!(
                    "dispatch job {} panicked or was aborted: {}",
                    ticket.job_id, e
                )))),
            };

            if let Err(e) = &result {
                tracing::error!(job_id = %ticket.job_id, push_id, error = %e, "Dispatch job failed");
                dispatcher.release(push_id).await;
            }
            result
        });

        tracing::info!(job_id = %ticket.job_id, push_id = ticket.push_id, "Dispatch job submitted");

        DispatchHandle { ticket, join }
    }

    /// Permits currently free.
    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }
}
