//! In-process follow-up tasks
//!
//! Secondary work triggered by a committed state change (currently the
//! ranking refresh after a verification). Tasks are idempotent, so the
//! worker retries them a bounded number of times and then logs and drops
//! them. The primary request never waits on a follow-up.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::AppResult;

/// Attempts per task before it is dropped
pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    /// Recompute one farmer's ranking from their verified contributions
    RefreshRanking { farmer_id: Uuid },
}

/// Sending half, stored in the application state
#[derive(Clone, Debug)]
pub struct FollowUpQueue {
    tx: mpsc::UnboundedSender<FollowUp>,
}

impl FollowUpQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<FollowUp>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a task; returns false if the worker has stopped
    pub fn dispatch(&self, task: FollowUp) -> bool {
        match self.tx.send(task) {
            Ok(()) => true,
            Err(mpsc::error::SendError(task)) => {
                tracing::warn!(task = ?task, "Follow-up worker stopped, task dropped");
                false
            }
        }
    }
}

#[async_trait]
pub trait FollowUpHandler: Send + Sync {
    async fn handle(&self, task: &FollowUp) -> AppResult<()>;
}

/// Drain the queue until every sender is dropped
pub async fn run_worker<H>(
    mut rx: mpsc::UnboundedReceiver<FollowUp>,
    handler: H,
    max_attempts: u32,
    backoff: Duration,
) where
    H: FollowUpHandler,
{
    tracing::info!("Follow-up worker started");

    while let Some(task) = rx.recv().await {
        process(&handler, &task, max_attempts, backoff).await;
    }

    tracing::info!("Follow-up worker stopped");
}

/// Run one task with retries; returns whether it eventually succeeded
pub async fn process<H>(handler: &H, task: &FollowUp, max_attempts: u32, backoff: Duration) -> bool
where
    H: FollowUpHandler + ?Sized,
{
    for attempt in 1..=max_attempts {
        match handler.handle(task).await {
            Ok(()) => {
                tracing::debug!(task = ?task, attempt, "Follow-up completed");
                return true;
            }
            Err(err) if attempt < max_attempts => {
                tracing::warn!(task = ?task, attempt, error = %err, "Follow-up failed, retrying");
                tokio::time::sleep(backoff * attempt).await;
            }
            Err(err) => {
                tracing::error!(task = ?task, attempt, error = %err, "Follow-up abandoned");
            }
        }
    }
    false
}
