//! Job record: one task's outcome across passes.

use serde::{Deserialize, Serialize};

use crate::task::BoxTask;

/// Job status.
///
/// State transitions:
/// - Pending -> Completed
/// - Pending -> Failed -> (Failed)* -> Completed
///
/// `Completed` covers both a success and a failure the policy accepted as
/// terminal. A job can also stay `Pending` after a pass if its task panicked;
/// it is then retried like a failed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed)
    }
}

/// One task plus what the repeater knows about its last run.
///
/// Design:
/// - `id` is the task's index in the input list and never changes.
/// - `outcome` holds the value (success) or the error (failure, retained
///   whether or not it will be retried).
/// - All transitions happen through the `record_*` methods.
pub(crate) struct Job<T, E> {
    pub(crate) id: usize,
    pub(crate) task: BoxTask<T, E>,
    pub(crate) status: JobStatus,

    /// Number of settled invocations.
    pub(crate) attempts: u32,

    pub(crate) outcome: Option<Result<T, E>>,
}

impl<T, E> Job<T, E> {
    pub(crate) fn new(id: usize, task: BoxTask<T, E>) -> Self {
        Self {
            id,
            task,
            status: JobStatus::Pending,
            attempts: 0,
            outcome: None,
        }
    }

    pub(crate) fn record_success(&mut self, value: T) {
        self.settle(JobStatus::Completed, Ok(value));
    }

    /// Failure accepted as final: reported as an error outcome, not retried.
    pub(crate) fn record_accepted(&mut self, error: E) {
        self.settle(JobStatus::Completed, Err(error));
    }

    /// Failure to retry on the next pass.
    pub(crate) fn record_failure(&mut self, error: E) {
        self.settle(JobStatus::Failed, Err(error));
    }

    /// Still needs a pass: failed, or never settled.
    pub(crate) fn needs_retry(&self) -> bool {
        !self.status.is_terminal()
    }

    fn settle(&mut self, status: JobStatus, outcome: Result<T, E>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.attempts += 1;
        self.outcome = Some(outcome);
    }
}
