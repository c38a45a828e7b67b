//! Decision model: whether a failed job is retried or completed as an error.

use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::warn;

/// The next action for a job whose task just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Run the job again on the next pass.
    Retry,

    /// Stop retrying; report the error as the job's outcome.
    Complete,
}

/// Classifies task errors as retryable or terminal.
///
/// Policies are pure: given the error, return whether the job should complete
/// with it. Plain closures `Fn(&E) -> bool` are policies.
pub trait FailurePolicy<E>: Send + Sync {
    fn should_complete(&self, error: &E) -> bool;
}

impl<E, F> FailurePolicy<E> for F
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn should_complete(&self, error: &E) -> bool {
        self(error)
    }
}

/// Default policy: every failure is retried.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl<E> FailurePolicy<E> for AlwaysRetry {
    fn should_complete(&self, _error: &E) -> bool {
        false
    }
}

/// Apply `policy` to `error`.
///
/// A policy that panics yields [`Decision::Retry`]. The panic is not propagated.
pub fn decide<E>(policy: &dyn FailurePolicy<E>, error: &E) -> Decision {
    match catch_unwind(AssertUnwindSafe(|| policy.should_complete(error))) {
        Ok(true) => Decision::Complete,
        Ok(false) => Decision::Retry,
        Err(_) => {
            warn!("failure policy panicked; retrying job");
            Decision::Retry
        }
    }
}
