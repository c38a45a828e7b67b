//! Outcomes: the ordered result list handed to completion subscribers.

use std::ops::Deref;
use std::sync::Arc;

/// Per-task results, in the order the tasks were given.
///
/// Each entry is the task's value, or the error it completed with when the
/// failure policy accepted that error as final. Cloning is cheap: every
/// subscriber shares the same list.
#[derive(Debug)]
pub struct Outcomes<T, E> {
    results: Arc<[Result<T, E>]>,
}

impl<T, E> Outcomes<T, E> {
    pub(crate) fn new(results: Vec<Result<T, E>>) -> Self {
        Self {
            results: results.into(),
        }
    }

    /// Successful values, in task order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.results.iter().filter_map(|r| r.as_ref().ok())
    }

    /// Accepted errors, with the id of the task that produced each.
    pub fn errors(&self) -> impl Iterator<Item = (usize, &E)> {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(id, r)| r.as_ref().err().map(|e| (id, e)))
    }

    pub fn is_all_ok(&self) -> bool {
        self.results.iter().all(Result::is_ok)
    }
}

impl<T, E> Clone for Outcomes<T, E> {
    fn clone(&self) -> Self {
        Self {
            results: Arc::clone(&self.results),
        }
    }
}

impl<T, E> Deref for Outcomes<T, E> {
    type Target = [Result<T, E>];

    fn deref(&self) -> &Self::Target {
        &self.results
    }
}

impl<T: PartialEq, E: PartialEq> PartialEq for Outcomes<T, E> {
    fn eq(&self, other: &Self) -> bool {
        *self.results == *other.results
    }
}
