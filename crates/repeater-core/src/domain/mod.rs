//! Domain model (ids, jobs, decisions, outcomes).

pub mod decision;
pub mod ids;
pub mod job;
pub mod outcome;

pub use decision::{AlwaysRetry, Decision, FailurePolicy, decide};
pub use ids::RunId;
pub use job::JobStatus;
pub use outcome::Outcomes;

pub(crate) use job::Job;
