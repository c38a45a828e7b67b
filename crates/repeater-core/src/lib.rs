//! repeater-core
//!
//! Bounded-concurrency task execution with multi-pass retries.
//!
//! # Modules
//! - **queue**: `AsyncQueue`, runs at most N units at once and notifies on drain
//! - **repeater**: `Repeater`, runs a fixed task list in passes, retrying failures
//! - **task**: the `Task` trait (any `Fn() -> Future<Output = Result<T, E>>`)
//! - **domain**: jobs, failure policies, outcomes, ids
//! - **config**: serde configuration for a repeater
//! - **error**: `RepeaterError`, `ConfigError`
//! - **observability** / **logging**: counts views and `tracing` setup

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod observability;
pub mod queue;
pub mod repeater;
pub mod task;

pub use config::{IntervalConfig, RepeaterConfig};
pub use domain::{AlwaysRetry, Decision, FailurePolicy, JobStatus, Outcomes, RunId};
pub use error::{ConfigError, RepeaterError};
pub use observability::{JobCounts, QueueCounts};
pub use queue::{AsyncQueue, Drained};
pub use repeater::{Completion, IntervalStrategy, Repeater, RepeaterBuilder};
pub use task::{BoxTask, Task, boxed};
