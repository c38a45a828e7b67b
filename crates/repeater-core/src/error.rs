use thiserror::Error;

/// Terminal failure of a [`Repeater`](crate::repeater::Repeater) run.
///
/// Task errors never surface here: they are either retried or reported as
/// error outcomes. Only orchestrator-level aborts do.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepeaterError {
    /// The pass budget ran out while retryable failures remained.
    ///
    /// `failed` lists the ids of the jobs still failing after the last pass.
    #[error("Max attempts exceeded")]
    MaxAttemptsExceeded { passes: u32, failed: Vec<usize> },

    /// `start` was called outside a Tokio runtime.
    #[error("no Tokio runtime to drive the repeater")]
    NoRuntime,

    /// The repeater was dropped before it reached a result.
    #[error("repeater dropped before completion")]
    Abandoned,
}

/// Invalid repeater configuration, reported by the builder.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("channels must be at least 1")]
    InvalidChannels,

    #[error("max_runs must be at least 1")]
    InvalidMaxRuns,

    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
