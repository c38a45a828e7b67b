//! RepeaterBuilder: options for a [`Repeater`] run, validated on `build`.

use std::sync::Arc;

use crate::config::RepeaterConfig;
use crate::domain::{AlwaysRetry, FailurePolicy};
use crate::error::ConfigError;
use crate::task::BoxTask;

use super::Repeater;
use super::interval::{IntervalStrategy, NoDelay};

/// Builds a [`Repeater`].
///
/// # Defaults
/// - `channels`: 1
/// - `interval_strategy`: [`NoDelay`]
/// - `should_complete_on_error`: [`AlwaysRetry`]
/// - `max_runs`: unbounded
///
/// # Fail-fast
/// `build()` rejects `channels == 0` and `max_runs == 0` instead of running
/// with a surprising budget.
pub struct RepeaterBuilder<T, E> {
    tasks: Vec<BoxTask<T, E>>,
    channels: usize,
    interval: Arc<dyn IntervalStrategy>,
    policy: Arc<dyn FailurePolicy<E>>,
    max_runs: Option<u32>,
}

impl<T, E> RepeaterBuilder<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub fn new(tasks: impl IntoIterator<Item = BoxTask<T, E>>) -> Self {
        Self {
            tasks: tasks.into_iter().collect(),
            channels: 1,
            interval: Arc::new(NoDelay),
            policy: Arc::new(AlwaysRetry),
            max_runs: None,
        }
    }

    /// Maximum concurrent task invocations within a pass.
    pub fn channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    /// Delay before pass `n + 1`, given `n`.
    pub fn interval_strategy(mut self, strategy: impl IntervalStrategy + 'static) -> Self {
        self.interval = Arc::new(strategy);
        self
    }

    /// Classifier for failures that should end a job instead of being retried.
    pub fn should_complete_on_error(mut self, policy: impl FailurePolicy<E> + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Pass budget, counting the first pass.
    pub fn max_runs(mut self, max_runs: u32) -> Self {
        self.max_runs = Some(max_runs);
        self
    }

    /// Apply a serializable config (channels, budget, interval).
    ///
    /// The failure policy is code, so it is kept as set on the builder.
    pub fn config(mut self, config: RepeaterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        self.channels = config.channels;
        self.max_runs = config.max_runs;
        self.interval = config.interval.into_strategy();
        Ok(self)
    }

    pub fn build(self) -> Result<Repeater<T, E>, ConfigError> {
        if self.channels == 0 {
            return Err(ConfigError::InvalidChannels);
        }
        if self.max_runs == Some(0) {
            return Err(ConfigError::InvalidMaxRuns);
        }
        Ok(Repeater::from_parts(
            self.tasks,
            self.channels,
            self.interval,
            self.policy,
            self.max_runs,
        ))
    }
}
