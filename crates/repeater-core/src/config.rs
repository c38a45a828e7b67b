//! Serializable repeater configuration.
//!
//! Every field is optional in the JSON form; missing fields take the defaults
//! of [`RepeaterBuilder`](crate::repeater::RepeaterBuilder).

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::repeater::interval::{
    ExponentialBackoff, FixedDelay, IntervalStrategy, LinearDelay, NoDelay,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepeaterConfig {
    /// Concurrent task invocations per pass.
    pub channels: usize,

    /// Pass budget. `None` retries until every job completes.
    pub max_runs: Option<u32>,

    /// Delay between passes.
    pub interval: IntervalConfig,
}

impl Default for RepeaterConfig {
    fn default() -> Self {
        Self {
            channels: 1,
            max_runs: None,
            interval: IntervalConfig::None,
        }
    }
}

impl RepeaterConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels == 0 {
            return Err(ConfigError::InvalidChannels);
        }
        if self.max_runs == Some(0) {
            return Err(ConfigError::InvalidMaxRuns);
        }
        self.interval.validate()
    }
}

/// Interval strategy, in serializable form.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntervalConfig {
    #[default]
    None,

    Fixed {
        delay_ms: u64,
    },

    Linear {
        step_ms: u64,
    },

    Exponential {
        base_ms: u64,
        multiplier: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_ms: Option<u64>,
        #[serde(default)]
        jitter: bool,
    },
}

impl IntervalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            IntervalConfig::Exponential { multiplier, .. }
                if !multiplier.is_finite() || *multiplier < 1.0 =>
            {
                Err(ConfigError::InvalidInterval(format!(
                    "exponential multiplier must be a finite number >= 1.0, got {multiplier}"
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn into_strategy(self) -> Arc<dyn IntervalStrategy> {
        match self {
            IntervalConfig::None => Arc::new(NoDelay),
            IntervalConfig::Fixed { delay_ms } => {
                Arc::new(FixedDelay(Duration::from_millis(delay_ms)))
            }
            IntervalConfig::Linear { step_ms } => Arc::new(LinearDelay {
                step: Duration::from_millis(step_ms),
            }),
            IntervalConfig::Exponential {
                base_ms,
                multiplier,
                max_ms,
                jitter,
            } => Arc::new(ExponentialBackoff {
                base_delay: Duration::from_millis(base_ms),
                multiplier,
                max_delay: max_ms.map(Duration::from_millis),
                jitter,
            }),
        }
    }
}
