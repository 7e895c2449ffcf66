//! Serde-loadable configuration for pollers and async tasks

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::schedule::DEFAULT_INTERVAL;

/// Longest interval a configured poller accepts.
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Fixed-interval poller configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Delay between iterations
    #[cfg_attr(feature = "humantime", serde(with = "humantime_serde"))]
    pub interval: Duration,

    /// Successful iterations before the run stops; 0 means unlimited
    pub limit: u64,

    /// Label attached to the run's tracing span and events
    pub label: String,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            limit: 0,
            label: "poll".to_string(),
        }
    }
}

impl PollConfig {
    /// Check that the configuration can drive a poller.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::invalid("interval", "must be greater than zero"));
        }
        if self.interval > MAX_INTERVAL {
            return Err(ConfigError::invalid(
                "interval",
                format!("cannot exceed {MAX_INTERVAL:?}, got {:?}", self.interval),
            ));
        }
        validate_label(&self.label)
    }
}

/// Sigmoid delay curve parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigmoidConfig {
    /// Value the delay approaches as iterations grow
    #[cfg_attr(feature = "humantime", serde(with = "humantime_serde"))]
    pub ceiling: Duration,

    /// Iteration with the steepest increase (delay = ceiling / 2)
    pub midpoint: f64,

    /// Curve steepness
    pub steepness: f64,
}

impl Default for SigmoidConfig {
    fn default() -> Self {
        Self {
            ceiling: Duration::from_secs(10),
            midpoint: 12.0,
            steepness: 0.2,
        }
    }
}

impl SigmoidConfig {
    /// Check that the parameters describe a valid curve.
    pub fn validate(&self) -> Result<(), ConfigError> {
        crate::schedule::SigmoidDelay::from_config(self).map(|_| ())
    }
}

/// Configuration of a predicate-driven async task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsyncTaskConfig {
    /// Maximum number of task invocations; `None` means unlimited
    pub limit: Option<u64>,

    /// Delay curve between invocations
    pub sigmoid: SigmoidConfig,

    /// Label attached to the run's tracing span and events
    pub label: String,
}

impl Default for AsyncTaskConfig {
    fn default() -> Self {
        Self {
            limit: None,
            sigmoid: SigmoidConfig::default(),
            label: "async-task".to_string(),
        }
    }
}

impl AsyncTaskConfig {
    /// Check the limit, the curve and the label.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limit == Some(0) {
            return Err(ConfigError::invalid(
                "limit",
                "must be greater than zero; omit it for an unlimited task",
            ));
        }
        self.sigmoid.validate()?;
        validate_label(&self.label)
    }
}

fn validate_label(label: &str) -> Result<(), ConfigError> {
    if label.is_empty() {
        return Err(ConfigError::invalid("label", "cannot be empty"));
    }
    if label.len() > 256 {
        return Err(ConfigError::invalid("label", "too long (max 256 chars)"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_valid() {
        assert!(PollConfig::default().validate().is_ok());
        assert!(SigmoidConfig::default().validate().is_ok());
        assert!(AsyncTaskConfig::default().validate().is_ok());
    }

    #[test]
    fn poll_config_rejects_zero_interval() {
        let config = PollConfig {
            interval: Duration::ZERO,
            ..PollConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::invalid("interval", "must be greater than zero"))
        );
    }

    #[test]
    fn poll_config_rejects_huge_interval() {
        let config = PollConfig {
            interval: MAX_INTERVAL + Duration::from_secs(1),
            ..PollConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_label_is_rejected() {
        let config = PollConfig {
            label: String::new(),
            ..PollConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::invalid("label", "cannot be empty"))
        );
    }

    #[test]
    fn async_task_rejects_zero_limit() {
        let config = AsyncTaskConfig {
            limit: Some(0),
            ..AsyncTaskConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn async_task_checks_curve() {
        let config = AsyncTaskConfig {
            sigmoid: SigmoidConfig {
                steepness: -1.0,
                ..SigmoidConfig::default()
            },
            ..AsyncTaskConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn sigmoid_ceiling_is_bounded() {
        use crate::schedule::{DelaySchedule, SigmoidDelay};

        let unbounded = SigmoidConfig {
            ceiling: Duration::MAX,
            ..SigmoidConfig::default()
        };
        assert!(unbounded.validate().is_err());

        let widest = SigmoidConfig {
            ceiling: MAX_INTERVAL,
            ..SigmoidConfig::default()
        };
        let curve = SigmoidDelay::from_config(&widest).unwrap();
        assert_eq!(curve.delay(u64::MAX), MAX_INTERVAL);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: AsyncTaskConfig = serde_json::from_str(r#"{"limit": 20}"#).unwrap();
        assert_eq!(config.limit, Some(20));
        assert_eq!(config.sigmoid, SigmoidConfig::default());
        assert_eq!(config.label, "async-task");
    }

    #[cfg(not(feature = "humantime"))]
    #[test]
    fn poll_config_from_json() {
        let config: PollConfig = serde_json::from_str(
            r#"{"interval": {"secs": 5, "nanos": 0}, "limit": 3, "label": "invoice-status"}"#,
        )
        .unwrap();
        assert_eq!(
            config,
            PollConfig {
                interval: Duration::from_secs(5),
                limit: 3,
                label: "invoice-status".to_string(),
            }
        );
    }

    #[cfg(feature = "humantime")]
    #[test]
    fn poll_config_from_humantime_json() {
        let config: PollConfig =
            serde_json::from_str(r#"{"interval": "1m 30s", "limit": 3}"#).unwrap();
        assert_eq!(config.interval, Duration::from_secs(90));
        assert_eq!(config.limit, 3);
    }
}
