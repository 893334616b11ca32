//! Stream driver configuration

use crate::error::{Result, WorkflowError};
use crate::retry::RetryPolicy;
use std::time::Duration;

/// Tunables for one [`StreamDriver`](crate::StreamDriver)
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    /// Pause between `report` events during the flush
    pub flush_interval: Duration,

    /// Retry policy for each artifact write
    pub write_retry: RetryPolicy,

    /// Emit a reasoning message for each debate contribution that changed
    /// a composite section
    pub debate_messages: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(50),
            write_retry: RetryPolicy::default(),
            debate_messages: true,
        }
    }
}

impl DriverConfig {
    pub fn builder() -> DriverConfigBuilder {
        DriverConfigBuilder::default()
    }

    /// Derive driver settings from the application configuration
    pub fn from_app_config(config: &agent_utils::Config) -> Self {
        Self {
            flush_interval: Duration::from_millis(config.flush_interval_ms),
            write_retry: RetryPolicy::with_attempts(config.write_attempts),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.write_retry.max_attempts == 0 {
            return Err(WorkflowError::Config(
                "write_retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.write_retry.backoff_multiplier < 1.0 {
            return Err(WorkflowError::Config(
                "write_retry.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`DriverConfig`]
#[derive(Debug, Default)]
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush_interval = interval;
        self
    }

    pub fn write_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.write_retry = policy;
        self
    }

    pub fn write_attempts(mut self, attempts: u32) -> Self {
        self.config.write_retry.max_attempts = attempts;
        self
    }

    pub fn debate_messages(mut self, enabled: bool) -> Self {
        self.config.debate_messages = enabled;
        self
    }

    /// Build and validate
    pub fn build(self) -> Result<DriverConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
