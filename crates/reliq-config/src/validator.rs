//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::{Config, QueueConfig};

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// First error as a [`ConfigError`], or the warnings if there is none.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(ConfigError::InvalidValue {
                field: error.path,
                message: error.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

const BROKER_SCHEMES: [&str; 3] = ["redis://", "rediss://", "unix://"];
const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();

        Self::validate_broker(config, &mut result);
        Self::validate_queue(config, &mut result);
        Self::validate_sweeper(config, &mut result);
        Self::validate_logging(config, &mut result);

        Ok(result)
    }

    fn validate_broker(config: &Config, result: &mut ValidationResult) {
        let url = &config.broker.url;
        if !BROKER_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
            result.add_error(ValidationError::new(
                "broker.url",
                format!("URL must start with one of {:?}", BROKER_SCHEMES),
            ));
        }
    }

    fn validate_queue(config: &Config, result: &mut ValidationResult) {
        let queue = &config.queue;

        if queue.namespace.is_empty() {
            result.add_error(ValidationError::new(
                "queue.namespace",
                "Namespace cannot be empty",
            ));
        }

        // Empty or equal suffixes would make two lists share a key
        if queue.process_suffix.is_empty() {
            result.add_error(ValidationError::new(
                "queue.process_suffix",
                "process_suffix cannot be empty",
            ));
        }
        if queue.error_suffix.is_empty() {
            result.add_error(ValidationError::new(
                "queue.error_suffix",
                "error_suffix cannot be empty",
            ));
        }
        if !queue.process_suffix.is_empty() && queue.process_suffix == queue.error_suffix {
            result.add_error(ValidationError::new(
                "queue.error_suffix",
                "error_suffix must differ from process_suffix",
            ));
        }

        if queue.message_suffix != QueueConfig::default().message_suffix {
            result.add_warning(ValidationWarning::new(
                "queue.message_suffix",
                "message_suffix is accepted but not used by any list",
            ));
        }

        if queue.auto_pop.retry_delay_ms == 0 {
            result.add_warning(ValidationWarning::new(
                "queue.auto_pop.retry_delay_ms",
                "retry_delay_ms is 0, a failing broker will be polled in a tight loop",
            ));
        }
    }

    fn validate_sweeper(config: &Config, result: &mut ValidationResult) {
        if config.sweeper.interval_secs == 0 {
            result.add_error(ValidationError::new(
                "sweeper.interval_secs",
                "interval_secs must be greater than 0",
            ));
        }

        if config.sweeper.enabled && config.sweeper.older_than_secs == 0 {
            result.add_warning(ValidationWarning::new(
                "sweeper.older_than_secs",
                "older_than_secs is 0, jobs being processed right now will be recovered",
            ));
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        let level = config.logging.level.as_str();
        // Full filter directives like "reliq_queue=debug" are passed through as-is
        if !level.contains('=') && !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
            result.add_warning(ValidationWarning::new(
                "logging.level",
                format!("Unknown log level '{}', valid values: {:?}", level, LOG_LEVELS),
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
