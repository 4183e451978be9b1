//! Queue configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Queue configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Namespace; also the name of the pending list.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Suffix appended to the namespace for the in-flight list.
    #[serde(default = "default_process_suffix")]
    pub process_suffix: String,

    /// Reserved. Accepted and carried, but no list uses it.
    #[serde(default = "default_message_suffix")]
    pub message_suffix: String,

    /// Suffix appended to the namespace for the error (dead-letter) list.
    #[serde(default = "default_error_suffix")]
    pub error_suffix: String,

    /// Blocking pop timeout in seconds (0 = wait forever).
    #[serde(default)]
    pub pop_timeout_secs: u64,

    /// Acknowledge every job as soon as it has been delivered to observers.
    #[serde(default = "default_auto_acknowledge")]
    pub auto_acknowledge: bool,

    /// Also remove the in-flight entry when a job is rejected.
    #[serde(default)]
    pub remove_on_reject: bool,

    /// Auto-pop loop behaviour.
    #[serde(default)]
    pub auto_pop: AutoPopConfig,
}

/// When the auto-pop loop issues its next pop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoPopConfig {
    /// Pop again after a rejection, not only after a success.
    #[serde(default)]
    pub rearm_on_reject: bool,

    /// Pop again after a blocking pop timed out empty.
    #[serde(default = "default_rearm_on_empty")]
    pub rearm_on_empty: bool,

    /// Delay before polling again after a broker failure.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_namespace() -> String {
    "queue".to_string()
}

fn default_process_suffix() -> String {
    ":process".to_string()
}

fn default_message_suffix() -> String {
    ":message".to_string()
}

fn default_error_suffix() -> String {
    ":error".to_string()
}

fn default_auto_acknowledge() -> bool {
    true
}

fn default_rearm_on_empty() -> bool {
    true
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            process_suffix: default_process_suffix(),
            message_suffix: default_message_suffix(),
            error_suffix: default_error_suffix(),
            pop_timeout_secs: 0,
            auto_acknowledge: default_auto_acknowledge(),
            remove_on_reject: false,
            auto_pop: AutoPopConfig::default(),
        }
    }
}

impl Default for AutoPopConfig {
    fn default() -> Self {
        Self {
            rearm_on_reject: false,
            rearm_on_empty: default_rearm_on_empty(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl QueueConfig {
    /// Config for `namespace` with every other field at its default.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Require explicit acknowledgement.
    pub fn manual(mut self) -> Self {
        self.auto_acknowledge = false;
        self
    }

    /// Set the blocking pop timeout.
    pub fn with_pop_timeout(mut self, secs: u64) -> Self {
        self.pop_timeout_secs = secs;
        self
    }

    /// Blocking pop timeout; `Duration::ZERO` blocks forever.
    pub fn pop_timeout(&self) -> Duration {
        Duration::from_secs(self.pop_timeout_secs)
    }

    /// List names derived from the namespace.
    pub fn keys(&self) -> QueueKeys {
        QueueKeys {
            pending: self.namespace.clone(),
            in_flight: format!("{}{}", self.namespace, self.process_suffix),
            error: format!("{}{}", self.namespace, self.error_suffix),
        }
    }
}

/// The three broker lists a queue works against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKeys {
    pub pending: String,
    pub in_flight: String,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_keys() {
        let keys = QueueConfig::default().keys();
        assert_eq!(keys.pending, "queue");
        assert_eq!(keys.in_flight, "queue:process");
        assert_eq!(keys.error, "queue:error");
    }

    #[test]
    fn test_custom_suffixes() {
        let config = QueueConfig {
            process_suffix: ".wip".to_string(),
            error_suffix: ".dead".to_string(),
            ..QueueConfig::new("mail")
        };
        let keys = config.keys();
        assert_eq!(keys.in_flight, "mail.wip");
        assert_eq!(keys.error, "mail.dead");
    }

    #[test]
    fn test_message_suffix_is_inert() {
        let config = QueueConfig {
            message_suffix: ":elsewhere".to_string(),
            ..QueueConfig::new("mail")
        };
        assert_eq!(config.keys(), QueueConfig::new("mail").keys());
    }

    #[test]
    fn test_zero_timeout_blocks_forever() {
        assert_eq!(QueueConfig::default().pop_timeout(), Duration::ZERO);
        assert_eq!(
            QueueConfig::default().with_pop_timeout(5).pop_timeout(),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_deserialize_defaults() {
        let config: QueueConfig = serde_json::from_str(r#"{"namespace":"jobs"}"#).unwrap();
        assert_eq!(config.namespace, "jobs");
        assert!(config.auto_acknowledge);
        assert!(!config.remove_on_reject);
        assert!(config.auto_pop.rearm_on_empty);
        assert!(!config.auto_pop.rearm_on_reject);
    }
}
