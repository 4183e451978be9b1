//! Queue errors.

use thiserror::Error;

/// Errors raised by a [`ListBroker`](crate::broker::ListBroker).
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Could not reach the broker.
    #[error("Broker connection error: {0}")]
    Connection(String),

    /// The broker rejected or failed a command.
    #[error("Broker command error: {0}")]
    Command(String),
}

/// Queue error types.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Broker communication failed. Never retried by the client.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// `pop` was called while a job from the same gate is still outstanding.
    #[error("Pop already in progress: acknowledge or reject the outstanding job first")]
    PopInProgress,

    /// The payload checksum does not match. The job stays in the in-flight list.
    #[error("Payload integrity violated: expected checksum {expected}, computed {actual}")]
    IntegrityViolation { expected: u32, actual: u32 },

    /// The in-flight entry could not be decoded as an envelope.
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The job reached the error list and its lease is settled, but the
    /// in-flight entry could not be removed and is still there.
    #[error("Job rejected but its in-flight entry was not removed: {0}")]
    InFlightNotRemoved(#[source] BrokerError),

    /// The lease was already acknowledged or rejected.
    #[error("Lease already settled")]
    LeaseSettled,

    /// Payload (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QueueError {
    /// True for failures that mean the delivered data cannot be trusted.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            QueueError::IntegrityViolation { .. } | QueueError::MalformedEnvelope(_)
        )
    }
}
