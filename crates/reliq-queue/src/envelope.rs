//! Job envelope: the unit moved between broker lists.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::checksum::checksum;
use crate::error::QueueError;

/// A job: producer payload plus system metadata.
///
/// Wire form: `{"payload": ..., "sys": {"createdAt", "checksum", "error"?, "retry"?}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Producer payload.
    pub payload: Value,
    /// System metadata.
    pub sys: SysMeta,
}

/// Integrity and lifecycle metadata carried by every job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SysMeta {
    /// Set when the envelope is created; never changes.
    pub created_at: DateTime<Utc>,
    /// CRC-32 of the canonical payload, fixed at creation.
    pub checksum: u32,
    /// Present once the job has been rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    /// Present once the job has been requeued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryInfo>,
}

/// Rejection details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub message: String,
}

/// Requeue history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryInfo {
    /// Number of requeues so far.
    pub attempts: u32,
    /// One record per requeue, oldest first.
    pub history: Vec<RetryRecord>,
}

/// One requeue: the reason and the metadata the job had before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryRecord {
    pub message: String,
    pub prior_metadata: SysMeta,
}

impl Job {
    /// Create a fresh envelope around `payload`.
    pub fn create(payload: Value) -> Self {
        let checksum = checksum(&payload);
        Self {
            payload,
            sys: SysMeta {
                created_at: Utc::now(),
                checksum,
                error: None,
                retry: None,
            },
        }
    }

    /// Create an envelope from any serializable payload.
    pub fn from_payload<T: Serialize>(payload: &T) -> Result<Self, QueueError> {
        Ok(Self::create(serde_json::to_value(payload)?))
    }

    /// Checksum of the payload as it is now.
    pub fn computed_checksum(&self) -> u32 {
        checksum(&self.payload)
    }

    /// True if the stored checksum matches the payload.
    pub fn verify(&self) -> bool {
        self.computed_checksum() == self.sys.checksum
    }

    /// Deserialize the payload into `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, QueueError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Rejection message, if the job was rejected.
    pub fn error_message(&self) -> Option<&str> {
        self.sys.error.as_ref().map(|e| e.message.as_str())
    }

    /// Number of times the job has been requeued.
    pub fn attempts(&self) -> u32 {
        self.sys.retry.as_ref().map_or(0, |r| r.attempts)
    }

    /// Retry metadata for the next requeue of this job.
    ///
    /// The snapshot in the new history record is the metadata as it was
    /// before this call.
    pub fn next_retry(&self, message: impl Into<String>) -> RetryInfo {
        let mut retry = self.sys.retry.clone().unwrap_or_default();
        retry.attempts += 1;
        retry.history.push(RetryRecord {
            message: message.into(),
            prior_metadata: self.sys.clone(),
        });
        retry
    }

    /// Serialize to the wire form.
    pub fn encode(&self) -> Result<String, QueueError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse the wire form. Does not verify the checksum.
    pub fn decode(raw: &str) -> Result<Self, QueueError> {
        serde_json::from_str(raw).map_err(|e| QueueError::MalformedEnvelope(e.to_string()))
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
