//! In-flight sweeper.
//!
//! Entries stay in the in-flight list until a consumer settles them. When a
//! consumer dies, or a rejection leaves its entry behind, the sweeper moves
//! those entries back to the pending list. Which entries qualify is decided
//! by a [`SweepPolicy`].
//!
//! Entries that fail to decode or fail their checksum are never recovered;
//! they are counted as quarantined and left for an operator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::ListBroker;
use crate::config::{QueueConfig, QueueKeys};
use crate::envelope::Job;
use crate::error::QueueError;

/// Decides whether an in-flight job should go back to pending.
#[async_trait]
pub trait SweepPolicy: Send + Sync {
    /// True to recover `job`.
    async fn should_recover(&self, job: &Job) -> bool;
}

/// Recover every in-flight job. Only safe while no consumer is running.
pub struct RecoverAll;

#[async_trait]
impl SweepPolicy for RecoverAll {
    async fn should_recover(&self, _job: &Job) -> bool {
        true
    }
}

/// Recover jobs created longer ago than `max_age`.
///
/// In-flight entries do not record when they were popped, so the job's
/// creation time stands in for lease age.
pub struct OlderThan {
    max_age: Duration,
}

impl OlderThan {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }
}

#[async_trait]
impl SweepPolicy for OlderThan {
    async fn should_recover(&self, job: &Job) -> bool {
        let age = Utc::now() - job.sys.created_at;
        age.to_std().is_ok_and(|age| age > self.max_age)
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries examined.
    pub scanned: usize,
    /// Entries moved back to pending.
    pub recovered: usize,
    /// Entries the policy kept, or that were settled during the sweep.
    pub skipped: usize,
    /// Undecodable or tampered entries left in place.
    pub quarantined: usize,
}

/// Moves abandoned in-flight entries back to pending.
pub struct Sweeper {
    broker: Arc<dyn ListBroker>,
    keys: QueueKeys,
    policy: Arc<dyn SweepPolicy>,
}

impl Sweeper {
    /// Create a sweeper for the queue described by `config`.
    pub fn new(broker: Arc<dyn ListBroker>, config: &QueueConfig, policy: Arc<dyn SweepPolicy>) -> Self {
        Self {
            broker,
            keys: config.keys(),
            policy,
        }
    }

    /// Examine the in-flight list once.
    pub async fn sweep_once(&self) -> Result<SweepReport, QueueError> {
        let entries = self.broker.range(&self.keys.in_flight, 0, -1).await?;
        let mut report = SweepReport {
            scanned: entries.len(),
            ..Default::default()
        };

        // Oldest entries sit at the tail.
        for raw in entries.into_iter().rev() {
            let job = match Job::decode(&raw) {
                Ok(job) if job.verify() => job,
                Ok(_) | Err(_) => {
                    report.quarantined += 1;
                    continue;
                }
            };

            if !self.policy.should_recover(&job).await {
                report.skipped += 1;
                continue;
            }

            // Removal first: if a consumer settled the entry meanwhile there
            // is nothing left to recover.
            let removed = self
                .broker
                .remove_matching(&self.keys.in_flight, -1, &raw)
                .await?;
            if removed == 0 {
                report.skipped += 1;
                continue;
            }
            self.broker.append(&self.keys.pending, &raw).await?;
            report.recovered += 1;
            debug!(queue = %self.keys.in_flight, checksum = job.sys.checksum, "Recovered job");
        }

        if report.recovered > 0 || report.quarantined > 0 {
            info!(
                queue = %self.keys.in_flight,
                recovered = report.recovered,
                quarantined = report.quarantined,
                "Sweep finished"
            );
        }
        Ok(report)
    }

    /// Sweep every `interval` until `token` is cancelled.
    pub async fn run(&self, interval: Duration, token: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        warn!(queue = %self.keys.in_flight, error = %e, "Sweep failed");
                    }
                }
            }
        }
    }
}
