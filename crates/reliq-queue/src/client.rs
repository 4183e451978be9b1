//! Reliable queue client.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::auto_pop::{self, AutoPopHandle, Rearm};
use crate::broker::ListBroker;
use crate::config::{QueueConfig, QueueKeys};
use crate::envelope::{Job, JobError};
use crate::error::{BrokerError, QueueError};
use crate::gate::{GateGuard, InFlightGate};
use crate::lease::Lease;
use crate::notifier::{Notifier, QueueEvent, QueueObserver};

/// Client for one namespace on a list broker.
///
/// Cloning is cheap; clones share the gate, observers and auto-pop loop.
#[derive(Clone)]
pub struct QueueClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: QueueConfig,
    keys: QueueKeys,
    broker: Arc<dyn ListBroker>,
    gate: Arc<InFlightGate>,
    notifier: Notifier,
    auto_pop: Mutex<Option<AutoPopHandle>>,
}

impl fmt::Debug for QueueClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueClient")
            .field("keys", &self.inner.keys)
            .field("gate_open", &self.inner.gate.is_open())
            .field("observers", &self.inner.notifier.len())
            .finish()
    }
}

impl QueueClient {
    /// Create a client with its own gate.
    pub fn new(broker: Arc<dyn ListBroker>, config: QueueConfig) -> Self {
        Self::with_gate(broker, config, Arc::new(InFlightGate::new()))
    }

    /// Create a client on an explicitly shared gate.
    ///
    /// All clients holding the same gate allow one outstanding job between
    /// them.
    pub fn with_gate(
        broker: Arc<dyn ListBroker>,
        config: QueueConfig,
        gate: Arc<InFlightGate>,
    ) -> Self {
        let keys = config.keys();
        Self {
            inner: Arc::new(ClientInner {
                config,
                keys,
                broker,
                gate,
                notifier: Notifier::new(),
                auto_pop: Mutex::new(None),
            }),
        }
    }

    /// Client configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Pending, in-flight and error list names.
    pub fn keys(&self) -> &QueueKeys {
        &self.inner.keys
    }

    /// The gate guarding this client's pops.
    pub fn gate(&self) -> &Arc<InFlightGate> {
        &self.inner.gate
    }

    /// Enqueue `payload` as a new job.
    pub async fn push<T: Serialize>(&self, payload: &T) -> Result<Job, QueueError> {
        self.push_job(Job::from_payload(payload)?).await
    }

    async fn push_job(&self, job: Job) -> Result<Job, QueueError> {
        let raw = job.encode()?;
        self.inner.broker.append(&self.inner.keys.pending, &raw).await?;
        debug!(
            queue = %self.inner.keys.pending,
            checksum = job.sys.checksum,
            attempts = job.attempts(),
            "Pushed job"
        );

        self.inner.notifier.emit(&QueueEvent::Push(job.clone())).await;
        Ok(job)
    }

    /// Move one job from pending to in-flight and hand out a lease on it.
    ///
    /// Fails with [`QueueError::PopInProgress`] without touching the broker
    /// while an earlier lease from the same gate is unsettled. Blocks up to
    /// the configured timeout; `Ok(None)` means the timeout elapsed.
    ///
    /// A job whose checksum does not match fails the pop and is left in the
    /// in-flight list.
    pub async fn pop(&self) -> Result<Option<Lease>, QueueError> {
        let keys = &self.inner.keys;
        let mut guard = GateGuard::close(&self.inner.gate)?;

        let raw = self
            .inner
            .broker
            .blocking_move_tail(&keys.pending, &keys.in_flight, self.inner.config.pop_timeout())
            .await?;
        let Some(raw) = raw else {
            debug!(queue = %keys.pending, "Pop timed out empty");
            return Ok(None);
        };

        let job = Job::decode(&raw).inspect_err(|e| {
            error!(queue = %keys.in_flight, error = %e, "Undecodable job left in flight");
        })?;
        if !job.verify() {
            let err = QueueError::IntegrityViolation {
                expected: job.sys.checksum,
                actual: job.computed_checksum(),
            };
            error!(queue = %keys.in_flight, error = %err, "Tampered job left in flight");
            return Err(err);
        }

        let rearm = self.inner.auto_pop.lock().as_ref().map(|h| h.rearm.clone());
        let lease = Lease::delivered(job, raw, self.inner.gate.clone(), rearm);
        guard.bind(&lease);
        debug!(
            queue = %keys.pending,
            checksum = lease.job().sys.checksum,
            "Popped job"
        );

        self.inner.notifier.emit(&QueueEvent::Job(lease.clone())).await;

        if self.inner.config.auto_acknowledge && !lease.is_settled() {
            // On failure the guard reopens the gate: the caller never sees
            // this lease and the entry stays in flight for the sweeper.
            self.acknowledge(&lease).await?;
        }
        guard.keep_closed();
        Ok(Some(lease))
    }

    /// Remove the leased job from the in-flight list.
    pub async fn acknowledge(&self, lease: &Lease) -> Result<Job, QueueError> {
        lease.settle()?;
        self.remove_in_flight(lease)
            .await
            .inspect_err(|_| lease.unsettle())?;

        lease.release_gate();
        let job = lease.job().clone();
        info!(queue = %self.inner.keys.pending, checksum = job.sys.checksum, "Job acknowledged");

        self.inner.notifier.emit(&QueueEvent::Success(job.clone())).await;
        lease.rearm_after_success();
        Ok(job)
    }

    /// Copy the leased job to the error list with `message` attached.
    ///
    /// The in-flight entry stays unless `remove_on_reject` is configured.
    /// If that removal fails the job is still rejected and the lease settled,
    /// but the call returns [`QueueError::InFlightNotRemoved`].
    pub async fn reject(&self, lease: &Lease, message: impl Into<String>) -> Result<Job, QueueError> {
        lease.settle()?;

        let mut job = lease.job().clone();
        job.sys.error = Some(JobError {
            message: message.into(),
        });
        let appended = match job.encode() {
            Ok(raw) => self
                .inner
                .broker
                .append(&self.inner.keys.error, &raw)
                .await
                .map_err(QueueError::from),
            Err(e) => Err(e),
        };
        appended.inspect_err(|_| lease.unsettle())?;

        let stranded = if self.inner.config.remove_on_reject {
            self.remove_in_flight(lease).await.err()
        } else {
            None
        };

        lease.release_gate();
        info!(
            queue = %self.inner.keys.error,
            checksum = job.sys.checksum,
            error = job.error_message().unwrap_or_default(),
            "Job rejected"
        );

        self.inner.notifier.emit(&QueueEvent::Reject(job.clone())).await;
        lease.rearm_after_reject();

        match stranded {
            Some(e) => {
                warn!(
                    queue = %self.inner.keys.in_flight,
                    error = %e,
                    "Rejected job left in flight"
                );
                Err(QueueError::InFlightNotRemoved(e))
            }
            None => Ok(job),
        }
    }

    /// Push the leased job's payload again with one more retry record.
    ///
    /// Leaves the in-flight entry and the gate alone; follow with
    /// [`acknowledge`](Self::acknowledge) to hand the job off completely.
    /// Fails with [`QueueError::LeaseSettled`] once the lease is settled.
    pub async fn requeue(&self, lease: &Lease, message: impl Into<String>) -> Result<Job, QueueError> {
        if lease.is_settled() {
            return Err(QueueError::LeaseSettled);
        }
        let current = lease.job();
        let mut job = Job::create(current.payload.clone());
        job.sys.retry = Some(current.next_retry(message));
        info!(
            queue = %self.inner.keys.pending,
            attempts = job.attempts(),
            "Requeueing job"
        );
        self.push_job(job).await
    }

    async fn remove_in_flight(&self, lease: &Lease) -> Result<(), BrokerError> {
        let removed = self
            .inner
            .broker
            .remove_matching(&self.inner.keys.in_flight, -1, lease.raw())
            .await?;
        if removed == 0 {
            warn!(queue = %self.inner.keys.in_flight, "In-flight entry already gone");
        }
        Ok(())
    }

    /// Register an observer.
    ///
    /// The first observer interested in `job` events starts the auto-pop
    /// loop, so this must be called from within a Tokio runtime.
    pub fn on(&self, observer: Arc<dyn QueueObserver>) {
        if self.inner.notifier.register(observer) {
            self.start_auto_pop();
        }
    }

    /// Start the auto-pop loop if it is not running. Returns true if started.
    pub fn start_auto_pop(&self) -> bool {
        let mut slot = self.inner.auto_pop.lock();
        if slot.is_some() {
            return false;
        }
        let token = CancellationToken::new();
        let rearm = Rearm::new(self.inner.config.auto_pop.rearm_on_reject);
        *slot = Some(AutoPopHandle {
            token: token.clone(),
            rearm: rearm.clone(),
        });
        tokio::spawn(auto_pop::run(self.clone(), token, rearm));
        true
    }

    /// Stop the auto-pop loop.
    pub fn stop_auto_pop(&self) {
        if let Some(handle) = self.inner.auto_pop.lock().take() {
            handle.token.cancel();
        }
    }

    /// True while the auto-pop loop is running.
    pub fn is_auto_popping(&self) -> bool {
        self.inner.auto_pop.lock().is_some()
    }

    /// Jobs waiting in the pending list.
    pub async fn pending_len(&self) -> Result<usize, QueueError> {
        Ok(self.inner.broker.len(&self.inner.keys.pending).await?)
    }

    /// Jobs popped but not yet removed.
    pub async fn in_flight_len(&self) -> Result<usize, QueueError> {
        Ok(self.inner.broker.len(&self.inner.keys.in_flight).await?)
    }

    /// Jobs in the error list.
    pub async fn error_len(&self) -> Result<usize, QueueError> {
        Ok(self.inner.broker.len(&self.inner.keys.error).await?)
    }

    /// Up to `limit` rejected jobs, most recent first.
    pub async fn errors(&self, limit: usize) -> Result<Vec<Job>, QueueError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let stop = i64::try_from(limit).map_or(i64::MAX, |n| n - 1);
        let raws = self
            .inner
            .broker
            .range(&self.inner.keys.error, 0, stop)
            .await?;

        let mut jobs = Vec::with_capacity(raws.len());
        for raw in raws {
            match Job::decode(&raw) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(queue = %self.inner.keys.error, error = %e, "Skipping undecodable entry"),
            }
        }
        Ok(jobs)
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
