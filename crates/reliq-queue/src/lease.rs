//! Leases on popped jobs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};

use crate::auto_pop::Rearm;
use crate::envelope::Job;
use crate::error::QueueError;
use crate::gate::InFlightGate;

/// Claim on one job sitting in the in-flight list.
///
/// Returned by [`QueueClient::pop`](crate::QueueClient::pop) and passed back
/// to `acknowledge`, `reject` or `requeue`. Clones share the same claim, so
/// a lease can be settled only once no matter how many observers hold it.
#[derive(Debug, Clone)]
pub struct Lease {
    inner: Arc<LeaseInner>,
}

#[derive(Debug)]
struct LeaseInner {
    job: Job,
    raw: String,
    popped_at: DateTime<Utc>,
    settled: AtomicBool,
    gate: Arc<InFlightGate>,
    rearm: Option<Rearm>,
}

impl Lease {
    /// Lease on a freshly popped job. `rearm` is set when an auto-pop loop
    /// was running at pop time.
    pub(crate) fn delivered(
        job: Job,
        raw: String,
        gate: Arc<InFlightGate>,
        rearm: Option<Rearm>,
    ) -> Self {
        Self {
            inner: Arc::new(LeaseInner {
                job,
                raw,
                popped_at: Utc::now(),
                settled: AtomicBool::new(false),
                gate,
                rearm,
            }),
        }
    }

    /// The delivered job.
    pub fn job(&self) -> &Job {
        &self.inner.job
    }

    /// The entry exactly as stored in the in-flight list.
    pub fn raw(&self) -> &str {
        &self.inner.raw
    }

    /// When the job was popped.
    pub fn popped_at(&self) -> DateTime<Utc> {
        self.inner.popped_at
    }

    /// True once acknowledged or rejected.
    pub fn is_settled(&self) -> bool {
        self.inner.settled.load(Ordering::Acquire)
    }

    /// Mark settled; fails if another holder got there first.
    pub(crate) fn settle(&self) -> Result<(), QueueError> {
        self.inner
            .settled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| QueueError::LeaseSettled)
    }

    /// Undo [`settle`](Self::settle) after the broker call failed.
    pub(crate) fn unsettle(&self) {
        self.inner.settled.store(false, Ordering::Release);
    }

    /// Reopen the gate this lease was popped under.
    pub(crate) fn release_gate(&self) {
        self.inner.gate.open();
    }

    /// Wake the loop that delivered this lease after an acknowledgement.
    pub(crate) fn rearm_after_success(&self) {
        if let Some(rearm) = &self.inner.rearm {
            rearm.after_success();
        }
    }

    /// Wake the loop that delivered this lease after a rejection, if its
    /// policy asks for it.
    pub(crate) fn rearm_after_reject(&self) {
        if let Some(rearm) = &self.inner.rearm {
            rearm.after_reject();
        }
    }
}
