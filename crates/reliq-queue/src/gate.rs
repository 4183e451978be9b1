//! Single-slot in-flight gate.
//!
//! A gate is OPEN or CLOSED. A pop may only start on an open gate and closes
//! it for exactly one outstanding job; settling that job reopens it. There is
//! no expiry: a consumer that never settles keeps the gate closed until the
//! process restarts.
//!
//! Each [`QueueClient`](crate::QueueClient) owns its gate. Clients only
//! serialize against each other when they are built with the same
//! `Arc<InFlightGate>`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use crate::error::QueueError;
use crate::lease::Lease;

/// Open/closed flag guarding `pop`.
#[derive(Debug, Default)]
pub struct InFlightGate {
    closed: AtomicBool,
    reopened: Notify,
}

impl InFlightGate {
    /// Create an open gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the gate, failing if it is already closed.
    pub fn try_close(&self) -> Result<(), QueueError> {
        self.closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| QueueError::PopInProgress)
    }

    /// Reopen the gate.
    pub fn open(&self) {
        self.closed.store(false, Ordering::Release);
        self.reopened.notify_waiters();
    }

    /// Wait until the gate is open. Returns at once if it already is.
    pub async fn opened(&self) {
        loop {
            let notified = self.reopened.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_open() {
                return;
            }
            notified.await;
        }
    }

    /// True if a pop may start.
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }
}

/// Closes a gate and reopens it on drop unless told to keep it closed.
///
/// A pop future dropped part-way must not leave its gate closed. Once a
/// lease is bound, the gate is only reopened on drop if that lease is still
/// unsettled; settling already reopened it.
pub(crate) struct GateGuard {
    gate: Arc<InFlightGate>,
    armed: bool,
    lease: Option<Lease>,
}

impl GateGuard {
    pub(crate) fn close(gate: &Arc<InFlightGate>) -> Result<Self, QueueError> {
        gate.try_close()?;
        Ok(Self {
            gate: gate.clone(),
            armed: true,
            lease: None,
        })
    }

    /// Tie the gate to `lease`.
    pub(crate) fn bind(&mut self, lease: &Lease) {
        self.lease = Some(lease.clone());
    }

    /// Leave the gate closed; a lease now owns reopening it.
    pub(crate) fn keep_closed(mut self) {
        self.armed = false;
    }
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        let unsettled = self.lease.as_ref().is_none_or(|l| !l.is_settled());
        if self.armed && unsettled {
            self.gate.open();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_cycle() {
        let gate = InFlightGate::new();
        assert!(gate.is_open());

        gate.try_close().unwrap();
        assert!(!gate.is_open());
        assert!(matches!(gate.try_close(), Err(QueueError::PopInProgress)));

        gate.open();
        assert!(gate.is_open());
        gate.try_close().unwrap();
    }

    #[test]
    fn test_guard_reopens_on_drop() {
        let gate = Arc::new(InFlightGate::new());
        {
            let _guard = GateGuard::close(&gate).unwrap();
            assert!(!gate.is_open());
            assert!(GateGuard::close(&gate).is_err());
        }
        assert!(gate.is_open());

        GateGuard::close(&gate).unwrap().keep_closed();
        assert!(!gate.is_open());
    }

    #[tokio::test]
    async fn test_opened_waits_for_reopen() {
        let gate = Arc::new(InFlightGate::new());
        gate.opened().await;

        gate.try_close().unwrap();
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.opened().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        gate.open();
        tokio::time::timeout(std::time::Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
