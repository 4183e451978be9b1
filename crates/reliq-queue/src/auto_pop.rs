//! Auto-pop loop.
//!
//! Pops once immediately, then waits to be re-armed before the next pop.
//! Acknowledgements always re-arm; rejections only with `rearm_on_reject`.
//! A pop that timed out empty polls again straight away when
//! `rearm_on_empty` is set and otherwise waits like any other pop. A pop
//! refused because the gate is closed waits for the gate to reopen.
//! Delivery cadence therefore follows acknowledgement cadence: one job per
//! gate at a time.
//!
//! Each loop owns its re-arm signal and every lease it delivers carries a
//! handle to it, so settling that lease through any client sharing the gate
//! wakes the loop that popped it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::QueueClient;
use crate::error::QueueError;

/// Wakes one auto-pop loop after a lease it delivered is settled.
#[derive(Debug, Clone)]
pub(crate) struct Rearm {
    notify: Arc<Notify>,
    on_reject: bool,
}

impl Rearm {
    pub(crate) fn new(on_reject: bool) -> Self {
        Self {
            notify: Arc::new(Notify::new()),
            on_reject,
        }
    }

    pub(crate) fn after_success(&self) {
        self.notify.notify_one();
    }

    pub(crate) fn after_reject(&self) {
        if self.on_reject {
            self.notify.notify_one();
        }
    }

    async fn wait(&self) {
        self.notify.notified().await;
    }
}

/// A running loop as seen by its client.
#[derive(Debug)]
pub(crate) struct AutoPopHandle {
    pub(crate) token: CancellationToken,
    pub(crate) rearm: Rearm,
}

pub(crate) async fn run(client: QueueClient, token: CancellationToken, rearm: Rearm) {
    let queue = client.keys().pending.clone();
    let policy = client.config().auto_pop.clone();
    let retry_delay = Duration::from_millis(policy.retry_delay_ms);
    info!(queue = %queue, "Auto-pop started");

    loop {
        let popped = tokio::select! {
            _ = token.cancelled() => break,
            popped = client.pop() => popped,
        };

        match popped {
            Ok(Some(_)) => {}
            Ok(None) if policy.rearm_on_empty => continue,
            Ok(None) => debug!(queue = %queue, "Empty pop; waiting to be re-armed"),
            Err(QueueError::PopInProgress) => {
                debug!(queue = %queue, "Gate closed; waiting for it to reopen");
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = client.gate().opened() => continue,
                }
            }
            Err(e) if e.is_integrity() => {
                error!(queue = %queue, error = %e, "Auto-pop skipped a corrupted job");
                continue;
            }
            Err(e) => {
                warn!(queue = %queue, error = %e, "Auto-pop failed; retrying");
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(retry_delay) => continue,
                }
            }
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = rearm.wait() => {}
        }
    }

    info!(queue = %queue, "Auto-pop stopped");
}
