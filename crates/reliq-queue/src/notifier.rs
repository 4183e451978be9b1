//! Lifecycle notifications.
//!
//! Observers declare which events they want through a bitmask of
//! [`EventKind`] values and are awaited one after another, in registration
//! order, each time a matching event is emitted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::envelope::Job;
use crate::lease::Lease;

/// Event kinds, usable as bitmask flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum EventKind {
    /// A job was appended to the pending list.
    Push = 1 << 0,
    /// A job was popped and passed its integrity check.
    Job = 1 << 1,
    /// A job was acknowledged.
    Success = 1 << 2,
    /// A job was rejected to the error list.
    Reject = 1 << 3,
}

impl EventKind {
    /// All kinds as a bitmask.
    pub const ALL: u32 =
        Self::Push as u32 | Self::Job as u32 | Self::Success as u32 | Self::Reject as u32;

    /// Check if this kind is included in `mask`.
    pub fn matches(&self, mask: u32) -> bool {
        (mask & (*self as u32)) != 0
    }

    /// Lower-case event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Push => "push",
            EventKind::Job => "job",
            EventKind::Success => "success",
            EventKind::Reject => "reject",
        }
    }
}

/// A lifecycle event.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// Carries the pushed job.
    Push(Job),
    /// Carries the lease on the delivered job; settle it through the client.
    Job(Lease),
    /// Carries the acknowledged job.
    Success(Job),
    /// Carries the rejected job, with its error message attached.
    Reject(Job),
}

impl QueueEvent {
    /// Kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            QueueEvent::Push(_) => EventKind::Push,
            QueueEvent::Job(_) => EventKind::Job,
            QueueEvent::Success(_) => EventKind::Success,
            QueueEvent::Reject(_) => EventKind::Reject,
        }
    }

    /// The job this event is about.
    pub fn job(&self) -> &Job {
        match self {
            QueueEvent::Push(job) | QueueEvent::Success(job) | QueueEvent::Reject(job) => job,
            QueueEvent::Job(lease) => lease.job(),
        }
    }
}

/// Queue observer trait.
#[async_trait]
pub trait QueueObserver: Send + Sync {
    /// Bitmask of [`EventKind`]s to receive.
    fn events(&self) -> u32 {
        EventKind::ALL
    }

    /// Called for each matching event.
    async fn on_event(&self, event: &QueueEvent);
}

/// Observer backed by a closure.
pub struct FnObserver<F>
where
    F: Fn(&QueueEvent) + Send + Sync,
{
    events: u32,
    callback: F,
    once: bool,
    fired: AtomicBool,
}

impl<F> FnObserver<F>
where
    F: Fn(&QueueEvent) + Send + Sync,
{
    /// Observe the kinds in `events` with `callback`.
    pub fn new(events: u32, callback: F) -> Self {
        Self {
            events,
            callback,
            once: false,
            fired: AtomicBool::new(false),
        }
    }

    /// Like [`new`](Self::new), but `callback` runs for the first matching
    /// event only. Later events are ignored.
    pub fn once(events: u32, callback: F) -> Self {
        Self {
            once: true,
            ..Self::new(events, callback)
        }
    }
}

#[async_trait]
impl<F> QueueObserver for FnObserver<F>
where
    F: Fn(&QueueEvent) + Send + Sync,
{
    fn events(&self) -> u32 {
        self.events
    }

    async fn on_event(&self, event: &QueueEvent) {
        if self.once && self.fired.swap(true, Ordering::AcqRel) {
            return;
        }
        (self.callback)(event);
    }
}

/// Logs every event it sees.
pub struct TracingObserver {
    name: String,
}

impl TracingObserver {
    /// Create a logging observer tagged with `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl QueueObserver for TracingObserver {
    async fn on_event(&self, event: &QueueEvent) {
        let job = event.job();
        match event {
            QueueEvent::Reject(_) => info!(
                queue = %self.name,
                checksum = job.sys.checksum,
                error = job.error_message().unwrap_or_default(),
                "Job rejected"
            ),
            _ => debug!(
                queue = %self.name,
                event = event.kind().as_str(),
                checksum = job.sys.checksum,
                attempts = job.attempts(),
                "Queue event"
            ),
        }
    }
}

/// Observer registry.
#[derive(Default)]
pub struct Notifier {
    observers: RwLock<Vec<Arc<dyn QueueObserver>>>,
}

impl Notifier {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer.
    ///
    /// Returns true if this is the first observer interested in
    /// [`EventKind::Job`].
    pub fn register(&self, observer: Arc<dyn QueueObserver>) -> bool {
        let mut observers = self.observers.write();
        let wants_jobs = EventKind::Job.matches(observer.events());
        let first = wants_jobs
            && !observers
                .iter()
                .any(|o| EventKind::Job.matches(o.events()));
        observers.push(observer);
        first
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// True if no observer is registered.
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Deliver `event` to every interested observer.
    pub async fn emit(&self, event: &QueueEvent) {
        let kind = event.kind();
        let targets: Vec<Arc<dyn QueueObserver>> = self
            .observers
            .read()
            .iter()
            .filter(|o| kind.matches(o.events()))
            .cloned()
            .collect();

        for observer in targets {
            observer.on_event(event).await;
        }
    }
}

#[cfg(test)]
#[path = "notifier_tests.rs"]
mod tests;
