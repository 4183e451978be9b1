//! # Reliq Queue
//!
//! Reliable queue client over list-based brokers.
//!
//! A pop atomically moves a job from the pending list to an in-flight list
//! and hands out a [`Lease`]. The job leaves the in-flight list only when the
//! lease is acknowledged; until then it stays visible for recovery.
//!
//! ## Features
//!
//! - Push / pop / acknowledge / reject (dead-letter) / requeue with retry history
//! - CRC-32 payload checksum checked before delivery
//! - Single-slot in-flight gate per client, shareable on demand
//! - Lifecycle observers and an acknowledgement-driven auto-pop loop
//! - In-flight sweeper for crash recovery
//! - In-memory broker, and a Redis broker behind the `redis` feature
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reliq_queue::{MemoryBroker, QueueClient, QueueConfig};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), reliq_queue::QueueError> {
//! let client = QueueClient::new(Arc::new(MemoryBroker::new()), QueueConfig::new("mail").manual());
//! client.push(&json!({"to": "ops@example.com"})).await?;
//!
//! if let Some(lease) = client.pop().await? {
//!     client.acknowledge(&lease).await?;
//! }
//! # Ok(())
//! # }
//! ```

mod auto_pop;
pub mod broker;
pub mod checksum;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod gate;
pub mod lease;
pub mod notifier;
#[cfg(feature = "redis")]
pub mod redis_broker;
pub mod sweeper;

pub use broker::{ListBroker, MemoryBroker};
pub use client::QueueClient;
pub use config::{AutoPopConfig, QueueConfig, QueueKeys};
pub use envelope::{Job, JobError, RetryInfo, RetryRecord, SysMeta};
pub use error::{BrokerError, QueueError};
pub use gate::InFlightGate;
pub use lease::Lease;
pub use notifier::{EventKind, FnObserver, QueueEvent, QueueObserver, TracingObserver};
#[cfg(feature = "redis")]
pub use redis_broker::RedisBroker;
pub use sweeper::{OlderThan, RecoverAll, SweepPolicy, SweepReport, Sweeper};

// Re-export CancellationToken for callers driving the sweeper
pub use tokio_util::sync::CancellationToken;
