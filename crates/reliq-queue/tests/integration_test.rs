//! End-to-end tests for the auto-pop loop.
//!
//! These drive a client through observers only: registering a job observer
//! starts the loop, and settling leases is what keeps it going.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use reliq_queue::{
    AutoPopConfig, EventKind, FnObserver, MemoryBroker, QueueClient, QueueConfig, QueueEvent,
    QueueObserver,
};

// ============================================================================
// Test Helpers
// ============================================================================

#[derive(Clone, Copy)]
enum Verdict {
    Acknowledge,
    Reject,
    Ignore,
}

/// Job observer that settles every delivered lease the same way.
struct Worker {
    client: QueueClient,
    verdict: Verdict,
    seen: Arc<Mutex<Vec<Value>>>,
}

impl Worker {
    fn attach(client: &QueueClient, verdict: Verdict) -> Arc<Mutex<Vec<Value>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        client.on(Arc::new(Self {
            client: client.clone(),
            verdict,
            seen: seen.clone(),
        }));
        seen
    }
}

#[async_trait]
impl QueueObserver for Worker {
    fn events(&self) -> u32 {
        EventKind::Job as u32
    }

    async fn on_event(&self, event: &QueueEvent) {
        let QueueEvent::Job(lease) = event else {
            return;
        };
        self.seen.lock().push(lease.job().payload.clone());
        let result = match self.verdict {
            Verdict::Acknowledge => self.client.acknowledge(lease).await.map(|_| ()),
            Verdict::Reject => self.client.reject(lease, "unprocessable").await.map(|_| ()),
            Verdict::Ignore => Ok(()),
        };
        assert!(result.is_ok(), "settle failed: {:?}", result);
    }
}

fn count_events(client: &QueueClient, kind: EventKind) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let sink = count.clone();
    client.on(Arc::new(FnObserver::new(kind as u32, move |_: &QueueEvent| {
        sink.fetch_add(1, Ordering::SeqCst);
    })));
    count
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn settle_time() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

fn client(config: QueueConfig) -> QueueClient {
    QueueClient::new(Arc::new(MemoryBroker::new()), config)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_acknowledging_observer_drains_queue() {
    let client = client(QueueConfig::new("work").manual());
    for n in 0..3 {
        client.push(&json!({"n": n})).await.unwrap();
    }

    let seen = Worker::attach(&client, Verdict::Acknowledge);
    assert!(client.is_auto_popping());
    wait_until(|| seen.lock().len() == 3).await;

    // Pushes after start are picked up by the blocked pop.
    client.push(&json!({"n": 3})).await.unwrap();
    wait_until(|| seen.lock().len() == 4).await;

    let payloads: Vec<i64> = seen.lock().iter().map(|v| v["n"].as_i64().unwrap()).collect();
    assert_eq!(payloads, vec![0, 1, 2, 3]);
    assert_eq!(client.pending_len().await.unwrap(), 0);
    assert_eq!(client.in_flight_len().await.unwrap(), 0);

    client.stop_auto_pop();
}

#[tokio::test]
async fn test_single_job_fires_success_once() {
    let client = client(QueueConfig::new("work").manual());
    let successes = count_events(&client, EventKind::Success);
    let seen = Worker::attach(&client, Verdict::Acknowledge);

    client.push(&json!({"name": "A"})).await.unwrap();
    wait_until(|| successes.load(Ordering::SeqCst) == 1).await;
    settle_time().await;

    assert_eq!(successes.load(Ordering::SeqCst), 1);
    assert_eq!(seen.lock().as_slice(), &[json!({"name": "A"})]);
    assert_eq!(client.in_flight_len().await.unwrap(), 0);

    client.stop_auto_pop();
}

#[tokio::test]
async fn test_rejection_stalls_loop_by_default() {
    let client = client(QueueConfig::new("work").manual());
    client.push(&json!(1)).await.unwrap();
    client.push(&json!(2)).await.unwrap();

    let seen = Worker::attach(&client, Verdict::Reject);
    wait_until(|| seen.lock().len() == 1).await;
    settle_time().await;

    assert_eq!(seen.lock().len(), 1);
    assert_eq!(client.pending_len().await.unwrap(), 1);
    assert_eq!(client.error_len().await.unwrap(), 1);
    assert!(client.gate().is_open());

    client.stop_auto_pop();
}

#[tokio::test]
async fn test_rearm_on_reject_keeps_going() {
    let config = QueueConfig {
        auto_pop: AutoPopConfig {
            rearm_on_reject: true,
            ..Default::default()
        },
        ..QueueConfig::new("work").manual()
    };
    let client = client(config);
    client.push(&json!(1)).await.unwrap();
    client.push(&json!(2)).await.unwrap();

    let seen = Worker::attach(&client, Verdict::Reject);
    wait_until(|| seen.lock().len() == 2).await;

    assert_eq!(client.error_len().await.unwrap(), 2);
    let errors = client.errors(10).await.unwrap();
    assert!(errors.iter().all(|job| job.error_message() == Some("unprocessable")));

    client.stop_auto_pop();
}

#[tokio::test]
async fn test_auto_acknowledge_without_settling_observer() {
    let client = client(QueueConfig::new("work"));
    let successes = count_events(&client, EventKind::Success);
    let seen = Worker::attach(&client, Verdict::Ignore);

    for n in 0..3 {
        client.push(&json!(n)).await.unwrap();
    }
    wait_until(|| successes.load(Ordering::SeqCst) == 3).await;

    assert_eq!(seen.lock().len(), 3);
    assert_eq!(client.in_flight_len().await.unwrap(), 0);

    client.stop_auto_pop();
}

#[tokio::test]
async fn test_stop_auto_pop_leaves_jobs_pending() {
    let client = client(QueueConfig::new("work").manual());
    let seen = Worker::attach(&client, Verdict::Acknowledge);
    assert!(client.is_auto_popping());

    client.stop_auto_pop();
    assert!(!client.is_auto_popping());
    settle_time().await;

    client.push(&json!("late")).await.unwrap();
    settle_time().await;

    assert!(seen.lock().is_empty());
    assert_eq!(client.pending_len().await.unwrap(), 1);
    assert!(client.gate().is_open());

    // A manual pop still works once the loop is gone.
    let lease = client.pop().await.unwrap().unwrap();
    client.acknowledge(&lease).await.unwrap();
}

#[tokio::test]
async fn test_second_job_observer_does_not_start_another_loop() {
    let client = client(QueueConfig::new("work"));
    let first = Worker::attach(&client, Verdict::Ignore);
    let second = Worker::attach(&client, Verdict::Ignore);
    assert!(!client.start_auto_pop());

    client.push(&json!("once")).await.unwrap();
    wait_until(|| first.lock().len() == 1).await;
    settle_time().await;

    // Both observers see the single delivery; nothing is popped twice.
    assert_eq!(first.lock().len(), 1);
    assert_eq!(second.lock().len(), 1);
    assert_eq!(client.in_flight_len().await.unwrap(), 0);

    client.stop_auto_pop();
}
