use super::*;
use std::sync::Arc;

async fn all(broker: &MemoryBroker, key: &str) -> Vec<String> {
    broker.range(key, 0, -1).await.unwrap()
}

#[tokio::test]
async fn test_append_then_move_is_fifo() {
    let broker = MemoryBroker::new();
    broker.append("q", "1").await.unwrap();
    broker.append("q", "2").await.unwrap();

    let first = broker.move_tail("q", "q:process").await.unwrap();
    let second = broker.move_tail("q", "q:process").await.unwrap();
    assert_eq!(first.as_deref(), Some("1"));
    assert_eq!(second.as_deref(), Some("2"));
    assert_eq!(all(&broker, "q:process").await, vec!["2", "1"]);
    assert_eq!(broker.len("q").await.unwrap(), 0);
}

#[tokio::test]
async fn test_move_from_empty() {
    let broker = MemoryBroker::new();
    assert!(broker.move_tail("q", "d").await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_blocking_move_times_out() {
    let broker = MemoryBroker::new();
    let item = broker
        .blocking_move_tail("q", "d", Duration::from_secs(2))
        .await
        .unwrap();
    assert!(item.is_none());
}

#[tokio::test]
async fn test_blocking_move_wakes_on_append() {
    let broker = Arc::new(MemoryBroker::new());

    let waiter = {
        let broker = broker.clone();
        tokio::spawn(async move {
            broker
                .blocking_move_tail("q", "d", Duration::ZERO)
                .await
                .unwrap()
        })
    };

    tokio::task::yield_now().await;
    broker.append("q", "late").await.unwrap();

    let item = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.as_deref(), Some("late"));
    assert_eq!(all(&broker, "d").await, vec!["late"]);
}

#[tokio::test]
async fn test_remove_matching_directions() {
    let broker = MemoryBroker::new();
    for item in ["a", "x", "b", "x", "c", "x"] {
        broker.append("l", item).await.unwrap();
    }
    // head -> tail: x c x b x a
    assert_eq!(broker.remove_matching("l", -1, "x").await.unwrap(), 1);
    assert_eq!(all(&broker, "l").await, vec!["x", "c", "x", "b", "a"]);

    assert_eq!(broker.remove_matching("l", 1, "x").await.unwrap(), 1);
    assert_eq!(all(&broker, "l").await, vec!["c", "x", "b", "a"]);

    broker.append("l", "x").await.unwrap();
    assert_eq!(broker.remove_matching("l", 0, "x").await.unwrap(), 2);
    assert_eq!(all(&broker, "l").await, vec!["c", "b", "a"]);

    assert_eq!(broker.remove_matching("l", 0, "zzz").await.unwrap(), 0);
    assert_eq!(broker.remove_matching("missing", 1, "x").await.unwrap(), 0);
}

#[tokio::test]
async fn test_range_bounds() {
    let broker = MemoryBroker::new();
    for item in ["3", "2", "1"] {
        broker.append("l", item).await.unwrap();
    }
    assert_eq!(all(&broker, "l").await, vec!["1", "2", "3"]);
    assert_eq!(broker.range("l", 0, 0).await.unwrap(), vec!["1"]);
    assert_eq!(broker.range("l", -2, -1).await.unwrap(), vec!["2", "3"]);
    assert_eq!(broker.range("l", 1, 100).await.unwrap(), vec!["2", "3"]);
    assert!(broker.range("l", 5, 10).await.unwrap().is_empty());
    assert!(broker.range("none", 0, -1).await.unwrap().is_empty());
}
