//! List broker contract and the in-memory implementation.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::trace;

use crate::error::BrokerError;

/// Operations the queue needs from a list store.
///
/// Lists have a head and a tail. Items are added at the head and leave from
/// the tail, so every list drains in FIFO order.
#[async_trait]
pub trait ListBroker: Send + Sync {
    /// Add `item` at the head of `key`.
    async fn append(&self, key: &str, item: &str) -> Result<(), BrokerError>;

    /// Atomically take the tail of `src` and add it at the head of `dst`.
    ///
    /// Waits up to `timeout` for `src` to become non-empty; `Duration::ZERO`
    /// waits forever. Returns `None` on timeout.
    async fn blocking_move_tail(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<String>, BrokerError>;

    /// Non-blocking [`blocking_move_tail`](Self::blocking_move_tail).
    async fn move_tail(&self, src: &str, dst: &str) -> Result<Option<String>, BrokerError>;

    /// Remove occurrences of `item` from `key`.
    ///
    /// `count > 0` removes up to `count` scanning from the head, `count < 0`
    /// up to `|count|` scanning from the tail, `0` removes all. Returns the
    /// number removed.
    async fn remove_matching(&self, key: &str, count: i64, item: &str)
    -> Result<usize, BrokerError>;

    /// Number of items in `key`.
    async fn len(&self, key: &str) -> Result<usize, BrokerError>;

    /// Items from `start` to `stop` inclusive, counted from the head.
    /// Negative indices count from the tail (`-1` is the last item).
    async fn range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, BrokerError>;
}

/// In-process broker for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryBroker {
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    changed: Notify,
}

impl MemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    fn try_move(&self, src: &str, dst: &str) -> Option<String> {
        let mut lists = self.lists.lock();
        let item = lists.get_mut(src)?.pop_back()?;
        lists
            .entry(dst.to_string())
            .or_default()
            .push_front(item.clone());
        Some(item)
    }
}

#[async_trait]
impl ListBroker for MemoryBroker {
    async fn append(&self, key: &str, item: &str) -> Result<(), BrokerError> {
        self.lists
            .lock()
            .entry(key.to_string())
            .or_default()
            .push_front(item.to_string());
        self.changed.notify_waiters();
        Ok(())
    }

    async fn blocking_move_tail(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<String>, BrokerError> {
        let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);

        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_move(src, dst) {
                return Ok(Some(item));
            }

            trace!("Waiting on empty list {}", src);
            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(self.try_move(src, dst));
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn move_tail(&self, src: &str, dst: &str) -> Result<Option<String>, BrokerError> {
        let item = self.try_move(src, dst);
        if item.is_some() {
            self.changed.notify_waiters();
        }
        Ok(item)
    }

    async fn remove_matching(
        &self,
        key: &str,
        count: i64,
        item: &str,
    ) -> Result<usize, BrokerError> {
        let mut lists = self.lists.lock();
        let Some(list) = lists.get_mut(key) else {
            return Ok(0);
        };

        let limit = if count == 0 {
            usize::MAX
        } else {
            count.unsigned_abs() as usize
        };
        let mut matches: Vec<usize> = list
            .iter()
            .enumerate()
            .filter(|(_, v)| v.as_str() == item)
            .map(|(i, _)| i)
            .collect();
        if count < 0 {
            matches.reverse();
        }
        matches.truncate(limit);
        // Highest index first so earlier removals don't shift later ones.
        matches.sort_unstable_by(|a, b| b.cmp(a));
        for index in &matches {
            list.remove(*index);
        }
        Ok(matches.len())
    }

    async fn len(&self, key: &str) -> Result<usize, BrokerError> {
        Ok(self.lists.lock().get(key).map_or(0, VecDeque::len))
    }

    async fn range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, BrokerError> {
        let lists = self.lists.lock();
        let Some(list) = lists.get(key) else {
            return Ok(Vec::new());
        };

        let len = list.len() as i64;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if start > stop || start >= len {
            return Ok(Vec::new());
        }
        Ok(list
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
