//! Redis-backed list broker.
//!
//! | contract             | command      |
//! |----------------------|--------------|
//! | `append`             | `LPUSH`      |
//! | `blocking_move_tail` | `BRPOPLPUSH` |
//! | `move_tail`          | `RPOPLPUSH`  |
//! | `remove_matching`    | `LREM`       |
//! | `len`                | `LLEN`       |
//! | `range`              | `LRANGE`     |
//!
//! Redis serves one command per connection at a time, so a waiting
//! `BRPOPLPUSH` holds its connection until it returns. Short commands share
//! one multiplexed connection. Each blocking move checks out a connection of
//! its own from a small idle pool and opens a new one when the pool is
//! empty, so concurrent pops from clients sharing this broker never queue
//! behind each other. A connection is returned only after its command
//! completed; one whose move failed or was cancelled is dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use tracing::debug;

use crate::broker::ListBroker;
use crate::error::BrokerError;

/// Idle connections kept for blocking moves.
const MAX_IDLE_BLOCKING: usize = 16;

/// Bounded stack of idle connections.
struct IdlePool<T> {
    idle: Mutex<Vec<T>>,
    max_idle: usize,
}

impl<T> IdlePool<T> {
    fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    fn take(&self) -> Option<T> {
        self.idle.lock().pop()
    }

    /// Keep `conn` for reuse, or drop it when the pool is full.
    fn give_back(&self, conn: T) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(conn);
        }
    }

    fn idle(&self) -> usize {
        self.idle.lock().len()
    }
}

/// [`ListBroker`] over a Redis server.
#[derive(Clone)]
pub struct RedisBroker {
    client: redis::Client,
    conn: MultiplexedConnection,
    blocking: Arc<IdlePool<MultiplexedConnection>>,
}

impl RedisBroker {
    /// Connect to `redis_url` (e.g. `redis://localhost:6379`).
    pub async fn connect(redis_url: &str) -> Result<Self, BrokerError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| BrokerError::Connection(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        debug!("Connected to Redis broker");
        Ok(Self {
            client,
            conn,
            blocking: Arc::new(IdlePool::new(MAX_IDLE_BLOCKING)),
        })
    }

    async fn checkout_blocking(&self) -> Result<MultiplexedConnection, BrokerError> {
        if let Some(conn) = self.blocking.take() {
            return Ok(conn);
        }
        // A blocking move may legitimately wait forever.
        let config = redis::AsyncConnectionConfig::new(); // default: no response timeout
        let conn = self
            .client
            .get_multiplexed_async_connection_with_config(&config)
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        debug!("Opened blocking Redis connection");
        Ok(conn)
    }
}

fn command_error(command: &str, e: redis::RedisError) -> BrokerError {
    BrokerError::Command(format!("{} failed: {}", command, e))
}

#[async_trait]
impl ListBroker for RedisBroker {
    async fn append(&self, key: &str, item: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("LPUSH")
            .arg(key)
            .arg(item)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("LPUSH", e))?;
        Ok(())
    }

    async fn blocking_move_tail(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<String>, BrokerError> {
        let mut conn = self.checkout_blocking().await?;
        let item: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(src)
            .arg(dst)
            .arg(timeout.as_secs())
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("BRPOPLPUSH", e))?;
        self.blocking.give_back(conn);
        Ok(item)
    }

    async fn move_tail(&self, src: &str, dst: &str) -> Result<Option<String>, BrokerError> {
        let mut conn = self.conn.clone();
        let item: Option<String> = redis::cmd("RPOPLPUSH")
            .arg(src)
            .arg(dst)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("RPOPLPUSH", e))?;
        Ok(item)
    }

    async fn remove_matching(
        &self,
        key: &str,
        count: i64,
        item: &str,
    ) -> Result<usize, BrokerError> {
        let mut conn = self.conn.clone();
        let removed: usize = redis::cmd("LREM")
            .arg(key)
            .arg(count)
            .arg(item)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("LREM", e))?;
        Ok(removed)
    }

    async fn len(&self, key: &str) -> Result<usize, BrokerError> {
        let mut conn = self.conn.clone();
        let len: usize = redis::cmd("LLEN")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("LLEN", e))?;
        Ok(len)
    }

    async fn range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, BrokerError> {
        let mut conn = self.conn.clone();
        let items: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("LRANGE", e))?;
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_idle_pool_reuses_newest_and_caps() {
        let pool = IdlePool::new(2);
        assert!(pool.take().is_none());

        pool.give_back(1);
        pool.give_back(2);
        pool.give_back(3);
        assert_eq!(pool.idle(), 2);

        assert_eq!(pool.take(), Some(2));
        assert_eq!(pool.take(), Some(1));
        assert!(pool.take().is_none());
    }

    fn redis_url() -> String {
        std::env::var("RELIQ_REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    #[tokio::test]
    #[ignore = "needs a Redis server"]
    async fn test_blocking_moves_do_not_serialize() {
        let broker = RedisBroker::connect(&redis_url()).await.unwrap();
        let prefix = format!("reliq-test-{}", std::process::id());
        let idle_src = format!("{prefix}:idle");
        let idle_dst = format!("{prefix}:idle:process");
        let busy_src = format!("{prefix}:busy");
        let busy_dst = format!("{prefix}:busy:process");

        let waiting = {
            let broker = broker.clone();
            tokio::spawn(async move {
                broker
                    .blocking_move_tail(&idle_src, &idle_dst, Duration::from_secs(3))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        broker.append(&busy_src, "job").await.unwrap();
        let started = Instant::now();
        let item = broker
            .blocking_move_tail(&busy_src, &busy_dst, Duration::from_secs(3))
            .await
            .unwrap();
        assert_eq!(item.as_deref(), Some("job"));
        assert!(started.elapsed() < Duration::from_secs(1));

        assert!(waiting.await.unwrap().unwrap().is_none());
        assert_eq!(broker.blocking.idle(), 2);
        broker.remove_matching(&busy_dst, 0, "job").await.unwrap();
    }
}
