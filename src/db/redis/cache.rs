use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::fmt::Display;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::error::{AppError, AppResult};

/// Every key lives under this prefix so the cache can share a Redis instance
const KEY_PREFIX: &str = "estate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Most viewed active listings, by fetch size
    PopularProperties(usize),
    /// Most engaged blog posts, by fetch size
    PopularPosts(usize),
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::PopularProperties(size) => {
                write!(f, "{}:popular:properties:{}", KEY_PREFIX, size)
            }
            CacheKey::PopularPosts(size) => write!(f, "{}:popular:posts:{}", KEY_PREFIX, size),
        }
    }
}

pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    Ok(Client::open(redis_url)?)
}

enum CacheOp {
    Set { key: String, value: String, ttl: u64 },
    Delete(Vec<String>),
}

/// Redis cache for popular lists. Reads are awaited; writes and invalidations
/// are queued to a background task.
#[derive(Clone)]
pub struct Cache {
    conn: ConnectionManager,
    ops_tx: mpsc::UnboundedSender<CacheOp>,
}

/// Stops the background writer after it drains queued operations
pub struct CacheWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl CacheWriterHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Cache writer panicked");
        }
    }
}

impl Cache {
    /// Opens a managed connection (reconnects on failure) and starts the writer
    pub async fn connect(client: Client) -> anyhow::Result<(Self, CacheWriterHandle)> {
        let conn = ConnectionManager::new(client).await?;
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let task = tokio::spawn(Self::writer_task(conn.clone(), ops_rx, shutdown_rx));

        Ok((Self { conn, ops_tx }, CacheWriterHandle { shutdown_tx, task }))
    }

    async fn writer_task(
        mut conn: ConnectionManager,
        mut ops_rx: mpsc::UnboundedReceiver<CacheOp>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::debug!("Cache writer started");

        loop {
            tokio::select! {
                Some(op) = ops_rx.recv() => Self::apply(&mut conn, op).await,
                _ = shutdown_rx.recv() => {
                    ops_rx.close();
                    let mut drained = 0usize;
                    while let Some(op) = ops_rx.recv().await {
                        Self::apply(&mut conn, op).await;
                        drained += 1;
                    }
                    tracing::info!(drained, "Cache writer stopped");
                    break;
                }
            }
        }
    }

    async fn apply(conn: &mut ConnectionManager, op: CacheOp) {
        let result: redis::RedisResult<()> = match op {
            CacheOp::Set { key, value, ttl } => conn.set_ex(key, value, ttl).await,
            CacheOp::Delete(keys) if keys.is_empty() => Ok(()),
            CacheOp::Delete(keys) => conn.del(keys).await,
        };
        if let Err(e) = result {
            tracing::error!(error = %e, "Redis cache write failed");
        }
    }

    /// Cached value for `key`, or `None` on a miss
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> AppResult<Option<T>> {
        let mut conn = self.conn.clone();
        let cached: Option<String> = conn.get(key.to_string()).await?;

        cached
            .map(|json| {
                serde_json::from_str(&json)
                    .map_err(|e| AppError::Internal(format!("Corrupt cache entry {}: {}", key, e)))
            })
            .transpose()
    }

    pub fn set_in_background<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl: u64) {
        match serde_json::to_string(value) {
            Ok(value) => self.enqueue(CacheOp::Set {
                key: key.to_string(),
                value,
                ttl,
            }),
            Err(e) => tracing::error!(error = %e, key = %key, "Cache serialization failed"),
        }
    }

    /// Queues deletion of `keys`
    pub fn invalidate_in_background(&self, keys: &[CacheKey]) {
        self.enqueue(CacheOp::Delete(keys.iter().map(|k| k.to_string()).collect()));
    }

    fn enqueue(&self, op: CacheOp) {
        if self.ops_tx.send(op).is_err() {
            tracing::warn!("Cache writer is gone, dropping cache operation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_keys_are_namespaced() {
        assert_eq!(
            CacheKey::PopularProperties(50).to_string(),
            "estate:popular:properties:50"
        );
        assert_eq!(CacheKey::PopularPosts(100).to_string(), "estate:popular:posts:100");
    }

    #[test]
    fn test_cache_keys_differ_by_size() {
        assert_ne!(
            CacheKey::PopularProperties(50).to_string(),
            CacheKey::PopularProperties(100).to_string()
        );
    }
}
