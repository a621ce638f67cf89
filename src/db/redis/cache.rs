use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use std::fmt::Display;
use tokio::sync::mpsc;

use crate::db::ResponseCache;

/// Structured response-cache keys: `{domain}:{id}:{qualifier}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Full template recommendation, keyed by song and user-context hash
    TemplateRecommendation {
        song_id: String,
        context_hash: String,
    },
    /// Layer variation listing, keyed by template and layer
    LayerVariations {
        template_id: String,
        layer: String,
    },
}

impl CacheKey {
    /// Prefix matching every recommendation entry for one song, used when the
    /// song's candidate set changes and its entries must be invalidated
    pub fn template_prefix(song_id: &str) -> String {
        format!("recommendation:template:{}:", song_id)
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::TemplateRecommendation {
                song_id,
                context_hash,
            } => write!(f, "recommendation:template:{}:{}", song_id, context_hash),
            CacheKey::LayerVariations { template_id, layer } => {
                write!(f, "recommendation:variations:{}:{}", template_id, layer)
            }
        }
    }
}

/// Creates a Redis client for caching
///
/// Establishes a connection to Redis for fast data caching.
/// Uses connection pooling via the connection-manager feature.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Message for asynchronous cache writes
struct CacheWriteMessage {
    key: String,
    value: String,
    ttl: u64,
}

/// Redis-backed response cache with non-blocking writes
///
/// Writes go through a background task so cache persistence never sits on the
/// response path; reads are direct. Every failure degrades to a miss.
#[derive(Clone)]
pub struct RedisCache {
    redis_client: Client,
    write_tx: mpsc::UnboundedSender<CacheWriteMessage>,
}

/// Handle for gracefully shutting down the cache writer
pub struct CacheWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl CacheWriterHandle {
    /// Initiates a graceful shutdown of the cache writer
    ///
    /// Sends a shutdown signal to the writer task and waits for it to flush
    /// all pending writes to Redis.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Cache writer shutdown signal sent");
    }
}

impl RedisCache {
    /// Creates a new cache instance with an async write background task
    pub fn new(redis_client: Client) -> (Self, CacheWriterHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let client = redis_client.clone();
        tokio::spawn(async move {
            Self::cache_writer_task(client, write_rx, shutdown_rx).await;
        });

        let cache = Self {
            redis_client,
            write_tx,
        };

        let handle = CacheWriterHandle { shutdown_tx };

        (cache, handle)
    }

    /// Background task that processes cache write messages
    ///
    /// Continuously receives cache write requests from the channel and writes
    /// them to Redis. On shutdown signal, flushes all remaining messages
    /// before exiting.
    async fn cache_writer_task(
        client: Client,
        mut write_rx: mpsc::UnboundedReceiver<CacheWriteMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Cache writer task started");

        loop {
            tokio::select! {
                Some(msg) = write_rx.recv() => {
                    if let Err(e) = Self::write_to_redis(&client, msg).await {
                        tracing::error!(error = %e, "Failed to write to Redis cache");
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Cache writer shutting down, flushing remaining writes");

                    while let Ok(msg) = write_rx.try_recv() {
                        if let Err(e) = Self::write_to_redis(&client, msg).await {
                            tracing::error!(error = %e, "Failed to flush cache write during shutdown");
                        }
                    }

                    tracing::info!("Cache writer task stopped");
                    break;
                }
            }
        }
    }

    /// Writes a single message to Redis
    async fn write_to_redis(client: &Client, msg: CacheWriteMessage) -> redis::RedisResult<()> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(msg.key, msg.value, msg.ttl).await?;
        Ok(())
    }
}

#[async_trait]
impl ResponseCache for RedisCache {
    async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let mut conn = match self.redis_client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "Redis connection failed, treating as cache miss");
                return None;
            }
        };

        let cached: Option<String> = match conn.get(key).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Redis get failed, treating as cache miss");
                return None;
            }
        };

        match cached {
            Some(json) => match serde_json::from_str(&json) {
                Ok(value) => {
                    tracing::debug!(key = %key, "Cache hit");
                    Some(value)
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Cache deserialization failed");
                    None
                }
            },
            None => {
                tracing::debug!(key = %key, "Cache miss");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &serde_json::Value, ttl_seconds: u64) -> bool {
        let json = match serde_json::to_string(value) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Cache serialization error");
                return false;
            }
        };

        let msg = CacheWriteMessage {
            key: key.to_string(),
            value: json,
            ttl: ttl_seconds,
        };

        match self.write_tx.send(msg) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Failed to send cache write message");
                false
            }
        }
    }

    async fn delete_by_prefix(&self, prefix: &str) -> u64 {
        let mut conn = match self.redis_client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "Redis connection failed, skipping invalidation");
                return 0;
            }
        };

        let pattern = format!("{}*", prefix);
        let keys: Vec<String> = match conn.keys(&pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(pattern = %pattern, error = %e, "Redis keys scan failed");
                return 0;
            }
        };

        if keys.is_empty() {
            return 0;
        }

        match conn.del::<_, u64>(keys).await {
            Ok(count) => {
                tracing::debug!(prefix = %prefix, count = count, "Cache entries invalidated");
                count
            }
            Err(e) => {
                tracing::warn!(prefix = %prefix, error = %e, "Redis delete failed");
                0
            }
        }
    }
}
