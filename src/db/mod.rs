pub mod postgres;
pub mod redis;

pub use postgres::{create_pool, PgAnalyticsStore, PgHistoryStore, PgScoreStore};
pub use redis::{create_redis_client, RedisCache};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::models::{CachedScore, UserContext};

/// Persistent store for computed compatibility scores (cache-aside)
///
/// Exactly one live row exists per (song, template) pair: `put` is an
/// idempotent upsert, never an insert. `get` treats rows older than the
/// staleness window as misses without deleting them; the next `put`
/// overwrites in place.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Returns the cached score, or `None` when absent or stale
    async fn get(&self, song_id: &str, template_id: &str) -> AppResult<Option<CachedScore>>;

    /// Upserts the score for its (song, template) pair
    async fn put(&self, score: &CachedScore) -> AppResult<()>;
}

/// A served recommendation, persisted for offline analytics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationHistory {
    pub song_id: String,
    pub user_id: String,
    pub template_id: Option<String>,
    pub alternatives: Vec<String>,
    pub user_context: UserContext,
    pub compatibility_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Append-only log of served recommendations
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn record(&self, entry: &RecommendationHistory) -> AppResult<()>;
}

/// A single analytics event emitted per completed operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub event_type: String,
    pub user_id: Option<String>,
    pub song_id: Option<String>,
    pub template_id: Option<String>,
    pub layer_type: Option<String>,
    pub compatibility_score: Option<f64>,
    pub alternatives_count: Option<usize>,
    pub variations_count: Option<usize>,
    pub cache_hit: bool,
    pub response_time_ms: u64,
    pub scoring_time_ms: Option<u64>,
    pub templates_evaluated: Option<usize>,
    pub variations_evaluated: Option<usize>,
    pub timestamp: Option<DateTime<Utc>>,
    pub version: Option<String>,
}

/// Durable sink for batched analytics events
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Inserts a batch; implementations continue past per-row failures
    async fn insert_events(&self, events: &[AnalyticsEvent]) -> AppResult<()>;
}

/// Response cache collaborator (cache-aside for whole responses)
///
/// All operations are best-effort: a broken cache degrades to misses and
/// dropped writes, never to request failures.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Returns the cached value, or `None` on miss or cache failure
    async fn get(&self, key: &str) -> Option<serde_json::Value>;

    /// Stores a value with a TTL; returns whether the write was accepted
    async fn set(&self, key: &str, value: &serde_json::Value, ttl_seconds: u64) -> bool;

    /// Deletes every key starting with the prefix, returning the count removed
    async fn delete_by_prefix(&self, prefix: &str) -> u64;
}
