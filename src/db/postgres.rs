use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::db::{AnalyticsEvent, AnalyticsStore, HistoryStore, RecommendationHistory, ScoreStore};
use crate::error::AppResult;
use crate::models::{
    CachedScore, ScoreBreakdown, SongSnapshot, TemplateSnapshot, UserContext,
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

#[derive(FromRow)]
struct ScoreRow {
    song_id: String,
    template_id: String,
    base_score: f64,
    tempo_score: f64,
    genre_score: f64,
    energy_score: f64,
    style_score: f64,
    mood_score: f64,
    song_snapshot: Json<SongSnapshot>,
    template_snapshot: Json<TemplateSnapshot>,
    computed_at: DateTime<Utc>,
    algorithm_version: String,
}

impl From<ScoreRow> for CachedScore {
    fn from(row: ScoreRow) -> Self {
        CachedScore {
            song_id: row.song_id,
            template_id: row.template_id,
            base_score: row.base_score,
            breakdown: ScoreBreakdown {
                tempo_score: row.tempo_score,
                genre_score: row.genre_score,
                energy_score: row.energy_score,
                style_score: row.style_score,
                mood_score: row.mood_score,
            },
            song_snapshot: row.song_snapshot.0,
            template_snapshot: row.template_snapshot.0,
            computed_at: row.computed_at,
            algorithm_version: row.algorithm_version,
        }
    }
}

/// Postgres-backed compatibility score store
#[derive(Clone)]
pub struct PgScoreStore {
    pool: PgPool,
}

impl PgScoreStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScoreStore for PgScoreStore {
    async fn get(&self, song_id: &str, template_id: &str) -> AppResult<Option<CachedScore>> {
        let row: Option<ScoreRow> = sqlx::query_as(
            r#"
            SELECT song_id, template_id, base_score,
                   tempo_score, genre_score, energy_score, style_score, mood_score,
                   song_snapshot, template_snapshot, computed_at, algorithm_version
            FROM compatibility_scores
            WHERE song_id = $1 AND template_id = $2
            "#,
        )
        .bind(song_id)
        .bind(template_id)
        .fetch_optional(&self.pool)
        .await?;

        // Stale rows stay in place; the next put overwrites them
        Ok(row
            .map(CachedScore::from)
            .filter(|score| score.is_fresh(Utc::now())))
    }

    async fn put(&self, score: &CachedScore) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO compatibility_scores (
                song_id, template_id, base_score,
                tempo_score, genre_score, energy_score, style_score, mood_score,
                song_snapshot, template_snapshot, computed_at, algorithm_version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (song_id, template_id) DO UPDATE SET
                base_score = EXCLUDED.base_score,
                tempo_score = EXCLUDED.tempo_score,
                genre_score = EXCLUDED.genre_score,
                energy_score = EXCLUDED.energy_score,
                style_score = EXCLUDED.style_score,
                mood_score = EXCLUDED.mood_score,
                song_snapshot = EXCLUDED.song_snapshot,
                template_snapshot = EXCLUDED.template_snapshot,
                computed_at = EXCLUDED.computed_at,
                algorithm_version = EXCLUDED.algorithm_version
            "#,
        )
        .bind(&score.song_id)
        .bind(&score.template_id)
        .bind(score.base_score)
        .bind(score.breakdown.tempo_score)
        .bind(score.breakdown.genre_score)
        .bind(score.breakdown.energy_score)
        .bind(score.breakdown.style_score)
        .bind(score.breakdown.mood_score)
        .bind(Json(&score.song_snapshot))
        .bind(Json(&score.template_snapshot))
        .bind(score.computed_at)
        .bind(&score.algorithm_version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Postgres-backed recommendation history log
#[derive(Clone)]
pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn record(&self, entry: &RecommendationHistory) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO recommendation_history (
                id, song_id, user_id, template_id, alternatives,
                user_context, compatibility_score, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&entry.song_id)
        .bind(&entry.user_id)
        .bind(&entry.template_id)
        .bind(Json(&entry.alternatives))
        .bind(Json::<&UserContext>(&entry.user_context))
        .bind(entry.compatibility_score)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Postgres-backed analytics event sink
#[derive(Clone)]
pub struct PgAnalyticsStore {
    pool: PgPool,
}

impl PgAnalyticsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalyticsStore for PgAnalyticsStore {
    async fn insert_events(&self, events: &[AnalyticsEvent]) -> AppResult<()> {
        let mut failed = 0usize;

        for event in events {
            let result = sqlx::query(
                r#"
                INSERT INTO analytics_events (
                    id, event_type, user_id, song_id, template_id, layer_type,
                    compatibility_score, cache_hit, response_time_ms,
                    scoring_time_ms, templates_evaluated, variations_evaluated,
                    created_at, version
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&event.event_type)
            .bind(&event.user_id)
            .bind(&event.song_id)
            .bind(&event.template_id)
            .bind(&event.layer_type)
            .bind(event.compatibility_score)
            .bind(event.cache_hit)
            .bind(event.response_time_ms as i64)
            .bind(event.scoring_time_ms.map(|v| v as i64))
            .bind(event.templates_evaluated.map(|v| v as i64))
            .bind(event.variations_evaluated.map(|v| v as i64))
            .bind(event.timestamp.unwrap_or_else(Utc::now))
            .bind(event.version.as_deref().unwrap_or("1.0.0"))
            .execute(&self.pool)
            .await;

            if let Err(e) = result {
                failed += 1;
                tracing::error!(
                    event_type = %event.event_type,
                    error = %e,
                    "Failed to insert analytics event, continuing batch"
                );
            }
        }

        if failed > 0 {
            tracing::warn!(
                total = events.len(),
                failed = failed,
                "Partial analytics batch failure"
            );
        }

        Ok(())
    }
}
