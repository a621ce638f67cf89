use std::sync::Arc;
use std::time::Duration;

use crate::error::AppResult;
use crate::models::Layer;
use crate::services::catalog::CatalogClient;
use crate::services::scoring::ScoringService;

/// Songs scored concurrently within one seeding batch
const SEED_BATCH_SIZE: usize = 10;
/// Pause between batches so the catalog and score store are not saturated
const INTER_BATCH_DELAY: Duration = Duration::from_millis(100);

/// Upper bound on songs pulled for a full seeding run
const SEED_SONG_LIMIT: u32 = 1000;
/// Songs pre-scored during cache warmup (most recent first)
const WARMUP_SONG_LIMIT: u32 = 50;

/// Pre-computes compatibility scores across the catalog
///
/// Used at deploy time and by periodic maintenance so that interactive
/// requests mostly hit warm score-store rows. Individual song failures are
/// logged and skipped; a run only fails if the song listing itself fails.
pub struct SeedingService {
    catalog: Arc<dyn CatalogClient>,
    scoring: ScoringService,
}

impl SeedingService {
    pub fn new(catalog: Arc<dyn CatalogClient>, scoring: ScoringService) -> Self {
        Self { catalog, scoring }
    }

    /// Scores every song against its composites, in throttled batches
    ///
    /// Returns the number of songs that had at least one composite scored.
    pub async fn seed_compatibility_scores(&self) -> AppResult<usize> {
        tracing::info!("Starting compatibility score seeding");

        let songs = self.catalog.get_by_layer(Layer::Songs, SEED_SONG_LIMIT).await?;
        tracing::info!(song_count = songs.len(), "Songs fetched for seeding");

        let total_songs = songs.len();
        let mut processed = 0usize;

        for batch in songs.chunks(SEED_BATCH_SIZE) {
            let mut tasks = Vec::with_capacity(batch.len());

            for song in batch {
                let catalog = Arc::clone(&self.catalog);
                let scoring = self.scoring.clone();
                let song = song.clone();

                tasks.push(tokio::spawn(async move {
                    let composites = catalog
                        .get_composites_for_song(&song.address, SEED_SONG_LIMIT)
                        .await?;

                    if composites.is_empty() {
                        return Ok::<bool, crate::error::AppError>(false);
                    }

                    scoring.score_templates(&song, composites, None).await;
                    Ok(true)
                }));
            }

            for task in tasks {
                match task.await {
                    Ok(Ok(true)) => processed += 1,
                    Ok(Ok(false)) => {}
                    Ok(Err(e)) => {
                        tracing::error!(error = %e, "Failed to seed scores for song, continuing");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Seeding task panicked, continuing");
                    }
                }
            }

            if processed > 0 && processed % SEED_BATCH_SIZE == 0 {
                tracing::info!(processed = processed, total = total_songs, "Seeding progress");
            }

            tokio::time::sleep(INTER_BATCH_DELAY).await;
        }

        tracing::info!(processed = processed, "Seeding complete");
        Ok(processed)
    }

    /// Pre-scores the most recent songs so early traffic hits warm scores
    pub async fn warmup_cache(&self) -> AppResult<usize> {
        tracing::info!("Starting cache warmup");

        let songs = self
            .catalog
            .get_by_layer(Layer::Songs, WARMUP_SONG_LIMIT)
            .await?;

        let mut warmed = 0usize;
        for song in songs {
            match self
                .catalog
                .get_composites_for_song(&song.address, SEED_SONG_LIMIT)
                .await
            {
                Ok(composites) if !composites.is_empty() => {
                    self.scoring.score_templates(&song, composites, None).await;
                    warmed += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(
                        song_id = %song.address,
                        error = %e,
                        "Warmup failed for song, continuing"
                    );
                }
            }
        }

        tracing::info!(warmed = warmed, "Cache warmup complete");
        Ok(warmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ScoreStore;
    use crate::error::{AppError, AppResult};
    use crate::models::{Asset, CachedScore, SongMetadata};
    use crate::services::catalog::CatalogHealth;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct StubCatalog {
        songs: Vec<Asset>,
        composites: HashMap<String, Vec<Asset>>,
        failing_songs: Vec<String>,
    }

    #[async_trait]
    impl CatalogClient for StubCatalog {
        async fn get_by_address(&self, _address: &str) -> AppResult<Option<Asset>> {
            Ok(None)
        }

        async fn get_by_layer(&self, layer: Layer, _limit: u32) -> AppResult<Vec<Asset>> {
            assert_eq!(layer, Layer::Songs);
            Ok(self.songs.clone())
        }

        async fn get_composites_for_song(
            &self,
            song_id: &str,
            _limit: u32,
        ) -> AppResult<Vec<Asset>> {
            if self.failing_songs.iter().any(|s| s == song_id) {
                return Err(AppError::Upstream("composite query timed out".to_string()));
            }
            Ok(self.composites.get(song_id).cloned().unwrap_or_default())
        }

        async fn health_check(&self) -> CatalogHealth {
            CatalogHealth {
                status: "healthy",
                response_time_ms: 1,
                error: None,
            }
        }
    }

    #[derive(Default)]
    struct MemoryScoreStore {
        rows: Mutex<HashMap<(String, String), CachedScore>>,
    }

    #[async_trait]
    impl ScoreStore for MemoryScoreStore {
        async fn get(&self, song_id: &str, template_id: &str) -> AppResult<Option<CachedScore>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .get(&(song_id.to_string(), template_id.to_string()))
                .cloned())
        }

        async fn put(&self, score: &CachedScore) -> AppResult<()> {
            self.rows.lock().unwrap().insert(
                (score.song_id.clone(), score.template_id.clone()),
                score.clone(),
            );
            Ok(())
        }
    }

    fn song(address: &str) -> Asset {
        Asset {
            address: address.to_string(),
            name: format!("Song {}", address),
            tags: vec![],
            description: None,
            created_at: None,
            components: vec![],
            song_metadata: Some(SongMetadata {
                bpm: Some(120.0),
                genre: Some("pop".to_string()),
            }),
        }
    }

    fn composite(address: &str) -> Asset {
        Asset {
            address: address.to_string(),
            name: format!("Template {}", address),
            tags: vec!["pop".to_string()],
            description: None,
            created_at: None,
            components: vec![],
            song_metadata: None,
        }
    }

    #[tokio::test]
    async fn test_seeding_scores_all_songs_with_composites() {
        let mut composites = HashMap::new();
        composites.insert("G.POP.001.001".to_string(), vec![composite("C.001.001.001")]);
        composites.insert("G.POP.002.001".to_string(), vec![composite("C.002.001.001")]);
        // Third song has no composites and is skipped

        let catalog = Arc::new(StubCatalog {
            songs: vec![
                song("G.POP.001.001"),
                song("G.POP.002.001"),
                song("G.POP.003.001"),
            ],
            composites,
            failing_songs: vec![],
        });

        let store = Arc::new(MemoryScoreStore::default());
        let seeding = SeedingService::new(catalog, ScoringService::new(store.clone()));

        let processed = seeding.seed_compatibility_scores().await.unwrap();

        assert_eq!(processed, 2);
        assert_eq!(store.rows.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_seeding_continues_past_per_song_failures() {
        let mut composites = HashMap::new();
        composites.insert("G.POP.002.001".to_string(), vec![composite("C.002.001.001")]);

        let catalog = Arc::new(StubCatalog {
            songs: vec![song("G.POP.001.001"), song("G.POP.002.001")],
            composites,
            failing_songs: vec!["G.POP.001.001".to_string()],
        });

        let store = Arc::new(MemoryScoreStore::default());
        let seeding = SeedingService::new(catalog, ScoringService::new(store.clone()));

        // One song fails upstream; the run still completes with the other
        let processed = seeding.seed_compatibility_scores().await.unwrap();
        assert_eq!(processed, 1);
        assert_eq!(store.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_warmup_scores_recent_songs() {
        let mut composites = HashMap::new();
        composites.insert("G.POP.001.001".to_string(), vec![composite("C.001.001.001")]);

        let catalog = Arc::new(StubCatalog {
            songs: vec![song("G.POP.001.001")],
            composites,
            failing_songs: vec![],
        });

        let store = Arc::new(MemoryScoreStore::default());
        let seeding = SeedingService::new(catalog, ScoringService::new(store.clone()));

        let warmed = seeding.warmup_cache().await.unwrap();
        assert_eq!(warmed, 1);
        assert_eq!(store.rows.lock().unwrap().len(), 1);
    }
}
