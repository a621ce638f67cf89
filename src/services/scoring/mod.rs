use chrono::Utc;
use std::sync::Arc;

use crate::db::ScoreStore;
use crate::error::AppError;
use crate::models::{
    Asset, CachedScore, LayerVariation, ScoringDetails, SongSnapshot, TemplateRecommendation,
    TemplateSnapshot, UserPreferences, VaryLayer, Weights,
};
use crate::models::recommendation::RecommendationMetadata;
use crate::models::TemplateComponents;

pub mod diversity;
pub mod features;
pub mod freshness;

pub use diversity::DiversitySelector;

/// Version stamped on every stored score; bump when the algorithm changes
pub const ALGORITHM_VERSION: &str = "1.0.0";

/// Minimum final score for a template to be recommended
pub const MIN_RECOMMENDATION_SCORE: f64 = 0.6;

/// Energy tags snapshotted alongside stored scores
const SNAPSHOT_ENERGY_TAGS: [&str; 3] = ["low-energy", "high-energy", "moderate-energy"];

/// Mood tags snapshotted alongside stored scores
const SNAPSHOT_MOOD_TAGS: [&str; 5] = ["happy", "sad", "energetic", "calm", "intense"];

/// Computes compatibility scores for templates and layer assets
///
/// Template scoring is cache-aside against the score store; the freshness
/// boost is always applied dynamically at read time so cached base scores
/// stay valid as templates age.
#[derive(Clone)]
pub struct ScoringService {
    score_store: Arc<dyn ScoreStore>,
    weights: Weights,
}

impl ScoringService {
    pub fn new(score_store: Arc<dyn ScoreStore>) -> Self {
        Self::with_weights(score_store, Weights::default())
    }

    /// Constructor with non-default aggregation weights
    pub fn with_weights(score_store: Arc<dyn ScoreStore>, weights: Weights) -> Self {
        Self {
            score_store,
            weights,
        }
    }

    /// Scores every template against the song, in parallel
    ///
    /// A failed candidate is logged and skipped; the rest of the batch
    /// continues. Store failures never fail a candidate - scoring falls back
    /// to fresh computation.
    pub async fn score_templates(
        &self,
        song: &Asset,
        templates: Vec<Asset>,
        preferences: Option<&UserPreferences>,
    ) -> Vec<TemplateRecommendation> {
        tracing::debug!(
            song_id = %song.address,
            template_count = templates.len(),
            "Scoring templates"
        );

        let song = Arc::new(song.clone());
        let preferences = preferences.cloned();

        let mut tasks = Vec::with_capacity(templates.len());
        for template in templates {
            let service = self.clone();
            let song = Arc::clone(&song);
            let preferences = preferences.clone();
            tasks.push(tokio::spawn(async move {
                service
                    .score_one_template(&song, &template, preferences.as_ref())
                    .await
            }));
        }

        let mut scored = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok(recommendation) => scored.push(recommendation),
                Err(e) => {
                    let err = AppError::Scoring(e.to_string());
                    tracing::error!(error = %err, "Template scoring task failed, skipping candidate");
                }
            }
        }

        tracing::debug!(scored = scored.len(), "Template scoring completed");
        scored
    }

    /// Scores a single (song, template) pair, score-store-first
    async fn score_one_template(
        &self,
        song: &Asset,
        template: &Asset,
        preferences: Option<&UserPreferences>,
    ) -> TemplateRecommendation {
        let cached = match self.score_store.get(&song.address, &template.address).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(
                    song_id = %song.address,
                    template_id = %template.address,
                    error = %e,
                    "Score store read failed, recomputing"
                );
                None
            }
        };

        let score = match cached {
            Some(score) => score,
            None => {
                let score = self.compute_score(song, template, preferences);
                if let Err(e) = self.score_store.put(&score).await {
                    tracing::warn!(
                        song_id = %song.address,
                        template_id = %template.address,
                        error = %e,
                        "Failed to persist compatibility score"
                    );
                }
                score
            }
        };

        let freshness_boost = freshness::calculate_boost(template.created_at, Utc::now());
        let final_score = freshness::boosted_score(score.base_score, freshness_boost);

        TemplateRecommendation {
            template_id: template.address.clone(),
            template_name: template.name.clone(),
            compatibility_score: final_score,
            components: TemplateComponents::from(template),
            metadata: RecommendationMetadata {
                created_at: template.created_at,
                tags: template.tags.clone(),
                description: template.description.clone(),
            },
            scoring_details: Some(ScoringDetails {
                breakdown: score.breakdown,
                base_score: score.base_score,
                freshness_boost,
                final_score,
            }),
        }
    }

    /// Scores every layer asset as a hypothetical template swap
    ///
    /// Hypothetical templates are synthetic: their scores are computed fresh
    /// and never persisted under the real template's identity.
    pub fn score_layer_variations(
        &self,
        song: &Asset,
        current_template: &Asset,
        assets: &[Asset],
        layer: VaryLayer,
    ) -> Vec<LayerVariation> {
        tracing::debug!(
            template_id = %current_template.address,
            layer = %layer,
            asset_count = assets.len(),
            "Scoring layer variations"
        );

        let now = Utc::now();
        let mut variations = Vec::with_capacity(assets.len());

        for asset in assets {
            let hypothetical = current_template.with_component_swapped(layer.layer(), asset);
            let breakdown = features::compute_breakdown(song, &hypothetical, None);
            let base_score = self.weights.base_score(&breakdown);
            let freshness_boost = freshness::calculate_boost(asset.created_at, now);
            let final_score = freshness::boosted_score(base_score, freshness_boost);

            variations.push(LayerVariation {
                asset_id: asset.address.clone(),
                asset_name: asset.name.clone(),
                compatibility_score: final_score,
                metadata: RecommendationMetadata {
                    created_at: asset.created_at,
                    tags: asset.tags.clone(),
                    description: asset.description.clone(),
                },
                scoring_details: Some(ScoringDetails {
                    breakdown,
                    base_score,
                    freshness_boost,
                    final_score,
                }),
            });
        }

        variations
    }

    /// Computes a fresh score with metadata snapshots for persistence
    fn compute_score(
        &self,
        song: &Asset,
        template: &Asset,
        preferences: Option<&UserPreferences>,
    ) -> CachedScore {
        let breakdown = features::compute_breakdown(song, template, preferences);
        let base_score = self.weights.base_score(&breakdown);

        CachedScore {
            song_id: song.address.clone(),
            template_id: template.address.clone(),
            base_score,
            breakdown,
            song_snapshot: SongSnapshot {
                bpm: song.song_metadata.as_ref().and_then(|m| m.bpm),
                genre: song.song_metadata.as_ref().and_then(|m| m.genre.clone()),
                energy_level: find_tag(&song.tags, &SNAPSHOT_ENERGY_TAGS),
                mood: find_tag(&song.tags, &SNAPSHOT_MOOD_TAGS),
            },
            template_snapshot: TemplateSnapshot {
                created_at: template.created_at,
                tags: template.tags.clone(),
                components: template.components.clone(),
            },
            computed_at: Utc::now(),
            algorithm_version: ALGORITHM_VERSION.to_string(),
        }
    }
}

fn find_tag(tags: &[String], candidates: &[&str]) -> Option<String> {
    tags.iter()
        .find(|tag| candidates.iter().any(|c| tag.eq_ignore_ascii_case(c)))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppResult;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory score store tracking call counts
    #[derive(Default)]
    struct MemoryScoreStore {
        rows: Mutex<HashMap<(String, String), CachedScore>>,
        puts: Mutex<usize>,
    }

    #[async_trait]
    impl ScoreStore for MemoryScoreStore {
        async fn get(&self, song_id: &str, template_id: &str) -> AppResult<Option<CachedScore>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .get(&(song_id.to_string(), template_id.to_string()))
                .filter(|s| s.is_fresh(Utc::now()))
                .cloned())
        }

        async fn put(&self, score: &CachedScore) -> AppResult<()> {
            *self.puts.lock().unwrap() += 1;
            self.rows.lock().unwrap().insert(
                (score.song_id.clone(), score.template_id.clone()),
                score.clone(),
            );
            Ok(())
        }
    }

    fn song() -> Asset {
        Asset {
            address: "G.POP.TEN.001".to_string(),
            name: "Song".to_string(),
            tags: vec!["high-energy".to_string(), "modern".to_string()],
            description: None,
            created_at: None,
            components: vec![],
            song_metadata: Some(crate::models::SongMetadata {
                bpm: Some(120.0),
                genre: Some("pop".to_string()),
            }),
        }
    }

    fn template(address: &str, tags: Vec<&str>) -> Asset {
        Asset {
            address: address.to_string(),
            name: format!("Template {}", address),
            tags: tags.into_iter().map(String::from).collect(),
            description: None,
            created_at: Some(Utc::now() - Duration::days(365)),
            components: vec!["G.POP.TEN.001".to_string(), "S.POP.BAS.001".to_string()],
            song_metadata: None,
        }
    }

    #[tokio::test]
    async fn test_score_templates_caches_results() {
        let store = Arc::new(MemoryScoreStore::default());
        let service = ScoringService::new(store.clone());
        let song = song();
        let templates = vec![template("C.001.001.001", vec!["120bpm", "pop"])];

        let first = service.score_templates(&song, templates.clone(), None).await;
        assert_eq!(first.len(), 1);
        assert_eq!(*store.puts.lock().unwrap(), 1);

        // Second pass hits the store; no new put
        let second = service.score_templates(&song, templates, None).await;
        assert_eq!(second.len(), 1);
        assert_eq!(*store.puts.lock().unwrap(), 1);
        assert_eq!(
            first[0].scoring_details.as_ref().unwrap().base_score,
            second[0].scoring_details.as_ref().unwrap().base_score
        );
    }

    #[tokio::test]
    async fn test_stale_cached_score_is_recomputed() {
        let store = Arc::new(MemoryScoreStore::default());
        let service = ScoringService::new(store.clone());
        let song = song();
        let template = template("C.001.001.001", vec!["120bpm", "pop"]);

        service
            .score_templates(&song, vec![template.clone()], None)
            .await;
        assert_eq!(*store.puts.lock().unwrap(), 1);

        // Age the stored row past the staleness window
        {
            let mut rows = store.rows.lock().unwrap();
            let key = (song.address.clone(), template.address.clone());
            let row = rows.get_mut(&key).unwrap();
            row.computed_at = Utc::now() - Duration::hours(25);
        }

        service.score_templates(&song, vec![template], None).await;
        // Miss on stale row forces a second put (upsert over the same key)
        assert_eq!(*store.puts.lock().unwrap(), 2);
        assert_eq!(store.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_final_score_applies_freshness_dynamically() {
        let store = Arc::new(MemoryScoreStore::default());
        let service = ScoringService::new(store);
        let song = song();

        // Fresh template: 20% boost on top of the cached base score
        let mut fresh_template = template("C.001.001.002", vec!["150bpm"]);
        fresh_template.created_at = Some(Utc::now() - Duration::days(1));

        let scored = service
            .score_templates(&song, vec![fresh_template], None)
            .await;
        let details = scored[0].scoring_details.as_ref().unwrap();
        assert_eq!(details.freshness_boost, 1.20);
        assert_eq!(
            details.final_score,
            (details.base_score * 1.20).min(1.0)
        );
        assert_eq!(scored[0].compatibility_score, details.final_score);
    }

    #[tokio::test]
    async fn test_score_layer_variations_uses_merged_tags() {
        let store = Arc::new(MemoryScoreStore::default());
        let service = ScoringService::new(store.clone());
        let song = song();
        let current = template("C.001.001.001", vec!["120bpm", "pop"]);

        let assets = vec![Asset {
            address: "S.RCK.PNK.009".to_string(),
            name: "Punk Star".to_string(),
            tags: vec!["high-energy".to_string()],
            description: None,
            created_at: None,
            components: vec![],
            song_metadata: None,
        }];

        let variations =
            service.score_layer_variations(&song, &current, &assets, VaryLayer::Stars);

        assert_eq!(variations.len(), 1);
        let details = variations[0].scoring_details.as_ref().unwrap();
        // Merged tags make the hypothetical template high-energy, matching the song
        assert_eq!(details.breakdown.energy_score, 1.0);
        // Synthetic templates never touch the score store
        assert_eq!(*store.puts.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_snapshots_capture_song_metadata() {
        let store = Arc::new(MemoryScoreStore::default());
        let service = ScoringService::new(store.clone());
        let mut song = song();
        song.tags.push("happy".to_string());

        service
            .score_templates(&song, vec![template("C.001.001.001", vec![])], None)
            .await;

        let rows = store.rows.lock().unwrap();
        let row = rows.values().next().unwrap();
        assert_eq!(row.song_snapshot.bpm, Some(120.0));
        assert_eq!(row.song_snapshot.genre.as_deref(), Some("pop"));
        assert_eq!(row.song_snapshot.energy_level.as_deref(), Some("high-energy"));
        assert_eq!(row.song_snapshot.mood.as_deref(), Some("happy"));
        assert_eq!(row.algorithm_version, ALGORITHM_VERSION);
    }
}
