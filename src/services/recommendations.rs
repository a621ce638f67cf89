use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

use crate::db::{
    redis::CacheKey, AnalyticsEvent, HistoryStore, RecommendationHistory, ResponseCache,
};
use crate::error::{AppError, AppResult};
use crate::models::{
    LayerVariationRequest, RecommendationResult, TemplateRecommendation,
    TemplateRecommendationRequest, VariationResult,
};
use crate::services::analytics::AnalyticsService;
use crate::services::catalog::CatalogClient;
use crate::services::scoring::{DiversitySelector, ScoringService, MIN_RECOMMENDATION_SCORE};

/// TTL for cached template recommendations
pub const TEMPLATE_RECOMMENDATION_TTL: u64 = 300;
/// TTL for cached layer variation listings
pub const LAYER_VARIATIONS_TTL: u64 = 300;

const DEFAULT_MAX_ALTERNATIVES: u32 = 5;
const DEFAULT_VARIATION_LIMIT: u32 = 8;
const RESULT_BOUND: u32 = 20;

/// Page size when resolving candidate sets from the catalog
const CANDIDATE_QUERY_LIMIT: u32 = 1000;

/// Result of a recommendation operation plus its cache disposition
#[derive(Debug)]
pub struct RecommendationOutcome {
    pub result: RecommendationResult,
    pub cache_hit: bool,
}

/// Result of a variation operation plus its cache disposition
#[derive(Debug)]
pub struct VariationOutcome {
    pub result: VariationResult,
    pub cache_hit: bool,
}

/// Top-level coordinator for both recommendation operations
///
/// Resolves candidates through the catalog, scores them (score-cache-first),
/// applies threshold filtering and diversity, and drives the response-level
/// cache-aside layer. Cache, history, and analytics failures are absorbed;
/// only `NotFound` and catalog unavailability surface to the caller.
pub struct RecommendationService {
    catalog: Arc<dyn CatalogClient>,
    scoring: ScoringService,
    response_cache: Arc<dyn ResponseCache>,
    history: Arc<dyn HistoryStore>,
    analytics: AnalyticsService,
    diversity: Arc<DiversitySelector>,
}

impl RecommendationService {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        scoring: ScoringService,
        response_cache: Arc<dyn ResponseCache>,
        history: Arc<dyn HistoryStore>,
        analytics: AnalyticsService,
        diversity: Arc<DiversitySelector>,
    ) -> Self {
        Self {
            catalog,
            scoring,
            response_cache,
            history,
            analytics,
            diversity,
        }
    }

    /// Returns the best template for a song plus ranked alternatives
    pub async fn get_template_recommendation(
        &self,
        request: &TemplateRecommendationRequest,
    ) -> AppResult<RecommendationOutcome> {
        let start = Instant::now();
        let max_alternatives = bounded(
            request.max_alternatives,
            DEFAULT_MAX_ALTERNATIVES,
            "max_alternatives",
        )?;

        // 1. Response cache check
        let cache_key = CacheKey::TemplateRecommendation {
            song_id: request.song_id.clone(),
            context_hash: request.user_context.context_hash(),
        }
        .to_string();

        if let Some(cached) = self.response_cache.get(&cache_key).await {
            match serde_json::from_value::<RecommendationResult>(cached) {
                Ok(result) => {
                    tracing::debug!(song_id = %request.song_id, "Recommendation cache hit");

                    self.analytics.track_event(AnalyticsEvent {
                        event_type: "template_recommendation_served".to_string(),
                        user_id: Some(request.user_context.user_id.clone()),
                        song_id: Some(request.song_id.clone()),
                        template_id: result
                            .recommendation
                            .as_ref()
                            .map(|r| r.template_id.clone()),
                        cache_hit: true,
                        response_time_ms: start.elapsed().as_millis() as u64,
                        ..Default::default()
                    });

                    return Ok(RecommendationOutcome {
                        result,
                        cache_hit: true,
                    });
                }
                Err(e) => {
                    tracing::warn!(key = %cache_key, error = %e, "Discarding malformed cache entry");
                }
            }
        }

        // 2. Resolve the song
        let song = self
            .catalog
            .get_by_address(&request.song_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Song not found: {}", request.song_id)))?;

        // 3. Resolve candidate templates
        let templates = self
            .catalog
            .get_composites_for_song(&request.song_id, CANDIDATE_QUERY_LIMIT)
            .await?;

        if templates.is_empty() {
            return Err(AppError::NotFound(format!(
                "No templates available for song: {}",
                request.song_id
            )));
        }

        let total_available = templates.len();

        // 4. Score every candidate, score-cache-first
        let scoring_start = Instant::now();
        let scored = self
            .scoring
            .score_templates(
                &song,
                templates,
                request.user_context.preferences.as_ref(),
            )
            .await;
        let scoring_time_ms = scoring_start.elapsed().as_millis() as u64;
        let templates_evaluated = scored.len();

        // 5. Threshold filter, with a fallback when nothing qualifies
        let mut eligible: Vec<TemplateRecommendation> = scored
            .into_iter()
            .filter(|t| t.compatibility_score >= MIN_RECOMMENDATION_SCORE)
            .collect();

        if eligible.is_empty() {
            if let Some(fallback) = self.fallback_template(&request.song_id).await {
                eligible.push(fallback);
            }
        }

        // 6. Jitter sort so near-ties do not always resolve the same way
        let sorted = self.diversity.jitter_sort_keeping_scores(eligible);

        // 7. Primary plus alternatives; may legitimately be empty
        let recommendation = sorted.first().cloned();
        let alternatives: Vec<TemplateRecommendation> = sorted
            .into_iter()
            .skip(1)
            .take(max_alternatives as usize)
            .collect();

        let result = RecommendationResult {
            recommendation,
            alternatives,
            total_available,
            score_computation_time_ms: Some(scoring_time_ms),
            templates_evaluated: Some(templates_evaluated),
        };

        // 8. Cache the full result and record history; both best-effort
        if let Ok(value) = serde_json::to_value(&result) {
            self.response_cache
                .set(&cache_key, &value, TEMPLATE_RECOMMENDATION_TTL)
                .await;
        }

        let history_entry = RecommendationHistory {
            song_id: request.song_id.clone(),
            user_id: request.user_context.user_id.clone(),
            template_id: result
                .recommendation
                .as_ref()
                .map(|r| r.template_id.clone()),
            alternatives: result
                .alternatives
                .iter()
                .map(|a| a.template_id.clone())
                .collect(),
            user_context: request.user_context.clone(),
            compatibility_score: result
                .recommendation
                .as_ref()
                .map(|r| r.compatibility_score),
            created_at: Utc::now(),
        };
        if let Err(e) = self.history.record(&history_entry).await {
            tracing::error!(
                song_id = %request.song_id,
                error = %e,
                "Failed to record recommendation history"
            );
        }

        // 9. One analytics event per call
        self.analytics.track_event(AnalyticsEvent {
            event_type: "template_recommendation_served".to_string(),
            user_id: Some(request.user_context.user_id.clone()),
            song_id: Some(request.song_id.clone()),
            template_id: result
                .recommendation
                .as_ref()
                .map(|r| r.template_id.clone()),
            compatibility_score: result
                .recommendation
                .as_ref()
                .map(|r| r.compatibility_score),
            alternatives_count: Some(result.alternatives.len()),
            cache_hit: false,
            response_time_ms: start.elapsed().as_millis() as u64,
            scoring_time_ms: Some(scoring_time_ms),
            templates_evaluated: Some(templates_evaluated),
            ..Default::default()
        });

        Ok(RecommendationOutcome {
            result,
            cache_hit: false,
        })
    }

    /// Returns compatible alternatives for one layer of a template
    pub async fn get_layer_variations(
        &self,
        request: &LayerVariationRequest,
    ) -> AppResult<VariationOutcome> {
        let start = Instant::now();
        let limit = bounded(request.limit, DEFAULT_VARIATION_LIMIT, "limit")?;

        // 1. Response cache check
        let cache_key = CacheKey::LayerVariations {
            template_id: request.current_template_id.clone(),
            layer: request.vary_layer.to_string(),
        }
        .to_string();

        if let Some(cached) = self.response_cache.get(&cache_key).await {
            match serde_json::from_value::<VariationResult>(cached) {
                Ok(result) => {
                    tracing::debug!(
                        template_id = %request.current_template_id,
                        layer = %request.vary_layer,
                        "Variations cache hit"
                    );
                    return Ok(VariationOutcome {
                        result,
                        cache_hit: true,
                    });
                }
                Err(e) => {
                    tracing::warn!(key = %cache_key, error = %e, "Discarding malformed cache entry");
                }
            }
        }

        // 2. Resolve template and song
        let template = self
            .catalog
            .get_by_address(&request.current_template_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Template not found: {}",
                    request.current_template_id
                ))
            })?;

        let song = self
            .catalog
            .get_by_address(&request.song_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Song not found: {}", request.song_id)))?;

        // 3. All assets of the requested layer
        let assets = self
            .catalog
            .get_by_layer(request.vary_layer.layer(), CANDIDATE_QUERY_LIMIT)
            .await?;
        let total_available = assets.len();

        // 4. The template's current component for this layer, if any
        let current_component = template
            .component_for_layer(request.vary_layer.layer())
            .map(String::from);
        let current_selection = current_component.as_ref().and_then(|component| {
            assets
                .iter()
                .find(|asset| &asset.address == component)
                .map(|asset| crate::models::LayerVariation {
                    asset_id: asset.address.clone(),
                    asset_name: asset.name.clone(),
                    compatibility_score: 1.0,
                    metadata: crate::models::recommendation::RecommendationMetadata {
                        created_at: asset.created_at,
                        tags: asset.tags.clone(),
                        description: asset.description.clone(),
                    },
                    scoring_details: None,
                })
        });

        // 5. Score every asset as a hypothetical swap
        let scored = self
            .scoring
            .score_layer_variations(&song, &template, &assets, request.vary_layer);
        let variations_evaluated = scored.len();

        // 6. Rank and truncate
        let mut variations = scored;
        variations.sort_by(|a, b| {
            b.compatibility_score
                .partial_cmp(&a.compatibility_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        variations.truncate(limit as usize);

        let result = VariationResult {
            variations,
            current_selection,
            total_available,
            variations_evaluated: Some(variations_evaluated),
        };

        // 7. Cache and emit analytics
        if let Ok(value) = serde_json::to_value(&result) {
            self.response_cache
                .set(&cache_key, &value, LAYER_VARIATIONS_TTL)
                .await;
        }

        self.analytics.track_event(AnalyticsEvent {
            event_type: "layer_variations_requested".to_string(),
            song_id: Some(request.song_id.clone()),
            template_id: Some(request.current_template_id.clone()),
            layer_type: Some(request.vary_layer.to_string()),
            variations_count: Some(result.variations.len()),
            cache_hit: false,
            response_time_ms: start.elapsed().as_millis() as u64,
            variations_evaluated: Some(variations_evaluated),
            ..Default::default()
        });

        Ok(VariationOutcome {
            result,
            cache_hit: false,
        })
    }

    /// Drops every cached recommendation for a song
    ///
    /// Called when the song's candidate set changes; returns the number of
    /// cache entries removed.
    pub async fn invalidate_song(&self, song_id: &str) -> u64 {
        let prefix = CacheKey::template_prefix(song_id);
        let count = self.response_cache.delete_by_prefix(&prefix).await;
        tracing::info!(song_id = %song_id, count = count, "Invalidated cached recommendations");
        count
    }

    /// Fallback when no candidate clears the minimum score
    ///
    /// Extension point: a deployment can plug in "most selected template for
    /// this song" from analytics data. Returning nothing is valid - the
    /// operation then yields an empty result set rather than an error.
    async fn fallback_template(&self, song_id: &str) -> Option<TemplateRecommendation> {
        tracing::debug!(song_id = %song_id, "No eligible templates, fallback yielded nothing");
        None
    }
}

/// Applies the default and the [1, 20] bound shared by both operations
fn bounded(value: Option<u32>, default: u32, field: &str) -> AppResult<u32> {
    let value = value.unwrap_or(default);
    if !(1..=RESULT_BOUND).contains(&value) {
        return Err(AppError::InvalidInput(format!(
            "{} must be between 1 and {}",
            field, RESULT_BOUND
        )));
    }
    Ok(value)
}
