use axum::{extract::State, Extension, Json};
use chrono::Utc;
use std::time::Instant;

use crate::error::AppResult;
use crate::middleware::request_id::RequestId;
use crate::models::{
    ApiResponse, LayerVariationRequest, PerformanceMetrics, RecommendationResult,
    ResponseMetadata, TemplateRecommendationRequest, VariationResult,
};
use crate::routes::{AppState, API_VERSION};

/// Handler for POST /recommend/template
pub async fn template(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<TemplateRecommendationRequest>,
) -> AppResult<Json<ApiResponse<RecommendationResult>>> {
    let start = Instant::now();

    tracing::info!(
        request_id = %request_id,
        song_id = %request.song_id,
        user_id = %request.user_context.user_id,
        "Processing template recommendation request"
    );

    let outcome = state
        .recommendations
        .get_template_recommendation(&request)
        .await?;

    let mut result = outcome.result;
    if !request.include_scoring_details {
        if let Some(rec) = result.recommendation.as_mut() {
            rec.scoring_details = None;
        }
        for alt in result.alternatives.iter_mut() {
            alt.scoring_details = None;
        }
    }

    tracing::info!(
        request_id = %request_id,
        song_id = %request.song_id,
        cache_hit = outcome.cache_hit,
        alternatives = result.alternatives.len(),
        "Template recommendation completed"
    );

    let metrics = PerformanceMetrics {
        response_time_ms: start.elapsed().as_millis() as u64,
        cache_hit: outcome.cache_hit,
        score_computation_time_ms: result.score_computation_time_ms,
        templates_evaluated: result.templates_evaluated,
        variations_evaluated: None,
    };

    Ok(Json(envelope(result, metrics, request_id)))
}

/// Handler for POST /recommend/variations
pub async fn variations(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<LayerVariationRequest>,
) -> AppResult<Json<ApiResponse<VariationResult>>> {
    let start = Instant::now();

    tracing::info!(
        request_id = %request_id,
        template_id = %request.current_template_id,
        layer = %request.vary_layer,
        "Processing layer variation request"
    );

    let outcome = state.recommendations.get_layer_variations(&request).await?;

    let mut result = outcome.result;
    if !request.include_scoring_details {
        for variation in result.variations.iter_mut() {
            variation.scoring_details = None;
        }
    }

    tracing::info!(
        request_id = %request_id,
        template_id = %request.current_template_id,
        cache_hit = outcome.cache_hit,
        variations = result.variations.len(),
        "Layer variations completed"
    );

    let metrics = PerformanceMetrics {
        response_time_ms: start.elapsed().as_millis() as u64,
        cache_hit: outcome.cache_hit,
        score_computation_time_ms: None,
        templates_evaluated: None,
        variations_evaluated: result.variations_evaluated,
    };

    Ok(Json(envelope(result, metrics, request_id)))
}

fn envelope<T>(data: T, metrics: PerformanceMetrics, request_id: RequestId) -> ApiResponse<T> {
    ApiResponse {
        success: true,
        data,
        performance_metrics: metrics,
        metadata: ResponseMetadata {
            timestamp: Utc::now().to_rfc3339(),
            request_id: request_id.to_string(),
            version: API_VERSION.to_string(),
        },
    }
}
