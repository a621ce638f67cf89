use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Asset, Layer, ScoringDetails};
use crate::models::UserContext;

/// Layer selectable for variation requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaryLayer {
    Stars,
    Looks,
    Moves,
    Worlds,
}

impl VaryLayer {
    pub fn layer(&self) -> Layer {
        match self {
            VaryLayer::Stars => Layer::Stars,
            VaryLayer::Looks => Layer::Looks,
            VaryLayer::Moves => Layer::Moves,
            VaryLayer::Worlds => Layer::Worlds,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VaryLayer::Stars => "stars",
            VaryLayer::Looks => "looks",
            VaryLayer::Moves => "moves",
            VaryLayer::Worlds => "worlds",
        }
    }
}

impl std::fmt::Display for VaryLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-layer component references of a composite template
///
/// Empty string when the template has no component for that layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TemplateComponents {
    pub song_id: String,
    pub star_id: String,
    pub look_id: String,
    pub move_id: String,
    pub world_id: String,
}

impl From<&Asset> for TemplateComponents {
    fn from(template: &Asset) -> Self {
        let pick = |layer: Layer| {
            template
                .component_for_layer(layer)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            song_id: pick(Layer::Songs),
            star_id: pick(Layer::Stars),
            look_id: pick(Layer::Looks),
            move_id: pick(Layer::Moves),
            world_id: pick(Layer::Worlds),
        }
    }
}

/// Descriptive metadata carried with a recommendation
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecommendationMetadata {
    pub created_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A scored template recommendation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateRecommendation {
    pub template_id: String,
    pub template_name: String,
    pub compatibility_score: f64,
    pub components: TemplateComponents,
    pub metadata: RecommendationMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoring_details: Option<ScoringDetails>,
}

/// A scored alternative asset for one layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayerVariation {
    pub asset_id: String,
    pub asset_name: String,
    pub compatibility_score: f64,
    pub metadata: RecommendationMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoring_details: Option<ScoringDetails>,
}

/// Result of a template recommendation request
///
/// `recommendation` is absent when no candidate survived the minimum-score
/// filter and the fallback produced nothing; callers must treat that as a
/// valid, empty response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub recommendation: Option<TemplateRecommendation>,
    pub alternatives: Vec<TemplateRecommendation>,
    pub total_available: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_computation_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templates_evaluated: Option<usize>,
}

/// Result of a layer variation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariationResult {
    pub variations: Vec<LayerVariation>,
    pub current_selection: Option<LayerVariation>,
    pub total_available: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variations_evaluated: Option<usize>,
}

/// Request body for POST /recommend/template
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateRecommendationRequest {
    pub song_id: String,
    pub user_context: UserContext,
    #[serde(default)]
    pub max_alternatives: Option<u32>,
    #[serde(default)]
    pub include_scoring_details: bool,
}

/// Request body for POST /recommend/variations
#[derive(Debug, Clone, Deserialize)]
pub struct LayerVariationRequest {
    pub current_template_id: String,
    pub vary_layer: VaryLayer,
    pub song_id: String,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub include_scoring_details: bool,
}

/// Timing and cache information attached to every response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub response_time_ms: u64,
    pub cache_hit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_computation_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templates_evaluated: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variations_evaluated: Option<usize>,
}

/// Response metadata stamped on every response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub timestamp: String,
    pub request_id: String,
    pub version: String,
}

/// Envelope wrapping every recommendation response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub performance_metrics: PerformanceMetrics,
    pub metadata: ResponseMetadata,
}
