use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub mod recommendation;
pub mod user_context;

pub use recommendation::{
    ApiResponse, LayerVariation, LayerVariationRequest, PerformanceMetrics, RecommendationResult,
    ResponseMetadata, TemplateComponents, TemplateRecommendation, TemplateRecommendationRequest,
    VariationResult, VaryLayer,
};
pub use user_context::{DeviceInfo, EnergyPreference, UserContext, UserPreferences};

/// Cached compatibility scores older than this are treated as misses and recomputed
pub const SCORE_MAX_AGE_HOURS: i64 = 24;

/// Asset layer codes used by the catalog
///
/// Component references inside a composite are prefixed with the layer code,
/// e.g. "S.POP.BAS.001" for a star asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Songs,
    Stars,
    Looks,
    Moves,
    Worlds,
    Composites,
}

impl Layer {
    /// Single-letter code used in catalog addresses and component references
    pub fn code(&self) -> &'static str {
        match self {
            Layer::Songs => "G",
            Layer::Stars => "S",
            Layer::Looks => "L",
            Layer::Moves => "M",
            Layer::Worlds => "W",
            Layer::Composites => "C",
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Song-specific metadata attached to song-layer assets
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SongMetadata {
    #[serde(default)]
    pub bpm: Option<f64>,
    #[serde(default)]
    pub genre: Option<String>,
}

/// An asset fetched from the catalog collaborator
///
/// Songs, layer assets, and composite templates all share this shape; songs
/// carry `song_metadata`, composites carry `components` (one reference per
/// layer, identified by layer-code prefix).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub address: String,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub song_metadata: Option<SongMetadata>,
}

impl Asset {
    /// Finds the component reference for the given layer, by code prefix
    pub fn component_for_layer(&self, layer: Layer) -> Option<&str> {
        let prefix = format!("{}.", layer.code());
        self.components
            .iter()
            .find(|c| c.starts_with(&prefix))
            .map(|c| c.as_str())
    }

    /// Builds a hypothetical composite with one layer's component swapped out
    ///
    /// The replacement asset's tags are merged in so that scoring sees the
    /// swapped layer's characteristics. The result is synthetic: it keeps the
    /// original address but must never be persisted under it.
    pub fn with_component_swapped(&self, layer: Layer, replacement: &Asset) -> Asset {
        let prefix = format!("{}.", layer.code());
        let mut components = self.components.clone();
        if let Some(slot) = components.iter_mut().find(|c| c.starts_with(&prefix)) {
            *slot = replacement.address.clone();
        }

        let mut tags = self.tags.clone();
        tags.extend(replacement.tags.iter().cloned());

        Asset {
            components,
            tags,
            ..self.clone()
        }
    }
}

/// Per-dimension compatibility sub-scores, each in [0, 1]
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ScoreBreakdown {
    pub tempo_score: f64,
    pub genre_score: f64,
    pub energy_score: f64,
    pub style_score: f64,
    pub mood_score: f64,
}

/// Weights combining the sub-scores into a base compatibility score
///
/// The defaults are the production values; they sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    pub tempo: f64,
    pub genre: f64,
    pub energy: f64,
    pub style: f64,
    pub mood: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            tempo: 0.30,
            genre: 0.25,
            energy: 0.20,
            style: 0.15,
            mood: 0.10,
        }
    }
}

impl Weights {
    /// Weighted sum of the sub-scores
    pub fn base_score(&self, breakdown: &ScoreBreakdown) -> f64 {
        breakdown.tempo_score * self.tempo
            + breakdown.genre_score * self.genre
            + breakdown.energy_score * self.energy
            + breakdown.style_score * self.style
            + breakdown.mood_score * self.mood
    }
}

/// Full scoring detail returned alongside recommendations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringDetails {
    #[serde(flatten)]
    pub breakdown: ScoreBreakdown,
    pub base_score: f64,
    pub freshness_boost: f64,
    pub final_score: f64,
}

/// Song metadata snapshot stored with a cached score
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SongSnapshot {
    #[serde(default)]
    pub bpm: Option<f64>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub energy_level: Option<String>,
    #[serde(default)]
    pub mood: Option<String>,
}

/// Template metadata snapshot stored with a cached score
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TemplateSnapshot {
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub components: Vec<String>,
}

/// A persisted compatibility score for one (song, template) pair
///
/// The freshness boost is applied dynamically at read time, so only the base
/// score and its breakdown are stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedScore {
    pub song_id: String,
    pub template_id: String,
    pub base_score: f64,
    pub breakdown: ScoreBreakdown,
    pub song_snapshot: SongSnapshot,
    pub template_snapshot: TemplateSnapshot,
    pub computed_at: DateTime<Utc>,
    pub algorithm_version: String,
}

impl CachedScore {
    /// Whether the score is recent enough to reuse
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.computed_at) < Duration::hours(SCORE_MAX_AGE_HOURS)
    }
}
