use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::request_id::{make_span, request_id_middleware};
use crate::services::catalog::CatalogClient;
use crate::services::recommendations::RecommendationService;
use crate::services::seeding::SeedingService;

pub mod admin;
pub mod recommend;

pub const API_VERSION: &str = "1.0.0";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub recommendations: Arc<RecommendationService>,
    pub seeding: Arc<SeedingService>,
    pub catalog: Arc<dyn CatalogClient>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        recommendations: Arc<RecommendationService>,
        seeding: Arc<SeedingService>,
        catalog: Arc<dyn CatalogClient>,
    ) -> Self {
        Self {
            recommendations,
            seeding,
            catalog,
            started_at: Instant::now(),
        }
    }
}

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http().make_span_with(make_span))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/recommend/template", post(recommend::template))
        .route("/recommend/variations", post(recommend::variations))
        .route("/admin/seed-scores", post(admin::seed_scores))
        .route("/admin/invalidate/:song_id", post(admin::invalidate_song))
}

/// Health check aggregating the catalog collaborator's status
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let catalog = state.catalog.health_check().await;

    let status = if catalog.status == "healthy" {
        "healthy"
    } else {
        "degraded"
    };

    let body = json!({
        "status": status,
        "version": API_VERSION,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "services": {
            "catalog": catalog,
        }
    });

    (StatusCode::OK, Json(body))
}
