use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::routes::AppState;

/// Handler for POST /admin/seed-scores
///
/// Kicks off a full seeding run in the background; progress is visible in the
/// logs. Returns immediately so the caller is not held for the whole batch.
pub async fn seed_scores(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let seeding = Arc::clone(&state.seeding);

    tokio::spawn(async move {
        match seeding.seed_compatibility_scores().await {
            Ok(processed) => {
                tracing::info!(processed = processed, "Background seeding run finished");
            }
            Err(e) => {
                tracing::error!(error = %e, "Background seeding run failed");
            }
        }
    });

    (StatusCode::ACCEPTED, Json(json!({ "status": "started" })))
}

/// Handler for POST /admin/invalidate/:song_id
///
/// Drops cached recommendations for a song after its candidate set changes.
pub async fn invalidate_song(
    State(state): State<AppState>,
    Path(song_id): Path<String>,
) -> Json<Value> {
    let invalidated = state.recommendations.invalidate_song(&song_id).await;
    Json(json!({ "song_id": song_id, "invalidated": invalidated }))
}
