use std::sync::Arc;

use mixmatch_api::config::Config;
use mixmatch_api::db::{self, PgAnalyticsStore, PgHistoryStore, PgScoreStore, RedisCache};
use mixmatch_api::routes::{create_router, AppState};
use mixmatch_api::services::analytics::AnalyticsService;
use mixmatch_api::services::catalog::HttpCatalogClient;
use mixmatch_api::services::recommendations::RecommendationService;
use mixmatch_api::services::scoring::{DiversitySelector, ScoringService};
use mixmatch_api::services::seeding::SeedingService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mixmatch_api=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Storage
    let db_pool = db::create_pool(&config.database_url).await?;
    sqlx::migrate!().run(&db_pool).await?;

    let redis_client = db::create_redis_client(&config.redis_url)?;
    let (response_cache, cache_writer) = RedisCache::new(redis_client);

    // Collaborators and services
    let catalog = Arc::new(HttpCatalogClient::new(
        config.catalog_api_url.clone(),
        config.catalog_api_key.clone(),
    ));

    let scoring = ScoringService::new(Arc::new(PgScoreStore::new(db_pool.clone())));

    let (analytics, analytics_writer) =
        AnalyticsService::new(Arc::new(PgAnalyticsStore::new(db_pool.clone())));

    let recommendations = Arc::new(RecommendationService::new(
        catalog.clone(),
        scoring.clone(),
        Arc::new(response_cache),
        Arc::new(PgHistoryStore::new(db_pool.clone())),
        analytics,
        Arc::new(DiversitySelector::default()),
    ));

    let seeding = Arc::new(SeedingService::new(catalog.clone(), scoring));

    let state = AppState::new(recommendations, seeding, catalog);
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    // Flush buffered cache writes and analytics before exiting
    cache_writer.shutdown().await;
    analytics_writer.shutdown().await;

    Ok(())
}
