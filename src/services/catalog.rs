use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::error::{AppError, AppResult};
use crate::models::{Asset, Layer};

/// Timeout for single-asset lookups
const POINT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for layer listings
const LAYER_QUERY_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for composite queries, which join across layers upstream
const COMPOSITE_QUERY_TIMEOUT: Duration = Duration::from_secs(15);

/// Default page size for bulk asset queries
const DEFAULT_QUERY_LIMIT: u32 = 1000;

/// Catalog health probe result
#[derive(Debug, Clone, serde::Serialize)]
pub struct CatalogHealth {
    pub status: &'static str,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Asset catalog collaborator
///
/// The catalog owns songs, layer assets, and composite templates; this crate
/// only reads them. Missing assets are `None`/empty, never errors - a 404
/// upstream is an answer, not a failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Fetches a single asset by its address
    async fn get_by_address(&self, address: &str) -> AppResult<Option<Asset>>;

    /// Lists assets belonging to one layer, newest first
    async fn get_by_layer(&self, layer: Layer, limit: u32) -> AppResult<Vec<Asset>>;

    /// Lists composite templates referencing the given song
    async fn get_composites_for_song(&self, song_id: &str, limit: u32) -> AppResult<Vec<Asset>>;

    /// Probes catalog availability and latency
    async fn health_check(&self) -> CatalogHealth;
}

/// Standard catalog response wrapper
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct CatalogResponse<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<T>,
}

/// HTTP implementation of the catalog collaborator
#[derive(Clone)]
pub struct HttpCatalogClient {
    http_client: HttpClient,
    base_url: String,
    api_key: Option<String>,
}

impl HttpCatalogClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            http_client: HttpClient::new(),
            base_url,
            api_key,
        }
    }

    fn request(&self, url: &str, timeout: Duration) -> reqwest::RequestBuilder {
        let mut builder = self.http_client.get(url).timeout(timeout);
        if let Some(key) = &self.api_key {
            builder = builder.header("X-API-Key", key);
        }
        builder
    }

    /// Runs a list query, tolerating 404 as an empty result
    async fn fetch_asset_list(
        &self,
        query: &[(&str, &str)],
        timeout: Duration,
        operation: &str,
    ) -> AppResult<Vec<Asset>> {
        let url = format!("{}/api/assets", self.base_url);

        let response = self.request(&url, timeout).query(query).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, &body, operation));
        }

        let parsed: CatalogResponse<Vec<Asset>> = response.json().await.map_err(|e| {
            AppError::Internal(format!("Failed to parse catalog response: {}", e))
        })?;

        if !parsed.success {
            tracing::warn!(operation = %operation, "Catalog reported unsuccessful response");
            return Ok(Vec::new());
        }

        Ok(parsed.data.unwrap_or_default())
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn get_by_address(&self, address: &str) -> AppResult<Option<Asset>> {
        let url = format!("{}/api/assets/address/{}", self.base_url, address);
        tracing::debug!(address = %address, "Fetching asset by address");

        let response = self.request(&url, POINT_LOOKUP_TIMEOUT).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, &body, "get_by_address"));
        }

        let parsed: CatalogResponse<Asset> = response.json().await.map_err(|e| {
            AppError::Internal(format!("Failed to parse catalog response: {}", e))
        })?;

        if !parsed.success {
            tracing::warn!(address = %address, "Asset not found or invalid catalog response");
            return Ok(None);
        }

        Ok(parsed.data)
    }

    async fn get_by_layer(&self, layer: Layer, limit: u32) -> AppResult<Vec<Asset>> {
        let limit = if limit == 0 { DEFAULT_QUERY_LIMIT } else { limit };
        let limit_str = limit.to_string();
        tracing::debug!(layer = %layer, limit = limit, "Fetching assets by layer");

        let assets = self
            .fetch_asset_list(
                &[
                    ("layer", layer.code()),
                    ("limit", &limit_str),
                    ("sort", "createdAt"),
                    ("order", "desc"),
                ],
                LAYER_QUERY_TIMEOUT,
                "get_by_layer",
            )
            .await?;

        tracing::debug!(layer = %layer, count = assets.len(), "Layer assets fetched");
        Ok(assets)
    }

    async fn get_composites_for_song(&self, song_id: &str, limit: u32) -> AppResult<Vec<Asset>> {
        let limit = if limit == 0 { DEFAULT_QUERY_LIMIT } else { limit };
        let limit_str = limit.to_string();
        tracing::debug!(song_id = %song_id, "Fetching composites for song");

        let composites = self
            .fetch_asset_list(
                &[
                    ("layer", Layer::Composites.code()),
                    ("components", song_id),
                    ("limit", &limit_str),
                    ("sort", "createdAt"),
                    ("order", "desc"),
                ],
                COMPOSITE_QUERY_TIMEOUT,
                "get_composites_for_song",
            )
            .await?;

        tracing::debug!(
            song_id = %song_id,
            count = composites.len(),
            "Composites fetched"
        );
        Ok(composites)
    }

    async fn health_check(&self) -> CatalogHealth {
        let url = format!("{}/api/health", self.base_url);
        let start = Instant::now();

        match self.request(&url, POINT_LOOKUP_TIMEOUT).send().await {
            Ok(response) if response.status().is_success() => CatalogHealth {
                status: "healthy",
                response_time_ms: start.elapsed().as_millis() as u64,
                error: None,
            },
            Ok(response) => CatalogHealth {
                status: "unhealthy",
                response_time_ms: start.elapsed().as_millis() as u64,
                error: Some(format!("HTTP {}", response.status())),
            },
            Err(e) => {
                tracing::error!(error = %e, "Catalog health check failed");
                CatalogHealth {
                    status: "unhealthy",
                    response_time_ms: start.elapsed().as_millis() as u64,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Maps a catalog error status to the orchestrator's error taxonomy
fn error_for_status(status: StatusCode, body: &str, operation: &str) -> AppError {
    tracing::error!(
        operation = %operation,
        status = %status,
        body = %body,
        "Catalog request failed"
    );

    if status.is_server_error() {
        AppError::Upstream(format!("Catalog returned status {}", status))
    } else {
        AppError::Internal(format!("Catalog returned status {}: {}", status, body))
    }
}
