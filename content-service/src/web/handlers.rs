//! Endpoint handlers.
//!
//! Failures are returned as `AppError`, which renders the JSON
//! `{"error": <slug>}` body with the matching status.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::AppError;
use crate::process::{ContentCatalog, DownloadCvProcess};
use crate::store::TokenStore;

/// Shared application state.
pub struct AppState<S> {
    pub content: Arc<ContentCatalog>,
    pub downloads: Arc<DownloadCvProcess<S>>,
}

impl<S> AppState<S> {
    pub fn new(content: ContentCatalog, downloads: DownloadCvProcess<S>) -> Self {
        Self {
            content: Arc::new(content),
            downloads: Arc::new(downloads),
        }
    }
}

// Not derived: `S` itself need not be `Clone`.
impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            content: Arc::clone(&self.content),
            downloads: Arc::clone(&self.downloads),
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Content
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ContentQuery {
    #[serde(default)]
    pub lang: Option<String>,
}

/// Content document for `lang`, or the default language when absent.
pub async fn get_content<S: TokenStore>(
    State(state): State<AppState<S>>,
    Query(query): Query<ContentQuery>,
) -> Result<impl IntoResponse, AppError> {
    let lang = query
        .lang
        .filter(|lang| !lang.is_empty())
        .unwrap_or_else(|| state.content.default_lang().to_string());

    let body = state.content.get(&lang)?.to_vec();

    Ok(([(header::CONTENT_TYPE, "application/json")], body))
}

// =============================================================================
// CV Download
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub lang: String,
}

/// Redeem a download token and stream back the CV as an attachment.
pub async fn download_cv<S: TokenStore>(
    State(state): State<AppState<S>>,
    Query(query): Query<DownloadQuery>,
) -> Result<impl IntoResponse, AppError> {
    if query.token.is_empty() || query.lang.is_empty() {
        return Err(AppError::InvalidInput);
    }

    let path = state.downloads.process(&query.token, &query.lang).await?;

    let body = tokio::fs::read(path).await.map_err(|e| {
        error!(path = %path.display(), error = %e, "cv_file_read_failed");
        AppError::Internal
    })?;

    info!(lang = %query.lang, bytes = body.len(), "cv_download_served");

    let disposition = format!("attachment; filename=\"{}\"", state.downloads.filename());

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}
