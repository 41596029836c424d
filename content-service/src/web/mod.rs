//! HTTP surface of the content service.
//!
//! - `GET /health`
//! - `GET /content?lang=` serves the bilingual content document
//! - `GET /download/cv?token=&lang=` redeems a download token for the CV file

pub mod handlers;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::store::TokenStore;

pub use handlers::{download_cv, get_content, health, AppState, ContentQuery, DownloadQuery, HealthResponse};

/// Build the application router.
pub fn router<S: TokenStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/content", get(get_content::<S>))
        .route("/download/cv", get(download_cv::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
