//! Application error taxonomy.
//!
//! Every variant carries a stable slug that is part of the client-visible
//! contract: it is what broker replies carry in their `error` field and what
//! HTTP error bodies contain.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Domain failures surfaced to clients by slug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("unsupported language")]
    UnsupportedLanguage,
    #[error("captcha not found")]
    CaptchaNotFound,
    #[error("captcha not solved")]
    CaptchaNotSolved,
    /// Wrong password, the captcha still has tries left.
    #[error("invalid password")]
    InvalidPassword,
    /// Wrong password on the last try; the captcha is gone.
    #[error("no tries left")]
    NoTriesLeft,
    /// Download token already redeemed or expired.
    #[error("cv link expired or invalid")]
    CvExpired,
    #[error("invalid input")]
    InvalidInput,
    #[error("content not found")]
    ContentNotFound,
    /// Storage or transport failure. The cause is logged where it happens.
    #[error("internal server error")]
    Internal,
}

impl AppError {
    /// Stable machine-readable identifier.
    pub fn slug(&self) -> &'static str {
        match self {
            AppError::UnsupportedLanguage => "unsupported_language",
            AppError::CaptchaNotFound => "captcha_not_found",
            AppError::CaptchaNotSolved => "captcha_not_solved",
            AppError::InvalidPassword => "invalid_password",
            AppError::NoTriesLeft => "no_tries_left",
            AppError::CvExpired => "cv_expired",
            AppError::InvalidInput => "invalid_input",
            AppError::ContentNotFound => "content_not_found",
            AppError::Internal => "internal_server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::UnsupportedLanguage | AppError::InvalidInput => StatusCode::BAD_REQUEST,
            AppError::CaptchaNotFound | AppError::ContentNotFound => StatusCode::NOT_FOUND,
            AppError::CaptchaNotSolved => StatusCode::FORBIDDEN,
            AppError::InvalidPassword => StatusCode::UNAUTHORIZED,
            AppError::NoTriesLeft => StatusCode::TOO_MANY_REQUESTS,
            AppError::CvExpired => StatusCode::GONE,
            AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(ErrorResponse {
                error: self.slug(),
            }),
        )
            .into_response()
    }
}
