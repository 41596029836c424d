//! Captcha records as written by the captcha service.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::AppError;
use crate::store::{captcha_key, TokenStore};

/// Proof-of-solve state with a bounded number of password attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptchaRecord {
    /// Expected answer; not used here but kept when the record is rewritten.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub solved: bool,
    #[serde(default)]
    pub tries_left: i64,
}

/// Read and decode the record for `captcha_id`.
///
/// Absent record is `CaptchaNotFound`; a store failure or an undecodable
/// record is `Internal`.
pub(crate) async fn load_record<S: TokenStore>(
    store: &S,
    captcha_id: &str,
) -> Result<CaptchaRecord, AppError> {
    let raw = store
        .get(&captcha_key(captcha_id))
        .await
        .map_err(|e| {
            error!(captcha_id = %captcha_id, error = %e, "captcha_lookup_failed");
            AppError::Internal
        })?
        .ok_or(AppError::CaptchaNotFound)?;

    serde_json::from_str(&raw).map_err(|e| {
        error!(captcha_id = %captcha_id, error = %e, "captcha_record_malformed");
        AppError::Internal
    })
}
