//! CV download: redeems a single-use token for the CV file of a language.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::CvConfig;
use crate::error::AppError;
use crate::store::{token_key, StoreError, TokenStore};

/// Validates and invalidates download tokens in one step.
pub struct TokenGate<S> {
    store: Arc<S>,
}

impl<S: TokenStore> TokenGate<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// `Ok(true)` for exactly one caller per minted token; `Ok(false)` once
    /// it has been redeemed or has expired.
    pub async fn validate_and_delete_token(&self, token: &str) -> Result<bool, StoreError> {
        let removed = self.store.delete_counting(&token_key(token)).await?;
        Ok(removed == 1)
    }
}

pub struct DownloadCvProcess<S> {
    gate: TokenGate<S>,
    cv_files: HashMap<String, PathBuf>,
    filename: String,
}

impl<S: TokenStore> DownloadCvProcess<S> {
    pub fn new(store: Arc<S>, config: &CvConfig) -> Self {
        Self {
            gate: TokenGate::new(store),
            cv_files: config.files.clone(),
            filename: config.download_filename.clone(),
        }
    }

    /// File name offered to the browser.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Redeem `token` and return the CV path for `lang`.
    ///
    /// The language is checked first so a mistyped language does not burn
    /// the token.
    pub async fn process(&self, token: &str, lang: &str) -> Result<&Path, AppError> {
        let path = self.cv_files.get(lang).ok_or_else(|| {
            warn!(lang = %lang, "cv_download_unsupported_language");
            AppError::UnsupportedLanguage
        })?;

        let valid = self.gate.validate_and_delete_token(token).await.map_err(|e| {
            error!(error = %e, "cv_token_validation_failed");
            AppError::Internal
        })?;

        if !valid {
            info!(lang = %lang, "cv_token_rejected");
            return Err(AppError::CvExpired);
        }

        info!(lang = %lang, "cv_token_redeemed");
        Ok(path.as_path())
    }
}
