//! Removes a captcha record once it has been used for a successful login.

use std::sync::Arc;

use tracing::error;

use crate::error::AppError;
use crate::store::{captcha_key, TokenStore};

pub struct DeleteCaptchaTask<S> {
    store: Arc<S>,
}

impl<S: TokenStore> DeleteCaptchaTask<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn execute(&self, captcha_id: &str) -> Result<(), AppError> {
        self.store
            .delete(&captcha_key(captcha_id))
            .await
            .map_err(|e| {
                error!(captcha_id = %captcha_id, error = %e, "captcha_delete_failed");
                AppError::Internal
            })
    }
}
