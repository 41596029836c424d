//! CV token process.
//!
//! Turns `(password, lang, captcha id)` into a single-use download token:
//!
//! ```text
//! lang check → verify captcha → validate password → delete captcha → create token
//! ```
//!
//! Each step short-circuits with a named `AppError`. Only password validation
//! has side effects on a failure path (it consumes a captcha try).

pub mod captcha;
pub mod create_token;
pub mod delete_captcha;
pub mod validate_password;
pub mod verify_captcha;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::CvConfig;
use crate::error::AppError;
use crate::store::TokenStore;

pub use captcha::CaptchaRecord;
pub use create_token::{CreateTokenTask, TOKEN_LENGTH};
pub use delete_captcha::DeleteCaptchaTask;
pub use validate_password::ValidatePasswordTask;
pub use verify_captcha::VerifyCaptchaTask;

pub struct CvTokenProcess<S> {
    verify_captcha: VerifyCaptchaTask<S>,
    validate_password: ValidatePasswordTask<S>,
    delete_captcha: DeleteCaptchaTask<S>,
    create_token: CreateTokenTask<S>,
    languages: HashSet<String>,
}

impl<S: TokenStore> CvTokenProcess<S> {
    pub fn new(store: Arc<S>, config: &CvConfig) -> Self {
        Self {
            verify_captcha: VerifyCaptchaTask::new(Arc::clone(&store)),
            validate_password: ValidatePasswordTask::new(
                &config.password,
                Arc::clone(&store),
                config.captcha_fallback_ttl(),
            ),
            delete_captcha: DeleteCaptchaTask::new(Arc::clone(&store)),
            create_token: CreateTokenTask::new(store, config.token_ttl()),
            languages: config.files.keys().cloned().collect(),
        }
    }

    /// Issue a download token for `lang`.
    ///
    /// The captcha is deleted before the token is minted, so a minting
    /// failure leaves the caller without a captcha and without a token.
    pub async fn process(
        &self,
        password: &str,
        lang: &str,
        captcha_id: &str,
    ) -> Result<String, AppError> {
        if !self.languages.contains(lang) {
            warn!(lang = %lang, "cv_token_unsupported_language");
            return Err(AppError::UnsupportedLanguage);
        }

        self.verify_captcha.execute(captcha_id).await?;
        self.validate_password.execute(password, captcha_id).await?;
        self.delete_captcha.execute(captcha_id).await?;
        let token = self.create_token.execute().await?;

        info!(lang = %lang, captcha_id = %captcha_id, "cv_token_issued");

        Ok(token)
    }
}
