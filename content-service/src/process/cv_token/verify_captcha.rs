//! Confirms the referenced captcha was solved.

use std::sync::Arc;

use crate::error::AppError;
use crate::store::TokenStore;

use super::captcha::load_record;

pub struct VerifyCaptchaTask<S> {
    store: Arc<S>,
}

impl<S: TokenStore> VerifyCaptchaTask<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn execute(&self, captcha_id: &str) -> Result<(), AppError> {
        let record = load_record(self.store.as_ref(), captcha_id).await?;
        if !record.solved {
            return Err(AppError::CaptchaNotSolved);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::test_support::FlakyStore;
    use crate::store::{captcha_key, MemoryStore};

    async fn task_with(raw: Option<&str>) -> VerifyCaptchaTask<MemoryStore> {
        let store = MemoryStore::new();
        if let Some(raw) = raw {
            store
                .set(&captcha_key("id"), raw, Duration::from_secs(60))
                .await
                .unwrap();
        }
        VerifyCaptchaTask::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_solved_captcha_passes() {
        let task = task_with(Some(r#"{"solved": true}"#)).await;
        assert_eq!(task.execute("id").await, Ok(()));
    }

    #[tokio::test]
    async fn test_missing_captcha() {
        let task = task_with(None).await;
        assert_eq!(task.execute("id").await, Err(AppError::CaptchaNotFound));
    }

    #[tokio::test]
    async fn test_unsolved_captcha() {
        let task = task_with(Some(r#"{"solved": false, "triesLeft": 3}"#)).await;
        assert_eq!(task.execute("id").await, Err(AppError::CaptchaNotSolved));
    }

    #[tokio::test]
    async fn test_malformed_record_is_internal() {
        let task = task_with(Some("invalid")).await;
        assert_eq!(task.execute("id").await, Err(AppError::Internal));
    }

    #[tokio::test]
    async fn test_store_failure_is_internal() {
        let store = FlakyStore {
            fail_get: true,
            ..Default::default()
        };
        let task = VerifyCaptchaTask::new(Arc::new(store));
        assert_eq!(task.execute("id").await, Err(AppError::Internal));
    }
}
