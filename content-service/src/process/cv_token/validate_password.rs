//! Password check with a per-captcha retry budget.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::store::{captcha_key, TokenStore};

use super::captcha::load_record;

pub struct ValidatePasswordTask<S> {
    password_digest: Vec<u8>,
    store: Arc<S>,
    fallback_ttl: Duration,
}

impl<S: TokenStore> ValidatePasswordTask<S> {
    /// `fallback_ttl` applies when the captcha record has no remaining TTL to
    /// carry over.
    pub fn new(password: &str, store: Arc<S>, fallback_ttl: Duration) -> Self {
        Self {
            password_digest: Sha256::digest(password.as_bytes()).to_vec(),
            store,
            fallback_ttl,
        }
    }

    /// Accept the configured password. Anything else costs the captcha one try.
    ///
    /// The decrement is a plain read-modify-write: two concurrent wrong
    /// attempts on the same captcha may both observe the same count. The
    /// write only lands while the record still exists, so a captcha consumed
    /// in the meantime stays gone.
    pub async fn execute(&self, password: &str, captcha_id: &str) -> Result<(), AppError> {
        if self.matches(password) {
            return Ok(());
        }

        let key = captcha_key(captcha_id);
        let mut record = load_record(self.store.as_ref(), captcha_id).await?;
        record.tries_left = record.tries_left.saturating_sub(1);

        if record.tries_left <= 0 {
            self.store.delete(&key).await.map_err(|e| {
                error!(captcha_id = %captcha_id, error = %e, "captcha_delete_failed");
                AppError::Internal
            })?;

            info!(captcha_id = %captcha_id, "captcha_tries_exhausted");
            return Err(AppError::NoTriesLeft);
        }

        let raw = serde_json::to_string(&record).map_err(|e| {
            error!(captcha_id = %captcha_id, error = %e, "captcha_record_encode_failed");
            AppError::Internal
        })?;

        let updated = self.store.set_existing(&key, &raw).await.map_err(|e| {
            error!(captcha_id = %captcha_id, error = %e, "captcha_update_failed");
            AppError::Internal
        })?;

        // Consumed or expired since it was read; never recreate it.
        if !updated {
            info!(captcha_id = %captcha_id, "captcha_gone_before_update");
            return Err(AppError::CaptchaNotFound);
        }

        self.ensure_expiry(&key, captcha_id).await?;

        info!(
            captcha_id = %captcha_id,
            tries_left = record.tries_left,
            "captcha_try_consumed"
        );
        Err(AppError::InvalidPassword)
    }

    /// Give a record written without an expiry the fallback TTL.
    async fn ensure_expiry(&self, key: &str, captcha_id: &str) -> Result<(), AppError> {
        let ttl = self.store.ttl(key).await.map_err(|e| {
            error!(captcha_id = %captcha_id, error = %e, "captcha_ttl_lookup_failed");
            AppError::Internal
        })?;
        if ttl.is_some() {
            return Ok(());
        }

        warn!(
            captcha_id = %captcha_id,
            fallback_ttl_seconds = self.fallback_ttl.as_secs(),
            "captcha_ttl_missing"
        );
        self.store
            .expire(key, self.fallback_ttl)
            .await
            .map_err(|e| {
                error!(captcha_id = %captcha_id, error = %e, "captcha_expire_failed");
                AppError::Internal
            })?;
        Ok(())
    }

    /// Exact, case-sensitive match over SHA-256 digests, in constant time.
    fn matches(&self, candidate: &str) -> bool {
        let digest = Sha256::digest(candidate.as_bytes());
        constant_time_compare(&digest, &self.password_digest)
    }
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::cv_token::captcha::CaptchaRecord;
    use crate::store::test_support::FlakyStore;
    use crate::store::MemoryStore;

    const PASSWORD: &str = "secret123";
    const CAPTCHA_ID: &str = "test-captcha";

    async fn store_with(tries_left: i64) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let record = CaptchaRecord {
            value: Some("XYZ".to_string()),
            solved: true,
            tries_left,
        };
        store
            .set(
                &captcha_key(CAPTCHA_ID),
                &serde_json::to_string(&record).unwrap(),
                Duration::from_secs(120),
            )
            .await
            .unwrap();
        store
    }

    async fn stored_record(store: &MemoryStore) -> Option<CaptchaRecord> {
        store
            .get(&captcha_key(CAPTCHA_ID))
            .await
            .unwrap()
            .map(|raw| serde_json::from_str(&raw).unwrap())
    }

    fn task(store: &Arc<MemoryStore>) -> ValidatePasswordTask<MemoryStore> {
        ValidatePasswordTask::new(PASSWORD, Arc::clone(store), Duration::from_secs(600))
    }

    #[tokio::test]
    async fn test_correct_password_leaves_record_untouched() {
        let store = store_with(3).await;

        assert_eq!(task(&store).execute(PASSWORD, CAPTCHA_ID).await, Ok(()));
        assert_eq!(stored_record(&store).await.unwrap().tries_left, 3);
    }

    #[tokio::test]
    async fn test_wrong_password_decrements_tries() {
        let store = store_with(3).await;

        let result = task(&store).execute("wrong", CAPTCHA_ID).await;

        assert_eq!(result, Err(AppError::InvalidPassword));
        let record = stored_record(&store).await.unwrap();
        assert_eq!(record.tries_left, 2);
        assert!(record.solved);
        assert_eq!(record.value.as_deref(), Some("XYZ"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_password_keeps_remaining_ttl() {
        let store = store_with(3).await;
        tokio::time::advance(Duration::from_secs(20)).await;

        task(&store).execute("wrong", CAPTCHA_ID).await.unwrap_err();

        let ttl = store.ttl(&captcha_key(CAPTCHA_ID)).await.unwrap();
        assert_eq!(ttl, Some(Duration::from_secs(100)));
    }

    #[tokio::test]
    async fn test_wrong_password_without_ttl_uses_fallback() {
        let store = Arc::new(MemoryStore::new());
        store.insert_persistent(
            &captcha_key(CAPTCHA_ID),
            r#"{"solved":true,"triesLeft":2}"#,
        );

        task(&store).execute("wrong", CAPTCHA_ID).await.unwrap_err();

        let ttl = store.ttl(&captcha_key(CAPTCHA_ID)).await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(600));
        assert!(ttl > Duration::from_secs(590));
    }

    #[tokio::test]
    async fn test_last_try_deletes_captcha() {
        let store = store_with(1).await;

        let result = task(&store).execute("wrong", CAPTCHA_ID).await;

        assert_eq!(result, Err(AppError::NoTriesLeft));
        assert_eq!(stored_record(&store).await, None);
    }

    #[tokio::test]
    async fn test_password_is_case_sensitive() {
        let store = store_with(3).await;

        let result = task(&store).execute("SECRET123", CAPTCHA_ID).await;
        assert_eq!(result, Err(AppError::InvalidPassword));
    }

    #[tokio::test]
    async fn test_wrong_password_without_captcha() {
        let store = Arc::new(MemoryStore::new());

        let result = task(&store).execute("wrong", CAPTCHA_ID).await;
        assert_eq!(result, Err(AppError::CaptchaNotFound));
    }

    #[tokio::test]
    async fn test_update_failure_is_internal() {
        let inner = store_with(3).await.as_ref().clone();
        let store = Arc::new(FlakyStore {
            inner,
            fail_set: true,
            ..Default::default()
        });

        let task = ValidatePasswordTask::new(PASSWORD, store, Duration::from_secs(600));
        assert_eq!(
            task.execute("wrong", CAPTCHA_ID).await,
            Err(AppError::Internal)
        );
    }

    #[tokio::test]
    async fn test_captcha_consumed_before_update_is_not_recreated() {
        let inner = store_with(3).await.as_ref().clone();
        let store = Arc::new(FlakyStore {
            inner,
            delete_before_update: true,
            ..Default::default()
        });

        let task = ValidatePasswordTask::new(PASSWORD, Arc::clone(&store), Duration::from_secs(600));
        assert_eq!(
            task.execute("wrong", CAPTCHA_ID).await,
            Err(AppError::CaptchaNotFound)
        );

        assert_eq!(stored_record(&store.inner).await, None);
        assert!(store.inner.keys().is_empty());
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(b"abc", b"abc"));
        assert!(!constant_time_compare(b"abc", b"abd"));
        assert!(!constant_time_compare(b"abc", b"abcd"));
    }
}
