//! Broker handlers for the content service queues.
//!
//! Each handler decodes a JSON request, runs the matching process and encodes
//! the reply. Domain failures are answered with an `error` slug; only
//! undecodable messages are rejected (and dead-lettered).

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::AppError;
use crate::process::CvTokenProcess;
use crate::queue::{json_handler, CvTokenReply, CvTokenRequest, Delivery, HandlerError, MessageHandler};
use crate::store::TokenStore;

/// Handler for the CV token request queue.
pub fn cv_token_handler<S: TokenStore>(process: Arc<CvTokenProcess<S>>) -> MessageHandler {
    json_handler(move |delivery: Delivery| {
        let process = Arc::clone(&process);
        async move {
            let request: CvTokenRequest = serde_json::from_slice(&delivery.body).map_err(|e| {
                warn!(
                    delivery_tag = delivery.delivery_tag,
                    error = %e,
                    "cv_token_request_parse_failed"
                );
                HandlerError::Rejected(AppError::InvalidInput)
            })?;

            let result = process
                .process(&request.password, &request.lang, &request.captcha_id)
                .await;

            if let Err(e) = &result {
                info!(
                    lang = %request.lang,
                    captcha_id = %request.captcha_id,
                    error = e.slug(),
                    "cv_token_request_denied"
                );
            }

            Ok(CvTokenReply::from(result))
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use crate::config::CvConfig;
    use crate::store::{captcha_key, token_key, MemoryStore};

    fn cv_config() -> CvConfig {
        CvConfig {
            password: "pass".to_string(),
            token_ttl_seconds: 300,
            captcha_fallback_ttl_seconds: 600,
            files: HashMap::from([("pl".to_string(), PathBuf::from("/cv/pl.pdf"))]),
            download_filename: "cv.pdf".to_string(),
        }
    }

    fn handler(store: &Arc<MemoryStore>) -> MessageHandler {
        cv_token_handler(Arc::new(CvTokenProcess::new(Arc::clone(store), &cv_config())))
    }

    fn request(body: &str) -> Delivery {
        Delivery {
            delivery_tag: 1,
            body: body.as_bytes().to_vec(),
            reply_to: Some("reply".to_string()),
            correlation_id: Some("corr".to_string()),
        }
    }

    #[tokio::test]
    async fn test_valid_request_replies_with_token() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                &captcha_key("c-1"),
                r#"{"value":"abc","triesLeft":3,"solved":true}"#,
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        let body = handler(&store)(request(
            r#"{"password":"pass","lang":"pl","captchaId":"c-1"}"#,
        ))
        .await
        .unwrap();

        let reply: CvTokenReply = serde_json::from_slice(&body).unwrap();
        let token = reply.token.unwrap();
        assert_eq!(reply.error, None);
        assert_eq!(store.keys(), vec![token_key(&token)]);
    }

    #[tokio::test]
    async fn test_domain_failure_replies_with_slug() {
        let store = Arc::new(MemoryStore::new());

        let body = handler(&store)(request(
            r#"{"password":"pass","lang":"pl","captchaId":"missing"}"#,
        ))
        .await
        .unwrap();

        assert_eq!(body, br#"{"error":"captcha_not_found"}"#.to_vec());
    }

    #[tokio::test]
    async fn test_unsupported_language_replies_with_slug() {
        let store = Arc::new(MemoryStore::new());

        let body = handler(&store)(request(r#"{"password":"pass","lang":"de","captchaId":"c"}"#))
            .await
            .unwrap();

        assert_eq!(body, br#"{"error":"unsupported_language"}"#.to_vec());
    }

    #[tokio::test]
    async fn test_malformed_request_is_rejected() {
        let store = Arc::new(MemoryStore::new());

        let err = handler(&store)(request("not json")).await.unwrap_err();

        assert!(matches!(err, HandlerError::Rejected(AppError::InvalidInput)));
    }
}
