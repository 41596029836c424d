//! Message types carried by the broker gateway.
//!
//! - `Delivery`: transport-neutral view of one inbound message
//! - `CvTokenRequest` / `CvTokenReply`: JSON payloads of the CV token queue

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// One inbound message, owned by the worker processing it until it is
/// acknowledged or rejected.
#[derive(Debug, Clone, Default)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub body: Vec<u8>,
    /// Where the reply goes. `None` for fire-and-forget messages.
    pub reply_to: Option<String>,
    pub correlation_id: Option<String>,
}

impl From<lapin::message::Delivery> for Delivery {
    fn from(delivery: lapin::message::Delivery) -> Self {
        let reply_to = delivery
            .properties
            .reply_to()
            .as_ref()
            .map(|s| s.as_str().to_string())
            .filter(|s| !s.is_empty());
        let correlation_id = delivery
            .properties
            .correlation_id()
            .as_ref()
            .map(|s| s.as_str().to_string());

        Self {
            delivery_tag: delivery.delivery_tag,
            body: delivery.data,
            reply_to,
            correlation_id,
        }
    }
}

// =============================================================================
// CV token queue
// =============================================================================

/// Request for a CV download token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CvTokenRequest {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub lang: String,
    #[serde(default, rename = "captchaId")]
    pub captcha_id: String,
}

/// Reply to a `CvTokenRequest`. Exactly one field is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CvTokenReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<String, AppError>> for CvTokenReply {
    fn from(result: Result<String, AppError>) -> Self {
        match result {
            Ok(token) => Self {
                token: Some(token),
                error: None,
            },
            Err(e) => Self {
                token: None,
                error: Some(e.slug().to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserialization() {
        let json = r#"{"password": "pass", "lang": "pl", "captchaId": "c-1"}"#;

        let request: CvTokenRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.password, "pass");
        assert_eq!(request.lang, "pl");
        assert_eq!(request.captcha_id, "c-1");
    }

    #[test]
    fn test_request_missing_fields_default_to_empty() {
        let request: CvTokenRequest = serde_json::from_str(r#"{"lang": "en"}"#).unwrap();
        assert_eq!(request.password, "");
        assert_eq!(request.captcha_id, "");
    }

    #[test]
    fn test_reply_success_has_only_token() {
        let reply = CvTokenReply::from(Ok("token-123".to_string()));
        let json = serde_json::to_string(&reply).unwrap();
        assert_eq!(json, r#"{"token":"token-123"}"#);
    }

    #[test]
    fn test_reply_failure_has_only_error() {
        let reply = CvTokenReply::from(Err(AppError::InvalidPassword));
        let json = serde_json::to_string(&reply).unwrap();
        assert_eq!(json, r#"{"error":"invalid_password"}"#);
    }
}
