//! Message handler capability.
//!
//! A handler is a plain callable: it takes a `Delivery` and resolves to the
//! serialized reply body or a `HandlerError`. The gateway bounds every call
//! with a deadline and drops the future when it expires.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;

use super::types::Delivery;
use crate::error::AppError;

pub type HandlerResult = Result<Vec<u8>, HandlerError>;

pub type MessageHandler = Arc<dyn Fn(Delivery) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Reasons a delivery is rejected instead of answered.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("message rejected: {0}")]
    Rejected(AppError),

    #[error("reply serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("handler timed out after {0:?}")]
    TimedOut(Duration),
}

/// Wrap an async function returning a serializable reply as a `MessageHandler`.
pub fn json_handler<F, Fut, T>(handler: F) -> MessageHandler
where
    F: Fn(Delivery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, HandlerError>> + Send + 'static,
    T: Serialize,
{
    Arc::new(move |delivery: Delivery| -> BoxFuture<'static, HandlerResult> {
        let reply = handler(delivery);
        Box::pin(async move {
            let reply = reply.await?;
            serde_json::to_vec(&reply).map_err(HandlerError::Serialize)
        })
    })
}
