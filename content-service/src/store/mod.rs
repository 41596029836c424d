//! Key/value storage for captcha records and single-use download tokens.
//!
//! The store exposes only single-key atomic operations. Nothing above it
//! relies on multi-key transactions or locks.

pub mod memory;
pub mod redis_store;

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Key prefix for captcha records written by the captcha service.
pub const CAPTCHA_KEY_PREFIX: &str = "captcha:";

/// Key prefix for download tokens.
pub const TOKEN_KEY_PREFIX: &str = "cv-token:";

/// Value stored under a redeemable token key.
pub const TOKEN_VALID_MARKER: &str = "valid";

pub fn captcha_key(captcha_id: &str) -> String {
    format!("{}{}", CAPTCHA_KEY_PREFIX, captcha_id)
}

pub fn token_key(token: &str) -> String {
    format!("{}{}", TOKEN_KEY_PREFIX, token)
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Single-key operations with TTL support.
pub trait TokenStore: Send + Sync + 'static {
    /// Check the backend is reachable.
    fn ping(&self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Store `value` under `key`, expiring after `ttl`.
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Remaining time to live. `None` when the key is absent or never expires.
    fn ttl(&self, key: &str)
        -> impl Future<Output = Result<Option<Duration>, StoreError>> + Send;

    /// Replace the value of an existing `key`, keeping its remaining TTL.
    ///
    /// Returns `false` without writing when the key is absent.
    fn set_existing(
        &self,
        key: &str,
        value: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Set the expiry of an existing `key`. `false` when the key is absent.
    fn expire(&self, key: &str, ttl: Duration)
        -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn delete(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Delete `key` atomically and report how many keys were removed (0 or 1).
    ///
    /// Exactly one of several concurrent callers for the same key observes 1.
    fn delete_counting(&self, key: &str) -> impl Future<Output = Result<u64, StoreError>> + Send;
}
