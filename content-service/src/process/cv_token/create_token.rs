//! Mints single-use download tokens.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::{OsRng, StdRng};
use rand::{Rng, SeedableRng};
use tracing::error;

use crate::error::AppError;
use crate::store::{token_key, TokenStore, TOKEN_VALID_MARKER};

/// Length of a minted token.
pub const TOKEN_LENGTH: usize = 32;

const TOKEN_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub struct CreateTokenTask<S> {
    store: Arc<S>,
    ttl: Duration,
}

impl<S: TokenStore> CreateTokenTask<S> {
    pub fn new(store: Arc<S>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub async fn execute(&self) -> Result<String, AppError> {
        let token = generate_token().map_err(|e| {
            error!(error = %e, "token_generation_failed");
            AppError::Internal
        })?;

        self.store
            .set(&token_key(&token), TOKEN_VALID_MARKER, self.ttl)
            .await
            .map_err(|e| {
                error!(error = %e, "token_store_failed");
                AppError::Internal
            })?;

        Ok(token)
    }
}

/// Draw `TOKEN_LENGTH` characters uniformly from `TOKEN_CHARSET` with a
/// generator seeded from the OS random source.
fn generate_token() -> Result<String, rand::Error> {
    let mut rng = StdRng::from_rng(OsRng)?;

    Ok((0..TOKEN_LENGTH)
        .map(|_| char::from(TOKEN_CHARSET[rng.gen_range(0..TOKEN_CHARSET.len())]))
        .collect())
}
