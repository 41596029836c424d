//! Content service.
//!
//! Backend for a bilingual personal site:
//! - serves static content documents per language over HTTP
//! - issues single-use CV download tokens over RabbitMQ request/reply,
//!   gated by a solved captcha and a shared password
//! - redeems those tokens for the CV file over HTTP
//!
//! ## Architecture
//!
//! ```text
//! client ─ cv_token_request ─→ Broker → CvTokenProcess ─→ Redis (captcha:, cv-token:)
//! client ─ GET /download/cv ─→ axum   → DownloadCvProcess ─→ Redis (cv-token:)
//! ```

pub mod config;
pub mod consumer;
pub mod error;
pub mod process;
pub mod queue;
pub mod store;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use error::AppError;
pub use process::{ContentCatalog, CvTokenProcess, DownloadCvProcess};
pub use queue::{Broker, BrokerError, MessageHandler};
pub use store::{MemoryStore, RedisStore, StoreError, TokenStore};
pub use web::AppState;
