//! Request processing.
//!
//! - `cv_token`: password + captcha → single-use download token
//! - `download_cv`: token → CV file, at most once per token
//! - `content`: language → static content document

pub mod content;
pub mod cv_token;
pub mod download_cv;

pub use content::ContentCatalog;
pub use cv_token::CvTokenProcess;
pub use download_cv::{DownloadCvProcess, TokenGate};
