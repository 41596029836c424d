//! Static bilingual content, read once at startup.

use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::ContentConfig;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct ContentCatalog {
    documents: HashMap<String, Vec<u8>>,
    default_lang: String,
}

impl ContentCatalog {
    /// Read every configured file. Any unreadable file fails the load.
    pub fn load(config: &ContentConfig) -> Result<Self> {
        let mut documents = HashMap::with_capacity(config.files.len());
        for (lang, path) in &config.files {
            let bytes = std::fs::read(path).with_context(|| {
                format!(
                    "could not read content file for lang {}: {}",
                    lang,
                    path.display()
                )
            })?;
            documents.insert(lang.clone(), bytes);
        }

        info!(
            languages = documents.len(),
            default_lang = %config.default_lang,
            "content_loaded"
        );

        Ok(Self {
            documents,
            default_lang: config.default_lang.clone(),
        })
    }

    /// Content for `lang`, falling back to the default language.
    pub fn get(&self, lang: &str) -> Result<&[u8], AppError> {
        self.documents
            .get(lang)
            .or_else(|| self.documents.get(&self.default_lang))
            .map(Vec::as_slice)
            .ok_or(AppError::ContentNotFound)
    }

    pub fn default_lang(&self) -> &str {
        &self.default_lang
    }
}
