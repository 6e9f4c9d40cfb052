//! External services shared by every session.
//!
//! Sessions own their settings, index and history; the embedding provider
//! and the text generator are stateless clients built once from the
//! configuration and shared behind `Arc`.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::generation::{HuggingFaceGenerator, TextGenerator};

#[derive(Clone)]
pub struct Services {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub generator: Arc<dyn TextGenerator>,
    /// Texts per embedding request during ingestion.
    pub batch_size: usize,
}

impl Services {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn TextGenerator>,
        batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            generator,
            batch_size,
        }
    }

    /// Build the configured providers. `token` is a fallback for providers
    /// that authenticate with the same access token as generation; each
    /// session's own token takes precedence, so `None` is fine.
    pub fn from_config(config: &Config, token: Option<String>) -> Result<Self> {
        if !config.embedding.is_enabled() {
            tracing::warn!("embedding provider is disabled; ingestion will fail");
        }
        let embedder = create_provider(&config.embedding, token)
            .context("Failed to create embedding provider")?;
        let generator = HuggingFaceGenerator::new(&config.generation)
            .context("Failed to create generation client")?;
        tracing::debug!(
            embedder = embedder.model_name(),
            api_url = %config.generation.api_url,
            "services ready"
        );
        Ok(Self::new(
            Arc::from(embedder),
            Arc::new(generator),
            config.embedding.batch_size,
        ))
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("embedder", &self.embedder.model_name())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}
