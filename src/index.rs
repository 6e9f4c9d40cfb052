//! In-memory vector index.
//!
//! Holds `(chunk, vector)` pairs and answers top-K queries by brute-force
//! cosine similarity, which is exact and fast enough for the few thousand
//! chunks an uploaded document set produces. An index is built in one go
//! and never updated in place; re-ingestion builds a new one.

use serde::Serialize;

use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::models::TextChunk;

struct Entry {
    chunk: TextChunk,
    vector: Vec<f32>,
}

/// A retrieved chunk with its similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: TextChunk,
    pub score: f32,
}

pub struct VectorIndex {
    entries: Vec<Entry>,
    dims: usize,
    model: String,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("chunks", &self.entries.len())
            .field("dims", &self.dims)
            .field("model", &self.model)
            .finish()
    }
}

impl VectorIndex {
    /// Embed every chunk and build an index.
    ///
    /// Chunks are sent in batches of `batch_size`. Any provider error, a
    /// missing vector, or a dimension mismatch aborts the build; nothing is
    /// returned in that case.
    pub async fn build(
        provider: &dyn EmbeddingProvider,
        chunks: Vec<TextChunk>,
        batch_size: usize,
        mut on_batch: impl FnMut(usize, usize),
    ) -> Result<Self> {
        let total = chunks.len();
        let batch_size = batch_size.max(1);
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(total);

        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = provider
                .embed(&texts)
                .await
                .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;
            if embedded.len() != texts.len() {
                return Err(RagError::Embedding(format!(
                    "provider returned {} vectors for {} texts",
                    embedded.len(),
                    texts.len()
                )));
            }
            vectors.extend(embedded);
            on_batch(vectors.len(), total);
        }

        let dims = match vectors.first() {
            Some(v) => v.len(),
            None => provider.dims(),
        };
        if provider.dims() > 0 && dims != provider.dims() && !vectors.is_empty() {
            return Err(RagError::Embedding(format!(
                "model {} returned {}-dimensional vectors, expected {}",
                provider.model_name(),
                dims,
                provider.dims()
            )));
        }
        if let Some(bad) = vectors.iter().position(|v| v.len() != dims) {
            return Err(RagError::Embedding(format!(
                "inconsistent vector dimensions: chunk {} has {}, expected {}",
                bad,
                vectors[bad].len(),
                dims
            )));
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| Entry { chunk, vector })
            .collect();

        Ok(Self {
            entries,
            dims,
            model: provider.model_name().to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Distinct source names, in first-seen order.
    pub fn sources(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for e in &self.entries {
            if !seen.contains(&e.chunk.source.as_str()) {
                seen.push(&e.chunk.source);
            }
        }
        seen
    }

    /// Return up to `k` chunks most similar to `query`, best first. Equal
    /// scores keep index order. Never fails; `k` larger than the index
    /// returns every chunk.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query, &e.vector)))
            .collect();
        // Stable sort: ties stay in insertion order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect()
    }
}
