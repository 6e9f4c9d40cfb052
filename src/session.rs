//! The per-user session: settings, the current index, and the conversation.
//!
//! A session moves through one forward transition:
//!
//! ```text
//!   empty ──ingest──▶ indexed ──ask──▶ indexed (history grows)
//!                       ▲   │
//!                       └───┘ ingest again: index replaced wholesale
//! ```
//!
//! `reset` clears the conversation and keeps the index. A failed ingestion
//! leaves the previous index in place.

use serde::Serialize;

use crate::chunk::RecursiveSplitter;
use crate::embedding::{embed_query, EmbeddingProvider, WithToken};
use crate::error::{RagError, Result};
use crate::generation::{GenerationParams, TextGenerator};
use crate::index::{ScoredChunk, VectorIndex};
use crate::ingest::prepare_batch;
use crate::models::{ConversationTurn, UploadedFile};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::prompt::{build_context, build_prompt, source_excerpt};
use crate::settings::{RagSettings, SettingsInput};

/// Summary of a successful ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub files: usize,
    pub segments: usize,
    pub chunks: usize,
    pub dims: usize,
}

/// A generated answer and the chunks it was conditioned on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<ScoredChunk>,
}

/// Snapshot of a session for display.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub settings: RagSettings,
    pub has_token: bool,
    pub indexed_chunks: Option<usize>,
    pub indexed_sources: Vec<String>,
    pub turns: usize,
}

#[derive(Debug)]
pub struct Session {
    settings: RagSettings,
    index: Option<VectorIndex>,
    history: Vec<ConversationTurn>,
}

impl Session {
    pub fn new(settings: RagSettings) -> Self {
        Self {
            settings,
            index: None,
            history: Vec::new(),
        }
    }

    pub fn settings(&self) -> &RagSettings {
        &self.settings
    }

    /// Apply partial overrides; the session is unchanged if validation fails.
    pub fn update_settings(&mut self, overrides: SettingsInput) -> Result<&RagSettings> {
        self.settings = self.settings.with_overrides(overrides)?;
        Ok(&self.settings)
    }

    pub fn index(&self) -> Option<&VectorIndex> {
        self.index.as_ref()
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            settings: self.settings.clone(),
            has_token: self.settings.has_token(),
            indexed_chunks: self.index.as_ref().map(|i| i.len()),
            indexed_sources: self
                .index
                .as_ref()
                .map(|i| i.sources().into_iter().map(str::to_string).collect())
                .unwrap_or_default(),
            turns: self.history.len(),
        }
    }

    /// Parse, split and embed `files`, then replace the current index.
    ///
    /// All-or-nothing: on any error the previous index is kept. Embedding
    /// requests authenticate with this session's token.
    pub async fn ingest(
        &mut self,
        files: Vec<UploadedFile>,
        embedder: &dyn EmbeddingProvider,
        batch_size: usize,
        progress: &dyn ProgressReporter,
    ) -> Result<IngestReport> {
        if !self.settings.has_token() {
            return Err(RagError::MissingToken);
        }
        if files.is_empty() {
            return Err(RagError::NoDocuments);
        }

        progress.report(ProgressEvent::Loading { files: files.len() });
        let splitter =
            RecursiveSplitter::new(self.settings.chunk_size(), self.settings.chunk_overlap())?;
        // PDF parsing is CPU-bound.
        let batch = tokio::task::spawn_blocking(move || prepare_batch(&files, &splitter))
            .await
            .map_err(|e| RagError::Extraction {
                file: "upload".to_string(),
                message: e.to_string(),
            })??;
        progress.report(ProgressEvent::Split {
            segments: batch.segments,
            chunks: batch.chunks.len(),
        });
        if batch.chunks.is_empty() {
            return Err(RagError::NoText);
        }

        let embedder = WithToken::new(embedder, self.settings.token());
        let index = VectorIndex::build(&embedder, batch.chunks, batch_size, |n, total| {
            progress.report(ProgressEvent::Embedding { n, total })
        })
        .await?;

        let report = IngestReport {
            files: batch.files,
            segments: batch.segments,
            chunks: index.len(),
            dims: index.dims(),
        };
        tracing::info!(
            chunks = report.chunks,
            dims = report.dims,
            model = index.model(),
            "index built"
        );
        progress.report(ProgressEvent::Ready {
            chunks: report.chunks,
        });
        self.index = Some(index);
        Ok(report)
    }

    /// Top-K chunks for `question` from the current index.
    pub async fn retrieve(
        &self,
        question: &str,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Vec<ScoredChunk>> {
        let index = self.index.as_ref().ok_or(RagError::NoIndex)?;
        let embedder = WithToken::new(embedder, self.settings.token());
        let query = embed_query(&embedder, question)
            .await
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;
        let hits = index.search(&query, self.settings.k());
        tracing::debug!(k = self.settings.k(), hits = hits.len(), "retrieved");
        Ok(hits)
    }

    /// Answer a question from the indexed documents.
    ///
    /// Preconditions are checked before the conversation is touched. Once
    /// they pass, the user turn is recorded; the assistant turn is recorded
    /// only if retrieval and generation succeed.
    pub async fn ask(
        &mut self,
        question: &str,
        embedder: &dyn EmbeddingProvider,
        generator: &dyn TextGenerator,
        progress: &dyn ProgressReporter,
    ) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::EmptyQuestion);
        }
        if self.index.is_none() {
            return Err(RagError::NoIndex);
        }
        let token = self
            .settings
            .token()
            .ok_or(RagError::MissingToken)?
            .to_string();

        self.history.push(ConversationTurn::user(question));
        progress.report(ProgressEvent::Thinking);

        let sources = self.retrieve(question, embedder).await?;
        let context = build_context(sources.iter().map(|s| &s.chunk));
        let prompt = build_prompt(&context, question);
        let params = GenerationParams::from_settings(&self.settings);

        let text = generator
            .generate(&prompt, self.settings.model(), &token, &params)
            .await?;

        self.history.push(ConversationTurn::assistant(
            text.clone(),
            sources.iter().map(|s| source_excerpt(&s.chunk)).collect(),
        ));
        Ok(Answer { text, sources })
    }

    /// Clear the conversation. The index is kept.
    pub fn reset(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use async_trait::async_trait;

    struct ConstEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ConstEmbedder {
        fn model_name(&self) -> &str {
            "const"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            anyhow::bail!("service unavailable")
        }
    }

    /// Records the token each embedding call is made with.
    #[derive(Default)]
    struct TokenEmbedder {
        seen: std::sync::Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl EmbeddingProvider for TokenEmbedder {
        fn model_name(&self) -> &str {
            "token"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.embed_with_token(texts, None).await
        }
        async fn embed_with_token(
            &self,
            texts: &[String],
            token: Option<&str>,
        ) -> anyhow::Result<Vec<Vec<f32>>> {
            self.seen.lock().unwrap().push(token.map(str::to_string));
            Ok(texts.iter().map(|_| vec![0.0, 1.0]).collect())
        }
    }

    struct EchoGenerator;

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            model: &str,
            _token: &str,
            _params: &GenerationParams,
        ) -> Result<String> {
            Ok(format!("answer from {}", model))
        }
    }

    struct DownGenerator;

    #[async_trait]
    impl TextGenerator for DownGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _model: &str,
            _token: &str,
            _params: &GenerationParams,
        ) -> Result<String> {
            Err(RagError::Generation("HTTP 503: model overloaded".into()))
        }
    }

    fn session_with_token() -> Session {
        Session::new(
            RagSettings::from_input(SettingsInput {
                token: Some("hf_test".into()),
                ..Default::default()
            })
            .unwrap(),
        )
    }

    fn text_file(name: &str, body: &str) -> UploadedFile {
        UploadedFile::new(name, body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn ingest_requires_token_and_files() {
        let mut s = Session::new(RagSettings::default());
        let err = s
            .ingest(vec![text_file("a.txt", "x")], &ConstEmbedder, 8, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::MissingToken));

        let mut s = session_with_token();
        let err = s
            .ingest(vec![], &ConstEmbedder, 8, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::NoDocuments));
        assert!(!s.has_index());
    }

    #[tokio::test]
    async fn blank_documents_produce_no_index() {
        let mut s = session_with_token();
        let err = s
            .ingest(vec![text_file("a.txt", "  \n\n ")], &ConstEmbedder, 8, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::NoText));
        assert!(!s.has_index());
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_previous_index() {
        let mut s = session_with_token();
        s.ingest(vec![text_file("a.txt", "first")], &ConstEmbedder, 8, &NoProgress)
            .await
            .unwrap();
        let err = s
            .ingest(vec![text_file("b.txt", "second")], &FailingEmbedder, 8, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Embedding(ref m) if m.contains("service unavailable")));
        assert_eq!(s.status().indexed_sources, vec!["a.txt".to_string()]);
    }

    #[tokio::test]
    async fn ask_without_index_appends_nothing() {
        let mut s = session_with_token();
        let err = s
            .ask("anything?", &ConstEmbedder, &EchoGenerator, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::NoIndex));
        assert!(s.history().is_empty());
    }

    #[tokio::test]
    async fn empty_question_rejected() {
        let mut s = session_with_token();
        s.ingest(vec![text_file("a.txt", "hello")], &ConstEmbedder, 8, &NoProgress)
            .await
            .unwrap();
        let err = s
            .ask("   ", &ConstEmbedder, &EchoGenerator, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::EmptyQuestion));
        assert!(s.history().is_empty());
    }

    #[tokio::test]
    async fn ask_records_turns_and_reset_keeps_index() {
        let mut s = session_with_token();
        s.ingest(vec![text_file("a.txt", "hello world")], &ConstEmbedder, 8, &NoProgress)
            .await
            .unwrap();
        let answer = s
            .ask("What?", &ConstEmbedder, &EchoGenerator, &NoProgress)
            .await
            .unwrap();
        assert_eq!(answer.text, "answer from google/flan-t5-large");
        assert_eq!(s.history().len(), 2);
        assert_eq!(s.history()[1].sources, vec!["hello world".to_string()]);

        s.reset();
        assert!(s.history().is_empty());
        assert!(s.has_index());
    }

    #[tokio::test]
    async fn generation_failure_keeps_only_user_turn() {
        let mut s = session_with_token();
        s.ingest(vec![text_file("a.txt", "hello")], &ConstEmbedder, 8, &NoProgress)
            .await
            .unwrap();
        let err = s
            .ask("Why?", &ConstEmbedder, &DownGenerator, &NoProgress)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model overloaded"));
        assert_eq!(s.history().len(), 1);
        assert_eq!(s.history()[0].content, "Why?");
    }

    #[tokio::test]
    async fn invalid_settings_update_leaves_session_unchanged() {
        let mut s = session_with_token();
        let before = s.settings().clone();
        assert!(s
            .update_settings(SettingsInput {
                k: Some(9),
                ..Default::default()
            })
            .is_err());
        assert_eq!(s.settings(), &before);
    }

    #[tokio::test]
    async fn embedding_calls_carry_the_session_token() {
        let mut s = session_with_token();
        let embedder = TokenEmbedder::default();
        s.ingest(vec![text_file("a.txt", "hello")], &embedder, 8, &NoProgress)
            .await
            .unwrap();
        s.ask("Who?", &embedder, &EchoGenerator, &NoProgress)
            .await
            .unwrap();
        let seen = embedder.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|t| t.as_deref() == Some("hf_test")));
    }
}
