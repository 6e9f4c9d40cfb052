//! Error taxonomy for the question-answering pipeline.
//!
//! Errors fall into two groups:
//!
//! - **Preconditions**: something the user must supply first (a token,
//!   files, an index, a question) or a setting outside its legal range.
//!   These are raised before any session state changes.
//! - **External services**: PDF/text extraction, the embedding provider,
//!   or the hosted text-generation endpoint failed. These carry the
//!   underlying error text verbatim.
//!
//! Every error ends only the attempted action; the session stays usable.

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("an access token is required (set it in the settings or the token environment variable)")]
    MissingToken,

    #[error("no documents were provided")]
    NoDocuments,

    #[error("the uploaded files contain no extractable text")]
    NoText,

    #[error("no documents have been indexed yet; ingest files before asking questions")]
    NoIndex,

    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("unsupported file type: {0} (supported: .pdf, .txt, .md)")]
    UnsupportedFileType(String),

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("failed to extract text from {file}: {message}")]
    Extraction { file: String, message: String },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("generation failed: {0}")]
    Generation(String),
}

impl RagError {
    /// True for errors the user resolves by supplying missing input
    /// rather than by retrying an external call.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            RagError::MissingToken
                | RagError::NoDocuments
                | RagError::NoText
                | RagError::NoIndex
                | RagError::EmptyQuestion
                | RagError::UnsupportedFileType(_)
                | RagError::InvalidSetting(_)
        )
    }

    /// Stable machine-readable code, used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            RagError::MissingToken => "missing_token",
            RagError::NoDocuments => "no_documents",
            RagError::NoText => "no_text",
            RagError::NoIndex => "no_index",
            RagError::EmptyQuestion => "empty_question",
            RagError::UnsupportedFileType(_) => "unsupported_file_type",
            RagError::InvalidSetting(_) => "invalid_setting",
            RagError::Extraction { .. } => "extraction_failed",
            RagError::Embedding(_) => "embedding_failed",
            RagError::Generation(_) => "generation_failed",
        }
    }
}
