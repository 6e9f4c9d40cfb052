//! Core data models used throughout rag-chat.
//!
//! These types represent the uploaded files, extracted segments, chunks and
//! conversation turns that flow through the ingestion and question-answering
//! pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Declared type of an uploaded file, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Text,
    Markdown,
}

impl DocumentKind {
    /// Extensions accepted by the upload surface.
    pub const EXTENSIONS: [&'static str; 3] = ["pdf", "txt", "md"];

    /// Classify a file by name. Unsupported extensions are rejected.
    pub fn from_name(name: &str) -> Result<Self> {
        let ext = std::path::Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("pdf") => Ok(DocumentKind::Pdf),
            Some("txt") => Ok(DocumentKind::Text),
            Some("md") => Ok(DocumentKind::Markdown),
            _ => Err(RagError::UnsupportedFileType(name.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Text => "text",
            DocumentKind::Markdown => "markdown",
        }
    }
}

/// A raw uploaded file. Discarded once its text has been extracted.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Extracted text of one PDF page or one whole text file.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub source: String,
    /// 1-based page number for PDFs.
    pub page: Option<u32>,
    pub text: String,
}

/// A bounded window of a segment's text; the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextChunk {
    pub id: String,
    pub source: String,
    pub page: Option<u32>,
    pub chunk_index: usize,
    pub text: String,
    pub hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the session's conversation history.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    /// Source excerpts used for an assistant answer; empty for user turns.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sources: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sources,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_extension_is_case_insensitive() {
        assert_eq!(DocumentKind::from_name("a.PDF").unwrap(), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_name("notes.txt").unwrap(), DocumentKind::Text);
        assert_eq!(
            DocumentKind::from_name("dir/README.Md").unwrap(),
            DocumentKind::Markdown
        );
    }

    #[test]
    fn unknown_extension_rejected() {
        for name in ["report.docx", "archive.tar.gz", "noext"] {
            let err = DocumentKind::from_name(name).unwrap_err();
            assert!(matches!(err, RagError::UnsupportedFileType(ref n) if n == name));
        }
    }
}
