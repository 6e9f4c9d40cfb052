//! Text extraction for uploaded files.
//!
//! PDFs are parsed with `pdf-extract`, one [`Segment`] per non-blank page.
//! Plain text and Markdown must be valid UTF-8 and become a single segment.

use crate::error::{RagError, Result};
use crate::models::{DocumentKind, Segment, UploadedFile};

/// Extracts the text segments of one uploaded file.
///
/// The file's kind is derived from its name; unsupported extensions are
/// rejected before any bytes are inspected.
pub fn extract_segments(file: &UploadedFile) -> Result<Vec<Segment>> {
    match DocumentKind::from_name(&file.name)? {
        DocumentKind::Pdf => extract_pdf(file),
        DocumentKind::Text | DocumentKind::Markdown => extract_plain(file),
    }
}

fn extract_pdf(file: &UploadedFile) -> Result<Vec<Segment>> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(&file.bytes).map_err(|e| {
        RagError::Extraction {
            file: file.name.clone(),
            message: e.to_string(),
        }
    })?;

    Ok(pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| Segment {
            source: file.name.clone(),
            page: Some(i as u32 + 1),
            text,
        })
        .collect())
}

fn extract_plain(file: &UploadedFile) -> Result<Vec<Segment>> {
    let text = std::str::from_utf8(&file.bytes).map_err(|e| RagError::Extraction {
        file: file.name.clone(),
        message: format!("not valid UTF-8: {}", e),
    })?;
    // A UTF-8 byte-order mark would otherwise leak into the first chunk.
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    Ok(vec![Segment {
        source: file.name.clone(),
        page: None,
        text: text.to_string(),
    }])
}
