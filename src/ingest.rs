//! Document ingestion: uploaded files → text segments → chunks.
//!
//! A batch is all-or-nothing. Every file name is checked against the
//! supported extensions before any file is parsed, and the first file that
//! fails to extract aborts the whole batch.

use anyhow::{Context, Result as AnyResult};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::chunk::RecursiveSplitter;
use crate::error::{RagError, Result};
use crate::extract::extract_segments;
use crate::models::{DocumentKind, Segment, TextChunk, UploadedFile};

/// Outcome of loading and splitting one batch of files.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub files: usize,
    pub segments: usize,
    pub chunks: Vec<TextChunk>,
}

/// Extract the segments of every file, in upload order.
pub fn load_documents(files: &[UploadedFile]) -> Result<Vec<Segment>> {
    if files.is_empty() {
        return Err(RagError::NoDocuments);
    }
    for file in files {
        DocumentKind::from_name(&file.name)?;
    }

    let mut segments = Vec::new();
    for file in files {
        let extracted = extract_segments(file)?;
        tracing::debug!(file = %file.name, segments = extracted.len(), "extracted");
        segments.extend(extracted);
    }
    Ok(segments)
}

/// Load and split a batch with the given splitter.
pub fn prepare_batch(files: &[UploadedFile], splitter: &RecursiveSplitter) -> Result<PreparedBatch> {
    let segments = load_documents(files)?;
    let chunks = splitter.split_segments(&segments);
    tracing::info!(
        files = files.len(),
        segments = segments.len(),
        chunks = chunks.len(),
        chunk_size = splitter.chunk_size(),
        chunk_overlap = splitter.chunk_overlap(),
        "documents split"
    );
    Ok(PreparedBatch {
        files: files.len(),
        segments: segments.len(),
        chunks,
    })
}

/// Read files from disk for upload. Directories are walked recursively and
/// contribute only files with a supported extension; explicitly named files
/// are taken as-is so unsupported types are reported rather than skipped.
pub fn read_paths(paths: &[PathBuf]) -> AnyResult<Vec<UploadedFile>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| has_supported_extension(p))
                .collect();
            found.sort();
            for p in found {
                files.push(read_one(&p)?);
            }
        } else {
            files.push(read_one(path)?);
        }
    }
    Ok(files)
}

/// Dry run of ingestion for `ragchat chunk`: read, extract and split the
/// files, print the counts, and optionally every chunk. Nothing is embedded.
pub fn run_chunk(paths: &[PathBuf], splitter: &RecursiveSplitter, show: bool) -> AnyResult<()> {
    let files = read_paths(paths)?;
    let batch = prepare_batch(&files, splitter)?;

    println!(
        "Loaded {} page(s) from {} file(s)",
        batch.segments, batch.files
    );
    println!(
        "Created {} chunk(s) (size {}, overlap {})",
        batch.chunks.len(),
        splitter.chunk_size(),
        splitter.chunk_overlap()
    );

    if show {
        for chunk in &batch.chunks {
            let page = chunk
                .page
                .map(|p| format!(" p.{}", p))
                .unwrap_or_default();
            println!();
            println!(
                "--- {}{} #{} ({} chars)",
                chunk.source,
                page,
                chunk.chunk_index,
                chunk.text.chars().count()
            );
            println!("{}", chunk.text);
        }
    }
    Ok(())
}

fn read_one(path: &Path) -> AnyResult<UploadedFile> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(UploadedFile::new(name, bytes))
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| DocumentKind::EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_batch_is_rejected() {
        assert!(matches!(load_documents(&[]), Err(RagError::NoDocuments)));
    }

    #[test]
    fn unsupported_file_rejects_whole_batch() {
        let files = vec![
            UploadedFile::new("good.txt", b"hello".to_vec()),
            UploadedFile::new("bad.docx", b"whatever".to_vec()),
        ];
        let err = load_documents(&files).unwrap_err();
        assert!(matches!(err, RagError::UnsupportedFileType(ref n) if n == "bad.docx"));
    }

    #[test]
    fn corrupt_file_fails_batch() {
        let files = vec![
            UploadedFile::new("good.md", b"# fine".to_vec()),
            UploadedFile::new("broken.pdf", b"%PDF-garbage".to_vec()),
        ];
        assert!(matches!(
            load_documents(&files),
            Err(RagError::Extraction { .. })
        ));
    }

    #[test]
    fn segments_keep_upload_order() {
        let files = vec![
            UploadedFile::new("b.txt", b"second".to_vec()),
            UploadedFile::new("a.md", b"first".to_vec()),
        ];
        let segs = load_documents(&files).unwrap();
        let names: Vec<&str> = segs.iter().map(|s| s.source.as_str()).collect();
        assert_eq!(names, vec!["b.txt", "a.md"]);
    }

    #[test]
    fn every_supported_text_type_yields_a_chunk() {
        let splitter = RecursiveSplitter::new(500, 50).unwrap();
        for name in ["a.txt", "a.md"] {
            let batch =
                prepare_batch(&[UploadedFile::new(name, b"Some content.".to_vec())], &splitter)
                    .unwrap();
            assert_eq!(batch.files, 1);
            assert_eq!(batch.segments, 1);
            assert!(!batch.chunks.is_empty());
        }
    }

    #[test]
    fn pdf_chunks_carry_their_page() {
        let splitter = RecursiveSplitter::new(500, 50).unwrap();
        let pdf = crate::extract::fixtures::pdf_with_pages(&["spec test phrase"]);
        let batch = prepare_batch(&[UploadedFile::new("spec.pdf", pdf)], &splitter).unwrap();
        assert_eq!(batch.segments, 1);
        assert!(batch
            .chunks
            .iter()
            .any(|c| c.text.contains("spec test phrase") && c.page == Some(1)));
    }

    #[test]
    fn directories_are_walked_for_supported_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let nested = tmp.path().join("nested");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(tmp.path().join("a.txt"), "alpha").unwrap();
        std::fs::write(nested.join("b.md"), "beta").unwrap();
        std::fs::write(nested.join("c.bin"), [0u8, 1, 2]).unwrap();

        let files = read_paths(&[tmp.path().to_path_buf()]).unwrap();
        let mut names: Vec<String> = files.into_iter().map(|f| f.name).collect();
        names.sort();
        assert_eq!(names, vec!["a.txt", "b.md"]);
    }
}
