//! Library-level session scenarios with a deterministic embedder and a
//! generator that records its prompts.

use async_trait::async_trait;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use rag_chat::chat::run_repl;
use rag_chat::embedding::EmbeddingProvider;
use rag_chat::error::{RagError, Result};
use rag_chat::generation::{GenerationParams, TextGenerator};
use rag_chat::models::{Role, UploadedFile};
use rag_chat::progress::NoProgress;
use rag_chat::services::Services;
use rag_chat::session::Session;
use rag_chat::settings::{RagSettings, SettingsInput};

const DIMS: usize = 256;

/// Bag-of-words vectors: each lowercase word is hashed into one of
/// `DIMS` buckets.
struct BagOfWords;

fn bucket(word: &str) -> usize {
    // FNV-1a
    let mut h: u64 = 0xcbf29ce484222325;
    for b in word.bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    (h % DIMS as u64) as usize
}

#[async_trait]
impl EmbeddingProvider for BagOfWords {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; DIMS];
                for word in t
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                {
                    v[bucket(&word.to_lowercase())] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Records every prompt and answers with a fixed string, or fails while
/// `fail` is set.
#[derive(Default)]
struct RecordingGenerator {
    prompts: Mutex<Vec<String>>,
    fail: Mutex<bool>,
}

#[async_trait]
impl TextGenerator for RecordingGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _model: &str,
        token: &str,
        params: &GenerationParams,
    ) -> Result<String> {
        assert_eq!(token, "hf_test");
        assert!(!params.return_full_text);
        if *self.fail.lock().unwrap() {
            return Err(RagError::Generation("HTTP 503: model is loading".into()));
        }
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("Paris.".to_string())
    }
}

fn settings(k: usize) -> RagSettings {
    RagSettings::from_input(SettingsInput {
        token: Some("hf_test".into()),
        chunk_size: Some(500),
        chunk_overlap: Some(50),
        k: Some(k),
        ..Default::default()
    })
    .unwrap()
}

fn file(name: &str, text: &str) -> UploadedFile {
    UploadedFile::new(name, text.as_bytes().to_vec())
}

#[tokio::test]
async fn answers_from_the_only_relevant_passage() {
    let generator = RecordingGenerator::default();
    let mut session = Session::new(settings(1));
    session
        .ingest(
            vec![file("france.txt", "The capital of France is Paris.")],
            &BagOfWords,
            8,
            &NoProgress,
        )
        .await
        .unwrap();

    let answer = session
        .ask("What is the capital of France?", &BagOfWords, &generator, &NoProgress)
        .await
        .unwrap();

    assert_eq!(answer.text, "Paris.");
    assert_eq!(answer.sources.len(), 1);
    assert!(answer.sources[0]
        .chunk
        .text
        .contains("The capital of France is Paris."));

    let prompts = generator.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains(
        "Context: The capital of France is Paris.\n\nQuestion: What is the capital of France?\n\nAnswer:"
    ));

    let history = session.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].sources, vec!["The capital of France is Paris.".to_string()]);
}

#[tokio::test]
async fn k_larger_than_index_returns_every_chunk() {
    let generator = RecordingGenerator::default();
    let mut session = Session::new(settings(5));
    session
        .ingest(vec![file("a.txt", "Just one short chunk.")], &BagOfWords, 8, &NoProgress)
        .await
        .unwrap();

    let answer = session
        .ask("Anything?", &BagOfWords, &generator, &NoProgress)
        .await
        .unwrap();
    assert_eq!(answer.sources.len(), 1);
}

#[tokio::test]
async fn retrieval_prefers_the_matching_document() {
    let generator = RecordingGenerator::default();
    let mut session = Session::new(settings(1));
    session
        .ingest(
            vec![
                file("alpha.md", "Rust programming uses cargo to build crates."),
                file("beta.md", "Python notebooks train machine learning models."),
                file("gamma.txt", "Kubernetes and Docker handle deployment of services."),
            ],
            &BagOfWords,
            2,
            &NoProgress,
        )
        .await
        .unwrap();

    let answer = session
        .ask(
            "Which tools handle deployment with Kubernetes?",
            &BagOfWords,
            &generator,
            &NoProgress,
        )
        .await
        .unwrap();
    assert_eq!(answer.sources[0].chunk.source, "gamma.txt");
}

#[tokio::test]
async fn reingest_replaces_the_index() {
    let generator = RecordingGenerator::default();
    let mut session = Session::new(settings(5));
    session
        .ingest(vec![file("cats.txt", "Cats purr softly.")], &BagOfWords, 8, &NoProgress)
        .await
        .unwrap();
    session
        .ingest(vec![file("dogs.txt", "Dogs bark loudly.")], &BagOfWords, 8, &NoProgress)
        .await
        .unwrap();

    let answer = session
        .ask("Do cats purr softly?", &BagOfWords, &generator, &NoProgress)
        .await
        .unwrap();
    assert!(answer
        .sources
        .iter()
        .all(|s| s.chunk.source == "dogs.txt"));
}

#[tokio::test]
async fn no_index_then_generation_failure_then_recovery() {
    let generator = RecordingGenerator::default();
    let mut session = Session::new(settings(3));

    let err = session
        .ask("Too early?", &BagOfWords, &generator, &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::NoIndex));
    assert!(session.history().is_empty());

    session
        .ingest(vec![file("a.txt", "Some indexed text.")], &BagOfWords, 8, &NoProgress)
        .await
        .unwrap();

    *generator.fail.lock().unwrap() = true;
    let err = session
        .ask("First try?", &BagOfWords, &generator, &NoProgress)
        .await
        .unwrap_err();
    assert!(!err.is_precondition());
    assert!(err.to_string().contains("model is loading"));
    assert_eq!(session.history().len(), 1);

    *generator.fail.lock().unwrap() = false;
    session
        .ask("Second try?", &BagOfWords, &generator, &NoProgress)
        .await
        .unwrap();
    assert_eq!(session.history().len(), 3);
}

#[tokio::test]
async fn settings_change_applies_to_next_ingest() {
    let mut session = Session::new(settings(3));
    let text = "word ".repeat(400);

    let report = session
        .ingest(vec![file("long.txt", &text)], &BagOfWords, 16, &NoProgress)
        .await
        .unwrap();
    let coarse = report.chunks;

    session
        .update_settings(SettingsInput {
            chunk_size: Some(200),
            chunk_overlap: Some(0),
            ..Default::default()
        })
        .unwrap();
    let report = session
        .ingest(vec![file("long.txt", &text)], &BagOfWords, 16, &NoProgress)
        .await
        .unwrap();

    assert!(report.chunks > coarse);
    assert_eq!(report.dims, DIMS);
    let index = session.index().unwrap();
    assert_eq!(index.len(), report.chunks);
}

#[tokio::test]
async fn repl_session_script() {
    let services = Services::new(
        Arc::new(BagOfWords),
        Arc::new(RecordingGenerator::default()),
        8,
    );
    let mut session = Session::new(settings(1));
    session
        .ingest(
            vec![file("france.txt", "The capital of France is Paris.")],
            services.embedder.as_ref(),
            services.batch_size,
            &NoProgress,
        )
        .await
        .unwrap();

    let script = "What is the capital of France?\n\
                  /history\n\
                  /reset\n\
                  /history\n\
                  /status\n\
                  /bogus\n\
                  /quit\n\
                  never read\n";
    let mut input = Cursor::new(script.as_bytes().to_vec());
    let mut out: Vec<u8> = Vec::new();
    run_repl(&mut session, &services, &mut input, &mut out, &NoProgress, false)
        .await
        .unwrap();

    let out = String::from_utf8(out).unwrap();
    assert!(out.contains("Paris.\n\nSources:\nSource 1: The capital of France is Paris...."));
    assert!(out.contains("you> What is the capital of France?"));
    assert!(out.contains("Conversation cleared."));
    assert!(out.contains("(no conversation yet)"));
    assert!(out.contains("index:       1 chunk(s) from france.txt"));
    assert!(out.contains("Error: unknown command /bogus"));
    assert!(session.history().is_empty());
    assert!(session.has_index());
}
