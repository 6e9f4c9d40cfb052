//! Prompt assembly and source excerpts.

use crate::models::TextChunk;

/// Maximum characters of retrieved context placed in the prompt.
pub const MAX_CONTEXT_CHARS: usize = 2000;

/// Maximum characters of a chunk shown as a source excerpt.
pub const SOURCE_EXCERPT_CHARS: usize = 300;

/// Join chunk texts with blank lines and cap the result at
/// [`MAX_CONTEXT_CHARS`] characters.
pub fn build_context<'a>(chunks: impl IntoIterator<Item = &'a TextChunk>) -> String {
    let joined = chunks
        .into_iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    truncate_chars(&joined, MAX_CONTEXT_CHARS).to_string()
}

/// Fill the answer template with a context and a question.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "Answer the question using the context below. If you don't know the answer, say 'I don't know'.\n\
         \n\
         Context: {context}\n\
         \n\
         Question: {question}\n\
         \n\
         Answer:"
    )
}

/// The excerpt of a chunk kept with an assistant turn.
pub fn source_excerpt(chunk: &TextChunk) -> String {
    truncate_chars(&chunk.text, SOURCE_EXCERPT_CHARS).to_string()
}

/// Longest prefix of `s` with at most `max` characters.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> TextChunk {
        TextChunk {
            id: "id".into(),
            source: "a.txt".into(),
            page: None,
            chunk_index: 0,
            text: text.into(),
            hash: String::new(),
        }
    }

    #[test]
    fn context_joins_with_blank_lines() {
        let chunks = vec![chunk("one"), chunk("two")];
        assert_eq!(build_context(&chunks), "one\n\ntwo");
    }

    #[test]
    fn context_is_capped() {
        let chunks = vec![chunk(&"a".repeat(1500)), chunk(&"b".repeat(1500))];
        let ctx = build_context(&chunks);
        assert_eq!(ctx.chars().count(), MAX_CONTEXT_CHARS);
        assert!(ctx.starts_with('a'));
        assert!(ctx.ends_with('b'));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("çğüşö", 3), "çğü");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn prompt_layout() {
        let p = build_prompt("The capital of France is Paris.", "What is the capital of France?");
        assert!(p.starts_with("Answer the question using the context below."));
        assert!(p.contains("Context: The capital of France is Paris.\n\nQuestion: What is the capital of France?\n\nAnswer:"));
        assert!(p.ends_with("Answer:"));
    }

    #[test]
    fn excerpt_is_300_chars() {
        let c = chunk(&"x".repeat(1000));
        assert_eq!(source_excerpt(&c).len(), SOURCE_EXCERPT_CHARS);
    }
}
