//! Deterministic answers built straight from the passages.
//!
//! Used whenever the model cannot be called. The same inputs always yield
//! the same text.

use helpdesk_retrieval::SearchHit;

use crate::context::leading_sentences;
use crate::sources::clean_source;

/// Reply used when nothing retrieved is relevant to the question.
pub const NO_RELEVANT_INFORMATION: &str = "I'm sorry, I don't have specific information about \
that in our knowledge base. I can help with questions about the services and destinations \
covered in our documents.";

/// Templated answer listing up to `max_passages` passages with short snippets.
pub fn fallback_answer(
    question: &str,
    hits: &[SearchHit],
    off_topic: bool,
    max_passages: usize,
    snippet_chars: usize,
) -> String {
    if off_topic || hits.is_empty() {
        return NO_RELEVANT_INFORMATION.to_string();
    }

    let mut answer = format!(
        "Here is what I found related to \"{}\":\n",
        question.trim()
    );
    for (i, hit) in hits.iter().take(max_passages.max(1)).enumerate() {
        let name = clean_source(&hit.document.source_label, hit.document.title.as_deref());
        answer.push_str(&format!(
            "\n{}. {name}: {}",
            i + 1,
            snippet(&hit.document.text, snippet_chars)
        ));
    }
    answer.push_str("\n\nAsk me about any of these for more detail.");
    answer
}

/// Leading sentences within `max_chars`, else whole words followed by "...".
fn snippet(text: &str, max_chars: usize) -> String {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.chars().count() <= max_chars {
        return text;
    }
    if let Some(sentences) = leading_sentences(&text, max_chars) {
        return sentences.to_string();
    }

    let mut out = String::new();
    for word in text.split(' ') {
        let next_len = out.chars().count() + word.chars().count() + 1;
        if next_len + 3 > max_chars && !out.is_empty() {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out.push_str("...");
    out
}
