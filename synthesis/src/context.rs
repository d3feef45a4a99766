//! Bounded passage context for the model prompt.

use helpdesk_retrieval::SearchHit;

use crate::sources::clean_source;

/// The passages that made it into a prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextBlock {
    pub text: String,

    /// Passages included in full.
    pub included: usize,

    /// Passages shortened to whole sentences.
    pub trimmed: usize,

    /// Passages left out for lack of room.
    pub dropped: usize,
}

/// Build a context block of at most `budget_chars` characters.
///
/// Hits are taken in the order given. A passage that does not fit is cut
/// back to its leading whole sentences, or dropped when not even one
/// sentence fits. Later, shorter passages may still fill the remaining room.
pub fn build_context(hits: &[SearchHit], budget_chars: usize) -> ContextBlock {
    let mut block = ContextBlock::default();
    let mut used = 0usize;

    for hit in hits {
        let number = block.included + block.trimmed + 1;
        let header = format!(
            "[{number}] {}\n",
            clean_source(&hit.document.source_label, hit.document.title.as_deref())
        );
        let body = hit.document.text.trim();
        let fixed = header.chars().count() + 2;
        let room = budget_chars.saturating_sub(used).saturating_sub(fixed);

        let (text, trimmed) = if body.chars().count() <= room {
            (body, false)
        } else {
            match leading_sentences(body, room) {
                Some(prefix) => (prefix, true),
                None => {
                    block.dropped += 1;
                    continue;
                }
            }
        };

        block.text.push_str(&header);
        block.text.push_str(text);
        block.text.push_str("\n\n");
        used += fixed + text.chars().count();
        if trimmed {
            block.trimmed += 1;
        } else {
            block.included += 1;
        }
    }

    let trimmed_len = block.text.trim_end().len();
    block.text.truncate(trimmed_len);
    block
}

/// Longest prefix of `text` ending on a sentence boundary and no longer
/// than `max_chars` characters.
pub(crate) fn leading_sentences(text: &str, max_chars: usize) -> Option<&str> {
    let mut best = None;
    let mut chars = text.char_indices().enumerate().peekable();
    while let Some((count, (idx, c))) = chars.next() {
        if count >= max_chars {
            break;
        }
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().is_none_or(|(_, (_, next))| next.is_whitespace());
            if at_boundary {
                best = Some(&text[..idx + c.len_utf8()]);
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpdesk_vector_index::Document;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn hit(id: &str, text: &str) -> SearchHit {
        SearchHit {
            document: Arc::new(Document {
                id: id.to_string(),
                text: text.to_string(),
                source_label: format!("{id}.md"),
                title: None,
                embedding: vec![1.0],
                tenant_scope: "acme".to_string(),
            }),
            relevance_score: 0.9,
            rerank_score: Some(0.5),
        }
    }

    #[test]
    fn test_everything_fits() {
        let block = build_context(&[hit("a", "One."), hit("b", "Two.")], 1000);
        assert_eq!(block.text, "[1] A\nOne.\n\n[2] B\nTwo.");
        assert_eq!((block.included, block.trimmed, block.dropped), (2, 0, 0));
    }

    #[test]
    fn test_overflow_is_cut_at_sentence_end() {
        let long = "First sentence here. Second sentence is longer than the first one. Third.";
        let block = build_context(&[hit("villa", long)], 40);

        assert_eq!(block.text, "[1] Villa\nFirst sentence here.");
        assert_eq!(block.trimmed, 1);
        assert!(block.text.chars().count() <= 40);
    }

    #[test]
    fn test_unsplittable_passage_is_dropped_and_next_considered() {
        let hits = [
            hit("big", "A single enormous sentence without any terminal punctuation at all"),
            hit("small", "Short."),
        ];
        let block = build_context(&hits, 30);

        assert_eq!(block.text, "[1] Small\nShort.");
        assert_eq!((block.included, block.dropped), (1, 1));
    }

    #[test]
    fn test_decimal_point_is_not_a_sentence_end() {
        assert_eq!(leading_sentences("Costs 3.5 USD. More text.", 20), Some("Costs 3.5 USD."));
        assert_eq!(leading_sentences("Version 3.5 only", 20), None);
    }
}
