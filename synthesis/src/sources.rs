//! Human-readable source names.
//!
//! Storage labels look like `uploads/tmp3f9a2c_zanzibar-beach_villas.pdf`.
//! Users see `Zanzibar Beach Villas`.

use std::collections::HashSet;

use helpdesk_retrieval::SearchHit;

/// Clean one source. A usable title wins over the storage label.
pub fn clean_source(source_label: &str, title: Option<&str>) -> String {
    if let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) {
        if !title.contains(['/', '\\']) {
            return collapse_whitespace(title);
        }
        return humanize(title);
    }
    humanize(source_label)
}

/// Cleaned, de-duplicated source names in hit order.
pub fn clean_sources(hits: &[SearchHit]) -> Vec<String> {
    let mut seen = HashSet::new();
    hits.iter()
        .map(|hit| clean_source(&hit.document.source_label, hit.document.title.as_deref()))
        .filter(|name| seen.insert(name.to_lowercase()))
        .collect()
}

fn humanize(label: &str) -> String {
    let segment = label
        .trim()
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let stem = match segment.rfind('.') {
        Some(dot) if dot > 0 => &segment[..dot],
        _ => segment,
    };
    let stem = strip_temp_prefix(stem);

    let words: Vec<String> = stem
        .split(|c: char| c == '_' || c == '-' || c == '.' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(title_case)
        .collect();

    if words.is_empty() {
        "Document".to_string()
    } else {
        words.join(" ")
    }
}

/// Drop a `tmpXXXXXX_` style prefix left by upload temp files.
fn strip_temp_prefix(stem: &str) -> &str {
    let Some(rest) = stem.strip_prefix("tmp") else {
        return stem;
    };
    let Some(sep) = rest.find(['_', '-']) else {
        return stem;
    };
    let token = &rest[..sep];
    let remainder = &rest[sep + 1..];
    if token.len() >= 4 && token.chars().all(|c| c.is_ascii_alphanumeric()) && !remainder.is_empty()
    {
        remainder
    } else {
        stem
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
