//! Naive fixed-size text chunking.
//!
//! Turns one long text into a sequence of overlapping [`Document`]s ready for ingestion.
//! Windows are counted in characters, not bytes, so multi-byte text never splits inside
//! a code point.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::document::{Document, Meta};
use crate::error::{IndexError, Result};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
static NON_ALNUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]+").expect("valid id regex"));

/// Collapse every whitespace run to a single space and trim the ends.
pub fn clean_text(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Turn an arbitrary label (a path, a URL) into an id prefix of `[A-Za-z0-9-]`.
pub fn sanitize_prefix(label: &str) -> String {
    NON_ALNUM
        .replace_all(label, "-")
        .trim_matches('-')
        .to_string()
}

/// Split `text` into windows of `size` characters, each starting `size - overlap`
/// characters after the previous one.
///
/// Chunks are named `u1`, `u2`, ... in order. Whitespace-only windows are dropped
/// without consuming a number.
///
/// # Errors
/// [`IndexError::InvalidArgument`] if `size` is zero or `overlap >= size`.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Result<Vec<Document>> {
    if size == 0 {
        return Err(IndexError::InvalidArgument("chunk size must be at least 1".into()));
    }
    if overlap >= size {
        return Err(IndexError::InvalidArgument(format!(
            "chunk overlap ({overlap}) must be smaller than chunk size ({size})"
        )));
    }

    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < n {
        let end = (start + size).min(n);
        let part: String = chars[start..end].iter().collect();
        if !part.trim().is_empty() {
            chunks.push(Document::new(format!("u{}", chunks.len() + 1), part));
        }
        if end == n {
            break;
        }
        start = end - overlap;
    }
    Ok(chunks)
}

/// Clean, chunk and label `text` for ingestion.
///
/// Each chunk id becomes `<prefix>-u<n>` and carries a copy of `meta`. The prefix is
/// used as given apart from leading and trailing `-`; pass labels such as paths or
/// URLs through [`sanitize_prefix`] first.
pub fn documents_from_text(
    text: &str,
    prefix: &str,
    meta: Option<Meta>,
    size: usize,
    overlap: usize,
) -> Result<Vec<Document>> {
    let prefix = prefix.trim_matches('-');
    let mut docs = chunk_text(&clean_text(text), size, overlap)?;
    for doc in &mut docs {
        doc.id = if prefix.is_empty() {
            doc.id.clone()
        } else {
            format!("{prefix}-{}", doc.id)
        };
        doc.meta = meta.clone();
    }
    Ok(docs)
}
