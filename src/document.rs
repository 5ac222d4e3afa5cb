//! # Documents
//!
//! A [`Document`] is the unit of ingestion: a caller-assigned `id`, the `text` that gets
//! embedded, and optional free-form `meta` that the index carries around without looking
//! at it.
//!
//! ```rust
//! use afm_rag::document::{Document, parse_documents};
//!
//! let docs = parse_documents(r#"[{"id": "p1", "text": "alpha beta"}]"#).unwrap();
//! assert_eq!(docs[0], Document::new("p1", "alpha beta"));
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

/// String keys mapped to arbitrary JSON values (scalars, arrays, nested objects).
pub type Meta = serde_json::Map<String, serde_json::Value>;

/// One ingested document. Immutable once it is part of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Opaque identifier. Not required to be unique.
    pub id: String,
    /// The text that is embedded.
    pub text: String,
    /// Caller metadata, preserved through ingest, save and load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Parse documents from either a JSON array or JSON Lines.
///
/// Blank lines in JSON Lines input are skipped. A record without `id` or `text`, or any
/// other malformed input, is rejected as [`IndexError::InvalidArgument`].
pub fn parse_documents(input: &str) -> Result<Vec<Document>> {
    let trimmed = input.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map_err(|e| IndexError::InvalidArgument(format!("malformed document array: {e}")));
    }

    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).map_err(|e| {
                IndexError::InvalidArgument(format!("malformed document on line {}: {e}", n + 1))
            })
        })
        .collect()
}
