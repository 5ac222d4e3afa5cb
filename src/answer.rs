//! Turning the best retrieval hit into a user-facing answer.
//!
//! There is no language model behind this yet: the answer quotes the top context chunk
//! verbatim, or says that nothing has been ingested. Failures are folded into the answer
//! text so callers always get a well-formed [`Answer`].

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::vector_index::Hit;

pub const PROMPT_VERSION: &str = "v1-rag";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub model: String,
    pub prompt_version: &'static str,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub env: String,
}

/// Build the answer for `question` from the outcome of a top-1 retrieval.
pub fn compose(question: &str, outcome: Result<Vec<Hit>>, model: &str, env: &str) -> Answer {
    let answer = match outcome {
        Ok(hits) => match hits.first() {
            Some(hit) => format!(
                "[RAG v1 | {model}] score={:.3} • context={} :: {}",
                hit.score, hit.document.id, hit.document.text
            ),
            None => format!("[stub:{model}] No context yet. You asked: {question}"),
        },
        Err(e) => format!("[error] {}: {e}", e.kind()),
    };
    Answer {
        answer,
        model: model.to_string(),
        prompt_version: PROMPT_VERSION,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        env: env.to_string(),
    }
}
