//! # Error kinds
//!
//! Every fallible index operation returns [`IndexError`]. The set of variants is
//! closed: callers branch on [`IndexError::kind`] instead of parsing messages.
//!
//! | Variant | When |
//! |---|---|
//! | [`IndexError::Embedding`] | the embedder failed, timed out, or returned vectors of the wrong shape |
//! | [`IndexError::Integrity`] | a snapshot on disk has a different number of records and rows |
//! | [`IndexError::Storage`] | reading or writing an artifact failed, or an artifact is corrupt |
//! | [`IndexError::InvalidArgument`] | a request was rejected before touching any state |
//!
//! None of these leave the in-memory index half-updated.

use serde::Serialize;

/// Failure category of an [`IndexError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EmbeddingFailure,
    IntegrityFailure,
    StorageFailure,
    InvalidArgument,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::EmbeddingFailure => "EmbeddingFailure",
            ErrorKind::IntegrityFailure => "IntegrityFailure",
            ErrorKind::StorageFailure => "StorageFailure",
            ErrorKind::InvalidArgument => "InvalidArgument",
        };
        f.write_str(name)
    }
}

/// Error type for index, persistence and embedding operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("corpus/embedding size mismatch: {records} records but {rows} embedding rows")]
    Integrity { records: usize, rows: usize },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl IndexError {
    /// The failure category, for callers that only care which kind of thing went wrong.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IndexError::Embedding(_) => ErrorKind::EmbeddingFailure,
            IndexError::Integrity { .. } => ErrorKind::IntegrityFailure,
            IndexError::Storage(_) => ErrorKind::StorageFailure,
            IndexError::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }

    pub(crate) fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        IndexError::Storage(format!("{context}: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
