//! # VectorIndex
//!
//! The in-memory similarity index: an ordered corpus of [`Document`]s and a parallel
//! [`EmbeddingMatrix`] with one unit-length row per document.
//!
//! ## Invariants
//! - `corpus.len() == matrix.rows()` whenever a method returns.
//! - Row *i* is the embedding of `corpus[i]`; both only ever grow by appending, together.
//! - Every row is divided by its L2 norm (plus epsilon) before it is stored.
//! - The dimension is fixed by the first non-empty batch. Later batches of another
//!   dimension are rejected as [`IndexError::Embedding`].
//!
//! ## Scoring
//! Retrieval is brute force: the normalized query is dotted against every row (cosine
//! similarity, since both sides are unit length), scores are stable-sorted descending and
//! ties keep ascending corpus order.
//!
//! ## Quick Example
//! ```rust
//! use afm_rag::document::Document;
//! use afm_rag::embedder::FeatureHashEmbedder;
//! use afm_rag::vector_index::VectorIndex;
//!
//! # fn main() -> Result<(), afm_rag::error::IndexError> {
//! let embedder = FeatureHashEmbedder::new(256)?;
//! let mut index = VectorIndex::new();
//! index.ingest(&embedder, vec![Document::new("p1", "Rust is great!")])?;
//! let hits = index.retrieve(&embedder, "rust is great", 1)?;
//! assert_eq!(hits[0].document.id, "p1");
//! # Ok(()) }
//! ```

use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::document::Document;
use crate::embedder::Embedder;
use crate::error::{IndexError, Result};
use crate::normalize::{dot, normalize_rows};

/// Row-major `(rows, dim)` matrix of `f32` embeddings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingMatrix {
    dim: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a matrix from its raw row-major buffer.
    ///
    /// # Errors
    /// [`IndexError::Storage`] if `data` does not hold exactly `rows * dim` values, or
    /// holds a NaN or infinity.
    pub fn from_raw(rows: usize, dim: usize, data: Vec<f32>) -> Result<Self> {
        if rows.checked_mul(dim) != Some(data.len()) || (rows > 0 && dim == 0) {
            return Err(IndexError::Storage(format!(
                "embedding buffer holds {} values, expected {rows} x {dim}",
                data.len()
            )));
        }
        if let Some(pos) = data.iter().position(|x| !x.is_finite()) {
            return Err(IndexError::Storage(format!(
                "embedding row {} holds a non-finite value",
                pos / dim
            )));
        }
        if rows == 0 {
            return Ok(Self::new());
        }
        Ok(Self { dim, data })
    }

    pub fn rows(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    /// Row length, or `None` while the matrix is empty.
    pub fn dim(&self) -> Option<usize> {
        (self.rows() > 0).then_some(self.dim)
    }

    pub fn is_empty(&self) -> bool {
        self.rows() == 0
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    /// The row-major buffer.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Dot product of `query` with every row, in row order.
    pub fn scores(&self, query: &[f32]) -> Vec<f32> {
        if self.is_empty() {
            return Vec::new();
        }
        self.data
            .par_chunks_exact(self.dim)
            .map(|row| dot(row, query))
            .collect()
    }

    fn push_rows(&mut self, rows: Vec<Vec<f32>>) {
        if let Some(first) = rows.first() {
            if self.is_empty() {
                self.dim = first.len();
                self.data.clear();
            }
        }
        self.data.reserve(rows.len() * self.dim);
        for row in rows {
            self.data.extend_from_slice(&row);
        }
    }

    fn clear(&mut self) {
        self.dim = 0;
        self.data.clear();
    }
}

/// One retrieval result: the cosine score and the ingested document it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct Hit {
    pub score: f32,
    pub document: Arc<Document>,
}

/// Corpus plus embedding matrix, kept in lockstep.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    corpus: Vec<Arc<Document>>,
    matrix: EmbeddingMatrix,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble an index from a deserialized corpus and matrix.
    ///
    /// # Errors
    /// [`IndexError::Integrity`] when the record count and row count differ.
    pub fn from_parts(documents: Vec<Document>, matrix: EmbeddingMatrix) -> Result<Self> {
        if documents.len() != matrix.rows() {
            return Err(IndexError::Integrity {
                records: documents.len(),
                rows: matrix.rows(),
            });
        }
        Ok(Self {
            corpus: documents.into_iter().map(Arc::new).collect(),
            matrix,
        })
    }

    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }

    /// Embedding dimension, once anything has been ingested.
    pub fn dimension(&self) -> Option<usize> {
        self.matrix.dim()
    }

    pub fn documents(&self) -> &[Arc<Document>] {
        &self.corpus
    }

    pub fn matrix(&self) -> &EmbeddingMatrix {
        &self.matrix
    }

    /// Embed `documents` in one batch and append them.
    ///
    /// An empty batch returns `Ok(0)` without calling the embedder.
    ///
    /// # Errors
    /// [`IndexError::Embedding`] if the embedder fails or returns vectors of the wrong
    /// count, length or dimension. The index is unchanged on error.
    pub fn ingest(&mut self, embedder: &dyn Embedder, documents: Vec<Document>) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        let texts: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
        let raw = embedder.encode(&texts)?;
        let rows = prepare_batch(documents.len(), raw)?;
        self.append(documents, rows)
    }

    /// Append documents with already normalized rows from [`prepare_batch`].
    pub(crate) fn append(
        &mut self,
        documents: Vec<Document>,
        rows: Vec<Vec<f32>>,
    ) -> Result<usize> {
        if documents.len() != rows.len() {
            return Err(IndexError::Embedding(format!(
                "{} documents but {} embeddings",
                documents.len(),
                rows.len()
            )));
        }
        if let Some(first) = rows.first() {
            self.check_dimension(first.len())?;
        }

        let count = documents.len();
        self.corpus.extend(documents.into_iter().map(Arc::new));
        self.matrix.push_rows(rows);
        debug!("Appended {count} documents, index now holds {}", self.len());
        Ok(count)
    }

    /// Embed `query` and return up to `top_k` best matches, best first.
    ///
    /// # Errors
    /// - [`IndexError::InvalidArgument`] if `top_k` is zero.
    /// - [`IndexError::Embedding`] if the query cannot be embedded at the index dimension.
    pub fn retrieve(&self, embedder: &dyn Embedder, query: &str, top_k: usize) -> Result<Vec<Hit>> {
        check_top_k(top_k)?;
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let raw = embedder.encode(&[query])?;
        let q = prepare_query(raw)?;
        self.rank(&q, top_k)
    }

    /// Rank every document against a normalized query vector.
    pub fn rank(&self, query: &[f32], top_k: usize) -> Result<Vec<Hit>> {
        check_top_k(top_k)?;
        if self.is_empty() {
            return Ok(Vec::new());
        }
        self.check_dimension(query.len())?;

        // -0.0 is folded into 0.0 so total_cmp treats them as a tie.
        let scores: Vec<f32> = self
            .matrix
            .scores(query)
            .into_iter()
            .map(|s| if s == 0.0 { 0.0 } else { s })
            .collect();
        let mut order: Vec<usize> = (0..scores.len()).collect();
        // Stable: equal scores keep ascending corpus order.
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

        Ok(order
            .into_iter()
            .take(top_k)
            .map(|i| Hit {
                score: scores[i].clamp(-1.0, 1.0),
                document: Arc::clone(&self.corpus[i]),
            })
            .collect())
    }

    pub fn clear(&mut self) {
        self.corpus.clear();
        self.matrix.clear();
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        match self.dimension() {
            Some(expected) if expected != actual => Err(IndexError::Embedding(format!(
                "dimension mismatch: index holds {expected}-d vectors, got {actual}-d"
            ))),
            _ => Ok(()),
        }
    }
}

pub(crate) fn check_top_k(top_k: usize) -> Result<()> {
    if top_k == 0 {
        return Err(IndexError::InvalidArgument("top_k must be at least 1".into()));
    }
    Ok(())
}

/// Validate a raw embedder batch and normalize it.
///
/// Checks one vector per input, a single non-zero length, and finite components.
pub(crate) fn prepare_batch(expected: usize, raw: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>> {
    if raw.len() != expected {
        return Err(IndexError::Embedding(format!(
            "embedder returned {} vectors for {expected} texts",
            raw.len()
        )));
    }
    let Some(dim) = raw.first().map(Vec::len) else {
        return Ok(raw);
    };
    if dim == 0 {
        return Err(IndexError::Embedding("embedder returned empty vectors".into()));
    }
    if let Some(bad) = raw.iter().find(|v| v.len() != dim) {
        return Err(IndexError::Embedding(format!(
            "embedder returned vectors of mixed length ({dim} and {})",
            bad.len()
        )));
    }
    if raw.iter().flatten().any(|x| !x.is_finite()) {
        return Err(IndexError::Embedding(
            "embedder returned non-finite values".into(),
        ));
    }
    Ok(normalize_rows(raw))
}

pub(crate) fn prepare_query(raw: Vec<Vec<f32>>) -> Result<Vec<f32>> {
    let mut rows = prepare_batch(1, raw)?;
    Ok(rows.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::l2_norm;
    use crate::test_support::{CountingEmbedder, FailingEmbedder, FnEmbedder, VocabEmbedder};

    fn greek_docs() -> Vec<Document> {
        vec![
            Document::new("p1", "alpha beta"),
            Document::new("p2", "gamma delta epsilon"),
        ]
    }

    fn assert_lockstep(index: &VectorIndex) {
        assert_eq!(index.len(), index.matrix().rows());
    }

    #[test]
    fn test_retrieve_delta_finds_p2() {
        let embedder = VocabEmbedder::greek();
        let mut index = VectorIndex::new();
        assert_eq!(index.ingest(&embedder, greek_docs()).unwrap(), 2);

        let hits = index.retrieve(&embedder, "delta?", 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.id, "p2");
        assert!((-1.0..=1.0).contains(&hits[0].score));
    }

    #[test]
    fn test_empty_ingest_is_noop_without_embedding() {
        let embedder = CountingEmbedder::new(VocabEmbedder::greek());
        let mut index = VectorIndex::new();
        assert_eq!(index.ingest(&embedder, Vec::new()).unwrap(), 0);
        assert_eq!(embedder.calls(), 0);
        assert!(index.is_empty());
        assert_lockstep(&index);
    }

    #[test]
    fn test_ingest_embeds_whole_batch_in_one_call() {
        let embedder = CountingEmbedder::new(VocabEmbedder::greek());
        let mut index = VectorIndex::new();
        index.ingest(&embedder, greek_docs()).unwrap();
        assert_eq!(embedder.calls(), 1);
    }

    #[test]
    fn test_rows_are_unit_length_and_in_lockstep() {
        let embedder = VocabEmbedder::greek();
        let mut index = VectorIndex::new();
        index.ingest(&embedder, greek_docs()).unwrap();
        index
            .ingest(&embedder, vec![Document::new("p3", "alpha alpha alpha delta")])
            .unwrap();

        assert_eq!(index.len(), 3);
        assert_lockstep(&index);
        assert_eq!(index.dimension(), Some(5));
        for i in 0..index.len() {
            assert!((l2_norm(index.matrix().row(i)) - 1.0).abs() < 1e-6);
        }
        let ids: Vec<&str> = index.documents().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);
    }

    #[test]
    fn test_dimension_mismatch_leaves_index_untouched() {
        let mut index = VectorIndex::new();
        index.ingest(&VocabEmbedder::greek(), greek_docs()).unwrap();

        let wider = VocabEmbedder::new(&["alpha", "beta", "gamma", "delta", "epsilon", "zeta"]);
        let err = index
            .ingest(&wider, vec![Document::new("p3", "zeta")])
            .unwrap_err();
        assert!(matches!(err, IndexError::Embedding(_)));
        assert_eq!(index.len(), 2);
        assert_lockstep(&index);

        let err = index.retrieve(&wider, "zeta", 1).unwrap_err();
        assert!(matches!(err, IndexError::Embedding(_)));
    }

    #[test]
    fn test_embedder_failure_is_atomic() {
        let mut index = VectorIndex::new();
        index.ingest(&VocabEmbedder::greek(), greek_docs()).unwrap();
        let before: Vec<f32> = index.matrix().as_slice().to_vec();

        let err = index
            .ingest(&FailingEmbedder, vec![Document::new("p3", "gamma")])
            .unwrap_err();
        assert!(matches!(err, IndexError::Embedding(_)));
        assert_eq!(index.len(), 2);
        assert_eq!(index.matrix().as_slice(), before.as_slice());
    }

    #[test]
    fn test_short_batch_is_rejected() {
        let short = FnEmbedder(|_: &[&str]| -> Result<Vec<Vec<f32>>> { Ok(vec![vec![1.0, 0.0]]) });
        let mut index = VectorIndex::new();
        let err = index.ingest(&short, greek_docs()).unwrap_err();
        assert!(matches!(err, IndexError::Embedding(_)));
        assert!(index.is_empty());
        assert_lockstep(&index);
    }

    #[test]
    fn test_non_finite_and_ragged_batches_are_rejected() {
        let nan = FnEmbedder(|texts: &[&str]| -> Result<Vec<Vec<f32>>> {
            Ok(vec![vec![f32::NAN, 1.0]; texts.len()])
        });
        let ragged = FnEmbedder(|_: &[&str]| -> Result<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0, 0.0], vec![1.0]])
        });
        let mut index = VectorIndex::new();
        assert!(matches!(
            index.ingest(&nan, greek_docs()),
            Err(IndexError::Embedding(_))
        ));
        assert!(matches!(
            index.ingest(&ragged, greek_docs()),
            Err(IndexError::Embedding(_))
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn test_retrieve_on_empty_index_is_empty() {
        let embedder = CountingEmbedder::new(VocabEmbedder::greek());
        let index = VectorIndex::new();
        assert!(index.retrieve(&embedder, "anything", 5).unwrap().is_empty());
        assert_eq!(embedder.calls(), 0);
    }

    #[test]
    fn test_zero_top_k_is_invalid() {
        let embedder = VocabEmbedder::greek();
        let mut index = VectorIndex::new();
        index.ingest(&embedder, greek_docs()).unwrap();
        assert!(matches!(
            index.retrieve(&embedder, "alpha", 0),
            Err(IndexError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_top_k_larger_than_corpus_returns_everything() {
        let embedder = VocabEmbedder::greek();
        let mut index = VectorIndex::new();
        index.ingest(&embedder, greek_docs()).unwrap();
        assert_eq!(index.retrieve(&embedder, "alpha", 10).unwrap().len(), 2);
    }

    #[test]
    fn test_ties_keep_ingestion_order() {
        let embedder = VocabEmbedder::greek();
        let mut index = VectorIndex::new();
        index
            .ingest(
                &embedder,
                vec![
                    Document::new("a", "beta"),
                    Document::new("t1", "gamma"),
                    Document::new("b", "alpha"),
                    Document::new("t2", "gamma"),
                    Document::new("t3", "gamma"),
                ],
            )
            .unwrap();

        let hits = index.retrieve(&embedder, "gamma", 5).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.document.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2", "t3", "a", "b"]);
    }

    #[test]
    fn test_ranking_is_descending_and_deterministic() {
        let embedder = VocabEmbedder::greek();
        let mut index = VectorIndex::new();
        index
            .ingest(
                &embedder,
                vec![
                    Document::new("d0", "alpha"),
                    Document::new("d1", "alpha beta gamma"),
                    Document::new("d2", "alpha alpha beta"),
                    Document::new("d3", "epsilon"),
                    Document::new("d4", "beta"),
                ],
            )
            .unwrap();

        let first = index.retrieve(&embedder, "alpha beta", 5).unwrap();
        for pair in first.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        for _ in 0..5 {
            let again = index.retrieve(&embedder, "alpha beta", 5).unwrap();
            let a: Vec<(&str, f32)> =
                first.iter().map(|h| (h.document.id.as_str(), h.score)).collect();
            let b: Vec<(&str, f32)> =
                again.iter().map(|h| (h.document.id.as_str(), h.score)).collect();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_hits_share_the_ingested_document() {
        let embedder = VocabEmbedder::greek();
        let mut index = VectorIndex::new();
        index.ingest(&embedder, greek_docs()).unwrap();
        let hits = index.retrieve(&embedder, "alpha", 1).unwrap();
        assert!(Arc::ptr_eq(&hits[0].document, &index.documents()[0]));
    }

    #[test]
    fn test_scores_stay_within_cosine_bounds() {
        let embedder = FnEmbedder(|texts: &[&str]| -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| if t.starts_with('-') { vec![-3.0, -4.0] } else { vec![3.0, 4.0] })
                .collect())
        });
        let mut index = VectorIndex::new();
        index
            .ingest(&embedder, vec![Document::new("same", "x"), Document::new("opposite", "-x")])
            .unwrap();
        let hits = index.retrieve(&embedder, "q", 2).unwrap();
        assert_eq!(hits[0].document.id, "same");
        assert!(hits[0].score <= 1.0 && hits[0].score > 0.999);
        assert!(hits[1].score >= -1.0 && hits[1].score < -0.999);
    }

    #[test]
    fn test_from_parts_checks_counts() {
        let matrix = EmbeddingMatrix::from_raw(2, 2, vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let docs = vec![
            Document::new("a", "a"),
            Document::new("b", "b"),
            Document::new("c", "c"),
        ];
        match VectorIndex::from_parts(docs, matrix) {
            Err(IndexError::Integrity { records, rows }) => {
                assert_eq!((records, rows), (3, 2));
            }
            other => panic!("expected integrity failure, got {other:?}"),
        }
    }

    #[test]
    fn test_matrix_from_raw_rejects_bad_buffer() {
        assert!(matches!(
            EmbeddingMatrix::from_raw(2, 3, vec![0.0; 5]),
            Err(IndexError::Storage(_))
        ));
        assert!(EmbeddingMatrix::from_raw(0, 0, Vec::new()).unwrap().is_empty());
        assert!(matches!(
            EmbeddingMatrix::from_raw(2, 2, vec![1.0, 0.0, f32::NAN, 1.0]),
            Err(IndexError::Storage(_))
        ));
        assert!(matches!(
            EmbeddingMatrix::from_raw(1, 2, vec![f32::INFINITY, 0.0]),
            Err(IndexError::Storage(_))
        ));
    }

    #[test]
    fn test_huge_vectors_still_match_themselves() {
        let embedder = FnEmbedder(|texts: &[&str]| -> Result<Vec<Vec<f32>>> {
            Ok(vec![vec![3e19, 4e19]; texts.len()])
        });
        let mut index = VectorIndex::new();
        index.ingest(&embedder, vec![Document::new("big", "x")]).unwrap();
        let hits = index.retrieve(&embedder, "x", 1).unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_signed_zero_scores_tie_in_corpus_order() {
        let matrix = EmbeddingMatrix::from_raw(3, 2, vec![-0.0, 1.0, 0.0, 1.0, 1.0, 0.0]).unwrap();
        let docs = vec![
            Document::new("neg", "a"),
            Document::new("pos", "b"),
            Document::new("hit", "c"),
        ];
        let index = VectorIndex::from_parts(docs, matrix).unwrap();
        // Rows 0 and 1 both score zero, with signs that may differ.
        let hits = index.rank(&[1.0, -0.0], 3).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.document.id.as_str()).collect();
        assert_eq!(ids, vec!["hit", "neg", "pos"]);
    }

    #[test]
    fn test_clear_resets_dimension() {
        let mut index = VectorIndex::new();
        index.ingest(&VocabEmbedder::greek(), greek_docs()).unwrap();
        index.clear();
        assert!(index.is_empty());
        assert_eq!(index.dimension(), None);
        assert_lockstep(&index);

        let wider = VocabEmbedder::new(&["alpha", "beta", "gamma", "delta", "epsilon", "zeta"]);
        index.ingest(&wider, greek_docs()).unwrap();
        assert_eq!(index.dimension(), Some(6));
    }
}
