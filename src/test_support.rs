//! Small embedders shared by unit tests. None of them touch the network.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::embedder::Embedder;
use crate::error::{IndexError, Result};

/// Counts occurrences of each vocabulary word; other words are ignored.
pub struct VocabEmbedder {
    vocab: Vec<&'static str>,
}

impl VocabEmbedder {
    pub fn new(vocab: &[&'static str]) -> Self {
        Self {
            vocab: vocab.to_vec(),
        }
    }

    pub fn greek() -> Self {
        Self::new(&["alpha", "beta", "gamma", "delta", "epsilon"])
    }
}

impl Embedder for VocabEmbedder {
    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0; self.vocab.len()];
                for word in text
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                {
                    let word = word.to_lowercase();
                    if let Some(i) = self.vocab.iter().position(|w| *w == word) {
                        v[i] += 1.0;
                    }
                }
                v
            })
            .collect())
    }
}

/// Wraps another embedder and records how many batches it was asked for.
pub struct CountingEmbedder<E> {
    pub inner: E,
    pub calls: AtomicUsize,
}

impl<E> CountingEmbedder<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<E: Embedder> Embedder for CountingEmbedder<E> {
    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.encode(texts)
    }
}

/// Embedder backed by a closure, for shaping exact outputs.
pub struct FnEmbedder<F>(pub F);

impl<F> Embedder for FnEmbedder<F>
where
    F: Fn(&[&str]) -> Result<Vec<Vec<f32>>> + Send + Sync,
{
    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        (self.0)(texts)
    }
}

/// Always fails, like an unreachable model.
pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn encode(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Err(IndexError::Embedding("model unavailable".into()))
    }
}
