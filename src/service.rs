//! # RagService
//!
//! The shared, async front door to one [`VectorIndex`] and its on-disk snapshot.
//!
//! The index sits behind an `Arc<RwLock<_>>`. Embedding, which is the slow part, runs on
//! the blocking pool *before* any lock is taken; only the final append or ranking step
//! holds the lock. Concurrent readers see either the state before an ingest or the state
//! after it, never a corpus and matrix of different lengths.
//!
//! Disk operations take the same lock for their whole duration: `save` reads under it,
//! `load` and `reset` write under it. One of them never observes another half done.
//!
//! When an embed timeout is configured, an embedder call that overruns it fails with
//! [`IndexError::Embedding`] and nothing is appended.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::task;
use tracing::{debug, info};

use crate::answer::{self, Answer};
use crate::chunker;
use crate::config::RagConfig;
use crate::document::{Document, Meta, parse_documents};
use crate::embedder::{self, Embedder};
use crate::error::{IndexError, Result};
use crate::persistence::{IndexStore, LoadStatus, ResetStatus, SaveStatus};
use crate::vector_index::{Hit, VectorIndex, check_top_k, prepare_batch, prepare_query};

/// `{"documents": N, "dimension": D | null, "data_dir": ...}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub documents: usize,
    pub dimension: Option<usize>,
    pub data_dir: PathBuf,
}

pub struct RagService {
    index: Arc<RwLock<VectorIndex>>,
    embedder: Arc<dyn Embedder>,
    store: IndexStore,
    embed_timeout: Option<Duration>,
    model_name: String,
    app_env: String,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RagService {
    /// An empty service with default labels and chunking and no embed timeout.
    pub fn new(embedder: Arc<dyn Embedder>, store: IndexStore) -> Self {
        let defaults = RagConfig::default();
        Self {
            index: Arc::new(RwLock::new(VectorIndex::new())),
            embedder,
            store,
            embed_timeout: None,
            model_name: defaults.model_name,
            app_env: defaults.app_env,
            chunk_size: defaults.chunk_size,
            chunk_overlap: defaults.chunk_overlap,
        }
    }

    /// Build the embedder named in `config` and an empty index over `config.data_dir`.
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        let embedder = embedder::from_config(config)?;
        Ok(Self::with_config(embedder, config))
    }

    /// Like [`RagService::from_config`] but with a caller-supplied embedder.
    pub fn with_config(embedder: Arc<dyn Embedder>, config: &RagConfig) -> Self {
        Self {
            embed_timeout: config.embed_timeout(),
            model_name: config.model_name.clone(),
            app_env: config.app_env.clone(),
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            ..Self::new(embedder, IndexStore::new(&config.data_dir))
        }
    }

    pub fn with_embed_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.embed_timeout = timeout;
        self
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    pub fn stats(&self) -> Stats {
        let index = self.index.read();
        Stats {
            documents: index.len(),
            dimension: index.dimension(),
            data_dir: self.store.dir().to_path_buf(),
        }
    }

    /// Run `f` against a consistent view of the index.
    pub fn inspect<R>(&self, f: impl FnOnce(&VectorIndex) -> R) -> R {
        f(&self.index.read())
    }

    /// Embed and append `documents`. Returns how many were added.
    ///
    /// An empty batch is a no-op and never reaches the embedder.
    pub async fn ingest(&self, documents: Vec<Document>) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let raw = self.embed(texts).await?;
        let rows = prepare_batch(documents.len(), raw)?;

        let mut index = self.index.write();
        let added = index.append(documents, rows)?;
        info!("Ingested {added} documents ({} total)", index.len());
        Ok(added)
    }

    /// Clean, chunk and ingest a long text. Chunk ids are `<prefix>-u<n>`.
    pub async fn ingest_text(&self, text: &str, prefix: &str, meta: Option<Meta>) -> Result<usize> {
        let docs =
            chunker::documents_from_text(text, prefix, meta, self.chunk_size, self.chunk_overlap)?;
        debug!("Split text into {} chunks", docs.len());
        self.ingest(docs).await
    }

    /// Ingest a JSON array or JSON Lines file of documents.
    pub async fn ingest_file(&self, path: &Path) -> Result<usize> {
        let content = read_input(path).await?;
        let docs = parse_documents(&content)?;
        self.ingest(docs).await
    }

    /// Chunk and ingest a plain-text file, tagging every chunk with `meta.source_path`.
    ///
    /// Without an explicit prefix, ids are prefixed with the path reduced to
    /// `[A-Za-z0-9-]`.
    pub async fn ingest_text_file(&self, path: &Path, prefix: Option<&str>) -> Result<usize> {
        let text = read_input(path).await?;
        let label = path.to_string_lossy();
        let prefix = match prefix {
            Some(prefix) => prefix.to_string(),
            None => chunker::sanitize_prefix(&label),
        };
        let mut meta = Meta::new();
        meta.insert("source_path".into(), Value::String(label.to_string()));
        self.ingest_text(&text, &prefix, Some(meta)).await
    }

    /// Up to `top_k` best matches for `query`, best first.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Hit>> {
        check_top_k(top_k)?;
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let raw = self.embed(vec![query.to_string()]).await?;
        let q = prepare_query(raw)?;
        let hits = self.index.read().rank(&q, top_k)?;
        debug!("Retrieved {} hits for top_k={top_k}", hits.len());
        Ok(hits)
    }

    /// Answer `question` from the single best hit. Never fails; errors become answer text.
    pub async fn answer(&self, question: &str) -> Answer {
        let outcome = self.retrieve(question, 1).await;
        answer::compose(question, outcome, &self.model_name, &self.app_env)
    }

    /// Snapshot the current index to disk.
    pub async fn save(&self) -> Result<SaveStatus> {
        let index = Arc::clone(&self.index);
        let store = self.store.clone();
        task::spawn_blocking(move || store.save(&index.read()))
            .await
            .map_err(|e| IndexError::storage("save task failed", e))?
    }

    /// Replace the in-memory index with the saved snapshot.
    ///
    /// A missing snapshot reports [`LoadStatus::Empty`] and leaves the index as it was.
    /// So does any error. The write lock is held while the artifacts are read, so a
    /// concurrent `save` or `reset` runs entirely before or entirely after the load.
    pub async fn load(&self) -> Result<LoadStatus> {
        let index = Arc::clone(&self.index);
        let store = self.store.clone();
        task::spawn_blocking(move || -> Result<LoadStatus> {
            let mut index = index.write();
            match store.load()? {
                Some(snapshot) => {
                    let count = snapshot.len();
                    *index = snapshot;
                    Ok(LoadStatus::Loaded { count })
                }
                None => Ok(LoadStatus::Empty),
            }
        })
        .await
        .map_err(|e| IndexError::storage("load task failed", e))?
    }

    /// Delete the snapshot, then empty the index.
    pub async fn reset(&self) -> Result<ResetStatus> {
        let index = Arc::clone(&self.index);
        let store = self.store.clone();
        task::spawn_blocking(move || -> Result<ResetStatus> {
            let mut index = index.write();
            store.remove()?;
            index.clear();
            info!("Reset index in {}", store.dir().display());
            Ok(ResetStatus { reset: "ok" })
        })
        .await
        .map_err(|e| IndexError::storage("reset task failed", e))?
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let embedder = Arc::clone(&self.embedder);
        let handle = task::spawn_blocking(move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            embedder.encode(&refs)
        });

        let joined = match self.embed_timeout {
            Some(limit) => tokio::time::timeout(limit, handle).await.map_err(|_| {
                IndexError::Embedding(format!("embedder timed out after {limit:?}"))
            })?,
            None => handle.await,
        };
        joined.map_err(|e| IndexError::Embedding(format!("embedder task failed: {e}")))?
    }
}

async fn read_input(path: &Path) -> Result<String> {
    let owned = path.to_path_buf();
    task::spawn_blocking(move || fs::read_to_string(&owned))
        .await
        .map_err(|e| IndexError::storage("read task failed", e))?
        .map_err(|e| IndexError::InvalidArgument(format!("cannot read {}: {e}", path.display())))
}
