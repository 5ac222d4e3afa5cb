//! # Persistence
//!
//! Snapshots a [`VectorIndex`] to two artifacts in one directory:
//!
//! - `corpus.jsonl`: one JSON document per line, in corpus order.
//! - `embeddings.bin`: the row-major `(N, D)` `f32` matrix, bincode-encoded. Absent when
//!   the index is empty.
//!
//! ## Guarantees
//! - `save` is a full snapshot. Both artifacts are written to temporary files in the
//!   target directory first and renamed into place only after both writes succeeded, so
//!   a failed save leaves the previous artifacts as they were.
//! - Saving an empty index writes an empty corpus and deletes any stale matrix file.
//! - `load` reports a missing artifact as "nothing saved" rather than an error, and
//!   refuses (with [`IndexError::Integrity`]) a corpus whose record count differs from
//!   the matrix row count.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::document::Document;
use crate::error::{IndexError, Result};
use crate::vector_index::{EmbeddingMatrix, VectorIndex};

pub const CORPUS_FILE: &str = "corpus.jsonl";
pub const EMBEDDINGS_FILE: &str = "embeddings.bin";

const MATRIX_FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct MatrixFileRef<'a> {
    version: u32,
    rows: u64,
    dim: u64,
    data: &'a [f32],
}

#[derive(Deserialize)]
struct MatrixFile {
    version: u32,
    rows: u64,
    dim: u64,
    data: Vec<f32>,
}

/// Result of a successful save: `{"saved": "ok", "path": ..., "count": N}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveStatus {
    pub saved: &'static str,
    pub path: PathBuf,
    pub count: usize,
}

/// Result of a load: `{"loaded": "empty"}` or `{"loaded": "ok", "count": N}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "loaded", rename_all = "lowercase")]
pub enum LoadStatus {
    Empty,
    #[serde(rename = "ok")]
    Loaded { count: usize },
}

/// Result of a reset: `{"reset": "ok"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResetStatus {
    pub reset: &'static str,
}

/// Location of the two snapshot artifacts.
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn corpus_path(&self) -> PathBuf {
        self.dir.join(CORPUS_FILE)
    }

    pub fn embeddings_path(&self) -> PathBuf {
        self.dir.join(EMBEDDINGS_FILE)
    }

    /// Write a full snapshot of `index`, replacing whatever was there.
    ///
    /// # Errors
    /// [`IndexError::Storage`] on any I/O or encoding failure.
    pub fn save(&self, index: &VectorIndex) -> Result<SaveStatus> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| IndexError::storage("failed to create data directory", e))?;

        let corpus_tmp = self.write_corpus(index.documents())?;
        let matrix_tmp = if index.matrix().is_empty() {
            None
        } else {
            Some(self.write_matrix(index.matrix())?)
        };

        // Both artifacts are fully written; commit them.
        let embeddings_path = self.embeddings_path();
        match matrix_tmp {
            Some(tmp) => {
                tmp.persist(&embeddings_path)
                    .map_err(|e| IndexError::storage("failed to commit embeddings", e))?;
            }
            None => {
                if remove_if_exists(&embeddings_path)? {
                    debug!("Removed stale {}", embeddings_path.display());
                }
            }
        }
        corpus_tmp
            .persist(self.corpus_path())
            .map_err(|e| IndexError::storage("failed to commit corpus", e))?;

        info!("Saved {} documents to {}", index.len(), self.dir.display());
        Ok(SaveStatus {
            saved: "ok",
            path: self.dir.clone(),
            count: index.len(),
        })
    }

    /// Read a snapshot back.
    ///
    /// Returns `Ok(None)` when either artifact is missing.
    ///
    /// # Errors
    /// - [`IndexError::Storage`] if an artifact cannot be read or decoded.
    /// - [`IndexError::Integrity`] if record and row counts differ.
    pub fn load(&self) -> Result<Option<VectorIndex>> {
        let corpus_path = self.corpus_path();
        let embeddings_path = self.embeddings_path();
        if !corpus_path.exists() || !embeddings_path.exists() {
            info!("No complete snapshot in {}", self.dir.display());
            return Ok(None);
        }

        let documents = read_corpus(&corpus_path)?;
        let matrix = read_matrix(&embeddings_path)?;
        let index = VectorIndex::from_parts(documents, matrix).inspect_err(|e| {
            warn!("Refusing snapshot in {}: {e}", self.dir.display());
        })?;

        info!("Loaded {} documents from {}", index.len(), self.dir.display());
        Ok(Some(index))
    }

    /// Delete both artifacts. Missing files are fine.
    pub fn remove(&self) -> Result<()> {
        let removed_corpus = remove_if_exists(&self.corpus_path())?;
        let removed_embeddings = remove_if_exists(&self.embeddings_path())?;
        debug!(
            "Removed snapshot in {} (corpus: {removed_corpus}, embeddings: {removed_embeddings})",
            self.dir.display()
        );
        Ok(())
    }

    fn write_corpus(&self, documents: &[std::sync::Arc<Document>]) -> Result<NamedTempFile> {
        let mut tmp = NamedTempFile::new_in(&self.dir)
            .map_err(|e| IndexError::storage("failed to create temporary corpus file", e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            for doc in documents {
                serde_json::to_writer(&mut writer, doc.as_ref())
                    .map_err(|e| IndexError::storage("failed to write corpus record", e))?;
                writer
                    .write_all(b"\n")
                    .map_err(|e| IndexError::storage("failed to write corpus record", e))?;
            }
            writer
                .flush()
                .map_err(|e| IndexError::storage("failed to flush corpus", e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| IndexError::storage("failed to sync corpus", e))?;
        Ok(tmp)
    }

    fn write_matrix(&self, matrix: &EmbeddingMatrix) -> Result<NamedTempFile> {
        let mut tmp = NamedTempFile::new_in(&self.dir)
            .map_err(|e| IndexError::storage("failed to create temporary embeddings file", e))?;
        let file = MatrixFileRef {
            version: MATRIX_FORMAT_VERSION,
            rows: matrix.rows() as u64,
            dim: matrix.dim().unwrap_or(0) as u64,
            data: matrix.as_slice(),
        };
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            bincode::serde::encode_into_std_write(&file, &mut writer, bincode::config::standard())
                .map_err(|e| IndexError::storage("failed to encode embeddings", e))?;
            writer
                .flush()
                .map_err(|e| IndexError::storage("failed to flush embeddings", e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| IndexError::storage("failed to sync embeddings", e))?;
        Ok(tmp)
    }
}

fn read_corpus(path: &Path) -> Result<Vec<Document>> {
    let file = File::open(path).map_err(|e| IndexError::storage("failed to open corpus", e))?;
    let mut documents = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| IndexError::storage("failed to read corpus", e))?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: Document = serde_json::from_str(&line)
            .map_err(|e| IndexError::storage(&format!("corpus line {} is malformed", n + 1), e))?;
        documents.push(doc);
    }
    Ok(documents)
}

fn read_matrix(path: &Path) -> Result<EmbeddingMatrix> {
    let bytes = fs::read(path).map_err(|e| IndexError::storage("failed to read embeddings", e))?;
    let (file, used): (MatrixFile, usize) =
        bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
            .map_err(|e| IndexError::storage("embeddings file is corrupt", e))?;
    if used != bytes.len() {
        return Err(IndexError::Storage(format!(
            "embeddings file has {} trailing bytes",
            bytes.len() - used
        )));
    }
    if file.version != MATRIX_FORMAT_VERSION {
        return Err(IndexError::Storage(format!(
            "unsupported embeddings format version {}",
            file.version
        )));
    }
    let rows = usize::try_from(file.rows)
        .map_err(|e| IndexError::storage("embeddings row count out of range", e))?;
    let dim = usize::try_from(file.dim)
        .map_err(|e| IndexError::storage("embeddings dimension out of range", e))?;
    EmbeddingMatrix::from_raw(rows, dim, file.data)
}

fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(IndexError::storage(
            &format!("failed to remove {}", path.display()),
            e,
        )),
    }
}
