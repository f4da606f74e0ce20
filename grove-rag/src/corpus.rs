//! The corpus: vector index and metadata store kept in lockstep.
//!
//! [`Corpus`] is the only type that mutates both collections, and it does so
//! through a single [`append`](Corpus::append) that validates everything
//! before touching either side. Persistence writes the pair into one
//! directory and refuses to load a pair that disagrees.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{error, info};

use crate::document::MetadataRecord;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::metadata::MetadataStore;

/// File holding the serialized vector index.
pub const VECTORS_FILE: &str = "vectors.bin";
/// File holding metadata records and the integrity manifest.
pub const METADATA_FILE: &str = "metadata.json";
const METADATA_FORMAT_VERSION: u32 = 1;

/// Vectors, metadata and the embedding model that produced the vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct Corpus {
    embedding_model: String,
    index: VectorIndex,
    metadata: MetadataStore,
}

/// Summary counts for a corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorpusStats {
    /// Number of indexed segments.
    pub segment_count: usize,
    /// Vector dimension, once fixed.
    pub dimension: Option<usize>,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Segment count per source document.
    pub segments_per_source: BTreeMap<String, usize>,
}

#[derive(Serialize, Deserialize)]
struct MetadataFile {
    format_version: u32,
    embedding_model: String,
    dimension: Option<usize>,
    record_count: usize,
    vectors_sha256: String,
    records: MetadataStore,
}

impl Corpus {
    /// Create an empty corpus for vectors produced by `embedding_model`.
    pub fn new(embedding_model: impl Into<String>) -> Self {
        Self {
            embedding_model: embedding_model.into(),
            index: VectorIndex::new(),
            metadata: MetadataStore::new(),
        }
    }

    /// The embedding model every vector in this corpus came from.
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the corpus holds no segments.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Vector dimension, once fixed.
    pub fn dimension(&self) -> Option<usize> {
        self.index.dimension()
    }

    /// Read-only access to the vector index.
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Read-only access to the metadata store.
    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    /// The metadata record at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Inconsistent`] if `position` has no record.
    pub fn record(&self, position: usize) -> Result<&MetadataRecord> {
        self.metadata.get(position).ok_or_else(|| {
            error!(position, vectors = self.index.len(), records = self.metadata.len(), "missing metadata record");
            RagError::Inconsistent { vectors: self.index.len(), records: self.metadata.len() }
        })
    }

    /// Append vectors with their records.
    ///
    /// Both inputs are validated before either collection changes, so a
    /// failed append leaves the corpus untouched.
    ///
    /// # Errors
    ///
    /// - [`RagError::Inconsistent`] if the two inputs differ in length
    /// - [`RagError::DimensionMismatch`] if a vector does not fit the index
    pub fn append(&mut self, vectors: Vec<Vec<f32>>, records: Vec<MetadataRecord>) -> Result<()> {
        if vectors.len() != records.len() {
            return Err(RagError::Inconsistent { vectors: vectors.len(), records: records.len() });
        }
        self.index.check(&vectors)?;
        self.index.add(&vectors)?;
        self.metadata.extend(records);
        self.verify()
    }

    /// Check that index and metadata have the same length.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Inconsistent`] on divergence.
    pub fn verify(&self) -> Result<()> {
        if self.index.len() != self.metadata.len() {
            return Err(RagError::Inconsistent {
                vectors: self.index.len(),
                records: self.metadata.len(),
            });
        }
        Ok(())
    }

    /// Summary counts, e.g. for a status display.
    pub fn stats(&self) -> CorpusStats {
        let mut segments_per_source = BTreeMap::new();
        for record in self.metadata.iter() {
            *segments_per_source.entry(record.source_id.clone()).or_insert(0) += 1;
        }
        CorpusStats {
            segment_count: self.len(),
            dimension: self.dimension(),
            embedding_model: self.embedding_model.clone(),
            segments_per_source,
        }
    }

    /// Persist the corpus into `dir` as [`VECTORS_FILE`] plus [`METADATA_FILE`].
    ///
    /// Each file is written to a temporary name and renamed into place.
    /// The metadata file carries a SHA-256 of the vector file, so a crash
    /// between the two renames is detected on the next load.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        self.verify()?;
        fs::create_dir_all(dir)?;

        let vector_bytes = self.index.to_bytes();
        let manifest = MetadataFile {
            format_version: METADATA_FORMAT_VERSION,
            embedding_model: self.embedding_model.clone(),
            dimension: self.index.dimension(),
            record_count: self.metadata.len(),
            vectors_sha256: sha256_hex(&vector_bytes),
            records: self.metadata.clone(),
        };
        let metadata_bytes = serde_json::to_vec_pretty(&manifest)?;

        write_atomic(&dir.join(VECTORS_FILE), &vector_bytes)?;
        write_atomic(&dir.join(METADATA_FILE), &metadata_bytes)?;

        info!(path = %dir.display(), segment_count = self.len(), "saved corpus");
        Ok(())
    }

    /// Load a corpus saved by [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::CorruptCorpus`] if either file is missing or
    /// malformed, the checksum does not match, or the counts disagree.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let corrupt = |reason: String| {
            error!(path = %dir.display(), %reason, "rejecting corpus");
            RagError::CorruptCorpus { path: dir.to_path_buf(), reason }
        };

        let vectors_path = dir.join(VECTORS_FILE);
        let metadata_path = dir.join(METADATA_FILE);
        match (vectors_path.exists(), metadata_path.exists()) {
            (true, true) => {}
            (false, false) => {
                return Err(RagError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no corpus found in {}", dir.display()),
                )));
            }
            (true, false) => return Err(corrupt(format!("{METADATA_FILE} is missing"))),
            (false, true) => return Err(corrupt(format!("{VECTORS_FILE} is missing"))),
        }

        let vector_bytes = fs::read(&vectors_path)?;
        let manifest: MetadataFile = serde_json::from_slice(&fs::read(&metadata_path)?)
            .map_err(|e| corrupt(format!("unreadable {METADATA_FILE}: {e}")))?;

        if manifest.format_version != METADATA_FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported metadata format version {}",
                manifest.format_version
            )));
        }
        if sha256_hex(&vector_bytes) != manifest.vectors_sha256 {
            return Err(corrupt(format!("{VECTORS_FILE} checksum does not match {METADATA_FILE}")));
        }

        let index = VectorIndex::read_from(vector_bytes.as_slice())
            .map_err(|e| corrupt(format!("unreadable {VECTORS_FILE}: {e}")))?;
        if index.dimension() != manifest.dimension {
            return Err(corrupt(format!(
                "dimension {:?} in {VECTORS_FILE} vs {:?} in {METADATA_FILE}",
                index.dimension(),
                manifest.dimension
            )));
        }
        if manifest.records.len() != manifest.record_count || index.len() != manifest.record_count
        {
            return Err(corrupt(format!(
                "{} vectors, {} records, manifest says {}",
                index.len(),
                manifest.records.len(),
                manifest.record_count
            )));
        }

        let corpus = Self {
            embedding_model: manifest.embedding_model,
            index,
            metadata: manifest.records,
        };
        info!(path = %dir.display(), segment_count = corpus.len(), "loaded corpus");
        Ok(corpus)
    }

    /// Load a corpus and check that it was built with `embedding_model`.
    ///
    /// # Errors
    ///
    /// As [`load`](Self::load), plus [`RagError::Config`] on a model mismatch.
    pub fn load_for_model(dir: impl AsRef<Path>, embedding_model: &str) -> Result<Self> {
        let corpus = Self::load(dir)?;
        corpus.ensure_model(embedding_model)?;
        Ok(corpus)
    }

    /// Fail unless this corpus was built with `embedding_model`.
    pub fn ensure_model(&self, embedding_model: &str) -> Result<()> {
        if self.embedding_model != embedding_model {
            return Err(RagError::Config(format!(
                "corpus was embedded with '{}', but '{embedding_model}' is configured",
                self.embedding_model
            )));
        }
        Ok(())
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = PathBuf::from(path);
    tmp.as_mut_os_string().push(".tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Shared access to a [`Corpus`] with exclusive rebuilds.
///
/// Queries take a read guard without waiting: while a build or append holds
/// the write guard they fail with [`RagError::CorpusRebuilding`]. Concurrent
/// readers never block each other.
#[derive(Debug)]
pub struct CorpusHandle {
    inner: RwLock<Corpus>,
}

impl CorpusHandle {
    /// Wrap a corpus.
    pub fn new(corpus: Corpus) -> Self {
        Self { inner: RwLock::new(corpus) }
    }

    /// Read access for a query.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::CorpusRebuilding`] while a writer holds the corpus.
    pub fn read(&self) -> Result<RwLockReadGuard<'_, Corpus>> {
        self.inner.try_read().map_err(|_| RagError::CorpusRebuilding)
    }

    /// Read access that waits for any in-progress build to finish.
    pub async fn read_blocking(&self) -> RwLockReadGuard<'_, Corpus> {
        self.inner.read().await
    }

    /// Exclusive access for a build or append.
    pub async fn write(&self) -> RwLockWriteGuard<'_, Corpus> {
        self.inner.write().await
    }

    /// Consume the handle, returning the corpus.
    pub fn into_inner(self) -> Corpus {
        self.inner.into_inner()
    }
}
