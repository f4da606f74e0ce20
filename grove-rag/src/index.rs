//! Exact inner-product vector index.
//!
//! [`VectorIndex`] stores vectors contiguously and answers top-k queries by a
//! brute-force scan. Corpora here run from one document to a few thousand
//! segments, where an exact scan is fast and needs no tuning; an approximate
//! index only pays off somewhere past 10^5 vectors.

use std::io::{Read, Write};

use crate::error::{RagError, Result};

/// Magic bytes at the start of a serialized index.
const MAGIC: &[u8; 4] = b"GRVX";
/// Serialized format version.
const FORMAT_VERSION: u32 = 1;

/// One search hit: the position of a vector and its inner product with the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Insertion position of the vector.
    pub position: usize,
    /// Inner product with the query vector.
    pub score: f32,
}

/// An append-only, fixed-dimension collection of vectors.
///
/// The first non-empty [`add`](Self::add) fixes the dimension for the
/// lifetime of the index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorIndex {
    dimension: Option<usize>,
    data: Vec<f32>,
    count: usize,
}

impl VectorIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty index with a fixed dimension.
    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension: Some(dimension), data: Vec::new(), count: 0 }
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The dimension, once fixed.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// The vector at `position`.
    pub fn get(&self, position: usize) -> Option<&[f32]> {
        let dim = self.dimension?;
        (position < self.count).then(|| &self.data[position * dim..(position + 1) * dim])
    }

    /// Iterate over stored vectors in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &[f32]> {
        let dim = self.dimension.unwrap_or(1).max(1);
        self.data.chunks_exact(dim).take(self.count)
    }

    /// Check that every vector in `vectors` fits this index without adding them.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] on the first vector whose
    /// length differs from the index dimension (or from the first vector, for
    /// an index whose dimension is not fixed yet), and
    /// [`RagError::NonFiniteVector`] on the first vector holding a NaN or
    /// infinite component.
    pub fn check(&self, vectors: &[Vec<f32>]) -> Result<()> {
        let Some(first) = vectors.first() else {
            return Ok(());
        };
        let expected = self.dimension.unwrap_or(first.len());
        if expected == 0 {
            return Err(RagError::DimensionMismatch { expected: 1, actual: 0 });
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(RagError::DimensionMismatch { expected, actual: bad.len() });
        }
        match vectors.iter().position(|v| !all_finite(v)) {
            Some(i) => Err(RagError::NonFiniteVector { vector: format!("vector {}", self.count + i) }),
            None => Ok(()),
        }
    }

    /// Append vectors in order.
    ///
    /// Nothing is added if any vector has the wrong dimension.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] or [`RagError::NonFiniteVector`];
    /// see [`check`](Self::check).
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        self.check(vectors)?;
        let Some(first) = vectors.first() else {
            return Ok(());
        };
        let dim = *self.dimension.get_or_insert(first.len());
        self.data.reserve(vectors.len() * dim);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        self.count += vectors.len();
        Ok(())
    }

    /// Return the `k` vectors with the highest inner product with `query`.
    ///
    /// Results are ordered by descending score; equal scores keep insertion
    /// order. Fewer than `k` vectors yields all of them, and an empty index
    /// yields no hits.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if `query` does not match the
    /// index dimension, and [`RagError::NonFiniteVector`] if it holds a NaN or
    /// infinite component.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>> {
        let Some(dim) = self.dimension else {
            return Ok(Vec::new());
        };
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != dim {
            return Err(RagError::DimensionMismatch { expected: dim, actual: query.len() });
        }
        if !all_finite(query) {
            return Err(RagError::NonFiniteVector { vector: "query".to_string() });
        }

        let mut hits: Vec<Hit> = self
            .iter()
            .enumerate()
            .map(|(position, v)| Hit { position, score: dot(v, query) })
            .collect();

        // Stable sort: ties stay in insertion order.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    /// Serialize the index: magic, version, dimension, count, then
    /// little-endian `f32` values.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(24 + self.data.len() * 4);
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&(self.dimension.unwrap_or(0) as u64).to_le_bytes());
        buf.extend_from_slice(&(self.count as u64).to_le_bytes());
        for value in &self.data {
            buf.extend_from_slice(&value.to_le_bytes());
        }
        buf
    }

    /// Write the serialized index to `writer`.
    pub fn write_to(&self, mut writer: impl Write) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// Deserialize an index produced by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Io`] with kind `InvalidData` for a bad header,
    /// unknown version, truncated or oversized payload, or a NaN or infinite
    /// value.
    pub fn read_from(mut reader: impl Read) -> Result<Self> {
        let mut header = [0u8; 24];
        reader.read_exact(&mut header)?;
        if &header[0..4] != MAGIC {
            return Err(invalid_data("not a vector index file"));
        }
        let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if version != FORMAT_VERSION {
            return Err(invalid_data(&format!("unsupported index format version {version}")));
        }
        let dim = read_u64(&header[8..16]) as usize;
        let count = read_u64(&header[16..24]) as usize;

        if dim == 0 && count > 0 {
            return Err(invalid_data("index header has vectors but no dimension"));
        }
        let values = dim
            .checked_mul(count)
            .and_then(|v| v.checked_mul(4))
            .ok_or_else(|| invalid_data("index header overflows"))?
            / 4;
        let mut payload = Vec::new();
        reader.read_to_end(&mut payload)?;
        if payload.len() != values * 4 {
            return Err(invalid_data(&format!(
                "payload holds {} bytes, header promises {}",
                payload.len(),
                values * 4
            )));
        }

        let data: Vec<f32> = payload
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        if !all_finite(&data) {
            return Err(invalid_data("index holds non-finite values"));
        }
        let dimension = (dim > 0).then_some(dim);
        Ok(Self { dimension, data, count })
    }
}

/// Inner product of two equal-length vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn all_finite(values: &[f32]) -> bool {
    values.iter().all(|x| x.is_finite())
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

fn invalid_data(message: &str) -> RagError {
    RagError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, message.to_string()))
}
