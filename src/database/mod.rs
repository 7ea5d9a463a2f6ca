// Database module
// Vector index abstraction with an in-process exact backend and a LanceDB backend


pub mod lancedb;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::Result;
use crate::config::{Config, IndexBackend};
use crate::documents::Metadata;

pub use self::lancedb::LanceIndex;
pub use memory::MemoryIndex;

/// Distance function used to rank entries, smaller is closer
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    L2,
    Dot,
}

impl DistanceMetric {
    /// Distance between two vectors of equal length.
    ///
    /// Cosine is `1 - cos(a, b)` (a zero vector is at distance 1 from everything),
    /// L2 is the squared euclidean distance and Dot is `1 - a·b`.
    #[inline]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => {
                let (dot, norm_a, norm_b) = a.iter().zip(b).fold(
                    (0.0_f64, 0.0_f64, 0.0_f64),
                    |(dot, na, nb), (&x, &y)| {
                        let (x, y) = (f64::from(x), f64::from(y));
                        (dot + x * y, na + x * x, nb + y * y)
                    },
                );
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 1.0;
                }
                (1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
            }
            Self::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum(),
            Self::Dot => 1.0 - a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
        }
    }

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::L2 => "l2",
            Self::Dot => "dot",
        }
    }
}

impl fmt::Display for DistanceMetric {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "cosine" => Ok(Self::Cosine),
            "l2" => Ok(Self::L2),
            "dot" => Ok(Self::Dot),
            other => Err(format!("unknown distance metric '{}'", other)),
        }
    }
}

/// The embedding space an index was built for.
///
/// An index built under one profile refuses vectors and queries from another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexProfile {
    pub model_id: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
}

impl IndexProfile {
    #[inline]
    pub fn new(model_id: impl Into<String>, dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            model_id: model_id.into(),
            dimension,
            metric,
        }
    }
}

impl fmt::Display for IndexProfile {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} dims, {} distance)",
            self.model_id, self.dimension, self.metric
        )
    }
}

/// A chunk and its embedding, as stored in the index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub text: String,
    pub metadata: Metadata,
    pub vector: Vec<f32>,
}

/// One retrieval hit, ordered most similar first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub text: String,
    pub metadata: Metadata,
    pub distance: f32,
}

/// Storage and k-nearest-neighbor search over a single named collection
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Stable name of the collection this handle addresses
    fn collection(&self) -> &str;

    /// Embedding space this handle reads and writes
    fn profile(&self) -> &IndexProfile;

    /// Bind to the backing store; cheap to call repeatedly
    async fn connect(&self) -> Result<()>;

    /// Discard the current corpus and store `entries` in its place.
    ///
    /// Fails with `DimensionMismatch` before touching the store when any vector
    /// has the wrong length, and with `IndexRebuildFailure` when the store fails.
    async fn replace_all(&self, entries: Vec<IndexEntry>) -> Result<()>;

    /// Up to `k` entries closest to `query`, ties in insertion order.
    ///
    /// Fails with `IndexNotReady` when nothing has been ingested yet.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    /// Number of stored entries, `IndexNotReady` when nothing has been ingested
    async fn count(&self) -> Result<usize>;
}

/// Reject vectors whose length does not match the profile
#[inline]
pub fn check_dimension(profile: &IndexProfile, vector: &[f32]) -> Result<()> {
    if vector.len() != profile.dimension {
        return Err(crate::RagError::DimensionMismatch {
            expected: profile.dimension,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Sort `(seq, hit)` pairs by distance, then by insertion sequence
#[inline]
pub fn rank_by_distance(hits: &mut [(usize, ScoredChunk)]) {
    hits.sort_by(|(seq_a, a), (seq_b, b)| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| seq_a.cmp(seq_b))
    });
}

/// Open the vector index selected by the configuration
#[inline]
pub fn build_index(config: &Config, profile: IndexProfile) -> Arc<dyn VectorIndex> {
    match config.index.backend {
        IndexBackend::Memory => Arc::new(MemoryIndex::new(&config.index.collection, profile)),
        IndexBackend::Lancedb => Arc::new(
            LanceIndex::new(
                config.vector_database_uri(),
                &config.index.collection,
                profile,
            )
            .with_timeout(config.index.timeout()),
        ),
    }
}
