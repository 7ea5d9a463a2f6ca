
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{
    IndexEntry, IndexProfile, ScoredChunk, VectorIndex, check_dimension, rank_by_distance,
};
use crate::{RagError, Result};

/// Exact brute-force index held in process memory.
///
/// Each rebuild swaps in a whole new generation under the write lock, so
/// searches observe either the previous corpus or the new one, never a mix.
pub struct MemoryIndex {
    collection: String,
    profile: IndexProfile,
    generation: RwLock<Option<Arc<Generation>>>,
}

struct Generation {
    entries: Vec<IndexEntry>,
}

impl MemoryIndex {
    #[inline]
    pub fn new(collection: &str, profile: IndexProfile) -> Self {
        Self {
            collection: collection.to_string(),
            profile,
            generation: RwLock::new(None),
        }
    }

    async fn current(&self) -> Result<Arc<Generation>> {
        self.generation
            .read()
            .await
            .clone()
            .ok_or_else(|| RagError::IndexNotReady(self.collection.clone()))
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    #[inline]
    fn collection(&self) -> &str {
        &self.collection
    }

    #[inline]
    fn profile(&self) -> &IndexProfile {
        &self.profile
    }

    #[inline]
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    #[inline]
    async fn replace_all(&self, entries: Vec<IndexEntry>) -> Result<()> {
        for entry in &entries {
            check_dimension(&self.profile, &entry.vector)?;
        }

        let count = entries.len();
        let generation = Arc::new(Generation { entries });
        *self.generation.write().await = Some(generation);

        info!(
            "Replaced collection '{}' with {} entries",
            self.collection, count
        );
        Ok(())
    }

    #[inline]
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let generation = self.current().await?;
        check_dimension(&self.profile, query)?;

        let metric = self.profile.metric;
        let mut hits: Vec<(usize, ScoredChunk)> = generation
            .entries
            .iter()
            .enumerate()
            .map(|(seq, entry)| {
                (
                    seq,
                    ScoredChunk {
                        text: entry.text.clone(),
                        metadata: entry.metadata.clone(),
                        distance: metric.distance(query, &entry.vector),
                    },
                )
            })
            .collect();

        rank_by_distance(&mut hits);
        hits.truncate(k);

        debug!(
            "Searched {} entries in '{}', returning {}",
            generation.entries.len(),
            self.collection,
            hits.len()
        );
        Ok(hits.into_iter().map(|(_, hit)| hit).collect())
    }

    #[inline]
    async fn count(&self) -> Result<usize> {
        Ok(self.current().await?.entries.len())
    }
}
