
use arrow::array::RecordBatchIterator;
use arrow::datatypes::SchemaRef;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::future::Future;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::{create_record_batch, create_schema, parse_search_batch, stored_profile};
use crate::database::{
    DistanceMetric, IndexEntry, IndexProfile, ScoredChunk, VectorIndex, check_dimension,
    rank_by_distance,
};
use crate::{RagError, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Relative slack above the k-th distance when collecting ties
const TIE_MARGIN: f32 = 1e-5;

/// Vector index persisted as a LanceDB table named after the collection.
///
/// Rebuilds drop the table and create it again. A failure between the two
/// leaves the collection missing, which searches report as `IndexNotReady`.
pub struct LanceIndex {
    uri: String,
    collection: String,
    profile: IndexProfile,
    timeout: Duration,
    connection: OnceCell<Connection>,
}

impl LanceIndex {
    #[inline]
    pub fn new(uri: impl Into<String>, collection: &str, profile: IndexProfile) -> Self {
        Self {
            uri: uri.into(),
            collection: collection.to_string(),
            profile,
            timeout: DEFAULT_TIMEOUT,
            connection: OnceCell::new(),
        }
    }

    /// Bound every database round trip by `timeout`
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[inline]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    async fn bounded<T, F>(&self, operation: &str, future: F) -> std::result::Result<T, String>
    where
        F: Future<Output = std::result::Result<T, String>>,
    {
        tokio::time::timeout(self.timeout, future)
            .await
            .unwrap_or_else(|_| Err(format!("{} timed out after {:?}", operation, self.timeout)))
    }

    async fn connection(&self) -> std::result::Result<&Connection, String> {
        self.connection
            .get_or_try_init(|| open_connection(&self.uri))
            .await
    }

    async fn table_exists(&self, connection: &Connection) -> std::result::Result<bool, String> {
        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| format!("Failed to list tables: {}", e))?;
        Ok(table_names.contains(&self.collection))
    }

    async fn lookup_table(&self) -> std::result::Result<Option<(Table, SchemaRef)>, String> {
        let connection = self.connection().await?;
        if !self.table_exists(connection).await? {
            return Ok(None);
        }

        let table = connection
            .open_table(&self.collection)
            .execute()
            .await
            .map_err(|e| format!("Failed to open table: {}", e))?;
        let schema = table
            .schema()
            .await
            .map_err(|e| format!("Failed to get table schema: {}", e))?;
        Ok(Some((table, schema)))
    }

    /// Open the collection, checking it was built for this handle's profile
    async fn open_ready_table(&self) -> Result<Table> {
        let Some((table, schema)) = self
            .bounded("Opening collection", self.lookup_table())
            .await
            .map_err(RagError::Database)?
        else {
            return Err(RagError::IndexNotReady(self.collection.clone()));
        };

        let stored = stored_profile(&schema).ok_or_else(|| {
            RagError::Database(format!(
                "Collection '{}' has no vector column",
                self.collection
            ))
        })?;

        if !stored.is_compatible(&self.profile) {
            return Err(RagError::ProfileMismatch {
                collection: self.collection.clone(),
                stored: stored.describe(),
                requested: self.profile.to_string(),
            });
        }

        Ok(table)
    }

    /// Drop the collection, tolerating its absence
    async fn drop_table_if_exists(&self, connection: &Connection) -> std::result::Result<(), String> {
        if self.table_exists(connection).await? {
            info!("Dropping existing collection '{}'", self.collection);
            connection
                .drop_table(&self.collection)
                .await
                .map_err(|e| format!("Failed to drop table: {}", e))?;
        } else {
            debug!("Collection '{}' does not exist yet", self.collection);
        }
        Ok(())
    }

    async fn rebuild(&self, entries: &[IndexEntry]) -> std::result::Result<(), String> {
        let connection = self.connection().await?;

        self.drop_table_if_exists(connection).await?;

        let schema = create_schema(&self.profile);
        connection
            .create_empty_table(&self.collection, schema.clone())
            .execute()
            .await
            .map_err(|e| format!("Failed to create table: {}", e))?;

        if entries.is_empty() {
            warn!("Collection '{}' rebuilt with no entries", self.collection);
            return Ok(());
        }

        let record_batch =
            create_record_batch(&self.profile, entries).map_err(|e| e.to_string())?;

        let table = connection
            .open_table(&self.collection)
            .execute()
            .await
            .map_err(|e| format!("Failed to open table: {}", e))?;

        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| format!("Failed to insert entries: {}", e))?;

        Ok(())
    }
}

#[async_trait]
impl VectorIndex for LanceIndex {
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
        self.bounded("Connecting to LanceDB", self.connection())
            .await
            .map(|_| ())
            .map_err(RagError::Database)
    }

    #[inline]
    async fn replace_all(&self, entries: Vec<IndexEntry>) -> Result<()> {
        for entry in &entries {
            check_dimension(&self.profile, &entry.vector)?;
        }

        info!(
            "Rebuilding collection '{}' with {} entries",
            self.collection,
            entries.len()
        );

        self.bounded("Index rebuild", self.rebuild(&entries))
            .await
            .map_err(|message| RagError::IndexRebuildFailure {
                collection: self.collection.clone(),
                message,
            })?;

        info!("Collection '{}' rebuilt successfully", self.collection);
        Ok(())
    }

    #[inline]
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let table = self.open_ready_table().await?;
        check_dimension(&self.profile, query)?;

        debug!(
            "Searching collection '{}' for {} nearest entries",
            self.collection, k
        );

        let mut hits = self
            .bounded(
                "Vector search",
                nearest_with_ties(&table, query, self.profile.metric, k),
            )
            .await
            .map_err(RagError::Database)?;

        rank_by_distance(&mut hits);
        hits.truncate(k);

        debug!("Parsed {} search results", hits.len());
        Ok(hits.into_iter().map(|(_, hit)| hit).collect())
    }

    #[inline]
    async fn count(&self) -> Result<usize> {
        let table = self.open_ready_table().await?;

        self.bounded("Counting rows", async {
            table
                .count_rows(None)
                .await
                .map_err(|e| format!("Failed to count rows: {}", e))
        })
        .await
        .map_err(RagError::Database)
    }
}

async fn open_connection(uri: &str) -> std::result::Result<Connection, String> {
    if !uri.contains("://") {
        std::fs::create_dir_all(uri)
            .map_err(|e| format!("Failed to create vector database directory: {}", e))?;
    }

    debug!("Connecting to LanceDB at {}", uri);
    lancedb::connect(uri)
        .execute()
        .await
        .map_err(|e| format!("Failed to connect to LanceDB at {}: {}", uri, e))
}

/// Nearest `k` entries plus every entry tied with the k-th one.
///
/// LanceDB keeps an arbitrary subset of the rows tied at the cutoff, so when
/// the first pass is full it is repeated with a distance bound instead and
/// the caller ranks by insertion order.
async fn nearest_with_ties(
    table: &Table,
    query: &[f32],
    metric: DistanceMetric,
    k: usize,
) -> std::result::Result<Vec<(usize, ScoredChunk)>, String> {
    let hits = nearest(table, query, metric, k, None).await?;
    let Some(cutoff) = tie_cutoff(&hits, k) else {
        return Ok(hits);
    };

    let rows = table
        .count_rows(None)
        .await
        .map_err(|e| format!("Failed to count rows: {}", e))?;
    if rows <= hits.len() {
        return Ok(hits);
    }

    debug!("Widening search to entries within distance {}", cutoff);
    nearest(table, query, metric, rows, Some(cutoff)).await
}

/// Exclusive upper distance bound covering every entry tied with the k-th hit,
/// or `None` when fewer than `k` hits came back
fn tie_cutoff(hits: &[(usize, ScoredChunk)], k: usize) -> Option<f32> {
    if k == 0 || hits.len() < k {
        return None;
    }

    let kth = hits.iter().map(|(_, hit)| hit.distance).reduce(f32::max)?;
    Some(kth + kth.abs().max(1.0) * TIE_MARGIN)
}

/// Exact nearest neighbours of `query`, as `(seq, hit)` pairs in no particular order
async fn nearest(
    table: &Table,
    query: &[f32],
    metric: DistanceMetric,
    limit: usize,
    upper_bound: Option<f32>,
) -> std::result::Result<Vec<(usize, ScoredChunk)>, String> {
    let mut search = table
        .vector_search(query)
        .map_err(|e| format!("Failed to create vector search: {}", e))?
        .column("vector")
        .distance_type(DistanceType::from(metric))
        .limit(limit);
    if upper_bound.is_some() {
        search = search.distance_range(None, upper_bound);
    }

    let mut results = search
        .execute()
        .await
        .map_err(|e| format!("Failed to execute search: {}", e))?;

    let mut hits = Vec::new();
    while let Some(batch) = results
        .try_next()
        .await
        .map_err(|e| format!("Failed to read result stream: {}", e))?
    {
        hits.extend(parse_search_batch(&batch).map_err(|e| e.to_string())?);
    }
    Ok(hits)
}
