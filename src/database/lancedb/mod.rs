// LanceDB vector database module
// Arrow schema and record batch conversion for index entries


pub mod vector_store;

use arrow::array::{Array, FixedSizeListArray, Float32Array, StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::collections::HashMap;
use std::sync::Arc;

use super::{DistanceMetric, IndexEntry, IndexProfile, ScoredChunk};
use crate::documents::Metadata;
use crate::{RagError, Result};

pub use vector_store::LanceIndex;

const MODEL_KEY: &str = "pdf_rag.model";
const DIMENSION_KEY: &str = "pdf_rag.dimension";
const METRIC_KEY: &str = "pdf_rag.metric";

/// Table schema for a profile; the profile itself is kept in the schema metadata
pub fn create_schema(profile: &IndexProfile) -> Arc<Schema> {
    let metadata = HashMap::from([
        (MODEL_KEY.to_string(), profile.model_id.clone()),
        (DIMENSION_KEY.to_string(), profile.dimension.to_string()),
        (METRIC_KEY.to_string(), profile.metric.to_string()),
    ]);

    Arc::new(
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("seq", DataType::UInt32, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    profile.dimension as i32,
                ),
                false,
            ),
            Field::new("text", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
        ])
        .with_metadata(metadata),
    )
}

/// Recover the profile a table was created with.
///
/// Tables without profile metadata only report their vector dimension.
pub fn stored_profile(schema: &Schema) -> Option<StoredProfile> {
    let dimension = schema.fields().iter().find_map(|field| {
        if field.name() != "vector" {
            return None;
        }
        match field.data_type() {
            DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
            _ => None,
        }
    })?;

    let metadata = schema.metadata();
    Some(StoredProfile {
        dimension,
        model_id: metadata.get(MODEL_KEY).cloned(),
        metric: metadata
            .get(METRIC_KEY)
            .and_then(|m| m.parse::<DistanceMetric>().ok()),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredProfile {
    pub dimension: usize,
    pub model_id: Option<String>,
    pub metric: Option<DistanceMetric>,
}

impl StoredProfile {
    /// Whether vectors of `profile` can be compared against this table
    pub fn is_compatible(&self, profile: &IndexProfile) -> bool {
        self.dimension == profile.dimension
            && self.model_id.as_ref().is_none_or(|m| *m == profile.model_id)
            && self.metric.is_none_or(|m| m == profile.metric)
    }

    pub fn describe(&self) -> String {
        format!(
            "{} ({} dims, {} distance)",
            self.model_id.as_deref().unwrap_or("unknown model"),
            self.dimension,
            self.metric.map_or("unknown", DistanceMetric::as_str)
        )
    }
}

/// Build one record batch holding every entry, in order
pub fn create_record_batch(profile: &IndexProfile, entries: &[IndexEntry]) -> Result<RecordBatch> {
    let len = entries.len();
    let dimension = profile.dimension;

    let mut ids = Vec::with_capacity(len);
    let mut seqs = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * dimension);
    let mut texts = Vec::with_capacity(len);
    let mut metadata = Vec::with_capacity(len);

    for (seq, entry) in entries.iter().enumerate() {
        ids.push(uuid::Uuid::new_v4().to_string());
        seqs.push(
            u32::try_from(seq)
                .map_err(|_| RagError::Database(format!("Too many entries: {}", len)))?,
        );
        flat_values.extend_from_slice(&entry.vector);
        texts.push(entry.text.as_str());
        metadata.push(
            serde_json::to_string(&entry.metadata)
                .map_err(|e| RagError::Database(format!("Failed to encode metadata: {}", e)))?,
        );
    }

    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array = FixedSizeListArray::try_new(
        field,
        dimension as i32,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| RagError::Database(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(UInt32Array::from(seqs)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(texts)),
        Arc::new(StringArray::from(metadata)),
    ];

    RecordBatch::try_new(create_schema(profile), arrays)
        .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}

/// Parse a search result batch into `(seq, hit)` pairs
pub fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<(usize, ScoredChunk)>> {
    let texts = string_column(batch, "text")?;
    let metadata = string_column(batch, "metadata")?;

    let seqs = batch
        .column_by_name("seq")
        .ok_or_else(|| RagError::Database("Missing seq column".to_string()))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| RagError::Database("Invalid seq column type".to_string()))?;

    let distances = batch
        .column_by_name("_distance")
        .ok_or_else(|| RagError::Database("Missing _distance column".to_string()))?
        .as_any()
        .downcast_ref::<Float32Array>()
        .ok_or_else(|| RagError::Database("Invalid _distance column type".to_string()))?;

    let mut hits = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let parsed: Metadata = serde_json::from_str(metadata.value(row))
            .map_err(|e| RagError::Database(format!("Corrupt metadata in row {}: {}", row, e)))?;

        hits.push((
            seqs.value(row) as usize,
            ScoredChunk {
                text: texts.value(row).to_string(),
                metadata: parsed,
                distance: if distances.is_null(row) {
                    f32::MAX
                } else {
                    distances.value(row)
                },
            },
        ));
    }

    Ok(hits)
}

impl From<DistanceMetric> for ::lancedb::DistanceType {
    #[inline]
    fn from(metric: DistanceMetric) -> Self {
        match metric {
            DistanceMetric::Cosine => Self::Cosine,
            DistanceMetric::L2 => Self::L2,
            DistanceMetric::Dot => Self::Dot,
        }
    }
}
