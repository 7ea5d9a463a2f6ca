// Source documents and their provenance metadata


pub mod loader;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

pub use loader::{DocumentLoader, PdfLoader};

/// Metadata key that always carries the originating file path
pub const SOURCE_KEY: &str = "source";

/// Metadata exactly as produced by a loader, possibly holding nested values
pub type RawMetadata = Map<String, Value>;

/// Metadata restricted to scalar values, safe to persist next to a vector
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A scalar metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl MetadataValue {
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => n.as_u64(),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    #[inline]
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    #[inline]
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<u64> for MetadataValue {
    #[inline]
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<bool> for MetadataValue {
    #[inline]
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A named unit of source text, one page of a PDF in practice
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub text: String,
    pub metadata: RawMetadata,
}

/// A document whose metadata has been reduced to scalars
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedDocument {
    pub text: String,
    pub metadata: Metadata,
}

impl Document {
    #[inline]
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = RawMetadata::new();
        metadata.insert(SOURCE_KEY.to_string(), Value::String(source.into()));
        Self {
            text: text.into(),
            metadata,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    #[inline]
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).and_then(Value::as_str)
    }

    /// Drop non-scalar metadata and coerce `source` into a string
    #[inline]
    pub fn prepare(self) -> PreparedDocument {
        PreparedDocument {
            metadata: sanitize_metadata(&self.metadata),
            text: self.text,
        }
    }
}

/// Keep scalar metadata only; `source`, when present and non-null, is always a string
#[inline]
pub fn sanitize_metadata(raw: &RawMetadata) -> Metadata {
    let mut cleaned = Metadata::new();

    for (key, value) in raw {
        if key == SOURCE_KEY {
            continue;
        }

        let scalar = match value {
            Value::Null => Some(MetadataValue::Null),
            Value::Bool(b) => Some(MetadataValue::Bool(*b)),
            Value::Number(n) => Some(MetadataValue::Number(n.clone())),
            Value::String(s) => Some(MetadataValue::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        };

        match scalar {
            Some(scalar) => {
                cleaned.insert(key.clone(), scalar);
            }
            None => debug!("Removing non-scalar metadata key: {}", key),
        }
    }

    match raw.get(SOURCE_KEY) {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) => {
            cleaned.insert(SOURCE_KEY.to_string(), MetadataValue::String(s.clone()));
        }
        Some(other) => {
            cleaned.insert(SOURCE_KEY.to_string(), MetadataValue::String(other.to_string()));
        }
    }

    cleaned
}
