use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No source documents: {0}")]
    NoSourceDocuments(String),

    #[error("No content loaded from any PDF ({failed} of {attempted} documents failed to load)")]
    NoContentLoaded { attempted: usize, failed: usize },

    #[error("Document load error: {0}")]
    DocumentLoad(String),

    #[error("Embedding error: {0}")]
    EmbeddingFailure(String),

    #[error("Index rebuild failed for collection '{collection}': {message}")]
    IndexRebuildFailure { collection: String, message: String },

    #[error("Index '{0}' is not ready, no corpus has been ingested yet")]
    IndexNotReady(String),

    #[error("Vector dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index '{collection}' was built with {stored}, but is being queried with {requested}")]
    ProfileMismatch {
        collection: String,
        stored: String,
        requested: String,
    },

    #[error(
        "Failed to initialize. Make sure the vector index and Ollama are running. Cause: {0}"
    )]
    InitializationFailure(String),

    #[error("Generation error: {0}")]
    GenerationFailure(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod documents;
pub mod embeddings;
pub mod generation;
pub mod ingestion;
pub mod query;
pub mod server;
