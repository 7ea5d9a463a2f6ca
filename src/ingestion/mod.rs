// Ingestion pipeline
// Rebuilds the vector index from the PDFs in the documents directory


use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::database::{IndexEntry, VectorIndex};
use crate::documents::{Document, DocumentLoader, PdfLoader};
use crate::embeddings::{ChunkingConfig, Embedder, split_documents, validate_embeddings};
use crate::{RagError, Result};

/// Where an ingestion run currently is
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IngestionStage {
    #[default]
    Idle,
    Loading,
    Splitting,
    Embedding { done: usize, total: usize },
    Storing,
    Complete,
    Failed,
}

impl fmt::Display for IngestionStage {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Loading => f.write_str("loading documents"),
            Self::Splitting => f.write_str("splitting into chunks"),
            Self::Embedding { done, total } => write!(f, "embedding chunks ({}/{})", done, total),
            Self::Storing => f.write_str("storing vectors"),
            Self::Complete => f.write_str("complete"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// A source file that could not be loaded and was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a successful ingestion run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionSummary {
    pub collection: String,
    pub documents_found: usize,
    pub documents_loaded: usize,
    pub pages_loaded: usize,
    pub chunks_produced: usize,
    pub failures: Vec<LoadFailure>,
    pub completed_at: DateTime<Utc>,
}

impl IngestionSummary {
    #[inline]
    pub fn documents_failed(&self) -> usize {
        self.failures.len()
    }
}

pub struct IngestionService {
    documents_dir: PathBuf,
    loader: Arc<dyn DocumentLoader>,
    chunking: ChunkingConfig,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    batch_size: usize,
    stage: watch::Sender<IngestionStage>,
    run_lock: Mutex<()>,
}

impl IngestionService {
    #[inline]
    pub fn new(
        documents_dir: impl Into<PathBuf>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            documents_dir: documents_dir.into(),
            loader: Arc::new(PdfLoader::new()),
            chunking: ChunkingConfig::default(),
            embedder,
            index,
            batch_size: 16,
            stage: watch::Sender::new(IngestionStage::Idle),
            run_lock: Mutex::new(()),
        }
    }

    /// Service wired from the configuration's documents, chunking and batch settings
    #[inline]
    pub fn from_config(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self::new(config.documents.directory.clone(), embedder, index)
            .with_chunking(config.chunking.clone())
            .with_batch_size(config.embedding.batch_size as usize)
    }

    #[inline]
    #[must_use]
    pub fn with_loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.loader = loader;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[inline]
    pub fn documents_dir(&self) -> &Path {
        &self.documents_dir
    }

    /// Current stage of the latest run
    #[inline]
    pub fn stage(&self) -> IngestionStage {
        self.stage.borrow().clone()
    }

    /// Follow stage changes as they happen
    #[inline]
    pub fn subscribe(&self) -> watch::Receiver<IngestionStage> {
        self.stage.subscribe()
    }

    fn set_stage(&self, stage: IngestionStage) {
        debug!("Ingestion stage: {}", stage);
        self.stage.send_replace(stage);
    }

    /// Replace the indexed corpus with the current contents of the documents directory.
    ///
    /// Runs are serialized; a second caller waits for the first to finish.
    #[inline]
    pub async fn ingest(&self) -> Result<IngestionSummary> {
        let _guard = self.run_lock.lock().await;

        match self.run().await {
            Ok(summary) => {
                self.set_stage(IngestionStage::Complete);
                info!(
                    "Ingestion complete: {} of {} documents, {} pages, {} chunks into '{}'",
                    summary.documents_loaded,
                    summary.documents_found,
                    summary.pages_loaded,
                    summary.chunks_produced,
                    summary.collection
                );
                Ok(summary)
            }
            Err(e) => {
                self.set_stage(IngestionStage::Failed);
                error!("Ingestion failed: {}", e);
                Err(e)
            }
        }
    }

    async fn run(&self) -> Result<IngestionSummary> {
        self.check_profile()?;

        self.set_stage(IngestionStage::Loading);
        let files = self.source_files().await?;
        let (documents, failures) = self.load_all(&files).await;

        if failures.len() == files.len() {
            return Err(RagError::NoContentLoaded {
                attempted: files.len(),
                failed: failures.len(),
            });
        }
        let pages_loaded = documents.len();

        self.set_stage(IngestionStage::Splitting);
        let prepared: Vec<_> = documents.into_iter().map(Document::prepare).collect();
        let chunks = split_documents(&prepared, &self.chunking);
        info!(
            "Split {} pages into {} chunks",
            prepared.len(),
            chunks.len()
        );

        if chunks.is_empty() {
            warn!("No extractable text in any loaded document");
            return Err(RagError::NoContentLoaded {
                attempted: files.len(),
                failed: failures.len(),
            });
        }

        let total = chunks.len();
        let mut entries = Vec::with_capacity(total);
        self.set_stage(IngestionStage::Embedding { done: 0, total });

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            validate_embeddings(&vectors, texts.len(), self.embedder.dimension())?;

            entries.extend(batch.iter().zip(vectors).map(|(chunk, vector)| IndexEntry {
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
                vector,
            }));

            debug!("Embedded {}/{} chunks", entries.len(), total);
            self.set_stage(IngestionStage::Embedding {
                done: entries.len(),
                total,
            });
        }

        self.set_stage(IngestionStage::Storing);
        self.index.replace_all(entries).await?;

        Ok(IngestionSummary {
            collection: self.index.collection().to_string(),
            documents_found: files.len(),
            documents_loaded: files.len() - failures.len(),
            pages_loaded,
            chunks_produced: total,
            failures,
            completed_at: Utc::now(),
        })
    }

    fn check_profile(&self) -> Result<()> {
        let profile = self.index.profile();
        if profile.model_id != self.embedder.model_id()
            || profile.dimension != self.embedder.dimension()
        {
            return Err(RagError::ProfileMismatch {
                collection: self.index.collection().to_string(),
                stored: profile.to_string(),
                requested: format!(
                    "{} ({} dims)",
                    self.embedder.model_id(),
                    self.embedder.dimension()
                ),
            });
        }
        Ok(())
    }

    /// Eligible files of the documents directory, in name order
    async fn source_files(&self) -> Result<Vec<PathBuf>> {
        let dir = &self.documents_dir;
        info!("Scanning {} for documents", dir.display());

        let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
            RagError::NoSourceDocuments(format!("cannot read {}: {}", dir.display(), e))
        })?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && self.loader.is_eligible(&path) {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(RagError::NoSourceDocuments(format!(
                "no PDF files found in {}",
                dir.display()
            )));
        }

        info!("Found {} documents", files.len());
        Ok(files)
    }

    async fn load_all(&self, files: &[PathBuf]) -> (Vec<Document>, Vec<LoadFailure>) {
        let mut documents = Vec::new();
        let mut failures = Vec::new();

        for path in files {
            match self.loader.load(path).await {
                Ok(pages) => {
                    let with_text = pages.iter().filter(|p| !p.text.trim().is_empty()).count();
                    info!(
                        "Loaded {}: {} pages, {} pages with text",
                        path.display(),
                        pages.len(),
                        with_text
                    );
                    documents.extend(pages);
                }
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    failures.push(LoadFailure {
                        path: path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        (documents, failures)
    }
}
