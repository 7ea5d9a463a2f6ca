
use async_trait::async_trait;
use lopdf::Document as PdfDocument;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::Document;
use crate::{RagError, Result};

/// Turns one source file into an ordered sequence of documents
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Whether this loader handles the given file
    fn is_eligible(&self, path: &Path) -> bool;

    /// Parse a file. Unparseable input is a `DocumentLoad` error for that file only.
    async fn load(&self, path: &Path) -> Result<Vec<Document>>;
}

/// Loads PDF files, producing one document per page
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfLoader;

impl PdfLoader {
    #[inline]
    pub fn new() -> Self {
        Self
    }

    /// Extract the text of every page of a PDF, in page order
    #[inline]
    pub fn extract_pages(path: &Path) -> Result<Vec<Document>> {
        let pdf = PdfDocument::load(path).map_err(|e| {
            RagError::DocumentLoad(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        let pages = pdf.get_pages();
        let total_pages = pages.len() as u64;
        let source = path.display().to_string();
        let mut documents = Vec::with_capacity(pages.len());

        for &page_number in pages.keys() {
            let text = pdf.extract_text(&[page_number]).map_err(|e| {
                RagError::DocumentLoad(format!(
                    "Failed to extract text from page {} of {}: {}",
                    page_number,
                    path.display(),
                    e
                ))
            })?;

            documents.push(
                Document::new(text, source.clone())
                    .with_metadata("page", u64::from(page_number))
                    .with_metadata("total_pages", total_pages),
            );
        }

        debug!("Extracted {} pages from {}", documents.len(), source);
        Ok(documents)
    }
}

#[async_trait]
impl DocumentLoader for PdfLoader {
    #[inline]
    fn is_eligible(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
    }

    #[inline]
    async fn load(&self, path: &Path) -> Result<Vec<Document>> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::extract_pages(&path))
            .await
            .map_err(|e| RagError::DocumentLoad(format!("PDF parsing task failed: {}", e)))?
    }
}
