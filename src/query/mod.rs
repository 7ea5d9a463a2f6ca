// Retrieval-augmented query pipeline
// Embeds a question, retrieves the nearest chunks and asks the generator to answer from them


use serde::Serialize;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::database::{ScoredChunk, VectorIndex};
use crate::embeddings::Embedder;
use crate::generation::{Generator, PromptTemplate, format_context};
use crate::{RagError, Result};

pub const DEFAULT_TOP_K: usize = crate::config::settings::DEFAULT_TOP_K;

/// Returned in place of an answer when a single question cannot be processed
pub const DEGRADED_ANSWER: &str = "Sorry, I encountered an error processing your question.";

const LOG_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    /// Chunks the answer was grounded on, most similar first
    pub sources: Vec<ScoredChunk>,
    /// Set when the question failed and `text` is the fallback message
    pub degraded: bool,
}

impl Answer {
    #[inline]
    pub fn degraded() -> Self {
        Self {
            text: DEGRADED_ANSWER.to_string(),
            sources: Vec::new(),
            degraded: true,
        }
    }
}

/// Backends bound together once initialization has succeeded
struct RetrievalChain {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn Generator>,
    template: PromptTemplate,
    top_k: usize,
}

impl RetrievalChain {
    async fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk>> {
        let query = self.embedder.embed_query(question).await?;
        let hits = self.index.search(&query, self.top_k).await?;
        debug!("Retrieved {} chunks", hits.len());
        Ok(hits)
    }

    async fn answer(&self, question: &str) -> Result<Answer> {
        let sources = self.retrieve(question).await?;
        let prompt = self.template.render(&format_context(&sources), question);
        let text = self.generator.generate(&prompt).await?;

        Ok(Answer {
            text,
            sources,
            degraded: false,
        })
    }
}

pub struct QueryService {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn Generator>,
    template: PromptTemplate,
    top_k: usize,
    chain: OnceCell<RetrievalChain>,
}

impl QueryService {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            embedder,
            index,
            generator,
            template: PromptTemplate::default(),
            top_k: DEFAULT_TOP_K,
            chain: OnceCell::new(),
        }
    }

    /// Service wired with the configured prompt template and `top_k`
    #[inline]
    pub fn from_config(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        Ok(Self::new(embedder, index, generator)
            .with_template(PromptTemplate::from_config(&config.generation)?)
            .with_top_k(config.index.top_k))
    }

    #[inline]
    #[must_use]
    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.chain.initialized()
    }

    /// Bind to the index and models, once.
    ///
    /// Concurrent callers wait on the same attempt. A failed attempt is not
    /// remembered, so the next call tries again.
    #[inline]
    pub async fn initialize(&self) -> Result<()> {
        self.chain().await.map(|_| ())
    }

    async fn chain(&self) -> Result<&RetrievalChain> {
        self.chain
            .get_or_try_init(|| async {
                info!("Initializing query pipeline");

                self.index
                    .connect()
                    .await
                    .map_err(|e| RagError::InitializationFailure(e.to_string()))?;
                self.embedder
                    .health_check()
                    .await
                    .map_err(|e| RagError::InitializationFailure(e.to_string()))?;
                self.generator
                    .health_check()
                    .await
                    .map_err(|e| RagError::InitializationFailure(e.to_string()))?;

                info!(
                    "Query pipeline ready: collection '{}', embedder {}, generator {}",
                    self.index.collection(),
                    self.embedder.model_id(),
                    self.generator.model_id()
                );

                Ok::<_, RagError>(RetrievalChain {
                    embedder: Arc::clone(&self.embedder),
                    index: Arc::clone(&self.index),
                    generator: Arc::clone(&self.generator),
                    template: self.template.clone(),
                    top_k: self.top_k,
                })
            })
            .await
    }

    /// Nearest chunks for a question, surfacing retrieval errors such as `IndexNotReady`
    #[inline]
    pub async fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk>> {
        self.chain().await?.retrieve(question).await
    }

    /// Answer a question from the indexed corpus.
    ///
    /// Only initialization failures are returned as errors. Anything that goes
    /// wrong while processing the question itself yields a degraded answer.
    #[inline]
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let chain = self.chain().await?;
        info!("Question: {}", preview(question));

        match chain.answer(question).await {
            Ok(answer) => {
                info!(
                    "Answer from {} chunks: {}",
                    answer.sources.len(),
                    preview(&answer.text)
                );
                Ok(answer)
            }
            Err(e) => {
                error!("Failed to answer question: {}", e);
                Ok(Answer::degraded())
            }
        }
    }
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let mut shown: String = chars.by_ref().take(LOG_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        shown.push('…');
    }
    shown
}
