// Generation module
// Prompt assembly and the language model that answers from retrieved context


use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{Config, GenerationConfig};
use crate::database::ScoredChunk;
use crate::embeddings::OllamaClient;
use crate::embeddings::ollama::run_blocking;
use crate::{RagError, Result};

pub const CONTEXT_PLACEHOLDER: &str = "{context}";
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// Grounding prompt: answer from the context, admit when it is not enough
pub const DEFAULT_TEMPLATE: &str = "Use the following context to answer the user's question. \
If you don't know the answer, just say you don't know.\n\nContext: {context}\n\nQuestion: {input}";

/// Prompt with `{context}` and `{input}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    #[inline]
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    #[inline]
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if !template.contains(CONTEXT_PLACEHOLDER) || !template.contains(INPUT_PLACEHOLDER) {
            return Err(RagError::Config(format!(
                "Prompt template must contain both {} and {}",
                CONTEXT_PLACEHOLDER, INPUT_PLACEHOLDER
            )));
        }
        Ok(Self { template })
    }

    /// Template from the configuration, or the default grounding prompt
    #[inline]
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        config
            .prompt_template
            .as_deref()
            .map_or_else(|| Ok(Self::default()), Self::new)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Substitute both placeholders in one pass.
    ///
    /// Substituted text is never rescanned, so a question that itself contains
    /// `{context}` is passed through literally.
    #[inline]
    pub fn render(&self, context: &str, input: &str) -> String {
        let mut rendered =
            String::with_capacity(self.template.len() + context.len() + input.len());
        let mut rest = self.template.as_str();

        while let Some(start) = rest.find('{') {
            let (before, tail) = rest.split_at(start);
            rendered.push_str(before);

            if let Some(after) = tail.strip_prefix(CONTEXT_PLACEHOLDER) {
                rendered.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(INPUT_PLACEHOLDER) {
                rendered.push_str(input);
                rest = after;
            } else {
                rendered.push('{');
                rest = tail.strip_prefix('{').unwrap_or_default();
            }
        }

        rendered.push_str(rest);
        rendered
    }
}

/// Join retrieved chunk texts, most similar first, separated by blank lines
#[inline]
pub fn format_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Text generation backend
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_id(&self) -> &str;

    /// Verify the model is reachable
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    /// Complete `prompt`, returning only the generated text
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Generator backed by a non-streaming Ollama completion
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: Arc<OllamaClient>,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl OllamaGenerator {
    #[inline]
    pub fn new(client: Arc<OllamaClient>, config: &GenerationConfig, timeout: Duration) -> Self {
        Self {
            client,
            model: config.model.clone(),
            temperature: config.temperature,
            timeout,
        }
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    #[inline]
    fn model_id(&self) -> &str {
        &self.model
    }

    #[inline]
    async fn health_check(&self) -> Result<()> {
        let client = Arc::clone(&self.client);
        let model = self.model.clone();
        run_blocking(self.timeout, "Generation model health check", move || {
            client.health_check(&model)
        })
        .await
        .map_err(RagError::GenerationFailure)
    }

    #[inline]
    async fn generate(&self, prompt: &str) -> Result<String> {
        let client = Arc::clone(&self.client);
        let model = self.model.clone();
        let prompt = prompt.to_string();
        let temperature = self.temperature;

        debug!("Requesting completion from {}", self.model);
        run_blocking(self.timeout, "Generation request", move || {
            client.generate(&model, &prompt, temperature)
        })
        .await
        .map_err(RagError::GenerationFailure)
    }
}

/// Build the Ollama generator described by the configuration
#[inline]
pub fn build_generator(config: &Config) -> Result<Arc<dyn Generator>> {
    let client = OllamaClient::new(&config.ollama)
        .map_err(|e| RagError::Config(format!("{:#}", e)))?;

    Ok(Arc::new(OllamaGenerator::new(
        Arc::new(client),
        &config.generation,
        config.ollama.timeout(),
    )))
}
