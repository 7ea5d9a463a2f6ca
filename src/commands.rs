use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::RagError;
use crate::config::{Config, EmbeddingProvider, IndexBackend};
use crate::database::{IndexProfile, VectorIndex, build_index};
use crate::embeddings::{OllamaClient, build_embedder};
use crate::generation::build_generator;
use crate::ingestion::{IngestionService, IngestionSummary};
use crate::query::{Answer, QueryService};
use crate::server::{self, AppState};

/// Ingestion and query services sharing one embedder and one index
pub struct Pipeline {
    pub ingestion: Arc<IngestionService>,
    pub query: Arc<QueryService>,
    pub index: Arc<dyn VectorIndex>,
}

/// Wire the backends selected by the configuration into both pipelines
#[inline]
pub fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let embedder = build_embedder(config)?;
    let profile = IndexProfile::new(
        embedder.model_id(),
        embedder.dimension(),
        config.index.metric,
    );
    let index = build_index(config, profile);
    let generator = build_generator(config)?;

    let ingestion =
        IngestionService::from_config(config, Arc::clone(&embedder), Arc::clone(&index));
    let query = QueryService::from_config(config, embedder, Arc::clone(&index), generator)?;

    Ok(Pipeline {
        ingestion: Arc::new(ingestion),
        query: Arc::new(query),
        index,
    })
}

/// Rebuild the index from the documents directory, showing progress on a terminal
#[inline]
pub async fn ingest_documents(config: &Config) -> Result<IngestionSummary> {
    let pipeline = build_pipeline(config)?;
    let service = pipeline.ingestion;

    let bar = if console::user_attended_stderr() {
        ProgressBar::new_spinner()
            .with_style(ProgressStyle::with_template("{spinner} {elapsed} {msg}")?)
    } else {
        ProgressBar::hidden()
    };
    bar.enable_steady_tick(Duration::from_millis(120));

    let mut stages = service.subscribe();
    let watcher = {
        let bar = bar.clone();
        tokio::spawn(async move {
            while stages.changed().await.is_ok() {
                let stage = stages.borrow_and_update().to_string();
                bar.set_message(stage);
            }
        })
    };

    let result = service.ingest().await;
    watcher.abort();
    bar.finish_and_clear();

    let summary = result.context("Ingestion failed")?;

    println!(
        "Ingested {} of {} documents into '{}'",
        summary.documents_loaded, summary.documents_found, summary.collection
    );
    println!("  Pages loaded: {}", summary.pages_loaded);
    println!("  Chunks stored: {}", summary.chunks_produced);
    println!(
        "  Completed: {}",
        summary.completed_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if !summary.failures.is_empty() {
        println!("  Skipped documents:");
        for failure in &summary.failures {
            println!("    {}: {}", failure.path.display(), failure.reason);
        }
    }

    Ok(summary)
}

/// Answer one question from the command line
#[inline]
pub async fn ask_question(config: &Config, question: &str) -> Result<Answer> {
    let pipeline = build_pipeline(config)?;
    let answer = pipeline.query.answer(question).await?;

    println!("{}", answer.text);
    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &answer.sources {
            let origin = source
                .metadata
                .get(crate::documents::SOURCE_KEY)
                .and_then(|value| value.as_str())
                .unwrap_or("unknown");
            let page = source.metadata.get("page").and_then(|value| value.as_u64());
            match page {
                Some(page) => println!("  {} (page {}, distance {:.4})", origin, page, source.distance),
                None => println!("  {} (distance {:.4})", origin, source.distance),
            }
        }
    }

    Ok(answer)
}

/// Start the HTTP server for the chat widget
#[inline]
pub async fn serve(config: &Config) -> Result<()> {
    let pipeline = build_pipeline(config)?;

    // Surface backend problems at startup; requests retry initialization anyway
    if let Err(e) = pipeline.query.initialize().await {
        warn!("{}", e);
    }

    let state = AppState {
        ingestion: pipeline.ingestion,
        query: pipeline.query,
    };
    info!("Documents directory: {}", config.documents.directory.display());
    server::serve(
        state,
        &config.server.static_dir,
        &config.server.bind_address(),
    )
    .await?;
    Ok(())
}

/// Print the configured backends and the state of the index
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("📊 PDF RAG Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Models:");
    match config.embedding.provider {
        EmbeddingProvider::Ollama => println!(
            "   Embedding: {} via Ollama ({} dims)",
            config.embedding.model, config.embedding.dimension
        ),
        EmbeddingProvider::Hashing => println!(
            "   Embedding: offline feature hashing ({} dims)",
            config.embedding.dimension
        ),
    }
    println!(
        "   Generation: {} (temperature {})",
        config.generation.model, config.generation.temperature
    );

    println!();
    println!("🔌 Ollama Status:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => {
            let host = client.base_url().to_string();
            for (role, model) in ollama_models(config) {
                let client = client.clone();
                let checked = model.to_string();
                let health =
                    tokio::task::spawn_blocking(move || client.health_check(&checked)).await?;
                match health {
                    Ok(()) => println!("   ✅ {} model {} ready ({})", role, model, host),
                    Err(e) => println!(
                        "   ⚠️  {} model {} unhealthy ({}): {:#}",
                        role, model, host, e
                    ),
                }
            }
        }
        Err(e) => println!("   ❌ Invalid configuration: {:#}", e),
    }

    println!();
    println!("🔍 Vector Index:");
    match config.index.backend {
        IndexBackend::Lancedb => println!("   Backend: LanceDB at {}", config.vector_database_uri()),
        IndexBackend::Memory => println!("   Backend: in-memory (not persisted)"),
    }
    println!("   Collection: {}", config.index.collection);
    println!("   Metric: {}", config.index.metric);
    println!("   Top K: {}", config.index.top_k);

    let pipeline = build_pipeline(config)?;
    match pipeline.index.count().await {
        Ok(count) => println!("   ✅ Entries: {}", count),
        Err(RagError::IndexNotReady(_)) => println!("   📭 Nothing ingested yet"),
        Err(e) => println!("   ❌ {}", e),
    }

    println!();
    println!("📁 Documents: {}", config.documents.directory.display());

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'pdf-rag ingest' to index the documents directory");
    println!("   • Use 'pdf-rag ask <question>' to query from the terminal");
    println!("   • Use 'pdf-rag serve' to start the chat server");

    Ok(())
}

/// Ollama models the configured pipelines depend on, labelled by role
fn ollama_models(config: &Config) -> Vec<(&'static str, &str)> {
    let mut models = Vec::with_capacity(2);
    if config.embedding.provider == EmbeddingProvider::Ollama {
        models.push(("Embedding", config.embedding.model.as_str()));
    }
    models.push(("Generation", config.generation.model.as_str()));
    models
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_checks_the_embedding_model_when_ollama_embeds() {
        let config = Config::default();
        assert_eq!(
            ollama_models(&config),
            vec![("Embedding", "all-minilm:latest"), ("Generation", "llama3.2")]
        );
    }

    #[test]
    fn status_skips_the_embedding_model_when_hashing() {
        let mut config = Config::default();
        config.embedding.provider = EmbeddingProvider::Hashing;
        assert_eq!(ollama_models(&config), vec![("Generation", "llama3.2")]);
    }
}
