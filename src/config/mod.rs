// Configuration management module
// TOML settings for the backends, pipeline parameters, and the HTTP server

pub mod interactive;
pub mod settings;

#[cfg(test)]
mod tests;

use std::path::PathBuf;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, DocumentsConfig, EmbeddingConfig, EmbeddingProvider, GenerationConfig,
    IndexBackend, IndexConfig, OllamaConfig, ServerConfig,
};

/// Get the configuration directory path, preferring an explicit override
#[inline]
pub fn get_config_dir(override_dir: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    match override_dir {
        Some(dir) => Ok(dir),
        None => Config::config_dir(),
    }
}
