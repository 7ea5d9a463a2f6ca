use super::*;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.ollama.protocol, "http");
    assert_eq!(config.ollama.host, "localhost");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.embedding.provider, EmbeddingProvider::Ollama);
    assert_eq!(config.embedding.dimension, 384);
    assert_eq!(config.generation.model, "llama3.2");
    assert!((config.generation.temperature - 0.7).abs() < f32::EPSILON);
    assert_eq!(config.chunking.max_size, 1000);
    assert_eq!(config.chunking.overlap, 200);
    assert_eq!(config.index.collection, "course-documents");
    assert_eq!(config.index.metric, DistanceMetric::Cosine);
    assert_eq!(config.index.top_k, 6);
    assert_eq!(config.server.port, 3000);
}

#[test]
fn config_validation() {
    let config = Config::default();
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.ollama.protocol = "ftp".to_string();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidProtocol(_))
    ));

    let mut invalid_config = config.clone();
    invalid_config.ollama.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embedding.batch_size = 1001;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.generation.temperature = 2.5;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidTemperature(_))
    ));

    let mut invalid_config = config.clone();
    invalid_config.chunking.overlap = 1000;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::OverlapTooLarge(1000, 1000))
    ));

    let mut invalid_config = config.clone();
    invalid_config.index.top_k = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidTopK(0))
    ));

    let mut invalid_config = config;
    invalid_config.index.timeout_secs = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidTimeout(0))
    ));
}

#[test]
fn prompt_template_requires_both_placeholders() {
    let mut config = Config::default();

    config.generation.prompt_template = Some("Context: {context}".to_string());
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidPromptTemplate)
    ));

    config.generation.prompt_template = Some("Q: {input}\nC: {context}".to_string());
    assert!(config.validate().is_ok());
}

#[test]
fn ollama_url_generation() {
    let config = Config::default();
    let url = config
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn https_url_generation() {
    let mut config = Config::default();
    config.ollama.protocol = "https".to_string();
    config.ollama.host = "secure.example.com".to_string();
    config.ollama.port = 443;

    let url = config
        .ollama_url()
        .expect("should generate https url successfully");
    assert_eq!(url.as_str(), "https://secure.example.com/");
}

#[test]
fn toml_serialization() {
    let mut config = Config::default();
    config.index.uri = Some("/tmp/vectors".to_string());
    config.generation.prompt_template = Some("{context} / {input}".to_string());

    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_toml_uses_defaults() {
    let parsed: Config = toml::from_str(
        r#"
        [embedding]
        provider = "hashing"
        dimension = 64

        [index]
        backend = "memory"
        metric = "l2"
        "#,
    )
    .expect("should parse partial toml");

    assert_eq!(parsed.embedding.provider, EmbeddingProvider::Hashing);
    assert_eq!(parsed.embedding.dimension, 64);
    assert_eq!(parsed.embedding.batch_size, 16);
    assert_eq!(parsed.index.backend, IndexBackend::Memory);
    assert_eq!(parsed.index.metric, DistanceMetric::L2);
    assert_eq!(parsed.index.collection, DEFAULT_COLLECTION);
    assert_eq!(parsed.ollama, OllamaConfig::default());
}

#[test]
fn unknown_enum_values_are_rejected() {
    let result: Result<Config, toml::de::Error> = toml::from_str(
        r#"
        [index]
        metric = "manhattan"
        "#,
    );
    assert!(result.is_err());
}

#[test]
fn setter_validation() {
    let mut ollama = OllamaConfig::default();
    assert!(ollama.set_protocol("https".to_string()).is_ok());
    assert!(ollama.set_host("example.com".to_string()).is_ok());
    assert!(ollama.set_port(8080).is_ok());
    assert!(ollama.set_timeout_secs(120).is_ok());

    assert!(ollama.set_protocol("ftp".to_string()).is_err());
    assert!(ollama.set_protocol("HTTP".to_string()).is_err());
    assert!(ollama.set_port(0).is_err());
    assert!(ollama.set_timeout_secs(0).is_err());
    assert_eq!(ollama.protocol, "https");
    assert_eq!(ollama.port, 8080);

    let mut embedding = EmbeddingConfig::default();
    assert!(embedding.set_model("nomic-embed-text".to_string()).is_ok());
    assert!(embedding.set_batch_size(128).is_ok());
    assert!(embedding.set_dimension(768).is_ok());
    assert!(embedding.set_model("   ".to_string()).is_err());
    assert!(embedding.set_batch_size(0).is_err());
    assert!(embedding.set_dimension(4).is_err());
    assert_eq!(embedding.model, "nomic-embed-text");

    let mut generation = GenerationConfig::default();
    assert!(generation.set_temperature(0.0).is_ok());
    assert!(generation.set_temperature(-0.1).is_err());
    assert!(generation.set_model(String::new()).is_err());
}

#[test]
fn save_and_load_round_trip() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config {
        base_dir: temp_dir.path().join("nested"),
        ..Config::default()
    };
    config.server.port = 8088;
    config.embedding.provider = EmbeddingProvider::Hashing;

    config.save().expect("should save config");
    assert!(config.config_file_path().exists());

    let loaded = Config::load(temp_dir.path().join("nested")).expect("should load config");
    assert_eq!(loaded, config);
}

#[test]
fn load_missing_config_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load(temp_dir.path()).expect("missing file yields defaults");

    assert_eq!(config.base_dir, temp_dir.path());
    assert_eq!(config.ollama, OllamaConfig::default());
    assert_eq!(
        config.vector_database_uri(),
        temp_dir.path().join("vectors").to_string_lossy()
    );
}

#[test]
fn load_rejects_invalid_values() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    std::fs::write(
        temp_dir.path().join(CONFIG_FILE_NAME),
        "[chunking]\nmax_size = 100\noverlap = 150\n",
    )
    .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
fn explicit_index_uri_wins() {
    let mut config = Config::default();
    config.index.uri = Some("db://course".to_string());
    assert_eq!(config.vector_database_uri(), "db://course");
}
