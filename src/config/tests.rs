use super::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn config_file_persistence() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let config_path = temp_dir.path().join("config.toml");

    let original_config = Config {
        ollama: OllamaConfig {
            protocol: "https".to_string(),
            host: "test-host".to_string(),
            port: 8080,
            timeout_secs: 90,
            retry_attempts: 5,
        },
        ..Config::default()
    };

    let toml_content = toml::to_string_pretty(&original_config)
        .expect("config should convert to toml string successfully");
    fs::write(&config_path, toml_content).expect("should write to config_path successfully");

    let content =
        fs::read_to_string(&config_path).expect("should read from config_path successfully");
    let loaded_config: Config = toml::from_str(&content).expect("should parse toml correctly");

    assert_eq!(original_config, loaded_config);
}

#[test]
fn explicit_config_dir_overrides_default() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let dir = get_config_dir(Some(temp_dir.path().to_path_buf()))
        .expect("explicit directory is always accepted");
    assert_eq!(dir, temp_dir.path());
}

#[test]
fn invalid_toml_handling() {
    let invalid_toml = r#"
        [ollama
        host = "localhost"
        port = "invalid_port"
    "#;

    let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
    assert!(result.is_err());
}

#[test]
fn wrong_field_type_is_rejected() {
    let result: Result<Config, toml::de::Error> = toml::from_str(
        r#"
        [server]
        port = "three thousand"
        "#,
    );
    assert!(result.is_err());
}
