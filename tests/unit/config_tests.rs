use clap::Parser;
use tempfile::TempDir;

use xml_session::config::{Config, ConfigError, OutputFormatConfig};
use xml_session::{Cli, ConfigManager, LoaderOptions};

use crate::common::test_helpers::{create_temp_config, create_test_file};

#[test]
fn test_default_config() {
    let config = Config::default();

    assert_eq!(config.loader_options(), LoaderOptions { keep_blanks: true });
    assert!(config.namespaces().is_empty());
    assert_eq!(config.output.format, OutputFormatConfig::Human);
}

#[test]
fn test_partial_toml_uses_defaults() {
    let (_dir, path) = create_temp_config("xml-session.toml", "[output]\nquiet = true\n").unwrap();

    let config = ConfigManager::load_from_file(&path).unwrap();
    assert!(config.output.quiet);
    assert!(config.parser.keep_blanks);
    assert_eq!(config.output.format, OutputFormatConfig::Human);
}

#[test]
fn test_config_round_trips_through_toml() {
    let mut config = Config::default();
    config.parser.keep_blanks = false;
    config
        .xpath
        .namespaces
        .insert("s".to_string(), "urn:shop".to_string());

    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("config.toml");
    create_test_file(&path, &toml::to_string(&config).unwrap()).unwrap();

    assert_eq!(ConfigManager::load_from_file(&path).unwrap(), config);
}

#[test]
fn test_explicit_config_file_with_cli_overrides() {
    let (_dir, path) = create_temp_config(
        "settings.json",
        r#"{"xpath": {"namespaces": {"s": "urn:shop"}}, "output": {"format": "json"}}"#,
    )
    .unwrap();

    let cli = Cli::try_parse_from([
        "xml-session",
        "--config",
        path.to_str().unwrap(),
        "--ns",
        "t=urn:tax",
        "cart.xml",
    ])
    .unwrap();
    let config = ConfigManager::load_config(&cli).unwrap();

    assert_eq!(
        config.namespaces(),
        vec![
            ("s".to_string(), "urn:shop".to_string()),
            ("t".to_string(), "urn:tax".to_string()),
        ]
    );
    assert_eq!(config.output.format, OutputFormatConfig::Json);
}

#[test]
fn test_missing_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let result = ConfigManager::load_from_file(&temp_dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::Io(_))));
}
