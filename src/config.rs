use crate::cli::{Cli, OutputFormat};
use crate::document::LoaderOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub parser: ParserConfig,
    pub xpath: XPathConfig,
    pub output: OutputConfig,
}

/// Document parser configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ParserConfig {
    /// Keep whitespace-only text nodes
    pub keep_blanks: bool,
}

/// XPath configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct XPathConfig {
    /// Namespace prefixes registered for every query
    pub namespaces: BTreeMap<String, String>,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format
    pub format: OutputFormatConfig,
    /// Verbose output
    pub verbose: bool,
    /// Debug output, implies verbose
    pub debug: bool,
    /// Quiet mode (errors only)
    pub quiet: bool,
}

/// Output format configuration (serializable version of CLI OutputFormat)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormatConfig {
    Human,
    Json,
}

impl From<OutputFormat> for OutputFormatConfig {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Human => OutputFormatConfig::Human,
            OutputFormat::Json => OutputFormatConfig::Json,
        }
    }
}

impl From<OutputFormatConfig> for OutputFormat {
    fn from(format: OutputFormatConfig) -> Self {
        match format {
            OutputFormatConfig::Human => OutputFormat::Human,
            OutputFormatConfig::Json => OutputFormat::Json,
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self { keep_blanks: true }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormatConfig::Human,
            verbose: false,
            debug: false,
            quiet: false,
        }
    }
}

impl Config {
    pub fn loader_options(&self) -> LoaderOptions {
        LoaderOptions {
            keep_blanks: self.parser.keep_blanks,
        }
    }

    /// Namespace registrations in prefix order
    pub fn namespaces(&self) -> Vec<(String, String)> {
        self.xpath
            .namespaces
            .iter()
            .map(|(prefix, uri)| (prefix.clone(), uri.clone()))
            .collect()
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: file -> environment -> CLI
    pub fn load_config(cli: &Cli) -> Result<Config> {
        // Start with default configuration
        let mut config = Config::default();

        // Load from configuration file if specified
        if let Some(config_path) = &cli.config {
            let file_config = Self::load_from_file(config_path)?;
            config = Self::merge_configs(config, file_config);
        } else if let Some(found_config) = Self::find_config_file()? {
            config = Self::merge_configs(config, found_config);
        }

        // Apply environment variable overrides
        config = Self::apply_environment_overrides(config)?;

        // Apply CLI argument overrides (highest precedence)
        config = Self::merge_with_cli(config, cli);

        // Validate the final configuration
        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try to parse as TOML first, then JSON
                if let Ok(config) = toml::from_str::<Config>(&content) {
                    Ok(config)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find configuration file in standard locations
    pub fn find_config_file() -> Result<Option<Config>> {
        let config_names = [
            "xml-session.toml",
            "xml-session.json",
            ".xml-session.toml",
            ".xml-session.json",
        ];

        // Check current directory first
        for name in &config_names {
            let path = PathBuf::from(name);
            if path.exists() {
                return Ok(Some(Self::load_from_file(&path)?));
            }
        }

        // Check user config directory
        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("xml-session");
            for name in &config_names {
                let path = app_config_dir.join(name);
                if path.exists() {
                    return Ok(Some(Self::load_from_file(&path)?));
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: Config) -> Result<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        // Parser settings
        if let Some(keep_blanks) = env.get("XML_SESSION_KEEP_BLANKS") {
            config.parser.keep_blanks = keep_blanks.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid XML_SESSION_KEEP_BLANKS value: {}",
                    keep_blanks
                ))
            })?;
        }

        // XPath settings
        if let Some(namespaces) = env.get("XML_SESSION_NAMESPACES") {
            for binding in namespaces.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let (prefix, uri) = crate::cli::parse_namespace(binding).map_err(|_| {
                    ConfigError::Environment(format!(
                        "Invalid XML_SESSION_NAMESPACES entry: {}",
                        binding
                    ))
                })?;
                config.xpath.namespaces.insert(prefix, uri);
            }
        }

        // Output settings
        if let Some(verbose) = env.get("XML_SESSION_VERBOSE") {
            config.output.verbose = verbose.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid XML_SESSION_VERBOSE value: {}", verbose))
            })?;
        }

        if let Some(debug) = env.get("XML_SESSION_DEBUG") {
            config.output.debug = debug.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid XML_SESSION_DEBUG value: {}", debug))
            })?;
        }

        if let Some(quiet) = env.get("XML_SESSION_QUIET") {
            config.output.quiet = quiet.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid XML_SESSION_QUIET value: {}", quiet))
            })?;
        }

        if let Some(format) = env.get("XML_SESSION_FORMAT") {
            config.output.format = match format.to_lowercase().as_str() {
                "human" => OutputFormatConfig::Human,
                "json" => OutputFormatConfig::Json,
                _ => {
                    return Err(ConfigError::Environment(format!(
                        "Invalid XML_SESSION_FORMAT value: {}",
                        format
                    )));
                }
            };
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence where given)
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Config {
        if let Some(keep_blanks) = cli.keep_blanks {
            config.parser.keep_blanks = keep_blanks;
        }

        for (prefix, uri) in &cli.namespaces {
            config.xpath.namespaces.insert(prefix.clone(), uri.clone());
        }

        if let Some(format) = cli.output_format {
            config.output.format = format.into();
        }
        if cli.verbose > 0 {
            config.output.verbose = true;
            config.output.debug = cli.verbose > 1;
            config.output.quiet = false;
        }
        if cli.quiet {
            config.output.quiet = true;
            config.output.verbose = false;
            config.output.debug = false;
        }

        config
    }

    /// Merge two configurations (second takes precedence)
    pub fn merge_configs(mut base: Config, override_config: Config) -> Config {
        base.parser.keep_blanks = override_config.parser.keep_blanks;

        // Namespace maps are unioned, override wins per prefix
        base.xpath
            .namespaces
            .extend(override_config.xpath.namespaces);

        base.output.format = override_config.output.format;
        base.output.verbose = override_config.output.verbose;
        base.output.debug = override_config.output.debug;
        base.output.quiet = override_config.output.quiet;

        base
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        if (config.output.verbose || config.output.debug) && config.output.quiet {
            return Err(ConfigError::Validation(
                "Cannot enable both verbose and quiet modes".to_string(),
            ));
        }

        for (prefix, uri) in &config.xpath.namespaces {
            if prefix.is_empty() || prefix.contains(':') {
                return Err(ConfigError::Validation(format!(
                    "Invalid namespace prefix: '{}'",
                    prefix
                )));
            }
            if uri.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Namespace URI for prefix '{}' must not be empty",
                    prefix
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::VerbosityLevel;
    use clap::Parser;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    /// Mock environment variable provider for testing
    #[derive(Default)]
    struct MockEnvProvider {
        vars: HashMap<String, String>,
    }

    impl MockEnvProvider {
        fn new() -> Self {
            Self {
                vars: HashMap::new(),
            }
        }

        fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
            self.vars.insert(key.into(), value.into());
        }
    }

    impl EnvProvider for MockEnvProvider {
        fn get(&self, key: &str) -> Option<String> {
            self.vars.get(key).cloned()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.parser.keep_blanks);
        assert!(config.xpath.namespaces.is_empty());
        assert_eq!(config.output.format, OutputFormatConfig::Human);
        assert!(!config.output.verbose);
        assert!(!config.output.debug);
        assert!(!config.output.quiet);
        assert_eq!(config.loader_options(), LoaderOptions::default());
    }

    #[test]
    fn test_load_toml_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let toml_content = r#"
[parser]
keep_blanks = false

[xpath.namespaces]
s = "urn:shop"
inv = "urn:inventory"

[output]
format = "json"
verbose = true
"#;

        fs::write(&config_path, toml_content).unwrap();

        let config = ConfigManager::load_from_file(&config_path).unwrap();

        assert!(!config.parser.keep_blanks);
        assert_eq!(
            config.namespaces(),
            vec![
                ("inv".to_string(), "urn:inventory".to_string()),
                ("s".to_string(), "urn:shop".to_string()),
            ]
        );
        assert_eq!(config.output.format, OutputFormatConfig::Json);
        assert!(config.output.verbose);
        assert!(!config.output.quiet);
    }

    #[test]
    fn test_load_json_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        fs::write(
            &config_path,
            r#"{"parser": {"keep_blanks": false}, "output": {"format": "human", "quiet": true}}"#,
        )
        .unwrap();

        let config = ConfigManager::load_from_file(&config_path).unwrap();
        assert!(!config.parser.keep_blanks);
        assert!(config.output.quiet);
        assert!(config.xpath.namespaces.is_empty());
    }

    #[test]
    fn test_unsupported_file_format() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "parser: {}").unwrap();

        let result = ConfigManager::load_from_file(&config_path);
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(ext)) if ext == "yaml"));
    }

    #[test]
    fn test_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[parser\nkeep_blanks = ").unwrap();

        let result = ConfigManager::load_from_file(&config_path);
        assert!(matches!(result.unwrap_err(), ConfigError::TomlParsing(_)));
    }

    #[test]
    fn test_invalid_json() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        fs::write(&config_path, "{ not json").unwrap();

        let result = ConfigManager::load_from_file(&config_path);
        assert!(matches!(result.unwrap_err(), ConfigError::JsonParsing(_)));
    }

    #[test]
    fn test_environment_overrides() {
        let mut mock_env = MockEnvProvider::new();
        mock_env.set("XML_SESSION_KEEP_BLANKS", "false");
        mock_env.set("XML_SESSION_NAMESPACES", "s=urn:shop, x=urn:x");
        mock_env.set("XML_SESSION_VERBOSE", "true");
        mock_env.set("XML_SESSION_DEBUG", "true");
        mock_env.set("XML_SESSION_FORMAT", "json");

        let config =
            ConfigManager::apply_environment_overrides_with(&mock_env, Config::default()).unwrap();

        assert!(!config.parser.keep_blanks);
        assert_eq!(config.xpath.namespaces.get("s").map(String::as_str), Some("urn:shop"));
        assert_eq!(config.xpath.namespaces.get("x").map(String::as_str), Some("urn:x"));
        assert!(config.output.verbose);
        assert!(config.output.debug);
        assert_eq!(config.output.format, OutputFormatConfig::Json);
    }

    #[test]
    fn test_invalid_environment_values() {
        for (key, value) in [
            ("XML_SESSION_KEEP_BLANKS", "sometimes"),
            ("XML_SESSION_FORMAT", "yaml"),
            ("XML_SESSION_NAMESPACES", "no-equals-sign"),
        ] {
            let mut mock_env = MockEnvProvider::new();
            mock_env.set(key, value);

            let result = ConfigManager::apply_environment_overrides_with(&mock_env, Config::default());
            assert!(matches!(result.unwrap_err(), ConfigError::Environment(_)), "{}", key);
        }
    }

    #[test]
    fn test_merge_with_cli() {
        let cli = Cli::try_parse_from([
            "xml-session",
            "--keep-blanks",
            "false",
            "--ns",
            "s=urn:shop",
            "--format",
            "json",
            "--quiet",
            "cart.xml",
        ])
        .unwrap();

        let mut base_config = Config::default();
        base_config.output.verbose = true;
        let config = ConfigManager::merge_with_cli(base_config, &cli);

        assert!(!config.parser.keep_blanks);
        assert_eq!(config.namespaces(), vec![("s".to_string(), "urn:shop".to_string())]);
        assert_eq!(config.output.format, OutputFormatConfig::Json);
        assert!(config.output.quiet);
        assert!(!config.output.verbose);
    }

    #[test]
    fn test_merge_repeated_verbose_enables_debug() {
        let cli = Cli::try_parse_from(["xml-session", "-vv", "cart.xml"]).unwrap();
        let config = ConfigManager::merge_with_cli(Config::default(), &cli);

        assert!(config.output.verbose);
        assert!(config.output.debug);
        assert_eq!(
            VerbosityLevel::from_flags(config.output.verbose, config.output.debug, config.output.quiet),
            VerbosityLevel::Debug
        );

        let cli = Cli::try_parse_from(["xml-session", "-v", "cart.xml"]).unwrap();
        let config = ConfigManager::merge_with_cli(config, &cli);
        assert!(config.output.verbose);
        assert!(!config.output.debug);
    }

    #[test]
    fn test_cli_without_overrides_keeps_config() {
        let cli = Cli::try_parse_from(["xml-session", "cart.xml"]).unwrap();

        let mut base_config = Config::default();
        base_config.parser.keep_blanks = false;
        base_config.output.format = OutputFormatConfig::Json;
        let config = ConfigManager::merge_with_cli(base_config.clone(), &cli);

        assert_eq!(config, base_config);
    }

    #[test]
    fn test_merge_configs() {
        let mut base = Config::default();
        base.xpath
            .namespaces
            .insert("a".to_string(), "urn:a".to_string());

        let mut override_config = Config::default();
        override_config.parser.keep_blanks = false;
        override_config
            .xpath
            .namespaces
            .insert("b".to_string(), "urn:b".to_string());

        let merged = ConfigManager::merge_configs(base, override_config);

        assert!(!merged.parser.keep_blanks);
        assert_eq!(merged.xpath.namespaces.len(), 2);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(ConfigManager::validate_config(&config).is_ok());

        config.output.verbose = true;
        config.output.quiet = true;
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = Config::default();
        config.output.debug = true;
        config.output.quiet = true;
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = Config::default();
        config
            .xpath
            .namespaces
            .insert(String::new(), "urn:x".to_string());
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = Config::default();
        config.xpath.namespaces.insert("x".to_string(), String::new());
        assert!(ConfigManager::validate_config(&config).is_err());
    }

    #[test]
    fn test_output_format_conversion() {
        assert_eq!(
            OutputFormatConfig::from(OutputFormat::Human),
            OutputFormatConfig::Human
        );
        assert_eq!(
            OutputFormatConfig::from(OutputFormat::Json),
            OutputFormatConfig::Json
        );
        assert_eq!(
            OutputFormat::from(OutputFormatConfig::Human),
            OutputFormat::Human
        );
        assert_eq!(
            OutputFormat::from(OutputFormatConfig::Json),
            OutputFormat::Json
        );
    }

    #[test]
    fn test_load_config_integration() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");
        fs::write(
            &config_path,
            r#"
[parser]
keep_blanks = false

[output]
format = "json"
"#,
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "xml-session",
            "--config",
            config_path.to_str().unwrap(),
            "--format",
            "human",
            "cart.xml",
        ])
        .unwrap();
        let config = ConfigManager::load_config(&cli).unwrap();

        // CLI overrides the file, the file overrides defaults
        assert_eq!(config.output.format, OutputFormatConfig::Human);
        assert!(!config.parser.keep_blanks);
    }
}
