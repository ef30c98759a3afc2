use crate::cli::VerbosityLevel;
use crate::config::ConfigError;
use crate::error::{ErrorKind, XmlSessionError};

/// Error reporter with configurable verbosity
pub struct ErrorReporter {
    verbosity: VerbosityLevel,
}

impl ErrorReporter {
    /// Create a new error reporter with specified verbosity
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self { verbosity }
    }

    /// Report a session error with appropriate verbosity
    pub fn report_session_error(&self, error: &XmlSessionError) {
        if let Some(formatted) = self.format_session_error(error) {
            eprintln!("{}", formatted);
        }
    }

    /// Render a session error; `None` when the verbosity level suppresses it
    pub fn format_session_error(&self, error: &XmlSessionError) -> Option<String> {
        match self.verbosity {
            VerbosityLevel::Quiet => self
                .is_critical_error(error)
                .then(|| self.format_error_brief(error)),
            VerbosityLevel::Normal => Some(error.to_string()),
            VerbosityLevel::Verbose => Some(self.format_error_verbose(error)),
            VerbosityLevel::Debug => Some(self.format_error_debug(error)),
        }
    }

    /// Report a configuration error
    pub fn report_config_error(&self, error: &ConfigError) {
        eprintln!("{}", self.format_config_error(error));
    }

    pub fn format_config_error(&self, error: &ConfigError) -> String {
        match self.verbosity {
            VerbosityLevel::Quiet => format!("Config error: {}", error),
            VerbosityLevel::Normal | VerbosityLevel::Verbose => {
                format!(
                    "Configuration Error: {}\n{}",
                    error,
                    self.get_config_help(error)
                )
            }
            VerbosityLevel::Debug => {
                format!(
                    "Configuration Error: {}\nDebug: {:?}\n{}",
                    error,
                    error,
                    self.get_config_help(error)
                )
            }
        }
    }

    /// Validation failures are already shown in the run output; everything else is critical
    fn is_critical_error(&self, error: &XmlSessionError) -> bool {
        error.kind() != ErrorKind::SchemaValidation
    }

    /// Format error for brief output (quiet mode)
    fn format_error_brief(&self, error: &XmlSessionError) -> String {
        match error {
            XmlSessionError::SchemaInit { path, .. } => {
                format!("SCHEMA ERROR: {}", path.display())
            }
            XmlSessionError::XmlParse { path, .. } => {
                format!("PARSE ERROR: {}", path.display())
            }
            XmlSessionError::XPathContext { query, .. } => {
                format!("XPATH ERROR: {}", query)
            }
            _ => format!("ERROR: {}", error),
        }
    }

    /// Format error for verbose output
    fn format_error_verbose(&self, error: &XmlSessionError) -> String {
        let mut output = error.to_string();

        // Add context and suggestions based on error type
        match error {
            XmlSessionError::SchemaInit { path, .. } => {
                output.push_str(&format!("\nSchema: {}", path.display()));
                output.push_str(
                    "\nSuggestion: Check the schema is a readable, self-contained XSD \
                     (external includes and imports are not fetched)",
                );
            }
            XmlSessionError::XmlParse { path, .. } => {
                output.push_str(&format!("\nFile: {}", path.display()));
                output.push_str("\nSuggestion: Check the file exists and is well-formed XML");
            }
            XmlSessionError::SchemaValidation(report) => {
                for error in &report.errors {
                    output.push_str(&format!("\n  error: {}", error.trim_end()));
                }
                for warning in &report.warnings {
                    output.push_str(&format!("\n  warning: {}", warning.trim_end()));
                }
            }
            XmlSessionError::XPathContext { details, .. } => {
                output.push_str(&format!("\nDetails: {}", details));
                output.push_str(
                    "\nSuggestion: Check the expression syntax and bind any prefixes with --ns",
                );
            }
            XmlSessionError::Lifecycle { .. } | XmlSessionError::Serialization { .. } => {}
        }

        output
    }

    /// Format error for debug output
    fn format_error_debug(&self, error: &XmlSessionError) -> String {
        let mut output = self.format_error_verbose(error);
        output.push_str(&format!("\nDebug Info: {:?}", error));

        output.push_str("\nError Chain:");
        let mut current_error: &dyn std::error::Error = error;
        let mut level = 0;
        while let Some(source) = current_error.source() {
            output.push_str(&format!("\n  {}: {}", level + 1, source));
            current_error = source;
            level += 1;
        }

        output
    }

    /// Get helpful suggestions for configuration errors
    fn get_config_help(&self, error: &ConfigError) -> String {
        match error {
            ConfigError::Io(_) => "Check the configuration file path and permissions".to_string(),
            ConfigError::TomlParsing(_) | ConfigError::JsonParsing(_) => {
                "Check the configuration file syntax (TOML/JSON format expected)".to_string()
            }
            ConfigError::UnsupportedFormat(_) => {
                "Use a .toml or .json configuration file".to_string()
            }
            ConfigError::Environment(_) => {
                "Fix or unset the XML_SESSION_* environment variable".to_string()
            }
            ConfigError::Validation(_) => {
                "Resolve conflicting configuration values between file, environment, and CLI"
                    .to_string()
            }
        }
    }
}
