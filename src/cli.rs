use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only show critical errors
    Quiet,
    /// Show standard information
    #[default]
    Normal,
    /// Show detailed information
    Verbose,
    /// Show all available debugging information
    Debug,
}

impl VerbosityLevel {
    pub fn from_flags(verbose: bool, debug: bool, quiet: bool) -> Self {
        if quiet {
            VerbosityLevel::Quiet
        } else if debug {
            VerbosityLevel::Debug
        } else if verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}

/// Output formats for query results
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text
    Human,
    /// JSON, one document per run
    Json,
}

/// Load an XML document, validate it and query it
#[derive(Parser, Debug, Clone)]
#[command(name = "xml-session")]
#[command(about = "Load an XML document, optionally validate it against an XSD schema, and query it")]
#[command(version)]
pub struct Cli {
    /// XML document to load
    #[arg(help = "XML document to load")]
    pub xml: PathBuf,

    /// XSD schema to validate the document against
    #[arg(short = 's', long = "schema")]
    pub schema: Option<PathBuf>,

    /// XPath expressions to evaluate (repeatable)
    #[arg(short = 'x', long = "xpath", action = clap::ArgAction::Append)]
    pub xpath: Vec<String>,

    /// XPath expressions whose matches are serialized (repeatable)
    #[arg(long = "serialize", action = clap::ArgAction::Append)]
    pub serialize: Vec<String>,

    /// XPath expressions whose matches are printed as indented trees (repeatable)
    #[arg(long = "tree", action = clap::ArgAction::Append)]
    pub tree: Vec<String>,

    /// Print the root element name
    #[arg(long = "root")]
    pub root: bool,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Namespace bindings for XPath queries, as prefix=uri (repeatable)
    #[arg(
        long = "ns",
        value_parser = parse_namespace,
        action = clap::ArgAction::Append
    )]
    pub namespaces: Vec<(String, String)>,

    /// Keep whitespace-only text nodes (true/false)
    #[arg(long = "keep-blanks")]
    pub keep_blanks: Option<bool>,

    /// Configuration file (TOML or JSON)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Verbose output; repeat (`-vv`) for debug output
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Enable verbose output (-vv for debug output)"
    )]
    pub verbose: u8,

    /// Enable quiet mode (errors only)
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Quiet mode",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        VerbosityLevel::from_flags(self.verbose >= 1, self.verbose >= 2, self.quiet)
    }
}

/// Parse a `prefix=uri` namespace binding
pub fn parse_namespace(binding: &str) -> Result<(String, String), String> {
    let (prefix, uri) = binding
        .split_once('=')
        .ok_or_else(|| format!("expected prefix=uri, got '{}'", binding))?;
    let (prefix, uri) = (prefix.trim(), uri.trim());

    if prefix.is_empty() || uri.is_empty() {
        return Err(format!("expected prefix=uri, got '{}'", binding));
    }
    Ok((prefix.to_string(), uri.to_string()))
}
