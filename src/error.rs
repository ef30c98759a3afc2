use std::path::PathBuf;

use thiserror::Error;

use crate::schema::ValidationReport;

/// Main library error type that encompasses all possible failure modes
#[derive(Error, Debug)]
pub enum XmlSessionError {
    #[error("XSD initialization failed: {path} - {details}")]
    SchemaInit { path: PathBuf, details: String },

    #[error("XML file parse error: {path} - {details}")]
    XmlParse { path: PathBuf, details: String },

    #[error(
        "XSD validation failed: {} error(s), {} warning(s)",
        .0.errors.len(),
        .0.warnings.len()
    )]
    SchemaValidation(ValidationReport),

    #[error("XPath context error: '{query}' - {details}")]
    XPathContext { query: String, details: String },

    #[error("Document is not loaded: cannot {operation}")]
    Lifecycle { operation: &'static str },

    #[error("Node serialization failed: {details}")]
    Serialization { details: String },
}

/// Tag identifying the kind of an [`XmlSessionError`] without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SchemaInit,
    XmlParse,
    SchemaValidation,
    XPathContext,
    Lifecycle,
    Serialization,
}

impl XmlSessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            XmlSessionError::SchemaInit { .. } => ErrorKind::SchemaInit,
            XmlSessionError::XmlParse { .. } => ErrorKind::XmlParse,
            XmlSessionError::SchemaValidation(_) => ErrorKind::SchemaValidation,
            XmlSessionError::XPathContext { .. } => ErrorKind::XPathContext,
            XmlSessionError::Lifecycle { .. } => ErrorKind::Lifecycle,
            XmlSessionError::Serialization { .. } => ErrorKind::Serialization,
        }
    }

    /// The validation report, if this is a schema validation failure
    pub fn report(&self) -> Option<&ValidationReport> {
        match self {
            XmlSessionError::SchemaValidation(report) => Some(report),
            _ => None,
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, XmlSessionError>;
