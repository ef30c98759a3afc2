//! Document Sessions
//!
//! A [`DocumentSession`] owns one parse tree from load to release:
//!
//! 1. compile the schema, if one was given
//! 2. load the document
//! 3. validate it against the schema
//! 4. serve queries, serialization and tree dumps
//! 5. release the tree, on [`close`](DocumentSession::close) or drop, exactly once
//!
//! A failure in steps 1-3 returns an error and drops whatever was already acquired. After the
//! tree is released every operation fails with `XmlSessionError::Lifecycle`.

use std::path::{Path, PathBuf};

use crate::document::{DocumentLoader, LoaderOptions, Node, XmlDocument};
use crate::error::{Result, XmlSessionError};
use crate::libxml2;
use crate::schema::{CompiledSchema, ValidationReport};
use crate::serializer;
use crate::tree::{self, TreeRecord};
use crate::xpath::{XPathEngine, XPathResult, XPathValue};

/// What a session loads and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub xml_path: PathBuf,
    pub schema_path: Option<PathBuf>,
    pub loader: LoaderOptions,
    /// Prefix/URI pairs registered for every XPath query
    pub namespaces: Vec<(String, String)>,
}

impl SessionOptions {
    pub fn new(xml_path: impl Into<PathBuf>) -> Self {
        Self {
            xml_path: xml_path.into(),
            schema_path: None,
            loader: LoaderOptions::default(),
            namespaces: Vec::new(),
        }
    }

    pub fn with_schema(mut self, schema_path: impl Into<PathBuf>) -> Self {
        self.schema_path = Some(schema_path.into());
        self
    }

    pub fn with_loader(mut self, loader: LoaderOptions) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.push((prefix.into(), uri.into()));
        self
    }
}

/// Scoped owner of a loaded (and optionally validated) document
#[derive(Debug)]
pub struct DocumentSession {
    document: Option<XmlDocument>,
    xpath: XPathEngine,
    report: ValidationReport,
    source: PathBuf,
}

impl DocumentSession {
    /// Load `options.xml_path`, validating it when a schema is given
    ///
    /// # Errors
    ///
    /// - `SchemaInit` if the schema cannot be compiled
    /// - `XmlParse` if the document cannot be read or parsed
    /// - `SchemaValidation` if the document violates the schema
    pub fn open(options: SessionOptions) -> Result<Self> {
        libxml2::init();

        let mut schema = options
            .schema_path
            .as_deref()
            .map(CompiledSchema::compile)
            .transpose()?;

        let document = DocumentLoader::new(options.loader).load(&options.xml_path)?;

        let mut report = ValidationReport::default();
        if let Some(schema) = schema.as_mut() {
            schema.validate(&document)?;
            report = schema.report().clone();
        }

        tracing::debug!(
            source = %options.xml_path.display(),
            validated = schema.is_some(),
            "document session opened"
        );

        Ok(Self {
            document: Some(document),
            xpath: XPathEngine::new().with_namespaces(options.namespaces),
            report,
            source: options.xml_path,
        })
    }

    /// The path this session was opened for
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn is_open(&self) -> bool {
        self.document.is_some()
    }

    /// The live document
    pub fn document(&self) -> Result<&XmlDocument> {
        self.require("access document")
    }

    fn require(&self, operation: &'static str) -> Result<&XmlDocument> {
        self.document.as_ref().ok_or_else(|| {
            tracing::error!(source = %self.source.display(), operation, "document session is closed");
            XmlSessionError::Lifecycle { operation }
        })
    }

    /// The document element
    pub fn root(&self) -> Result<Node<'_>> {
        self.require("get root element")?
            .root()
            .ok_or_else(|| XmlSessionError::XmlParse {
                path: self.source.clone(),
                details: "document has no root element".to_string(),
            })
    }

    /// Evaluate a node-selecting XPath expression
    pub fn xpath(&self, query: &str) -> Result<XPathResult<'_>> {
        let document = self.require("evaluate XPath")?;
        self.xpath.evaluate(document, query)
    }

    /// Evaluate any XPath expression
    pub fn xpath_value(&self, query: &str) -> Result<XPathValue<'_>> {
        let document = self.require("evaluate XPath")?;
        self.xpath.evaluate_value(document, query)
    }

    /// Serialize `node` to entity-decoded UTF-8
    pub fn node_to_string(&self, node: &Node<'_>) -> Result<Vec<u8>> {
        self.require("serialize node")?;
        serializer::node_to_string(node)
    }

    /// Depth-first records for `node`'s subtree
    pub fn tree(&self, node: &Node<'_>) -> Result<Vec<TreeRecord>> {
        self.require("dump tree")?;
        Ok(tree::dump(node))
    }

    /// Report from the validation performed at open; empty when no schema was given
    pub fn validation_report(&self) -> &ValidationReport {
        &self.report
    }

    /// Release the parse tree; later calls are no-ops
    pub fn close(&mut self) {
        if let Some(document) = self.document.take() {
            drop(document);
            tracing::debug!(source = %self.source.display(), "document session closed");
        }
    }
}

impl Drop for DocumentSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Run `f` inside a session; the tree is released whatever `f` returns
pub fn with_session<T, F>(options: SessionOptions, f: F) -> Result<T>
where
    F: FnOnce(&DocumentSession) -> Result<T>,
{
    let mut session = DocumentSession::open(options)?;
    let result = f(&session);
    session.close();
    result
}
