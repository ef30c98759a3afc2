//! # xml-session Library
//!
//! Scoped XML document sessions over libxml2: load a document, optionally validate it against
//! an XSD schema with every diagnostic collected, then query it with XPath, serialize nodes and
//! dump indented trees until the session releases the parse tree.
//!
//! ```no_run
//! use xml_session::{SessionOptions, with_session};
//!
//! xml_session::init();
//! let ids = with_session(
//!     SessionOptions::new("cart.xml").with_schema("cart.xsd"),
//!     |session| Ok(session.xpath("//item/id")?.iter().map(|n| n.content()).collect::<Vec<_>>()),
//! )?;
//! # Ok::<(), xml_session::XmlSessionError>(())
//! ```

pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod error_reporter;
pub mod libxml2;
pub mod output;
pub mod schema;
pub mod serializer;
pub mod session;
pub mod tree;
pub mod xpath;

pub use cli::{Cli, OutputFormat, VerbosityLevel};
pub use config::{Config, ConfigError, ConfigManager};
pub use document::{DocumentLoader, LoaderOptions, Node, NodeKind, XmlDocument};
pub use error::{ErrorKind, Result, XmlSessionError};
pub use libxml2::{EngineDiagnostic, init};
pub use schema::{CompiledSchema, ValidationReport, ValidationStatus};
pub use serializer::node_to_string;
pub use session::{DocumentSession, SessionOptions, with_session};
pub use tree::{TreeRecord, print_tree};
pub use xpath::{XPathEngine, XPathResult, XPathValue};
