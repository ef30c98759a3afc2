//! XPath Evaluation
//!
//! Every query runs in its own libxml2 XPath context, created for that call and freed before the
//! call returns, on success and failure alike. Node-set results are sorted into document order
//! and copied into a `Vec<Node>` before the engine's result object is released.

use std::backtrace::Backtrace;
use std::ffi::CString;
use std::ptr::NonNull;

use crate::document::{Node, NodeKind, XmlDocument};
use crate::error::{Result, XmlSessionError};
use crate::libxml2::{
    XPATH_BOOLEAN, XPATH_NODESET, XPATH_NUMBER, XPATH_STRING, XmlXPathContext, XmlXPathObject,
    describe, last_error, reset_last_error, xml_char_to_string, xmlXPathEvalExpression,
    xmlXPathFreeContext, xmlXPathFreeObject, xmlXPathNewContext, xmlXPathNodeSetSort,
    xmlXPathRegisterNs,
};

/// Nodes selected by one query, in document order
pub type XPathResult<'doc> = Vec<Node<'doc>>;

/// Any value an XPath 1.0 expression can produce
#[derive(Debug, Clone, PartialEq)]
pub enum XPathValue<'doc> {
    NodeSet(Vec<Node<'doc>>),
    Boolean(bool),
    Number(f64),
    String(String),
}

impl XPathValue<'_> {
    pub fn type_name(&self) -> &'static str {
        match self {
            XPathValue::NodeSet(_) => "node-set",
            XPathValue::Boolean(_) => "boolean",
            XPathValue::Number(_) => "number",
            XPathValue::String(_) => "string",
        }
    }
}

/// Scoped `xmlXPathContext`, freed on drop
struct QueryContext {
    ptr: NonNull<XmlXPathContext>,
}

impl QueryContext {
    fn new(document: &XmlDocument) -> Option<Self> {
        NonNull::new(unsafe { xmlXPathNewContext(document.as_ptr()) }).map(|ptr| QueryContext { ptr })
    }
}

impl Drop for QueryContext {
    fn drop(&mut self) {
        unsafe { xmlXPathFreeContext(self.ptr.as_ptr()) }
    }
}

/// Owned `xmlXPathObject`, freed on drop
struct QueryObject {
    ptr: NonNull<XmlXPathObject>,
}

impl Drop for QueryObject {
    fn drop(&mut self) {
        unsafe { xmlXPathFreeObject(self.ptr.as_ptr()) }
    }
}

impl QueryObject {
    /// Copy the result out of engine memory
    fn to_value<'doc>(&self, document: &'doc XmlDocument, query: &str) -> Result<XPathValue<'doc>> {
        let obj = unsafe { self.ptr.as_ref() };

        match obj.type_ {
            XPATH_NODESET => {
                let mut nodes = Vec::new();
                let Some(set) = NonNull::new(obj.nodesetval) else {
                    return Ok(XPathValue::NodeSet(nodes));
                };

                unsafe { xmlXPathNodeSetSort(set.as_ptr()) };
                let set = unsafe { set.as_ref() };
                for i in 0..usize::try_from(set.node_nr).unwrap_or(0) {
                    let raw = unsafe { *set.node_tab.add(i) };
                    if raw.is_null() {
                        continue;
                    }
                    // Namespace nodes are per-query copies freed along with the result
                    if NodeKind::from_raw(unsafe { (*raw).type_ }) == NodeKind::Namespace {
                        tracing::debug!(query = %query, "skipping namespace node in result");
                        continue;
                    }
                    if let Some(node) = unsafe { Node::from_raw(raw, document) } {
                        nodes.push(node);
                    }
                }
                Ok(XPathValue::NodeSet(nodes))
            }
            XPATH_BOOLEAN => Ok(XPathValue::Boolean(obj.boolval != 0)),
            XPATH_NUMBER => Ok(XPathValue::Number(obj.floatval)),
            XPATH_STRING => Ok(XPathValue::String(
                unsafe { xml_char_to_string(obj.stringval) }.unwrap_or_default(),
            )),
            other => Err(xpath_error(
                query,
                format!("unsupported XPath result type {}", other),
            )),
        }
    }
}

/// Evaluates XPath expressions against documents
#[derive(Debug, Clone, Default)]
pub struct XPathEngine {
    namespaces: Vec<(String, String)>,
}

impl XPathEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `prefix` for `uri` in every query context this engine creates
    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.push((prefix.into(), uri.into()));
        self
    }

    pub fn with_namespaces<I, P, U>(self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = (P, U)>,
        P: Into<String>,
        U: Into<String>,
    {
        namespaces
            .into_iter()
            .fold(self, |engine, (prefix, uri)| engine.with_namespace(prefix, uri))
    }

    pub fn namespaces(&self) -> &[(String, String)] {
        &self.namespaces
    }

    /// Evaluate a node-selecting expression
    ///
    /// # Errors
    ///
    /// Returns `XmlSessionError::XPathContext` if the context cannot be created, the expression
    /// is malformed, or it evaluates to something other than a node-set.
    pub fn evaluate<'doc>(
        &self,
        document: &'doc XmlDocument,
        query: &str,
    ) -> Result<XPathResult<'doc>> {
        match self.evaluate_value(document, query)? {
            XPathValue::NodeSet(nodes) => Ok(nodes),
            other => Err(xpath_error(
                query,
                format!("expression evaluated to a {}, not a node-set", other.type_name()),
            )),
        }
    }

    /// Evaluate any expression, including ones producing booleans, numbers or strings
    pub fn evaluate_value<'doc>(
        &self,
        document: &'doc XmlDocument,
        query: &str,
    ) -> Result<XPathValue<'doc>> {
        if query.trim().is_empty() {
            return Err(xpath_error(query, "empty XPath expression".to_string()));
        }
        let expr = CString::new(query)
            .map_err(|_| xpath_error(query, "expression contains a NUL byte".to_string()))?;

        let ctxt = QueryContext::new(document)
            .ok_or_else(|| xpath_error(query, "failed to create XPath context".to_string()))?;

        for (prefix, uri) in &self.namespaces {
            self.register_namespace(&ctxt, query, prefix, uri)?;
        }

        reset_last_error();
        let obj = NonNull::new(unsafe {
            xmlXPathEvalExpression(expr.as_ptr() as *const u8, ctxt.ptr.as_ptr())
        })
        .map(|ptr| QueryObject { ptr })
        .ok_or_else(|| {
            let diagnostics: Vec<_> = last_error().into_iter().collect();
            xpath_error(query, describe(&diagnostics, "XPath evaluation failed"))
        })?;

        obj.to_value(document, query)
    }

    fn register_namespace(
        &self,
        ctxt: &QueryContext,
        query: &str,
        prefix: &str,
        uri: &str,
    ) -> Result<()> {
        let invalid = || xpath_error(query, format!("cannot register namespace '{}'", prefix));
        let c_prefix = CString::new(prefix).map_err(|_| invalid())?;
        let c_uri = CString::new(uri).map_err(|_| invalid())?;

        let rc = unsafe {
            xmlXPathRegisterNs(
                ctxt.ptr.as_ptr(),
                c_prefix.as_ptr() as *const u8,
                c_uri.as_ptr() as *const u8,
            )
        };
        if rc != 0 {
            return Err(invalid());
        }
        Ok(())
    }
}

fn xpath_error(query: &str, details: String) -> XmlSessionError {
    let backtrace = Backtrace::force_capture();
    tracing::error!(
        query = %query,
        details = %details,
        backtrace = %backtrace,
        "XPath context error"
    );
    XmlSessionError::XPathContext {
        query: query.to_string(),
        details,
    }
}
