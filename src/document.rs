//! Document Loading and Tree Access
//!
//! [`DocumentLoader`] reads an XML file into memory and hands the bytes to libxml2, producing an
//! owned [`XmlDocument`]. The parse tree is released exactly once, when the `XmlDocument` is
//! dropped. [`Node`] is a borrowed view into that tree; the borrow checker keeps every node from
//! outliving its document.

use std::ffi::CString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};

use libc::c_char;

use crate::error::{Result, XmlSessionError};
use crate::libxml2::{
    self, XmlDoc, XmlNode, XmlString, buffer_len, describe, last_error, parse_options,
    reset_last_error, xml_char_to_string, xmlDocGetRootElement, xmlFreeDoc, xmlGetLineNo,
    xmlNodeGetContent, xmlNodeListGetString, xmlReadMemory,
};

/// Parser options applied by a [`DocumentLoader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderOptions {
    /// Keep whitespace-only text nodes in the tree
    pub keep_blanks: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self { keep_blanks: true }
    }
}

/// Loads XML files into owned parse trees
#[derive(Debug, Clone, Default)]
pub struct DocumentLoader {
    options: LoaderOptions,
}

impl DocumentLoader {
    pub fn new(options: LoaderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> LoaderOptions {
        self.options
    }

    /// Read and parse an XML file
    ///
    /// # Errors
    ///
    /// Returns `XmlSessionError::XmlParse` if the file cannot be read or is not well-formed.
    pub fn load(&self, path: &Path) -> Result<XmlDocument> {
        libxml2::init();

        let data = std::fs::read(path).map_err(|e| parse_error(path, e.to_string()))?;
        self.parse(&data, path)
    }

    /// Parse an in-memory XML document; `name` identifies it in errors and logs
    pub fn load_from_memory(&self, data: &[u8], name: impl AsRef<Path>) -> Result<XmlDocument> {
        libxml2::init();
        self.parse(data, name.as_ref())
    }

    fn parse(&self, data: &[u8], source: &Path) -> Result<XmlDocument> {
        let size = buffer_len(data)
            .ok_or_else(|| parse_error(source, "document too large for libxml2".to_string()))?;
        let url = CString::new(source.to_string_lossy().into_owned()).ok();

        reset_last_error();
        let doc = unsafe {
            xmlReadMemory(
                data.as_ptr() as *const c_char,
                size,
                url.as_ref().map_or(ptr::null(), |u| u.as_ptr()),
                ptr::null(),
                parse_options(self.options.keep_blanks),
            )
        };

        match NonNull::new(doc) {
            Some(ptr) => {
                tracing::debug!(source = %source.display(), "parsed XML document");
                Ok(XmlDocument {
                    ptr,
                    source: source.to_path_buf(),
                })
            }
            None => {
                let diagnostics: Vec<_> = last_error().into_iter().collect();
                Err(parse_error(
                    source,
                    describe(&diagnostics, "document is not well-formed"),
                ))
            }
        }
    }
}

fn parse_error(path: &Path, details: String) -> XmlSessionError {
    tracing::error!(path = %path.display(), details = %details, "XML file parse error");
    XmlSessionError::XmlParse {
        path: path.to_path_buf(),
        details,
    }
}

/// An owned libxml2 parse tree
///
/// Not `Send`/`Sync`: a tree and its nodes belong to the thread that loaded it.
pub struct XmlDocument {
    ptr: NonNull<XmlDoc>,
    source: PathBuf,
}

impl XmlDocument {
    /// Raw pointer for FFI calls; valid while `self` is alive
    pub(crate) fn as_ptr(&self) -> *mut XmlDoc {
        self.ptr.as_ptr()
    }

    /// The file (or in-memory name) this document was loaded from
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// The document element, if the document has one
    pub fn root(&self) -> Option<Node<'_>> {
        unsafe { Node::from_raw(xmlDocGetRootElement(self.ptr.as_ptr()), self) }
    }
}

impl Drop for XmlDocument {
    fn drop(&mut self) {
        unsafe { xmlFreeDoc(self.ptr.as_ptr()) };
        tracing::debug!(source = %self.source.display(), "released parse tree");
    }
}

impl fmt::Debug for XmlDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlDocument")
            .field("source", &self.source)
            .finish()
    }
}

/// Structural kind of a node, as libxml2 reports it (`xmlElementType`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Element,
    Attribute,
    Text,
    CData,
    EntityRef,
    Entity,
    ProcessingInstruction,
    Comment,
    Document,
    DocumentType,
    DocumentFragment,
    Notation,
    HtmlDocument,
    Dtd,
    ElementDecl,
    AttributeDecl,
    EntityDecl,
    Namespace,
    XIncludeStart,
    XIncludeEnd,
    Other(i32),
}

impl NodeKind {
    pub fn from_raw(value: i32) -> Self {
        match value {
            1 => NodeKind::Element,
            2 => NodeKind::Attribute,
            3 => NodeKind::Text,
            4 => NodeKind::CData,
            5 => NodeKind::EntityRef,
            6 => NodeKind::Entity,
            7 => NodeKind::ProcessingInstruction,
            8 => NodeKind::Comment,
            9 => NodeKind::Document,
            10 => NodeKind::DocumentType,
            11 => NodeKind::DocumentFragment,
            12 => NodeKind::Notation,
            13 => NodeKind::HtmlDocument,
            14 => NodeKind::Dtd,
            15 => NodeKind::ElementDecl,
            16 => NodeKind::AttributeDecl,
            17 => NodeKind::EntityDecl,
            18 => NodeKind::Namespace,
            19 => NodeKind::XIncludeStart,
            20 => NodeKind::XIncludeEnd,
            other => NodeKind::Other(other),
        }
    }

    /// Short tag used in tree dumps
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Element => "element",
            NodeKind::Attribute => "attribute",
            NodeKind::Text => "text",
            NodeKind::CData => "cdata",
            NodeKind::EntityRef => "entity_ref",
            NodeKind::Entity => "entity",
            NodeKind::ProcessingInstruction => "pi",
            NodeKind::Comment => "comment",
            NodeKind::Document => "document_xml",
            NodeKind::DocumentType => "doctype",
            NodeKind::DocumentFragment => "fragment",
            NodeKind::Notation => "notation",
            NodeKind::HtmlDocument => "document_html",
            NodeKind::Dtd => "dtd",
            NodeKind::ElementDecl => "elem_decl",
            NodeKind::AttributeDecl => "attribute_decl",
            NodeKind::EntityDecl => "entity_decl",
            NodeKind::Namespace => "namespace",
            NodeKind::XIncludeStart => "xinclude_start",
            NodeKind::XIncludeEnd => "xinclude_end",
            NodeKind::Other(_) => "unknown",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A borrowed reference into an [`XmlDocument`]'s tree
#[derive(Clone, Copy)]
pub struct Node<'doc> {
    ptr: NonNull<XmlNode>,
    doc: &'doc XmlDocument,
}

impl<'doc> Node<'doc> {
    /// # Safety
    ///
    /// `ptr` must be null or point to a node owned by `doc`'s tree. Every libxml2 tree node
    /// (element, attribute, text, DTD, the document itself) shares the `XmlNode` prefix read
    /// here; `xmlNs` copies must not be passed.
    pub(crate) unsafe fn from_raw(ptr: *mut XmlNode, doc: &'doc XmlDocument) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Node { ptr, doc })
    }

    pub(crate) fn as_ptr(&self) -> *mut XmlNode {
        self.ptr.as_ptr()
    }


    /// The document that owns this node
    pub fn document(&self) -> &'doc XmlDocument {
        self.doc
    }

    pub fn kind(&self) -> NodeKind {
        NodeKind::from_raw(unsafe { (*self.ptr.as_ptr()).type_ })
    }

    pub fn is_element(&self) -> bool {
        self.kind() == NodeKind::Element
    }

    /// Local name; libxml2 names text nodes `text` and comments `comment`
    pub fn name(&self) -> String {
        unsafe { xml_char_to_string((*self.ptr.as_ptr()).name) }.unwrap_or_default()
    }

    /// Concatenated text content of this node and its descendants
    pub fn content(&self) -> String {
        unsafe { XmlString::from_raw(xmlNodeGetContent(self.ptr.as_ptr())) }
            .map(|s| s.to_string_lossy())
            .unwrap_or_default()
    }

    /// Attributes in document order; empty for anything but elements
    pub fn attributes(&self) -> Vec<(String, String)> {
        let mut attributes = Vec::new();
        if !self.is_element() {
            return attributes;
        }

        // Only elements carry `properties`
        let mut attr = unsafe { (*self.ptr.as_ptr()).properties };
        while let Some(current) = unsafe { attr.as_ref() } {
            let name = unsafe { xml_char_to_string(current.name) }.unwrap_or_default();
            let value = unsafe {
                XmlString::from_raw(xmlNodeListGetString(
                    self.doc.as_ptr(),
                    current.children,
                    1,
                ))
            }
            .map(|s| s.to_string_lossy())
            .unwrap_or_default();
            attributes.push((name, value));
            attr = current.next;
        }

        attributes
    }

    /// Value of the attribute `name`, if present
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.attributes()
            .into_iter()
            .find(|(attr_name, _)| attr_name == name)
            .map(|(_, value)| value)
    }

    pub fn first_child(&self) -> Option<Node<'doc>> {
        unsafe { Node::from_raw((*self.ptr.as_ptr()).children, self.doc) }
    }

    pub fn next_sibling(&self) -> Option<Node<'doc>> {
        unsafe { Node::from_raw((*self.ptr.as_ptr()).next, self.doc) }
    }

    pub fn parent(&self) -> Option<Node<'doc>> {
        unsafe { Node::from_raw((*self.ptr.as_ptr()).parent, self.doc) }
    }

    /// Children in document order, walked through the sibling relation
    pub fn children(&self) -> Children<'doc> {
        Children {
            next: self.first_child(),
        }
    }

    /// Source line of this node, when libxml2 recorded one
    pub fn line(&self) -> Option<u32> {
        let line = unsafe { xmlGetLineNo(self.ptr.as_ptr()) };
        u32::try_from(line).ok().filter(|&l| l > 0)
    }
}

impl PartialEq for Node<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl Eq for Node<'_> {}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

/// Iterator over a node's children
pub struct Children<'doc> {
    next: Option<Node<'doc>>,
}

impl<'doc> Iterator for Children<'doc> {
    type Item = Node<'doc>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.next_sibling();
        Some(current)
    }
}
