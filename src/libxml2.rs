//! LibXML2 FFI Bindings and Process-Wide Engine Setup
//!
//! This module declares the subset of libxml2 used by the crate (document parsing, XML Schema
//! validation, XPath evaluation and node serialization) and owns the one-time engine
//! configuration every other module relies on.
//!
//! ## Engine Configuration
//!
//! [`init`] must run before any document or schema is handed to libxml2. It:
//!
//! - initializes the parser globals exactly once (`std::sync::Once`)
//! - installs an external entity loader that refuses every request, so documents cannot pull in
//!   external DTD subsets, external parsed entities or remote resources (XXE)
//! - installs a structured error sink that routes engine diagnostics to `tracing` at error level
//!
//! libxml2 keeps the entity loader in a true process global, but the structured error handler
//! lives in its per-thread global state. The loader is therefore installed under the `Once`,
//! while the error sink is installed once per calling thread.
//!
//! ## Thread Safety Strategy
//!
//! - **Initialization**: `xmlInitParser` is not thread-safe, guarded by `Once`
//! - **Schema parsing**: serialized through [`schema_parse_lock`]
//! - **Documents**: each parse tree is owned by one thread for its whole lifetime; the raw
//!   pointer wrappers are neither `Send` nor `Sync`

use std::cell::Cell;
use std::ffi::CStr;
use std::fmt;
use std::ptr::{self, NonNull};
use std::sync::{Mutex, MutexGuard, Once, PoisonError};

use libc::{c_char, c_double, c_int, c_long, c_ushort, c_void};

/// Global initialization flag for libxml2
static LIBXML2_INIT: Once = Once::new();

/// libxml2's schema parser is not re-entrant
static SCHEMA_PARSE_LOCK: Mutex<()> = Mutex::new(());

thread_local! {
    static ERROR_SINK_INSTALLED: Cell<bool> = const { Cell::new(false) };
}

/// Substitute entities
pub const XML_PARSE_NOENT: c_int = 1 << 1;
/// Load the external DTD subset
pub const XML_PARSE_DTDLOAD: c_int = 1 << 2;
/// Remove blank nodes
pub const XML_PARSE_NOBLANKS: c_int = 1 << 8;
/// Forbid network access
pub const XML_PARSE_NONET: c_int = 1 << 11;

/// `xmlErrorLevel`
pub const XML_ERR_NONE: c_int = 0;
pub const XML_ERR_WARNING: c_int = 1;

/// `xmlXPathObjectType`
pub const XPATH_NODESET: c_int = 1;
pub const XPATH_BOOLEAN: c_int = 2;
pub const XPATH_NUMBER: c_int = 3;
pub const XPATH_STRING: c_int = 4;

// Opaque libxml2 structures
#[repr(C)]
pub struct XmlDoc {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchema {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlXPathContext {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlBuffer {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlParserInput {
    _private: [u8; 0],
}

/// Public prefix of `struct _xmlNode`
///
/// Attributes, documents and DTDs share only the fields up to `doc`, so a pointer of this type
/// may address a smaller allocation. Read it field by field through the raw pointer; never
/// form a `&XmlNode`.
#[repr(C)]
pub struct XmlNode {
    pub _private: *mut c_void,
    pub type_: c_int,
    pub name: *const u8,
    pub children: *mut XmlNode,
    pub last: *mut XmlNode,
    pub parent: *mut XmlNode,
    pub next: *mut XmlNode,
    pub prev: *mut XmlNode,
    pub doc: *mut XmlDoc,
    pub ns: *mut XmlNs,
    pub content: *mut u8,
    pub properties: *mut XmlAttr,
    pub ns_def: *mut XmlNs,
    pub psvi: *mut c_void,
    pub line: c_ushort,
    pub extra: c_ushort,
}

/// Public prefix of `struct _xmlAttr`
#[repr(C)]
pub struct XmlAttr {
    pub _private: *mut c_void,
    pub type_: c_int,
    pub name: *const u8,
    pub children: *mut XmlNode,
    pub last: *mut XmlNode,
    pub parent: *mut XmlNode,
    pub next: *mut XmlAttr,
    pub prev: *mut XmlAttr,
    pub doc: *mut XmlDoc,
    pub ns: *mut XmlNs,
}

/// Public prefix of `struct _xmlNs`
#[repr(C)]
pub struct XmlNs {
    pub next: *mut XmlNs,
    pub type_: c_int,
    pub href: *const u8,
    pub prefix: *const u8,
}

#[repr(C)]
pub struct XmlNodeSet {
    pub node_nr: c_int,
    pub node_max: c_int,
    pub node_tab: *mut *mut XmlNode,
}

#[repr(C)]
pub struct XmlXPathObject {
    pub type_: c_int,
    pub nodesetval: *mut XmlNodeSet,
    pub boolval: c_int,
    pub floatval: c_double,
    pub stringval: *mut u8,
    pub user: *mut c_void,
    pub index: c_int,
    pub user2: *mut c_void,
    pub index2: c_int,
}

#[repr(C)]
pub struct xmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    pub int2: c_int,
    pub ctxt: *mut c_void,
    pub node: *mut c_void,
}

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut c_void, error: *const xmlError)>;

pub type XmlExternalEntityLoader = Option<
    unsafe extern "C" fn(
        url: *const c_char,
        id: *const c_char,
        ctxt: *mut XmlParserCtxt,
    ) -> *mut XmlParserInput,
>;

pub type XmlFreeFunc = Option<unsafe extern "C" fn(mem: *mut c_void)>;

// External libxml2 FFI declarations
#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub static xmlFree: XmlFreeFunc;

    pub fn xmlInitParser();

    // Global error and entity handling
    pub fn xmlSetStructuredErrorFunc(ctx: *mut c_void, handler: XmlStructuredErrorFunc);
    pub fn xmlSetExternalEntityLoader(f: XmlExternalEntityLoader);
    pub fn xmlGetLastError() -> *const xmlError;
    pub fn xmlResetLastError();

    // Document parsing and tree access
    pub fn xmlReadMemory(
        buffer: *const c_char,
        size: c_int,
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlDoc;
    pub fn xmlFreeDoc(doc: *mut XmlDoc);
    pub fn xmlDocGetRootElement(doc: *const XmlDoc) -> *mut XmlNode;
    pub fn xmlNodeGetContent(node: *const XmlNode) -> *mut u8;
    pub fn xmlNodeListGetString(doc: *mut XmlDoc, list: *const XmlNode, in_line: c_int)
    -> *mut u8;
    pub fn xmlGetLineNo(node: *const XmlNode) -> c_long;

    // Schema parsing functions
    pub fn xmlSchemaNewMemParserCtxt(
        buffer: *const c_char,
        size: c_int,
    ) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaSetParserStructuredErrors(
        ctxt: *mut XmlSchemaParserCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlSchemaParse(ctxt: *const XmlSchemaParserCtxt) -> *mut XmlSchema;
    pub fn xmlSchemaFreeParserCtxt(ctxt: *mut XmlSchemaParserCtxt);
    pub fn xmlSchemaFree(schema: *mut XmlSchema);

    // Schema validation functions
    pub fn xmlSchemaNewValidCtxt(schema: *const XmlSchema) -> *mut XmlSchemaValidCtxt;
    pub fn xmlSchemaFreeValidCtxt(ctxt: *mut XmlSchemaValidCtxt);
    pub fn xmlSchemaSetValidStructuredErrors(
        ctxt: *mut XmlSchemaValidCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlSchemaValidateDoc(ctxt: *mut XmlSchemaValidCtxt, doc: *mut XmlDoc) -> c_int;

    // XPath
    pub fn xmlXPathNewContext(doc: *mut XmlDoc) -> *mut XmlXPathContext;
    pub fn xmlXPathFreeContext(ctxt: *mut XmlXPathContext);
    pub fn xmlXPathRegisterNs(
        ctxt: *mut XmlXPathContext,
        prefix: *const u8,
        ns_uri: *const u8,
    ) -> c_int;
    pub fn xmlXPathEvalExpression(
        expr: *const u8,
        ctxt: *mut XmlXPathContext,
    ) -> *mut XmlXPathObject;
    pub fn xmlXPathFreeObject(obj: *mut XmlXPathObject);
    pub fn xmlXPathNodeSetSort(set: *mut XmlNodeSet);

    // Serialization
    pub fn xmlBufferCreate() -> *mut XmlBuffer;
    pub fn xmlBufferFree(buf: *mut XmlBuffer);
    pub fn xmlBufferContent(buf: *const XmlBuffer) -> *const u8;
    pub fn xmlBufferLength(buf: *const XmlBuffer) -> c_int;
    pub fn xmlNodeDump(
        buf: *mut XmlBuffer,
        doc: *mut XmlDoc,
        cur: *mut XmlNode,
        level: c_int,
        format: c_int,
    ) -> c_int;
}

/// Initialize libxml2 and install the process-wide engine policy
///
/// Idempotent and safe to call from any thread any number of times. The first call in the
/// process initializes the parser and installs the refusing entity loader; the first call on
/// each thread installs the logging error sink for that thread.
pub fn init() {
    LIBXML2_INIT.call_once(|| unsafe {
        xmlInitParser();
        xmlSetExternalEntityLoader(Some(refusing_entity_loader));
    });

    ERROR_SINK_INSTALLED.with(|installed| {
        if !installed.get() {
            unsafe {
                xmlSetStructuredErrorFunc(ptr::null_mut(), Some(logging_error_callback));
            }
            installed.set(true);
        }
    });
}

/// Hold this guard while compiling a schema
pub(crate) fn schema_parse_lock() -> MutexGuard<'static, ()> {
    SCHEMA_PARSE_LOCK
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Entity loader that never resolves anything
unsafe extern "C" fn refusing_entity_loader(
    url: *const c_char,
    _id: *const c_char,
    _ctxt: *mut XmlParserCtxt,
) -> *mut XmlParserInput {
    let url = unsafe { c_char_to_string(url) }.unwrap_or_else(|| "<unknown>".to_string());
    tracing::warn!(url = %url, "refused to resolve external entity");
    ptr::null_mut()
}

/// Process-wide error sink: every engine diagnostic ends up in the log
unsafe extern "C" fn logging_error_callback(_user_data: *mut c_void, error: *const xmlError) {
    if let Some(diagnostic) = unsafe { EngineDiagnostic::from_raw(error) } {
        tracing::error!(
            domain = diagnostic.domain,
            code = diagnostic.code,
            line = diagnostic.line,
            column = diagnostic.column,
            "libxml2: {}",
            diagnostic.message.trim_end()
        );
    }
}

/// Structured error callback appending every diagnostic to a `Vec<EngineDiagnostic>`
pub(crate) unsafe extern "C" fn collecting_error_callback(
    user_data: *mut c_void,
    error: *const xmlError,
) {
    if user_data.is_null() {
        return;
    }
    let sink = unsafe { &mut *(user_data as *mut Vec<EngineDiagnostic>) };
    if let Some(diagnostic) = unsafe { EngineDiagnostic::from_raw(error) } {
        sink.push(diagnostic);
    }
}

/// Owned copy of a libxml2 `xmlError`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineDiagnostic {
    pub domain: i32,
    pub code: i32,
    pub level: i32,
    /// Message text exactly as produced by libxml2, trailing newline included
    pub message: String,
    pub file: Option<String>,
    pub line: i32,
    pub column: i32,
}

impl EngineDiagnostic {
    /// Copy an engine error out of libxml2-owned memory
    ///
    /// # Safety
    ///
    /// `error` must be null or point to a valid `xmlError` for the duration of the call.
    pub(crate) unsafe fn from_raw(error: *const xmlError) -> Option<Self> {
        if error.is_null() {
            return None;
        }
        let error = unsafe { &*error };
        if error.level == XML_ERR_NONE && error.code == 0 {
            return None;
        }

        Some(EngineDiagnostic {
            domain: error.domain,
            code: error.code,
            level: error.level,
            message: unsafe { c_char_to_string(error.message) }.unwrap_or_default(),
            file: unsafe { c_char_to_string(error.file) },
            line: error.line,
            column: error.int2,
        })
    }

    pub fn is_warning(&self) -> bool {
        self.level == XML_ERR_WARNING
    }
}

impl fmt::Display for EngineDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message.trim_end())?;
        if self.line > 0 {
            write!(f, " (line {}, column {})", self.line, self.column)?;
        }
        Ok(())
    }
}

/// Clear the calling thread's last-error slot
pub(crate) fn reset_last_error() {
    unsafe { xmlResetLastError() }
}

/// The calling thread's most recent engine error, if any
pub(crate) fn last_error() -> Option<EngineDiagnostic> {
    unsafe { EngineDiagnostic::from_raw(xmlGetLastError()) }
}

/// Join diagnostics into a single human-readable detail string
pub(crate) fn describe(diagnostics: &[EngineDiagnostic], fallback: &str) -> String {
    if diagnostics.is_empty() {
        return fallback.to_string();
    }
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// String allocated by libxml2, released with `xmlFree`
pub(crate) struct XmlString {
    ptr: NonNull<u8>,
}

impl XmlString {
    /// # Safety
    ///
    /// `ptr` must be null or a NUL-terminated string allocated by libxml2 that the caller owns.
    pub(crate) unsafe fn from_raw(ptr: *mut u8) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| XmlString { ptr })
    }

    pub(crate) fn to_string_lossy(&self) -> String {
        unsafe { CStr::from_ptr(self.ptr.as_ptr() as *const c_char) }
            .to_string_lossy()
            .into_owned()
    }
}

impl Drop for XmlString {
    fn drop(&mut self) {
        unsafe {
            if let Some(free) = xmlFree {
                free(self.ptr.as_ptr() as *mut c_void);
            }
        }
    }
}

/// Copy a borrowed C string
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string valid for the duration of the call.
pub(crate) unsafe fn c_char_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

/// Copy a borrowed `xmlChar` string
///
/// # Safety
///
/// Same contract as [`c_char_to_string`].
pub(crate) unsafe fn xml_char_to_string(ptr: *const u8) -> Option<String> {
    unsafe { c_char_to_string(ptr as *const c_char) }
}

/// Size of a buffer as libxml2 expects it
pub(crate) fn buffer_len(data: &[u8]) -> Option<c_int> {
    c_int::try_from(data.len()).ok()
}

/// Parser option bits for a document load
pub(crate) fn parse_options(keep_blanks: bool) -> c_int {
    let mut options = XML_PARSE_NONET;
    if !keep_blanks {
        options |= XML_PARSE_NOBLANKS;
    }
    options
}

/// Collect everything logged on the calling thread while `f` runs
#[cfg(test)]
pub(crate) fn capture_logs<F: FnOnce()>(f: F) -> String {
    use std::io;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let buf = SharedBuf::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    tracing::subscriber::with_default(subscriber, f);

    let bytes = buf.0.lock().unwrap_or_else(PoisonError::into_inner).clone();
    String::from_utf8_lossy(&bytes).into_owned()
}
