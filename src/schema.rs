//! XML Schema Compilation and Validation
//!
//! A [`CompiledSchema`] owns the parsed `xmlSchema`, one validation context and the diagnostic
//! sink that context reports into. libxml2 delivers validity errors and warnings through a
//! structured callback, in the order it detects them; the callback appends each message verbatim
//! (trailing newline included) to the sink.
//!
//! The sink is reset at the start of every [`CompiledSchema::validate`] call, so a report only
//! ever reflects the most recent validation.

use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use libc::{c_char, c_int, c_void};
use serde::{Deserialize, Serialize};

use crate::document::XmlDocument;
use crate::error::{Result, XmlSessionError};
use crate::libxml2::{
    self, EngineDiagnostic, XmlSchema, XmlSchemaValidCtxt, buffer_len, collecting_error_callback,
    describe, schema_parse_lock, xmlError, xmlSchemaFree, xmlSchemaFreeParserCtxt,
    xmlSchemaFreeValidCtxt, xmlSchemaNewMemParserCtxt, xmlSchemaNewValidCtxt, xmlSchemaParse,
    xmlSchemaSetParserStructuredErrors, xmlSchemaSetValidStructuredErrors, xmlSchemaValidateDoc,
};

/// Diagnostics produced by one validation attempt, in arrival order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    fn clear(&mut self) {
        self.errors.clear();
        self.warnings.clear();
    }
}

/// Outcome of `xmlSchemaValidateDoc`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStatus {
    /// Validation succeeded (return code 0)
    Valid,
    /// Document violates the schema (return code > 0)
    Invalid { error_count: i32 },
    /// Internal error occurred (return code < 0)
    InternalError { code: i32 },
}

impl ValidationStatus {
    pub fn from_code(code: c_int) -> Self {
        match code {
            0 => ValidationStatus::Valid,
            n if n > 0 => ValidationStatus::Invalid { error_count: n },
            n => ValidationStatus::InternalError { code: n },
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationStatus::Valid)
    }
}

/// Callback for libxml2 to report validity errors and warnings (structured)
unsafe extern "C" fn validity_callback(user_data: *mut c_void, error: *const xmlError) {
    if user_data.is_null() {
        return;
    }
    let sink = unsafe { &mut *(user_data as *mut ValidationReport) };

    if let Some(diagnostic) = unsafe { EngineDiagnostic::from_raw(error) } {
        if diagnostic.is_warning() {
            sink.warnings.push(diagnostic.message);
        } else {
            sink.errors.push(diagnostic.message);
        }
    }
}

/// Owning wrapper for a libxml2 schema pointer
#[derive(Debug)]
struct XmlSchemaPtr {
    ptr: NonNull<XmlSchema>,
}

impl Drop for XmlSchemaPtr {
    fn drop(&mut self) {
        unsafe { xmlSchemaFree(self.ptr.as_ptr()) }
    }
}

/// Owning wrapper for a validation context
#[derive(Debug)]
struct ValidCtxtPtr {
    ptr: NonNull<XmlSchemaValidCtxt>,
}

impl Drop for ValidCtxtPtr {
    fn drop(&mut self) {
        unsafe { xmlSchemaFreeValidCtxt(self.ptr.as_ptr()) }
    }
}

/// A compiled XSD schema ready to validate documents
///
/// Fields drop in declaration order: the validation context goes before the schema it
/// references.
#[derive(Debug)]
pub struct CompiledSchema {
    valid_ctxt: ValidCtxtPtr,
    _schema: XmlSchemaPtr,
    sink: NonNull<ValidationReport>,
    source: PathBuf,
}

impl CompiledSchema {
    /// Read and compile an XSD file
    ///
    /// # Errors
    ///
    /// Returns `XmlSessionError::SchemaInit` if the file cannot be read or does not compile.
    pub fn compile(path: &Path) -> Result<Self> {
        libxml2::init();

        let data = std::fs::read(path).map_err(|e| init_error(path, e.to_string()))?;
        Self::compile_from_memory(&data, path)
    }

    /// Compile an in-memory XSD; `name` identifies it in errors and logs
    ///
    /// `xs:include`/`xs:import` targets go through the refusing entity loader and are
    /// therefore never fetched.
    pub fn compile_from_memory(data: &[u8], name: impl AsRef<Path>) -> Result<Self> {
        libxml2::init();
        let source = name.as_ref();

        let size = buffer_len(data)
            .ok_or_else(|| init_error(source, "schema too large for libxml2".to_string()))?;

        let mut diagnostics: Vec<EngineDiagnostic> = Vec::new();
        let schema_ptr = {
            let _guard = schema_parse_lock();
            unsafe {
                let parser_ctxt = xmlSchemaNewMemParserCtxt(data.as_ptr() as *const c_char, size);
                if parser_ctxt.is_null() {
                    return Err(init_error(
                        source,
                        "failed to create schema parser context".to_string(),
                    ));
                }

                xmlSchemaSetParserStructuredErrors(
                    parser_ctxt,
                    Some(collecting_error_callback),
                    &mut diagnostics as *mut Vec<EngineDiagnostic> as *mut c_void,
                );

                let schema_ptr = xmlSchemaParse(parser_ctxt);

                // Always free the parser context
                xmlSchemaFreeParserCtxt(parser_ctxt);
                schema_ptr
            }
        };

        let Some(ptr) = NonNull::new(schema_ptr) else {
            return Err(init_error(
                source,
                describe(&diagnostics, "schema could not be compiled"),
            ));
        };
        let schema = XmlSchemaPtr { ptr };

        for warning in diagnostics.iter().filter(|d| d.is_warning()) {
            tracing::warn!(schema = %source.display(), "{}", warning);
        }

        let valid_ctxt = NonNull::new(unsafe { xmlSchemaNewValidCtxt(schema.ptr.as_ptr()) })
            .map(|ptr| ValidCtxtPtr { ptr })
            .ok_or_else(|| {
                init_error(source, "failed to create validation context".to_string())
            })?;

        let sink = NonNull::from(Box::leak(Box::new(ValidationReport::default())));
        unsafe {
            xmlSchemaSetValidStructuredErrors(
                valid_ctxt.ptr.as_ptr(),
                Some(validity_callback),
                sink.as_ptr() as *mut c_void,
            );
        }

        tracing::debug!(schema = %source.display(), "compiled XSD schema");

        Ok(CompiledSchema {
            valid_ctxt,
            _schema: schema,
            sink,
            source: source.to_path_buf(),
        })
    }

    /// The file (or in-memory name) this schema was compiled from
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Diagnostics from the most recent [`validate`](Self::validate) call
    pub fn report(&self) -> &ValidationReport {
        unsafe { self.sink.as_ref() }
    }

    /// Validate `document` against this schema
    ///
    /// Warnings alone do not fail validation; they stay available through
    /// [`report`](Self::report).
    ///
    /// # Errors
    ///
    /// Returns `XmlSessionError::SchemaValidation` carrying exactly this call's diagnostics when
    /// libxml2 reports a non-zero status.
    pub fn validate(&mut self, document: &XmlDocument) -> Result<()> {
        unsafe { self.sink.as_mut() }.clear();

        let code = unsafe { xmlSchemaValidateDoc(self.valid_ctxt.ptr.as_ptr(), document.as_ptr()) };
        let status = ValidationStatus::from_code(code);
        let report = self.report();

        for warning in &report.warnings {
            tracing::warn!(document = %document.source().display(), "{}", warning.trim_end());
        }

        if status.is_valid() {
            tracing::debug!(
                schema = %self.source.display(),
                document = %document.source().display(),
                "document is valid"
            );
            return Ok(());
        }

        tracing::error!(
            schema = %self.source.display(),
            document = %document.source().display(),
            status = ?status,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "XSD validation failed"
        );
        Err(XmlSessionError::SchemaValidation(report.clone()))
    }
}

impl Drop for CompiledSchema {
    fn drop(&mut self) {
        // Runs before `valid_ctxt` is freed; freeing a context never reports into the sink.
        unsafe { drop(Box::from_raw(self.sink.as_ptr())) }
    }
}

fn init_error(path: &Path, details: String) -> XmlSessionError {
    tracing::error!(schema = %path.display(), details = %details, "XSD initialization failed");
    XmlSessionError::SchemaInit {
        path: path.to_path_buf(),
        details,
    }
}
