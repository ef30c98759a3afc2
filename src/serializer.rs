//! Node Serialization
//!
//! Renders a subtree with libxml2's own serializer (no reformatting, so whitespace is exactly what
//! the source markup contained), then decodes HTML named (HTML5 table) and numeric character
//! references in the resulting text. Output is always UTF-8.

use std::ptr::NonNull;

use crate::document::Node;
use crate::error::{Result, XmlSessionError};
use crate::libxml2::{XmlBuffer, xmlBufferContent, xmlBufferCreate, xmlBufferFree, xmlBufferLength, xmlNodeDump};

/// Scoped `xmlBuffer`, freed on drop
struct OutputBuffer {
    ptr: NonNull<XmlBuffer>,
}

impl OutputBuffer {
    fn new() -> Option<Self> {
        NonNull::new(unsafe { xmlBufferCreate() }).map(|ptr| OutputBuffer { ptr })
    }

    fn as_bytes(&self) -> &[u8] {
        unsafe {
            let content = xmlBufferContent(self.ptr.as_ptr());
            let len = usize::try_from(xmlBufferLength(self.ptr.as_ptr())).unwrap_or(0);
            if content.is_null() || len == 0 {
                return &[];
            }
            std::slice::from_raw_parts(content, len)
        }
    }
}

impl Drop for OutputBuffer {
    fn drop(&mut self) {
        unsafe { xmlBufferFree(self.ptr.as_ptr()) }
    }
}

/// Serialize `node` and its subtree to entity-decoded UTF-8 bytes
///
/// # Errors
///
/// Returns `XmlSessionError::Serialization` if libxml2 cannot allocate or fill its output buffer.
pub fn node_to_string(node: &Node<'_>) -> Result<Vec<u8>> {
    let markup = serialize_markup(node)?;
    Ok(html_escape::decode_html_entities(&markup)
        .into_owned()
        .into_bytes())
}

/// The raw markup libxml2 produces for `node`, before entity decoding
pub fn serialize_markup(node: &Node<'_>) -> Result<String> {
    let buffer = OutputBuffer::new().ok_or_else(|| serialization_error("failed to allocate output buffer"))?;

    let written = unsafe {
        xmlNodeDump(
            buffer.ptr.as_ptr(),
            node.document().as_ptr(),
            node.as_ptr(),
            0,
            0,
        )
    };
    if written < 0 {
        return Err(serialization_error("libxml2 failed to dump node"));
    }

    Ok(String::from_utf8_lossy(buffer.as_bytes()).into_owned())
}

fn serialization_error(details: &str) -> XmlSessionError {
    tracing::error!(details = %details, "node serialization failed");
    XmlSessionError::Serialization {
        details: details.to_string(),
    }
}
