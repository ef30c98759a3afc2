//! Indented Tree Dumps
//!
//! [`dump`] walks a subtree depth-first, pre-order, and yields one [`TreeRecord`] per node.
//! Rendering is separate so callers choose the sink: [`render`] writes records to any
//! `io::Write`, and each record's `Display` produces its line without the trailing newline.

use std::fmt;
use std::io::{self, Write};

use serde::Serialize;

use crate::document::{Node, NodeKind};

/// Spaces of indentation per depth level
pub const INDENT_WIDTH: usize = 4;

/// One visited node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeRecord {
    /// Nesting level below the node the dump started from (which is 0)
    pub depth: usize,
    pub label: String,
    #[serde(serialize_with = "serialize_kind")]
    pub kind: NodeKind,
}

fn serialize_kind<S: serde::Serializer>(kind: &NodeKind, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(kind.as_str())
}

impl fmt::Display for TreeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indent = self.depth * INDENT_WIDTH;
        if self.kind == NodeKind::Element {
            write!(f, "{:indent$}<{}> [{}]", "", self.label, self.kind)
        } else {
            write!(f, "{:indent$}{} [{}]", "", self.label, self.kind)
        }
    }
}

/// Collect records for `node` and everything below it
pub fn dump(node: &Node<'_>) -> Vec<TreeRecord> {
    let mut records = Vec::new();
    visit(node, 0, &mut records);
    records
}

fn visit(node: &Node<'_>, depth: usize, records: &mut Vec<TreeRecord>) {
    records.push(TreeRecord {
        depth,
        label: node.name(),
        kind: node.kind(),
    });

    let mut child = node.first_child();
    while let Some(current) = child {
        visit(&current, depth + 1, records);
        child = current.next_sibling();
    }
}

/// Write one line per record
pub fn render<W: Write>(records: &[TreeRecord], out: &mut W) -> io::Result<()> {
    for record in records {
        writeln!(out, "{}", record)?;
    }
    Ok(())
}

/// Dump and render in one step
pub fn print_tree<W: Write>(node: &Node<'_>, out: &mut W) -> io::Result<()> {
    render(&dump(node), out)
}
