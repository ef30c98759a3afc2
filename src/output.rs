//! Run Output
//!
//! Renders what one `xml-session` run produced, either as human-readable text or as a single
//! JSON document. The binary collects results into a [`RunReport`] while the session is open,
//! so rendering never touches the parse tree.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::{OutputFormat, VerbosityLevel};
use crate::document::Node;
use crate::schema::ValidationReport;
use crate::tree::TreeRecord;
use crate::xpath::XPathValue;

/// Owned snapshot of one selected node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSummary {
    pub name: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    /// Text content, for non-elements and for elements without element children
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl NodeSummary {
    pub fn from_node(node: &Node<'_>) -> Self {
        let is_leaf = !node.is_element() || node.children().all(|child| !child.is_element());
        Self {
            name: node.name(),
            kind: node.kind().as_str().to_string(),
            line: node.line(),
            attributes: node.attributes().into_iter().collect(),
            content: is_leaf.then(|| node.content()),
        }
    }
}

/// Owned snapshot of an XPath value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum ValueSummary {
    NodeSet(Vec<NodeSummary>),
    Boolean(bool),
    Number(f64),
    String(String),
}

impl From<&XPathValue<'_>> for ValueSummary {
    fn from(value: &XPathValue<'_>) -> Self {
        match value {
            XPathValue::NodeSet(nodes) => {
                ValueSummary::NodeSet(nodes.iter().map(NodeSummary::from_node).collect())
            }
            XPathValue::Boolean(b) => ValueSummary::Boolean(*b),
            XPathValue::Number(n) => ValueSummary::Number(*n),
            XPathValue::String(s) => ValueSummary::String(s.clone()),
        }
    }
}

/// Result of one requested operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum QueryOutcome {
    Xpath { query: String, result: ValueSummary },
    Serialize { query: String, fragments: Vec<String> },
    Tree { query: String, trees: Vec<Vec<TreeRecord>> },
}

/// Everything one run produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub source: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<PathBuf>,
    pub valid: bool,
    pub report: ValidationReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    pub queries: Vec<QueryOutcome>,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
}

fn serialize_millis<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u128(duration.as_millis())
}

impl RunReport {
    pub fn new(source: impl Into<PathBuf>, schema: Option<PathBuf>) -> Self {
        Self {
            source: source.into(),
            schema,
            valid: true,
            report: ValidationReport::default(),
            root: None,
            queries: Vec::new(),
            duration: Duration::ZERO,
        }
    }
}

/// Output formatter for run results
pub struct Output {
    verbosity: VerbosityLevel,
    format: OutputFormat,
    show_colors: bool,
}

impl Output {
    pub fn new(verbosity: VerbosityLevel, format: OutputFormat) -> Self {
        Self {
            verbosity,
            format,
            show_colors: atty::is(atty::Stream::Stdout),
        }
    }

    pub fn with_colors(mut self, show_colors: bool) -> Self {
        self.show_colors = show_colors;
        self
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn format_run(&self, run: &RunReport) -> Result<String, serde_json::Error> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(run),
            OutputFormat::Human => Ok(self.format_human(run)),
        }
    }

    fn format_human(&self, run: &RunReport) -> String {
        let mut output = String::new();

        if self.verbosity > VerbosityLevel::Quiet || !run.valid {
            output.push_str(&self.format_status(run));
            output.push('\n');
        }

        if let Some(root) = &run.root {
            output.push_str(&format!("root: {}\n", root));
        }

        for outcome in &run.queries {
            output.push_str(&self.format_outcome(outcome));
        }

        output
    }

    pub fn format_status(&self, run: &RunReport) -> String {
        let source = run.source.display();
        let duration = format_duration(run.duration);

        let mut output = if !run.valid {
            let error_count = run.report.errors.len();
            format!(
                "{}  {} ({}) - {} error{}",
                self.colorize("✗ INVALID", "31"),
                source,
                duration,
                error_count,
                if error_count == 1 { "" } else { "s" }
            )
        } else if run.schema.is_some() {
            format!("{}  {} ({})", self.colorize("✓ VALID", "32"), source, duration)
        } else {
            format!("{}  {} ({})", self.colorize("✓ LOADED", "32"), source, duration)
        };

        for error in &run.report.errors {
            output.push_str(&format!("\n    {}", error.trim_end()));
        }

        if self.verbosity >= VerbosityLevel::Verbose {
            for warning in &run.report.warnings {
                output.push_str(&format!(
                    "\n    {} {}",
                    self.colorize("warning:", "33"),
                    warning.trim_end()
                ));
            }
            if let Some(schema) = &run.schema {
                output.push_str(&format!("\n  Schema: {}", schema.display()));
            }
        }

        output
    }

    pub fn format_outcome(&self, outcome: &QueryOutcome) -> String {
        let mut output = String::new();

        match outcome {
            QueryOutcome::Xpath { query, result } => match result {
                ValueSummary::NodeSet(nodes) => {
                    output.push_str(&format!(
                        "{} {}: {} node{}\n",
                        self.colorize("xpath", "36"),
                        query,
                        nodes.len(),
                        if nodes.len() == 1 { "" } else { "s" }
                    ));
                    for (i, node) in nodes.iter().enumerate() {
                        output.push_str(&format!("  {}. {}\n", i + 1, self.format_node(node)));
                    }
                }
                ValueSummary::Boolean(b) => {
                    output.push_str(&format!("{} {}: boolean {}\n", self.colorize("xpath", "36"), query, b));
                }
                ValueSummary::Number(n) => {
                    output.push_str(&format!("{} {}: number {}\n", self.colorize("xpath", "36"), query, n));
                }
                ValueSummary::String(s) => {
                    output.push_str(&format!("{} {}: string {:?}\n", self.colorize("xpath", "36"), query, s));
                }
            },
            QueryOutcome::Serialize { query, fragments } => {
                output.push_str(&format!("{} {}:\n", self.colorize("serialize", "36"), query));
                for fragment in fragments {
                    output.push_str(fragment);
                    output.push('\n');
                }
            }
            QueryOutcome::Tree { query, trees } => {
                output.push_str(&format!("{} {}:\n", self.colorize("tree", "36"), query));
                for records in trees {
                    for record in records {
                        output.push_str(&record.to_string());
                        output.push('\n');
                    }
                }
            }
        }

        output
    }

    fn format_node(&self, node: &NodeSummary) -> String {
        let mut output = if node.kind == "element" {
            format!("<{}> [{}]", node.name, node.kind)
        } else {
            format!("{} [{}]", node.name, node.kind)
        };

        for (name, value) in &node.attributes {
            output.push_str(&format!(" {}={:?}", name, value));
        }
        if let Some(content) = &node.content {
            output.push_str(&format!(" {:?}", content));
        }
        if self.verbosity >= VerbosityLevel::Verbose
            && let Some(line) = node.line
        {
            output.push_str(&format!(" (line {})", line));
        }

        output
    }
}

fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs_f64();
    if total_secs < 1.0 {
        format!("{:.0}ms", duration.as_millis())
    } else if total_secs < 60.0 {
        format!("{:.2}s", total_secs)
    } else {
        let mins = (total_secs / 60.0) as u64;
        let secs = total_secs % 60.0;
        format!("{}m{:.1}s", mins, secs)
    }
}
