//! Audit trace of an agent run
//!
//! One line per tool call, `name(<arguments>)`, with the arguments as JSON
//! indented by four spaces. String arguments are cut to 60 characters so
//! generated page bodies do not end up in the audit log.

use pagetree_ai::ToolCall;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};

pub const MAX_ARGUMENT_CHARS: usize = 60;
const ELLIPSIS: &str = " ...";

/// First line of every successful run report
pub const DONE_MARKER: &str = "Done";

pub fn truncate_arguments(arguments: &Map<String, Value>) -> Map<String, Value> {
    arguments
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) if s.chars().count() > MAX_ARGUMENT_CHARS => {
                    let mut cut: String = s.chars().take(MAX_ARGUMENT_CHARS).collect();
                    cut.push_str(ELLIPSIS);
                    Value::String(cut)
                }
                other => other.clone(),
            };
            (key.clone(), value)
        })
        .collect()
}

fn pretty(value: &Map<String, Value>) -> String {
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    match value.serialize(&mut serializer) {
        Ok(()) => String::from_utf8_lossy(&out).into_owned(),
        Err(_) => String::new(),
    }
}

pub fn format_call(name: &str, arguments: &Map<String, Value>) -> String {
    if arguments.is_empty() {
        return format!("{}()", name);
    }
    format!("{}({})", name, pretty(&truncate_arguments(arguments)))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolTrace {
    lines: Vec<String>,
}

impl ToolTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, call: &ToolCall) {
        self.lines.push(format_call(&call.name, &call.arguments));
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// `Done`, a `---` separator and the trace lines, newline terminated
    pub fn render(&self) -> String {
        format!("{}\n---\n{}\n", DONE_MARKER, self.lines.join("\n"))
    }
}
