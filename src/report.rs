//! Call tree rendering
//!
//! Text output (default):
//!
//! ```text
//!
//! Call tree for test_a.test_foo:
//!   helper(x=1)  [lib.py:3]
//!     fetch(url='http://x')  [vendor_pkg/core.py:10]
//! ```
//!
//! JSON output (`--format json`) carries the same records in a versioned
//! document.

use serde::Serialize;
use std::fmt::Write;

use crate::call_tree::{CallRecord, CallTree};

/// Format identifier of the JSON report
pub const JSON_FORMAT: &str = "calltree-json-v1";

/// Render every test's call tree as indented text
pub fn render_text(tree: &CallTree) -> String {
    let mut out = String::new();
    for (test_id, calls) in tree.iter() {
        let _ = writeln!(out, "\nCall tree for {}:", test_id);
        for call in calls {
            let _ = writeln!(out, "{}", format_call(call));
        }
    }
    out
}

/// Format one record: `  func(a=1, b=2)  [path:line]`
pub fn format_call(call: &CallRecord) -> String {
    let args = call
        .args
        .iter()
        .map(|(name, repr)| format!("{}={}", name, repr))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{}{}({})  [{}:{}]",
        " ".repeat(call.depth * 2),
        call.function,
        args,
        call.location,
        call.line
    )
}

/// A single recorded call in the JSON report
#[derive(Debug, Clone, Serialize)]
pub struct JsonCall<'a> {
    pub depth: usize,
    pub function: &'a str,
    pub args: Vec<JsonArg<'a>>,
    pub file: &'a str,
    pub line: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonArg<'a> {
    pub name: &'a str,
    pub repr: &'a str,
}

/// One test's calls in the JSON report
#[derive(Debug, Clone, Serialize)]
pub struct JsonTest<'a> {
    pub test: &'a str,
    pub calls: Vec<JsonCall<'a>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    pub total_tests: usize,
    pub total_calls: usize,
    /// Exit code of the traced command (absent when replaying)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Root JSON report structure
#[derive(Debug, Clone, Serialize)]
pub struct JsonReport<'a> {
    pub version: &'static str,
    pub format: &'static str,
    pub tests: Vec<JsonTest<'a>>,
    pub summary: JsonSummary,
}

impl<'a> JsonReport<'a> {
    pub fn new(tree: &'a CallTree, exit_code: Option<i32>) -> Self {
        let tests = tree
            .iter()
            .map(|(test, calls)| JsonTest {
                test,
                calls: calls.iter().map(json_call).collect(),
            })
            .collect();

        Self {
            version: env!("CARGO_PKG_VERSION"),
            format: JSON_FORMAT,
            tests,
            summary: JsonSummary {
                total_tests: tree.len(),
                total_calls: tree.total_calls(),
                exit_code,
            },
        }
    }
}

fn json_call(call: &CallRecord) -> JsonCall<'_> {
    JsonCall {
        depth: call.depth,
        function: &call.function,
        args: call
            .args
            .iter()
            .map(|(name, repr)| JsonArg { name, repr })
            .collect(),
        file: &call.location,
        line: call.line,
    }
}

/// Render the call trees as a pretty-printed JSON document
pub fn render_json(tree: &CallTree, exit_code: Option<i32>) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonReport::new(tree, exit_code))
}
