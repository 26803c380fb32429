//! Per-test call trees
//!
//! Maps each test identifier to the chronological list of calls recorded
//! while it ran. Tests iterate in the order they were first recorded.

use std::collections::HashMap;

/// A single recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    /// Nesting level relative to the test function's own frame
    pub depth: usize,
    /// Called function name
    pub function: String,
    /// Captured arguments as (name, repr) in capture order
    pub args: Vec<(String, String)>,
    /// Project-relative path, or synthetic location for a tracked package
    pub location: String,
    /// Line number reported at the call event
    pub line: u32,
}

/// Ordered mapping from test identifier to its recorded calls
#[derive(Debug, Default, Clone)]
pub struct CallTree {
    tests: Vec<(String, Vec<CallRecord>)>,
    index: HashMap<String, usize>,
}

impl CallTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to a test's call list
    pub fn record(&mut self, test_id: &str, record: CallRecord) {
        let slot = match self.index.get(test_id) {
            Some(&slot) => slot,
            None => {
                self.tests.push((test_id.to_string(), Vec::new()));
                self.index.insert(test_id.to_string(), self.tests.len() - 1);
                self.tests.len() - 1
            }
        };
        self.tests[slot].1.push(record);
    }

    /// Recorded calls for a test (empty if it made no traced calls)
    pub fn get(&self, test_id: &str) -> &[CallRecord] {
        self.index
            .get(test_id)
            .map(|&slot| self.tests[slot].1.as_slice())
            .unwrap_or(&[])
    }

    /// Tests with their calls, in first-recorded order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[CallRecord])> {
        self.tests
            .iter()
            .map(|(id, calls)| (id.as_str(), calls.as_slice()))
    }

    /// Number of tests with at least one recorded call
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Total recorded calls across all tests
    pub fn total_calls(&self) -> usize {
        self.tests.iter().map(|(_, calls)| calls.len()).sum()
    }
}
