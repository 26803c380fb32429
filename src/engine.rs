//! Call-tree trace engine
//!
//! A small state machine driven by the host runtime's call/return events.
//!
//! - IDLE: waits for a call to a test function defined in project code.
//! - IN_TEST: records project calls with their depth, summarizes the first
//!   call into a tracked package as a single boundary entry, and skips
//!   ignored frames entirely. Returns back to IDLE when the test's own
//!   frame returns.
//!
//! Only one test can be active at a time. Events must arrive in program
//! order from a single thread, with each test fully unwinding before the
//! next one starts; concurrent tests would corrupt the shared depth slot.

use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::call_tree::{CallRecord, CallTree};
use crate::classifier::{PathClass, PathClassifier};
use crate::frame::{capture_arguments, FrameSnapshot};

/// Default prefix identifying test functions
pub const DEFAULT_TEST_PREFIX: &str = "test_";

/// Module name used when a frame does not report one
pub const UNKNOWN_MODULE: &str = "<unknown>";

/// Kind of event delivered by the host runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Call,
    Return,
    Line,
    Exception,
}

/// Receiver of runtime events. Installed once and kept for every frame.
pub trait TraceHook {
    fn on_event(&mut self, kind: EventKind, frame: &dyn FrameSnapshot);
}

/// How test functions are recognized
#[derive(Debug, Clone)]
pub enum TestMatcher {
    Prefix(String),
    Pattern(Regex),
}

impl TestMatcher {
    pub fn matches(&self, function: &str) -> bool {
        match self {
            TestMatcher::Prefix(prefix) => function.starts_with(prefix.as_str()),
            TestMatcher::Pattern(re) => re.is_match(function),
        }
    }
}

impl Default for TestMatcher {
    fn default() -> Self {
        TestMatcher::Prefix(DEFAULT_TEST_PREFIX.to_string())
    }
}

/// The test currently being traced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTest {
    /// `{module}.{function}`
    pub id: String,
    /// Function name, compared against returning frames
    pub function: String,
}

/// Mutable tracer state, reset whenever the active test returns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TracerState {
    pub current_test: Option<ActiveTest>,
    pub depth: usize,
    pub in_tracked_package: bool,
}

impl TracerState {
    pub fn is_idle(&self) -> bool {
        self.current_test.is_none()
    }
}

/// Event counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub events: u64,
    pub tests: u64,
    pub recorded: u64,
    pub ignored: u64,
    pub suppressed: u64,
}

/// Event-driven call-tree builder
pub struct TraceEngine {
    classifier: PathClassifier,
    tests: TestMatcher,
    state: TracerState,
    tree: CallTree,
    classes: HashMap<PathBuf, PathClass>,
    stats: EngineStats,
}

impl TraceEngine {
    /// Create an engine recognizing `test_`-prefixed functions
    pub fn new(classifier: PathClassifier) -> Self {
        Self::with_matcher(classifier, TestMatcher::default())
    }

    pub fn with_matcher(classifier: PathClassifier, tests: TestMatcher) -> Self {
        Self {
            classifier,
            tests,
            state: TracerState::default(),
            tree: CallTree::new(),
            classes: HashMap::new(),
            stats: EngineStats::default(),
        }
    }

    pub fn state(&self) -> &TracerState {
        &self.state
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn call_tree(&self) -> &CallTree {
        &self.tree
    }

    pub fn classifier(&self) -> &PathClassifier {
        &self.classifier
    }

    /// Consume the engine, handing the call tree to the reporter
    pub fn into_call_tree(self) -> CallTree {
        self.tree
    }

    fn classify(&mut self, path: &Path) -> PathClass {
        if let Some(class) = self.classes.get(path) {
            return class.clone();
        }
        let class = self.classifier.classify(path);
        self.classes.insert(path.to_path_buf(), class.clone());
        class
    }

    fn on_call(&mut self, frame: &dyn FrameSnapshot) {
        if self.state.is_idle() {
            if self.tests.matches(frame.function_name())
                && self.classify(frame.file_path()).is_project()
            {
                self.start_test(frame);
            }
            return;
        }

        let class = self.classify(frame.file_path());
        let Some(test) = self.state.current_test.as_ref() else {
            return;
        };

        let location = match class {
            PathClass::Ignored => {
                self.stats.ignored += 1;
                return;
            }
            PathClass::Tracked { location, .. } => {
                if self.state.in_tracked_package {
                    self.stats.suppressed += 1;
                    return;
                }
                self.state.in_tracked_package = true;
                location
            }
            PathClass::Project { relative } => relative,
        };

        let record = CallRecord {
            depth: self.state.depth,
            function: frame.function_name().to_string(),
            args: capture_arguments(frame),
            location,
            line: frame.line(),
        };
        tracing::trace!(
            test = %test.id,
            depth = record.depth,
            "call {} [{}:{}]",
            record.function,
            record.location,
            record.line
        );
        self.tree.record(&test.id, record);
        self.stats.recorded += 1;
        self.state.depth += 1;
    }

    fn on_return(&mut self, frame: &dyn FrameSnapshot) {
        if self.state.is_idle() {
            return;
        }

        // Ignored frames never touched depth on the way in. Tracked frames
        // are unwound when control comes back through project code.
        if !self.classify(frame.file_path()).is_project() {
            return;
        }

        let is_test_frame = self
            .state
            .current_test
            .as_ref()
            .is_some_and(|test| test.function == frame.function_name());

        if is_test_frame {
            self.finish_test();
            return;
        }

        if self.state.in_tracked_package {
            // Undo the boundary entry's level before the frame's own.
            self.state.in_tracked_package = false;
            self.state.depth = self.state.depth.saturating_sub(1);
        }
        self.state.depth = self.state.depth.saturating_sub(1);
    }

    fn start_test(&mut self, frame: &dyn FrameSnapshot) {
        let module = frame.module_name().unwrap_or(UNKNOWN_MODULE);
        let test = ActiveTest {
            id: format!("{}.{}", module, frame.function_name()),
            function: frame.function_name().to_string(),
        };
        tracing::debug!("Entering test {}", test.id);

        self.state = TracerState {
            current_test: Some(test),
            depth: 1,
            in_tracked_package: false,
        };
        self.stats.tests += 1;
    }

    fn finish_test(&mut self) {
        if let Some(test) = self.state.current_test.take() {
            tracing::debug!(
                "Leaving test {} ({} calls)",
                test.id,
                self.tree.get(&test.id).len()
            );
        }
        self.state = TracerState::default();
    }
}

impl TraceHook for TraceEngine {
    fn on_event(&mut self, kind: EventKind, frame: &dyn FrameSnapshot) {
        self.stats.events += 1;
        match kind {
            EventKind::Call => self.on_call(frame),
            EventKind::Return => self.on_return(frame),
            EventKind::Line | EventKind::Exception => {}
        }
    }
}
