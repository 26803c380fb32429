// Shared fixtures for call-tree integration tests
//
// A fixture lays out a throwaway project plus a fake runtime prefix and an
// external site-packages directory holding a tracked package.
#![allow(dead_code)]

use calltree::classifier::PathClassifier;
use calltree::engine::{EventKind, TraceEngine, TraceHook};
use calltree::events::{FrameRecord, RecordedValue, TraceEvent};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct Fixture {
    pub project: TempDir,
    pub env: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let project = tempfile::tempdir().unwrap();
        let env = tempfile::tempdir().unwrap();
        for file in ["test_a.py", "test_b.py", "lib.py", "pkg/util.py"] {
            touch(&project.path().join(file));
        }
        for file in [
            "runtime/lib/builtins.py",
            "site-packages/vendor_pkg/api.py",
            "site-packages/vendor_pkg/_internal.py",
            "site-packages/other/mod.py",
        ] {
            touch(&env.path().join(file));
        }
        Self { project, env }
    }

    pub fn root(&self) -> &Path {
        self.project.path()
    }

    pub fn project_file(&self, name: &str) -> PathBuf {
        self.project.path().join(name)
    }

    pub fn runtime_file(&self) -> PathBuf {
        self.env.path().join("runtime/lib/builtins.py")
    }

    pub fn vendor_file(&self, name: &str) -> PathBuf {
        self.env.path().join("site-packages/vendor_pkg").join(name)
    }

    pub fn other_dependency(&self) -> PathBuf {
        self.env.path().join("site-packages/other/mod.py")
    }

    pub fn ignore_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.env.path().join("runtime"),
            self.env.path().join("site-packages"),
        ]
    }

    pub fn engine(&self) -> TraceEngine {
        let classifier = PathClassifier::new(
            self.root(),
            self.ignore_dirs(),
            vec!["vendor_pkg".to_string()],
        )
        .unwrap();
        TraceEngine::new(classifier)
    }
}

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "").unwrap();
}

/// Frame in module `module` at `path:line`
pub fn frame(path: PathBuf, module: &str, function: &str, line: u32) -> FrameRecord {
    FrameRecord::new(function, path, line).with_module(module)
}

pub fn int(repr: &str) -> RecordedValue {
    RecordedValue::new("int", repr)
}

/// Feed a sequence of events into an engine
pub fn feed(engine: &mut TraceEngine, events: &[(EventKind, FrameRecord)]) {
    for (kind, frame) in events {
        engine.on_event(*kind, frame);
    }
}

/// Serialize events as a JSON-lines stream
pub fn to_jsonl(events: &[TraceEvent]) -> String {
    events
        .iter()
        .map(|e| serde_json::to_string(e).unwrap() + "\n")
        .collect()
}
