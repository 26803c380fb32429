//! JSON-lines event stream written by the host runtime hook
//!
//! One JSON object per line. An optional `session` header reports the
//! runtime's installation prefixes; every other line is a frame event:
//!
//! ```json
//! {"event":"session","runtime_prefixes":["/usr"],"site_packages":["/usr/lib/python3/site-packages"]}
//! {"event":"call","function":"helper","file":"/proj/lib.py","line":3,"module":"lib","params":["x"],"locals":{"x":{"type":"int","repr":"1"}}}
//! {"event":"return","function":"helper","file":"/proj/lib.py","line":4,"module":"lib"}
//! ```
//!
//! A local whose `repr` is missing or null failed to render on the host side
//! and is shown as `<type>`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::engine::EventKind;
use crate::frame::{FrameSnapshot, LocalValue, ReprError};

/// Errors decoding an event stream
#[derive(Error, Debug)]
pub enum EventError {
    #[error("line {line}: failed to read event stream: {source}")]
    Io {
        line: usize,
        #[source]
        source: io::Error,
    },

    #[error("line {line}: malformed event: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl EventError {
    /// Line number (1-based) the error occurred on
    pub fn line(&self) -> usize {
        match self {
            EventError::Io { line, .. } | EventError::Malformed { line, .. } => *line,
        }
    }

    /// Whether reading can continue past this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EventError::Malformed { .. })
    }
}

/// A local value as rendered by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedValue {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub repr: Option<String>,
}

impl RecordedValue {
    pub fn new(type_name: &str, repr: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            repr: Some(repr.to_string()),
        }
    }

    /// A value whose rendering failed on the host side
    pub fn unrenderable(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            repr: None,
        }
    }
}

impl LocalValue for RecordedValue {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn repr(&self) -> Result<String, ReprError> {
        self.repr.clone().ok_or_else(|| ReprError {
            type_name: self.type_name.clone(),
        })
    }
}

/// Frame description carried by call/return/line/exception events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub function: String,
    pub file: PathBuf,
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub varargs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub varkw: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub locals: HashMap<String, RecordedValue>,
}

impl FrameRecord {
    pub fn new(function: &str, file: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            function: function.to_string(),
            file: file.into(),
            line,
            module: None,
            params: Vec::new(),
            varargs: None,
            varkw: None,
            locals: HashMap::new(),
        }
    }

    pub fn with_module(mut self, module: &str) -> Self {
        self.module = Some(module.to_string());
        self
    }

    /// Declare a parameter bound to `value`
    pub fn with_param(mut self, name: &str, value: RecordedValue) -> Self {
        self.params.push(name.to_string());
        self.locals.insert(name.to_string(), value);
        self
    }

    pub fn with_varargs(mut self, name: &str, value: RecordedValue) -> Self {
        self.varargs = Some(name.to_string());
        self.locals.insert(name.to_string(), value);
        self
    }

    pub fn with_varkw(mut self, name: &str, value: RecordedValue) -> Self {
        self.varkw = Some(name.to_string());
        self.locals.insert(name.to_string(), value);
        self
    }
}

impl FrameSnapshot for FrameRecord {
    fn function_name(&self) -> &str {
        &self.function
    }

    fn file_path(&self) -> &Path {
        &self.file
    }

    fn line(&self) -> u32 {
        self.line
    }

    fn module_name(&self) -> Option<&str> {
        self.module.as_deref()
    }

    fn parameters(&self) -> &[String] {
        &self.params
    }

    fn varargs(&self) -> Option<&str> {
        self.varargs.as_deref()
    }

    fn varkw(&self) -> Option<&str> {
        self.varkw.as_deref()
    }

    fn local(&self, name: &str) -> Option<&dyn LocalValue> {
        self.locals.get(name).map(|v| v as &dyn LocalValue)
    }
}

/// Runtime installation directories reported by the host at startup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHeader {
    #[serde(default)]
    pub runtime_prefixes: Vec<PathBuf>,
    #[serde(default)]
    pub site_packages: Vec<PathBuf>,
}

impl SessionHeader {
    /// Every directory the classifier should ignore
    pub fn ignore_dirs(&self) -> Vec<PathBuf> {
        self.runtime_prefixes
            .iter()
            .chain(&self.site_packages)
            .cloned()
            .collect()
    }
}

/// One decoded line of the event stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TraceEvent {
    Session(SessionHeader),
    Call(FrameRecord),
    Return(FrameRecord),
    Line(FrameRecord),
    Exception(FrameRecord),
}

impl TraceEvent {
    /// Split a frame event into its kind and frame
    pub fn frame_event(&self) -> Option<(EventKind, &FrameRecord)> {
        match self {
            TraceEvent::Session(_) => None,
            TraceEvent::Call(frame) => Some((EventKind::Call, frame)),
            TraceEvent::Return(frame) => Some((EventKind::Return, frame)),
            TraceEvent::Line(frame) => Some((EventKind::Line, frame)),
            TraceEvent::Exception(frame) => Some((EventKind::Exception, frame)),
        }
    }
}

/// Streaming decoder over a JSON-lines source
pub struct EventReader<R> {
    reader: R,
    line: usize,
    buf: Vec<u8>,
}

impl<R: BufRead> EventReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buf: Vec::new(),
        }
    }
}

impl EventReader<BufReader<File>> {
    /// Open an event file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open event stream {}", path.display()))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> Iterator for EventReader<R> {
    type Item = Result<TraceEvent, EventError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            self.line += 1;
            // Raw bytes: a line that is not UTF-8 is malformed, not a read failure.
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(source) => {
                    return Some(Err(EventError::Io {
                        line: self.line,
                        source,
                    }))
                }
            }

            let text = trim_line(&self.buf);
            if text.is_empty() {
                continue;
            }

            return Some(
                serde_json::from_slice(text).map_err(|source| EventError::Malformed {
                    line: self.line,
                    source,
                }),
            );
        }
    }
}

fn trim_line(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{capture_arguments, safe_repr};

    fn read_all(input: &str) -> Vec<Result<TraceEvent, EventError>> {
        EventReader::new(input.as_bytes()).collect()
    }

    #[test]
    fn test_decode_call_event() {
        let input = r#"{"event":"call","function":"helper","file":"/proj/lib.py","line":3,"module":"lib","params":["x"],"locals":{"x":{"type":"int","repr":"1"}}}"#;
        let events = read_all(input);
        assert_eq!(events.len(), 1);

        let event = events.into_iter().next().unwrap().unwrap();
        let (kind, frame) = event.frame_event().unwrap();
        assert_eq!(kind, EventKind::Call);
        assert_eq!(frame.function_name(), "helper");
        assert_eq!(frame.file_path(), Path::new("/proj/lib.py"));
        assert_eq!(frame.line(), 3);
        assert_eq!(frame.module_name(), Some("lib"));
        assert_eq!(capture_arguments(frame), vec![("x".to_string(), "1".to_string())]);
    }

    #[test]
    fn test_decode_minimal_return_event() {
        let input = r#"{"event":"return","function":"helper","file":"lib.py","line":4}"#;
        let event = read_all(input).remove(0).unwrap();
        let (kind, frame) = event.frame_event().unwrap();
        assert_eq!(kind, EventKind::Return);
        assert!(frame.parameters().is_empty());
        assert!(frame.module_name().is_none());
    }

    #[test]
    fn test_decode_session_header() {
        let input = r#"{"event":"session","runtime_prefixes":["/usr"],"site_packages":["/usr/lib/site-packages"]}"#;
        match read_all(input).remove(0).unwrap() {
            TraceEvent::Session(header) => {
                assert_eq!(
                    header.ignore_dirs(),
                    vec![PathBuf::from("/usr"), PathBuf::from("/usr/lib/site-packages")]
                );
            }
            other => panic!("expected session header, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_lines_skipped_and_lines_counted() {
        let input = "\n{\"event\":\"line\",\"function\":\"f\",\"file\":\"a.py\",\"line\":1}\n\nnot json\n";
        let events = read_all(input);
        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());

        let err = events[1].as_ref().unwrap_err();
        assert_eq!(err.line(), 4);
        assert!(err.is_recoverable());
        assert!(err.to_string().starts_with("line 4: malformed event"));
    }

    #[test]
    fn test_invalid_utf8_line_skipped() {
        let mut input = b"{\"event\":\"call\",\"function\":\"f\",\"file\":\"a.py\",\"line\":1}\n".to_vec();
        input.extend_from_slice(b"{\"event\":\"call\",\"function\":\"\xff\"}\n");
        input.extend_from_slice(b"{\"event\":\"return\",\"function\":\"f\",\"file\":\"a.py\",\"line\":2}\n");

        let events: Vec<_> = EventReader::new(input.as_slice()).collect();
        assert_eq!(events.len(), 3);
        assert!(events[0].is_ok());
        let err = events[1].as_ref().unwrap_err();
        assert_eq!(err.line(), 2);
        assert!(err.is_recoverable());
        assert!(events[2].is_ok());
    }

    #[test]
    fn test_crlf_line_endings_accepted() {
        let input = "{\"event\":\"line\",\"function\":\"f\",\"file\":\"a.py\",\"line\":1}\r\n  \r\n";
        let events = read_all(input);
        assert_eq!(events.len(), 1);
        assert!(events[0].is_ok());
    }

    #[test]
    fn test_unknown_event_kind_is_malformed() {
        let input = r#"{"event":"c_call","function":"len","file":"x","line":1}"#;
        assert!(read_all(input)[0].is_err());
    }

    #[test]
    fn test_unrenderable_value_placeholder() {
        let input = r#"{"event":"call","function":"f","file":"a.py","line":1,"params":["obj"],"locals":{"obj":{"type":"Broken","repr":null}}}"#;
        let event = read_all(input).remove(0).unwrap();
        let (_, frame) = event.frame_event().unwrap();
        assert_eq!(safe_repr(frame.local("obj").unwrap()), "<Broken>");
    }

    #[test]
    fn test_frame_record_builders() {
        let frame = FrameRecord::new("f", "/proj/a.py", 7)
            .with_module("a")
            .with_param("x", RecordedValue::new("int", "1"))
            .with_varargs("args", RecordedValue::new("tuple", "()"))
            .with_varkw("kwargs", RecordedValue::unrenderable("dict"));

        let args = capture_arguments(&frame);
        assert_eq!(
            args,
            vec![
                ("x".to_string(), "1".to_string()),
                ("*args".to_string(), "()".to_string()),
                ("**kwargs".to_string(), "<dict>".to_string()),
            ]
        );
    }

    #[test]
    fn test_serialized_frame_event_decodes() {
        let event = TraceEvent::Call(
            FrameRecord::new("f", "/proj/a.py", 2).with_param("x", RecordedValue::new("int", "5")),
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"call\""));

        let decoded = read_all(&json).remove(0).unwrap();
        assert_eq!(decoded, event);
    }
}
