//! Runtime-neutral view of a call frame
//!
//! The engine never talks to a language runtime directly. Anything that can
//! describe a frame (function name, source file, line, module, declared
//! parameters and their bound values) implements [`FrameSnapshot`]; the JSON
//! event record in [`crate::events`] is the implementation used by the CLI.

use std::path::Path;
use thiserror::Error;

/// Argument key prefix for the variadic-positional bucket (`*args`)
pub const VARARGS_MARKER: &str = "*";

/// Argument key prefix for the variadic-keyword bucket (`**kwargs`)
pub const VARKW_MARKER: &str = "**";

/// Placeholder for a declared parameter with no bound value
pub const UNBOUND: &str = "<unbound>";

/// Rendering a value to text failed on the host side
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("repr of {type_name} value failed")]
pub struct ReprError {
    pub type_name: String,
}

/// A bound local value that can be rendered as text
pub trait LocalValue {
    /// Name of the value's runtime type, used for the fallback placeholder
    fn type_name(&self) -> &str;

    /// Textual representation of the value
    fn repr(&self) -> Result<String, ReprError>;
}

/// Snapshot of one executing frame at a call or return event
pub trait FrameSnapshot {
    /// Name of the function the frame executes
    fn function_name(&self) -> &str;

    /// Source file the function is defined in, as reported by the runtime
    fn file_path(&self) -> &Path;

    /// Current line number
    fn line(&self) -> u32;

    /// Qualified name of the defining module, if the runtime knows it
    fn module_name(&self) -> Option<&str>;

    /// Declared positional/keyword parameter names, in declaration order
    fn parameters(&self) -> &[String];

    /// Name of the variadic-positional parameter, if declared
    fn varargs(&self) -> Option<&str>;

    /// Name of the variadic-keyword parameter, if declared
    fn varkw(&self) -> Option<&str>;

    /// Look up a bound local by name
    fn local(&self, name: &str) -> Option<&dyn LocalValue>;
}

/// Render a value, falling back to `<TypeName>` when rendering fails
pub fn safe_repr(value: &dyn LocalValue) -> String {
    value
        .repr()
        .unwrap_or_else(|err| format!("<{}>", err.type_name))
}

/// Capture the arguments of a frame at call time
///
/// Declared parameters come first, followed by the `*name` and `**name`
/// buckets when the function declares them.
pub fn capture_arguments(frame: &dyn FrameSnapshot) -> Vec<(String, String)> {
    let mut args: Vec<(String, String)> = frame
        .parameters()
        .iter()
        .map(|name| (name.clone(), render_local(frame, name)))
        .collect();

    if let Some(name) = frame.varargs() {
        args.push((format!("{VARARGS_MARKER}{name}"), render_local(frame, name)));
    }
    if let Some(name) = frame.varkw() {
        args.push((format!("{VARKW_MARKER}{name}"), render_local(frame, name)));
    }

    args
}

fn render_local(frame: &dyn FrameSnapshot, name: &str) -> String {
    frame
        .local(name)
        .map(safe_repr)
        .unwrap_or_else(|| UNBOUND.to_string())
}
