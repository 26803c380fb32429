//! Tracing a test command end to end
//!
//! The driver installs the host hook, exports the event-stream location to
//! the test command, runs it to completion, replays the recorded stream
//! through a [`TraceEngine`] and prints the report. The command's exit
//! status is handed back unchanged, even when no report can be produced.

use anyhow::{bail, Context, Result};
use std::env;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use crate::classifier::PathClassifier;
use crate::cli::OutputFormat;
use crate::config::TracerConfig;
use crate::engine::{TestMatcher, TraceEngine, TraceHook};
use crate::events::{EventError, EventReader, TraceEvent};
use crate::hook::{HostHook, PYTHONPATH_ENV};
use crate::report;

/// Path the host hook appends JSON-lines events to
pub const EVENTS_ENV: &str = "CALLTREE_EVENTS";

/// Canonical project root, so the hook can skip obviously foreign frames
pub const PROJECT_ROOT_ENV: &str = "CALLTREE_PROJECT_ROOT";

/// Comma-separated tracked packages
pub const TRACE_PACKAGES_ENV: &str = "CALLTREE_TRACE_PACKAGES";

/// Outcome of feeding an event stream through an engine
pub struct Replay {
    pub engine: TraceEngine,
    /// Malformed lines that were skipped
    pub skipped: usize,
}

/// Feed a decoded event stream through a fresh engine
///
/// Leading `session` headers extend the ignore set before the classifier
/// is built. Malformed lines are skipped; a read error ends the stream.
pub fn replay<I>(events: I, config: &TracerConfig) -> Result<Replay>
where
    I: IntoIterator<Item = Result<TraceEvent, EventError>>,
{
    let mut events = events.into_iter().peekable();
    let mut skipped = 0;

    let mut runtime_prefixes: Vec<PathBuf> = Vec::new();
    loop {
        match events.peek() {
            Some(Ok(TraceEvent::Session(header))) => {
                runtime_prefixes.extend(header.ignore_dirs());
            }
            Some(Err(e)) if e.is_recoverable() => {
                tracing::warn!("Skipping event: {}", e);
                skipped += 1;
            }
            _ => break,
        }
        events.next();
    }

    let classifier = PathClassifier::from_config(config, &runtime_prefixes)?;
    tracing::debug!(
        "Classifier: root={} ignore_dirs={} trace_packages={:?}",
        classifier.project_root().display(),
        classifier.ignore_dirs().len(),
        classifier.trace_packages()
    );
    let mut engine =
        TraceEngine::with_matcher(classifier, TestMatcher::Pattern(config.test_regex()?));

    for event in events {
        match event {
            Ok(event) => match event.frame_event() {
                Some((kind, frame)) => engine.on_event(kind, frame),
                None => tracing::warn!("Ignoring session header after first frame event"),
            },
            Err(e) if e.is_recoverable() => {
                tracing::warn!("Skipping event: {}", e);
                skipped += 1;
            }
            Err(e) => {
                tracing::warn!("Stopping replay: {}", e);
                eprintln!("[calltree: event stream truncated at line {}]", e.line());
                break;
            }
        }
    }

    let stats = engine.stats();
    tracing::debug!(
        events = stats.events,
        tests = stats.tests,
        recorded = stats.recorded,
        ignored = stats.ignored,
        suppressed = stats.suppressed,
        "Replay finished"
    );
    if skipped > 0 {
        eprintln!("[calltree: skipped {} malformed event lines]", skipped);
    }

    Ok(Replay { engine, skipped })
}

/// Replay a recorded event file and print its report
pub fn replay_file(path: &Path, config: &TracerConfig, format: OutputFormat) -> Result<i32> {
    let replay = replay(EventReader::open(path)?, config)?;
    print_report(&replay.engine, format, None)?;
    Ok(0)
}

/// Run a test command with tracing enabled and print its report
///
/// Returns the command's exit code (128 + signal when it was killed).
pub fn trace_command(
    command: &[String],
    config: &TracerConfig,
    format: OutputFormat,
    events_path: Option<&Path>,
) -> Result<i32> {
    let Some((program, args)) = command.split_first() else {
        bail!("Command array is empty");
    };

    let project_root = fs::canonicalize(&config.project_root).with_context(|| {
        format!(
            "Failed to resolve project root {}",
            config.project_root.display()
        )
    })?;

    // The temp file lives until the stream has been replayed.
    let (events_path, _events_file) = match events_path {
        Some(path) => {
            File::create(path)
                .with_context(|| format!("Failed to create event file {}", path.display()))?;
            (path.to_path_buf(), None)
        }
        None => {
            let file = tempfile::Builder::new()
                .prefix("calltree-")
                .suffix(".jsonl")
                .tempfile()
                .context("Failed to create event file")?;
            (file.path().to_path_buf(), Some(file))
        }
    };

    let mut child = Command::new(program);
    child
        .args(args)
        .env(EVENTS_ENV, &events_path)
        .env(PROJECT_ROOT_ENV, &project_root)
        .env(TRACE_PACKAGES_ENV, config.trace_packages.join(","));

    // Removed when the command has exited.
    let hook = if config.install_hook {
        let hook = HostHook::install()?;
        child.env(PYTHONPATH_ENV, hook.search_path(env::var_os(PYTHONPATH_ENV))?);
        Some(hook)
    } else {
        None
    };

    tracing::debug!(
        "Running {:?} with events at {}",
        command,
        events_path.display()
    );
    let status = child
        .status()
        .with_context(|| format!("Failed to execute {}", program))?;
    drop(hook);
    let exit_code = exit_code(status);
    tracing::debug!("Command exited with {}", exit_code);

    if let Err(e) = report_events(&events_path, config, format, exit_code) {
        tracing::warn!("No report: {:#}", e);
        eprintln!("[calltree: no report: {:#}]", e);
    }

    Ok(exit_code)
}

fn report_events(
    events_path: &Path,
    config: &TracerConfig,
    format: OutputFormat,
    exit_code: i32,
) -> Result<()> {
    let replay = replay(EventReader::open(events_path)?, config)?;
    print_report(&replay.engine, format, Some(exit_code))
}

fn print_report(engine: &TraceEngine, format: OutputFormat, exit_code: Option<i32>) -> Result<()> {
    let tree = engine.call_tree();
    match format {
        OutputFormat::Text => print_stdout(&report::render_text(tree)),
        OutputFormat::Json => {
            let json =
                report::render_json(tree, exit_code).context("Failed to serialize JSON report")?;
            print_stdout(&format!("{}\n", json))
        }
    }
}

/// Write to stdout, treating a closed reader (`| head`) as success
fn print_stdout(text: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err).context("Failed to write report");
    }
    Ok(())
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            eprintln!("Command killed by signal: {}", sig);
            return 128 + sig;
        }
    }
    1
}
