//! CLI argument parsing for calltree

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for call-tree reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable indented tree (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "calltree")]
#[command(version)]
#[command(about = "Per-test call-tree tracer for project code", long_about = None)]
pub struct Cli {
    /// Project root whose source files are traced (default: current directory)
    #[arg(short = 'r', long = "project-root", value_name = "DIR")]
    pub project_root: Option<PathBuf>,

    /// Package to summarize as a single boundary call (repeatable)
    #[arg(short = 't', long = "trace-package", value_name = "PKG")]
    pub trace_packages: Vec<String>,

    /// Configuration file (default: ./calltree.toml if present)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Regex identifying test functions (default: ^test_)
    #[arg(long = "test-pattern", value_name = "REGEX")]
    pub test_pattern: Option<String>,

    /// Where the traced command writes its event stream (default: temp file)
    #[arg(long = "events", value_name = "FILE")]
    pub events: Option<PathBuf>,

    /// Replay a recorded event stream instead of running a command
    #[arg(long = "replay", value_name = "FILE", conflicts_with = "events")]
    pub replay: Option<PathBuf>,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Do not put the bundled Python hook on the command's PYTHONPATH
    #[arg(long = "no-hook")]
    pub no_hook: bool,

    /// Enable debug logging to stderr
    #[arg(long = "debug")]
    pub debug: bool,

    /// Test command to trace (everything after --)
    #[arg(last = true)]
    pub command: Option<Vec<String>>,
}
