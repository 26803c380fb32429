//! Tracer configuration (`calltree.toml` + CLI overrides)
//!
//! # Example calltree.toml
//!
//! ```toml
//! project_root = "."
//! trace_packages = ["vendor_pkg", "requests"]
//! ignore_dirs = [".venv", "build"]
//! test_pattern = "^test_"
//! install_hook = true
//! ```
//!
//! A relative `project_root` in a file is resolved against the file's
//! directory.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "calltree.toml";

/// Configuration consumed by the driver to build the classifier and engine
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TracerConfig {
    /// Root of the project whose code is traced in full
    pub project_root: PathBuf,

    /// Package-name substrings summarized as a single boundary call
    pub trace_packages: Vec<String>,

    /// Extra directories ignored in addition to the runtime prefixes
    pub ignore_dirs: Vec<PathBuf>,

    /// Regex a function name must match to start a test
    pub test_pattern: String,

    /// Extension of traceable source files (without the dot)
    pub source_extension: String,

    /// Name of the bytecode-cache directory to skip
    pub cache_dir: String,

    /// Put the bundled Python hook on the command's `PYTHONPATH`
    pub install_hook: bool,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            trace_packages: Vec::new(),
            ignore_dirs: Vec::new(),
            test_pattern: "^test_".to_string(),
            source_extension: "py".to_string(),
            cache_dir: "__pycache__".to_string(),
            install_hook: true,
        }
    }
}

impl TracerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        if config.project_root.is_relative() {
            if let Some(dir) = path.parent() {
                config.project_root = dir.join(&config.project_root);
            }
        }
        Ok(config)
    }

    /// Load configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse TOML")?;
        config.test_regex()?;
        Ok(config)
    }

    /// Load `path` if given, else `calltree.toml` if present, else defaults
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::from_file(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Compile the test-function pattern
    pub fn test_regex(&self) -> Result<Regex> {
        Regex::new(&self.test_pattern)
            .with_context(|| format!("Invalid test pattern: {}", self.test_pattern))
    }

    /// Append packages, skipping ones already tracked
    pub fn add_trace_packages<I: IntoIterator<Item = String>>(&mut self, packages: I) {
        for package in packages {
            if !self.trace_packages.contains(&package) {
                self.trace_packages.push(package);
            }
        }
    }
}
