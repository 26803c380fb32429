//! Host-side event hook for Python test commands
//!
//! The hook is a `sitecustomize` module compiled into the binary. The driver
//! writes it to a private directory and puts that directory first on
//! `PYTHONPATH`, so every interpreter started by the test command imports it
//! at startup and appends JSON-lines events to `$CALLTREE_EVENTS`.

use anyhow::{Context, Result};
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Module name Python imports automatically at startup
pub const HOOK_MODULE: &str = "sitecustomize.py";

/// Source of the hook module
pub const HOOK_SOURCE: &str = include_str!("hook/sitecustomize.py");

/// Search-path variable the hook directory is prepended to
pub const PYTHONPATH_ENV: &str = "PYTHONPATH";

/// An installed hook; the directory is removed on drop
pub struct HostHook {
    dir: TempDir,
}

impl HostHook {
    /// Write the hook module into a fresh temporary directory
    pub fn install() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("calltree-hook-")
            .tempdir()
            .context("Failed to create hook directory")?;
        let module = dir.path().join(HOOK_MODULE);
        fs::write(&module, HOOK_SOURCE)
            .with_context(|| format!("Failed to write hook module {}", module.display()))?;
        tracing::debug!("Installed host hook at {}", module.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// `PYTHONPATH` for the child: the hook directory, then `existing`
    pub fn search_path(&self, existing: Option<OsString>) -> Result<OsString> {
        let mut paths = vec![self.dir().to_path_buf()];
        if let Some(existing) = existing {
            paths.extend(env::split_paths(&existing).filter(|p| !p.as_os_str().is_empty()));
        }
        env::join_paths(paths).context("Failed to build PYTHONPATH for the hook")
    }

    /// Path of the written module
    pub fn module_path(&self) -> PathBuf {
        self.dir().join(HOOK_MODULE)
    }
}
