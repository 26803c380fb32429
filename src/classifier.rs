//! Source path classification
//!
//! Decides whether a frame's source file is project code (traced in full),
//! part of a tracked package (summarized as one boundary call), or ignored
//! (runtime, installed dependencies, non-source files, bytecode caches).
//!
//! All comparisons happen on canonical paths so symlinked checkouts and
//! virtual environments compare the same way the project root does.

use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use crate::config::TracerConfig;

/// Classification of a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathClass {
    /// Project source; `relative` is the path relative to the project root
    Project { relative: String },
    /// Tracked package; `location` starts at the matched package name
    Tracked { package: String, location: String },
    /// Runtime, dependency, generated or unresolvable file
    Ignored,
}

impl PathClass {
    pub fn is_project(&self) -> bool {
        matches!(self, PathClass::Project { .. })
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, PathClass::Ignored)
    }
}

/// Classifies source paths against a fixed project root, ignore set and
/// tracked-package list. Immutable after construction.
#[derive(Debug, Clone)]
pub struct PathClassifier {
    project_root: PathBuf,
    ignore_dirs: Vec<PathBuf>,
    trace_packages: Vec<String>,
    source_extension: String,
    cache_dir: String,
}

impl PathClassifier {
    /// Create a classifier for `project_root`
    ///
    /// The root must exist. Ignore directories that cannot be resolved are
    /// dropped, since no canonical file path can lie under them.
    pub fn new<I>(project_root: &Path, ignore_dirs: I, trace_packages: Vec<String>) -> Result<Self>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let project_root = fs::canonicalize(project_root).with_context(|| {
            format!("Failed to resolve project root {}", project_root.display())
        })?;

        let mut resolved: Vec<PathBuf> = Vec::new();
        for dir in ignore_dirs {
            match fs::canonicalize(&dir) {
                Ok(dir) if !resolved.contains(&dir) => resolved.push(dir),
                Ok(_) => {}
                Err(e) => tracing::debug!("Dropping ignore dir {}: {}", dir.display(), e),
            }
        }

        Ok(Self {
            project_root,
            ignore_dirs: resolved,
            trace_packages: trace_packages.into_iter().filter(|p| !p.is_empty()).collect(),
            source_extension: "py".to_string(),
            cache_dir: "__pycache__".to_string(),
        })
    }

    /// Build a classifier from configuration plus runtime-reported prefixes
    ///
    /// Relative `ignore_dirs` entries are taken relative to the project root.
    pub fn from_config(config: &TracerConfig, runtime_prefixes: &[PathBuf]) -> Result<Self> {
        let extra = config.ignore_dirs.iter().map(|dir| {
            if dir.is_relative() {
                config.project_root.join(dir)
            } else {
                dir.clone()
            }
        });
        let ignore_dirs: Vec<PathBuf> = runtime_prefixes.iter().cloned().chain(extra).collect();

        let mut classifier =
            Self::new(&config.project_root, ignore_dirs, config.trace_packages.clone())?;
        classifier.source_extension = config.source_extension.trim_start_matches('.').to_string();
        classifier.cache_dir = config.cache_dir.clone();
        Ok(classifier)
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn ignore_dirs(&self) -> &[PathBuf] {
        &self.ignore_dirs
    }

    pub fn trace_packages(&self) -> &[String] {
        &self.trace_packages
    }

    /// Classify a source path
    pub fn classify(&self, path: &Path) -> PathClass {
        let Ok(canonical) = fs::canonicalize(path) else {
            return PathClass::Ignored;
        };

        // Tracked packages win over project containment so a vendored
        // subtree inside the project can still be summarized.
        if let Some(tracked) = self.match_tracked(&canonical) {
            return tracked;
        }

        let Ok(relative) = canonical.strip_prefix(&self.project_root) else {
            return PathClass::Ignored;
        };
        if relative.as_os_str().is_empty() {
            return PathClass::Ignored;
        }

        if canonical.extension() != Some(OsStr::new(&self.source_extension)) {
            return PathClass::Ignored;
        }
        if !canonical.is_file() {
            return PathClass::Ignored;
        }
        if self.ignore_dirs.iter().any(|dir| canonical.starts_with(dir)) {
            return PathClass::Ignored;
        }
        if relative
            .components()
            .any(|c| c.as_os_str() == OsStr::new(&self.cache_dir))
        {
            return PathClass::Ignored;
        }

        PathClass::Project {
            relative: relative.to_string_lossy().into_owned(),
        }
    }

    fn match_tracked(&self, canonical: &Path) -> Option<PathClass> {
        let text = canonical.to_string_lossy();
        self.trace_packages.iter().find_map(|package| {
            text.find(package.as_str()).map(|idx| PathClass::Tracked {
                package: package.clone(),
                location: text[idx..].trim_start_matches(MAIN_SEPARATOR).to_string(),
            })
        })
    }
}
