//! Standard library detection utilities
//!
//! This module provides a single source of truth for determining whether a
//! top-level module name belongs to the Python standard library of the
//! interpreter the bundle is built with.

use std::path::{Path, PathBuf};

use log::debug;
use ruff_python_stdlib::sys;
use rustc_hash::FxHashSet;
use walkdir::WalkDir;

use crate::{python_env::PythonEnvironment, types::top_level_module};

/// Standard-library names for one interpreter, computed once per run
#[derive(Debug, Clone, Default)]
pub struct StdlibSet {
    /// Explicitly enumerated or discovered names
    names: FxHashSet<String>,
    /// Minor version whose built-in stdlib database is consulted as well
    python_version: Option<u8>,
    /// Standard-library installation directories
    install_dirs: Vec<PathBuf>,
}

impl StdlibSet {
    /// Build the set for a probed environment
    ///
    /// Prefers the interpreter's own enumeration; otherwise walks the stdlib
    /// installation directory. Built-in module names are always merged in.
    pub fn detect(env: &PythonEnvironment) -> Self {
        let mut set = Self {
            install_dirs: env.stdlib_dirs.clone(),
            ..Self::default()
        };

        if let Some(names) = &env.stdlib_module_names {
            debug!("Using interpreter stdlib enumeration ({} names)", names.len());
            set.names.extend(names.iter().cloned());
        } else if env.stdlib_dirs.iter().any(|dir| dir.is_dir()) {
            for dir in &env.stdlib_dirs {
                set.names.extend(names_from_stdlib_dir(dir));
            }
            debug!("Derived {} stdlib names from installation layout", set.names.len());
        } else {
            debug!(
                "No stdlib enumeration available, using built-in database for Python 3.{}",
                env.minor_version
            );
            set.python_version = Some(env.minor_version);
        }

        set.names.extend(env.builtin_module_names.iter().cloned());
        set
    }

    /// A set with exactly the given names and no installation directory
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Attach standard-library installation directories
    #[must_use]
    pub fn with_install_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.install_dirs = dirs;
        self
    }

    /// Check if a module name (or its top-level package) is part of the stdlib
    pub fn contains(&self, module_name: &str) -> bool {
        let top_level = top_level_module(module_name);
        if top_level.is_empty() {
            return false;
        }

        // __future__ is not part of ruff's database but always ships with Python
        if top_level == "__future__" || self.names.contains(top_level) {
            return true;
        }

        self.python_version
            .is_some_and(|version| is_stdlib_module(top_level, version))
    }

    /// Check if a path lies inside one of the stdlib installation directories
    ///
    /// Some distributions nest `site-packages` under the stdlib directory;
    /// anything below it is installed, not shipped with Python.
    pub fn is_within_install_dirs(&self, path: &Path) -> bool {
        self.install_dirs.iter().any(|dir| {
            let dir = dir.canonicalize().unwrap_or_else(|_| dir.clone());
            path.strip_prefix(&dir).is_ok_and(|relative| {
                !relative.components().any(|component| {
                    let name = component.as_os_str();
                    name == "site-packages" || name == "dist-packages"
                })
            })
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.python_version.is_none()
    }
}

/// Check if a module name represents a Python standard library module
/// according to ruff's stdlib database
///
/// # Arguments
/// * `module_name` - The module name to check
/// * `python_version` - The Python 3 minor version (e.g., 10 for Python 3.10)
pub fn is_stdlib_module(module_name: &str, python_version: u8) -> bool {
    if module_name == "__future__" {
        return true;
    }

    if sys::is_known_standard_library(python_version, module_name) {
        return true;
    }

    let top_level = top_level_module(module_name);
    !top_level.is_empty() && sys::is_known_standard_library(python_version, top_level)
}

/// Derive top-level module names from the `*.py` files under a stdlib directory
fn names_from_stdlib_dir(dir: &Path) -> FxHashSet<String> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "py"))
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(dir).ok()?;
            let first = relative.components().next()?;
            let first = first.as_os_str().to_str()?;
            Some(first.strip_suffix(".py").unwrap_or(first).to_owned())
        })
        .collect()
}
