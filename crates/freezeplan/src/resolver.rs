//! Locate top-level modules on disk without importing them
//!
//! This is the static counterpart of `importlib.util.find_spec`: it answers
//! "where would this module be loaded from" by walking the search path with
//! Python's resolution order, and never executes anything.

use std::{
    io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use indexmap::IndexSet;
use log::{debug, warn};
use ruff_python_stdlib::identifiers::is_identifier;
use rustc_hash::FxHashSet;

use crate::python_env::PythonEnvironment;

/// Where a module would be loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOrigin {
    /// Compiled into the interpreter
    BuiltIn,
    /// Found in the project or in one of its extra search paths
    FirstParty(PathBuf),
    /// Found on the interpreter's search path
    Path(PathBuf),
}

/// Import-system lookup used by the classifier
pub trait ModuleFinder {
    /// Locate a top-level module; `Ok(None)` when it cannot be found
    ///
    /// An error means the answer is unknown, which classification treats as
    /// third-party.
    fn find_origin(&self, top_level: &str) -> Result<Option<ModuleOrigin>>;
}

/// Finder that walks first-party roots, then the interpreter's `sys.path`
#[derive(Debug, Clone, Default)]
pub struct SearchPathFinder {
    builtin_names: FxHashSet<String>,
    first_party_dirs: Vec<PathBuf>,
    search_dirs: Vec<PathBuf>,
    extension_suffixes: Vec<String>,
    /// False for an offline snapshot, whose `sys.path` is unknown rather than empty
    search_path_known: bool,
}

impl SearchPathFinder {
    pub fn new(env: &PythonEnvironment) -> Self {
        let mut unique_dirs = IndexSet::new();
        for dir in &env.sys_path {
            add_search_directory(&mut unique_dirs, dir);
        }

        Self {
            builtin_names: env.builtin_module_names.iter().cloned().collect(),
            first_party_dirs: Vec::new(),
            search_dirs: unique_dirs.into_iter().collect(),
            extension_suffixes: env.extension_suffixes.clone(),
            search_path_known: env.probed,
        }
    }

    /// Add directories whose modules count as first-party, searched before `sys.path`
    #[must_use]
    pub fn with_first_party_dirs<'a>(mut self, dirs: impl IntoIterator<Item = &'a Path>) -> Self {
        let mut unique_dirs: IndexSet<PathBuf> = self.first_party_dirs.drain(..).collect();
        for dir in dirs {
            add_search_directory(&mut unique_dirs, dir);
        }
        self.first_party_dirs = unique_dirs.into_iter().collect();
        self
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Resolve a module within a specific directory
    ///
    /// Checks, in order: package (`foo/__init__.py`), module file (`foo.py`),
    /// extension module (`foo<suffix>`), namespace package (`foo/`).
    fn resolve_in_directory(&self, root: &Path, name: &str) -> io::Result<Option<PathBuf>> {
        let package_init = root.join(name).join("__init__.py");
        if is_file(&package_init)? {
            debug!("Found package at: {package_init:?}");
            return Ok(Some(package_init));
        }

        let module_file = root.join(format!("{name}.py"));
        if is_file(&module_file)? {
            debug!("Found module file at: {module_file:?}");
            return Ok(Some(module_file));
        }

        for suffix in &self.extension_suffixes {
            let extension_file = root.join(format!("{name}{suffix}"));
            if is_file(&extension_file)? {
                debug!("Found extension module at: {extension_file:?}");
                return Ok(Some(extension_file));
            }
        }

        let namespace_dir = root.join(name);
        if is_dir(&namespace_dir)? {
            debug!("Found namespace package at: {namespace_dir:?}");
            return Ok(Some(namespace_dir));
        }

        Ok(None)
    }
}

impl ModuleFinder for SearchPathFinder {
    fn find_origin(&self, top_level: &str) -> Result<Option<ModuleOrigin>> {
        // Not importable, and must not be joined onto a search root
        if !is_identifier(top_level) {
            return Ok(None);
        }
        if self.builtin_names.contains(top_level) {
            return Ok(Some(ModuleOrigin::BuiltIn));
        }

        for dir in &self.first_party_dirs {
            if let Some(path) = self
                .resolve_in_directory(dir, top_level)
                .with_context(|| format!("Failed to look up '{top_level}' in {}", dir.display()))?
            {
                return Ok(Some(ModuleOrigin::FirstParty(canonicalize_path(path))));
            }
        }

        for dir in &self.search_dirs {
            if let Some(path) = self
                .resolve_in_directory(dir, top_level)
                .with_context(|| format!("Failed to look up '{top_level}' in {}", dir.display()))?
            {
                return Ok(Some(ModuleOrigin::Path(canonicalize_path(path))));
            }
        }

        if !self.search_path_known {
            bail!("'{top_level}' is not in the project and no interpreter search path is known");
        }
        Ok(None)
    }
}

/// Keep only existing directories, canonicalized and deduplicated
fn add_search_directory(unique_dirs: &mut IndexSet<PathBuf>, dir: &Path) {
    if !dir.is_dir() {
        return;
    }
    match dir.canonicalize() {
        Ok(canonical) => unique_dirs.insert(canonical),
        Err(_) => unique_dirs.insert(dir.to_path_buf()),
    };
}

/// Canonicalize a path, handling errors gracefully
fn canonicalize_path(path: PathBuf) -> PathBuf {
    match path.canonicalize() {
        Ok(canonical) => canonical,
        Err(e) => {
            warn!("Failed to canonicalize path {}: {}", path.display(), e);
            path
        }
    }
}

/// `Path::is_file` that reports errors other than "not found"
fn is_file(path: &Path) -> io::Result<bool> {
    match path.metadata() {
        Ok(metadata) => Ok(metadata.is_file()),
        Err(e) if is_absent(&e) => Ok(false),
        Err(e) => Err(e),
    }
}

fn is_dir(path: &Path) -> io::Result<bool> {
    match path.metadata() {
        Ok(metadata) => Ok(metadata.is_dir()),
        Err(e) if is_absent(&e) => Ok(false),
        Err(e) => Err(e),
    }
}

fn is_absent(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory | io::ErrorKind::InvalidFilename
    )
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn create_test_file(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    fn finder_for(search_dir: &Path) -> SearchPathFinder {
        let mut env = PythonEnvironment::offline(12);
        env.probed = true;
        env.sys_path = vec![search_dir.to_path_buf()];
        env.builtin_module_names = vec!["sys".to_owned()];
        env.extension_suffixes = vec![".cpython-312-x86_64-linux-gnu.so".to_owned(), ".so".to_owned()];
        SearchPathFinder::new(&env)
    }

    #[test]
    fn test_package_preferred_over_module() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        create_test_file(&root.join("foo/__init__.py"), "# Package")?;
        create_test_file(&root.join("foo.py"), "# Module")?;

        let finder = finder_for(root);
        assert_eq!(
            finder.find_origin("foo")?,
            Some(ModuleOrigin::Path(root.join("foo/__init__.py").canonicalize()?))
        );
        Ok(())
    }

    #[test]
    fn test_extension_and_namespace_modules() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        create_test_file(&root.join("_speedups.cpython-312-x86_64-linux-gnu.so"), "")?;
        fs::create_dir_all(root.join("namespace_pkg/sub"))?;

        let finder = finder_for(root);
        assert_eq!(
            finder.find_origin("_speedups")?,
            Some(ModuleOrigin::Path(
                root.join("_speedups.cpython-312-x86_64-linux-gnu.so")
                    .canonicalize()?
            ))
        );
        assert_eq!(
            finder.find_origin("namespace_pkg")?,
            Some(ModuleOrigin::Path(root.join("namespace_pkg").canonicalize()?))
        );
        assert_eq!(finder.find_origin("missing")?, None);
        Ok(())
    }

    #[test]
    fn test_first_party_dirs_are_searched_first() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let project = temp_dir.path().join("project");
        let site = temp_dir.path().join("site");
        create_test_file(&project.join("helpers.py"), "")?;
        create_test_file(&site.join("helpers.py"), "")?;

        let finder = finder_for(&site).with_first_party_dirs([project.as_path()]);
        assert_eq!(
            finder.find_origin("helpers")?,
            Some(ModuleOrigin::FirstParty(project.join("helpers.py").canonicalize()?))
        );
        assert_eq!(finder.find_origin("sys")?, Some(ModuleOrigin::BuiltIn));
        Ok(())
    }

    #[test]
    fn test_unknown_search_path_fails_lookup() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let project = temp_dir.path();
        create_test_file(&project.join("helpers.py"), "")?;

        let finder = SearchPathFinder::new(&PythonEnvironment::offline(12))
            .with_first_party_dirs([project]);
        assert_eq!(
            finder.find_origin("helpers")?,
            Some(ModuleOrigin::FirstParty(project.join("helpers.py").canonicalize()?))
        );
        assert!(finder.find_origin("requests").is_err());
        Ok(())
    }

    #[test]
    fn test_non_identifier_names_are_not_looked_up() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        fs::create_dir_all(root.join("data-files"))?;

        let finder = finder_for(root);
        let absolute = root.to_string_lossy().into_owned();
        assert_eq!(finder.find_origin(&absolute)?, None);
        assert_eq!(finder.find_origin("data-files")?, None);
        assert_eq!(finder.find_origin("")?, None);
        Ok(())
    }

    #[test]
    fn test_nonexistent_search_dirs_are_dropped() {
        let finder = finder_for(Path::new("/nonexistent/freezeplan/site"));
        assert!(finder.search_dirs().is_empty());
    }
}
