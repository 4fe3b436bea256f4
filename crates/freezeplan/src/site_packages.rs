//! Installed-package map: top-level import name to distribution names
//!
//! Reads the metadata directories pip leaves in `site-packages`, the same
//! information `importlib.metadata.packages_distributions()` exposes.

use std::{
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use indexmap::{IndexMap, IndexSet};
use log::debug;
use pep508_rs::PackageName;

use crate::{python_env::PythonEnvironment, types::top_level_module};

/// Directory names commonly used for project-local virtual environments
const COMMON_VENV_NAMES: [&str; 5] = [".venv", "venv", "env", ".virtualenv", "virtualenv"];

#[derive(Debug, Clone, Default)]
pub struct PackageMap {
    distributions: IndexMap<String, Vec<String>>,
}

impl PackageMap {
    /// Build the map for an environment, including any virtual environment
    /// active for `project_root`
    pub fn detect(env: &PythonEnvironment, project_root: Option<&Path>) -> Self {
        let mut site_dirs: IndexSet<PathBuf> = env.site_packages_dirs().into_iter().collect();

        let venv_paths = match std::env::var_os("VIRTUAL_ENV") {
            Some(venv) if !venv.is_empty() => vec![PathBuf::from(venv)],
            _ => project_root
                .map(detect_fallback_virtualenv_paths)
                .unwrap_or_default(),
        };
        for venv_path in venv_paths {
            site_dirs.extend(virtualenv_site_packages_directories(&venv_path));
        }

        Self::scan(site_dirs.iter().map(PathBuf::as_path))
    }

    /// Scan site-packages directories; unreadable directories are skipped
    pub fn scan<'a>(site_dirs: impl IntoIterator<Item = &'a Path>) -> Self {
        let mut map = Self::default();
        for dir in site_dirs {
            map.scan_site_packages_directory(dir);
        }
        debug!("Installed-package map has {} top-level names", map.len());
        map
    }

    /// A map with exactly the given `(top_level, distribution)` pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = Self::default();
        for (top_level, distribution) in pairs {
            map.insert(top_level.into(), distribution.into());
        }
        map
    }

    pub fn contains(&self, top_level: &str) -> bool {
        self.distributions.contains_key(top_level)
    }

    /// Distributions providing a top-level name
    pub fn distributions(&self, top_level: &str) -> &[String] {
        self.distributions
            .get(top_level)
            .map_or(&[], Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.distributions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distributions.is_empty()
    }

    fn insert(&mut self, top_level: String, distribution: String) {
        let entry = self.distributions.entry(top_level).or_default();
        if !entry.contains(&distribution) {
            entry.push(distribution);
        }
    }

    fn scan_site_packages_directory(&mut self, site_packages_dir: &Path) {
        let Ok(entries) = fs::read_dir(site_packages_dir) else {
            return;
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(OsStr::to_str) else {
                continue;
            };
            if !path.is_dir() {
                continue;
            }
            if let Some(stem) = name.strip_suffix(".dist-info") {
                self.record_distribution(&path, stem, "METADATA");
            } else if let Some(stem) = name.strip_suffix(".egg-info") {
                self.record_distribution(&path, stem, "PKG-INFO");
            }
        }
    }

    fn record_distribution(&mut self, info_dir: &Path, stem: &str, metadata_file: &str) {
        let raw_name = read_metadata_name(&info_dir.join(metadata_file))
            .unwrap_or_else(|| stem.split('-').next().unwrap_or(stem).to_owned());
        let distribution = normalize_distribution_name(&raw_name);

        let top_levels = declared_top_levels(info_dir)
            .or_else(|| inferred_top_levels(info_dir))
            .unwrap_or_default();
        for top_level in top_levels {
            self.insert(top_level, distribution.clone());
        }
    }
}

/// Normalize a distribution name as in PEP 503, keeping the raw name if it is invalid
fn normalize_distribution_name(raw: &str) -> String {
    PackageName::from_str(raw).map_or_else(|_| raw.to_owned(), |name| name.to_string())
}

/// The `Name:` header of a METADATA / PKG-INFO file
fn read_metadata_name(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    content
        .lines()
        .take_while(|line| !line.is_empty())
        .find_map(|line| line.strip_prefix("Name:"))
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
}

/// Names listed in `top_level.txt`
fn declared_top_levels(info_dir: &Path) -> Option<IndexSet<String>> {
    let content = fs::read_to_string(info_dir.join("top_level.txt")).ok()?;
    let names: IndexSet<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| top_level_module(&line.replace('/', ".")).to_owned())
        .filter(|name| !name.is_empty())
        .collect();
    (!names.is_empty()).then_some(names)
}

/// Top-level names inferred from the first path segment of `RECORD` entries
fn inferred_top_levels(info_dir: &Path) -> Option<IndexSet<String>> {
    let content = fs::read_to_string(info_dir.join("RECORD")).ok()?;
    let names = content
        .lines()
        .filter_map(|line| line.split(',').next())
        .filter_map(|path| {
            let first = path.split('/').next()?;
            if first.is_empty()
                || first == ".."
                || first == "__pycache__"
                || first.ends_with(".dist-info")
                || first.ends_with(".data")
                || first.ends_with(".pth")
            {
                return None;
            }
            if path.contains('/') {
                return Some(first.to_owned());
            }
            // single-file modules: foo.py, foo.cpython-311-x86_64-linux-gnu.so
            let (stem, extension) = first.split_once('.')?;
            let is_module = extension == "py"
                || extension.ends_with("so")
                || extension.ends_with("pyd");
            is_module.then(|| stem.to_owned())
        })
        .collect();
    Some(names)
}

/// Detect common virtual environment directories in a project
fn detect_fallback_virtualenv_paths(project_root: &Path) -> Vec<PathBuf> {
    COMMON_VENV_NAMES
        .iter()
        .map(|venv_name| project_root.join(venv_name))
        .filter(|venv_path| {
            let has_bin = venv_path.join("bin").is_dir() || venv_path.join("Scripts").is_dir();
            let has_lib = venv_path.join("lib").is_dir() || venv_path.join("Lib").is_dir();
            venv_path.is_dir() && (has_bin || has_lib)
        })
        .collect()
}

/// Get site-packages directories for a virtual environment
fn virtualenv_site_packages_directories(venv_path: &Path) -> Vec<PathBuf> {
    let mut site_packages_dirs = Vec::new();

    // Unix-style virtual environment
    let lib_dir = venv_path.join("lib");
    if let Ok(entries) = fs::read_dir(&lib_dir) {
        for entry in entries.flatten() {
            let site_packages = entry.path().join("site-packages");
            if site_packages.is_dir() {
                site_packages_dirs.push(site_packages);
            }
        }
    }

    // Windows-style virtual environment
    let lib_site_packages = venv_path.join("Lib").join("site-packages");
    if lib_site_packages.is_dir() {
        site_packages_dirs.push(lib_site_packages);
    }

    site_packages_dirs
}
