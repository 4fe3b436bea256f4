//! Project scanning: run the import and literal-file extractors over the
//! entry script and, optionally, every Python file below its directory

use std::{
    fs,
    path::{Path, PathBuf},
};

use indexmap::IndexSet;
use log::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::{
    literal_files::{PatternReferenceScanner, ReferenceScanner},
    visitors::ModuleImports,
};

/// Aggregated findings of one scan; built once and never modified afterwards
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Directory containing the entry script
    pub project_root: PathBuf,
    /// Files that were scanned, entry script first
    pub files: Vec<PathBuf>,
    /// Top-level names of statically imported modules, sorted
    pub imports: IndexSet<String>,
    /// Top-level names of modules loaded through dynamic-import calls, sorted
    pub dynamic_imports: IndexSet<String>,
    /// Existing files referenced by literal path, sorted
    pub literal_files: IndexSet<PathBuf>,
    /// Files that could not be read or parsed
    pub failed_files: Vec<PathBuf>,
    /// Dynamic-import calls whose module name is not a literal
    pub unresolved_dynamic_imports: usize,
}

/// Scan `entry` and, when `scan_whole_project` is set, every `*.py` file
/// under its directory
pub fn scan_project(entry: &Path, scan_whole_project: bool) -> ScanResult {
    ProjectScanner::new().scan(entry, scan_whole_project)
}

#[derive(Debug, Clone, Default)]
pub struct ProjectScanner<S = PatternReferenceScanner> {
    references: S,
    exclude: IndexSet<String>,
}

impl ProjectScanner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: ReferenceScanner> ProjectScanner<S> {
    /// Use a different literal file reference scanner
    pub fn with_reference_scanner<T: ReferenceScanner>(self, references: T) -> ProjectScanner<T> {
        ProjectScanner {
            references,
            exclude: self.exclude,
        }
    }

    /// Skip directories with these names during whole-project scans
    #[must_use]
    pub fn with_excludes<I>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.exclude.extend(names);
        self
    }

    pub fn scan(&self, entry: &Path, scan_whole_project: bool) -> ScanResult {
        let entry = canonicalize_or_absolute(entry);
        let project_root = entry
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let mut files = IndexSet::new();
        files.insert(entry);
        if scan_whole_project {
            files.extend(self.project_files(&project_root));
        }

        let mut result = ScanResult {
            project_root,
            ..ScanResult::default()
        };
        for file in files {
            self.scan_file(&file, &mut result);
            result.files.push(file);
        }

        result.imports.sort();
        result.dynamic_imports.sort();
        result.literal_files.sort();
        result
    }

    /// Every `*.py` file under `root`, canonicalized, in file-name order
    fn project_files(&self, root: &Path) -> Vec<PathBuf> {
        WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_excluded(entry))
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "py"))
            .map(|entry| canonicalize_or_absolute(entry.path()))
            .collect()
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| self.exclude.contains(name))
    }

    /// Fold one file's findings into `result`; failures only mark the file
    fn scan_file(&self, file: &Path, result: &mut ScanResult) {
        let bytes = match fs::read(file) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to read {}: {e}", file.display());
                result.failed_files.push(file.to_path_buf());
                return;
            }
        };
        let source = String::from_utf8_lossy(&bytes);

        match ModuleImports::from_source(&source) {
            Ok(imports) => {
                debug!(
                    "{}: {} static, {} dynamic import(s)",
                    file.display(),
                    imports.static_imports.len(),
                    imports.dynamic_imports.len()
                );
                result.imports.extend(imports.static_imports);
                result.dynamic_imports.extend(imports.dynamic_imports);
                result.unresolved_dynamic_imports += imports.unresolved_dynamic.len();
            }
            Err(e) => {
                warn!("Failed to parse {}: {e}", file.display());
                result.failed_files.push(file.to_path_buf());
            }
        }

        result
            .literal_files
            .extend(self.references.scan_references(file, &source));
    }
}

fn canonicalize_or_absolute(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
