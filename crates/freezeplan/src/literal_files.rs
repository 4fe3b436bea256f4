//! Heuristic discovery of data files referenced by literal path
//!
//! The scan is textual: any path-like token ending in a known data, document,
//! image or font extension counts, whether it sits in a string, a comment or
//! elsewhere. Computed paths are not found.

use std::{
    fs,
    path::{Path, PathBuf},
};

use indexmap::IndexSet;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

/// Extensions recognized as bundled data
pub const DATA_FILE_EXTENSIONS: [&str; 30] = [
    "csv", "tsv", "xlsx", "xls", "json", "yaml", "yml", "ini", "txt", "png", "jpg", "jpeg", "gif",
    "svg", "ico", "qml", "ui", "html", "css", "toml", "md", "db", "sqlite", "ttf", "otf", "xml",
    "jinja2", "jinja", "mo", "po",
];

static FILE_REFERENCE: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)(?P<path>[A-Za-z0-9_\-./\\:]+?\.(?:{}))",
        DATA_FILE_EXTENSIONS.join("|")
    ))
});

/// Finds files a source text refers to
pub trait ReferenceScanner {
    /// Existing regular files referenced from `source`, which was read from `file`
    fn scan_references(&self, file: &Path, source: &str) -> IndexSet<PathBuf>;
}

/// Regex-over-text scanner for literal file paths
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternReferenceScanner;

impl ReferenceScanner for PatternReferenceScanner {
    fn scan_references(&self, file: &Path, source: &str) -> IndexSet<PathBuf> {
        let pattern = match FILE_REFERENCE.as_ref() {
            Ok(pattern) => pattern,
            Err(e) => {
                warn!("File reference pattern failed to compile: {e}");
                return IndexSet::new();
            }
        };
        let base_dir = file.parent().unwrap_or_else(|| Path::new(""));

        pattern
            .captures_iter(source)
            .filter_map(|captures| captures.name("path"))
            .filter_map(|token| resolve_reference(base_dir, token.as_str()))
            .collect()
    }
}

/// Resolve a matched token and keep it only if it names an existing regular file
fn resolve_reference(base_dir: &Path, token: &str) -> Option<PathBuf> {
    if token.is_empty() {
        return None;
    }
    // escaped backslashes in string literals
    let normalized = token.replace(r"\\", r"\");
    let candidate = PathBuf::from(normalized);
    let candidate = if candidate.is_absolute() {
        candidate
    } else {
        // a non-existent path fails to canonicalize and is dropped here
        base_dir.join(candidate).canonicalize().ok()?
    };

    fs::metadata(&candidate)
        .is_ok_and(|metadata| metadata.is_file())
        .then_some(candidate)
}

/// Scan one file for literal data-file references
///
/// Files that cannot be read contribute nothing.
pub fn find_literal_files(file: &Path, project_root: &Path) -> IndexSet<PathBuf> {
    let bytes = match fs::read(file) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("Skipping literal file scan of {}: {e}", file.display());
            return IndexSet::new();
        }
    };
    let found = PatternReferenceScanner.scan_references(file, &String::from_utf8_lossy(&bytes));
    let outside = found
        .iter()
        .filter(|path| !path.starts_with(project_root))
        .count();
    if outside > 0 {
        debug!(
            "{} references {outside} file(s) outside {}",
            file.display(),
            project_root.display()
        );
    }
    found
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_relative_references_resolve_against_file_dir() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().canonicalize()?;
        fs::create_dir_all(root.join("app/config"))?;
        fs::write(root.join("app/config/settings.yaml"), "debug: true\n")?;
        fs::write(root.join("app/logo.PNG"), [0_u8; 4])?;
        let script = root.join("app/main.py");
        fs::write(
            &script,
            "CONFIG = 'config/settings.yaml'\n# icon: logo.PNG\nMISSING = 'nope/gone.csv'\n",
        )?;

        let found = find_literal_files(&script, &root);
        let expected: IndexSet<PathBuf> = [
            root.join("app/config/settings.yaml"),
            root.join("app/logo.PNG"),
        ]
        .into_iter()
        .collect();
        assert_eq!(found, expected);
        Ok(())
    }

    #[test]
    fn test_absolute_reference_and_directory_match() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().canonicalize()?;
        let outside = TempDir::new()?;
        let shared = outside.path().canonicalize()?.join("shared.json");
        fs::write(&shared, "{}")?;
        // a directory whose name looks like a data file
        fs::create_dir_all(root.join("bundle.db"))?;

        let source = format!("load('{}')\nopen('bundle.db')\n", shared.display());
        let found = PatternReferenceScanner.scan_references(&root.join("main.py"), &source);

        assert_eq!(found.into_iter().collect::<Vec<_>>(), vec![shared]);
        Ok(())
    }

    #[test]
    fn test_never_returns_missing_paths() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let script = temp_dir.path().join("main.py");
        fs::write(
            &script,
            "a = 'data/users.csv'\nb = '/definitely/not/here.toml'\nc = 'C:\\\\app\\\\x.ini'\n",
        )?;

        let found = find_literal_files(&script, temp_dir.path());
        assert!(found.iter().all(|path| path.is_file()));
        assert!(found.is_empty());
        Ok(())
    }

    #[test]
    fn test_unreadable_file_is_empty() {
        let missing = Path::new("/nonexistent/freezeplan/main.py");
        assert!(find_literal_files(missing, Path::new("/nonexistent")).is_empty());
    }
}
