//! Source/destination pairs for bundled data files and directories

use std::{
    fmt,
    path::{Path, PathBuf},
};

use indexmap::IndexSet;
use log::debug;
use serde::{Deserialize, Serialize};

/// Destination used for files at the project root
pub const ROOT_DESTINATION: &str = ".";

/// A data file or directory and where it lands inside the bundle
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataMapping {
    pub source: PathBuf,
    pub destination: String,
}

impl DataMapping {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    /// `SRC<separator>DEST`, the form the bundler's `--add-data` expects
    pub fn to_arg(&self, separator: char) -> String {
        format!("{}{separator}{}", self.source.display(), self.destination)
    }
}

impl fmt::Display for DataMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source.display(), self.destination)
    }
}

/// Map paths to bundle destinations relative to `project_root`
///
/// Files under the root land in their parent directory, directories keep their
/// relative path, and anything outside the root lands under its own name.
/// Identical pairs are emitted once, in first-seen order.
pub fn map_entries<'a>(
    paths: impl IntoIterator<Item = &'a Path>,
    project_root: &Path,
) -> Vec<DataMapping> {
    let mapped: IndexSet<DataMapping> = paths
        .into_iter()
        .map(|path| map_entry(path, project_root))
        .collect();
    mapped.into_iter().collect()
}

fn map_entry(path: &Path, project_root: &Path) -> DataMapping {
    let source = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let destination = match source.strip_prefix(project_root) {
        Ok(relative) => {
            let relative = if source.is_file() {
                relative.parent().unwrap_or_else(|| Path::new(""))
            } else {
                relative
            };
            relative_destination(relative)
        }
        Err(_) => source
            .file_name()
            .map_or_else(|| ROOT_DESTINATION.to_owned(), |name| name.to_string_lossy().into_owned()),
    };
    DataMapping {
        source,
        destination,
    }
}

fn relative_destination(relative: &Path) -> String {
    if relative.as_os_str().is_empty() {
        ROOT_DESTINATION.to_owned()
    } else {
        relative.to_string_lossy().into_owned()
    }
}

/// Conventional data directories that exist directly under `project_root`,
/// in the order of `names`, each mapped to its own name
pub fn auto_data_dirs<S: AsRef<str>>(project_root: &Path, names: &[S]) -> Vec<DataMapping> {
    names
        .iter()
        .filter_map(|name| {
            let name: &str = name.as_ref();
            let dir = project_root.join(name);
            dir.is_dir().then(|| DataMapping::new(dir, name))
        })
        .collect()
}

/// Final data list: manual mappings, then mapped literal files, then the
/// auto-detected directories when enabled; first occurrence wins
pub fn assemble_data_mappings<'a, S: AsRef<str>>(
    manual: &[DataMapping],
    literal_files: impl IntoIterator<Item = &'a Path>,
    project_root: &Path,
    auto_dir_names: Option<&[S]>,
) -> Vec<DataMapping> {
    let mut assembled: IndexSet<DataMapping> = manual.iter().cloned().collect();
    assembled.extend(map_entries(literal_files, project_root));
    if let Some(names) = auto_dir_names {
        let auto = auto_data_dirs(project_root, names);
        debug!("Auto-detected {} data director(ies)", auto.len());
        assembled.extend(auto);
    }
    assembled.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn project() -> anyhow::Result<(TempDir, PathBuf)> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().canonicalize()?;
        fs::create_dir_all(root.join("assets/icons"))?;
        fs::create_dir_all(root.join("locale"))?;
        fs::write(root.join("assets/icons/app.png"), [0_u8; 4])?;
        fs::write(root.join("settings.toml"), "")?;
        Ok((temp_dir, root))
    }

    #[test]
    fn test_map_entries_destinations() -> anyhow::Result<()> {
        let (_temp_dir, root) = project()?;
        let outside_dir = TempDir::new()?;
        let outside = outside_dir.path().canonicalize()?.join("shared.csv");
        fs::write(&outside, "a,b\n")?;

        let icon = root.join("assets/icons/app.png");
        let settings = root.join("settings.toml");
        let assets = root.join("assets");
        let mapped = map_entries(
            [
                icon.as_path(),
                settings.as_path(),
                assets.as_path(),
                outside.as_path(),
                root.as_path(),
            ],
            &root,
        );

        assert_eq!(
            mapped,
            vec![
                DataMapping::new(&icon, Path::new("assets").join("icons").to_string_lossy()),
                DataMapping::new(&settings, "."),
                DataMapping::new(&assets, "assets"),
                DataMapping::new(&outside, "shared.csv"),
                DataMapping::new(&root, "."),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_map_entries_suppresses_duplicates() -> anyhow::Result<()> {
        let (_temp_dir, root) = project()?;
        let settings = root.join("settings.toml");
        let via_dot = root.join("assets/../settings.toml");

        let mapped = map_entries([settings.as_path(), via_dot.as_path(), settings.as_path()], &root);
        assert_eq!(mapped, vec![DataMapping::new(&settings, ".")]);
        Ok(())
    }

    #[test]
    fn test_auto_data_dirs_in_priority_order() -> anyhow::Result<()> {
        let (_temp_dir, root) = project()?;
        fs::write(root.join("data"), "not a directory")?;

        let found = auto_data_dirs(&root, &["locale", "data", "assets", "static"]);
        assert_eq!(
            found,
            vec![
                DataMapping::new(root.join("locale"), "locale"),
                DataMapping::new(root.join("assets"), "assets"),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_assembly_order_and_dedup() -> anyhow::Result<()> {
        let (_temp_dir, root) = project()?;
        let manual = vec![DataMapping::new(root.join("assets"), "assets")];
        let icon = root.join("assets/icons/app.png");

        let assembled = assemble_data_mappings(
            &manual,
            [icon.as_path()],
            &root,
            Some(&["assets", "locale"][..]),
        );
        assert_eq!(
            assembled,
            vec![
                DataMapping::new(root.join("assets"), "assets"),
                DataMapping::new(&icon, Path::new("assets").join("icons").to_string_lossy()),
                DataMapping::new(root.join("locale"), "locale"),
            ]
        );

        let without_auto = assemble_data_mappings(&[], [icon.as_path()], &root, None::<&[&str]>);
        assert_eq!(without_auto.len(), 1);
        Ok(())
    }

    #[test]
    fn test_add_data_argument() {
        let mapping = DataMapping::new("/srv/app/assets", "assets");
        assert_eq!(mapping.to_arg(':'), "/srv/app/assets:assets");
        assert_eq!(mapping.to_arg(';'), "/srv/app/assets;assets");
    }
}
