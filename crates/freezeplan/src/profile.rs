//! Saved build profiles
//!
//! A profile holds only what the user chose. Detected imports, literal files
//! and auto data directories are recomputed on every load.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::data_mapping::DataMapping;

/// Suffix replacing the script extension in the profile file name
pub const PROFILE_SUFFIX: &str = ".buildprofile.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BuildProfile {
    pub script: PathBuf,
    /// Output name; empty means the script's stem
    pub name: String,
    pub icon: Option<PathBuf>,
    pub onefile: bool,
    pub windowed: bool,
    pub clean: bool,
    /// Scan every Python file under the script's directory
    pub scan_all: bool,
    pub auto_data_dirs: bool,
    /// Collect heavy packages completely
    pub collect_all: bool,
    pub noupx: bool,
    pub runtime_tmpdir: Option<String>,
    pub version_file: Option<PathBuf>,
    pub extra_paths: Vec<PathBuf>,
    pub manual_hidden: Vec<String>,
    /// Detected imports the user removed from the hidden-import list
    pub excluded_imports: Vec<String>,
    pub manual_datas: Vec<DataMapping>,
    pub metadata: ProfileMetadata,
}

impl Default for BuildProfile {
    fn default() -> Self {
        Self {
            script: PathBuf::new(),
            name: String::new(),
            icon: None,
            onefile: true,
            windowed: false,
            clean: true,
            scan_all: true,
            auto_data_dirs: true,
            collect_all: true,
            noupx: true,
            runtime_tmpdir: None,
            version_file: None,
            extra_paths: Vec::new(),
            manual_hidden: Vec::new(),
            excluded_imports: Vec::new(),
            manual_datas: Vec::new(),
            metadata: ProfileMetadata::default(),
        }
    }
}

/// Executable metadata carried along with the profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProfileMetadata {
    pub use_versioninfo: bool,
    pub publisher: String,
    pub product: String,
    pub version: String,
    pub description: String,
    pub copyright: String,
}

impl Default for ProfileMetadata {
    fn default() -> Self {
        Self {
            use_versioninfo: true,
            publisher: String::new(),
            product: String::new(),
            version: "1.0.0".to_owned(),
            description: String::new(),
            copyright: String::new(),
        }
    }
}

impl BuildProfile {
    /// Default profile for `script`
    pub fn for_script(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            ..Self::default()
        }
    }

    /// `<dir>/<stem>.buildprofile.toml` next to `script`
    pub fn path_for(script: &Path) -> PathBuf {
        let stem = script
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        script.with_file_name(format!("{stem}{PROFILE_SUFFIX}"))
    }

    /// Output name, falling back to the script's stem
    pub fn output_name(&self) -> String {
        if self.name.trim().is_empty() {
            self.script
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()
        } else {
            self.name.trim().to_owned()
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile {}", path.display()))?;
        let profile = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse profile {}", path.display()))?;
        debug!("Loaded profile from {}", path.display());
        Ok(profile)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml()?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write profile {}", path.display()))?;
        debug!("Saved profile to {}", path.display());
        Ok(())
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize profile")
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn full_profile() -> BuildProfile {
        BuildProfile {
            script: PathBuf::from("/srv/app/main.py"),
            name: "Report Tool".to_owned(),
            icon: Some(PathBuf::from("/srv/app/app.ico")),
            onefile: false,
            windowed: true,
            clean: false,
            scan_all: false,
            auto_data_dirs: false,
            collect_all: false,
            noupx: false,
            runtime_tmpdir: Some("%LOCALAPPDATA%/report".to_owned()),
            version_file: Some(PathBuf::from("/srv/app/version.txt")),
            extra_paths: vec![PathBuf::from("/srv/lib"), PathBuf::from("vendor")],
            manual_hidden: vec!["win32timezone".to_owned()],
            excluded_imports: vec!["tkinter".to_owned()],
            manual_datas: vec![
                DataMapping::new("/srv/app/assets", "assets"),
                DataMapping::new("/srv/shared/fonts/Inter.ttf", "fonts"),
            ],
            metadata: ProfileMetadata {
                use_versioninfo: false,
                publisher: "Example GmbH".to_owned(),
                product: "Report Tool".to_owned(),
                version: "2.4.1".to_owned(),
                description: "Monthly \"report\" generator".to_owned(),
                copyright: "(c) 2024".to_owned(),
            },
        }
    }

    #[test]
    fn test_save_then_load_is_identical() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("main.buildprofile.toml");
        let profile = full_profile();

        profile.save(&path)?;
        assert_eq!(BuildProfile::load(&path)?, profile);

        let defaults = BuildProfile::for_script("/srv/app/main.py");
        defaults.save(&path)?;
        assert_eq!(BuildProfile::load(&path)?, defaults);
        Ok(())
    }

    #[test]
    fn test_missing_keys_take_defaults() -> Result<()> {
        let profile = BuildProfile::from_toml("script = \"tool.py\"\nwindowed = true\n")?;
        assert_eq!(profile.script, PathBuf::from("tool.py"));
        assert!(profile.windowed);
        assert!(profile.onefile);
        assert!(profile.clean);
        assert!(profile.scan_all);
        assert!(profile.auto_data_dirs);
        assert!(profile.collect_all);
        assert!(profile.noupx);
        assert!(profile.metadata.use_versioninfo);
        assert_eq!(profile.metadata.version, "1.0.0");
        Ok(())
    }

    #[test]
    fn test_profile_path_and_output_name() {
        let script = Path::new("/srv/app/main.py");
        assert_eq!(
            BuildProfile::path_for(script),
            PathBuf::from("/srv/app/main.buildprofile.toml")
        );

        let mut profile = BuildProfile::for_script(script);
        assert_eq!(profile.output_name(), "main");
        profile.name = "  Report  ".to_owned();
        assert_eq!(profile.output_name(), "Report");
    }

    #[test]
    fn test_unreadable_profile_is_an_error() {
        let result = BuildProfile::load(Path::new("/nonexistent/freezeplan.buildprofile.toml"));
        assert!(result.is_err());
    }
}
