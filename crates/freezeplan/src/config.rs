//! Hierarchical configuration for freezeplan
//!
//! Values are layered from lowest to highest precedence: built-in defaults,
//! the user configuration file, a `freezeplan.toml` next to the entry script,
//! environment variables, and finally command-line flags (applied by the
//! binary after loading).

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use etcetera::{BaseStrategy, choose_base_strategy};
use indexmap::IndexSet;
use log::debug;
use serde::{Deserialize, Serialize};

/// File name looked up in the user config directory and the project root
pub const CONFIG_FILE_NAME: &str = "freezeplan.toml";

/// Conventional data directory names, in priority order
pub const DEFAULT_AUTO_DATA_DIRS: [&str; 8] = [
    "assets",
    "data",
    "resources",
    "templates",
    "static",
    "config",
    "images",
    "locale",
];

/// Python 3 minor version used for the built-in stdlib database when the
/// interpreter cannot be probed
pub const DEFAULT_PYTHON_VERSION: u8 = 12;

const ENV_PYTHON: &str = "FREEZEPLAN_PYTHON";
const ENV_PYTHON_VERSION: &str = "FREEZEPLAN_PYTHON_VERSION";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Interpreter used for probing and for hosting the bundler
    pub python: PathBuf,
    /// Minor version of Python 3, e.g. 12 for 3.12
    pub python_version: u8,
    /// Data directory names picked up automatically under the project root
    pub auto_data_dirs: Vec<String>,
    /// Directory names skipped while walking the project tree
    pub exclude: IndexSet<String>,
    /// Modules that are always first-party
    pub known_first_party: IndexSet<String>,
    /// Modules that are always third-party
    pub known_third_party: IndexSet<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            python: PathBuf::from(default_python()),
            python_version: DEFAULT_PYTHON_VERSION,
            auto_data_dirs: DEFAULT_AUTO_DATA_DIRS
                .iter()
                .map(|name| (*name).to_owned())
                .collect(),
            exclude: IndexSet::new(),
            known_first_party: IndexSet::new(),
            known_third_party: IndexSet::new(),
        }
    }
}

fn default_python() -> &'static str {
    if cfg!(windows) { "python" } else { "python3" }
}

/// One configuration file; every key is optional so that a layer only
/// overrides what it mentions
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ConfigLayer {
    python: Option<PathBuf>,
    python_version: Option<u8>,
    auto_data_dirs: Option<Vec<String>>,
    exclude: Option<IndexSet<String>>,
    known_first_party: Option<IndexSet<String>>,
    known_third_party: Option<IndexSet<String>>,
}

impl Config {
    /// Load the full hierarchy for a project rooted at `project_dir`
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        Self::load_with_user_config(project_dir, user_config_path().as_deref())
    }

    /// Load the hierarchy with an explicit user config location
    pub fn load_with_user_config(
        project_dir: Option<&Path>,
        user_config: Option<&Path>,
    ) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = user_config {
            config.merge_file(path)?;
        }
        if let Some(dir) = project_dir {
            config.merge_file(&dir.join(CONFIG_FILE_NAME))?;
        }
        config.apply_env()?;

        Ok(config)
    }

    /// Merge a config file on top of the current values; a missing file is not an error
    fn merge_file(&mut self, path: &Path) -> Result<()> {
        if !path.is_file() {
            return Ok(());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let layer: ConfigLayer = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        debug!("Loaded configuration from {}", path.display());
        self.merge(layer);
        Ok(())
    }

    fn merge(&mut self, layer: ConfigLayer) {
        if let Some(python) = layer.python {
            self.python = python;
        }
        if let Some(version) = layer.python_version {
            self.python_version = version;
        }
        if let Some(dirs) = layer.auto_data_dirs {
            self.auto_data_dirs = dirs;
        }
        if let Some(exclude) = layer.exclude {
            self.exclude = exclude;
        }
        if let Some(first_party) = layer.known_first_party {
            self.known_first_party = first_party;
        }
        if let Some(third_party) = layer.known_third_party {
            self.known_third_party = third_party;
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(python) = std::env::var_os(ENV_PYTHON).filter(|v| !v.is_empty()) {
            self.python = PathBuf::from(python);
        }
        if let Ok(version) = std::env::var(ENV_PYTHON_VERSION) {
            self.python_version = parse_python_version(&version)
                .with_context(|| format!("Invalid {ENV_PYTHON_VERSION} value '{version}'"))?;
        }
        Ok(())
    }
}

/// Accepts `12`, `3.12` or `3.12.1` and returns the minor version
fn parse_python_version(value: &str) -> Result<u8> {
    let value = value.trim();
    let minor = match value.split_once('.') {
        Some((_, rest)) => rest.split('.').next().unwrap_or_default(),
        None => value,
    };
    Ok(minor.parse()?)
}

/// `<config dir>/freezeplan/freezeplan.toml`, if a home directory is known
fn user_config_path() -> Option<PathBuf> {
    let strategy = choose_base_strategy().ok()?;
    Some(strategy.config_dir().join("freezeplan").join(CONFIG_FILE_NAME))
}
