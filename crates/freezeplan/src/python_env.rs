//! Snapshot of the Python interpreter that will host the bundler
//!
//! Classification depends on the interpreter's standard-library layout and on
//! what is installed next to it. Both are captured once per analysis run by
//! running a tiny probe program, and the resulting value is passed around
//! explicitly instead of being queried again.

use std::{
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, warn};

/// Prints one `key<TAB>value` line per fact
const PROBE_SCRIPT: &str = r#"import sys, sysconfig
from importlib import machinery
print("version\t%d.%d" % sys.version_info[:2])
print("executable\t" + sys.executable)
paths = sysconfig.get_paths()
print("stdlib\t" + paths.get("stdlib", ""))
print("platstdlib\t" + paths.get("platstdlib", ""))
for name in sys.builtin_module_names:
    print("builtin\t" + name)
names = getattr(sys, "stdlib_module_names", None)
if names is not None:
    print("stdlib_names\t1")
    for name in sorted(names):
        print("stdlib_name\t" + name)
for entry in sys.path:
    if entry:
        print("path\t" + entry)
for suffix in machinery.EXTENSION_SUFFIXES:
    print("ext_suffix\t" + suffix)
"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonEnvironment {
    /// Interpreter executable, if one was probed
    pub executable: Option<PathBuf>,
    /// Python 3 minor version
    pub minor_version: u8,
    /// `stdlib` and `platstdlib` installation directories
    pub stdlib_dirs: Vec<PathBuf>,
    /// Modules compiled into the interpreter
    pub builtin_module_names: Vec<String>,
    /// `sys.stdlib_module_names`, on interpreters that expose it
    pub stdlib_module_names: Option<Vec<String>>,
    /// Module search path, without the implicit current-directory entry
    pub sys_path: Vec<PathBuf>,
    /// Accepted file suffixes for compiled extension modules
    pub extension_suffixes: Vec<String>,
    /// Whether the facts above came from a real interpreter; an offline
    /// snapshot knows nothing about installed packages
    pub probed: bool,
}

impl PythonEnvironment {
    /// Run `interpreter` once and capture its environment
    pub fn probe(interpreter: &Path) -> Result<Self> {
        debug!("Probing Python interpreter {}", interpreter.display());
        let output = probe_command(interpreter)
            .output()
            .with_context(|| format!("Failed to run Python interpreter {}", interpreter.display()))?;

        if !output.status.success() {
            bail!(
                "Python interpreter {} exited with {}: {}",
                interpreter.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Self::from_probe_output(&String::from_utf8_lossy(&output.stdout))
    }

    /// Probe `interpreter`, falling back to an offline snapshot on failure
    pub fn probe_or_offline(interpreter: &Path, fallback_minor: u8) -> Self {
        match Self::probe(interpreter) {
            Ok(env) => env,
            Err(e) => {
                warn!(
                    "Could not inspect Python interpreter ({e:#}); using the built-in stdlib \
                     database for Python 3.{fallback_minor} and treating every other import \
                     outside the project as third-party"
                );
                Self::offline(fallback_minor)
            }
        }
    }

    /// Snapshot used when no interpreter is available
    pub fn offline(minor_version: u8) -> Self {
        Self {
            executable: None,
            minor_version,
            stdlib_dirs: Vec::new(),
            builtin_module_names: Vec::new(),
            stdlib_module_names: None,
            sys_path: Vec::new(),
            extension_suffixes: default_extension_suffixes(),
            probed: false,
        }
    }

    /// Parse the output of [`PROBE_SCRIPT`]
    pub fn from_probe_output(output: &str) -> Result<Self> {
        let mut env = Self::offline(0);
        env.extension_suffixes.clear();
        let mut version = None;
        let mut stdlib_names: Option<Vec<String>> = None;

        for line in output.lines() {
            let Some((key, value)) = line.split_once('\t') else {
                continue;
            };
            match key {
                "version" => version = Some(parse_version(value)?),
                "executable" if !value.is_empty() => env.executable = Some(PathBuf::from(value)),
                "stdlib" | "platstdlib" => push_dir(&mut env.stdlib_dirs, value),
                "builtin" => env.builtin_module_names.push(value.to_owned()),
                "stdlib_names" => {
                    stdlib_names.get_or_insert_with(Vec::new);
                }
                "stdlib_name" => stdlib_names
                    .get_or_insert_with(Vec::new)
                    .push(value.to_owned()),
                "path" if !value.is_empty() => env.sys_path.push(PathBuf::from(value)),
                "ext_suffix" => env.extension_suffixes.push(value.to_owned()),
                _ => {}
            }
        }

        env.minor_version = version.ok_or_else(|| anyhow!("Probe output has no version line"))?;
        env.stdlib_module_names = stdlib_names;
        env.probed = true;
        if env.extension_suffixes.is_empty() {
            env.extension_suffixes = default_extension_suffixes();
        }
        Ok(env)
    }

    /// `site-packages` / `dist-packages` entries of the search path
    pub fn site_packages_dirs(&self) -> Vec<PathBuf> {
        self.sys_path
            .iter()
            .filter(|entry| {
                entry
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name == "site-packages" || name == "dist-packages")
            })
            .cloned()
            .collect()
    }
}

/// Probe invocation; output is forced to UTF-8 so paths that the console
/// encoding cannot represent do not make the probe fail
fn probe_command(interpreter: &Path) -> Command {
    let mut command = Command::new(interpreter);
    command
        .args(["-c", PROBE_SCRIPT])
        .env("PYTHONIOENCODING", "utf-8");
    command
}

fn push_dir(dirs: &mut Vec<PathBuf>, value: &str) {
    if value.is_empty() {
        return;
    }
    let dir = PathBuf::from(value);
    if !dirs.contains(&dir) {
        dirs.push(dir);
    }
}

fn parse_version(value: &str) -> Result<u8> {
    let (major, minor) = value
        .split_once('.')
        .ok_or_else(|| anyhow!("Malformed Python version '{value}'"))?;
    if major != "3" {
        bail!("Unsupported Python major version '{major}'");
    }
    minor
        .parse()
        .with_context(|| format!("Malformed Python version '{value}'"))
}

fn default_extension_suffixes() -> Vec<String> {
    let suffixes: &[&str] = if cfg!(windows) { &[".pyd"] } else { &[".abi3.so", ".so"] };
    suffixes.iter().map(|s| (*s).to_owned()).collect()
}
