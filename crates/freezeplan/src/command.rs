//! Bundler command assembly
//!
//! [`build_command`] is a pure function of a [`BuildSpec`]: the same spec
//! always yields the same argument list, in the same order.

use std::path::{Path, PathBuf};

use crate::data_mapping::DataMapping;

/// Module run with `python -m` to invoke the bundler
pub const BUNDLER_MODULE: &str = "PyInstaller";

/// Output layout of the bundle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BundleMode {
    /// A single self-extracting executable
    #[default]
    OneFile,
    /// A directory holding the executable and its dependencies
    OneDir,
}

impl BundleMode {
    pub fn flag(self) -> &'static str {
        match self {
            Self::OneFile => "--onefile",
            Self::OneDir => "--onedir",
        }
    }
}

/// Everything one bundler invocation needs; built fresh for every build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpec {
    /// Interpreter hosting the bundler
    pub python: PathBuf,
    pub entry: PathBuf,
    pub name: Option<String>,
    pub mode: BundleMode,
    pub windowed: bool,
    pub clean: bool,
    pub noconfirm: bool,
    /// Disable UPX compression
    pub noupx: bool,
    pub icon: Option<PathBuf>,
    pub datas: Vec<DataMapping>,
    /// Sorted and deduplicated
    pub hidden_imports: Vec<String>,
    /// Packages whose entire tree is collected
    pub bundle_all: Vec<String>,
    /// Extra module search paths
    pub search_paths: Vec<PathBuf>,
    pub version_file: Option<PathBuf>,
    pub runtime_tmpdir: Option<String>,
}

impl BuildSpec {
    /// A spec with the bundler's usual defaults and nothing detected yet
    pub fn new(python: impl Into<PathBuf>, entry: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            entry: entry.into(),
            name: None,
            mode: BundleMode::OneFile,
            windowed: false,
            clean: true,
            noconfirm: true,
            noupx: false,
            icon: None,
            datas: Vec::new(),
            hidden_imports: Vec::new(),
            bundle_all: Vec::new(),
            search_paths: Vec::new(),
            version_file: None,
            runtime_tmpdir: None,
        }
    }

    /// Directory the bundler runs in
    pub fn working_dir(&self) -> &Path {
        self.entry.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Separator between source and destination in `--add-data`
pub fn data_separator() -> char {
    if cfg!(windows) { ';' } else { ':' }
}

/// Assemble the bundler argument list
///
/// The icon and version file are emitted only when they exist on disk.
pub fn build_command(spec: &BuildSpec) -> Vec<String> {
    let mut args = vec![
        path_arg(&spec.python),
        "-m".to_owned(),
        BUNDLER_MODULE.to_owned(),
    ];

    if spec.clean {
        args.push("--clean".to_owned());
    }
    if spec.noconfirm {
        args.push("--noconfirm".to_owned());
    }
    args.push(spec.mode.flag().to_owned());
    if spec.windowed {
        args.push("--windowed".to_owned());
    }
    if let Some(name) = spec.name.as_deref().filter(|name| !name.is_empty()) {
        push_option(&mut args, "--name", name.to_owned());
    }
    if let Some(icon) = spec.icon.as_deref().filter(|icon| icon.exists()) {
        push_option(&mut args, "--icon", path_arg(icon));
    }

    let separator = data_separator();
    for mapping in &spec.datas {
        push_option(&mut args, "--add-data", mapping.to_arg(separator));
    }
    for module in &spec.hidden_imports {
        push_option(&mut args, "--hidden-import", module.clone());
    }
    for package in &spec.bundle_all {
        push_option(&mut args, "--collect-all", package.clone());
    }
    for path in &spec.search_paths {
        push_option(&mut args, "--paths", path_arg(path));
    }

    if spec.noupx {
        args.push("--noupx".to_owned());
    }
    if let Some(tmpdir) = spec.runtime_tmpdir.as_deref().filter(|dir| !dir.is_empty()) {
        push_option(&mut args, "--runtime-tmpdir", tmpdir.to_owned());
    }
    if let Some(version_file) = spec.version_file.as_deref().filter(|file| file.exists()) {
        push_option(&mut args, "--version-file", path_arg(version_file));
    }

    args.push(path_arg(&spec.entry));
    args
}

fn push_option(args: &mut Vec<String>, flag: &str, value: String) {
    args.push(flag.to_owned());
    args.push(value);
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Join arguments into one line a POSIX shell would split back identically
pub fn shell_join<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|arg| shell_quote(arg.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(arg: &str) -> String {
    let is_safe = |c: char| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c);
    if !arg.is_empty() && arg.chars().all(is_safe) {
        return arg.to_owned();
    }
    format!("'{}'", arg.replace('\'', r#"'"'"'"#))
}
