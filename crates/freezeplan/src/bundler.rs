//! Running the external bundler: availability check, installation and builds

use std::{
    env,
    ffi::{OsStr, OsString},
    io::{BufRead, BufReader, Read},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::mpsc,
    thread,
};

use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};

use crate::command::BUNDLER_MODULE;

/// Warning filter added to every child process: the bundler's dependency
/// `peutils` emits a `SyntaxWarning` on recent interpreters
pub const WARNING_FILTER: &str = "ignore::SyntaxWarning:peutils";

const BUNDLER_EXECUTABLES: [&str; 2] = ["pyinstaller", "pyi-makespec"];

/// Whether the bundler can be run, and which version it reports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundlerStatus {
    pub available: bool,
    /// Empty when unknown
    pub version: String,
}

/// Result of a child process that ran to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    /// Captured stdout and stderr lines, in arrival order
    pub output: Vec<String>,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Check for the bundler on `PATH`, then as a module of `python`
///
/// Never fails: anything that goes wrong means "not available".
pub fn check_bundler(python: &Path) -> BundlerStatus {
    check_bundler_in(python, env::var_os("PATH").as_deref())
}

fn check_bundler_in(python: &Path, search_path: Option<&OsStr>) -> BundlerStatus {
    let executable = BUNDLER_EXECUTABLES
        .iter()
        .find_map(|name| find_in_path(&executable_name(name), search_path));

    if let Some(executable) = executable {
        debug!("Found bundler executable at {}", executable.display());
        let version = command_version(Command::new(&executable).arg("--version"));
        return BundlerStatus {
            available: true,
            version: version.unwrap_or_default(),
        };
    }

    match command_version(Command::new(python).args(["-m", BUNDLER_MODULE, "--version"])) {
        Some(version) => BundlerStatus {
            available: true,
            version,
        },
        None => {
            info!("{BUNDLER_MODULE} not found");
            BundlerStatus::default()
        }
    }
}

/// Trimmed combined output of a successful run
fn command_version(command: &mut Command) -> Option<String> {
    let output = command
        .env("PYTHONWARNINGS", warning_filter_env())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Some(text.trim().to_owned())
}

fn executable_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_owned()
    }
}

fn find_in_path(executable: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    search_path.and_then(|paths| {
        env::split_paths(paths).find_map(|dir| {
            let candidate = dir.join(executable);
            candidate.is_file().then_some(candidate)
        })
    })
}

/// `PYTHONWARNINGS` value with [`WARNING_FILTER`] appended once
pub fn with_warning_filter(existing: Option<&str>) -> String {
    match existing.map(str::trim).filter(|value| !value.is_empty()) {
        None => WARNING_FILTER.to_owned(),
        Some(value) => {
            let present = value.split(',').map(str::trim).any(|rule| rule == WARNING_FILTER);
            if present {
                value.to_owned()
            } else {
                format!("{value},{WARNING_FILTER}")
            }
        }
    }
}

fn warning_filter_env() -> OsString {
    let existing = env::var("PYTHONWARNINGS").ok();
    OsString::from(with_warning_filter(existing.as_deref()))
}

/// `python -m pip install --upgrade pyinstaller`, streaming its output
pub fn install_bundler(python: &Path, on_line: impl FnMut(&str)) -> Result<ProcessOutcome> {
    let command = [
        python.to_string_lossy().into_owned(),
        "-m".to_owned(),
        "pip".to_owned(),
        "install".to_owned(),
        "--upgrade".to_owned(),
        "pyinstaller".to_owned(),
    ];
    info!("Installing {BUNDLER_MODULE} with pip");
    let outcome = run_streaming(&command, None, on_line)?;
    if !outcome.success() {
        warn!("pip exited with {:?}", outcome.exit_code);
    }
    Ok(outcome)
}

/// Run an assembled bundler command in `cwd`
///
/// A non-zero exit is reported through the outcome, not as an error; only a
/// failure to start the process is.
pub fn run_build(command: &[String], cwd: &Path, on_line: impl FnMut(&str)) -> Result<ProcessOutcome> {
    run_streaming(command, Some(cwd), on_line)
}

fn run_streaming(
    command: &[String],
    cwd: Option<&Path>,
    mut on_line: impl FnMut(&str),
) -> Result<ProcessOutcome> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow!("Empty command"))?;

    let mut process = Command::new(program);
    process
        .args(args)
        .env("PYTHONWARNINGS", warning_filter_env())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = cwd {
        process.current_dir(cwd);
    }

    let mut child = process
        .spawn()
        .with_context(|| format!("Failed to start {program}"))?;

    let (sender, receiver) = mpsc::channel();
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        let sender = sender.clone();
        readers.push(thread::spawn(move || forward_lines(stdout, &sender)));
    }
    if let Some(stderr) = child.stderr.take() {
        let sender = sender.clone();
        readers.push(thread::spawn(move || forward_lines(stderr, &sender)));
    }
    drop(sender);

    let mut output = Vec::new();
    for line in receiver {
        on_line(&line);
        output.push(line);
    }
    for reader in readers {
        if reader.join().is_err() {
            warn!("Output reader thread panicked");
        }
    }

    let status = child
        .wait()
        .with_context(|| format!("Failed to wait for {program}"))?;
    Ok(ProcessOutcome {
        exit_code: status.code(),
        output,
    })
}

fn forward_lines(stream: impl Read, sender: &mpsc::Sender<String>) {
    for chunk in BufReader::new(stream).split(b'\n') {
        let Ok(chunk) = chunk else {
            break;
        };
        let line = String::from_utf8_lossy(&chunk);
        if sender.send(line.trim_end_matches('\r').to_owned()).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_absent_bundler_is_not_available() -> Result<()> {
        let empty_dir = TempDir::new()?;
        let search_path = env::join_paths([empty_dir.path()])?;

        let status = check_bundler_in(
            Path::new("/nonexistent/freezeplan/python3"),
            Some(search_path.as_os_str()),
        );
        assert_eq!(status, BundlerStatus::default());
        assert!(!status.available);
        assert!(status.version.is_empty());
        Ok(())
    }

    #[cfg(unix)]
    fn write_executable(path: &Path, script: &str) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        std::fs::write(path, script)?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_bundler_executable_on_path() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let broken = temp_dir.path().join("broken");
        let working = temp_dir.path().join("working");
        std::fs::create_dir_all(&broken)?;
        std::fs::create_dir_all(&working)?;
        write_executable(&broken.join("pyinstaller"), "#!/bin/sh\nexit 1\n")?;
        write_executable(&working.join("pyinstaller"), "#!/bin/sh\necho '  6.11.1  '\n")?;
        let python = Path::new("/nonexistent/freezeplan/python3");

        let broken_path = env::join_paths([&broken])?;
        assert_eq!(
            check_bundler_in(python, Some(broken_path.as_os_str())),
            BundlerStatus {
                available: true,
                version: String::new(),
            }
        );

        let working_path = env::join_paths([&working])?;
        assert_eq!(
            check_bundler_in(python, Some(working_path.as_os_str())),
            BundlerStatus {
                available: true,
                version: "6.11.1".to_owned(),
            }
        );
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_bundler_module_fallback() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let empty_dir = temp_dir.path().join("bin");
        std::fs::create_dir_all(&empty_dir)?;
        let python = temp_dir.path().join("python3");
        write_executable(
            &python,
            "#!/bin/sh\nif [ \"$1 $2 $3\" = \"-m PyInstaller --version\" ]; then echo 6.10.0; exit 0; fi\nexit 1\n",
        )?;

        let search_path = env::join_paths([&empty_dir])?;
        assert_eq!(
            check_bundler_in(&python, Some(search_path.as_os_str())),
            BundlerStatus {
                available: true,
                version: "6.10.0".to_owned(),
            }
        );
        Ok(())
    }

    #[test]
    fn test_find_in_path() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let first = temp_dir.path().join("first");
        let second = temp_dir.path().join("second");
        std::fs::create_dir_all(&first)?;
        std::fs::create_dir_all(&second)?;
        std::fs::write(second.join("pyinstaller"), "")?;
        let search_path = env::join_paths([&first, &second])?;

        assert_eq!(
            find_in_path("pyinstaller", Some(search_path.as_os_str())),
            Some(second.join("pyinstaller"))
        );
        assert_eq!(find_in_path("pyi-makespec", Some(search_path.as_os_str())), None);
        assert_eq!(find_in_path("pyinstaller", None), None);
        Ok(())
    }

    #[test]
    fn test_warning_filter_is_appended_once() {
        assert_eq!(with_warning_filter(None), WARNING_FILTER);
        assert_eq!(with_warning_filter(Some("  ")), WARNING_FILTER);
        assert_eq!(
            with_warning_filter(Some("ignore::DeprecationWarning")),
            format!("ignore::DeprecationWarning,{WARNING_FILTER}")
        );
        let already = format!("default, {WARNING_FILTER}");
        assert_eq!(with_warning_filter(Some(&already)), already);
    }

    #[test]
    fn test_spawn_failure_is_an_error() {
        let command = vec!["/nonexistent/freezeplan/python3".to_owned()];
        assert!(run_build(&command, Path::new("."), |_| {}).is_err());
        assert!(run_build(&[], Path::new("."), |_| {}).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_output_and_exit_code_are_captured() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let command = vec![
            "sh".to_owned(),
            "-c".to_owned(),
            "echo building; echo warning >&2; pwd; exit 3".to_owned(),
        ];

        let mut streamed = Vec::new();
        let outcome = run_build(&command, temp_dir.path(), |line| streamed.push(line.to_owned()))?;

        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.success());
        assert_eq!(outcome.output, streamed);
        assert!(outcome.output.contains(&"building".to_owned()));
        assert!(outcome.output.contains(&"warning".to_owned()));
        assert_eq!(outcome.output.len(), 3);
        Ok(())
    }
}
