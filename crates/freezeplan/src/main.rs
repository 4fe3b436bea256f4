use std::{
    fmt::Display,
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use log::{LevelFilter, debug, info, warn};

use freezeplan::{
    analysis::{Analysis, EnvironmentSnapshot, plan_build},
    bundler::{check_bundler, install_bundler, run_build},
    command::{BuildSpec, build_command, shell_join},
    config::Config,
    data_mapping::{DataMapping, map_entries},
    profile::BuildProfile,
    scanner::ProjectScanner,
};

/// Plan and run reproducible PyInstaller builds from a static analysis of a
/// Python script
#[derive(Parser, Debug)]
#[command(name = "freezeplan", version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Python interpreter used for probing and for running the bundler
    #[arg(long, global = true)]
    python: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show detected third-party imports, data files and suggestions
    Analyze(BuildArgs),

    /// Print the bundler command line without running it
    Command(BuildArgs),

    /// Run the bundler
    Build {
        #[command(flatten)]
        args: BuildArgs,

        /// Install the bundler with pip if it is missing
        #[arg(long)]
        install: bool,
    },

    /// Check whether the bundler is available
    Doctor {
        /// Install the bundler with pip if it is missing
        #[arg(long)]
        install: bool,
    },
}

#[derive(Args, Debug, Default)]
struct BuildArgs {
    /// Entry script; optional when `--profile` names one
    script: Option<PathBuf>,

    /// Load settings from a saved build profile
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Save the effective settings next to the script
    #[arg(long)]
    save_profile: bool,

    /// Output name (defaults to the script's stem)
    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    icon: Option<PathBuf>,

    /// Build a directory instead of a single file
    #[arg(long)]
    onedir: bool,

    /// Do not open a console window
    #[arg(long)]
    windowed: bool,

    #[arg(long)]
    no_clean: bool,

    /// Scan only the entry script, not the whole project
    #[arg(long)]
    no_scan_all: bool,

    /// Do not bundle conventional data directories automatically
    #[arg(long)]
    no_auto_data_dirs: bool,

    /// Do not collect heavy packages completely
    #[arg(long)]
    no_collect_all: bool,

    /// Bundle a file or directory, optionally with an explicit destination
    #[arg(long, value_name = "SRC[=DEST]")]
    add_data: Vec<String>,

    #[arg(long, value_name = "MODULE")]
    hidden_import: Vec<String>,

    /// Remove a detected module from the hidden imports
    #[arg(long, value_name = "MODULE")]
    exclude_import: Vec<String>,

    /// Extra module search path
    #[arg(long, value_name = "DIR")]
    paths: Vec<PathBuf>,

    /// Allow UPX compression
    #[arg(long)]
    upx: bool,

    #[arg(long, value_name = "DIR")]
    runtime_tmpdir: Option<String>,

    /// Windows version resource file
    #[arg(long)]
    version_file: Option<PathBuf>,
}

/// Everything derived for one script
struct Plan {
    analysis: Analysis,
    spec: BuildSpec,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let python = cli.python;
    match cli.command {
        Commands::Analyze(args) => analyze_command(&args, python),
        Commands::Command(args) => command_command(&args, python),
        Commands::Build { args, install } => build_command_run(&args, python, install),
        Commands::Doctor { install } => doctor_command(python, install),
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn load_config(project_dir: Option<&Path>, python: Option<PathBuf>) -> Result<Config> {
    let mut config = Config::load(project_dir)?;
    if let Some(python) = python {
        config.python = python;
    }
    Ok(config)
}

/// Profile from `--profile` or defaults, with command-line flags applied on top
fn resolve_profile(args: &BuildArgs) -> Result<BuildProfile> {
    let mut profile = match &args.profile {
        Some(path) => BuildProfile::load(path)?,
        None => BuildProfile::default(),
    };
    if let Some(script) = &args.script {
        profile.script.clone_from(script);
    }
    if profile.script.as_os_str().is_empty() {
        bail!("No entry script given; pass a script or --profile");
    }
    if !profile.script.is_file() {
        bail!("Entry script {} does not exist", profile.script.display());
    }

    if let Some(name) = &args.name {
        profile.name.clone_from(name);
    }
    if let Some(icon) = &args.icon {
        profile.icon = Some(icon.clone());
    }
    profile.onefile &= !args.onedir;
    profile.windowed |= args.windowed;
    profile.clean &= !args.no_clean;
    profile.scan_all &= !args.no_scan_all;
    profile.auto_data_dirs &= !args.no_auto_data_dirs;
    profile.collect_all &= !args.no_collect_all;
    profile.noupx &= !args.upx;
    if let Some(tmpdir) = &args.runtime_tmpdir {
        profile.runtime_tmpdir = Some(tmpdir.clone());
    }
    if let Some(version_file) = &args.version_file {
        profile.version_file = Some(version_file.clone());
    }

    extend_unique(&mut profile.extra_paths, args.paths.iter().cloned());
    extend_unique(&mut profile.manual_hidden, args.hidden_import.iter().cloned());
    extend_unique(&mut profile.excluded_imports, args.exclude_import.iter().cloned());

    let project_root = project_root(&profile.script);
    let manual = args
        .add_data
        .iter()
        .map(|spec| parse_data_arg(spec, &project_root));
    extend_unique(&mut profile.manual_datas, manual);

    Ok(profile)
}

fn extend_unique<T: PartialEq>(target: &mut Vec<T>, items: impl IntoIterator<Item = T>) {
    for item in items {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

fn project_root(script: &Path) -> PathBuf {
    let script = script
        .canonicalize()
        .unwrap_or_else(|_| script.to_path_buf());
    script.parent().map(Path::to_path_buf).unwrap_or_default()
}

/// `SRC=DEST` is taken as given; a bare `SRC` is mapped relative to the project
fn parse_data_arg(spec: &str, project_root: &Path) -> DataMapping {
    match spec.split_once('=') {
        Some((source, destination)) if !destination.is_empty() => {
            DataMapping::new(source, destination)
        }
        _ => {
            let source = Path::new(spec.trim_end_matches('='));
            map_entries([source], project_root)
                .into_iter()
                .next()
                .unwrap_or_else(|| DataMapping::new(source, "."))
        }
    }
}

fn prepare(args: &BuildArgs, python: Option<PathBuf>) -> Result<Plan> {
    let profile = resolve_profile(args)?;
    let project_root = project_root(&profile.script);
    let config = load_config(Some(&project_root), python)?;

    if args.save_profile {
        let path = BuildProfile::path_for(&profile.script);
        profile.save(&path)?;
        info!("Saved profile to {}", path.display());
    }

    let env = EnvironmentSnapshot::detect(&config, &project_root, &profile.extra_paths);
    let classifier = env.classifier(&config);
    let scanner = ProjectScanner::new().with_excludes(config.exclude.iter().cloned());
    let analysis = Analysis::run_with(&scanner, &profile.script, profile.scan_all, &classifier);

    let interpreter = env
        .python
        .executable
        .clone()
        .unwrap_or_else(|| config.python.clone());
    let spec = plan_build(&profile, &analysis, &interpreter, &config.auto_data_dirs);
    debug!("Planned build: {spec:?}");
    Ok(Plan { analysis, spec })
}

fn write_section<T: Display>(
    out: &mut impl Write,
    title: &str,
    items: impl IntoIterator<Item = T>,
) -> io::Result<()> {
    let items: Vec<T> = items.into_iter().collect();
    writeln!(out, "{title} ({}):", items.len())?;
    for item in items {
        writeln!(out, "  {item}")?;
    }
    Ok(())
}

fn analyze_command(args: &BuildArgs, python: Option<PathBuf>) -> Result<()> {
    let Plan { analysis, spec } = prepare(args, python)?;
    let scan = &analysis.scan;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "Project root: {}", scan.project_root.display())?;
    writeln!(out, "Scanned files: {}", scan.files.len())?;
    write_section(&mut out, "Third-party imports", &analysis.third_party)?;
    write_section(&mut out, "Dynamic imports", &analysis.dynamic)?;
    write_section(
        &mut out,
        "Literal files",
        scan.literal_files.iter().map(|path| path.display()),
    )?;
    write_section(&mut out, "Data mappings", &spec.datas)?;
    write_section(&mut out, "Hidden imports", &spec.hidden_imports)?;
    write_section(&mut out, "Collect-all suggestions", &analysis.bundle_all)?;
    if !scan.failed_files.is_empty() {
        write_section(
            &mut out,
            "Files that could not be analyzed",
            scan.failed_files.iter().map(|path| path.display()),
        )?;
    }
    if scan.unresolved_dynamic_imports > 0 {
        writeln!(
            out,
            "Skipped {} dynamic import(s) with a computed module name",
            scan.unresolved_dynamic_imports
        )?;
    }
    Ok(())
}

fn command_command(args: &BuildArgs, python: Option<PathBuf>) -> Result<()> {
    let Plan { spec, .. } = prepare(args, python)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{}", shell_join(&build_command(&spec)))?;
    Ok(())
}

fn build_command_run(args: &BuildArgs, python: Option<PathBuf>, install: bool) -> Result<()> {
    let Plan { spec, .. } = prepare(args, python)?;
    ensure_bundler(&spec.python, install)?;

    let command = build_command(&spec);
    let cwd = spec.working_dir();
    info!("Starting build: {}", shell_join(&command));

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let outcome = run_build(&command, cwd, |line| {
        if writeln!(out, "{line}").is_err() {
            warn!("Failed to write build output");
        }
    })?;

    if !outcome.success() {
        match outcome.exit_code {
            Some(code) => bail!("Build failed with exit code {code}"),
            None => bail!("Build was terminated by a signal"),
        }
    }
    writeln!(out, "Build succeeded")?;
    let dist = cwd.join("dist");
    if dist.is_dir() {
        writeln!(out, "Output: {}", dist.display())?;
    }
    Ok(())
}

/// Fail unless the bundler is available, installing it first when allowed
fn ensure_bundler(python: &Path, install: bool) -> Result<()> {
    let status = check_bundler(python);
    if status.available {
        debug!("Bundler version: {}", status.version);
        return Ok(());
    }
    if !install {
        bail!("PyInstaller not found; rerun with --install to install it with pip");
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let outcome = install_bundler(python, |line| {
        if writeln!(out, "{line}").is_err() {
            warn!("Failed to write pip output");
        }
    })
    .context("Failed to install PyInstaller")?;
    if !outcome.success() {
        bail!("pip exited with {:?}", outcome.exit_code);
    }
    Ok(())
}

fn doctor_command(python: Option<PathBuf>, install: bool) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to determine the current directory")?;
    let config = load_config(Some(&cwd), python)?;

    let mut status = check_bundler(&config.python);
    if !status.available && install {
        ensure_bundler(&config.python, true)?;
        status = check_bundler(&config.python);
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "Interpreter: {}", config.python.display())?;
    if status.available {
        let version = if status.version.is_empty() {
            "unknown version"
        } else {
            status.version.as_str()
        };
        writeln!(out, "PyInstaller: available ({version})")?;
    } else {
        writeln!(out, "PyInstaller: not found (run `freezeplan doctor --install`)")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use clap::CommandFactory;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_profile() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let script = temp_dir.path().join("main.py");
        fs::write(&script, "import os\n")?;
        let profile_path = temp_dir.path().join("main.buildprofile.toml");
        BuildProfile {
            manual_hidden: vec!["certifi".to_owned()],
            ..BuildProfile::for_script(&script)
        }
        .save(&profile_path)?;

        let args = BuildArgs {
            profile: Some(profile_path),
            onedir: true,
            upx: true,
            hidden_import: vec!["certifi".to_owned(), "win32timezone".to_owned()],
            add_data: vec!["/srv/fonts=fonts".to_owned()],
            ..BuildArgs::default()
        };
        let profile = resolve_profile(&args)?;

        assert_eq!(profile.script, script);
        assert!(!profile.onefile);
        assert!(!profile.noupx);
        assert!(profile.clean);
        assert_eq!(profile.manual_hidden, vec!["certifi", "win32timezone"]);
        assert_eq!(profile.manual_datas, vec![DataMapping::new("/srv/fonts", "fonts")]);
        Ok(())
    }

    #[test]
    fn test_missing_script_is_rejected() {
        assert!(resolve_profile(&BuildArgs::default()).is_err());
        let args = BuildArgs {
            script: Some(PathBuf::from("/nonexistent/freezeplan/main.py")),
            ..BuildArgs::default()
        };
        assert!(resolve_profile(&args).is_err());
    }

    #[test]
    fn test_bare_add_data_is_mapped() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().canonicalize()?;
        fs::create_dir_all(root.join("templates/mail"))?;
        fs::write(root.join("templates/mail/welcome.html"), "<p>hi</p>")?;

        let file = root.join("templates/mail/welcome.html");
        let mapping = parse_data_arg(&file.to_string_lossy(), &root);
        assert_eq!(
            mapping.destination,
            Path::new("templates").join("mail").to_string_lossy()
        );
        Ok(())
    }
}
