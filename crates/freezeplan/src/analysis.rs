//! Analysis of one entry script and the build plan derived from it

use std::{
    iter,
    path::{Path, PathBuf},
};

use indexmap::IndexSet;
use log::info;

use crate::{
    classifier::ModuleClassifier,
    command::{BuildSpec, BundleMode},
    config::Config,
    data_mapping::assemble_data_mappings,
    heavy_deps::suggest_bundle_all,
    profile::BuildProfile,
    python_env::PythonEnvironment,
    resolver::SearchPathFinder,
    scanner::{ProjectScanner, ScanResult},
    site_packages::PackageMap,
    stdlib_detection::StdlibSet,
};

/// Interpreter facts gathered once per run and shared by every classification
#[derive(Debug)]
pub struct EnvironmentSnapshot {
    pub python: PythonEnvironment,
    pub stdlib: StdlibSet,
    pub packages: PackageMap,
    pub finder: SearchPathFinder,
}

impl EnvironmentSnapshot {
    /// Probe the configured interpreter; the project root and `extra_paths`
    /// hold first-party code
    pub fn detect(config: &Config, project_root: &Path, extra_paths: &[PathBuf]) -> Self {
        let python = PythonEnvironment::probe_or_offline(&config.python, config.python_version);
        let stdlib = StdlibSet::detect(&python);
        let packages = PackageMap::detect(&python, Some(project_root));
        let finder = SearchPathFinder::new(&python).with_first_party_dirs(
            iter::once(project_root).chain(extra_paths.iter().map(PathBuf::as_path)),
        );
        info!(
            "Python 3.{}: {} stdlib names, {} installed top-level modules",
            python.minor_version,
            stdlib.len(),
            packages.len()
        );
        Self {
            python,
            stdlib,
            packages,
            finder,
        }
    }

    /// Classifier over this snapshot with the configured overrides
    pub fn classifier(&self, config: &Config) -> ModuleClassifier<'_> {
        ModuleClassifier::new(&self.stdlib, &self.packages, &self.finder).with_overrides(config)
    }
}

/// Findings of one analysis run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Analysis {
    pub scan: ScanResult,
    /// Statically imported third-party modules, sorted
    pub third_party: IndexSet<String>,
    /// Dynamically imported third-party modules, sorted
    pub dynamic: IndexSet<String>,
    /// Heavy packages to collect completely
    pub bundle_all: Vec<String>,
}

impl Analysis {
    /// Scan `entry` (and the rest of the project when `scan_whole_project`
    /// is set) and classify what it imports
    pub fn run(entry: &Path, scan_whole_project: bool, classifier: &ModuleClassifier<'_>) -> Self {
        Self::run_with(&ProjectScanner::new(), entry, scan_whole_project, classifier)
    }

    pub fn run_with(
        scanner: &ProjectScanner,
        entry: &Path,
        scan_whole_project: bool,
        classifier: &ModuleClassifier<'_>,
    ) -> Self {
        Self::from_scan(scanner.scan(entry, scan_whole_project), classifier)
    }

    pub fn from_scan(scan: ScanResult, classifier: &ModuleClassifier<'_>) -> Self {
        let third_party: IndexSet<String> = scan
            .imports
            .iter()
            .filter(|module| classifier.is_third_party(module))
            .cloned()
            .collect();
        let dynamic: IndexSet<String> = scan
            .dynamic_imports
            .iter()
            .filter(|module| classifier.is_third_party(module))
            .cloned()
            .collect();
        let bundle_all = suggest_bundle_all(third_party.iter().chain(&dynamic));

        info!(
            "Found {} import(s), {} third-party, {} dynamic",
            scan.imports.len(),
            third_party.len(),
            dynamic.len()
        );
        if !bundle_all.is_empty() {
            info!("Collect-all suggestions: {}", bundle_all.join(", "));
        }
        if !scan.failed_files.is_empty() {
            info!("{} file(s) could not be analyzed", scan.failed_files.len());
        }

        Self {
            scan,
            third_party,
            dynamic,
            bundle_all,
        }
    }

    /// Entry script as scanned
    pub fn entry(&self) -> Option<&Path> {
        self.scan.files.first().map(PathBuf::as_path)
    }
}

/// Hidden-import list: detected and manual names, minus removed ones
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HiddenImports {
    detected: IndexSet<String>,
    manual: IndexSet<String>,
    removed: IndexSet<String>,
}

impl HiddenImports {
    /// Start from the third-party modules an analysis found
    pub fn from_analysis(analysis: &Analysis) -> Self {
        Self {
            detected: analysis
                .third_party
                .iter()
                .chain(&analysis.dynamic)
                .cloned()
                .collect(),
            ..Self::default()
        }
    }

    /// Add a name by hand; this undoes an earlier removal
    pub fn add(&mut self, module: impl Into<String>) {
        let module = module.into();
        if module.is_empty() {
            return;
        }
        self.removed.shift_remove(&module);
        self.manual.insert(module);
    }

    /// Drop a name, whether detected or added by hand
    pub fn remove(&mut self, module: &str) {
        self.manual.shift_remove(module);
        self.removed.insert(module.to_owned());
    }

    /// The final sorted list handed to the bundler
    pub fn resolve(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .detected
            .iter()
            .chain(&self.manual)
            .filter(|name| !self.removed.contains(*name))
            .cloned()
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();
        names.sort();
        names
    }
}

/// Construct a fresh build spec from a profile and an analysis of its script
pub fn plan_build(
    profile: &BuildProfile,
    analysis: &Analysis,
    python: &Path,
    auto_dir_names: &[String],
) -> BuildSpec {
    let entry = analysis
        .entry()
        .map_or_else(|| profile.script.clone(), Path::to_path_buf);

    let datas = assemble_data_mappings(
        &profile.manual_datas,
        analysis.scan.literal_files.iter().map(PathBuf::as_path),
        &analysis.scan.project_root,
        profile.auto_data_dirs.then_some(auto_dir_names),
    );

    let mut hidden = HiddenImports::from_analysis(analysis);
    for module in &profile.manual_hidden {
        hidden.add(module.clone());
    }
    for module in &profile.excluded_imports {
        hidden.remove(module);
    }

    BuildSpec {
        name: Some(profile.output_name()),
        mode: if profile.onefile {
            BundleMode::OneFile
        } else {
            BundleMode::OneDir
        },
        windowed: profile.windowed,
        clean: profile.clean,
        noconfirm: true,
        noupx: profile.noupx,
        icon: profile.icon.clone(),
        datas,
        hidden_imports: hidden.resolve(),
        bundle_all: if profile.collect_all {
            analysis.bundle_all.clone()
        } else {
            Vec::new()
        },
        search_paths: profile.extra_paths.clone(),
        version_file: profile.version_file.clone(),
        runtime_tmpdir: profile.runtime_tmpdir.clone(),
        ..BuildSpec::new(python, entry)
    }
}
