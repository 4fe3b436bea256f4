//! First-party/stdlib versus third-party classification
//!
//! Classification is a pure function of the module name and an environment
//! snapshot (stdlib set, installed-package map, module finder). Nothing here
//! caches or mutates, so the same name always classifies the same way within
//! one run.

use indexmap::IndexSet;
use log::debug;

use crate::{
    config::Config,
    resolver::{ModuleFinder, ModuleOrigin},
    site_packages::PackageMap,
    stdlib_detection::StdlibSet,
    types::{ModuleKind, top_level_module},
};

/// Decide whether `module` needs to be treated as a third-party dependency
///
/// Lookup failures count as third-party: an extra hidden import is harmless,
/// a missing one breaks the bundle.
pub fn is_third_party(
    module: &str,
    stdlib: &StdlibSet,
    packages: &PackageMap,
    finder: &dyn ModuleFinder,
) -> bool {
    classify_module(module, stdlib, packages, finder).is_some_and(|kind| kind.is_third_party())
}

/// Classify `module` by its top-level segment; `None` for an empty name
pub fn classify_module(
    module: &str,
    stdlib: &StdlibSet,
    packages: &PackageMap,
    finder: &dyn ModuleFinder,
) -> Option<ModuleKind> {
    let top_level = top_level_module(module);
    if top_level.is_empty() {
        return None;
    }
    if stdlib.contains(top_level) {
        return Some(ModuleKind::StandardLibrary);
    }
    if packages.contains(top_level) {
        return Some(ModuleKind::ThirdParty);
    }

    let kind = match finder.find_origin(top_level) {
        // Not locatable on a known search path: nothing to bundle
        Ok(None) => ModuleKind::FirstParty,
        Ok(Some(ModuleOrigin::BuiltIn)) => ModuleKind::StandardLibrary,
        Ok(Some(ModuleOrigin::FirstParty(_))) => ModuleKind::FirstParty,
        Ok(Some(ModuleOrigin::Path(origin))) => {
            if stdlib.is_within_install_dirs(&origin) {
                ModuleKind::StandardLibrary
            } else {
                ModuleKind::ThirdParty
            }
        }
        Err(e) => {
            debug!("Lookup of '{top_level}' failed ({e:#}); treating it as third-party");
            ModuleKind::ThirdParty
        }
    };
    Some(kind)
}

/// Classifier bound to one environment snapshot plus configured overrides
pub struct ModuleClassifier<'a> {
    stdlib: &'a StdlibSet,
    packages: &'a PackageMap,
    finder: &'a dyn ModuleFinder,
    known_first_party: IndexSet<String>,
    known_third_party: IndexSet<String>,
}

impl std::fmt::Debug for ModuleClassifier<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleClassifier")
            .field("stdlib", &self.stdlib.len())
            .field("packages", &self.packages.len())
            .field("known_first_party", &self.known_first_party)
            .field("known_third_party", &self.known_third_party)
            .finish_non_exhaustive()
    }
}

impl<'a> ModuleClassifier<'a> {
    pub fn new(
        stdlib: &'a StdlibSet,
        packages: &'a PackageMap,
        finder: &'a dyn ModuleFinder,
    ) -> Self {
        Self {
            stdlib,
            packages,
            finder,
            known_first_party: IndexSet::new(),
            known_third_party: IndexSet::new(),
        }
    }

    /// Apply the `known-first-party` / `known-third-party` overrides from config
    #[must_use]
    pub fn with_overrides(mut self, config: &Config) -> Self {
        self.known_first_party = config.known_first_party.clone();
        self.known_third_party = config.known_third_party.clone();
        self
    }

    pub fn classify(&self, module: &str) -> Option<ModuleKind> {
        let top_level = top_level_module(module);
        if self.known_first_party.contains(top_level) {
            return Some(ModuleKind::FirstParty);
        }
        if self.known_third_party.contains(top_level) {
            return Some(ModuleKind::ThirdParty);
        }
        classify_module(module, self.stdlib, self.packages, self.finder)
    }

    pub fn is_third_party(&self, module: &str) -> bool {
        self.classify(module)
            .is_some_and(|kind| kind.is_third_party())
    }
}
