//! Libraries whose resources or plugins are invisible to import scanning

use std::collections::BTreeSet;

use crate::types::top_level_module;

/// Top-level names that need their whole package tree collected
pub const HEAVY_LIBS: [&str; 16] = [
    "matplotlib",
    "sklearn",
    "cv2",
    "PIL",
    "Pillow",
    "nltk",
    "spacy",
    "torch",
    "transformers",
    "openpyxl",
    "pydantic",
    "jinja2",
    "yaml",
    "cryptography",
    "numba",
    "scipy",
];

/// Name to pass to the bundler for a heavy top-level module
fn bundle_name(top_level: &str) -> &str {
    match top_level {
        "PIL" => "Pillow",
        other => other,
    }
}

/// Packages to collect completely, deduplicated and sorted
pub fn suggest_bundle_all<I, S>(modules: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let suggestions: BTreeSet<String> = modules
        .into_iter()
        .filter_map(|module| {
            let top_level = top_level_module(module.as_ref());
            HEAVY_LIBS
                .contains(&top_level)
                .then(|| bundle_name(top_level).to_owned())
        })
        .collect();
    suggestions.into_iter().collect()
}
