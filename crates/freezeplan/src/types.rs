//! Shared type definitions for the freezeplan crate
//!
//! This module contains common types that are used across multiple components
//! of the analyzer, ensuring consistency and avoiding circular dependencies.

/// Classification of a module based on its origin
///
/// Only the distinction between third-party and everything else feeds the
/// hidden-import list, but the finer categories are kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    /// Python standard library modules (e.g., os, sys, json), including
    /// modules compiled into the interpreter
    StandardLibrary,

    /// Third-party packages installed via pip/conda (e.g., numpy, requests)
    ThirdParty,

    /// First-party modules that live in the project being packaged
    FirstParty,
}

impl ModuleKind {
    /// Check if this is a standard library module
    pub fn is_stdlib(&self) -> bool {
        matches!(self, Self::StandardLibrary)
    }

    /// Check if this is a third-party module
    pub fn is_third_party(&self) -> bool {
        matches!(self, Self::ThirdParty)
    }
}

impl std::fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StandardLibrary => write!(f, "stdlib"),
            Self::ThirdParty => write!(f, "third-party"),
            Self::FirstParty => write!(f, "first-party"),
        }
    }
}

/// Return the top-level segment of a dotted module name.
///
/// `"os.path"` becomes `"os"`, `""` stays `""`, and a relative name such as
/// `".utils"` yields the empty string.
pub fn top_level_module(name: &str) -> &str {
    name.split('.').next().unwrap_or_default()
}
