//! AST visitor implementations for freezeplan
//!
//! This module contains visitor patterns for traversing Python AST nodes,
//! enabling import discovery across every scope of a module.

mod import_discovery;
mod utils;

pub use import_discovery::{
    DYNAMIC_IMPORT_CALLEES, ImportDiscoveryVisitor, ModuleImports, UnresolvedDynamicImport,
    parse_imports,
};
pub use utils::extract_string_from_expr;
