//! Import discovery visitor that finds all imports in a Python module,
//! including those nested within functions, classes, and other scopes,
//! plus string-literal module names passed to dynamic-import calls.

use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexSet;
use log::debug;
use ruff_python_ast::{
    Expr, ExprCall, Stmt, StmtImport, StmtImportFrom,
    visitor::{Visitor, walk_expr, walk_stmt},
};
use ruff_python_parser::parse_module;
use ruff_python_stdlib::identifiers::is_identifier;
use ruff_text_size::TextRange;

use super::utils::extract_string_from_expr;
use crate::types::top_level_module;

/// Callee names treated as dynamic-import invocations
/// (`importlib.import_module(...)`, `__import__(...)`)
pub const DYNAMIC_IMPORT_CALLEES: [&str; 2] = ["import_module", "__import__"];

/// Keyword arguments that may carry the module name
const DYNAMIC_IMPORT_KEYWORDS: [&str; 2] = ["name", "module"];

/// A dynamic-import call whose module name is computed at runtime and
/// therefore cannot be resolved statically
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedDynamicImport {
    /// Callee name (`import_module` or `__import__`)
    pub callee: String,
    /// Source range of the call
    pub range: TextRange,
}

/// Imports discovered in one module, reduced to top-level names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleImports {
    /// Top-level names from `import X` and `from X import ...`
    pub static_imports: IndexSet<String>,
    /// Top-level names from dynamic-import calls with literal arguments
    pub dynamic_imports: IndexSet<String>,
    /// Dynamic-import calls dropped because their argument is not a literal
    /// module name
    pub unresolved_dynamic: Vec<UnresolvedDynamicImport>,
}

impl ModuleImports {
    /// Parse `source` and collect its imports
    pub fn from_source(source: &str) -> Result<Self> {
        let parsed = parse_module(source)?;
        let mut visitor = ImportDiscoveryVisitor::new();
        visitor.visit_body(&parsed.syntax().body);
        Ok(visitor.into_imports())
    }

    /// Read and parse a file; see [`parse_imports`] for the lenient variant
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let source = String::from_utf8_lossy(&bytes);
        Self::from_source(&source).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

/// Collect the imports of one file; unreadable or unparseable files yield
/// empty results
pub fn parse_imports(path: &Path) -> ModuleImports {
    ModuleImports::from_file(path).unwrap_or_else(|e| {
        debug!("{e:#}");
        ModuleImports::default()
    })
}

/// Visitor that discovers all imports in a Python module
#[derive(Debug, Default)]
pub struct ImportDiscoveryVisitor {
    imports: ModuleImports,
}

impl ImportDiscoveryVisitor {
    /// Create a new import discovery visitor
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all discovered imports
    pub fn into_imports(self) -> ModuleImports {
        self.imports
    }

    /// Record an import statement
    fn record_import(&mut self, stmt: &StmtImport) {
        for alias in &stmt.names {
            self.add_static(alias.name.as_str());
        }
    }

    /// Record a from import statement
    ///
    /// `from . import x` has no module and contributes nothing; `from .pkg import x`
    /// contributes `pkg`.
    fn record_import_from(&mut self, stmt: &StmtImportFrom) {
        if let Some(module) = &stmt.module {
            self.add_static(module.as_str());
        }
    }

    fn add_static(&mut self, module_name: &str) {
        let top_level = top_level_module(module_name);
        if !top_level.is_empty() {
            self.imports.static_imports.insert(top_level.to_owned());
        }
    }

    /// Record a call if its callee is a dynamic-import invocation
    fn record_call(&mut self, call: &ExprCall) {
        let Some(callee) = callee_name(&call.func) else {
            return;
        };
        if !DYNAMIC_IMPORT_CALLEES.contains(&callee) {
            return;
        }

        // A literal first positional argument wins, even an empty one
        let module_name = match call.arguments.args.first() {
            Some(first) if extract_string_from_expr(first).is_some() => {
                extract_string_from_expr(first)
            }
            _ => call.arguments.keywords.iter().find_map(|keyword| {
                let arg = keyword.arg.as_ref()?;
                if DYNAMIC_IMPORT_KEYWORDS.contains(&arg.as_str()) {
                    extract_string_from_expr(&keyword.value).filter(|name| !name.is_empty())
                } else {
                    None
                }
            }),
        };

        let top_level = module_name.map(top_level_module).unwrap_or_default();
        if !is_identifier(top_level) {
            debug!("Skipping dynamic import via {callee}() without a usable module name");
            self.imports.unresolved_dynamic.push(UnresolvedDynamicImport {
                callee: callee.to_owned(),
                range: call.range,
            });
        } else {
            self.imports.dynamic_imports.insert(top_level.to_owned());
        }
    }
}

/// Callee name of a call: the attribute for `a.b()`, the identifier for `b()`
fn callee_name(func: &Expr) -> Option<&str> {
    match func {
        Expr::Attribute(attr) => Some(attr.attr.as_str()),
        Expr::Name(name) => Some(name.id.as_str()),
        _ => None,
    }
}

impl<'a> Visitor<'a> for ImportDiscoveryVisitor {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        match stmt {
            Stmt::Import(import_stmt) => self.record_import(import_stmt),
            Stmt::ImportFrom(import_from) => self.record_import_from(import_from),
            _ => {}
        }

        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &'a Expr) {
        if let Expr::Call(call) = expr {
            self.record_call(call);
        }

        // Continue traversal
        walk_expr(self, expr);
    }
}
