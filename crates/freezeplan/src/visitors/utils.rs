//! Shared utilities for visitor implementations

use ruff_python_ast::{Expr, ExprStringLiteral};

/// Extract a string value from an expression if it's a string literal
///
/// Implicitly concatenated literals (`"a" "b"`) count as one literal; f-strings
/// and any computed expression do not.
pub fn extract_string_from_expr(expr: &Expr) -> Option<&str> {
    if let Expr::StringLiteral(ExprStringLiteral { value, .. }) = expr {
        Some(value.to_str())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use ruff_python_ast::Stmt;
    use ruff_python_parser::parse_module;

    use super::*;

    fn first_expr(source: &str) -> Expr {
        let parsed = parse_module(source).expect("Failed to parse test module");
        match parsed.into_syntax().body.into_iter().next() {
            Some(Stmt::Expr(stmt)) => *stmt.value,
            other => panic!("expected an expression statement, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_string_literal() {
        assert_eq!(extract_string_from_expr(&first_expr("'yaml'")), Some("yaml"));
        assert_eq!(
            extract_string_from_expr(&first_expr("'ya' 'ml'")),
            Some("yaml")
        );
    }

    #[test]
    fn test_non_literals_are_rejected() {
        assert_eq!(extract_string_from_expr(&first_expr("name")), None);
        assert_eq!(extract_string_from_expr(&first_expr("f'{name}'")), None);
        assert_eq!(extract_string_from_expr(&first_expr("'a' + 'b'")), None);
        assert_eq!(extract_string_from_expr(&first_expr("b'yaml'")), None);
    }
}
