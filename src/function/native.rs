//! Inline function definitions.
//!
//! Two shapes are accepted, both taking the whole input tuple as one slice:
//!
//! ```text
//! |args| args[0] * args[1]
//! |args: &[f64]| { args[0] / args[1] }
//! fn bmi(args: &[f64]) -> f64 { args[0] / (args[1] / 100) ^ 2 }
//! fn bmi(args: &[f64]) -> f64 { return args[0] / (args[1] / 100) ^ 2; }
//! ```
//!
//! The body is a single expression in the table expression language.

use once_cell::sync::Lazy;
use regex::Regex;

use super::ArgExpression;
use crate::errors::ResolveError;

static CLOSURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\|\s*([A-Za-z_]\w*)\s*(?::[^|]*)?\|(.*)$").expect("valid closure regex")
});

static FN_DEFINITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)^fn\s+[A-Za-z_]\w*\s*\(\s*([A-Za-z_]\w*)\s*(?::[^)]*)?\)\s*(?:->\s*[A-Za-z0-9_]+\s*)?\{(.*)\}$",
    )
    .expect("valid fn definition regex")
});

/// Splits inline source into its list parameter and body expression.
pub(super) fn parse(text: &str) -> Result<ArgExpression, ResolveError> {
    let source = text.trim();
    let compile_error = |reason: &str| ResolveError::Compile {
        source_text: source.to_string(),
        reason: reason.to_string(),
    };

    let (param, body) = if let Some(caps) = CLOSURE.captures(source) {
        let body = caps.get(2).map_or("", |m| m.as_str()).trim();
        let body = match body.strip_prefix('{') {
            Some(inner) => inner
                .strip_suffix('}')
                .ok_or_else(|| compile_error("unbalanced braces in closure body"))?,
            None => body,
        };
        (caps[1].to_string(), body)
    } else if let Some(caps) = FN_DEFINITION.captures(source) {
        (caps[1].to_string(), caps.get(2).map_or("", |m| m.as_str()))
    } else {
        return Err(compile_error(
            "expected a closure `|args| ...` or a definition `fn name(args: &[f64]) -> f64 { ... }`",
        ));
    };

    let body = single_expression(body).map_err(|reason| compile_error(&reason))?;
    Ok(ArgExpression { param, body })
}

/// Reduces a body to its one expression, accepting an optional `return` and `;`.
fn single_expression(body: &str) -> Result<String, String> {
    let mut expression = body.trim();
    if let Some(rest) = expression.strip_prefix("return") {
        if rest.starts_with(|c: char| c.is_whitespace() || c == '(') {
            expression = rest.trim();
        }
    }
    let expression = expression.strip_suffix(';').unwrap_or(expression).trim();

    if expression.is_empty() {
        return Err("function body is empty".to_string());
    }
    if expression.contains(';') || expression.starts_with("let ") {
        return Err("function body must be a single expression".to_string());
    }
    if expression.contains(['{', '}']) {
        return Err("nested blocks are not supported".to_string());
    }
    Ok(expression.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(text: &str) -> (String, String) {
        let expression = parse(text).unwrap();
        (expression.param, expression.body)
    }

    #[test]
    fn test_closure() {
        assert_eq!(
            parsed("|args| args[0] * args[1]"),
            ("args".to_string(), "args[0] * args[1]".to_string())
        );
    }

    #[test]
    fn test_typed_closure_with_block() {
        assert_eq!(
            parsed("|x: &[f64]| { x[0] / x[1] }"),
            ("x".to_string(), "x[0] / x[1]".to_string())
        );
    }

    #[test]
    fn test_fn_definition() {
        let text = "fn bmi(args: &[f64]) -> f64 {\n    args[0] / (args[1] / 100) ^ 2\n}";
        assert_eq!(
            parsed(text),
            ("args".to_string(), "args[0] / (args[1] / 100) ^ 2".to_string())
        );
    }

    #[test]
    fn test_fn_definition_with_return() {
        let text = "fn f(v: &[f64]) -> f64 { return v[0] + v[1]; }";
        assert_eq!(parsed(text).1, "v[0] + v[1]");
    }

    #[test]
    fn test_multiple_statements_are_rejected() {
        let err = parse("fn f(v: &[f64]) -> f64 { let a = v[0]; a * 2 }").unwrap_err();
        assert!(matches!(err, ResolveError::Compile { .. }));
        assert!(parse("|v| { v[0]; v[1] }").is_err());
    }

    #[test]
    fn test_plain_expression_is_rejected() {
        assert!(matches!(
            parse("x * y"),
            Err(ResolveError::Compile { .. })
        ));
    }
}
