//! Single-expression functions from Dart-style source files.
//!
//! The file must define exactly one function of the shape
//!
//! ```text
//! double calculate(List<double> input) {
//!   return input[0] * 2.5 + input[1] - input[2] * 0.3;
//! }
//! ```
//!
//! or its arrow form `double calculate(List<double> input) => ...;`. Comments and
//! `import` directives are ignored and `math.` prefixes are dropped. Everything else is
//! rejected with the line it was found on; the extraction never guesses.

use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use super::ArgExpression;
use crate::errors::ResolveError;

static SIGNATURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:num|double|int)\s+[A-Za-z_]\w*\s*\(([^)]*)\)\s*(\{|=>)")
        .expect("valid signature regex")
});

static LIST_PARAMETER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:final\s+)?List\s*<\s*(?:num|double|int)\s*>\s+([A-Za-z_]\w*)$")
        .expect("valid parameter regex")
});

static IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*import\s[^;]*;").expect("valid import regex"));

static FORBIDDEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(if|else|for|while|do|switch|case|break|continue|try|catch|throw|var|final|const|late)\b|\?",
    )
    .expect("valid keyword regex")
});

static MATH_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bmath\s*\.\s*").expect("valid prefix regex"));

/// Reads `path` and extracts its return expression.
pub(super) fn parse_file(path: &Path) -> Result<ArgExpression, ResolveError> {
    let source = fs::read_to_string(path).map_err(|source| ResolveError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_source(&source).map_err(|(line, reason)| ResolveError::UnsupportedPattern {
        path: path.to_path_buf(),
        line,
        reason,
    })
}

/// Extracts the function from file contents; errors carry a 1-based line number.
fn parse_source(source: &str) -> Result<ArgExpression, (usize, String)> {
    // blanking keeps byte offsets, so line numbers stay those of the file
    let code = blank_imports(&blank_comments(source));

    let mut signatures = SIGNATURE.captures_iter(&code);
    let Some(signature) = signatures.next() else {
        return Err((
            1,
            "no function of the form `double name(List<double> input)` found".to_string(),
        ));
    };
    if let Some(second) = signatures.next() {
        let offset = second.get(0).map_or(0, |m| m.start());
        return Err((
            line_at(&code, offset),
            "more than one function is defined".to_string(),
        ));
    }

    let (Some(whole), Some(params), Some(opener)) =
        (signature.get(0), signature.get(1), signature.get(2))
    else {
        return Err((1, "malformed function signature".to_string()));
    };
    let signature_line = line_at(&code, whole.start());

    let param = LIST_PARAMETER
        .captures(params.as_str().trim())
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| {
            (
                signature_line,
                format!(
                    "expected a single `List<double>` parameter, found `{}`",
                    params.as_str().trim()
                ),
            )
        })?;

    let (body_start, body_end, end) = if opener.as_str() == "{" {
        block_body(&code, opener.end())?
    } else {
        arrow_body(&code, opener.end())?
    };

    if let Some(stray) = first_code(&code, 0, whole.start())
        .or_else(|| first_code(&code, end, code.len()))
    {
        return Err((
            line_at(&code, stray),
            "unexpected code outside the function".to_string(),
        ));
    }

    if let Some(found) = FORBIDDEN.find(&code[body_start..body_end]) {
        return Err((
            line_at(&code, body_start + found.start()),
            format!(
                "`{}` is not supported, the body must be a single return expression",
                found.as_str()
            ),
        ));
    }

    let expression = if opener.as_str() == "{" {
        return_expression(&code, body_start, body_end)?
    } else {
        code[body_start..body_end].trim().to_string()
    };
    if expression.is_empty() {
        return Err((signature_line, "the function returns nothing".to_string()));
    }

    Ok(ArgExpression {
        param,
        body: MATH_PREFIX.replace_all(&expression, "").into_owned(),
    })
}

/// Locates a `{ ... }` body starting right after the brace at `open`.
///
/// Returns the body span and the offset just past the closing brace.
fn block_body(code: &str, open: usize) -> Result<(usize, usize, usize), (usize, String)> {
    for (i, c) in code[open..].char_indices() {
        match c {
            '{' => {
                return Err((
                    line_at(code, open + i),
                    "nested blocks are not supported".to_string(),
                ))
            }
            '}' => return Ok((open, open + i, open + i + 1)),
            _ => {}
        }
    }
    Err((
        line_at(code, open),
        "function body is not closed".to_string(),
    ))
}

/// Locates the expression of `=> expr;` starting right after the arrow.
fn arrow_body(code: &str, start: usize) -> Result<(usize, usize, usize), (usize, String)> {
    match code[start..].find(';') {
        Some(i) => Ok((start, start + i, start + i + 1)),
        None => Err((
            line_at(code, start),
            "arrow function is not terminated by `;`".to_string(),
        )),
    }
}

/// Requires a block body to be exactly `return <expr>;`.
fn return_expression(code: &str, start: usize, end: usize) -> Result<String, (usize, String)> {
    // (offset of the first non-blank character, trimmed statement)
    let statements: Vec<(usize, &str)> = code[start..end]
        .split_inclusive(';')
        .scan(start, |offset, piece| {
            let at = *offset + piece.len() - piece.trim_start().len();
            *offset += piece.len();
            Some((at, piece.trim()))
        })
        .filter(|(_, statement)| !statement.is_empty())
        .collect();

    match statements.as_slice() {
        [] => Err((line_at(code, start), "function body is empty".to_string())),
        [(at, statement)] => {
            let Some(terminated) = statement.strip_suffix(';') else {
                return Err((
                    line_at(code, *at),
                    "statement is not terminated by `;`".to_string(),
                ));
            };
            match terminated.strip_prefix("return") {
                Some(rest) if rest.starts_with(|c: char| c.is_whitespace() || c == '(') => {
                    Ok(rest.trim().to_string())
                }
                _ => Err((line_at(code, *at), "missing `return` statement".to_string())),
            }
        }
        [_, (at, _), ..] => Err((
            line_at(code, *at),
            format!(
                "expected a single return statement, found {} statements",
                statements.len()
            ),
        )),
    }
}

/// Replaces `//` and `/* */` comments with spaces, keeping newlines and byte offsets.
fn blank_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match (c, chars.peek().copied()) {
            ('\'' | '"', _) => {
                quote = Some(c);
                out.push(c);
            }
            ('/', Some('/')) => {
                out.push(' ');
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    blank(&mut out, next);
                    chars.next();
                }
            }
            ('/', Some('*')) => {
                out.push(' ');
                if let Some(star) = chars.next() {
                    blank(&mut out, star);
                }
                let mut previous = ' ';
                for next in chars.by_ref() {
                    blank(&mut out, next);
                    if previous == '*' && next == '/' {
                        break;
                    }
                    previous = next;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn blank_imports(code: &str) -> String {
    IMPORT
        .replace_all(code, |caps: &regex::Captures| {
            let mut blanked = String::with_capacity(caps[0].len());
            caps[0].chars().for_each(|c| blank(&mut blanked, c));
            blanked
        })
        .into_owned()
}

fn blank(out: &mut String, c: char) {
    if c == '\n' {
        out.push('\n');
    } else {
        out.extend(std::iter::repeat_n(' ', c.len_utf8()));
    }
}

/// Offset of the first non-whitespace character in `code[from..to]`.
fn first_code(code: &str, from: usize, to: usize) -> Option<usize> {
    code[from..to]
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(i, _)| from + i)
}

fn line_at(code: &str, offset: usize) -> usize {
    code[..offset].matches('\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const LINEAR: &str = "\
import 'dart:math' as math;

// Weighted sum used in the calibration sheet.
double calculate(List<double> input) {
  /* weights from the 2021 fit */
  return input[0] * 2.5 + input[1] - input[2] * 0.3;
}
";

    #[test]
    fn test_block_function() {
        let expression = parse_source(LINEAR).unwrap();
        assert_eq!(expression.param, "input");
        assert_eq!(expression.body, "input[0] * 2.5 + input[1] - input[2] * 0.3");
    }

    #[test]
    fn test_demo_file() {
        let expression = parse_source(include_str!("../../demos/calibration.dart")).unwrap();
        assert_eq!(expression.body, "input[0] * 2.5 + input[1] - input[2] * 0.3");
    }

    #[test]
    fn test_arrow_function_and_math_prefix() {
        let source = "num f(List<num> x) => math.sqrt(x[0]) + math.pow(x[1], 2);\n";
        let expression = parse_source(source).unwrap();
        assert_eq!(expression.param, "x");
        assert_eq!(expression.body, "sqrt(x[0]) + pow(x[1], 2)");
    }

    #[test]
    fn test_comment_opening_does_not_close_it() {
        let source = "/*/ return x[1]; */\ndouble f(List<double> x) => x[0];\n";
        assert_eq!(parse_source(source).unwrap().body, "x[0]");
    }

    #[test]
    fn test_control_flow_is_rejected() {
        let source = "double f(List<double> input) {\n  if (input[0] > 1) return 1;\n  return input[1];\n}\n";
        let (line, reason) = parse_source(source).unwrap_err();
        assert_eq!(line, 2);
        assert!(reason.contains("`if`"), "{reason}");
    }

    #[test]
    fn test_several_statements_are_rejected() {
        let source = "double f(List<double> input) {\n  input[0];\n  return input[1];\n}\n";
        let (line, reason) = parse_source(source).unwrap_err();
        assert_eq!(line, 3);
        assert!(reason.contains("single return"), "{reason}");
    }

    #[test]
    fn test_missing_return() {
        let source = "double f(List<double> input) {\n  input[0] * 2;\n}\n";
        let (line, reason) = parse_source(source).unwrap_err();
        assert_eq!(line, 2);
        assert!(reason.contains("return"), "{reason}");
    }

    #[test]
    fn test_signature_shapes() {
        assert!(parse_source("void main() {}\n").is_err());
        let (line, _) =
            parse_source("\n\ndouble f(double a, double b) {\n  return a;\n}\n").unwrap_err();
        assert_eq!(line, 3);
        // a second function is reported where it starts
        let source = "double f(List<double> x) => x[0];\ndouble g(List<double> x) => x[1];\n";
        assert_eq!(parse_source(source).unwrap_err().0, 2);
    }

    #[test]
    fn test_code_outside_function() {
        let source = "double f(List<double> x) => x[0];\nvoid main() { print(f([1.0])); }\n";
        let (line, reason) = parse_source(source).unwrap_err();
        assert_eq!(line, 2);
        assert!(reason.contains("outside"), "{reason}");
    }

    #[test]
    fn test_nested_block() {
        let source = "double f(List<double> x) {\n  return x[0];\n  {\n  }\n}\n";
        let (line, _) = parse_source(source).unwrap_err();
        assert_eq!(line, 3);
    }

    #[test]
    fn test_parse_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "double f(List<double> x) {{ while (true) {{}} }}").unwrap();
        match parse_file(file.path()) {
            Err(ResolveError::UnsupportedPattern { path, line, .. }) => {
                assert_eq!(path, file.path());
                assert_eq!(line, 1);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            parse_file(Path::new("/nonexistent/function.dart")),
            Err(ResolveError::Read { .. })
        ));
    }
}
