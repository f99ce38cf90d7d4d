//! Function descriptors and their resolution into callables.
//!
//! A table function arrives in one of two shapes:
//!
//! - [`FunctionDescriptor::NativeExpression`]: inline text, either a closure
//!   `|args| args[0] * args[1]` or a definition `fn f(args: &[f64]) -> f64 { ... }`
//! - [`FunctionDescriptor::ForeignFileExpression`]: a path to a Dart-style source file
//!   holding one function whose body is a single `return` expression
//!
//! Both are reduced to an [`ArgExpression`] (a list parameter name plus an expression
//! over `param[i]`), bound positionally and compiled into the same [`ResolvedFunction`].
//! Callers never branch on where a function came from.

mod foreign;
mod native;
mod resolved;

use std::path::{Path, PathBuf};

use log::debug;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::config::EvalBackend;
use crate::errors::ResolveError;

pub use resolved::ResolvedFunction;

/// Where a table function comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionDescriptor {
    /// Inline closure or `fn` definition
    NativeExpression(String),
    /// Source file with a single-expression function
    ForeignFileExpression(PathBuf),
}

impl FunctionDescriptor {
    /// Picks the variant from user input: text naming an existing file is a foreign
    /// source file, anything else is inline source.
    pub fn from_input(input: &str) -> Self {
        let trimmed = input.trim();
        let path = Path::new(trimmed);
        if !trimmed.is_empty() && path.is_file() {
            FunctionDescriptor::ForeignFileExpression(path.to_path_buf())
        } else {
            FunctionDescriptor::NativeExpression(input.to_string())
        }
    }

    /// Parses the descriptor and compiles it for `arity` positional inputs.
    ///
    /// # Errors
    /// - `ResolveError::Compile` if the text is not a supported function or expression
    /// - `ResolveError::UnsupportedPattern` if a foreign file deviates from the
    ///   single-return-expression shape
    /// - `ResolveError::Read` if a foreign file cannot be read
    pub fn resolve(
        &self,
        arity: usize,
        backend: EvalBackend,
    ) -> Result<ResolvedFunction, ResolveError> {
        let expression = match self {
            FunctionDescriptor::NativeExpression(text) => native::parse(text)?,
            FunctionDescriptor::ForeignFileExpression(path) => foreign::parse_file(path)?,
        };
        debug!(
            "resolved {} to `{}` over list parameter `{}`",
            self, expression.body, expression.param
        );
        ResolvedFunction::compile(&expression, arity, backend)
    }
}

impl std::fmt::Display for FunctionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionDescriptor::NativeExpression(text) => {
                write!(f, "inline function `{}`", text.trim())
            }
            FunctionDescriptor::ForeignFileExpression(path) => {
                write!(f, "function file {}", path.display())
            }
        }
    }
}

/// A single expression over indexed accesses of one list parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ArgExpression {
    /// Name of the list parameter, e.g. `args` or `input`
    pub param: String,
    /// Expression text, still using `param[i]`
    pub body: String,
}

static POSITIONAL_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\barg_\d+\b").expect("valid positional name regex"));

/// Name the `index`-th input is bound to inside the compiled expression.
pub(crate) fn positional_name(index: usize) -> String {
    format!("arg_{index}")
}

/// Rewrites every `param[i]` into the positional input name `arg_i`.
///
/// Indices must be integer literals below `arity`. Any bracket left over after the
/// rewrite (indexing something else, a nested index) makes the expression invalid, and
/// so does a body that already spells a positional name itself.
pub(crate) fn bind_positional(expression: &ArgExpression, arity: usize) -> Result<String, String> {
    if let Some(name) = POSITIONAL_NAME.find(&expression.body) {
        return Err(format!(
            "`{}` is not an input; use `{}[<index>]`",
            name.as_str(),
            expression.param
        ));
    }

    let pattern = format!(
        r"\b{}\s*\[\s*([^\[\]]*?)\s*\]",
        regex::escape(&expression.param)
    );
    let access = Regex::new(&pattern).map_err(|e| e.to_string())?;

    let mut failure = None;
    let bound = access.replace_all(&expression.body, |caps: &Captures| {
        let index = &caps[1];
        match index.parse::<usize>() {
            Ok(i) if i < arity => positional_name(i),
            Ok(i) => {
                failure.get_or_insert_with(|| {
                    format!(
                        "{}[{i}] is out of range for {arity} inputs",
                        expression.param
                    )
                });
                String::new()
            }
            Err(_) => {
                failure.get_or_insert_with(|| {
                    format!(
                        "index `{index}` of {} must be an integer literal",
                        expression.param
                    )
                });
                String::new()
            }
        }
    });

    if let Some(reason) = failure {
        return Err(reason);
    }
    if bound.contains(['[', ']']) {
        return Err(format!("only `{}[<index>]` may be indexed", expression.param));
    }
    Ok(bound.into_owned())
}
