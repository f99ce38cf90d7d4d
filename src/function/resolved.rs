//! The compiled, callable form of a table function.
//!
//! A `ResolvedFunction` owns the simplified expression tree and, with the JIT
//! backend, the Cranelift-compiled code for it. Evaluation takes the input tuple in
//! original range order.
//!
//! # Example
//!
//! ```
//! use lutgen::{EvalBackend, FunctionDescriptor};
//!
//! let descriptor = FunctionDescriptor::from_input("|args| args[0] * args[1]");
//! let function = descriptor.resolve(2, EvalBackend::Jit).unwrap();
//! assert_eq!(function.evaluate(&[2.0, 2.0]).unwrap(), 4.0);
//! assert!(function.evaluate(&[2.0]).is_err());
//! ```

use std::collections::HashMap;

use colored::Colorize;
use evalexpr::{build_operator_tree, DefaultNumericTypes};
use log::{debug, warn};

use super::{bind_positional, positional_name, ArgExpression};
use crate::builder::build_function;
use crate::config::EvalBackend;
use crate::convert::build_ast;
use crate::errors::{BuilderError, EvalError, FunctionRuntimeError, ResolveError};
use crate::expr::Expr;
use crate::types::JitFunction;

/// A table function bound to a fixed number of positional inputs.
///
/// Stateless and reentrant: `evaluate` may be called from several threads at once.
pub struct ResolvedFunction {
    expression: String,
    ast: Box<Expr>,
    arity: usize,
    jit: Option<JitFunction>,
}

impl std::fmt::Debug for ResolvedFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{{")?;
        writeln!(f, "    {}: {}", "Expression".cyan(), self.expression)?;
        writeln!(f, "    {}: {}", "Simplified".cyan(), self.ast)?;
        writeln!(f, "    {}: {}", "Arity".cyan(), self.arity)?;
        writeln!(f, "    {}: {:?}", "Backend".cyan(), self.backend())?;
        writeln!(f, "}}")
    }
}

impl std::fmt::Display for ResolvedFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "f({}) = {}", self.input_names().join(", "), self.ast)
    }
}

impl ResolvedFunction {
    /// Binds, converts and compiles an extracted expression.
    ///
    /// If Cranelift does not support the host, the function silently degrades to the
    /// interpreter (with a warning); any other compilation failure is an error.
    pub(crate) fn compile(
        expression: &ArgExpression,
        arity: usize,
        backend: EvalBackend,
    ) -> Result<Self, ResolveError> {
        let compile_error = |reason: String| ResolveError::Compile {
            source_text: expression.body.clone(),
            reason,
        };

        let bound = bind_positional(expression, arity).map_err(compile_error)?;
        let node = build_operator_tree::<DefaultNumericTypes>(&bound)
            .map_err(|e| compile_error(e.to_string()))?;

        let var_map: HashMap<String, u32> = (0..arity as u32)
            .map(|i| (positional_name(i as usize), i))
            .collect();
        let ast = build_ast(&node, &var_map)
            .map_err(|e| compile_error(e.to_string()))?
            .simplify();
        debug!("compiled `{}` into {}", expression.body, ast);

        let jit = match backend {
            EvalBackend::Interpreter => None,
            EvalBackend::Jit => match build_function(&ast, arity) {
                Ok(fun) => Some(fun),
                Err(BuilderError::HostMachineNotSupported(reason)) => {
                    warn!("JIT unavailable ({reason}), evaluating with the interpreter");
                    None
                }
                Err(e) => return Err(compile_error(e.to_string())),
            },
        };

        Ok(Self {
            expression: expression.body.clone(),
            ast,
            arity,
            jit,
        })
    }

    /// Evaluates the function for one input tuple.
    ///
    /// # Errors
    /// Returns a `FunctionRuntimeError` carrying `inputs` if the tuple has the wrong
    /// length or the evaluation hits a division by zero or a domain error.
    pub fn evaluate(&self, inputs: &[f64]) -> Result<f64, FunctionRuntimeError> {
        let fail = |cause: EvalError| FunctionRuntimeError {
            inputs: inputs.to_vec(),
            cause,
        };

        if inputs.len() != self.arity {
            return Err(fail(EvalError::InvalidInputLength {
                expected: self.arity,
                got: inputs.len(),
            }));
        }

        if let Some(jit) = &self.jit {
            let outcome = jit(inputs);
            if !outcome.faulted {
                return Ok(outcome.value);
            }
        }
        self.ast.eval(inputs).map_err(fail)
    }

    /// Number of positional inputs.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// The extracted expression as written, before binding.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The bound, simplified expression tree.
    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    /// The backend actually used, after any fallback.
    pub fn backend(&self) -> EvalBackend {
        if self.jit.is_some() {
            EvalBackend::Jit
        } else {
            EvalBackend::Interpreter
        }
    }

    fn input_names(&self) -> Vec<String> {
        (0..self.arity).map(positional_name).collect()
    }
}
