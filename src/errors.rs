//! Error types for the lutgen crate.
//!
//! This module defines the error types for every stage of a table run:
//!
//! - `RangeError`: a range descriptor could not be parsed
//! - `ConvertError`: an evalexpr tree could not be mapped onto our expression tree
//! - `BuilderError`: JIT compilation with Cranelift failed
//! - `ResolveError`: a function descriptor could not be turned into a callable
//! - `EvalError` / `FunctionRuntimeError`: a single evaluation failed (non-fatal, per cell)
//! - `OutputError`: a table file could not be written
//! - `ConfigError`: a configuration file could not be loaded
//! - `GenerateError`: the umbrella error returned by the generator
//!
//! Parsing and resolution errors are fatal and are raised before any file is written.
//! Runtime errors are recovered per cell and output errors per page.

use std::path::PathBuf;

use cranelift_codegen::CodegenError;
use cranelift_module::ModuleError;
use itertools::Itertools;
use thiserror::Error;

/// Errors raised while parsing a `name:start:stop:step[:unit]` descriptor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RangeError {
    /// Wrong field count, a bad name or a numeric field that is not a finite number
    #[error("malformed range '{spec}': {reason}")]
    Malformed { spec: String, reason: String },
    /// The step is zero
    #[error("invalid step in range '{spec}': step must not be zero")]
    InvalidStep { spec: String },
}

/// Errors that can occur during conversion from evalexpr AST to our internal AST representation.
///
/// Any of these means the expression uses something outside the arithmetic subset
/// that tables are allowed to evaluate.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// Error when encountering an operator that is not supported by our implementation
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),
    /// Error when encountering a function that is not supported by our implementation
    #[error("unsupported function: {0}")]
    UnsupportedFunction(String),
    /// Error when a function is called with the wrong number of arguments
    #[error("function {name} expects {expected} argument(s), got {got}")]
    FunctionArity {
        name: String,
        expected: String,
        got: usize,
    },
    /// Error when the root node does not have exactly one child
    #[error("expected a single expression, got {0} top-level nodes")]
    RootNode(usize),
    /// Error when a constant value is not a number
    #[error("expected numeric constant: {0}")]
    ConstOperator(String),
    /// Error when a variable is not found in the variable map
    #[error("unknown identifier: {0}")]
    VariableNotFound(String),
}

/// Errors that can occur during JIT compilation of expressions.
#[derive(Error, Debug)]
pub enum BuilderError {
    /// Error when the target machine architecture is not supported
    #[error("host machine is not supported: {0}")]
    HostMachineNotSupported(String),
    /// Error when a Cranelift setting is rejected
    #[error("invalid compiler setting: {0}")]
    Settings(String),
    /// Error during Cranelift code generation
    #[error("codegen error: {0}")]
    CodegenError(CodegenError),
    /// Error in the Cranelift JIT module
    #[error("module error: {0}")]
    ModuleError(ModuleError),
    /// Error when defining the JIT function
    #[error("function error: {0}")]
    FunctionError(String),
    /// Error when declaring the JIT function or one of its imports
    #[error("declaration error: {0}")]
    DeclarationError(String),
}

/// Errors raised while turning a function descriptor into a `ResolvedFunction`.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The text does not parse as a supported function or expression
    #[error("cannot compile function '{source_text}': {reason}")]
    Compile { source_text: String, reason: String },
    /// A foreign source file does not contain a single-return-expression function
    #[error("unsupported function pattern in {}:{line}: {reason}", .path.display())]
    UnsupportedPattern {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    /// The foreign source file could not be read
    #[error("cannot read function file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a single evaluation failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    /// A divisor evaluated to zero
    #[error("division by zero")]
    DivisionByZero,
    /// A function was applied outside of its domain
    #[error("{function}({argument}) is undefined")]
    Domain {
        function: &'static str,
        argument: f64,
    },
    /// Error when the input length is not the same as the number of inputs
    #[error("invalid input length: expected {expected}, got {got}")]
    InvalidInputLength { expected: usize, got: usize },
}

/// A failed evaluation for one specific input tuple.
///
/// Runtime errors never abort a table: the cell is marked and the error is counted.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("evaluation failed for inputs ({}): {cause}", .inputs.iter().join(", "))]
pub struct FunctionRuntimeError {
    pub inputs: Vec<f64>,
    #[source]
    pub cause: EvalError,
}

/// Errors raised while writing table files.
#[derive(Error, Debug)]
pub enum OutputError {
    /// The target directory or file is not writable
    #[error("cannot write {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The file exists and the overwrite policy forbids replacing it
    #[error("refusing to overwrite existing file {}", .path.display())]
    AlreadyExists { path: PathBuf },
    /// Two pages render to the same file name at the configured precision
    #[error("several pages would be written to {}, increase the precision", .path.display())]
    NameCollision { path: PathBuf },
}

/// Errors raised while loading a `GeneratorConfig` from disk.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors returned by a table generation run.
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Output(#[from] OutputError),
    /// Only two or three input ranges are supported
    #[error("expected 2 or 3 input ranges, got {0}")]
    UnsupportedDimensions(usize),
    /// The function was resolved for a different number of inputs than there are ranges
    #[error("function takes {function} inputs but {ranges} ranges were given")]
    ArityMismatch { function: usize, ranges: usize },
}
