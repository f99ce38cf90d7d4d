//! Markdown lookup tables from functions of two or three inputs.
//!
//! This crate evaluates a user-supplied function over every point of a discretized
//! input grid and writes the results as pipe-delimited markdown tables. Functions are
//! parsed with [evalexpr](https://github.com/ISibboI/evalexpr), restricted to plain
//! arithmetic and a few pure functions, and JIT-compiled with
//! [Cranelift](https://github.com/bytecodealliance/wasmtime/tree/main/cranelift).
//!
//! # Features
//!
//! - Inline closures / `fn` definitions, or single-expression functions from Dart-style files
//! - Ranges written `name:start:stop:step[:unit]`
//! - One table for two inputs, one table per outer value for three inputs
//! - Per-cell error markers instead of aborted runs
//! - Byte-identical output for identical inputs
//!
//! # Example
//!
//! ```rust
//! use lutgen::{GeneratorConfig, OutputWriter, OverwritePolicy, TableGenerator};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let writer = OutputWriter::new(dir.path(), OverwritePolicy::FailIfExists);
//! let generator = TableGenerator::new(GeneratorConfig {
//!     title: "Product".to_string(),
//!     ..GeneratorConfig::default()
//! });
//!
//! let report = generator
//!     .run("|args| args[0] * args[1]", &["x:1:3:1", "y:1:2:1"], &writer)
//!     .unwrap();
//! assert_eq!(report.written, vec![dir.path().join("x2y.md")]);
//! ```

pub use config::{EvalBackend, GeneratorConfig};
pub use function::{FunctionDescriptor, ResolvedFunction};
pub use generator::{GenerationReport, TableGenerator};
pub use grid::{enumerate_pages, FixedAxis, GridPage};
pub use output::{OutputWriter, OverwritePolicy};
pub use range::RangeSpec;
pub use render::{Cell, NumberFormat, TableDocument};

pub mod prelude {
    pub use crate::builder::build_function;
    pub use crate::convert::build_ast;
    pub use crate::expr::Expr;
    pub use crate::function::{FunctionDescriptor, ResolvedFunction};
    pub use crate::generator::TableGenerator;
    pub use crate::range::RangeSpec;
}

/// JIT compilation functionality using Cranelift
pub mod builder;
/// Generator settings
pub mod config;
/// Conversion from parsed expressions to internal AST
pub mod convert;
/// Error types for the various failure modes
pub mod errors;
/// Expression tree representation, evaluation and code generation
pub mod expr;
/// Function descriptors and resolved functions
pub mod function;
/// Run orchestration
pub mod generator;
/// Grid pages
pub mod grid;
/// Runtime functions callable from compiled code
pub(crate) mod libcall;
/// Writing table files
pub mod output;
/// Range descriptors
pub mod range;
/// Markdown rendering
pub mod render;
/// Type aliases for compiled functions
pub mod types;
