//! Settings for a table generation run.
//!
//! `GeneratorConfig` can be deserialized from JSON; every field is optional and falls
//! back to its default. Command-line flags are applied on top of a loaded file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::output::OverwritePolicy;

/// Default number of decimals in rendered numbers.
pub const DEFAULT_PRECISION: usize = 2;

/// How a resolved function is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalBackend {
    /// Cranelift-compiled code, falling back to the interpreter for flagged inputs
    #[default]
    Jit,
    /// Checked tree-walking interpreter only
    Interpreter,
}

/// Options of a [`crate::TableGenerator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Heading of every generated table.
    pub title: String,
    /// Markdown copied verbatim below the heading.
    pub notes: Option<String>,
    /// Decimals kept when rendering numbers.
    pub precision: usize,
    pub backend: EvalBackend,
    pub overwrite: OverwritePolicy,
    /// Render pages on the rayon thread pool.
    pub parallel: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            title: "Lookup table".to_string(),
            notes: None,
            precision: DEFAULT_PRECISION,
            backend: EvalBackend::default(),
            overwrite: OverwritePolicy::default(),
            parallel: true,
        }
    }
}

impl GeneratorConfig {
    /// Reads a JSON configuration file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
