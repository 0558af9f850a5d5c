//! Configuration management
//!
//! The stack runs with built-in defaults; a TOML file overrides any subset.

mod types;
mod validation;

pub use types::*;
pub use validation::{validate, ValidationResult};

use crate::{Error, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load<P: AsRef<Path>>(path: P) -> Result<StackConfig> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    from_toml_str(&content)
}

/// Parse configuration from TOML text
pub fn from_toml_str(content: &str) -> Result<StackConfig> {
    toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
}
