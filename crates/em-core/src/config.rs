use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn env_true(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|val| {
        let trimmed = val.trim();
        !trimmed.is_empty() && !matches!(trimmed, "0" | "false" | "FALSE" | "False")
    })
}

fn bool_from_env(key: &str) -> bool {
    env_true(key).unwrap_or(false)
}

/// `EMBER_DISABLE_WARNINGS` silences every non-fatal diagnostic.
pub fn warnings_disabled_by_env() -> bool {
    static DISABLED: OnceLock<bool> = OnceLock::new();
    *DISABLED.get_or_init(|| bool_from_env("EMBER_DISABLE_WARNINGS"))
}

/// Per-unit compilation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Width of a pointer on the target.
    pub pointer_bits: u64,
    /// Nested generic instantiations deeper than this abort the unit.
    pub max_instantiation_depth: usize,
    /// Namespace and block nesting limit.
    pub max_nesting_depth: usize,
    /// Report locals that are declared but never used.
    pub warn_unused: bool,
    pub disable_warnings: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            pointer_bits: 64,
            max_instantiation_depth: 64,
            max_nesting_depth: 256,
            warn_unused: true,
            disable_warnings: false,
        }
    }
}

impl CompileOptions {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let options: CompileOptions = toml::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Applies environment overrides on top of the loaded values.
    pub fn with_env_overrides(mut self) -> Self {
        if warnings_disabled_by_env() {
            self.disable_warnings = true;
        }
        self
    }

    pub fn warnings_enabled(&self) -> bool {
        !self.disable_warnings
    }

    fn validate(&self) -> Result<()> {
        if !matches!(self.pointer_bits, 16 | 32 | 64) {
            return Err(Error::Config(format!(
                "unsupported pointer width {}",
                self.pointer_bits
            )));
        }
        if self.max_instantiation_depth == 0 || self.max_nesting_depth == 0 {
            return Err(Error::Config("depth limits must be positive".into()));
        }
        Ok(())
    }
}
