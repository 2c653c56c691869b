//! Resolved settings and the on-disk `gaddis.toml` / `config.toml` format.
//!
//! [`ConfigFile`] mirrors the TOML layout with every field optional so that
//! several files can be layered; [`GaddisConfig`] is the fully resolved result.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Instruction ceiling used as an infinite-loop guard.
pub const DEFAULT_MAX_INSTRUCTIONS: u64 = 1 << 30;

/// Maximum number of live call frames.
pub const DEFAULT_MAX_STACK_DEPTH: usize = 1024;

const LOG_LEVELS: &[&str] = &["off", "error", "warn", "info", "debug", "trace"];

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GaddisConfig {
    pub vm: VmConfig,
    pub debug: DebugConfig,
    pub log: LogConfig,
}

/// Execution limits for the virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    /// Instructions executed per run before the VM panics
    pub max_instructions: u64,
    /// Call-stack depth at which a call becomes a stack overflow
    pub max_stack_depth: usize,
    /// Fixed RNG seed; `None` seeds from OS entropy
    pub seed: Option<u64>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_instructions: DEFAULT_MAX_INSTRUCTIONS,
            max_stack_depth: DEFAULT_MAX_STACK_DEPTH,
            seed: None,
        }
    }
}

/// Debug session defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugConfig {
    pub stop_on_entry: bool,
    pub no_debug: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `tracing` filter directive used when `GADDIS_LOG` is unset
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// One configuration file, every key optional.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vm: Option<VmSection>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugSection>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<LogSection>,
}

/// `[vm]` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct VmSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_instructions: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_stack_depth: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// `[debug]` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct DebugSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_on_entry: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_debug: Option<bool>,
}

/// `[log]` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LogSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl ConfigFile {
    /// Load and validate a configuration file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let file: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        file.validate()?;
        Ok(file)
    }

    /// Validate the values present in this file
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(vm) = &self.vm {
            if vm.max_instructions == Some(0) {
                return Err(invalid("vm.max_instructions", "must be greater than zero"));
            }
            if vm.max_stack_depth == Some(0) {
                return Err(invalid("vm.max_stack_depth", "must be greater than zero"));
            }
        }
        if let Some(level) = self.log.as_ref().and_then(|l| l.level.as_deref()) {
            validate_log_level("log.level", level)?;
        }
        Ok(())
    }
}

impl GaddisConfig {
    /// Overlay the keys present in `file` onto this configuration
    pub fn apply(&mut self, file: &ConfigFile) {
        if let Some(vm) = &file.vm {
            if let Some(n) = vm.max_instructions {
                self.vm.max_instructions = n;
            }
            if let Some(n) = vm.max_stack_depth {
                self.vm.max_stack_depth = n;
            }
            if vm.seed.is_some() {
                self.vm.seed = vm.seed;
            }
        }
        if let Some(debug) = &file.debug {
            if let Some(b) = debug.stop_on_entry {
                self.debug.stop_on_entry = b;
            }
            if let Some(b) = debug.no_debug {
                self.debug.no_debug = b;
            }
        }
        if let Some(level) = file.log.as_ref().and_then(|l| l.level.clone()) {
            self.log.level = level;
        }
    }

    /// Check cross-field constraints after all layers are applied
    pub fn validate(&self) -> ConfigResult<()> {
        if self.vm.max_instructions == 0 {
            return Err(invalid("vm.max_instructions", "must be greater than zero"));
        }
        if self.vm.max_stack_depth == 0 {
            return Err(invalid("vm.max_stack_depth", "must be greater than zero"));
        }
        validate_log_level("log.level", &self.log.level)
    }
}

pub(crate) fn validate_log_level(field: &str, value: &str) -> ConfigResult<()> {
    if !LOG_LEVELS.contains(&value) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("must be one of {}, got '{}'", LOG_LEVELS.join(", "), value),
        });
    }
    Ok(())
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
