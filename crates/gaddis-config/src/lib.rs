//! Gaddis Configuration System
//!
//! Provides configuration for the Gaddis VM, debugger and tooling:
//! - VM limits (instruction ceiling, call-stack depth, RNG seed)
//! - Debugger defaults (stop on entry, no-debug mode)
//! - Logging level
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Global config (`<config dir>/gaddis/config.toml`)
//! 3. Project config (`./gaddis.toml`, searched upward)
//! 4. Environment variables (`GADDIS_*`)
//! 5. CLI flags (applied by the caller)
//!
//! # Example
//!
//! ```no_run
//! use gaddis_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! assert!(config.settings.vm.max_stack_depth > 0);
//! ```

pub mod loader;
pub mod settings;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration directory not found")]
    ConfigDirNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use loader::{Config, ConfigLoader};
pub use settings::{
    ConfigFile, DebugConfig, GaddisConfig, LogConfig, VmConfig, DEFAULT_MAX_INSTRUCTIONS,
    DEFAULT_MAX_STACK_DEPTH,
};
