//! Configuration module - Modular configuration management
//!
//! - types/mod.rs: Core configuration types (Config, LoggingConfig)
//! - types/sandbox.rs: Sandbox/execution configuration
//! - io.rs: Configuration loading and environment overrides
//! - validation.rs: Configuration validation
//! - paths.rs: Configuration file paths

mod io;
mod paths;
mod types;
mod validation;

// Re-export core config types
pub use types::{Config, LogFormat, LoggingConfig};

// Re-export sandbox types
pub use types::sandbox::SandboxConfig;

// Re-export IO and utilities
pub use io::{
    apply_env_overrides, apply_overrides_from, load_config, load_config_from_path,
    load_config_with, parse_timeout,
};
pub use paths::{config_dir, config_path};
pub use validation::{validate_config, ConfigValidationResult, ValidationIssue};
