//! Configuration validation
//!
//! Validates configuration and reports issues.

use super::types::Config;

/// Below this the engine's own recursion limit can outrun the native stack.
const MIN_RECOMMENDED_STACK: usize = 1024 * 1024;

/// Result of configuration validation
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    /// Whether the config is valid
    pub valid: bool,
    /// Validation errors (critical)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (non-critical)
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }
}

/// A validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the config field
    pub path: String,
    /// Issue message
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create a new issue
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    result = validate_sandbox_config(config, result);
    result = validate_logging_config(config, result);

    result
}

fn validate_sandbox_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    let sandbox = &config.sandbox;

    if sandbox.default_timeout.is_zero() {
        result = result.with_error(
            ValidationIssue::new("sandbox.default_timeout", "Timeout must be greater than zero")
                .with_suggestion("Use a value such as \"30s\""),
        );
    }

    if sandbox.worker_stack_size == 0 {
        result = result.with_error(ValidationIssue::new(
            "sandbox.worker_stack_size",
            "Worker stack size must be greater than zero",
        ));
    } else if sandbox.worker_stack_size < MIN_RECOMMENDED_STACK {
        result = result.with_warning(
            ValidationIssue::new(
                "sandbox.worker_stack_size",
                "Small worker stacks may overflow on deeply recursive scripts",
            )
            .with_suggestion("Use at least 1MB"),
        );
    }

    if sandbox.artifact_path.is_dir() {
        result = result.with_error(ValidationIssue::new(
            "sandbox.artifact_path",
            format!("{} is a directory", sandbox.artifact_path.display()),
        ));
    }

    if sandbox.loop_iteration_limit == Some(0) {
        result = result.with_error(
            ValidationIssue::new(
                "sandbox.loop_iteration_limit",
                "A zero loop limit rejects every loop",
            )
            .with_suggestion("Leave unset to disable the limit"),
        );
    }

    if sandbox.max_output_lines == Some(0) {
        result = result.with_warning(ValidationIssue::new(
            "sandbox.max_output_lines",
            "All console output will be dropped",
        ));
    }

    result
}

fn validate_logging_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.logging.filter.trim().is_empty() {
        result = result.with_warning(
            ValidationIssue::new("logging.filter", "Empty log filter")
                .with_suggestion("Use \"jsbox=info\""),
        );
    }

    result
}
