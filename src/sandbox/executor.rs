//! Common executor trait and types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Request to execute a script
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    source_text: String,
    timeout: Duration,
}

impl ExecutionRequest {
    /// Create a new execution request. The timeout must be non-zero.
    pub fn new(source_text: impl Into<String>, timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(Error::InvalidInput(
                "execution timeout must be greater than zero".to_string(),
            ));
        }
        Ok(ExecutionRequest {
            source_text: source_text.into(),
            timeout,
        })
    }

    /// Script text
    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    /// Wall-clock budget
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wall-clock budget in milliseconds
    pub fn timeout_millis(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    pub(crate) fn into_source(self) -> String {
        self.source_text
    }
}

/// Classification of a failed run.
///
/// Serialized as the bare name, e.g. `"Timeout"` or `"TypeError"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorKind {
    /// The source text could not be read
    IoError,
    /// The deadline elapsed before the run finished
    Timeout,
    /// A chart was found but could not be rendered or decoded
    VisualizationError,
    /// A fault raised by the script, named the way the engine names it
    /// (`SyntaxError`, `TypeError`, user-defined error names, ...)
    Script(String),
}

impl ErrorKind {
    /// Name used for thrown values that carry no error name
    pub const RUNTIME_ERROR: &'static str = "RuntimeError";

    /// Wire name of this kind
    pub fn as_str(&self) -> &str {
        match self {
            ErrorKind::IoError => "IOError",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::VisualizationError => "VisualizationError",
            ErrorKind::Script(name) => name,
        }
    }
}

impl From<String> for ErrorKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "IOError" => ErrorKind::IoError,
            "Timeout" => ErrorKind::Timeout,
            "VisualizationError" => ErrorKind::VisualizationError,
            _ => ErrorKind::Script(name),
        }
    }
}

impl From<ErrorKind> for String {
    fn from(kind: ErrorKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured description of the single failure of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Classification
    #[serde(rename = "name")]
    pub kind: ErrorKind,
    /// Human-readable message, forwarded verbatim from script faults
    pub message: String,
    /// Stack trace, when the fault carried one
    #[serde(rename = "stack", default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

impl ErrorRecord {
    /// The source text could not be read
    pub fn io(message: impl Into<String>) -> Self {
        ErrorRecord {
            kind: ErrorKind::IoError,
            message: message.into(),
            trace: None,
        }
    }

    /// The run exceeded its budget
    pub fn timeout(budget: Duration) -> Self {
        ErrorRecord {
            kind: ErrorKind::Timeout,
            message: format!("Script execution timed out after {}ms", budget.as_millis()),
            trace: None,
        }
    }

    /// Chart rendering or decoding failed
    pub fn visualization(message: impl Into<String>) -> Self {
        ErrorRecord {
            kind: ErrorKind::VisualizationError,
            message: message.into(),
            trace: None,
        }
    }

    /// A fault raised by the script
    pub fn script(name: impl Into<String>, message: impl Into<String>, trace: Option<String>) -> Self {
        ErrorRecord {
            kind: ErrorKind::from(name.into()),
            message: message.into(),
            trace,
        }
    }

    /// A failure with no more specific name
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::script(ErrorKind::RUNTIME_ERROR, message, None)
    }

    /// Whether this record reports a deadline overrun
    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result of one run: captured output plus at most one error
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// `console.log` lines in call order
    pub output: Vec<String>,
    /// Failure, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

impl ExecutionResult {
    /// Create a successful result
    pub fn success(output: Vec<String>) -> Self {
        ExecutionResult { output, error: None }
    }

    /// Create a failed result, keeping whatever output was captured
    pub fn failure(output: Vec<String>, error: ErrorRecord) -> Self {
        ExecutionResult {
            output,
            error: Some(error),
        }
    }

    /// Whether the run finished without error
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Raw PNG bytes decoded from a chart
pub type VisualizationArtifact = Vec<u8>;

/// Everything an executor hands back to the orchestrator
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Captured output and error
    pub result: ExecutionResult,
    /// Decoded chart, if one was produced
    pub artifact: Option<VisualizationArtifact>,
    /// Wall-clock time spent
    pub elapsed: Duration,
}

/// Trait for code execution backends
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Get the executor name
    fn name(&self) -> &str;

    /// Run one request in a fresh sandbox.
    ///
    /// Script faults are reported inside the outcome; `Err` is reserved for
    /// host-side failures such as being unable to start the sandbox.
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_request() {
        let req = ExecutionRequest::new("console.log(1)", Duration::from_secs(2)).unwrap();
        assert_eq!(req.source_text(), "console.log(1)");
        assert_eq!(req.timeout_millis(), 2000);
        assert!(ExecutionRequest::new("", Duration::ZERO).is_err());
    }

    #[test]
    fn test_error_kind_names() {
        assert_eq!(ErrorKind::from("IOError".to_string()), ErrorKind::IoError);
        assert_eq!(ErrorKind::from("Timeout".to_string()), ErrorKind::Timeout);
        assert_eq!(
            ErrorKind::from("TypeError".to_string()),
            ErrorKind::Script("TypeError".to_string())
        );
        assert_eq!(ErrorKind::VisualizationError.as_str(), "VisualizationError");
    }

    #[test]
    fn test_error_record_wire_shape() {
        let record = ErrorRecord::script("TypeError", "x is not a function", None);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "name": "TypeError", "message": "x is not a function" })
        );

        let traced = ErrorRecord::script("Error", "boom", Some("at <main>".to_string()));
        let json = serde_json::to_value(&traced).unwrap();
        assert_eq!(json["stack"], "at <main>");
    }

    #[test]
    fn test_timeout_record() {
        let record = ErrorRecord::timeout(Duration::from_millis(1500));
        assert!(record.is_timeout());
        assert_eq!(record.message, "Script execution timed out after 1500ms");
        assert_eq!(record.to_string(), "Timeout: Script execution timed out after 1500ms");
    }

    #[test]
    fn test_execution_result() {
        let ok = ExecutionResult::success(vec!["a".into()]);
        assert!(ok.is_success());

        let failed = ExecutionResult::failure(vec!["partial".into()], ErrorRecord::runtime("boom"));
        assert!(!failed.is_success());
        assert_eq!(failed.output, vec!["partial".to_string()]);
    }
}
