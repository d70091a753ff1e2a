//! Execution orchestrator
//!
//! Drives one invocation: load the source, run it, persist any chart, and
//! hand back exactly one [`ExecutionResult`].

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::sandbox::{CodeExecutor, ErrorKind, ErrorRecord, ExecutionRequest, ExecutionResult};

/// How an invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Ran without error and produced no chart
    Completed,
    /// Ran without error and persisted a chart
    CompletedWithVisualization,
    /// The source could not be loaded
    FailedBeforeStart,
    /// The script failed or timed out
    FailedDuringRun,
    /// The script succeeded but its chart could not be produced or saved
    FailedDuringVisualization,
}

impl Completion {
    /// Whether the run ended without an error record
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Completion::Completed | Completion::CompletedWithVisualization
        )
    }
}

/// Outcome of one invocation
#[derive(Debug, Clone)]
pub struct RunReport {
    /// What gets emitted
    pub result: ExecutionResult,
    /// Terminal state
    pub completion: Completion,
    /// Where the chart was written, when one was
    pub artifact_path: Option<PathBuf>,
}

impl RunReport {
    fn new(result: ExecutionResult, completion: Completion) -> Self {
        RunReport {
            result,
            completion,
            artifact_path: None,
        }
    }
}

/// Top-level driver around a [`CodeExecutor`]
pub struct Orchestrator {
    executor: Box<dyn CodeExecutor>,
    artifact_path: PathBuf,
}

impl Orchestrator {
    /// Create an orchestrator persisting charts to `artifact_path`
    pub fn new(executor: Box<dyn CodeExecutor>, artifact_path: impl Into<PathBuf>) -> Self {
        Orchestrator {
            executor,
            artifact_path: artifact_path.into(),
        }
    }

    /// Where charts are persisted
    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    /// Run the script at `source`; a missing path is a load failure
    pub async fn run(&self, source: Option<&Path>, timeout: Duration) -> RunReport {
        match source {
            Some(path) => self.run_file(path, timeout).await,
            None => {
                warn!("no source file given");
                RunReport::new(
                    ExecutionResult::failure(Vec::new(), ErrorRecord::io("No source file given")),
                    Completion::FailedBeforeStart,
                )
            }
        }
    }

    /// Load `path` and run it
    pub async fn run_file(&self, path: &Path, timeout: Duration) -> RunReport {
        let source = match tokio::fs::read_to_string(path).await {
            Ok(source) => source,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read source");
                let record = ErrorRecord::io(format!("Failed to read {}: {}", path.display(), e));
                return RunReport::new(
                    ExecutionResult::failure(Vec::new(), record),
                    Completion::FailedBeforeStart,
                );
            }
        };
        debug!(path = %path.display(), bytes = source.len(), "source loaded");
        self.run_source(source, timeout).await
    }

    /// Run already loaded source text
    pub async fn run_source(&self, source: String, timeout: Duration) -> RunReport {
        let request = match ExecutionRequest::new(source, timeout) {
            Ok(request) => request,
            Err(e) => {
                return RunReport::new(
                    ExecutionResult::failure(Vec::new(), ErrorRecord::runtime(e.to_string())),
                    Completion::FailedBeforeStart,
                )
            }
        };

        info!(executor = self.executor.name(), timeout_ms = request.timeout_millis(), "executing script");
        let outcome = match self.executor.execute(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "sandbox could not be started");
                return RunReport::new(
                    ExecutionResult::failure(Vec::new(), ErrorRecord::runtime(e.to_string())),
                    Completion::FailedDuringRun,
                );
            }
        };

        let mut result = outcome.result;
        if let Some(error) = &result.error {
            warn!(kind = %error.kind, message = %error.message, "script failed");
            let completion = if error.kind == ErrorKind::VisualizationError {
                Completion::FailedDuringVisualization
            } else {
                Completion::FailedDuringRun
            };
            return RunReport::new(result, completion);
        }

        let Some(artifact) = outcome.artifact else {
            info!(lines = result.output.len(), elapsed = ?outcome.elapsed, "script completed");
            return RunReport::new(result, Completion::Completed);
        };

        if let Err(e) = tokio::fs::write(&self.artifact_path, &artifact).await {
            warn!(path = %self.artifact_path.display(), error = %e, "failed to persist chart");
            result.error = Some(ErrorRecord::visualization(format!(
                "Failed to write {}: {}",
                self.artifact_path.display(),
                e
            )));
            return RunReport::new(result, Completion::FailedDuringVisualization);
        }

        info!(
            path = %self.artifact_path.display(),
            bytes = artifact.len(),
            "chart persisted"
        );
        RunReport {
            result,
            completion: Completion::CompletedWithVisualization,
            artifact_path: Some(self.artifact_path.clone()),
        }
    }
}
