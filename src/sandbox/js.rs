//! Embedded JavaScript executor
//!
//! Each request gets its own worker thread and its own engine context. The
//! host waits on the worker with a deadline; when the deadline fires first
//! the capabilities are revoked and the worker is abandoned.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::config::SandboxConfig;
use crate::error::{Error, Result};
use crate::sandbox::boundary::IsolationBoundary;
use crate::sandbox::capabilities::{CapabilitySet, OutputInterceptor, Revocation};
use crate::sandbox::chart::ChartRenderer;
use crate::sandbox::executor::{
    CodeExecutor, ErrorRecord, ExecutionOutcome, ExecutionRequest, ExecutionResult,
    VisualizationArtifact,
};
use crate::sandbox::visualization;

const WORKER_NAME: &str = "jsbox-sandbox";

/// What the worker reports back; output travels separately
#[derive(Debug, Default)]
struct SessionOutcome {
    error: Option<ErrorRecord>,
    artifact: Option<VisualizationArtifact>,
}

impl SessionOutcome {
    fn failed(error: ErrorRecord) -> Self {
        SessionOutcome {
            error: Some(error),
            artifact: None,
        }
    }
}

/// Executor backed by an embedded engine.
///
/// A script still running at its deadline cannot be interrupted: its worker
/// thread is detached with every capability revoked. It ends once the loop
/// iteration limit aborts it (`SandboxConfig::loop_iteration_limit`), or with
/// the process. Callers reusing one executor for many runs should keep that
/// limit set, since each runaway script otherwise holds a thread forever.
pub struct JsSandbox {
    chart: Option<Arc<dyn ChartRenderer>>,
    worker_stack_size: usize,
    max_output_lines: Option<usize>,
    loop_iteration_limit: Option<u64>,
}

impl JsSandbox {
    /// Create an executor with no charting capability
    pub fn new(config: &SandboxConfig) -> Self {
        JsSandbox {
            chart: None,
            worker_stack_size: config.worker_stack_size,
            max_output_lines: config.max_output_lines,
            loop_iteration_limit: config.loop_iteration_limit,
        }
    }

    /// Expose `renderer` to scripts as `Plotly`
    pub fn with_chart(mut self, renderer: Arc<dyn ChartRenderer>) -> Self {
        self.chart = Some(renderer);
        self
    }
}

#[async_trait]
impl CodeExecutor for JsSandbox {
    fn name(&self) -> &str {
        "boa"
    }

    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionOutcome> {
        let budget = request.timeout();
        let start = Instant::now();
        let deadline = start + budget;

        let (line_tx, mut line_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();
        let revocation = Revocation::default();

        let worker_revocation = revocation.clone();
        let chart = self.chart.clone();
        let max_output_lines = self.max_output_lines;
        let loop_iteration_limit = self.loop_iteration_limit;
        let span = tracing::Span::current();
        let source = request.into_source();

        std::thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .stack_size(self.worker_stack_size)
            .spawn(move || {
                let _entered = span.enter();
                let outcome = run_session(
                    &source,
                    chart,
                    OutputInterceptor::new(line_tx, worker_revocation.clone(), max_output_lines),
                    worker_revocation,
                    loop_iteration_limit,
                    deadline,
                    budget,
                );
                // The host stops waiting once its deadline passes.
                let _ = done_tx.send(outcome);
            })
            .map_err(|e| Error::Sandbox(format!("Failed to spawn sandbox worker: {}", e)))?;

        debug!(budget_ms = budget.as_millis() as u64, "sandbox worker started");

        let session = match tokio::time::timeout(budget, done_rx).await {
            Ok(Ok(session)) => session,
            Ok(Err(_)) => {
                warn!("sandbox worker exited without reporting");
                SessionOutcome::failed(ErrorRecord::runtime(
                    "sandbox worker terminated unexpectedly",
                ))
            }
            Err(_) => {
                warn!("Execution timed out after {:?}", budget);
                SessionOutcome::failed(ErrorRecord::timeout(budget))
            }
        };
        // Anything still running in the worker is abandoned from here on.
        revocation.revoke();

        let mut output = Vec::new();
        while let Ok(line) = line_rx.try_recv() {
            output.push(line);
        }

        let elapsed = start.elapsed();
        debug!(
            lines = output.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            failed = session.error.is_some(),
            "sandbox run finished"
        );

        let result = match session.error {
            Some(error) => ExecutionResult::failure(output, error),
            None => ExecutionResult::success(output),
        };
        Ok(ExecutionOutcome {
            result,
            artifact: session.artifact,
            elapsed,
        })
    }
}

/// Evaluate `source` in a fresh boundary and extract its chart.
fn run_session(
    source: &str,
    chart: Option<Arc<dyn ChartRenderer>>,
    record: OutputInterceptor,
    revocation: Revocation,
    loop_iteration_limit: Option<u64>,
    deadline: Instant,
    budget: Duration,
) -> SessionOutcome {
    let capabilities = CapabilitySet::new(record, chart, revocation);
    let mut boundary = match IsolationBoundary::new(capabilities, deadline, budget) {
        Ok(boundary) => boundary,
        Err(e) => return SessionOutcome::failed(ErrorRecord::runtime(e.to_string())),
    };
    if let Some(max) = loop_iteration_limit {
        boundary.limit_loop_iterations(max);
    }

    if let Err(error) = boundary.evaluate(source) {
        return SessionOutcome::failed(error);
    }

    match visualization::extract(&mut boundary) {
        Ok(artifact) => SessionOutcome {
            error: None,
            artifact,
        },
        Err(error) => SessionOutcome::failed(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::chart::ImageOptions;
    use crate::sandbox::executor::ErrorKind;
    use std::sync::Mutex;

    /// Renders every figure as the bytes `hello`, remembering what it saw
    #[derive(Default)]
    struct FakeRenderer {
        seen: Mutex<Vec<(serde_json::Value, ImageOptions)>>,
    }

    impl ChartRenderer for FakeRenderer {
        fn to_image(&self, figure: &serde_json::Value, options: &ImageOptions) -> Result<String> {
            self.seen
                .lock()
                .unwrap()
                .push((figure.clone(), options.clone()));
            Ok("data:image/png;base64,aGVsbG8=".to_string())
        }
    }

    struct BrokenRenderer;

    impl ChartRenderer for BrokenRenderer {
        fn to_image(&self, _figure: &serde_json::Value, _options: &ImageOptions) -> Result<String> {
            Err(Error::Chart("renderer offline".to_string()))
        }
    }

    fn sandbox() -> JsSandbox {
        JsSandbox::new(&SandboxConfig::default())
    }

    async fn run(executor: &JsSandbox, source: &str, timeout: Duration) -> ExecutionOutcome {
        let request = ExecutionRequest::new(source, timeout).unwrap();
        executor.execute(request).await.unwrap()
    }

    #[tokio::test]
    async fn test_logs_are_captured_in_order() {
        let outcome = run(
            &sandbox(),
            "for (let i = 0; i < 5; i++) console.log('line', i);",
            Duration::from_secs(5),
        )
        .await;
        assert!(outcome.result.is_success());
        assert_eq!(
            outcome.result.output,
            (0..5).map(|i| format!("line {}", i)).collect::<Vec<_>>()
        );
        assert!(outcome.artifact.is_none());
    }

    #[tokio::test]
    async fn test_empty_script() {
        let outcome = run(&sandbox(), "", Duration::from_secs(5)).await;
        assert_eq!(outcome.result, ExecutionResult::success(Vec::new()));
    }

    #[tokio::test]
    async fn test_infinite_loop_times_out() {
        let outcome = run(
            &sandbox(),
            "console.log('started'); while (true) {}",
            Duration::from_millis(300),
        )
        .await;
        let error = outcome.result.error.unwrap();
        assert!(error.is_timeout());
        assert_eq!(error.message, "Script execution timed out after 300ms");
        assert_eq!(outcome.result.output, vec!["started".to_string()]);
        assert!(outcome.elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_throw_keeps_partial_output() {
        let outcome = run(
            &sandbox(),
            "console.log('one'); console.log('two'); null.field;",
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(outcome.result.output, vec!["one".to_string(), "two".to_string()]);
        assert_eq!(outcome.result.error.unwrap().kind.as_str(), "TypeError");
    }

    #[tokio::test]
    async fn test_require_outside_whitelist_fails() {
        let outcome = run(&sandbox(), "const fs = require('fs');", Duration::from_secs(5)).await;
        let error = outcome.result.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Script("Error".to_string()));
        assert_eq!(error.message, "Cannot find module 'fs'");
    }

    #[tokio::test]
    async fn test_runs_are_isolated() {
        let executor = sandbox();
        run(&executor, "globalThis.leaked = 42; var fig = {};", Duration::from_secs(5)).await;
        let outcome = run(
            &executor,
            "console.log(typeof leaked, typeof fig);",
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(outcome.result.output, vec!["undefined undefined".to_string()]);
    }

    #[tokio::test]
    async fn test_timers_and_promises() {
        let outcome = run(
            &sandbox(),
            r#"
            setTimeout(() => console.log('timer'), 20);
            (async () => { await null; console.log('async'); })();
            console.log('main');
            "#,
            Duration::from_secs(5),
        )
        .await;
        assert!(outcome.result.is_success());
        assert_eq!(outcome.result.output, vec!["main", "async", "timer"]);
    }

    #[tokio::test]
    async fn test_host_chart_produces_artifact() {
        let renderer = Arc::new(FakeRenderer::default());
        let executor = sandbox().with_chart(renderer.clone());
        let outcome = run(
            &executor,
            "var fig = { data: [{ x: [1, 2], y: [3, 4], type: 'scatter' }], layout: { title: 't' } };",
            Duration::from_secs(5),
        )
        .await;
        assert!(outcome.result.is_success());
        assert_eq!(outcome.artifact.as_deref(), Some(&b"hello"[..]));

        let seen = renderer.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0["layout"]["title"], "t");
        assert_eq!(seen[0].1, ImageOptions::default());
    }

    #[tokio::test]
    async fn test_chart_without_figure_is_not_an_error() {
        let executor = sandbox().with_chart(Arc::new(FakeRenderer::default()));
        let outcome = run(&executor, "console.log(typeof Plotly.toImage);", Duration::from_secs(5)).await;
        assert!(outcome.result.is_success());
        assert_eq!(outcome.result.output, vec!["function".to_string()]);
        assert!(outcome.artifact.is_none());
    }

    #[tokio::test]
    async fn test_figure_without_chart_is_ignored() {
        let outcome = run(&sandbox(), "var fig = { data: [] };", Duration::from_secs(5)).await;
        assert!(outcome.result.is_success());
        assert!(outcome.artifact.is_none());
    }

    #[tokio::test]
    async fn test_script_defined_chart_object() {
        let outcome = run(
            &sandbox(),
            r#"
            var Plotly = {
                toImage: function (figure, options) {
                    return Promise.resolve('data:image/png;base64,aGVsbG8=');
                }
            };
            var fig = { data: [] };
            "#,
            Duration::from_secs(5),
        )
        .await;
        assert!(outcome.result.is_success());
        assert_eq!(outcome.artifact.as_deref(), Some(&b"hello"[..]));
    }

    #[tokio::test]
    async fn test_rejected_render_is_visualization_error() {
        let outcome = run(
            &sandbox(),
            r#"
            console.log('drawn');
            var Plotly = { toImage: function () { return Promise.reject(new Error('no canvas')); } };
            var fig = { data: [] };
            "#,
            Duration::from_secs(5),
        )
        .await;
        let error = outcome.result.error.unwrap();
        assert_eq!(error.kind, ErrorKind::VisualizationError);
        assert!(error.message.contains("no canvas"));
        assert_eq!(outcome.result.output, vec!["drawn".to_string()]);
        assert!(outcome.artifact.is_none());
    }

    #[tokio::test]
    async fn test_renderer_failure_is_visualization_error() {
        let executor = sandbox().with_chart(Arc::new(BrokenRenderer));
        let outcome = run(&executor, "var fig = { data: [] };", Duration::from_secs(5)).await;
        let error = outcome.result.error.unwrap();
        assert_eq!(error.kind, ErrorKind::VisualizationError);
        assert!(error.message.contains("renderer offline"));
    }

    #[tokio::test]
    async fn test_throwing_figure_getter_is_visualization_error() {
        let executor = sandbox().with_chart(Arc::new(FakeRenderer::default()));
        let outcome = run(
            &executor,
            r#"
            console.log('ran');
            Object.defineProperty(globalThis, 'fig', {
                get: function () { throw new Error('fig broke'); }
            });
            "#,
            Duration::from_secs(5),
        )
        .await;
        let error = outcome.result.error.unwrap();
        assert_eq!(error.kind, ErrorKind::VisualizationError);
        assert_eq!(error.message, "fig broke");
        assert_eq!(outcome.result.output, vec!["ran".to_string()]);
        assert!(outcome.artifact.is_none());
    }

    #[tokio::test]
    async fn test_clobbered_promise_is_visualization_error() {
        let outcome = run(
            &sandbox(),
            r#"
            var Plotly = { toImage: function () { return 'data:image/png;base64,aGVsbG8='; } };
            var fig = {};
            Promise.resolve = null;
            "#,
            Duration::from_secs(5),
        )
        .await;
        let error = outcome.result.error.unwrap();
        assert_eq!(error.kind, ErrorKind::VisualizationError);
        assert!(outcome.artifact.is_none());
    }

    #[tokio::test]
    async fn test_loop_limit_ends_runaway_script() {
        let config = SandboxConfig {
            loop_iteration_limit: Some(100_000),
            ..SandboxConfig::default()
        };
        let outcome = run(
            &JsSandbox::new(&config),
            "while (true) {}",
            Duration::from_secs(10),
        )
        .await;
        let error = outcome.result.error.unwrap();
        assert!(!error.is_timeout());
        assert!(outcome.elapsed < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_output_limit_from_config() {
        let config = SandboxConfig {
            max_output_lines: Some(3),
            ..SandboxConfig::default()
        };
        let outcome = run(
            &JsSandbox::new(&config),
            "for (let i = 0; i < 10; i++) console.log(i);",
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(outcome.result.output, vec!["0", "1", "2"]);
    }
}
