//! Sandbox module - One-shot JavaScript execution
//!
//! - capabilities: the whitelist of host objects a script may reach
//! - boundary: fresh engine context, evaluation, fault classification
//! - timers: `setTimeout` queue driven after the main script
//! - visualization: chart probing and data URI decoding
//! - js: worker thread plus deadline enforcement

mod boundary;
mod capabilities;
mod chart;
mod executor;
mod js;
mod timers;
mod visualization;

pub use boundary::IsolationBoundary;
pub use capabilities::{
    CapabilitySet, OutputInterceptor, ProcessStub, Revocation, StdoutHandle, ALLOWED_MODULE,
    CHART_GLOBAL, WHITELIST,
};
pub use chart::{ChartRenderer, ImageOptions, IMAGE_HEIGHT, IMAGE_WIDTH};
pub use executor::{
    CodeExecutor, ErrorKind, ErrorRecord, ExecutionOutcome, ExecutionRequest, ExecutionResult,
    VisualizationArtifact,
};
pub use js::JsSandbox;
pub use timers::TimerQueue;
pub use visualization::{decode_data_uri, extract, FIGURE_GLOBAL};

use std::sync::Arc;

use crate::config::SandboxConfig;

/// Create the executor described by the configuration
pub fn create_executor(
    config: &SandboxConfig,
    chart: Option<Arc<dyn ChartRenderer>>,
) -> Box<dyn CodeExecutor> {
    let executor = JsSandbox::new(config);
    match chart {
        Some(renderer) => Box::new(executor.with_chart(renderer)),
        None => Box::new(executor),
    }
}
