//! Sandbox configuration types
//!
//! Configuration for the one-shot JavaScript sandbox

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Sandbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Default deadline when the caller does not supply one
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub default_timeout: Duration,
    /// Where a rendered chart is persisted
    #[serde(default = "default_artifact_path")]
    pub artifact_path: PathBuf,
    /// Stack size of the worker thread that hosts the engine
    #[serde(default = "default_worker_stack_size")]
    pub worker_stack_size: usize,
    /// Cap on captured output lines (unlimited when unset)
    #[serde(default)]
    pub max_output_lines: Option<usize>,
    /// Iterations a single loop may run before the engine aborts it.
    /// Stops abandoned workers of timed-out scripts; unlimited when unset.
    #[serde(default = "default_loop_iteration_limit")]
    pub loop_iteration_limit: Option<u64>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        SandboxConfig {
            default_timeout: default_timeout(),
            artifact_path: default_artifact_path(),
            worker_stack_size: default_worker_stack_size(),
            max_output_lines: None,
            loop_iteration_limit: default_loop_iteration_limit(),
        }
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_artifact_path() -> PathBuf {
    PathBuf::from("/tmp/plot.png")
}

fn default_worker_stack_size() -> usize {
    16 * 1024 * 1024 // 16MB
}

fn default_loop_iteration_limit() -> Option<u64> {
    Some(1_000_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_config_default() {
        let config = SandboxConfig::default();
        assert_eq!(config.default_timeout, Duration::from_secs(30));
        assert_eq!(config.artifact_path, PathBuf::from("/tmp/plot.png"));
        assert!(config.max_output_lines.is_none());
        assert_eq!(config.loop_iteration_limit, Some(1_000_000_000));
    }

    #[test]
    fn test_humantime_timeout() {
        let config: SandboxConfig =
            serde_json::from_str(r#"{ "default_timeout": "1500ms" }"#).unwrap();
        assert_eq!(config.default_timeout, Duration::from_millis(1500));
        assert_eq!(config.worker_stack_size, 16 * 1024 * 1024);
    }

    #[test]
    fn test_loop_limit_can_be_disabled() {
        let config: SandboxConfig =
            serde_json::from_str(r#"{ "loop_iteration_limit": null }"#).unwrap();
        assert!(config.loop_iteration_limit.is_none());
    }
}
