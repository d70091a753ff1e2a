//! Result channel
//!
//! A run is reported on stdout as marker-prefixed lines:
//!
//! ```text
//! __OUTPUT__:["a","b"]
//! __ERROR__:{"name":"TypeError","message":"x is not a function"}
//! ```
//!
//! Other lines may precede them, so consumers scan rather than index.

use std::io::Write;

use crate::error::{Error, Result};
use crate::sandbox::{ErrorRecord, ExecutionResult};

/// Prefix of the captured output line
pub const OUTPUT_MARKER: &str = "__OUTPUT__:";
/// Prefix of the error line
pub const ERROR_MARKER: &str = "__ERROR__:";

/// Write `result` as marker lines
pub fn emit<W: Write>(result: &ExecutionResult, sink: &mut W) -> Result<()> {
    writeln!(sink, "{}{}", OUTPUT_MARKER, serde_json::to_string(&result.output)?)?;
    if let Some(error) = &result.error {
        writeln!(sink, "{}{}", ERROR_MARKER, serde_json::to_string(error)?)?;
    }
    sink.flush()?;
    Ok(())
}

/// A report recovered from a process's stdout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReport {
    /// Captured lines
    pub output: Vec<String>,
    /// Failure, if one was reported
    pub error: Option<ErrorRecord>,
}

impl ParsedReport {
    /// Captured lines joined with newlines
    pub fn joined_output(&self) -> String {
        self.output.join("\n")
    }

    /// `"<name>: <message>"` when the run failed
    pub fn error_summary(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

impl From<ParsedReport> for ExecutionResult {
    fn from(report: ParsedReport) -> Self {
        ExecutionResult {
            output: report.output,
            error: report.error,
        }
    }
}

/// Recover a report from everything a run printed.
///
/// The last occurrence of each marker wins; scripts can write arbitrary
/// lines to stdout before the real markers are emitted.
pub fn parse_report(stdout: &str) -> Result<ParsedReport> {
    let mut output = None;
    let mut error = None;
    for line in stdout.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(payload) = line.strip_prefix(OUTPUT_MARKER) {
            output = Some(payload);
        } else if let Some(payload) = line.strip_prefix(ERROR_MARKER) {
            error = Some(payload);
        }
    }

    let output = output
        .ok_or_else(|| Error::InvalidInput(format!("no {} line found", OUTPUT_MARKER)))?;
    Ok(ParsedReport {
        output: serde_json::from_str(output)?,
        error: error
            .map(|payload| serde_json::from_str::<ErrorRecord>(payload))
            .transpose()?,
    })
}
