//! Chart extraction after a successful run

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::boundary::IsolationBoundary;
use super::capabilities::CHART_GLOBAL;
use super::chart::ImageOptions;
use super::executor::{ErrorKind, ErrorRecord, VisualizationArtifact};

/// Identifier scripts assign their figure to
pub const FIGURE_GLOBAL: &str = "fig";

/// Render the script's figure, if it left one behind.
///
/// No charting capability or no `fig` binding means there is nothing to
/// extract, which is not an error. Any other failure in this stage is a
/// `VisualizationError`, except a deadline overrun.
pub fn extract(
    boundary: &mut IsolationBoundary,
) -> Result<Option<VisualizationArtifact>, ErrorRecord> {
    let Some(chart) = boundary.binding(CHART_GLOBAL).map_err(visualization_failure)? else {
        return Ok(None);
    };
    let Some(figure) = boundary.binding(FIGURE_GLOBAL).map_err(visualization_failure)? else {
        tracing::debug!("charting available but no figure bound");
        return Ok(None);
    };

    let uri = boundary
        .render_chart(&chart, &figure, &ImageOptions::default())
        .map_err(visualization_failure)?;
    let bytes = decode_data_uri(&uri)?;
    tracing::debug!(bytes = bytes.len(), "decoded chart artifact");
    Ok(Some(bytes))
}

/// Reclassify a fault raised while extracting, keeping message and trace.
fn visualization_failure(record: ErrorRecord) -> ErrorRecord {
    if record.is_timeout() || record.kind == ErrorKind::VisualizationError {
        return record;
    }
    ErrorRecord {
        kind: ErrorKind::VisualizationError,
        ..record
    }
}

/// Decode the payload of a `data:<mime>;base64,<payload>` URI.
///
/// Text without a `data:` header is taken to be bare base64.
pub fn decode_data_uri(uri: &str) -> Result<VisualizationArtifact, ErrorRecord> {
    let payload = match uri.strip_prefix("data:") {
        Some(rest) => match rest.split_once(',') {
            Some((header, payload)) if header.ends_with(";base64") => payload,
            Some((header, _)) => {
                return Err(ErrorRecord::visualization(format!(
                    "unsupported data URI encoding '{}'",
                    header
                )))
            }
            None => return Err(ErrorRecord::visualization("malformed data URI")),
        },
        None => uri,
    };

    let payload: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if payload.is_empty() {
        return Err(ErrorRecord::visualization("chart renderer returned an empty image"));
    }
    STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| ErrorRecord::visualization(format!("invalid base64 image data: {}", e)))
}
