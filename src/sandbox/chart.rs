//! Host-side chart rendering seam
//!
//! The sandbox never renders anything itself. When the host has a renderer
//! it is exposed to scripts as `Plotly.toImage(figure, options)`; otherwise
//! `Plotly` is bound to `undefined`.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Width requested when extracting the current figure
pub const IMAGE_WIDTH: u32 = 800;
/// Height requested when extracting the current figure
pub const IMAGE_HEIGHT: u32 = 600;

/// Options passed to `toImage`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageOptions {
    /// Image format, `png` unless the script asks otherwise
    pub format: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Default for ImageOptions {
    fn default() -> Self {
        ImageOptions {
            format: "png".to_string(),
            width: IMAGE_WIDTH,
            height: IMAGE_HEIGHT,
        }
    }
}

/// A charting capability the host may provide
pub trait ChartRenderer: Send + Sync {
    /// Render `figure` (a `{data, layout}` style JSON document) and return a
    /// `data:image/<format>;base64,...` URI.
    fn to_image(&self, figure: &serde_json::Value, options: &ImageOptions) -> Result<String>;
}
