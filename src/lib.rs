//! # jsbox
//!
//! One-shot sandboxed JavaScript execution.
//!
//! ## Features
//!
//! - **Fresh context per run:** an embedded engine with nothing but a small
//!   capability whitelist bound into it
//! - **Hard deadline:** runaway scripts are abandoned and reported as `Timeout`
//! - **Captured output:** `console.log` lines are collected, not printed
//! - **Charts:** a figure left in `fig` is rendered through the host's chart
//!   renderer and saved as PNG
//! - **Marker protocol:** results are emitted as `__OUTPUT__:` / `__ERROR__:` lines

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod protocol;
pub mod sandbox;

pub use config::Config;
pub use error::{Error, Result};
pub use orchestrator::{Completion, Orchestrator, RunReport};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
