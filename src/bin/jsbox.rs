//! jsbox CLI
//!
//! Runs one script file in a fresh sandbox and prints the marker lines.

use clap::Parser;
use jsbox::config::{load_config_with, parse_timeout, validate_config, Config, LogFormat};
use jsbox::sandbox::create_executor;
use jsbox::{protocol, Orchestrator, Result, VERSION};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "jsbox",
    version = VERSION,
    about = "Run a JavaScript file in a one-shot sandbox",
    long_about = None
)]
struct Cli {
    /// Script to execute
    source: Option<PathBuf>,

    /// Deadline in seconds (fractions allowed)
    timeout: Option<String>,

    /// Configuration file (JSON5 or TOML)
    #[arg(long, env = "JSBOX_CONFIG")]
    config: Option<PathBuf>,

    /// Where a rendered chart is written
    #[arg(long)]
    artifact: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = load_config_with(cli.config.as_deref());
    let mut config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => Config::default(),
    };
    for directive in init_tracing(&config) {
        warn!("Ignoring invalid log directive: {}", directive);
    }
    if let Err(e) = &loaded {
        warn!("Failed to load configuration, using defaults: {}", e);
    }

    let validation = validate_config(&config);
    for issue in &validation.warnings {
        warn!("Config warning: {}", issue);
    }
    if !validation.valid {
        for issue in &validation.errors {
            warn!("Config error: {}", issue);
        }
        warn!("Invalid configuration, using defaults");
        config = Config::default();
    }

    if let Some(artifact) = cli.artifact {
        config.sandbox.artifact_path = artifact;
    }
    let timeout = resolve_timeout(cli.timeout.as_deref(), config.sandbox.default_timeout);

    let executor = create_executor(&config.sandbox, None);
    let orchestrator = Orchestrator::new(executor, config.sandbox.artifact_path.clone());

    let span = info_span!("run", run_id = %Uuid::new_v4());
    let report = async {
        info!(
            source = ?cli.source,
            timeout = %humantime::format_duration(timeout),
            "Starting jsbox v{}",
            VERSION
        );
        let report = orchestrator.run(cli.source.as_deref(), timeout).await;
        info!(completion = ?report.completion, "run finished");
        report
    }
    .instrument(span)
    .await;

    let mut stdout = std::io::stdout().lock();
    protocol::emit(&report.result, &mut stdout)?;
    Ok(())
}

/// Install the subscriber; returns configured directives that did not parse.
fn init_tracing(config: &Config) -> Vec<String> {
    let (filter, rejected) = build_filter(EnvFilter::from_default_env(), &config.logging.filter);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
    rejected
}

/// Add each comma-separated directive of `directives` on top of `filter`.
fn build_filter(mut filter: EnvFilter, directives: &str) -> (EnvFilter, Vec<String>) {
    let mut rejected = Vec::new();
    for directive in directives.split(',').map(str::trim).filter(|d| !d.is_empty()) {
        match directive.parse() {
            Ok(parsed) => filter = filter.add_directive(parsed),
            Err(_) => rejected.push(directive.to_string()),
        }
    }
    (filter, rejected)
}

/// Positional timeout in seconds; anything unusable falls back to `default`.
fn resolve_timeout(raw: Option<&str>, default: Duration) -> Duration {
    let Some(raw) = raw else {
        return default;
    };
    match parse_timeout(raw) {
        Ok(timeout) => timeout,
        Err(e) => {
            warn!(value = raw, "Invalid timeout ({}), using {:?}", e, default);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_timeout() {
        let default = Duration::from_secs(30);
        assert_eq!(resolve_timeout(None, default), default);
        assert_eq!(resolve_timeout(Some("2.5"), default), Duration::from_millis(2500));
        assert_eq!(resolve_timeout(Some("0"), default), default);
        assert_eq!(resolve_timeout(Some("-3"), default), default);
        assert_eq!(resolve_timeout(Some("soon"), default), default);
    }

    #[test]
    fn test_cli_arguments() {
        let cli = Cli::parse_from(["jsbox", "main.js", "5", "--artifact", "/tmp/out.png"]);
        assert_eq!(cli.source, Some(PathBuf::from("main.js")));
        assert_eq!(cli.timeout.as_deref(), Some("5"));
        assert_eq!(cli.artifact, Some(PathBuf::from("/tmp/out.png")));
    }

    #[test]
    fn test_cli_without_source_still_parses() {
        let cli = Cli::try_parse_from(["jsbox"]).unwrap();
        assert!(cli.source.is_none());
        assert!(cli.timeout.is_none());
    }

    #[test]
    fn test_configured_directives_are_added() {
        let (filter, rejected) = build_filter(EnvFilter::new("warn"), "jsbox=debug, ,jsbox=loud");
        assert_eq!(rejected, vec!["jsbox=loud".to_string()]);
        let rendered = filter.to_string();
        assert!(rendered.contains("jsbox=debug"));
        assert!(rendered.contains("warn"));
    }
}
