//! `tracing` subscriber setup

use tracing_subscriber::EnvFilter;

use crate::config::{CliConfig, LogFormat};
use crate::error::{CliError, CliResult};

/// Install the global subscriber; `RUST_LOG` wins over the `-v/-q` level
pub fn init(config: &CliConfig) -> CliResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.verbosity.log_directive()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(config.verbosity.is_verbose());

    let installed = match config.log_format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.with_ansi(config.color.should_color()).try_init(),
    };
    installed.map_err(|e| CliError::config(format!("logging: {e}")))
}
