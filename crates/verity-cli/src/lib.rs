//! Verity CLI library
//!
//! Command-line interface for running Verity scenarios: argument parsing,
//! terminal output and the glue between scenario files, the runner and
//! the report writers.

#![warn(missing_docs)]
#![allow(clippy::format_push_string)] // String building is clear and correct

mod commands;
mod config;
mod error;
pub mod logging;
mod output;
mod runner;

pub use commands::{Cli, ColorArg, Commands, ListArgs, LogFormatArg, RunArgs, ValidateArgs};
pub use config::{CliConfig, ColorChoice, LogFormat, Verbosity};
pub use error::{CliError, CliResult};
pub use output::ProgressReporter;
pub use runner::{render_listing, SuiteRunner};
