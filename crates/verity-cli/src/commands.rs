//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Verity: run declarative browser verification scenarios
#[derive(Parser, Debug)]
#[command(name = "verity")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Log line format (text, json)
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormatArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run scenarios and write evidence and reports
    Run(RunArgs),

    /// Parse and validate scenario files without running them
    Validate(ValidateArgs),

    /// Print the ordered steps of a scenario
    List(ListArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Scenario files (YAML)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Override the base URL of every scenario
    #[arg(long, env = "VERITY_BASE_URL")]
    pub base_url: Option<String>,

    /// Output directory for screenshots and JSON run logs
    #[arg(short, long, default_value = verity::runner::DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,

    /// Run the browser headless (--headless false shows the window)
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub headless: bool,

    /// Path to the chromium binary
    #[arg(long, env = "CHROMIUM_PATH")]
    pub chromium: Option<String>,

    /// Disable the chromium sandbox (containers, CI)
    #[arg(long)]
    pub no_sandbox: bool,

    /// Maximum concurrent runs (0 = one per core)
    #[arg(short = 'j', long, default_value = "1")]
    pub jobs: usize,

    /// Default per-step timeout in milliseconds
    #[arg(long, default_value = "30000")]
    pub timeout_ms: u64,

    /// Overall deadline per run in milliseconds
    #[arg(long)]
    pub deadline_ms: Option<u64>,

    /// Also write JUnit XML to this path
    #[arg(long)]
    pub junit: Option<PathBuf>,

    /// Drive runs against an in-memory site described in YAML instead of a browser
    #[arg(long)]
    pub fixture: Option<PathBuf>,
}

/// Arguments for the validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Scenario files (YAML)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Scenario file (YAML)
    pub file: PathBuf,
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Log format argument for CLI
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormatArg {
    /// Human-readable lines
    #[default]
    Text,
    /// JSON lines
    Json,
}

impl From<LogFormatArg> for crate::config::LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}
