//! Verity CLI: run browser verification scenarios
//!
//! ## Usage
//!
//! ```bash
//! verity validate scenarios/*.yaml
//! verity list scenarios/signin.yaml
//! verity run scenarios/*.yaml --base-url http://localhost:8080 --junit out/junit.xml
//! verity run scenarios/*.yaml --fixture scenarios/site.yaml
//! ```

use clap::Parser;
use std::process::ExitCode;
use verity_cli::{logging, Cli, CliConfig, CliResult, Commands, SuiteRunner, Verbosity};

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
    }
}

fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    logging::init(&config)?;

    match cli.command {
        Commands::Run(args) => {
            let runtime = tokio::runtime::Runtime::new()?;
            let mut runner = SuiteRunner::new(config);
            let report = runtime.block_on(runner.run(&args))?;
            println!("{}", report.summary());
            Ok(if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Validate(args) => {
            let valid = SuiteRunner::new(config).validate(&args)?;
            println!("{valid} scenario file(s) valid");
            Ok(ExitCode::SUCCESS)
        }
        Commands::List(args) => {
            print!("{}", SuiteRunner::list(&args)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(cli.color.clone().into())
        .with_log_format(cli.log_format.clone().into())
}
