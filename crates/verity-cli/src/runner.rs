//! Command implementations: load, validate, list and run scenario files

use std::path::PathBuf;
use std::time::Duration;

use tracing::info;
use verity::{
    MockSession, MockSite, RunReport, RunnerConfig, Scenario, ScenarioRunner, VerityError,
};

use crate::commands::{ListArgs, RunArgs, ValidateArgs};
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;

/// Runs the CLI subcommands against scenario files
#[derive(Debug)]
pub struct SuiteRunner {
    config: CliConfig,
    reporter: ProgressReporter,
}

impl SuiteRunner {
    /// Create a runner
    #[must_use]
    pub fn new(config: CliConfig) -> Self {
        let mut reporter =
            ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());
        if !config.verbosity.is_verbose() {
            reporter = reporter.failures_only();
        }
        Self { config, reporter }
    }

    /// Get configuration
    #[must_use]
    pub const fn config(&self) -> &CliConfig {
        &self.config
    }

    /// Load and validate every file, optionally overriding the base URL
    pub fn load(files: &[PathBuf], base_url: Option<&str>) -> CliResult<Vec<Scenario>> {
        files
            .iter()
            .map(|path| {
                let label = path.display().to_string();
                let mut scenario =
                    Scenario::from_file(path).map_err(|e| CliError::scenario(&label, e))?;
                if let Some(base_url) = base_url {
                    scenario = scenario.with_base_url(base_url);
                }
                scenario
                    .validate()
                    .map_err(|e| CliError::scenario(&label, e))?;
                Ok(scenario)
            })
            .collect()
    }

    /// `verity validate`: returns the number of valid files
    pub fn validate(&self, args: &ValidateArgs) -> CliResult<usize> {
        let mut first_error = None;
        let mut valid = 0;
        for path in &args.files {
            match Self::load(std::slice::from_ref(path), None) {
                Ok(scenarios) => {
                    valid += 1;
                    for scenario in &scenarios {
                        self.reporter.success(&format!(
                            "{} ({}, {} steps)",
                            path.display(),
                            scenario.name,
                            scenario.steps.len()
                        ));
                    }
                }
                Err(e) => {
                    self.reporter.failure(&e.to_string());
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(valid),
        }
    }

    /// `verity list`: the ordered steps of one scenario, one per line
    pub fn list(args: &ListArgs) -> CliResult<String> {
        let label = args.file.display().to_string();
        let scenario = Scenario::from_file(&args.file).map_err(|e| CliError::scenario(&label, e))?;
        Ok(render_listing(&scenario))
    }

    /// `verity run`: execute every scenario and write reports
    pub async fn run(&mut self, args: &RunArgs) -> CliResult<RunReport> {
        let scenarios = Self::load(&args.files, args.base_url.as_deref())?;
        let runner = ScenarioRunner::new(runner_config(args));
        let jobs = CliConfig::effective_jobs(args.jobs);
        info!(scenarios = scenarios.len(), jobs, "starting runs");

        self.reporter
            .start_progress(scenarios.len() as u64, "running scenarios");
        let results = match args.fixture {
            Some(ref fixture) => {
                let site = MockSite::from_file(fixture)
                    .map_err(|e| CliError::scenario(fixture.display().to_string(), e))?;
                runner
                    .run_many(&scenarios, jobs, |_: &Scenario| {
                        let site = site.clone();
                        async move { Ok::<_, VerityError>(MockSession::new(site)) }
                    })
                    .await
            }
            None => Self::run_in_browser(&runner, &scenarios, jobs, args).await?,
        };
        self.reporter.increment(scenarios.len() as u64);
        self.reporter.finish();

        let mut report = RunReport::new();
        for result in results {
            let run = result?;
            self.reporter.run_result(&run);
            report.push(run);
        }

        report.write_json_files(&args.output).map_err(|e| {
            CliError::report_generation(format!("{}: {e}", args.output.display()))
        })?;
        if let Some(ref junit) = args.junit {
            report.generate_junit(junit).map_err(|e| {
                CliError::report_generation(format!("{}: {e}", junit.display()))
            })?;
        }
        self.reporter.summary(&report);
        Ok(report)
    }

    #[cfg(feature = "browser")]
    async fn run_in_browser(
        runner: &ScenarioRunner,
        scenarios: &[Scenario],
        jobs: usize,
        args: &RunArgs,
    ) -> CliResult<Vec<verity::VerityResult<verity::RunResult>>> {
        let mut session = verity::SessionConfig::new().with_headless(args.headless);
        if args.no_sandbox {
            session = session.with_no_sandbox();
        }
        if let Some(ref chromium) = args.chromium {
            session = session.with_chromium_path(chromium);
        }
        Ok(runner
            .run_many(scenarios, jobs, |_: &Scenario| {
                let session = session.clone();
                async move { verity::ChromiumSession::launch(&session).await }
            })
            .await)
    }

    #[cfg(not(feature = "browser"))]
    async fn run_in_browser(
        _runner: &ScenarioRunner,
        _scenarios: &[Scenario],
        _jobs: usize,
        _args: &RunArgs,
    ) -> CliResult<Vec<verity::VerityResult<verity::RunResult>>> {
        Err(CliError::invalid_argument(
            "built without the `browser` feature; pass --fixture <site.yaml> or rebuild with --features browser",
        ))
    }
}

fn runner_config(args: &RunArgs) -> RunnerConfig {
    let mut builder = RunnerConfig::builder()
        .output_dir(args.output.clone())
        .step_timeout(Duration::from_millis(args.timeout_ms));
    if let Some(ms) = args.deadline_ms {
        builder = builder.run_deadline(Duration::from_millis(ms));
    }
    builder.build()
}

/// Numbered step listing for `verity list`
#[must_use]
pub fn render_listing(scenario: &Scenario) -> String {
    let mut out = format!("{} ({})\n", scenario.name, scenario.base_url);
    for (index, step) in scenario.steps.iter().enumerate() {
        out.push_str(&format!(
            "{:>3}. {:<8} {}{}\n",
            index + 1,
            step.kind.type_name(),
            step.label(),
            if step.soft { " [soft]" } else { "" }
        ));
    }
    out
}
