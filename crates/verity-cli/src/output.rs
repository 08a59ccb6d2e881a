//! Output formatting and progress reporting

use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use verity::{RunReport, RunResult, RunnerState, StepOutcome, StepStatus};

/// Progress reporter for scenario execution
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
    /// Print every step, not only failures
    pub show_steps: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
            show_steps: true,
        }
    }

    /// Only print failing steps
    #[must_use]
    pub const fn failures_only(mut self) -> Self {
        self.show_steps = false;
        self
    }

    /// Start a progress bar over `total` scenarios
    pub fn start_progress(&mut self, total: u64, message: &str) {
        if self.quiet || !self.term.is_term() {
            return;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(120));
        self.progress_bar = Some(pb);
    }

    /// Increment progress
    pub fn increment(&self, delta: u64) {
        if let Some(ref pb) = self.progress_bar {
            pb.inc(delta);
        }
    }

    /// Finish progress bar
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_and_clear();
        }
    }

    fn write_line(&self, line: &str) {
        match self.progress_bar {
            Some(ref pb) => pb.suspend(|| {
                let _ = self.term.write_line(line);
            }),
            None => {
                let _ = self.term.write_line(line);
            }
        }
    }

    fn prefixed(&self, glyph: &str, plain: &str, paint: fn(&str) -> String, message: &str) {
        let prefix = if self.use_color {
            paint(glyph)
        } else {
            plain.to_string()
        };
        self.write_line(&format!("{prefix} {message}"));
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.prefixed("✓", "PASS", |g| style(g).green().bold().to_string(), message);
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // Failures print even in quiet mode
        self.prefixed("✗", "FAIL", |g| style(g).red().bold().to_string(), message);
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.prefixed("⚠", "WARN", |g| style(g).yellow().bold().to_string(), message);
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.prefixed("ℹ", "INFO", |g| style(g).blue().bold().to_string(), message);
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }

        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };

        self.write_line("");
        self.write_line(&styled);
    }

    /// Print one step outcome
    pub fn step(&self, outcome: &StepOutcome) {
        let mut line = format!("[{:02}] {}", outcome.index + 1, outcome.name);
        if let Some(ref detail) = outcome.detail {
            line.push_str(&format!(" ({detail})"));
        }
        match outcome.status {
            StepStatus::Passed => {
                if self.show_steps {
                    self.success(&line);
                }
            }
            StepStatus::Skipped => {
                if self.show_steps && !self.quiet {
                    let text = format!("SKIP {line}");
                    if self.use_color {
                        self.write_line(&style(text).dim().to_string());
                    } else {
                        self.write_line(&text);
                    }
                }
            }
            StepStatus::Failed(ref failure) => {
                let line = format!("{line}: {failure}");
                if outcome.soft {
                    self.warning(&format!("{line} (soft)"));
                } else {
                    self.failure(&line);
                }
            }
        }
    }

    /// Print a finished run: header, step lines, evidence and verdict
    pub fn run_result(&self, run: &RunResult) {
        self.header(&run.scenario);
        for outcome in &run.outcomes {
            self.step(outcome);
        }
        for record in &run.evidence {
            self.info(&format!(
                "evidence {}: {}",
                record.label,
                record.image_path.display()
            ));
        }

        let counts = run.counts();
        let tally = format!(
            "{}: {}/{} steps passed, {} failed ({} soft), {} skipped in {:.2}s",
            run.scenario,
            counts.passed,
            run.total_steps,
            counts.failed,
            counts.soft_failed,
            counts.skipped,
            run.duration().as_secs_f64()
        );
        match (run.state, &run.abort_reason) {
            (RunnerState::Aborted, Some(reason)) => self.failure(&format!("{tally}; aborted: {reason}")),
            _ if run.is_success() => self.success(&tally),
            _ => self.failure(&tally),
        }
    }

    /// Print the suite summary line
    pub fn summary(&self, report: &RunReport) {
        if self.quiet && report.is_success() {
            return;
        }

        self.write_line("");
        let line = report.summary();
        if self.use_color {
            let status = if report.is_success() {
                Style::new().green().bold().apply_to("PASSED")
            } else {
                Style::new().red().bold().apply_to("FAILED")
            };
            self.write_line(&format!("{status} {line}"));
        } else {
            let status = if report.is_success() { "PASSED" } else { "FAILED" };
            self.write_line(&format!("{status} {line}"));
        }
    }
}
