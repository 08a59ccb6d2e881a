//! Reporting: JSON run logs, JUnit XML and a one-line summary.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::evidence::unique_stems;
use crate::result::VerityResult;
use crate::runner::{RunResult, RunnerState, StepStatus};

/// Collection of run results
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Suite name
    pub suite_name: String,
    /// Runs in execution order
    pub runs: Vec<RunResult>,
}

impl RunReport {
    /// Create an empty report
    #[must_use]
    pub fn new() -> Self {
        Self {
            suite_name: "verity".to_string(),
            runs: Vec::new(),
        }
    }

    /// Set suite name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.suite_name = name.into();
        self
    }

    /// Add a run
    pub fn push(&mut self, run: RunResult) {
        self.runs.push(run);
    }

    /// Runs that completed with no hard failure
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.runs.iter().filter(|r| r.is_success()).count()
    }

    /// Number of runs
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.runs.len()
    }

    /// Every run succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.runs.iter().all(RunResult::is_success)
    }

    /// 0 when every run succeeded, 1 otherwise
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.is_success())
    }

    /// Summary line
    #[must_use]
    pub fn summary(&self) -> String {
        let aborted = self
            .runs
            .iter()
            .filter(|r| r.state == RunnerState::Aborted)
            .count();
        let mut line = format!(
            "{}: {}/{} scenarios passed",
            self.suite_name,
            self.passed_count(),
            self.total_count()
        );
        if aborted > 0 {
            line.push_str(&format!(", {aborted} aborted"));
        }
        line
    }

    /// Whole report as pretty JSON
    pub fn to_json(&self) -> VerityResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write one `<dir>/<scenario>.json` per run; returns the paths written
    ///
    /// Repeated names get the same `_N` suffix as their evidence files.
    pub fn write_json_files(&self, dir: &Path) -> VerityResult<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let stems = unique_stems(self.runs.iter().map(|r| r.scenario.as_str()));
        let mut written = Vec::with_capacity(self.runs.len());
        for (run, stem) in self.runs.iter().zip(stems) {
            let path = dir.join(format!("{stem}.json"));
            std::fs::write(&path, serde_json::to_string_pretty(run)?)?;
            written.push(path);
        }
        Ok(written)
    }

    /// Generate JUnit XML for CI integration
    pub fn generate_junit(&self, output_path: &Path) -> VerityResult<()> {
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(output_path, self.render_junit())?;
        Ok(())
    }

    /// Render JUnit XML: one testsuite per run, one testcase per step
    #[must_use]
    pub fn render_junit(&self) -> String {
        let mut xml = String::new();

        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(&format!(
            r#"<testsuites name="{}" tests="{}" failures="{}">"#,
            escape_xml(&self.suite_name),
            self.total_count(),
            self.total_count() - self.passed_count()
        ));
        xml.push('\n');

        for run in &self.runs {
            let counts = run.counts();
            let errors = usize::from(run.state == RunnerState::Aborted);
            xml.push_str(&format!(
                r#"  <testsuite name="{}" tests="{}" failures="{}" errors="{}" skipped="{}" time="{:.3}" timestamp="{}">"#,
                escape_xml(&run.scenario),
                counts.total() + errors,
                counts.failed,
                errors,
                counts.skipped,
                run.duration().as_secs_f64(),
                run.started_at.to_rfc3339()
            ));
            xml.push('\n');

            for outcome in &run.outcomes {
                xml.push_str(&format!(
                    r#"    <testcase name="{}" classname="{}" time="{:.3}">"#,
                    escape_xml(&format!("{:02} {}", outcome.index + 1, outcome.name)),
                    escape_xml(&run.scenario),
                    outcome.duration_ms as f64 / 1000.0
                ));
                xml.push('\n');
                match &outcome.status {
                    StepStatus::Passed => {}
                    StepStatus::Skipped => xml.push_str("      <skipped/>\n"),
                    StepStatus::Failed(failure) => {
                        xml.push_str(&format!(
                            r#"      <failure message="{}" type="{}">{}</failure>"#,
                            escape_xml(&failure.message),
                            failure.kind,
                            escape_xml(&failure.to_string())
                        ));
                        xml.push('\n');
                    }
                }
                xml.push_str("    </testcase>\n");
            }

            if let Some(reason) = &run.abort_reason {
                xml.push_str(&format!(
                    r#"    <testcase name="run" classname="{}" time="0.000">"#,
                    escape_xml(&run.scenario)
                ));
                xml.push('\n');
                xml.push_str(&format!(
                    r#"      <error message="{}" type="aborted"/>"#,
                    escape_xml(reason)
                ));
                xml.push('\n');
                xml.push_str("    </testcase>\n");
            }

            xml.push_str("  </testsuite>\n");
        }

        xml.push_str("</testsuites>\n");
        xml
    }
}

/// Escape XML special characters
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
