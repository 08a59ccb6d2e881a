//! Scenario runner configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::driver::Viewport;
use crate::wait::{
    WaitOptions, DEFAULT_POLL_INTERVAL_MS, DEFAULT_WAIT_TIMEOUT_MS, NETWORK_IDLE_THRESHOLD_MS,
};

/// Default evidence/report directory
pub const DEFAULT_OUTPUT_DIR: &str = "verity-output";

/// Configuration shared by every run of a runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Where screenshots and reports go
    pub output_dir: PathBuf,
    /// Timeout for navigations and waits that carry none
    pub step_timeout: Duration,
    /// Interval between condition polls
    pub poll_interval: Duration,
    /// Silence required for network idle
    pub quiet_window: Duration,
    /// Hard cap on a whole run
    pub run_deadline: Option<Duration>,
    /// Screenshot the page when a run aborts or hits a hard failure
    pub capture_on_failure: bool,
    /// Viewport for scenarios that do not set one
    pub viewport: Viewport,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            step_timeout: Duration::from_millis(DEFAULT_WAIT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            quiet_window: Duration::from_millis(NETWORK_IDLE_THRESHOLD_MS),
            run_deadline: None,
            capture_on_failure: true,
            viewport: Viewport::default(),
        }
    }
}

impl RunnerConfig {
    /// Create a builder
    #[must_use]
    pub fn builder() -> RunnerConfigBuilder {
        RunnerConfigBuilder::default()
    }

    /// Wait options derived from this config
    #[must_use]
    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions::new()
            .with_timeout(self.step_timeout.as_millis() as u64)
            .with_poll_interval(self.poll_interval.as_millis() as u64)
            .with_quiet_window(self.quiet_window.as_millis() as u64)
    }
}

/// Builder for [`RunnerConfig`]
#[derive(Debug, Clone, Default)]
pub struct RunnerConfigBuilder {
    config: RunnerConfig,
}

impl RunnerConfigBuilder {
    /// Set output directory
    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    /// Set default step timeout
    #[must_use]
    pub fn step_timeout(mut self, timeout: Duration) -> Self {
        self.config.step_timeout = timeout;
        self
    }

    /// Set polling interval
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set network quiet window
    #[must_use]
    pub fn quiet_window(mut self, window: Duration) -> Self {
        self.config.quiet_window = window;
        self
    }

    /// Cap every run at `deadline`
    #[must_use]
    pub fn run_deadline(mut self, deadline: Duration) -> Self {
        self.config.run_deadline = Some(deadline);
        self
    }

    /// Enable/disable the diagnostic screenshot
    #[must_use]
    pub fn capture_on_failure(mut self, enabled: bool) -> Self {
        self.config.capture_on_failure = enabled;
        self
    }

    /// Set default viewport
    #[must_use]
    pub fn viewport(mut self, viewport: Viewport) -> Self {
        self.config.viewport = viewport;
        self
    }

    /// Build the config
    #[must_use]
    pub fn build(self) -> RunnerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.output_dir, PathBuf::from("verity-output"));
        assert_eq!(config.step_timeout, Duration::from_secs(30));
        assert_eq!(config.quiet_window, Duration::from_millis(500));
        assert!(config.capture_on_failure);
        assert!(config.run_deadline.is_none());
    }

    #[test]
    fn test_builder() {
        let config = RunnerConfig::builder()
            .output_dir("/tmp/evidence")
            .step_timeout(Duration::from_secs(5))
            .poll_interval(Duration::from_millis(10))
            .quiet_window(Duration::from_millis(100))
            .run_deadline(Duration::from_secs(60))
            .capture_on_failure(false)
            .viewport(Viewport::MOBILE)
            .build();
        assert_eq!(config.output_dir, PathBuf::from("/tmp/evidence"));
        assert_eq!(config.run_deadline, Some(Duration::from_secs(60)));
        assert!(!config.capture_on_failure);
        assert_eq!(config.viewport, Viewport::MOBILE);
    }

    #[test]
    fn test_wait_options_follow_config() {
        let options = RunnerConfig::builder()
            .step_timeout(Duration::from_secs(5))
            .poll_interval(Duration::from_millis(10))
            .quiet_window(Duration::from_millis(100))
            .build()
            .wait_options();
        assert_eq!(options.timeout_ms, 5000);
        assert_eq!(options.poll_interval_ms, 10);
        assert_eq!(options.quiet_window_ms, 100);
    }
}
