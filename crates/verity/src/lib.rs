//! Verity: scenario-driven browser verification harness
//!
//! A scenario is a named, ordered list of steps (navigate, wait, locate, act,
//! assert, capture) run against one browsing session. Failures are recorded,
//! not thrown; a diagnostic screenshot is taken whenever a run aborts or hits
//! a hard failure.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      ScenarioRunner                              │
//! │   Idle ──► Running ──► Completed | Aborted   (single teardown)   │
//! ├──────────────┬──────────────────┬───────────────────┬────────────┤
//! │  Waiter      │  ActionExecutor  │  AssertionEngine  │  Evidence  │
//! ├──────────────┴──────────────────┴───────────────────┴────────────┤
//! │                  Locator (ordered fallbacks)                     │
//! ├──────────────────────────────────────────────────────────────────┤
//! │     PageDriver / SessionDriver: MockPage | ChromiumPage (CDP)    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use verity::prelude::*;
//!
//! # async fn demo() -> VerityResult<()> {
//! let scenario = Scenario::builder("signin-password-toggle", "http://localhost:8080")
//!     .step(Step::navigate("/signin"))
//!     .step(Step::locate("toggle", Selector::label("Show password")))
//!     .step(Step::click("toggle"))
//!     .step(Step::assert_at(
//!         Condition::AttributeEquals {
//!             attribute: "type".into(),
//!             expected: "text".into(),
//!         },
//!         Selector::css("input#password"),
//!     ))
//!     .build();
//!
//! let session = MockSession::new(MockSite::from_file("site.yaml")?);
//! let result = ScenarioRunner::new(RunnerConfig::default())
//!     .run(&scenario, session)
//!     .await?;
//! assert!(result.is_success());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod action;
mod assertion;
#[cfg(feature = "browser")]
mod browser;
/// Automation driver boundary and the in-memory backend
pub mod driver;
mod evidence;
mod locator;
#[allow(clippy::format_push_string, clippy::needless_raw_string_hashes)]
mod report;
mod result;
/// Scenario execution state machine
pub mod runner;
mod scenario;
mod wait;

pub use action::{ActionExecutor, ActionKind};
pub use assertion::{AssertionEngine, AssertionOutcome, Condition, Subject};
#[cfg(feature = "browser")]
pub use browser::{ChromiumPage, ChromiumSession};
pub use driver::mock::{MockSession, MockSite};
pub use driver::{
    ElementHandle, NetworkActivity, PageDriver, PageOptions, ReadyState, SessionConfig,
    SessionDriver, Viewport,
};
pub use evidence::{file_stem, unique_stems, EvidenceCapture, EvidenceRecord, FAILURE_LABEL};
pub use locator::{ElementRef, Locator, Resolution, Selector, NODE_ATTRIBUTE};
pub use report::RunReport;
pub use result::{ErrorKind, VerityError, VerityResult};
pub use runner::{
    RunResult, RunnerConfig, RunnerState, ScenarioRunner, StepCounts, StepFailure, StepOutcome,
    StepStatus,
};
pub use scenario::{Scenario, ScenarioBuilder, Step, StepKind};
pub use wait::{
    LoadState, WaitOptions, WaitPolicy, WaitResult, WaitState, Waiter, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_WAIT_TIMEOUT_MS, NETWORK_IDLE_THRESHOLD_MS,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::action::*;
    pub use super::assertion::*;
    #[cfg(feature = "browser")]
    pub use super::browser::*;
    pub use super::driver::mock::{MockSession, MockSite};
    pub use super::driver::{PageDriver, SessionConfig, SessionDriver, Viewport};
    pub use super::evidence::*;
    pub use super::locator::*;
    pub use super::report::*;
    pub use super::result::*;
    pub use super::runner::*;
    pub use super::scenario::*;
    pub use super::wait::*;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_exposes_scenario_surface() {
        let scenario = Scenario::builder("smoke", "http://localhost:8080")
            .step(Step::navigate("/"))
            .step(Step::wait(WaitPolicy::network_idle(10_000)).soft())
            .step(Step::capture("home"))
            .build();
        scenario.validate().unwrap();
        assert_eq!(RunnerConfig::default().output_dir.to_str(), Some("verity-output"));
    }

    #[test]
    fn test_error_display() {
        let err = VerityError::Timeout {
            ms: 5000,
            waited_for: "network idle".into(),
        };
        assert!(err.to_string().contains("5000"));
        assert_eq!(err.kind(), ErrorKind::TimedOut);
    }
}
