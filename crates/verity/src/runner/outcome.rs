//! Run states, per-step outcomes and the final run result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::evidence::EvidenceRecord;
use crate::result::{ErrorKind, VerityError};

// =============================================================================
// STATE
// =============================================================================

/// Runner lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerState {
    /// Not started
    #[default]
    Idle,
    /// Executing steps
    Running,
    /// Every step processed, or a hard failure short-circuited the rest
    Completed,
    /// Unrecoverable condition ended the run
    Aborted,
}

impl RunnerState {
    /// Completed or Aborted
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    /// Whether `self -> next` is a legal transition
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running | Self::Aborted)
                | (Self::Running, Self::Completed | Self::Aborted)
        )
    }
}

impl std::fmt::Display for RunnerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

// =============================================================================
// STEP OUTCOME
// =============================================================================

/// Why a step failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    /// Error classification
    pub kind: ErrorKind,
    /// Diagnostic message
    pub message: String,
    /// Observed value, for assertion failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    /// Expected value, for assertion failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
}

impl StepFailure {
    /// An assertion that evaluated to Fail
    #[must_use]
    pub fn assertion(actual: impl Into<String>, expected: impl Into<String>) -> Self {
        let (actual, expected) = (actual.into(), expected.into());
        Self {
            kind: ErrorKind::AssertionFailed,
            message: format!("expected {expected}, got {actual}"),
            actual: Some(actual),
            expected: Some(expected),
        }
    }
}

impl From<&VerityError> for StepFailure {
    fn from(err: &VerityError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            actual: None,
            expected: None,
        }
    }
}

impl std::fmt::Display for StepFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Status of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    /// Step succeeded
    Passed,
    /// Step failed
    Failed(StepFailure),
    /// Not executed because an earlier hard failure halted the run
    Skipped,
}

impl StepStatus {
    /// Short name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed(_) => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Failure details, if failed
    #[must_use]
    pub const fn failure(&self) -> Option<&StepFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Outcome of one step, appended to the run log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Zero-based step index
    pub index: usize,
    /// Step label
    pub name: String,
    /// Step type
    pub step_type: String,
    /// Whether the step was soft
    pub soft: bool,
    /// Result
    #[serde(flatten)]
    pub status: StepStatus,
    /// Extra information (matches found, URL loaded, evidence path)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Wall time spent on the step
    pub duration_ms: u64,
}

impl StepOutcome {
    /// Whether the step passed
    #[must_use]
    pub const fn passed(&self) -> bool {
        matches!(self.status, StepStatus::Passed)
    }

    /// Failed and not soft
    #[must_use]
    pub const fn is_hard_failure(&self) -> bool {
        !self.soft && matches!(self.status, StepStatus::Failed(_))
    }
}

// =============================================================================
// RUN RESULT
// =============================================================================

/// Tally of step statuses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCounts {
    /// Passed steps
    pub passed: usize,
    /// Failed steps (soft and hard)
    pub failed: usize,
    /// Soft failures among `failed`
    pub soft_failed: usize,
    /// Skipped steps
    pub skipped: usize,
}

impl StepCounts {
    /// Steps with an outcome
    #[must_use]
    pub const fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }
}

/// Result of one scenario run, produced once when the run ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Scenario name
    pub scenario: String,
    /// Run identifier
    pub run_id: Uuid,
    /// Terminal state
    pub state: RunnerState,
    /// Steps in the scenario
    pub total_steps: usize,
    /// Per-step outcomes in execution order
    pub outcomes: Vec<StepOutcome>,
    /// Screenshots taken
    pub evidence: Vec<EvidenceRecord>,
    /// Why the run aborted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// End time
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    /// Result for a run whose browsing session never came up
    #[must_use]
    pub fn launch_failed(scenario: &str, total_steps: usize, err: &VerityError) -> Self {
        let now = Utc::now();
        Self {
            scenario: scenario.to_string(),
            run_id: Uuid::new_v4(),
            state: RunnerState::Aborted,
            total_steps,
            outcomes: Vec::new(),
            evidence: Vec::new(),
            abort_reason: Some(err.to_string()),
            started_at: now,
            finished_at: now,
        }
    }

    /// Completed with no hard failure
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == RunnerState::Completed && self.hard_failures().next().is_none()
    }

    /// Process exit status for this run
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.is_success())
    }

    /// Failed steps that were not soft
    pub fn hard_failures(&self) -> impl Iterator<Item = &StepOutcome> {
        self.outcomes.iter().filter(|o| o.is_hard_failure())
    }

    /// Status tally
    #[must_use]
    pub fn counts(&self) -> StepCounts {
        self.outcomes
            .iter()
            .fold(StepCounts::default(), |mut counts, outcome| {
                match outcome.status {
                    StepStatus::Passed => counts.passed += 1,
                    StepStatus::Failed(_) => {
                        counts.failed += 1;
                        if outcome.soft {
                            counts.soft_failed += 1;
                        }
                    }
                    StepStatus::Skipped => counts.skipped += 1,
                }
                counts
            })
    }

    /// Wall time of the run
    #[must_use]
    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    /// Step statuses in order, for comparing runs without timestamps
    #[must_use]
    pub fn statuses(&self) -> Vec<(usize, StepStatus)> {
        self.outcomes
            .iter()
            .map(|o| (o.index, o.status.clone()))
            .collect()
    }
}
