//! Wait policies: decide when a scenario may proceed.
//!
//! Every policy resolves to [`WaitState::Satisfied`] or [`WaitState::TimedOut`].
//! Condition waits poll the page at a fixed interval; all of them, including
//! [`WaitPolicy::FixedDelay`], stop early when the run's external deadline
//! expires.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::driver::{PageDriver, ReadyState};
use crate::locator::{Locator, Resolution};
use crate::result::VerityResult;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for wait operations (30 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;

/// Default polling interval (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Network idle threshold (500ms without requests)
pub const NETWORK_IDLE_THRESHOLD_MS: u64 = 500;

// =============================================================================
// LOAD STATE
// =============================================================================

/// Page lifecycle states a wait can target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    /// `DOMContentLoaded` fired (document fully parsed)
    DomContentLoaded,
    /// `load` fired
    #[default]
    Load,
}

impl LoadState {
    /// Get the JavaScript event name for this load state
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::DomContentLoaded => "DOMContentLoaded",
        }
    }

    /// Whether the page's ready state satisfies this load state
    #[must_use]
    pub fn reached(&self, ready: ReadyState) -> bool {
        match self {
            Self::DomContentLoaded => ready >= ReadyState::Interactive,
            Self::Load => ready == ReadyState::Complete,
        }
    }
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.event_name())
    }
}

// =============================================================================
// POLICY
// =============================================================================

/// When a Wait step lets the scenario continue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "until", rename_all = "snake_case")]
pub enum WaitPolicy {
    /// Sleep for a fixed duration; never times out on its own
    FixedDelay {
        /// Delay in milliseconds
        ms: u64,
    },
    /// No network activity for the quiet window
    NetworkIdle {
        /// Timeout in milliseconds (runner default when absent)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Locator yields a non-empty result
    ElementAppears {
        /// What to look for
        locator: Locator,
        /// Timeout in milliseconds (runner default when absent)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Page reports the lifecycle state
    LoadState {
        /// Target state
        #[serde(default)]
        state: LoadState,
        /// Timeout in milliseconds (runner default when absent)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
}

impl WaitPolicy {
    /// Fixed delay
    #[must_use]
    pub const fn fixed_delay(ms: u64) -> Self {
        Self::FixedDelay { ms }
    }

    /// Network idle with a timeout
    #[must_use]
    pub const fn network_idle(timeout_ms: u64) -> Self {
        Self::NetworkIdle {
            timeout_ms: Some(timeout_ms),
        }
    }

    /// Element appearance with a timeout
    #[must_use]
    pub fn element_appears(locator: impl Into<Locator>, timeout_ms: u64) -> Self {
        Self::ElementAppears {
            locator: locator.into(),
            timeout_ms: Some(timeout_ms),
        }
    }

    /// Load state with a timeout
    #[must_use]
    pub const fn load_state(state: LoadState, timeout_ms: u64) -> Self {
        Self::LoadState {
            state,
            timeout_ms: Some(timeout_ms),
        }
    }

    /// Configured time limit; the delay itself for a fixed delay
    #[must_use]
    pub const fn timeout_ms(&self) -> Option<u64> {
        match self {
            Self::FixedDelay { ms } => Some(*ms),
            Self::NetworkIdle { timeout_ms }
            | Self::ElementAppears { timeout_ms, .. }
            | Self::LoadState { timeout_ms, .. } => *timeout_ms,
        }
    }

    /// Locator polled by this policy, if any
    #[must_use]
    pub const fn locator(&self) -> Option<&Locator> {
        match self {
            Self::ElementAppears { locator, .. } => Some(locator),
            _ => None,
        }
    }
}

impl std::fmt::Display for WaitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FixedDelay { ms } => write!(f, "{ms}ms delay"),
            Self::NetworkIdle { .. } => f.write_str("network idle"),
            Self::ElementAppears { locator, .. } => write!(f, "{locator}"),
            Self::LoadState { state, .. } => write!(f, "load state '{state}'"),
        }
    }
}

// =============================================================================
// OPTIONS
// =============================================================================

/// Options shared by every wait in a run
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Timeout in milliseconds when the policy does not carry one
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
    /// Quiet window for network idle in milliseconds
    pub quiet_window_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            quiet_window_ms: NETWORK_IDLE_THRESHOLD_MS,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Set network quiet window in milliseconds
    #[must_use]
    pub const fn with_quiet_window(mut self, quiet_window_ms: u64) -> Self {
        self.quiet_window_ms = quiet_window_ms;
        self
    }

    /// Get poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// =============================================================================
// OUTCOME
// =============================================================================

/// Wait lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    /// Not yet decided
    Pending,
    /// Condition observed
    Satisfied,
    /// Deadline reached first
    TimedOut,
}

/// Result of a wait operation
#[derive(Debug, Clone)]
pub struct WaitResult {
    /// Terminal state
    pub state: WaitState,
    /// Time spent waiting
    pub elapsed: Duration,
    /// Description of what was waited for
    pub waited_for: String,
    /// Matches that satisfied an element wait
    pub found: Option<Resolution>,
}

impl WaitResult {
    /// Create a successful wait result
    #[must_use]
    pub fn success(elapsed: Duration, waited_for: impl Into<String>) -> Self {
        Self {
            state: WaitState::Satisfied,
            elapsed,
            waited_for: waited_for.into(),
            found: None,
        }
    }

    /// Create a timeout wait result
    #[must_use]
    pub fn timeout(elapsed: Duration, waited_for: impl Into<String>) -> Self {
        Self {
            state: WaitState::TimedOut,
            elapsed,
            waited_for: waited_for.into(),
            found: None,
        }
    }

    /// Whether the condition was observed
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        self.state == WaitState::Satisfied
    }
}

// =============================================================================
// WAITER
// =============================================================================

/// Executes wait policies against a page
#[derive(Debug, Clone, Default)]
pub struct Waiter {
    options: WaitOptions,
    deadline: Option<Instant>,
}

impl Waiter {
    /// Create a waiter
    #[must_use]
    pub const fn new(options: WaitOptions) -> Self {
        Self {
            options,
            deadline: None,
        }
    }

    /// Cap every wait at an external deadline
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Effective budget: the requested timeout clipped to the external deadline
    fn budget(&self, timeout: Duration) -> Duration {
        self.deadline.map_or(timeout, |deadline| {
            timeout.min(deadline.saturating_duration_since(Instant::now()))
        })
    }

    fn timeout_for(&self, timeout_ms: Option<u64>) -> Duration {
        Duration::from_millis(timeout_ms.unwrap_or(self.options.timeout_ms))
    }

    /// Run a policy to completion
    ///
    /// # Errors
    ///
    /// Driver failures while polling propagate (e.g. a session crash or a
    /// stale context when no document is loaded). Timing out is not an
    /// error; it is reported in the returned [`WaitResult`].
    pub async fn wait<P>(
        &self,
        policy: &WaitPolicy,
        page: &P,
        run_id: Uuid,
    ) -> VerityResult<WaitResult>
    where
        P: PageDriver + ?Sized,
    {
        match policy {
            WaitPolicy::FixedDelay { ms } => Ok(self.fixed_delay(Duration::from_millis(*ms)).await),
            WaitPolicy::NetworkIdle { timeout_ms } => {
                self.network_idle(page, self.timeout_for(*timeout_ms)).await
            }
            WaitPolicy::ElementAppears {
                locator,
                timeout_ms,
            } => {
                self.element_appears(page, locator, self.timeout_for(*timeout_ms), run_id)
                    .await
            }
            WaitPolicy::LoadState { state, timeout_ms } => {
                self.load_state(page, *state, self.timeout_for(*timeout_ms))
                    .await
            }
        }
    }

    /// Sleep for `delay`, cut short only by the external deadline
    pub async fn fixed_delay(&self, delay: Duration) -> WaitResult {
        let start = Instant::now();
        let budget = self.budget(delay);
        tokio::time::sleep(budget).await;
        let what = format!("{}ms delay", delay.as_millis());
        if budget < delay {
            WaitResult::timeout(start.elapsed(), what)
        } else {
            WaitResult::success(start.elapsed(), what)
        }
    }

    /// Wait until no request has been in flight or completed for the quiet window
    pub async fn network_idle<P>(&self, page: &P, timeout: Duration) -> VerityResult<WaitResult>
    where
        P: PageDriver + ?Sized,
    {
        let start = Instant::now();
        let budget = self.budget(timeout);
        let quiet = Duration::from_millis(self.options.quiet_window_ms);
        let mut last = page.network_activity().await?;
        let mut quiet_since = start;

        loop {
            let now = Instant::now();
            if last.in_flight == 0 && now.duration_since(quiet_since) >= quiet {
                return Ok(WaitResult::success(start.elapsed(), "network idle"));
            }
            if now.duration_since(start) >= budget {
                return Ok(WaitResult::timeout(start.elapsed(), "network idle"));
            }
            self.pause(start, budget).await;

            let current = page.network_activity().await?;
            if current.in_flight > 0 || current.completed != last.completed {
                quiet_since = Instant::now();
            }
            debug!(
                in_flight = current.in_flight,
                completed = current.completed,
                "network poll"
            );
            last = current;
        }
    }

    /// Poll the locator until it matches something
    pub async fn element_appears<P>(
        &self,
        page: &P,
        locator: &Locator,
        timeout: Duration,
        run_id: Uuid,
    ) -> VerityResult<WaitResult>
    where
        P: PageDriver + ?Sized,
    {
        let start = Instant::now();
        let budget = self.budget(timeout);
        let what = locator.to_string();
        let mut polls = 0u32;

        loop {
            let resolution = locator.resolve(page, run_id).await?;
            polls += 1;
            if !resolution.is_empty() {
                debug!(locator = %what, polls, matches = resolution.len(), "element appeared");
                let mut result = WaitResult::success(start.elapsed(), what);
                result.found = Some(resolution);
                return Ok(result);
            }
            if start.elapsed() >= budget {
                debug!(locator = %what, polls, "element never appeared");
                return Ok(WaitResult::timeout(start.elapsed(), what));
            }
            self.pause(start, budget).await;
        }
    }

    /// Poll `document.readyState` until it reaches `state`
    pub async fn load_state<P>(
        &self,
        page: &P,
        state: LoadState,
        timeout: Duration,
    ) -> VerityResult<WaitResult>
    where
        P: PageDriver + ?Sized,
    {
        let start = Instant::now();
        let budget = self.budget(timeout);
        let what = format!("load state '{state}'");

        loop {
            let ready = page.ready_state().await?;
            if state.reached(ready) {
                return Ok(WaitResult::success(start.elapsed(), what));
            }
            if start.elapsed() >= budget {
                return Ok(WaitResult::timeout(start.elapsed(), what));
            }
            self.pause(start, budget).await;
        }
    }

    /// Sleep one poll interval without overshooting the budget
    async fn pause(&self, start: Instant, budget: Duration) {
        let remaining = budget.saturating_sub(start.elapsed());
        tokio::time::sleep(self.options.poll_interval().min(remaining)).await;
    }
}
