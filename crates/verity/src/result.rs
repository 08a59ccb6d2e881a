//! Result and error types for Verity.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for Verity operations
pub type VerityResult<T> = Result<T, VerityError>;

/// Errors that can occur while driving a scenario
#[derive(Debug, Error)]
pub enum VerityError {
    /// The page or element reference no longer belongs to the live document
    #[error("Stale context: {message}")]
    StaleContext {
        /// Error message
        message: String,
    },

    /// A wait or locate exceeded its deadline
    #[error("Timed out after {ms}ms waiting for {waited_for}")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
        /// What was being waited for
        waited_for: String,
    },

    /// Action attempted on an absent or invisible element
    #[error("Target unavailable: {message}")]
    TargetUnavailable {
        /// Error message
        message: String,
    },

    /// The browser or session died underneath the run
    #[error("Session crashed: {message}")]
    SessionCrash {
        /// Error message
        message: String,
    },

    /// Browser launch error
    #[error("Failed to launch browser: {message}")]
    BrowserLaunch {
        /// Error message
        message: String,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Screenshot error
    #[error("Screenshot failed: {message}")]
    Screenshot {
        /// Error message
        message: String,
    },

    /// Scenario definition rejected before running
    #[error("Invalid scenario: {message}")]
    InvalidScenario {
        /// Error message
        message: String,
    },

    /// An action or assertion referenced a binding no step produced
    #[error("Unknown element binding '{name}'")]
    UnknownBinding {
        /// Binding name
        name: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

/// Serializable classification of an error, recorded in step outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`VerityError::StaleContext`]
    StaleContext,
    /// See [`VerityError::Timeout`]
    TimedOut,
    /// See [`VerityError::TargetUnavailable`]
    TargetUnavailable,
    /// See [`VerityError::SessionCrash`]
    SessionCrash,
    /// Navigation failed
    Navigation,
    /// Assertion evaluated to Fail
    AssertionFailed,
    /// Anything else (I/O, screenshot, configuration)
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::StaleContext => "stale-context",
            Self::TimedOut => "timed-out",
            Self::TargetUnavailable => "target-unavailable",
            Self::SessionCrash => "session-crash",
            Self::Navigation => "navigation",
            Self::AssertionFailed => "assertion-failed",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

impl VerityError {
    /// Create a stale context error
    #[must_use]
    pub fn stale(message: impl Into<String>) -> Self {
        Self::StaleContext {
            message: message.into(),
        }
    }

    /// Create a target unavailable error
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::TargetUnavailable {
            message: message.into(),
        }
    }

    /// Create a session crash error
    #[must_use]
    pub fn crash(message: impl Into<String>) -> Self {
        Self::SessionCrash {
            message: message.into(),
        }
    }

    /// Create an invalid scenario error
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidScenario {
            message: message.into(),
        }
    }

    /// Classify this error for the run log
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::StaleContext { .. } => ErrorKind::StaleContext,
            Self::Timeout { .. } => ErrorKind::TimedOut,
            Self::TargetUnavailable { .. } | Self::UnknownBinding { .. } => {
                ErrorKind::TargetUnavailable
            }
            Self::SessionCrash { .. } | Self::BrowserLaunch { .. } => ErrorKind::SessionCrash,
            Self::Navigation { .. } => ErrorKind::Navigation,
            Self::Screenshot { .. }
            | Self::InvalidScenario { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Yaml(_) => ErrorKind::Other,
        }
    }

    /// Whether this error ends the run regardless of the step's softness
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::SessionCrash | ErrorKind::Navigation
        )
    }
}
