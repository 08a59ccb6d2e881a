//! Scenario definitions.
//!
//! A [`Scenario`] is a named, ordered list of [`Step`]s against one base URL.
//! It can be built in code or loaded from YAML:
//!
//! ```yaml
//! name: signin-password-toggle
//! base_url: http://localhost:8080
//! steps:
//!   - type: navigate
//!     path: /signin
//!   - type: locate
//!     bind: toggle
//!     locator: { by: label, label: Show password }
//!   - type: act
//!     action: click
//!     target: toggle
//!   - type: assert
//!     check: attribute_equals
//!     attribute: type
//!     expected: text
//!     locator: { by: css, selector: "input#password" }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::action::ActionKind;
use crate::assertion::Condition;
use crate::driver::Viewport;
use crate::locator::Locator;
use crate::result::{VerityError, VerityResult};
use crate::wait::WaitPolicy;

fn default_true() -> bool {
    true
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(b: &bool) -> bool {
    !*b
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Step variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// Load `path` relative to the base URL (or an absolute URL)
    Navigate {
        /// Path or absolute URL
        path: String,
        /// Navigation timeout in milliseconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Block until the policy resolves
    Wait {
        /// Policy
        #[serde(flatten)]
        policy: WaitPolicy,
        /// Bind the matches of an `element_appears` wait
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bind: Option<String>,
    },
    /// Resolve a locator and bind its matches to a name
    Locate {
        /// Binding name
        bind: String,
        /// What to find
        locator: Locator,
    },
    /// Perform an interaction
    Act {
        /// Interaction
        #[serde(flatten)]
        action: ActionKind,
        /// Binding to act on
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        /// Which match to use
        #[serde(default, skip_serializing_if = "is_zero")]
        nth: usize,
    },
    /// Evaluate a condition
    Assert {
        /// Condition
        #[serde(flatten)]
        condition: Condition,
        /// Binding to check
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        /// Locator resolved fresh for this check
        #[serde(default, skip_serializing_if = "Option::is_none")]
        locator: Option<Locator>,
        /// Which match single-element checks use
        #[serde(default, skip_serializing_if = "is_zero")]
        nth: usize,
    },
    /// Take a screenshot
    Capture {
        /// Evidence label
        label: String,
        /// Capture the full page instead of the viewport
        #[serde(default, skip_serializing_if = "is_false")]
        full_page: bool,
    },
}

impl StepKind {
    /// Short type name
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Navigate { .. } => "navigate",
            Self::Wait { .. } => "wait",
            Self::Locate { .. } => "locate",
            Self::Act { .. } => "act",
            Self::Assert { .. } => "assert",
            Self::Capture { .. } => "capture",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Navigate { path, .. } => write!(f, "navigate {path}"),
            Self::Wait { policy, bind } => {
                write!(f, "wait for {policy}")?;
                if let Some(bind) = bind {
                    write!(f, " as {bind}")?;
                }
                Ok(())
            }
            Self::Locate { bind, locator } => write!(f, "locate {bind} = {locator}"),
            Self::Act { action, target, .. } => match target {
                Some(target) => write!(f, "{action} {target}"),
                None => write!(f, "{action}"),
            },
            Self::Assert {
                condition,
                target,
                locator,
                ..
            } => match (target, locator) {
                (Some(target), _) => write!(f, "assert {target} {condition}"),
                (None, Some(locator)) => write!(f, "assert {locator} {condition}"),
                (None, None) => write!(f, "assert {condition}"),
            },
            Self::Capture { label, .. } => write!(f, "capture {label}"),
        }
    }
}

/// One step of a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Human-readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Record a failure but keep going
    #[serde(default, skip_serializing_if = "is_false")]
    pub soft: bool,
    /// What the step does
    #[serde(flatten)]
    pub kind: StepKind,
}

impl Step {
    /// Wrap a step kind
    #[must_use]
    pub const fn new(kind: StepKind) -> Self {
        Self {
            name: None,
            soft: false,
            kind,
        }
    }

    /// Navigate to `path`
    #[must_use]
    pub fn navigate(path: impl Into<String>) -> Self {
        Self::new(StepKind::Navigate {
            path: path.into(),
            timeout_ms: None,
        })
    }

    /// Wait on a policy
    #[must_use]
    pub const fn wait(policy: WaitPolicy) -> Self {
        Self::new(StepKind::Wait { policy, bind: None })
    }

    /// Wait for an element and bind it
    #[must_use]
    pub fn wait_for(bind: impl Into<String>, locator: impl Into<Locator>, timeout_ms: u64) -> Self {
        Self::new(StepKind::Wait {
            policy: WaitPolicy::element_appears(locator, timeout_ms),
            bind: Some(bind.into()),
        })
    }

    /// Locate and bind
    #[must_use]
    pub fn locate(bind: impl Into<String>, locator: impl Into<Locator>) -> Self {
        Self::new(StepKind::Locate {
            bind: bind.into(),
            locator: locator.into(),
        })
    }

    /// Page-level action
    #[must_use]
    pub const fn act(action: ActionKind) -> Self {
        Self::new(StepKind::Act {
            action,
            target: None,
            nth: 0,
        })
    }

    /// Element action on a binding
    #[must_use]
    pub fn act_on(action: ActionKind, target: impl Into<String>) -> Self {
        Self::new(StepKind::Act {
            action,
            target: Some(target.into()),
            nth: 0,
        })
    }

    /// Click a binding
    #[must_use]
    pub fn click(target: impl Into<String>) -> Self {
        Self::act_on(ActionKind::Click, target)
    }

    /// Assert on a binding
    #[must_use]
    pub fn assert(condition: Condition, target: impl Into<String>) -> Self {
        Self::new(StepKind::Assert {
            condition,
            target: Some(target.into()),
            locator: None,
            nth: 0,
        })
    }

    /// Assert on a freshly resolved locator
    #[must_use]
    pub fn assert_at(condition: Condition, locator: impl Into<Locator>) -> Self {
        Self::new(StepKind::Assert {
            condition,
            target: None,
            locator: Some(locator.into()),
            nth: 0,
        })
    }

    /// Assert on the page
    #[must_use]
    pub const fn assert_page(condition: Condition) -> Self {
        Self::new(StepKind::Assert {
            condition,
            target: None,
            locator: None,
            nth: 0,
        })
    }

    /// Capture evidence
    #[must_use]
    pub fn capture(label: impl Into<String>) -> Self {
        Self::new(StepKind::Capture {
            label: label.into(),
            full_page: false,
        })
    }

    /// Mark soft
    #[must_use]
    pub const fn soft(mut self) -> Self {
        self.soft = true;
        self
    }

    /// Name the step
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Pick the `nth` match for Act/Assert steps
    #[must_use]
    pub fn nth(mut self, n: usize) -> Self {
        match self.kind {
            StepKind::Act { ref mut nth, .. } | StepKind::Assert { ref mut nth, .. } => *nth = n,
            _ => {}
        }
        self
    }

    /// Display label: the name if set, otherwise a description of the step
    #[must_use]
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.kind.to_string())
    }
}

/// A named, ordered sequence of steps against one base URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name (also names evidence files)
    pub name: String,
    /// Base URL of the application
    pub base_url: String,
    /// Initial viewport
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
    /// Allow page scripts
    #[serde(default = "default_true")]
    pub javascript: bool,
    /// Steps in execution order
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Start building a scenario
    #[must_use]
    pub fn builder(name: impl Into<String>, base_url: impl Into<String>) -> ScenarioBuilder {
        ScenarioBuilder {
            scenario: Self {
                name: name.into(),
                base_url: base_url.into(),
                viewport: None,
                javascript: true,
                steps: Vec::new(),
            },
        }
    }

    /// Parse from YAML
    pub fn from_yaml(yaml: &str) -> VerityResult<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Load from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> VerityResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> VerityResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Replace the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Resolve a step path against the base URL
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        if path.contains("://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Check the scenario before any session is launched
    ///
    /// # Errors
    ///
    /// [`VerityError::InvalidScenario`] naming the first problem found.
    pub fn validate(&self) -> VerityResult<()> {
        if self.name.trim().is_empty() {
            return Err(VerityError::invalid("scenario name is empty"));
        }
        if !(self.base_url.starts_with("http://")
            || self.base_url.starts_with("https://")
            || self.base_url.starts_with("file://"))
        {
            return Err(VerityError::invalid(format!(
                "base URL {:?} is not absolute",
                self.base_url
            )));
        }
        if let Some(viewport) = self.viewport {
            if !viewport.is_valid() {
                return Err(VerityError::invalid(format!("viewport {viewport} is out of range")));
            }
        }
        if self.steps.is_empty() {
            return Err(VerityError::invalid(format!("scenario '{}' has no steps", self.name)));
        }

        let mut bound: HashSet<&str> = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            let at = |msg: String| {
                VerityError::invalid(format!("step {} ({}): {msg}", index + 1, step.label()))
            };
            match &step.kind {
                StepKind::Navigate { path, .. } => {
                    if path.trim().is_empty() {
                        return Err(at("empty path".into()));
                    }
                }
                StepKind::Wait { policy, bind } => {
                    if let Some(locator) = policy.locator() {
                        check_locator(locator).map_err(at)?;
                    }
                    if let Some(bind) = bind {
                        if policy.locator().is_none() {
                            return Err(at(format!(
                                "only element_appears waits can bind '{bind}'"
                            )));
                        }
                        bound.insert(bind.as_str());
                    }
                }
                StepKind::Locate { bind, locator } => {
                    if bind.trim().is_empty() {
                        return Err(at("empty binding name".into()));
                    }
                    check_locator(locator).map_err(at)?;
                    bound.insert(bind.as_str());
                }
                StepKind::Act { action, target, .. } => {
                    if let ActionKind::SetViewport { width, height } = action {
                        if !Viewport::new(*width, *height).is_valid() {
                            return Err(at(format!("viewport {width}x{height} is out of range")));
                        }
                    }
                    match (action.requires_target(), target) {
                        (true, None) => {
                            return Err(at(format!("{} needs a target", action.name())));
                        }
                        (true, Some(t)) if !bound.contains(t.as_str()) => {
                            return Err(at(format!("'{t}' is not bound by an earlier step")));
                        }
                        (false, Some(t)) => {
                            return Err(at(format!("{} takes no target (got '{t}')", action.name())));
                        }
                        _ => {}
                    }
                }
                StepKind::Assert {
                    condition,
                    target,
                    locator,
                    ..
                } => {
                    condition.validate().map_err(|e| at(e.to_string()))?;
                    if let Some(locator) = locator {
                        check_locator(locator).map_err(at)?;
                    }
                    match (condition.is_page_level(), target, locator) {
                        (_, Some(_), Some(_)) => {
                            return Err(at("use either target or locator, not both".into()));
                        }
                        (true, Some(_), _) | (true, _, Some(_)) => {
                            return Err(at(format!("'{condition}' checks the page, not an element")));
                        }
                        (false, None, None) => {
                            return Err(at(format!("'{condition}' needs a target or locator")));
                        }
                        (false, Some(t), None) if !bound.contains(t.as_str()) => {
                            return Err(at(format!("'{t}' is not bound by an earlier step")));
                        }
                        _ => {}
                    }
                }
                StepKind::Capture { label, .. } => {
                    if label.trim().is_empty() {
                        return Err(at("empty capture label".into()));
                    }
                }
            }
        }
        Ok(())
    }
}

fn check_locator(locator: &Locator) -> Result<(), String> {
    if locator.strategies.is_empty() {
        return Err("locator has no strategies".to_string());
    }
    match locator.within.as_deref() {
        Some(scope) => check_locator(scope),
        None => Ok(()),
    }
}

/// Builder for [`Scenario`]
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    scenario: Scenario,
}

impl ScenarioBuilder {
    /// Set the initial viewport
    #[must_use]
    pub const fn viewport(mut self, width: u32, height: u32) -> Self {
        self.scenario.viewport = Some(Viewport::new(width, height));
        self
    }

    /// Enable or disable page scripts
    #[must_use]
    pub const fn javascript(mut self, enabled: bool) -> Self {
        self.scenario.javascript = enabled;
        self
    }

    /// Append a step
    #[must_use]
    pub fn step(mut self, step: Step) -> Self {
        self.scenario.steps.push(step);
        self
    }

    /// Finish
    #[must_use]
    pub fn build(self) -> Scenario {
        self.scenario
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::locator::Selector;

    const SIGNIN: &str = r#"
name: signin-password-toggle
base_url: http://localhost:8080
steps:
  - type: navigate
    path: /signin
  - type: wait
    until: network_idle
    timeout_ms: 10000
    soft: true
  - type: locate
    bind: toggle
    locator: { by: label, label: Show password }
  - type: act
    action: click
    target: toggle
  - type: locate
    bind: hide
    locator: { by: label, label: Hide password }
  - type: assert
    check: visible
    target: hide
  - name: password now plain text
    type: assert
    check: attribute_equals
    attribute: type
    expected: text
    locator: { by: css, selector: "input#password" }
  - type: capture
    label: after-toggle
"#;

    mod parse_tests {
        use super::*;

        #[test]
        fn test_parse_signin_scenario() {
            let s = Scenario::from_yaml(SIGNIN).unwrap();
            assert_eq!(s.name, "signin-password-toggle");
            assert!(s.javascript);
            assert_eq!(s.steps.len(), 8);
            assert!(s.steps[1].soft);
            assert_eq!(
                s.steps[2].kind,
                StepKind::Locate {
                    bind: "toggle".into(),
                    locator: Locator::new(Selector::label("Show password")),
                }
            );
            assert_eq!(s.steps[3].kind, Step::click("toggle").kind);
            assert_eq!(s.steps[6].name.as_deref(), Some("password now plain text"));
            s.validate().unwrap();
        }

        #[test]
        fn test_yaml_round_trip_preserves_steps() {
            let s = Scenario::from_yaml(SIGNIN).unwrap();
            let again = Scenario::from_yaml(&s.to_yaml().unwrap()).unwrap();
            assert_eq!(s, again);
        }

        #[test]
        fn test_unknown_step_type_rejected() {
            let err = Scenario::from_yaml(
                "name: x\nbase_url: http://a\nsteps:\n  - type: teleport\n",
            )
            .unwrap_err();
            assert!(matches!(err, VerityError::Yaml(_)));
        }

        #[test]
        fn test_from_file() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("signin.yaml");
            std::fs::write(&path, SIGNIN).unwrap();
            assert_eq!(Scenario::from_file(&path).unwrap().steps.len(), 8);
            assert!(matches!(
                Scenario::from_file(dir.path().join("missing.yaml")),
                Err(VerityError::Io(_))
            ));
        }
    }

    mod url_tests {
        use super::*;

        #[test]
        fn test_url_join() {
            let s = Scenario::builder("x", "http://localhost:8080/").build();
            assert_eq!(s.url("/signin"), "http://localhost:8080/signin");
            assert_eq!(s.url("glossary"), "http://localhost:8080/glossary");
            assert_eq!(s.url("/"), "http://localhost:8080/");
            assert_eq!(s.url("https://other.test/a"), "https://other.test/a");
        }
    }

    mod validate_tests {
        use super::*;

        fn base() -> ScenarioBuilder {
            Scenario::builder("mobile-nav", "http://app.test").step(Step::navigate("/"))
        }

        #[test]
        fn test_builder_scenario_is_valid() {
            let s = base()
                .viewport(375, 667)
                .step(Step::wait_for(
                    "menu",
                    Selector::role_named("button", "Open main menu"),
                    5000,
                ))
                .step(Step::assert(Condition::Visible, "menu"))
                .step(Step::click("menu"))
                .build();
            s.validate().unwrap();
        }

        #[test]
        fn test_unbound_target_rejected() {
            let err = base().step(Step::click("menu")).build().validate().unwrap_err();
            assert!(err.to_string().contains("'menu' is not bound"));
        }

        #[test]
        fn test_binding_must_come_first() {
            let err = base()
                .step(Step::assert(Condition::Visible, "late"))
                .step(Step::locate("late", Selector::text("x")))
                .build()
                .validate()
                .unwrap_err();
            assert!(err.to_string().contains("step 2"));
        }

        #[test]
        fn test_relative_base_url_rejected() {
            let s = Scenario::builder("x", "localhost:8080")
                .step(Step::navigate("/"))
                .build();
            assert!(s.validate().is_err());
        }

        #[test]
        fn test_bad_viewport_rejected() {
            assert!(base().viewport(0, 10).build().validate().is_err());
            let err = base()
                .step(Step::act(ActionKind::SetViewport {
                    width: 99_999,
                    height: 1,
                }))
                .build()
                .validate()
                .unwrap_err();
            assert!(err.to_string().contains("out of range"));
        }

        #[test]
        fn test_empty_fallback_list_rejected() {
            let s = base()
                .step(Step::locate(
                    "x",
                    Locator {
                        strategies: vec![],
                        within: None,
                    },
                ))
                .build();
            assert!(s.validate().is_err());
        }

        #[test]
        fn test_page_condition_with_target_rejected() {
            let s = base()
                .step(Step::locate("x", Selector::text("x")))
                .step(Step::assert(
                    Condition::TitleMatches {
                        pattern: "Home".into(),
                    },
                    "x",
                ))
                .build();
            assert!(s.validate().is_err());
            let s = base()
                .step(Step::assert_page(Condition::TitleMatches {
                    pattern: "Home".into(),
                }))
                .build();
            s.validate().unwrap();
        }

        #[test]
        fn test_element_action_without_target_rejected() {
            let s = base().step(Step::act(ActionKind::Hover)).build();
            assert!(s.validate().unwrap_err().to_string().contains("needs a target"));
        }

        #[test]
        fn test_no_steps_rejected() {
            assert!(Scenario::builder("x", "http://a").build().validate().is_err());
        }
    }

    mod step_tests {
        use super::*;

        #[test]
        fn test_labels() {
            assert_eq!(Step::navigate("/signin").label(), "navigate /signin");
            assert_eq!(Step::click("menu").label(), "click menu");
            assert_eq!(
                Step::capture("after").named("evidence").label(),
                "evidence"
            );
        }

        #[test]
        fn test_nth_only_applies_to_act_and_assert() {
            let step = Step::click("links").nth(2);
            assert!(matches!(step.kind, StepKind::Act { nth: 2, .. }));
            let step = Step::navigate("/").nth(2);
            assert_eq!(step, Step::navigate("/"));
        }
    }
}
