//! Assertion engine: pure reads against the current document.
//!
//! A failed check is data ([`AssertionOutcome::Fail`]), not an error. Errors
//! are reserved for checks that could not be evaluated at all, such as a
//! stale element reference or a dead session.

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::driver::PageDriver;
use crate::locator::ElementRef;
use crate::result::{VerityError, VerityResult};

/// Conditions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Condition {
    /// Target exists and is visible
    Visible,
    /// No target matched, or none of the matches is visible
    Hidden,
    /// Attribute `attribute` equals `expected`
    AttributeEquals {
        /// Attribute name
        attribute: String,
        /// Expected value
        expected: String,
    },
    /// Text content contains `expected`
    TextContains {
        /// Expected substring
        expected: String,
    },
    /// Trimmed text content equals `expected`
    TextEquals {
        /// Expected text
        expected: String,
    },
    /// Document title matches the regex `pattern`
    TitleMatches {
        /// Regular expression
        pattern: String,
    },
    /// At least `n` elements matched
    CountAtLeast {
        /// Minimum count
        n: usize,
    },
}

impl Condition {
    /// Whether the condition reads the page rather than an element
    #[must_use]
    pub const fn is_page_level(&self) -> bool {
        matches!(self, Self::TitleMatches { .. })
    }

    /// Whether the condition considers every match rather than a single one
    #[must_use]
    pub const fn is_collective(&self) -> bool {
        matches!(self, Self::Hidden | Self::CountAtLeast { .. })
    }

    /// Compile-time checks that need no page
    pub fn validate(&self) -> VerityResult<()> {
        if let Self::TitleMatches { pattern } = self {
            Regex::new(pattern).map_err(|e| {
                VerityError::invalid(format!("title pattern {pattern:?} does not compile: {e}"))
            })?;
        }
        if let Self::AttributeEquals { attribute, .. } = self {
            if attribute.trim().is_empty() {
                return Err(VerityError::invalid("attribute name is empty"));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Visible => f.write_str("visible"),
            Self::Hidden => f.write_str("hidden"),
            Self::AttributeEquals {
                attribute,
                expected,
            } => write!(f, "[{attribute}] == {expected:?}"),
            Self::TextContains { expected } => write!(f, "text contains {expected:?}"),
            Self::TextEquals { expected } => write!(f, "text == {expected:?}"),
            Self::TitleMatches { pattern } => write!(f, "title =~ /{pattern}/"),
            Self::CountAtLeast { n } => write!(f, "count >= {n}"),
        }
    }
}

/// What an assertion reads
#[derive(Debug, Clone, Copy)]
pub enum Subject<'a> {
    /// The page itself
    Page,
    /// Matches of a locator, in DOM order; `nth` picks the element for single-element checks
    Elements {
        /// Matches
        refs: &'a [ElementRef],
        /// Index used by single-element checks
        nth: usize,
    },
}

/// Result of a check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AssertionOutcome {
    /// Condition holds
    Pass,
    /// Condition does not hold
    Fail {
        /// Observed value
        actual: String,
        /// Expected value
        expected: String,
    },
}

impl AssertionOutcome {
    fn fail(actual: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::Fail {
            actual: actual.into(),
            expected: expected.into(),
        }
    }

    /// Whether the check passed
    #[must_use]
    pub const fn passed(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

impl std::fmt::Display for AssertionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => f.write_str("pass"),
            Self::Fail { actual, expected } => {
                write!(f, "expected {expected}, got {actual}")
            }
        }
    }
}

/// Evaluates conditions for one run
#[derive(Debug, Clone, Copy)]
pub struct AssertionEngine {
    run_id: Uuid,
}

impl AssertionEngine {
    /// Create an engine bound to a run
    #[must_use]
    pub const fn new(run_id: Uuid) -> Self {
        Self { run_id }
    }

    /// Evaluate `condition` against `subject`
    ///
    /// # Errors
    ///
    /// [`VerityError::StaleContext`] when an element reference no longer belongs
    /// to the live document, [`VerityError::InvalidScenario`] when the condition
    /// does not fit the subject, and driver failures.
    pub async fn check<P>(
        &self,
        page: &P,
        condition: &Condition,
        subject: Subject<'_>,
    ) -> VerityResult<AssertionOutcome>
    where
        P: PageDriver + ?Sized,
    {
        if let Condition::TitleMatches { pattern } = condition {
            let re = Regex::new(pattern)
                .map_err(|e| VerityError::invalid(format!("bad title pattern: {e}")))?;
            let title = page.title().await?;
            return Ok(if re.is_match(&title) {
                AssertionOutcome::Pass
            } else {
                AssertionOutcome::fail(format!("{title:?}"), format!("title matching /{pattern}/"))
            });
        }

        let Subject::Elements { refs, nth } = subject else {
            return Err(VerityError::invalid(format!(
                "'{condition}' needs an element target"
            )));
        };
        let epoch = page.epoch();
        for r in refs {
            r.ensure_fresh(self.run_id, epoch)?;
        }

        match condition {
            Condition::Hidden => {
                let mut shown = 0usize;
                for r in refs {
                    if page.is_visible(&r.handle).await? {
                        shown += 1;
                    }
                }
                Ok(if shown == 0 {
                    AssertionOutcome::Pass
                } else {
                    AssertionOutcome::fail(format!("{shown} visible element(s)"), "hidden")
                })
            }
            Condition::CountAtLeast { n } => Ok(if refs.len() >= *n {
                AssertionOutcome::Pass
            } else {
                AssertionOutcome::fail(refs.len().to_string(), format!("at least {n}"))
            }),
            single => {
                let Some(target) = refs.get(nth) else {
                    return Ok(AssertionOutcome::fail(
                        format!("{} match(es), no element at index {nth}", refs.len()),
                        single.to_string(),
                    ));
                };
                self.check_element(page, single, target).await
            }
        }
    }

    async fn check_element<P>(
        &self,
        page: &P,
        condition: &Condition,
        target: &ElementRef,
    ) -> VerityResult<AssertionOutcome>
    where
        P: PageDriver + ?Sized,
    {
        let handle = &target.handle;
        let outcome = match condition {
            Condition::Visible => {
                if page.is_visible(handle).await? {
                    AssertionOutcome::Pass
                } else {
                    AssertionOutcome::fail("not visible", "visible")
                }
            }
            Condition::AttributeEquals {
                attribute,
                expected,
            } => match page.attribute(handle, attribute).await? {
                Some(ref actual) if actual == expected => AssertionOutcome::Pass,
                Some(actual) => AssertionOutcome::fail(
                    format!("{attribute}={actual:?}"),
                    format!("{attribute}={expected:?}"),
                ),
                None => AssertionOutcome::fail(
                    format!("no {attribute} attribute"),
                    format!("{attribute}={expected:?}"),
                ),
            },
            Condition::TextContains { expected } => {
                let text = page.text_content(handle).await?;
                if text.contains(expected.as_str()) {
                    AssertionOutcome::Pass
                } else {
                    AssertionOutcome::fail(
                        format!("{text:?}"),
                        format!("text containing {expected:?}"),
                    )
                }
            }
            Condition::TextEquals { expected } => {
                let text = page.text_content(handle).await?;
                if text.trim() == expected.trim() {
                    AssertionOutcome::Pass
                } else {
                    AssertionOutcome::fail(format!("{:?}", text.trim()), format!("{expected:?}"))
                }
            }
            Condition::Hidden | Condition::CountAtLeast { .. } | Condition::TitleMatches { .. } => {
                return Err(VerityError::invalid(format!(
                    "'{condition}' is not a single-element check"
                )));
            }
        };
        Ok(outcome)
    }
}
