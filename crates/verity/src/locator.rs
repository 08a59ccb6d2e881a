//! Locator strategy: semantic element descriptions resolved against the live page.
//!
//! # Design
//!
//! - **Fresh resolution**: every call re-queries the page; nothing is cached
//!   because the DOM may have mutated since the previous call.
//! - **Empty is not an error**: zero matches yields an empty sequence and the
//!   caller decides what that means (negative checks rely on this).
//! - **Ordered fallbacks**: a [`Locator`] holds a list of [`Selector`]s tried in
//!   declaration order; the first non-empty result wins.
//! - **Scoping**: a locator may be resolved `within` the first match of
//!   another locator.

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::driver::{ElementHandle, PageDriver};
use crate::result::{VerityError, VerityResult};

/// Attribute the CDP backend stamps on matched nodes so later calls can re-address them
pub const NODE_ATTRIBUTE: &str = "data-verity-node";

/// A single element description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Selector {
    /// ARIA role plus accessible name (e.g. `role=tab`, `name="Terms"`)
    Role {
        /// ARIA role, explicit or implicit
        role: String,
        /// Accessible name; `None` matches any name
        #[serde(default)]
        name: Option<String>,
        /// Require an exact (case-sensitive) name match
        #[serde(default)]
        exact: bool,
    },
    /// Explicit accessibility label (`aria-label` or an associated `<label>`)
    Label {
        /// Label text
        label: String,
        /// Require an exact (case-sensitive) match
        #[serde(default)]
        exact: bool,
    },
    /// Visible text substring
    Text {
        /// Text to look for
        text: String,
    },
    /// Input placeholder text
    Placeholder {
        /// Placeholder text
        placeholder: String,
    },
    /// `data-testid` attribute
    TestId {
        /// Test id value
        test_id: String,
    },
    /// Raw CSS selector
    Css {
        /// CSS selector
        selector: String,
    },
}

impl Selector {
    /// Role selector matching any accessible name
    #[must_use]
    pub fn role(role: impl Into<String>) -> Self {
        Self::Role {
            role: role.into(),
            name: None,
            exact: false,
        }
    }

    /// Role selector with an accessible name
    #[must_use]
    pub fn role_named(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Role {
            role: role.into(),
            name: Some(name.into()),
            exact: false,
        }
    }

    /// Accessibility label selector (substring, case-insensitive)
    #[must_use]
    pub fn label(label: impl Into<String>) -> Self {
        Self::Label {
            label: label.into(),
            exact: false,
        }
    }

    /// Accessibility label selector requiring an exact match
    #[must_use]
    pub fn exact_label(label: impl Into<String>) -> Self {
        Self::Label {
            label: label.into(),
            exact: true,
        }
    }

    /// Visible text selector
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Placeholder selector
    #[must_use]
    pub fn placeholder(placeholder: impl Into<String>) -> Self {
        Self::Placeholder {
            placeholder: placeholder.into(),
        }
    }

    /// Test id selector
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::TestId { test_id: id.into() }
    }

    /// CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css {
            selector: selector.into(),
        }
    }

    /// JavaScript predicate over an element bound to `el`
    #[must_use]
    pub fn to_js_predicate(&self) -> String {
        match self {
            Self::Role { role, name, exact } => {
                let role = js_string(role);
                match name {
                    None => format!("__verityRole(el) === {role}"),
                    Some(name) => format!(
                        "__verityRole(el) === {role} && __verityMatch(__verityName(el), {}, {exact})",
                        js_string(name)
                    ),
                }
            }
            Self::Label { label, exact } => format!(
                "__verityMatch(__verityLabel(el), {}, {exact})",
                js_string(label)
            ),
            Self::Text { text } => {
                let text = js_string(text);
                format!(
                    "(el.textContent || '').includes({text}) && \
                     !Array.from(el.children).some(c => (c.textContent || '').includes({text}))"
                )
            }
            Self::Placeholder { placeholder } => format!(
                "__verityMatch(el.getAttribute('placeholder') || '', {}, false)",
                js_string(placeholder)
            ),
            Self::TestId { test_id } => {
                format!("el.getAttribute('data-testid') === {}", js_string(test_id))
            }
            Self::Css { selector } => format!("el.matches({})", js_string(selector)),
        }
    }

    /// JavaScript expression evaluating to the matching elements under `root`, in DOM order
    #[must_use]
    pub fn to_query_all(&self, root_expr: &str) -> String {
        format!(
            "(() => {{ {JS_HELPERS} const root = {root_expr}; if (!root) return []; \
             return Array.from(root.querySelectorAll('*')).filter(el => {}); }})()",
            self.to_js_predicate()
        )
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Role {
                role,
                name: Some(name),
                ..
            } => write!(f, "role={role}[name={name:?}]"),
            Self::Role { role, name: None, .. } => write!(f, "role={role}"),
            Self::Label { label, .. } => write!(f, "label={label:?}"),
            Self::Text { text } => write!(f, "text={text:?}"),
            Self::Placeholder { placeholder } => write!(f, "placeholder={placeholder:?}"),
            Self::TestId { test_id } => write!(f, "test_id={test_id:?}"),
            Self::Css { selector } => write!(f, "css={selector}"),
        }
    }
}

fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Role, name and label helpers shared by every rendered query
const JS_HELPERS: &str = r#"
const __verityImplicit = { button: 'button', a: 'link', nav: 'navigation', footer: 'contentinfo',
  header: 'banner', main: 'main', textarea: 'textbox', select: 'combobox', img: 'img',
  h1: 'heading', h2: 'heading', h3: 'heading', h4: 'heading', h5: 'heading', h6: 'heading',
  ul: 'list', ol: 'list', li: 'listitem', dialog: 'dialog', form: 'form', table: 'table' };
const __verityRole = (el) => {
  const explicit = el.getAttribute('role');
  if (explicit) return explicit.trim().split(/\s+/)[0];
  const tag = el.tagName.toLowerCase();
  if (tag === 'input') {
    const type = (el.getAttribute('type') || 'text').toLowerCase();
    if (['button', 'submit', 'reset'].includes(type)) return 'button';
    if (type === 'checkbox') return 'checkbox';
    if (type === 'radio') return 'radio';
    return 'textbox';
  }
  if (tag === 'a' && !el.hasAttribute('href')) return '';
  return __verityImplicit[tag] || '';
};
const __verityLabel = (el) => {
  const aria = el.getAttribute('aria-label');
  if (aria && aria.trim()) return aria.trim();
  const ids = el.getAttribute('aria-labelledby');
  if (ids) {
    const text = ids.split(/\s+/).map(id => document.getElementById(id)).filter(Boolean)
      .map(n => n.textContent).join(' ').trim();
    if (text) return text;
  }
  if (el.id) {
    const label = document.querySelector(`label[for="${CSS.escape(el.id)}"]`);
    if (label) return label.textContent.trim();
  }
  return '';
};
const __verityName = (el) => {
  const label = __verityLabel(el);
  if (label) return label;
  const text = (el.innerText || el.textContent || '').replace(/\s+/g, ' ').trim();
  if (text) return text;
  return (el.getAttribute('title') || el.getAttribute('alt') || el.getAttribute('placeholder') || '').trim();
};
const __verityMatch = (actual, expected, exact) => exact
  ? actual === expected
  : actual.toLowerCase().includes(expected.toLowerCase());
"#;

/// An ordered list of selectors, optionally scoped within another locator
///
/// In scenario files a locator is either a bare selector
/// (`{ by: label, label: Show password }`) or a fallback list with an
/// optional scope (`{ any: [...], within: { by: css, selector: footer } }`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "LocatorRepr", into = "LocatorRepr")]
pub struct Locator {
    /// Strategies tried in order; first non-empty result wins
    pub strategies: Vec<Selector>,
    /// Resolve inside the first element matched by this locator
    pub within: Option<Box<Locator>>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum LocatorRepr {
    List {
        any: Vec<Selector>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        within: Option<Box<Locator>>,
    },
    Single(Selector),
}

impl From<LocatorRepr> for Locator {
    fn from(repr: LocatorRepr) -> Self {
        match repr {
            LocatorRepr::List { any, within } => Self {
                strategies: any,
                within,
            },
            LocatorRepr::Single(selector) => Self::new(selector),
        }
    }
}

impl From<Locator> for LocatorRepr {
    fn from(locator: Locator) -> Self {
        let Locator {
            mut strategies,
            within,
        } = locator;
        if strategies.len() == 1 && within.is_none() {
            if let Some(selector) = strategies.pop() {
                return Self::Single(selector);
            }
        }
        Self::List {
            any: strategies,
            within,
        }
    }
}

impl Locator {
    /// Create a locator from a single selector
    #[must_use]
    pub fn new(selector: Selector) -> Self {
        Self {
            strategies: vec![selector],
            within: None,
        }
    }

    /// Append a fallback strategy
    #[must_use]
    pub fn or(mut self, selector: Selector) -> Self {
        self.strategies.push(selector);
        self
    }

    /// Scope resolution within another locator
    #[must_use]
    pub fn within(mut self, scope: Self) -> Self {
        self.within = Some(Box::new(scope));
        self
    }

    /// Scope chain from the outermost locator down to `self`
    fn levels(&self) -> Vec<&Self> {
        let mut levels = vec![self];
        let mut current = self;
        while let Some(outer) = current.within.as_deref() {
            levels.push(outer);
            current = outer;
        }
        levels.reverse();
        levels
    }

    /// Resolve against the current document
    ///
    /// # Errors
    ///
    /// Returns [`VerityError::StaleContext`] when no document is loaded, and
    /// propagates driver failures. Zero matches is `Ok` with an empty result.
    pub async fn resolve<P>(&self, page: &P, run_id: Uuid) -> VerityResult<Resolution>
    where
        P: PageDriver + ?Sized,
    {
        if page.epoch() == 0 {
            return Err(VerityError::stale(format!(
                "cannot resolve {self}: no document has been loaded"
            )));
        }

        let mut scope: Option<ElementHandle> = None;
        let levels = self.levels();
        let last = levels.len() - 1;
        for (depth, level) in levels.into_iter().enumerate() {
            let mut found = Vec::new();
            let mut winner = None;
            for (index, selector) in level.strategies.iter().enumerate() {
                let handles = page.query_all(selector, scope.as_ref()).await?;
                debug!(%selector, depth, matches = handles.len(), "resolved strategy");
                if !handles.is_empty() {
                    found = handles;
                    winner = Some(index);
                    break;
                }
            }

            if depth == last {
                // a backend may re-mark a late navigation during the first query
                let live = page.epoch();
                if found.iter().any(|handle| handle.epoch != live) {
                    return Err(VerityError::stale(format!(
                        "document changed while resolving {self}"
                    )));
                }
                let refs = found
                    .into_iter()
                    .map(|handle| ElementRef { handle, run_id })
                    .collect();
                return Ok(Resolution {
                    refs,
                    strategy: winner,
                });
            }

            match found.into_iter().next() {
                Some(first) => scope = Some(first),
                None => return Ok(Resolution::default()),
            }
        }

        Ok(Resolution::default())
    }
}

impl From<Selector> for Locator {
    fn from(selector: Selector) -> Self {
        Self::new(selector)
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref scope) = self.within {
            write!(f, "{scope} >> ")?;
        }
        let parts: Vec<String> = self.strategies.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(" || "))
    }
}

/// Opaque element reference produced by a Locate step
///
/// Valid only within the run that produced it, and only until the page navigates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef {
    /// Driver-level handle
    pub handle: ElementHandle,
    /// Run that produced this reference
    pub run_id: Uuid,
}

impl ElementRef {
    /// Check this reference against the live run and document
    ///
    /// # Errors
    ///
    /// Returns [`VerityError::StaleContext`] if the reference came from another
    /// run or from a document that has since navigated away.
    pub fn ensure_fresh(&self, run_id: Uuid, epoch: u64) -> VerityResult<()> {
        if self.run_id != run_id {
            return Err(VerityError::stale(format!(
                "element {} belongs to run {}, not {run_id}",
                self.handle.node_id, self.run_id
            )));
        }
        if self.handle.epoch != epoch {
            return Err(VerityError::stale(format!(
                "element {} was taken from document #{}; page is now on #{epoch}",
                self.handle.node_id, self.handle.epoch
            )));
        }
        Ok(())
    }
}

/// Outcome of resolving a locator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Matches in DOM order
    pub refs: Vec<ElementRef>,
    /// Index of the strategy that produced the matches
    pub strategy: Option<usize>,
}

impl Resolution {
    /// Whether nothing matched
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Number of matches
    #[must_use]
    pub fn len(&self) -> usize {
        self.refs.len()
    }
}
