//! In-memory driver backed by a scripted document.
//!
//! A [`MockSite`] maps URLs to [`MockRoute`]s (title, element tree, reactions
//! to interactions, network behaviour). [`MockSession`] opens [`MockPage`]s over
//! a site; every navigation loads a fresh copy of the route's elements and
//! bumps the page epoch, so stale references behave as they do in a browser.
//!
//! Sites can be written in YAML and replayed with `verity run --fixture`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use async_trait::async_trait;

use super::{
    ElementHandle, NetworkActivity, PageDriver, PageOptions, ReadyState, SessionDriver, Viewport,
};
use crate::locator::Selector;
use crate::result::{VerityError, VerityResult};

/// PNG signature; mock screenshots start with it so evidence files look like images
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

// =============================================================================
// Site description
// =============================================================================

/// A scripted DOM node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockElement {
    /// Node id, also exposed as the `id` attribute
    pub id: String,
    /// Tag name
    pub tag: String,
    /// Explicit ARIA role
    pub role: Option<String>,
    /// `aria-label`
    pub label: Option<String>,
    /// Own text (children contribute their own)
    pub text: String,
    /// Placeholder attribute
    pub placeholder: Option<String>,
    /// CSS classes
    pub classes: Vec<String>,
    /// Other attributes
    pub attributes: BTreeMap<String, String>,
    /// Rendered visible (`display`/`visibility`)
    pub visible: bool,
    /// Parent node id
    pub parent: Option<String>,
    /// Only visible when the viewport is at least this wide
    pub min_width: Option<u32>,
    /// Only visible when the viewport is at most this wide
    pub max_width: Option<u32>,
    /// Absent from query results until this many queries have run on the document
    pub appears_after: usize,
    /// Inserted by page script; missing when JavaScript is disabled
    pub script: bool,
}

impl Default for MockElement {
    fn default() -> Self {
        Self {
            id: String::new(),
            tag: "div".to_string(),
            role: None,
            label: None,
            text: String::new(),
            placeholder: None,
            classes: Vec::new(),
            attributes: BTreeMap::new(),
            visible: true,
            parent: None,
            min_width: None,
            max_width: None,
            appears_after: 0,
            script: false,
        }
    }
}

impl MockElement {
    /// Create an element
    #[must_use]
    pub fn new(id: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag: tag.into().to_lowercase(),
            ..Self::default()
        }
    }

    /// Set explicit role
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Set `aria-label`
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set own text
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Set placeholder
    #[must_use]
    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    /// Add a CSS class
    #[must_use]
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    /// Set an attribute
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        set_attribute(&mut self, &name.into(), value.into());
        self
    }

    /// Render hidden
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Nest under `parent`
    #[must_use]
    pub fn inside(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Visible only at viewport widths >= `width`
    #[must_use]
    pub const fn min_width(mut self, width: u32) -> Self {
        self.min_width = Some(width);
        self
    }

    /// Visible only at viewport widths <= `width`
    #[must_use]
    pub const fn max_width(mut self, width: u32) -> Self {
        self.max_width = Some(width);
        self
    }

    /// Defer the element until `queries` lookups have run
    #[must_use]
    pub const fn appears_after(mut self, queries: usize) -> Self {
        self.appears_after = queries;
        self
    }

    /// Mark as script-rendered
    #[must_use]
    pub const fn script_rendered(mut self) -> Self {
        self.script = true;
        self
    }

    /// ARIA role, explicit or implied by the tag
    #[must_use]
    pub fn effective_role(&self) -> Option<String> {
        if let Some(ref role) = self.role {
            return role.split_whitespace().next().map(str::to_string);
        }
        let implicit = match self.tag.as_str() {
            "input" => match self.attributes.get("type").map(|t| t.to_lowercase()).as_deref() {
                Some("button" | "submit" | "reset") => "button",
                Some("checkbox") => "checkbox",
                Some("radio") => "radio",
                _ => "textbox",
            },
            "a" if self.attributes.contains_key("href") => "link",
            "button" => "button",
            "nav" => "navigation",
            "footer" => "contentinfo",
            "header" => "banner",
            "main" => "main",
            "textarea" => "textbox",
            "select" => "combobox",
            "img" => "img",
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => "heading",
            "ul" | "ol" => "list",
            "li" => "listitem",
            "dialog" => "dialog",
            "form" => "form",
            "table" => "table",
            _ => return None,
        };
        Some(implicit.to_string())
    }
}

/// Interaction that fires a reaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Element clicked
    Click,
    /// Pointer entered element
    Hover,
    /// Input value replaced
    Fill,
}

/// DOM mutation applied when a reaction fires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "do", rename_all = "snake_case")]
pub enum MockEffect {
    /// Set an attribute (`aria-label`, `placeholder` and `role` map onto their fields)
    SetAttribute {
        /// Target node
        element: String,
        /// Attribute name
        name: String,
        /// New value
        value: String,
    },
    /// Advance an attribute to the next value in `values`, wrapping around
    Cycle {
        /// Target node
        element: String,
        /// Attribute name
        name: String,
        /// Values in order
        values: Vec<String>,
    },
    /// Replace own text
    SetText {
        /// Target node
        element: String,
        /// New text
        text: String,
    },
    /// Make visible
    Show {
        /// Target node
        element: String,
    },
    /// Make hidden
    Hide {
        /// Target node
        element: String,
    },
    /// Add a node
    Insert {
        /// Node to add
        element: MockElement,
    },
    /// Remove a node and its descendants
    Remove {
        /// Target node
        element: String,
    },
    /// Change the document title
    SetTitle {
        /// New title
        title: String,
    },
    /// Navigate the page
    Navigate {
        /// Destination
        url: String,
    },
    /// Kill the page
    Crash {
        /// Crash reason
        message: String,
    },
}

/// Effects to apply when `element` sees `on`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockReaction {
    /// Interaction
    pub on: Trigger,
    /// Node id
    pub element: String,
    /// Mutations, applied in order
    pub effects: Vec<MockEffect>,
}

impl MockReaction {
    /// Create a reaction
    #[must_use]
    pub fn new(on: Trigger, element: impl Into<String>, effects: Vec<MockEffect>) -> Self {
        Self {
            on,
            element: element.into(),
            effects,
        }
    }
}

/// One scripted document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockRoute {
    /// Document title
    pub title: String,
    /// Nodes in document order
    pub elements: Vec<MockElement>,
    /// Interaction reactions
    pub reactions: Vec<MockReaction>,
    /// Network polls that report a request in flight after load
    pub busy_polls: usize,
    /// Keep a request in flight forever
    pub never_idle: bool,
    /// Reported `document.readyState`
    pub ready_state: ReadyState,
    /// Simulated load time
    pub load_ms: u64,
    /// Fail navigation with this message
    pub error: Option<String>,
    /// Element queries never answer, as when a modal `alert()` holds the page
    pub blocks_queries: bool,
}

impl MockRoute {
    /// Create a route with a title
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Add a node
    #[must_use]
    pub fn element(mut self, element: MockElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Add a reaction
    #[must_use]
    pub fn reaction(mut self, reaction: MockReaction) -> Self {
        self.reactions.push(reaction);
        self
    }

    /// Report in-flight requests for the first `polls` network polls
    #[must_use]
    pub const fn busy_for(mut self, polls: usize) -> Self {
        self.busy_polls = polls;
        self
    }

    /// Never go network-idle
    #[must_use]
    pub const fn never_idle(mut self) -> Self {
        self.never_idle = true;
        self
    }

    /// Never answer element queries
    #[must_use]
    pub const fn blocking_queries(mut self) -> Self {
        self.blocks_queries = true;
        self
    }

    /// Report a fixed ready state
    #[must_use]
    pub const fn with_ready_state(mut self, state: ReadyState) -> Self {
        self.ready_state = state;
        self
    }

    /// Take `ms` to load
    #[must_use]
    pub const fn loading_for(mut self, ms: u64) -> Self {
        self.load_ms = ms;
        self
    }

    /// Fail every navigation to this route
    #[must_use]
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }
}

/// A set of routes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockSite {
    /// Routes by absolute URL
    pub routes: BTreeMap<String, MockRoute>,
    /// Make every screenshot fail
    pub fail_screenshots: bool,
}

impl MockSite {
    /// Create an empty site
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route
    #[must_use]
    pub fn with_route(mut self, url: impl Into<String>, route: MockRoute) -> Self {
        self.routes.insert(url.into(), route);
        self
    }

    /// Make screenshots fail
    #[must_use]
    pub const fn with_failing_screenshots(mut self) -> Self {
        self.fail_screenshots = true;
        self
    }

    /// Parse a site from YAML
    pub fn from_yaml(yaml: &str) -> VerityResult<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Load a site from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> VerityResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Route for `url`, tolerating a trailing slash difference
    #[must_use]
    pub fn route(&self, url: &str) -> Option<&MockRoute> {
        self.routes.get(url).or_else(|| {
            let alt = url
                .strip_suffix('/')
                .map_or_else(|| format!("{url}/"), str::to_string);
            self.routes.get(&alt)
        })
    }
}

// =============================================================================
// Session
// =============================================================================

/// Open/close counters shared between a session, its pages and the test
#[derive(Debug, Default)]
pub struct MockStats {
    pages_opened: AtomicUsize,
    page_closes: AtomicUsize,
    session_closes: AtomicUsize,
}

impl MockStats {
    /// Pages opened
    #[must_use]
    pub fn pages_opened(&self) -> usize {
        self.pages_opened.load(Ordering::SeqCst)
    }

    /// `PageDriver::close` calls
    #[must_use]
    pub fn page_closes(&self) -> usize {
        self.page_closes.load(Ordering::SeqCst)
    }

    /// `SessionDriver::close` calls
    #[must_use]
    pub fn session_closes(&self) -> usize {
        self.session_closes.load(Ordering::SeqCst)
    }
}

/// Session over a [`MockSite`]
#[derive(Debug)]
pub struct MockSession {
    site: MockSite,
    stats: Arc<MockStats>,
    closed: bool,
    open_error: Option<String>,
}

impl MockSession {
    /// Create a session
    #[must_use]
    pub fn new(site: MockSite) -> Self {
        Self {
            site,
            stats: Arc::new(MockStats::default()),
            closed: false,
            open_error: None,
        }
    }

    /// Fail `new_page` with a session crash
    #[must_use]
    pub fn failing_new_page(mut self, message: impl Into<String>) -> Self {
        self.open_error = Some(message.into());
        self
    }

    /// Shared counters
    #[must_use]
    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl SessionDriver for MockSession {
    type Page = MockPage;

    async fn new_page(&mut self, options: &PageOptions) -> VerityResult<MockPage> {
        if self.closed {
            return Err(VerityError::crash("session is closed"));
        }
        if let Some(ref message) = self.open_error {
            return Err(VerityError::crash(message.clone()));
        }
        self.stats.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(MockPage::open(
            self.site.clone(),
            Arc::clone(&self.stats),
            options,
        ))
    }

    async fn close(&mut self) -> VerityResult<()> {
        self.closed = true;
        self.stats.session_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Page
// =============================================================================

/// Page over a [`MockSite`]
#[derive(Debug)]
pub struct MockPage {
    site: MockSite,
    stats: Arc<MockStats>,
    url: String,
    epoch: u64,
    title: String,
    elements: Vec<MockElement>,
    reactions: Vec<MockReaction>,
    busy_polls: usize,
    never_idle: bool,
    blocks_queries: bool,
    ready_state: ReadyState,
    viewport: Viewport,
    javascript: bool,
    scroll: (f64, f64),
    crashed: Option<String>,
    closed: bool,
    queries: AtomicUsize,
    network_polls: AtomicUsize,
    history: Mutex<Vec<String>>,
}

impl Default for MockPage {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPage {
    /// Standalone page over an empty site
    #[must_use]
    pub fn new() -> Self {
        Self::open(
            MockSite::default(),
            Arc::new(MockStats::default()),
            &PageOptions::default(),
        )
    }

    fn open(site: MockSite, stats: Arc<MockStats>, options: &PageOptions) -> Self {
        Self {
            site,
            stats,
            url: "about:blank".to_string(),
            epoch: 0,
            title: String::new(),
            elements: Vec::new(),
            reactions: Vec::new(),
            busy_polls: 0,
            never_idle: false,
            blocks_queries: false,
            ready_state: ReadyState::Complete,
            viewport: options.viewport,
            javascript: options.javascript_enabled,
            scroll: (0.0, 0.0),
            crashed: None,
            closed: false,
            queries: AtomicUsize::new(0),
            network_polls: AtomicUsize::new(0),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Add a simple route
    pub fn add_route(
        &mut self,
        url: impl Into<String>,
        title: impl Into<String>,
        elements: Vec<MockElement>,
    ) {
        let mut route = MockRoute::new(title);
        route.elements = elements;
        self.site.routes.insert(url.into(), route);
    }

    /// Add a fully described route
    pub fn insert_route(&mut self, url: impl Into<String>, route: MockRoute) {
        self.site.routes.insert(url.into(), route);
    }

    /// Load `url` immediately
    pub fn visit(&mut self, url: &str) -> VerityResult<()> {
        self.ensure_alive()?;
        let route = self
            .site
            .route(url)
            .cloned()
            .ok_or_else(|| VerityError::Navigation {
                url: url.to_string(),
                message: "net::ERR_CONNECTION_REFUSED".to_string(),
            })?;
        if let Some(message) = route.error {
            return Err(VerityError::Navigation {
                url: url.to_string(),
                message,
            });
        }

        self.url = url.to_string();
        self.epoch += 1;
        self.title = route.title;
        self.elements = route.elements;
        self.reactions = route.reactions;
        self.busy_polls = route.busy_polls;
        self.never_idle = route.never_idle;
        self.blocks_queries = route.blocks_queries;
        self.ready_state = route.ready_state;
        self.scroll = (0.0, 0.0);
        self.queries.store(0, Ordering::SeqCst);
        self.network_polls.store(0, Ordering::SeqCst);
        self.record(format!("goto:{url}"));
        debug!(url, epoch = self.epoch, "mock document loaded");
        Ok(())
    }

    /// Kill the page; every later call fails with a session crash
    pub fn crash(&mut self, message: impl Into<String>) {
        self.crashed = Some(message.into());
    }

    /// URL of the loaded document
    #[must_use]
    pub fn current_url(&self) -> &str {
        &self.url
    }

    /// Current viewport
    #[must_use]
    pub const fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Current window scroll offset
    #[must_use]
    pub const fn scroll_position(&self) -> (f64, f64) {
        self.scroll
    }

    /// Node by id in the live document
    #[must_use]
    pub fn element(&self, id: &str) -> Option<&MockElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    /// Shared open/close counters
    #[must_use]
    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.stats)
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    /// Check if method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.history().iter().any(|c| c.starts_with(method))
    }

    fn record(&self, call: String) {
        if let Ok(mut history) = self.history.lock() {
            history.push(call);
        }
    }

    fn ensure_alive(&self) -> VerityResult<()> {
        if self.closed {
            return Err(VerityError::crash("page is closed"));
        }
        if let Some(ref message) = self.crashed {
            return Err(VerityError::crash(message.clone()));
        }
        Ok(())
    }

    fn live(&self, handle: &ElementHandle) -> VerityResult<&MockElement> {
        self.ensure_alive()?;
        if handle.epoch != self.epoch {
            return Err(VerityError::stale(format!(
                "node {} is detached: document navigated",
                handle.node_id
            )));
        }
        self.element(&handle.node_id).ok_or_else(|| {
            VerityError::stale(format!("node {} is no longer attached", handle.node_id))
        })
    }

    fn handle(&self, element: &MockElement) -> ElementHandle {
        ElementHandle::new(&element.id, &element.tag, self.epoch)
    }

    fn parent_of(&self, element: &MockElement) -> Option<&MockElement> {
        element.parent.as_deref().and_then(|p| self.element(p))
    }

    fn ancestors<'a>(&'a self, element: &'a MockElement) -> Vec<&'a MockElement> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.parent_of(element);
        while let Some(node) = current {
            if !seen.insert(node.id.as_str()) {
                break;
            }
            chain.push(node);
            current = self.parent_of(node);
        }
        chain
    }

    fn children<'a>(&'a self, element: &'a MockElement) -> impl Iterator<Item = &'a MockElement> {
        self.elements
            .iter()
            .filter(move |e| e.parent.as_deref() == Some(element.id.as_str()))
    }

    fn rendered(&self, element: &MockElement, queries: usize) -> bool {
        (self.javascript || !element.script) && element.appears_after <= queries
    }

    fn shown(&self, element: &MockElement) -> bool {
        let width = self.viewport.width;
        element.visible
            && element.min_width.map_or(true, |min| width >= min)
            && element.max_width.map_or(true, |max| width <= max)
    }

    fn visible(&self, element: &MockElement) -> bool {
        let queries = self.queries.load(Ordering::SeqCst);
        self.rendered(element, queries)
            && self.shown(element)
            && self.ancestors(element).iter().all(|a| self.shown(a))
    }

    fn full_text(&self, element: &MockElement) -> String {
        let mut parts = Vec::new();
        if !element.text.is_empty() {
            parts.push(element.text.clone());
        }
        for child in self.children(element) {
            let text = self.full_text(child);
            if !text.is_empty() {
                parts.push(text);
            }
        }
        parts.join(" ")
    }

    fn accessible_name(&self, element: &MockElement) -> String {
        if let Some(label) = element.label.as_deref().filter(|l| !l.trim().is_empty()) {
            return label.trim().to_string();
        }
        let text = self.full_text(element);
        if !text.trim().is_empty() {
            return text.split_whitespace().collect::<Vec<_>>().join(" ");
        }
        element
            .attributes
            .get("title")
            .or_else(|| element.attributes.get("alt"))
            .cloned()
            .or_else(|| element.placeholder.clone())
            .unwrap_or_default()
    }

    fn matches(&self, selector: &Selector, element: &MockElement) -> bool {
        match selector {
            Selector::Role { role, name, exact } => {
                element.effective_role().as_deref() == Some(role.as_str())
                    && name
                        .as_deref()
                        .map_or(true, |n| text_match(&self.accessible_name(element), n, *exact))
            }
            Selector::Label { label, exact } => element
                .label
                .as_deref()
                .is_some_and(|actual| text_match(actual.trim(), label, *exact)),
            Selector::Text { text } => {
                self.full_text(element).contains(text.as_str())
                    && !self
                        .children(element)
                        .any(|c| self.full_text(c).contains(text.as_str()))
            }
            Selector::Placeholder { placeholder } => element
                .placeholder
                .as_deref()
                .is_some_and(|actual| text_match(actual, placeholder, false)),
            Selector::TestId { test_id } => {
                element.attributes.get("data-testid") == Some(test_id)
            }
            Selector::Css { selector } => css::matches(selector, element, |e| self.ancestors(e)),
        }
    }

    fn apply(&mut self, trigger: Trigger, node_id: &str) -> VerityResult<()> {
        if !self.javascript {
            return Ok(());
        }
        let effects: Vec<MockEffect> = self
            .reactions
            .iter()
            .filter(|r| r.on == trigger && r.element == node_id)
            .flat_map(|r| r.effects.clone())
            .collect();
        for effect in effects {
            self.apply_effect(effect)?;
        }
        Ok(())
    }

    fn apply_effect(&mut self, effect: MockEffect) -> VerityResult<()> {
        match effect {
            MockEffect::SetAttribute {
                element,
                name,
                value,
            } => {
                if let Some(node) = self.elements.iter_mut().find(|e| e.id == element) {
                    set_attribute(node, &name, value);
                }
            }
            MockEffect::Cycle {
                element,
                name,
                values,
            } => {
                if let Some(node) = self.elements.iter_mut().find(|e| e.id == element) {
                    let current = attribute(node, &name);
                    let next = current
                        .and_then(|c| values.iter().position(|v| *v == c))
                        .map_or(0, |i| (i + 1) % values.len().max(1));
                    if let Some(value) = values.get(next) {
                        set_attribute(node, &name, value.clone());
                    }
                }
            }
            MockEffect::SetText { element, text } => {
                if let Some(node) = self.elements.iter_mut().find(|e| e.id == element) {
                    node.text = text;
                }
            }
            MockEffect::Show { element } => self.set_visible(&element, true),
            MockEffect::Hide { element } => self.set_visible(&element, false),
            MockEffect::Insert { element } => self.elements.push(element),
            MockEffect::Remove { element } => {
                let doomed: HashSet<String> = self
                    .elements
                    .iter()
                    .filter(|e| e.id == element || self.ancestors(e).iter().any(|a| a.id == element))
                    .map(|e| e.id.clone())
                    .collect();
                self.elements.retain(|e| !doomed.contains(&e.id));
            }
            MockEffect::SetTitle { title } => self.title = title,
            MockEffect::Navigate { url } => self.visit(&url)?,
            MockEffect::Crash { message } => {
                self.crashed = Some(message.clone());
                return Err(VerityError::crash(message));
            }
        }
        Ok(())
    }

    fn set_visible(&mut self, id: &str, visible: bool) {
        if let Some(node) = self.elements.iter_mut().find(|e| e.id == id) {
            node.visible = visible;
        }
    }
}

fn text_match(actual: &str, expected: &str, exact: bool) -> bool {
    if exact {
        actual == expected
    } else {
        actual.to_lowercase().contains(&expected.to_lowercase())
    }
}

fn attribute(element: &MockElement, name: &str) -> Option<String> {
    match name {
        "id" => Some(element.id.clone()),
        "class" if !element.classes.is_empty() => Some(element.classes.join(" ")),
        "class" => None,
        "aria-label" => element.label.clone(),
        "placeholder" => element.placeholder.clone(),
        "role" => element.role.clone(),
        _ => element.attributes.get(name).cloned(),
    }
}

fn set_attribute(element: &mut MockElement, name: &str, value: String) {
    match name {
        "id" => element.id = value,
        "class" => element.classes = value.split_whitespace().map(str::to_string).collect(),
        "aria-label" => element.label = Some(value),
        "placeholder" => element.placeholder = Some(value),
        "role" => element.role = Some(value),
        _ => {
            element.attributes.insert(name.to_string(), value);
        }
    }
}

#[async_trait]
impl PageDriver for MockPage {
    fn epoch(&self) -> u64 {
        self.epoch
    }

    async fn goto(&mut self, url: &str, timeout: Duration) -> VerityResult<()> {
        self.ensure_alive()?;
        let load = Duration::from_millis(self.site.route(url).map_or(0, |r| r.load_ms));
        if load > timeout {
            tokio::time::sleep(timeout).await;
            return Err(VerityError::Navigation {
                url: url.to_string(),
                message: format!("load did not finish within {}ms", timeout.as_millis()),
            });
        }
        if !load.is_zero() {
            tokio::time::sleep(load).await;
        }
        self.visit(url)
    }

    async fn reload(&mut self, timeout: Duration) -> VerityResult<()> {
        self.ensure_alive()?;
        if self.epoch == 0 {
            return Err(VerityError::stale("nothing to reload"));
        }
        let url = self.url.clone();
        self.record("reload".to_string());
        self.goto(&url, timeout).await
    }

    async fn query_all(
        &self,
        selector: &Selector,
        scope: Option<&ElementHandle>,
    ) -> VerityResult<Vec<ElementHandle>> {
        self.ensure_alive()?;
        if self.blocks_queries {
            std::future::pending::<()>().await;
        }
        if let Some(scope) = scope {
            self.live(scope)?;
        }
        let queries = self.queries.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(self
            .elements
            .iter()
            .filter(|e| self.rendered(e, queries))
            .filter(|e| {
                scope.map_or(true, |s| {
                    self.ancestors(e).iter().any(|a| a.id == s.node_id)
                })
            })
            .filter(|e| self.matches(selector, e))
            .map(|e| self.handle(e))
            .collect())
    }

    async fn click(&mut self, element: &ElementHandle) -> VerityResult<()> {
        let node = self.live(element)?;
        if !self.visible(node) {
            return Err(VerityError::unavailable(format!(
                "node {} is not visible",
                element.node_id
            )));
        }
        self.record(format!("click:{}", element.node_id));
        self.apply(Trigger::Click, &element.node_id)
    }

    async fn hover(&mut self, element: &ElementHandle) -> VerityResult<()> {
        let node = self.live(element)?;
        if !self.visible(node) {
            return Err(VerityError::unavailable(format!(
                "node {} is not visible",
                element.node_id
            )));
        }
        self.record(format!("hover:{}", element.node_id));
        self.apply(Trigger::Hover, &element.node_id)
    }

    async fn fill(&mut self, element: &ElementHandle, value: &str) -> VerityResult<()> {
        let node = self.live(element)?;
        let editable = matches!(node.tag.as_str(), "input" | "textarea")
            || node.attributes.contains_key("contenteditable");
        if !editable {
            return Err(VerityError::unavailable(format!(
                "node {} <{}> is not editable",
                element.node_id, node.tag
            )));
        }
        self.record(format!("fill:{}={value}", element.node_id));
        if let Some(node) = self.elements.iter_mut().find(|e| e.id == element.node_id) {
            node.attributes.insert("value".to_string(), value.to_string());
        }
        self.apply(Trigger::Fill, &element.node_id)
    }

    async fn scroll_into_view(&mut self, element: &ElementHandle) -> VerityResult<()> {
        self.live(element)?;
        self.record(format!("scroll_into_view:{}", element.node_id));
        Ok(())
    }

    async fn scroll_to(&mut self, x: f64, y: f64) -> VerityResult<()> {
        self.ensure_alive()?;
        self.record(format!("scroll_to:{x},{y}"));
        self.scroll = (x, y);
        Ok(())
    }

    async fn set_viewport(&mut self, viewport: Viewport) -> VerityResult<()> {
        self.ensure_alive()?;
        self.record(format!("set_viewport:{viewport}"));
        self.viewport = viewport;
        Ok(())
    }

    async fn is_visible(&self, element: &ElementHandle) -> VerityResult<bool> {
        let node = self.live(element)?;
        Ok(self.visible(node))
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> VerityResult<Option<String>> {
        let node = self.live(element)?;
        Ok(attribute(node, name))
    }

    async fn text_content(&self, element: &ElementHandle) -> VerityResult<String> {
        let node = self.live(element)?;
        Ok(self.full_text(node))
    }

    async fn title(&self) -> VerityResult<String> {
        self.ensure_alive()?;
        Ok(self.title.clone())
    }

    async fn ready_state(&self) -> VerityResult<ReadyState> {
        self.ensure_alive()?;
        Ok(self.ready_state)
    }

    async fn network_activity(&self) -> VerityResult<NetworkActivity> {
        self.ensure_alive()?;
        let polls = self.network_polls.fetch_add(1, Ordering::SeqCst) + 1;
        let busy = self.never_idle || polls <= self.busy_polls;
        let completed = if self.never_idle {
            polls
        } else {
            polls.min(self.busy_polls)
        };
        Ok(NetworkActivity {
            in_flight: usize::from(busy),
            completed: completed as u64,
        })
    }

    async fn screenshot(&self, full_page: bool) -> VerityResult<Vec<u8>> {
        self.ensure_alive()?;
        if self.site.fail_screenshots {
            return Err(VerityError::Screenshot {
                message: "compositor unavailable".to_string(),
            });
        }
        self.record(format!("screenshot:full_page={full_page}"));
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(format!("{}@{}", self.url, self.viewport).as_bytes());
        Ok(bytes)
    }

    async fn close(&mut self) -> VerityResult<()> {
        self.stats.page_closes.fetch_add(1, Ordering::SeqCst);
        self.closed = true;
        self.record("close".to_string());
        Ok(())
    }
}

// =============================================================================
// CSS subset
// =============================================================================

mod css {
    //! Compound selectors (`tag#id.class[attr='v']`) joined by descendant
    //! combinators, in comma-separated lists. Anything else matches nothing.

    use super::{attribute, MockElement};

    #[derive(Debug, Default)]
    struct Compound {
        tag: Option<String>,
        id: Option<String>,
        classes: Vec<String>,
        attrs: Vec<(String, Option<String>)>,
    }

    impl Compound {
        fn matches(&self, element: &MockElement) -> bool {
            self.tag.as_deref().map_or(true, |t| t == "*" || t == element.tag)
                && self.id.as_deref().map_or(true, |id| id == element.id)
                && self.classes.iter().all(|c| element.classes.contains(c))
                && self.attrs.iter().all(|(name, value)| {
                    let actual = attribute(element, name);
                    match value {
                        None => actual.is_some(),
                        Some(expected) => actual.as_deref() == Some(expected.as_str()),
                    }
                })
        }
    }

    pub(super) fn matches<'a, F>(selector: &str, element: &'a MockElement, ancestors: F) -> bool
    where
        F: Fn(&'a MockElement) -> Vec<&'a MockElement>,
    {
        split_top_level(selector, ',').iter().any(|complex| {
            let Some(chain) = parse_complex(complex) else {
                return false;
            };
            let Some((last, rest)) = chain.split_last() else {
                return false;
            };
            if !last.matches(element) {
                return false;
            }
            let lineage = ancestors(element);
            let mut remaining = rest.iter().rev().peekable();
            for ancestor in lineage {
                if let Some(next) = remaining.peek() {
                    if next.matches(ancestor) {
                        remaining.next();
                    }
                }
            }
            remaining.peek().is_none()
        })
    }

    fn parse_complex(s: &str) -> Option<Vec<Compound>> {
        let parts: Vec<String> = split_top_level(s, ' ')
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            return None;
        }
        parts.iter().map(|p| parse_compound(p)).collect()
    }

    fn parse_compound(s: &str) -> Option<Compound> {
        let chars: Vec<char> = s.chars().collect();
        let mut compound = Compound::default();
        let mut i = 0;
        let ident = |i: &mut usize| -> String {
            let start = *i;
            while *i < chars.len() && (chars[*i].is_alphanumeric() || matches!(chars[*i], '-' | '_')) {
                *i += 1;
            }
            chars[start..*i].iter().collect()
        };

        while i < chars.len() {
            match chars[i] {
                '*' if i == 0 => {
                    compound.tag = Some("*".to_string());
                    i += 1;
                }
                '#' => {
                    i += 1;
                    let id = ident(&mut i);
                    if id.is_empty() {
                        return None;
                    }
                    compound.id = Some(id);
                }
                '.' => {
                    i += 1;
                    let class = ident(&mut i);
                    if class.is_empty() {
                        return None;
                    }
                    compound.classes.push(class);
                }
                '[' => {
                    let close = chars[i..].iter().position(|&c| c == ']')? + i;
                    let inner: String = chars[i + 1..close].iter().collect();
                    compound.attrs.push(parse_attr(&inner)?);
                    i = close + 1;
                }
                c if i == 0 && c.is_alphabetic() => {
                    compound.tag = Some(ident(&mut i).to_lowercase());
                }
                _ => return None,
            }
        }
        Some(compound)
    }

    fn parse_attr(inner: &str) -> Option<(String, Option<String>)> {
        match inner.split_once('=') {
            None => Some((inner.trim().to_string(), None)),
            Some((name, value)) => {
                let value = value.trim();
                let unquoted = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                    .unwrap_or(value);
                Some((name.trim().to_string(), Some(unquoted.to_string())))
            }
        }
    }

    fn split_top_level(s: &str, sep: char) -> Vec<String> {
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        for c in s.chars() {
            match (quote, c) {
                (Some(q), c) if c == q => {
                    quote = None;
                    current.push(c);
                }
                (Some(_), c) => current.push(c),
                (None, '"' | '\'') => {
                    quote = Some(c);
                    current.push(c);
                }
                (None, '[') => {
                    depth += 1;
                    current.push(c);
                }
                (None, ']') => {
                    depth = depth.saturating_sub(1);
                    current.push(c);
                }
                (None, c) if c == sep && depth == 0 => {
                    parts.push(current.trim().to_string());
                    current.clear();
                }
                (None, c) => current.push(c),
            }
        }
        parts.push(current.trim().to_string());
        parts
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const HOME: &str = "http://app.test/";

    fn page(route: MockRoute) -> MockPage {
        let mut page = MockPage::new();
        page.insert_route(HOME, route);
        page.visit(HOME).unwrap();
        page
    }

    async fn ids(page: &MockPage, selector: Selector) -> Vec<String> {
        page.query_all(&selector, None)
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.node_id)
            .collect()
    }

    mod query_tests {
        use super::*;

        #[tokio::test]
        async fn test_implicit_roles() {
            let page = page(
                MockRoute::new("Home")
                    .element(MockElement::new("go", "button").with_text("Go"))
                    .element(MockElement::new("home", "a").with_attr("href", "/").with_text("Home"))
                    .element(MockElement::new("anchor", "a").with_text("Anchor"))
                    .element(MockElement::new("email", "input").with_attr("type", "email")),
            );
            assert_eq!(ids(&page, Selector::role("button")).await, vec!["go"]);
            assert_eq!(ids(&page, Selector::role("link")).await, vec!["home"]);
            assert_eq!(ids(&page, Selector::role("textbox")).await, vec!["email"]);
        }

        #[tokio::test]
        async fn test_role_name_prefers_label_over_text() {
            let page = page(
                MockRoute::new("Home").element(
                    MockElement::new("menu", "button")
                        .with_label("Open main menu")
                        .with_text("☰"),
                ),
            );
            assert_eq!(
                ids(&page, Selector::role_named("button", "main menu")).await,
                vec!["menu"]
            );
            assert!(ids(&page, Selector::role_named("button", "☰")).await.is_empty());
        }

        #[tokio::test]
        async fn test_text_matches_deepest_element() {
            let page = page(
                MockRoute::new("Home")
                    .element(MockElement::new("card", "div"))
                    .element(
                        MockElement::new("title", "h2")
                            .with_text("Terminology Lookup")
                            .inside("card"),
                    ),
            );
            assert_eq!(
                ids(&page, Selector::text("Terminology Lookup")).await,
                vec!["title"]
            );
        }

        #[tokio::test]
        async fn test_placeholder_and_test_id() {
            let page = page(
                MockRoute::new("Glossary")
                    .element(MockElement::new("q", "input").with_placeholder("Search terms..."))
                    .element(MockElement::new("list", "ul").with_attr("data-testid", "results")),
            );
            assert_eq!(ids(&page, Selector::placeholder("search")).await, vec!["q"]);
            assert_eq!(ids(&page, Selector::test_id("results")).await, vec!["list"]);
        }

        #[tokio::test]
        async fn test_script_rendered_elements_need_javascript() {
            let mut page = MockPage::open(
                MockSite::new().with_route(
                    HOME,
                    MockRoute::new("Home").element(
                        MockElement::new("toggle", "button")
                            .with_label("Toggle theme")
                            .script_rendered(),
                    ),
                ),
                Arc::new(MockStats::default()),
                &PageOptions {
                    javascript_enabled: false,
                    ..PageOptions::default()
                },
            );
            page.visit(HOME).unwrap();
            assert!(ids(&page, Selector::label("Toggle theme")).await.is_empty());
        }

        #[tokio::test]
        async fn test_late_elements_appear_after_queries() {
            let page = page(
                MockRoute::new("Lazy")
                    .element(MockElement::new("img", "img").with_label("chart").appears_after(3)),
            );
            assert!(ids(&page, Selector::label("chart")).await.is_empty());
            assert!(ids(&page, Selector::label("chart")).await.is_empty());
            assert_eq!(ids(&page, Selector::label("chart")).await, vec!["img"]);
        }
    }

    mod css_tests {
        use super::*;

        fn site() -> MockPage {
            page(
                MockRoute::new("Home")
                    .element(MockElement::new("nav", "nav").with_class("top"))
                    .element(
                        MockElement::new("nav-link", "a")
                            .with_class("link")
                            .with_attr("href", "/a")
                            .inside("nav"),
                    )
                    .element(MockElement::new("footer", "footer"))
                    .element(
                        MockElement::new("pw-toggle", "button")
                            .with_label("Show password")
                            .inside("footer"),
                    ),
            )
        }

        #[tokio::test]
        async fn test_tag_id_class() {
            let page = site();
            assert_eq!(ids(&page, Selector::css("footer")).await, vec!["footer"]);
            assert_eq!(ids(&page, Selector::css("#nav-link")).await, vec!["nav-link"]);
            assert_eq!(ids(&page, Selector::css("nav.top")).await, vec!["nav"]);
            assert_eq!(ids(&page, Selector::css("a.link")).await, vec!["nav-link"]);
        }

        #[tokio::test]
        async fn test_attribute_and_descendant() {
            let page = site();
            assert_eq!(
                ids(&page, Selector::css("button[aria-label=\"Show password\"]")).await,
                vec!["pw-toggle"]
            );
            assert_eq!(ids(&page, Selector::css("footer button")).await, vec!["pw-toggle"]);
            assert!(ids(&page, Selector::css("nav button")).await.is_empty());
            assert_eq!(ids(&page, Selector::css("a[href]")).await, vec!["nav-link"]);
        }

        #[tokio::test]
        async fn test_selector_list_and_unsupported() {
            let page = site();
            assert_eq!(
                ids(&page, Selector::css("nav, footer")).await,
                vec!["nav", "footer"]
            );
            assert!(ids(&page, Selector::css("nav > a")).await.is_empty());
            assert!(ids(&page, Selector::css("a:hover")).await.is_empty());
        }
    }

    mod interaction_tests {
        use super::*;

        fn signin() -> MockRoute {
            MockRoute::new("Sign in")
                .element(MockElement::new("password", "input").with_attr("type", "password"))
                .element(MockElement::new("toggle", "button").with_label("Show password"))
                .reaction(MockReaction::new(
                    Trigger::Click,
                    "toggle",
                    vec![
                        MockEffect::Cycle {
                            element: "password".into(),
                            name: "type".into(),
                            values: vec!["password".into(), "text".into()],
                        },
                        MockEffect::Cycle {
                            element: "toggle".into(),
                            name: "aria-label".into(),
                            values: vec!["Show password".into(), "Hide password".into()],
                        },
                    ],
                ))
        }

        #[tokio::test]
        async fn test_click_cycles_attributes() {
            let mut page = page(signin());
            let toggle = page.query_all(&Selector::label("Show password"), None).await.unwrap();
            page.click(&toggle[0]).await.unwrap();
            assert_eq!(
                page.element("password").unwrap().attributes.get("type").unwrap(),
                "text"
            );
            assert_eq!(page.element("toggle").unwrap().label.as_deref(), Some("Hide password"));

            page.click(&toggle[0]).await.unwrap();
            assert_eq!(
                page.element("password").unwrap().attributes.get("type").unwrap(),
                "password"
            );
            assert!(page.was_called("click:toggle"));
        }

        #[tokio::test]
        async fn test_click_hidden_is_unavailable() {
            let mut page = page(
                MockRoute::new("Home").element(MockElement::new("menu", "button").max_width(767)),
            );
            let menu = page.query_all(&Selector::css("#menu"), None).await.unwrap();
            let err = page.click(&menu[0]).await.unwrap_err();
            assert!(matches!(err, VerityError::TargetUnavailable { .. }));

            page.set_viewport(Viewport::MOBILE).await.unwrap();
            page.click(&menu[0]).await.unwrap();
        }

        #[tokio::test]
        async fn test_fill_sets_value() {
            let mut page = page(signin());
            let pw = page.query_all(&Selector::css("#password"), None).await.unwrap();
            page.fill(&pw[0], "hunter2").await.unwrap();
            assert_eq!(
                page.attribute(&pw[0], "value").await.unwrap().as_deref(),
                Some("hunter2")
            );
            let toggle = page.query_all(&Selector::css("#toggle"), None).await.unwrap();
            assert!(matches!(
                page.fill(&toggle[0], "x").await,
                Err(VerityError::TargetUnavailable { .. })
            ));
        }

        #[tokio::test]
        async fn test_navigate_effect_detaches_handles() {
            let mut page = page(
                MockRoute::new("Home")
                    .element(MockElement::new("next", "a").with_attr("href", "/next"))
                    .reaction(MockReaction::new(
                        Trigger::Click,
                        "next",
                        vec![MockEffect::Navigate {
                            url: HOME.to_string(),
                        }],
                    )),
            );
            let next = page.query_all(&Selector::role("link"), None).await.unwrap();
            page.click(&next[0]).await.unwrap();
            assert_eq!(page.epoch(), 2);
            assert!(matches!(
                page.is_visible(&next[0]).await,
                Err(VerityError::StaleContext { .. })
            ));
        }

        #[tokio::test]
        async fn test_crash_effect_kills_page() {
            let mut page = page(
                MockRoute::new("Home")
                    .element(MockElement::new("boom", "button"))
                    .reaction(MockReaction::new(
                        Trigger::Click,
                        "boom",
                        vec![MockEffect::Crash {
                            message: "renderer gone".into(),
                        }],
                    )),
            );
            let boom = page.query_all(&Selector::role("button"), None).await.unwrap();
            assert!(matches!(
                page.click(&boom[0]).await,
                Err(VerityError::SessionCrash { .. })
            ));
            assert!(matches!(page.title().await, Err(VerityError::SessionCrash { .. })));
        }
    }

    mod lifecycle_tests {
        use super::*;

        #[tokio::test]
        async fn test_unknown_route_is_navigation_error() {
            let mut page = MockPage::new();
            let err = page
                .goto("http://nowhere.test/", Duration::from_secs(1))
                .await
                .unwrap_err();
            assert!(err.is_fatal());
            assert_eq!(page.epoch(), 0);
        }

        #[tokio::test]
        async fn test_trailing_slash_tolerated() {
            let mut page = MockPage::new();
            page.add_route("http://app.test/glossary", "Glossary", vec![]);
            page.goto("http://app.test/glossary/", Duration::from_secs(1))
                .await
                .unwrap();
            assert_eq!(page.title().await.unwrap(), "Glossary");
        }

        #[tokio::test]
        async fn test_network_busy_then_idle() {
            let page = page(MockRoute::new("Home").busy_for(2));
            assert_eq!(page.network_activity().await.unwrap().in_flight, 1);
            assert_eq!(page.network_activity().await.unwrap().in_flight, 1);
            let idle = page.network_activity().await.unwrap();
            assert_eq!(idle.in_flight, 0);
            assert_eq!(idle.completed, 2);
        }

        #[tokio::test]
        async fn test_session_counts_closes() {
            let mut session = MockSession::new(MockSite::new());
            let stats = session.stats();
            let mut page = session.new_page(&PageOptions::default()).await.unwrap();
            page.close().await.unwrap();
            session.close().await.unwrap();
            assert_eq!(stats.pages_opened(), 1);
            assert_eq!(stats.page_closes(), 1);
            assert_eq!(stats.session_closes(), 1);
            assert!(session.new_page(&PageOptions::default()).await.is_err());
        }

        #[tokio::test]
        async fn test_screenshot_is_png() {
            let page = page(MockRoute::new("Home"));
            let bytes = page.screenshot(false).await.unwrap();
            assert_eq!(&bytes[..8], &PNG_SIGNATURE);
        }

        #[test]
        fn test_site_from_yaml() {
            let site = MockSite::from_yaml(
                r"
routes:
  http://app.test/:
    title: Home
    elements:
      - { id: menu, tag: button, label: Open main menu, max_width: 767 }
    reactions:
      - on: click
        element: menu
        effects:
          - { do: show, element: drawer }
",
            )
            .unwrap();
            let route = site.route("http://app.test").unwrap();
            assert_eq!(route.title, "Home");
            assert_eq!(route.elements[0].max_width, Some(767));
            assert!(route.elements[0].visible);
            assert_eq!(route.reactions[0].on, Trigger::Click);
        }
    }
}
