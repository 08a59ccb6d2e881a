//! Automation driver boundary.
//!
//! The harness consumes a browser only through these two traits, so a run can
//! be pointed at a real Chromium (feature `browser`) or at the in-memory
//! [`mock`] document used by the test suite.
//!
//! ```text
//! ┌──────────────────┐  new_page()  ┌──────────────────┐
//! │  SessionDriver   │─────────────►│    PageDriver    │
//! │  (one per run)   │              │ goto/query/act/  │
//! │  close() once    │              │ read/screenshot  │
//! └──────────────────┘              └──────────────────┘
//!          ▲                                 ▲
//!   ChromiumSession / MockSession     ChromiumPage / MockPage
//! ```

pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::locator::Selector;
use crate::result::VerityResult;

/// Driver-level element handle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Identifier the driver can use to re-address the node
    pub node_id: String,
    /// Lower-case tag name
    pub tag_name: String,
    /// Navigation generation of the document the node was found in
    pub epoch: u64,
}

impl ElementHandle {
    /// Create a new element handle
    #[must_use]
    pub fn new(node_id: impl Into<String>, tag_name: impl Into<String>, epoch: u64) -> Self {
        Self {
            node_id: node_id.into(),
            tag_name: tag_name.into(),
            epoch,
        }
    }
}

/// Viewport dimensions in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

impl Viewport {
    /// Phone-sized viewport used by the mobile navigation checks
    pub const MOBILE: Self = Self::new(375, 667);

    /// Default desktop viewport
    pub const DESKTOP: Self = Self::new(1280, 720);

    /// Create a viewport
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Reject degenerate sizes
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.width <= 16_384 && self.height <= 16_384
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::DESKTOP
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// `document.readyState`
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    /// Still parsing
    Loading,
    /// Parsed, subresources pending (`DOMContentLoaded` fired)
    Interactive,
    /// Fully loaded (`load` fired)
    #[default]
    Complete,
}

impl ReadyState {
    /// Parse the DOM string form
    #[must_use]
    pub fn from_dom(s: &str) -> Self {
        match s {
            "complete" => Self::Complete,
            "interactive" => Self::Interactive,
            _ => Self::Loading,
        }
    }
}

/// Snapshot of network activity on the page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkActivity {
    /// Requests currently in flight, when the backend can observe them
    pub in_flight: usize,
    /// Monotonic count of finished requests
    pub completed: u64,
}

/// Options for opening the scenario's page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOptions {
    /// Initial viewport
    pub viewport: Viewport,
    /// Whether page scripts may run
    pub javascript_enabled: bool,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            javascript_enabled: true,
        }
    }
}

/// Browser session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Run in headless mode
    pub headless: bool,
    /// Sandbox mode (disable for containers)
    pub sandbox: bool,
    /// Path to chromium binary (None = auto-detect)
    pub chromium_path: Option<String>,
    /// User agent override
    pub user_agent: Option<String>,
    /// Browser launch timeout
    pub launch_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: true,
            chromium_path: None,
            user_agent: None,
            launch_timeout: Duration::from_secs(20),
        }
    }
}

impl SessionConfig {
    /// Create new config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Disable sandbox (for containers/CI)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }

    /// Set chromium path
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<String>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Set user agent
    #[must_use]
    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }
}

/// A browsing session owning one or more pages
#[async_trait]
pub trait SessionDriver: Send {
    /// Page type produced by this session
    type Page: PageDriver;

    /// Open a new page
    async fn new_page(&mut self, options: &PageOptions) -> VerityResult<Self::Page>;

    /// Close the session and release the browser
    async fn close(&mut self) -> VerityResult<()>;
}

/// A single browsing context
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigation generation; 0 until the first document loads, bumped by
    /// every navigation or reload
    fn epoch(&self) -> u64;

    /// Navigate to URL
    async fn goto(&mut self, url: &str, timeout: Duration) -> VerityResult<()>;

    /// Reload the current document
    async fn reload(&mut self, timeout: Duration) -> VerityResult<()>;

    /// All elements matching `selector`, in document order, optionally under `scope`
    async fn query_all(
        &self,
        selector: &Selector,
        scope: Option<&ElementHandle>,
    ) -> VerityResult<Vec<ElementHandle>>;

    /// Click element
    async fn click(&mut self, element: &ElementHandle) -> VerityResult<()>;

    /// Move the pointer over element
    async fn hover(&mut self, element: &ElementHandle) -> VerityResult<()>;

    /// Replace the value of an input
    async fn fill(&mut self, element: &ElementHandle, value: &str) -> VerityResult<()>;

    /// Scroll element into view
    async fn scroll_into_view(&mut self, element: &ElementHandle) -> VerityResult<()>;

    /// Scroll the window to absolute coordinates
    async fn scroll_to(&mut self, x: f64, y: f64) -> VerityResult<()>;

    /// Resize the viewport
    async fn set_viewport(&mut self, viewport: Viewport) -> VerityResult<()>;

    /// Whether element is rendered and visible
    async fn is_visible(&self, element: &ElementHandle) -> VerityResult<bool>;

    /// Attribute value, `None` when absent
    async fn attribute(&self, element: &ElementHandle, name: &str)
        -> VerityResult<Option<String>>;

    /// Element text content
    async fn text_content(&self, element: &ElementHandle) -> VerityResult<String>;

    /// Document title
    async fn title(&self) -> VerityResult<String>;

    /// Current `document.readyState`
    async fn ready_state(&self) -> VerityResult<ReadyState>;

    /// Current network activity
    async fn network_activity(&self) -> VerityResult<NetworkActivity>;

    /// PNG screenshot of the viewport or the full page
    async fn screenshot(&self, full_page: bool) -> VerityResult<Vec<u8>>;

    /// Close the page
    async fn close(&mut self) -> VerityResult<()>;
}
