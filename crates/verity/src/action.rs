//! Action executor: one interaction against the live page.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::driver::{PageDriver, Viewport};
use crate::locator::ElementRef;
use crate::result::{VerityError, VerityResult};

/// Interaction kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionKind {
    /// Load a URL; every previously obtained reference goes stale
    Navigate {
        /// Absolute URL
        url: String,
    },
    /// Click the target
    Click,
    /// Move the pointer over the target
    Hover,
    /// Clear the target input and type `value`
    Fill {
        /// Replacement value
        value: String,
    },
    /// Resize the viewport
    SetViewport {
        /// Width in CSS pixels
        width: u32,
        /// Height in CSS pixels
        height: u32,
    },
    /// Scroll the window to absolute coordinates
    Scroll {
        /// Horizontal offset
        #[serde(default)]
        x: f64,
        /// Vertical offset
        #[serde(default)]
        y: f64,
    },
    /// Scroll the target into view
    ScrollIntoView,
    /// Reload the current document
    Reload,
}

impl ActionKind {
    /// Whether the action operates on an element
    #[must_use]
    pub const fn requires_target(&self) -> bool {
        matches!(
            self,
            Self::Click | Self::Hover | Self::Fill { .. } | Self::ScrollIntoView
        )
    }

    /// Whether the action must see a visible target
    #[must_use]
    pub const fn requires_visible(&self) -> bool {
        matches!(self, Self::Click | Self::Hover | Self::Fill { .. })
    }

    /// Whether the action replaces the document
    #[must_use]
    pub const fn navigates(&self) -> bool {
        matches!(self, Self::Navigate { .. } | Self::Reload)
    }

    /// Short name for logs and reports
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Navigate { .. } => "navigate",
            Self::Click => "click",
            Self::Hover => "hover",
            Self::Fill { .. } => "fill",
            Self::SetViewport { .. } => "set_viewport",
            Self::Scroll { .. } => "scroll",
            Self::ScrollIntoView => "scroll_into_view",
            Self::Reload => "reload",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Navigate { url } => write!(f, "navigate {url}"),
            Self::Fill { value } => write!(f, "fill {value:?}"),
            Self::SetViewport { width, height } => write!(f, "set viewport {width}x{height}"),
            Self::Scroll { x, y } => write!(f, "scroll to ({x}, {y})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Performs actions for one run
#[derive(Debug, Clone)]
pub struct ActionExecutor {
    run_id: Uuid,
    navigation_timeout: Duration,
}

impl ActionExecutor {
    /// Create an executor bound to a run
    #[must_use]
    pub const fn new(run_id: Uuid, navigation_timeout: Duration) -> Self {
        Self {
            run_id,
            navigation_timeout,
        }
    }

    /// Perform `kind`
    ///
    /// # Errors
    ///
    /// - [`VerityError::TargetUnavailable`] when an element action has no
    ///   target, or its target is stale or not visible
    /// - [`VerityError::Navigation`] when a navigation fails
    /// - any driver error, e.g. [`VerityError::SessionCrash`]
    pub async fn perform<P>(
        &self,
        page: &mut P,
        kind: &ActionKind,
        target: Option<&ElementRef>,
    ) -> VerityResult<()>
    where
        P: PageDriver + ?Sized,
    {
        debug!(action = %kind, target = ?target.map(|t| &t.handle.node_id), "perform");
        match kind {
            ActionKind::Navigate { url } => page.goto(url, self.navigation_timeout).await,
            ActionKind::Reload => page.reload(self.navigation_timeout).await,
            ActionKind::SetViewport { width, height } => {
                let viewport = Viewport::new(*width, *height);
                if !viewport.is_valid() {
                    return Err(VerityError::invalid(format!(
                        "viewport {viewport} is out of range"
                    )));
                }
                page.set_viewport(viewport).await
            }
            ActionKind::Scroll { x, y } => page.scroll_to(*x, *y).await,
            ActionKind::Click => {
                let el = self.usable(page, kind, target).await?;
                page.click(&el.handle).await
            }
            ActionKind::Hover => {
                let el = self.usable(page, kind, target).await?;
                page.hover(&el.handle).await
            }
            ActionKind::Fill { value } => {
                let el = self.usable(page, kind, target).await?;
                page.fill(&el.handle, value).await
            }
            ActionKind::ScrollIntoView => {
                let el = self.usable(page, kind, target).await?;
                page.scroll_into_view(&el.handle).await
            }
        }
    }

    /// Target must exist, belong to this run and document, and be visible when required
    async fn usable<'a, P>(
        &self,
        page: &P,
        kind: &ActionKind,
        target: Option<&'a ElementRef>,
    ) -> VerityResult<&'a ElementRef>
    where
        P: PageDriver + ?Sized,
    {
        let el = target.ok_or_else(|| {
            VerityError::unavailable(format!("{} needs a target element", kind.name()))
        })?;
        el.ensure_fresh(self.run_id, page.epoch())
            .map_err(|e| VerityError::unavailable(format!("{}: {e}", kind.name())))?;
        if kind.requires_visible() && !page.is_visible(&el.handle).await? {
            return Err(VerityError::unavailable(format!(
                "{}: element {} is not visible",
                kind.name(),
                el.handle.node_id
            )));
        }
        Ok(el)
    }
}
