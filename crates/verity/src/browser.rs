//! Chromium backend over the DevTools protocol.
//!
//! Matched nodes are stamped with a `data-verity-node` attribute whose value
//! starts with the page epoch, so handles can be re-addressed later and
//! handles from an earlier document are recognised as stale. The document
//! itself carries a `window.__verityDoc` marker; when an interaction causes
//! a navigation the marker disappears and the epoch is bumped. A navigation
//! that starts after the interaction has settled is caught by the marker
//! guard in every element query.

use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetScriptExecutionDisabledParams,
};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, CaptureScreenshotParams};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::driver::{
    ElementHandle, NetworkActivity, PageDriver, PageOptions, ReadyState, SessionConfig,
    SessionDriver, Viewport,
};
use crate::locator::{Selector, NODE_ATTRIBUTE};
use crate::result::{VerityError, VerityResult};

/// How long after an interaction a navigation may still begin
const NAVIGATION_SETTLE: Duration = Duration::from_millis(150);
const SETTLE_POLL: Duration = Duration::from_millis(25);
/// Upper bound on waiting for a replaced document to parse
const DOCUMENT_LOAD: Duration = Duration::from_secs(10);

// =============================================================================
// Session
// =============================================================================

/// A launched Chromium instance
#[derive(Debug)]
pub struct ChromiumSession {
    browser: CdpBrowser,
    handler: JoinHandle<()>,
    closed: bool,
}

impl ChromiumSession {
    /// Launch Chromium
    ///
    /// # Errors
    ///
    /// [`VerityError::BrowserLaunch`] if the binary cannot be started or does
    /// not answer within the launch timeout.
    pub async fn launch(config: &SessionConfig) -> VerityResult<Self> {
        let mut builder = CdpConfig::builder();
        if !config.headless {
            builder = builder.with_head();
        }
        if !config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = config.chromium_path {
            builder = builder.chrome_executable(path);
        }
        if let Some(ref ua) = config.user_agent {
            builder = builder.arg(format!("--user-agent={ua}"));
        }
        let cdp_config = builder
            .build()
            .map_err(|message| VerityError::BrowserLaunch { message })?;

        let launched = tokio::time::timeout(config.launch_timeout, CdpBrowser::launch(cdp_config))
            .await
            .map_err(|_| VerityError::BrowserLaunch {
                message: format!(
                    "chromium did not start within {}ms",
                    config.launch_timeout.as_millis()
                ),
            })?;
        let (browser, mut handler) = launched.map_err(|e| VerityError::BrowserLaunch {
            message: e.to_string(),
        })?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });
        info!(headless = config.headless, "chromium launched");

        Ok(Self {
            browser,
            handler,
            closed: false,
        })
    }
}

#[async_trait]
impl SessionDriver for ChromiumSession {
    type Page = ChromiumPage;

    async fn new_page(&mut self, options: &PageOptions) -> VerityResult<ChromiumPage> {
        if self.closed {
            return Err(VerityError::crash("session is closed"));
        }
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| VerityError::crash(format!("could not open page: {e}")))?;

        let mut page = ChromiumPage {
            page,
            epoch: AtomicU64::new(0),
            closed: false,
        };
        page.set_viewport(options.viewport).await?;
        if !options.javascript_enabled {
            page.page
                .execute(SetScriptExecutionDisabledParams::new(true))
                .await
                .map_err(cdp_error)?;
        }
        Ok(page)
    }

    async fn close(&mut self) -> VerityResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = self.browser.close().await;
        // the browser process may outlive close(); reap it
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "could not reap chromium process");
        }
        self.handler.abort();
        result
            .map(|_| ())
            .map_err(|e| VerityError::crash(format!("browser close failed: {e}")))
    }
}

// =============================================================================
// Page
// =============================================================================

/// A Chromium tab
#[derive(Debug)]
pub struct ChromiumPage {
    page: CdpPage,
    /// Advanced from `&self` when a query finds the document was replaced
    epoch: AtomicU64,
    closed: bool,
}

impl ChromiumPage {
    fn ensure_open(&self) -> VerityResult<()> {
        if self.closed {
            Err(VerityError::crash("page is closed"))
        } else {
            Ok(())
        }
    }

    async fn eval<T: DeserializeOwned>(&self, expr: String) -> VerityResult<T> {
        self.ensure_open()?;
        let result = self
            .page
            .evaluate_expression(EvaluateParams::new(expr))
            .await
            .map_err(cdp_error)?;
        result
            .into_value()
            .map_err(|e| VerityError::crash(format!("unexpected script result: {e}")))
    }

    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Mark the live document and advance the epoch
    async fn mark_document(&self) -> VerityResult<()> {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.eval::<u64>(format!("window.__verityDoc = {epoch}; window.__verityDoc"))
            .await?;
        debug!(epoch, "document marked");
        Ok(())
    }

    async fn document_marker(&self) -> VerityResult<Option<u64>> {
        self.eval("window.__verityDoc === undefined ? null : window.__verityDoc".to_string())
            .await
    }

    /// Bump the epoch if an interaction replaced the document
    ///
    /// A click may only start its navigation a few frames later, so the
    /// marker is watched for [`NAVIGATION_SETTLE`] before giving up.
    async fn sync_epoch(&self) -> VerityResult<()> {
        let settle_until = Instant::now() + NAVIGATION_SETTLE;
        loop {
            let last = match self.document_marker().await {
                Ok(marker) if document_replaced(marker, self.current_epoch()) => {
                    return self.adopt_new_document().await;
                }
                Ok(_) => Ok(()),
                // context destroyed mid-navigation
                Err(e) if !self.closed => {
                    debug!(error = %e, "document unavailable while settling");
                    Err(e)
                }
                Err(e) => return Err(e),
            };
            if Instant::now() >= settle_until {
                return last;
            }
            tokio::time::sleep(SETTLE_POLL).await;
        }
    }

    /// Wait for a replacement document to parse, then mark it
    async fn adopt_new_document(&self) -> VerityResult<()> {
        debug!(from = self.current_epoch(), "document replaced by interaction");
        let load_until = Instant::now() + DOCUMENT_LOAD;
        loop {
            match self.eval::<String>("document.readyState".to_string()).await {
                Ok(state) if ReadyState::from_dom(&state) != ReadyState::Loading => break,
                Ok(_) | Err(_) if Instant::now() < load_until => {
                    tokio::time::sleep(SETTLE_POLL).await;
                }
                Ok(_) => break,
                Err(e) => return Err(e),
            }
        }
        self.mark_document().await
    }

    fn check_epoch(&self, handle: &ElementHandle) -> VerityResult<()> {
        if handle.epoch == self.current_epoch() {
            Ok(())
        } else {
            Err(VerityError::stale(format!(
                "node {} is detached: document navigated",
                handle.node_id
            )))
        }
    }

    /// Re-find a stamped node
    async fn element(&self, handle: &ElementHandle) -> VerityResult<Element> {
        self.ensure_open()?;
        self.check_epoch(handle)?;
        self.page
            .find_element(node_selector(&handle.node_id))
            .await
            .map_err(|_| {
                VerityError::stale(format!("node {} is no longer attached", handle.node_id))
            })
    }

    /// Evaluate `body` with `el` bound to the node; `None` when the node is gone
    async fn eval_on<T: DeserializeOwned>(
        &self,
        handle: &ElementHandle,
        body: &str,
    ) -> VerityResult<T> {
        self.check_epoch(handle)?;
        let value: Option<T> = self
            .eval(format!(
                "(() => {{ const el = document.querySelector({}); if (!el) return null; {body} }})()",
                js_string(&node_selector(&handle.node_id))
            ))
            .await?;
        value.ok_or_else(|| {
            VerityError::stale(format!("node {} is no longer attached", handle.node_id))
        })
    }

    async fn navigate_with(&mut self, url: &str, timeout: Duration, reload: bool) -> VerityResult<()> {
        self.ensure_open()?;
        let navigation = async {
            if reload {
                self.page.reload().await.map(|_| ())
            } else {
                self.page.goto(url).await.map(|_| ())
            }
        };
        match tokio::time::timeout(timeout, navigation).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(VerityError::Navigation {
                    url: url.to_string(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                return Err(VerityError::Navigation {
                    url: url.to_string(),
                    message: format!("load did not finish within {}ms", timeout.as_millis()),
                })
            }
        }
        self.mark_document().await
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    fn epoch(&self) -> u64 {
        self.current_epoch()
    }

    async fn goto(&mut self, url: &str, timeout: Duration) -> VerityResult<()> {
        self.navigate_with(url, timeout, false).await
    }

    async fn reload(&mut self, timeout: Duration) -> VerityResult<()> {
        let url = self
            .page
            .url()
            .await
            .map_err(cdp_error)?
            .unwrap_or_default();
        self.navigate_with(&url, timeout, true).await
    }

    async fn query_all(
        &self,
        selector: &Selector,
        scope: Option<&ElementHandle>,
    ) -> VerityResult<Vec<ElementHandle>> {
        let root = match scope {
            Some(scope) => {
                self.check_epoch(scope)?;
                format!(
                    "document.querySelector({})",
                    js_string(&node_selector(&scope.node_id))
                )
            }
            None => "document".to_string(),
        };
        let query = selector.to_query_all(&root);
        let mut epoch = self.current_epoch();
        let mut nodes: Option<Vec<(String, String)>> =
            self.eval(stamp_expression(&query, epoch)).await?;
        if nodes.is_none() && scope.is_none() {
            // navigated after the last interaction settled
            self.adopt_new_document().await?;
            epoch = self.current_epoch();
            nodes = self.eval(stamp_expression(&query, epoch)).await?;
        }
        let nodes = nodes.ok_or_else(|| {
            VerityError::stale(format!("document navigated while querying {selector}"))
        })?;
        Ok(nodes
            .into_iter()
            .map(|(id, tag)| ElementHandle::new(id, tag, epoch))
            .collect())
    }

    async fn click(&mut self, element: &ElementHandle) -> VerityResult<()> {
        let el = self.element(element).await?;
        el.click()
            .await
            .map_err(|e| VerityError::unavailable(format!("click failed: {e}")))?;
        self.sync_epoch().await
    }

    async fn hover(&mut self, element: &ElementHandle) -> VerityResult<()> {
        let el = self.element(element).await?;
        el.hover()
            .await
            .map_err(|e| VerityError::unavailable(format!("hover failed: {e}")))?;
        self.sync_epoch().await
    }

    async fn fill(&mut self, element: &ElementHandle, value: &str) -> VerityResult<()> {
        let editable: bool = self
            .eval_on(
                element,
                "const ok = el.isContentEditable || ['INPUT', 'TEXTAREA'].includes(el.tagName); \
                 if (ok) { el.focus(); if (el.isContentEditable) { el.textContent = ''; } else { el.value = ''; } \
                 el.dispatchEvent(new Event('input', { bubbles: true })); } return ok;",
            )
            .await?;
        if !editable {
            return Err(VerityError::unavailable(format!(
                "node {} is not editable",
                element.node_id
            )));
        }
        let el = self.element(element).await?;
        el.type_str(value)
            .await
            .map_err(|e| VerityError::unavailable(format!("typing failed: {e}")))?;
        self.sync_epoch().await
    }

    async fn scroll_into_view(&mut self, element: &ElementHandle) -> VerityResult<()> {
        let el = self.element(element).await?;
        el.scroll_into_view()
            .await
            .map_err(|e| VerityError::unavailable(format!("scroll failed: {e}")))?;
        Ok(())
    }

    async fn scroll_to(&mut self, x: f64, y: f64) -> VerityResult<()> {
        self.eval::<bool>(format!("window.scrollTo({x}, {y}); true")).await?;
        Ok(())
    }

    async fn set_viewport(&mut self, viewport: Viewport) -> VerityResult<()> {
        self.ensure_open()?;
        let params = SetDeviceMetricsOverrideParams::new(
            i64::from(viewport.width),
            i64::from(viewport.height),
            1.0,
            viewport.width < 768,
        );
        self.page.execute(params).await.map_err(cdp_error)?;
        debug!(%viewport, "viewport set");
        Ok(())
    }

    async fn is_visible(&self, element: &ElementHandle) -> VerityResult<bool> {
        self.eval_on(
            element,
            "const s = getComputedStyle(el); const r = el.getBoundingClientRect(); \
             return s.display !== 'none' && s.visibility !== 'hidden' && \
             parseFloat(s.opacity || '1') > 0 && r.width > 0 && r.height > 0;",
        )
        .await
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> VerityResult<Option<String>> {
        let (_, value): (bool, Option<String>) = self
            .eval_on(
                element,
                &format!("return [true, el.getAttribute({})];", js_string(name)),
            )
            .await?;
        Ok(value)
    }

    async fn text_content(&self, element: &ElementHandle) -> VerityResult<String> {
        self.eval_on(element, "return el.innerText ?? el.textContent ?? '';")
            .await
    }

    async fn title(&self) -> VerityResult<String> {
        self.eval("document.title".to_string()).await
    }

    async fn ready_state(&self) -> VerityResult<ReadyState> {
        let state: String = self.eval("document.readyState".to_string()).await?;
        Ok(ReadyState::from_dom(&state))
    }

    async fn network_activity(&self) -> VerityResult<NetworkActivity> {
        let completed: u64 = self
            .eval("performance.getEntriesByType('resource').length".to_string())
            .await?;
        Ok(NetworkActivity {
            in_flight: 0,
            completed,
        })
    }

    async fn screenshot(&self, full_page: bool) -> VerityResult<Vec<u8>> {
        self.ensure_open()?;
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .capture_beyond_viewport(full_page)
            .build();
        let shot = self
            .page
            .execute(params)
            .await
            .map_err(|e| VerityError::Screenshot {
                message: e.to_string(),
            })?;
        base64::engine::general_purpose::STANDARD
            .decode(&shot.data)
            .map_err(|e| VerityError::Screenshot {
                message: e.to_string(),
            })
    }

    async fn close(&mut self) -> VerityResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| VerityError::crash(format!("page close failed: {e}")))
    }
}

/// Stamp every node `query` matches with an epoch-prefixed id
///
/// Evaluates to `null` when the live document is not the one marked for `epoch`.
fn stamp_expression(query: &str, epoch: u64) -> String {
    format!(
        "(() => {{ if (window.__verityDoc !== {epoch}) return null; \
         const attr = {attr}; const prefix = '{epoch}-'; \
         return {query}.map(el => {{ \
           let id = el.getAttribute(attr); \
           if (!id || !id.startsWith(prefix)) {{ \
             window.__verityNext = (window.__verityNext || 0) + 1; \
             id = prefix + window.__verityNext; el.setAttribute(attr, id); \
           }} \
           return [id, el.tagName.toLowerCase()]; \
         }}); }})()",
        attr = js_string(NODE_ATTRIBUTE),
    )
}

/// Whether the document no longer carries the marker for `epoch`
fn document_replaced(marker: Option<u64>, epoch: u64) -> bool {
    marker != Some(epoch)
}

fn node_selector(node_id: &str) -> String {
    format!("[{NODE_ATTRIBUTE}=\"{node_id}\"]")
}

fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn cdp_error(err: CdpError) -> VerityError {
    match err {
        CdpError::JavascriptException(details) => {
            VerityError::invalid(format!("page script failed: {}", details.text))
        }
        other => VerityError::crash(other.to_string()),
    }
}
