//! One browser tab over CDP: lifecycle, navigation, readiness,
//! cookies and storage, dialogs, tab-set management, window bounds,
//! and page-level queries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use serde_json::{json, Value};

use crate::cdp::{discovery, CdpSession};
use crate::config::{Config, LoadStrategy};
use crate::cookies::Cookie;
use crate::error::{DualError, Result};
use crate::keys;
use crate::live::element::LiveElement;
use crate::live::query::{self, LiveResult};
use crate::locator::{LocKind, Locator};
use crate::statics::session::RequestOpts;

/// What kind of dialog is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialogKind {
    #[default]
    Alert,
    Confirm,
    Prompt,
    BeforeUnload,
}

impl DialogKind {
    fn parse(raw: &str) -> Self {
        match raw {
            "confirm" => DialogKind::Confirm,
            "prompt" => DialogKind::Prompt,
            "beforeunload" => DialogKind::BeforeUnload,
            _ => DialogKind::Alert,
        }
    }
}

/// Latched state of the tab's JavaScript dialog.
#[derive(Debug, Clone, Default)]
pub struct AlertState {
    pub active: bool,
    pub text: String,
    pub kind: DialogKind,
    pub default_prompt: Option<String>,
    pub response_accepted: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Normal,
    Minimized,
    Maximized,
    Fullscreen,
}

impl WindowState {
    fn as_str(&self) -> &'static str {
        match self {
            WindowState::Normal => "normal",
            WindowState::Minimized => "minimized",
            WindowState::Maximized => "maximized",
            WindowState::Fullscreen => "fullscreen",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "minimized" => WindowState::Minimized,
            "maximized" => WindowState::Maximized,
            "fullscreen" => WindowState::Fullscreen,
            _ => WindowState::Normal,
        }
    }
}

pub(crate) struct TabShared {
    is_loading: AtomicBool,
    doc_stale: AtomicBool,
    root_object: Mutex<Option<String>>,
    alert: Mutex<AlertState>,
    auto_alert: Mutex<Option<bool>>,
    download_begun: AtomicBool,
}

impl TabShared {
    fn new() -> Self {
        Self {
            is_loading: AtomicBool::new(false),
            doc_stale: AtomicBool::new(true),
            root_object: Mutex::new(None),
            alert: Mutex::new(AlertState::default()),
            auto_alert: Mutex::new(None),
            download_begun: AtomicBool::new(false),
        }
    }
}

/// A live tab. Cheap to clone; clones share the CDP session and state.
#[derive(Clone)]
pub struct Tab {
    session: CdpSession,
    host: String,
    tab_id: String,
    config: Arc<Config>,
    shared: Arc<TabShared>,
}

impl Tab {
    /// Attach to a page target at `host:port`. With no `tab_id`, the
    /// first page target becomes the tab.
    pub async fn connect(host: &str, tab_id: Option<&str>, config: Config) -> Result<Tab> {
        let targets = discovery::page_targets(host).await?;
        let target = match tab_id {
            Some(id) => targets
                .into_iter()
                .find(|t| t.id == id)
                .ok_or_else(|| DualError::BrowserConnect(format!("no tab with id {id}")))?,
            None => targets
                .into_iter()
                .next()
                .ok_or_else(|| DualError::BrowserConnect("no page targets".to_string()))?,
        };
        let ws_url = target
            .web_socket_debugger_url
            .clone()
            .unwrap_or_else(|| discovery::page_ws_url(host, &target.id));
        Self::attach(&ws_url, host, &target.id, config).await
    }

    /// Attach directly to a known WebSocket endpoint.
    pub async fn attach(ws_url: &str, host: &str, tab_id: &str, config: Config) -> Result<Tab> {
        let session = CdpSession::connect(ws_url).await?;
        let tab = Tab {
            session,
            host: host.to_string(),
            tab_id: tab_id.to_string(),
            config: Arc::new(config),
            shared: Arc::new(TabShared::new()),
        };
        tab.enable_domains().await?;
        tab.install_handlers().await;
        Ok(tab)
    }

    async fn enable_domains(&self) -> Result<()> {
        for method in ["DOM.enable", "Page.enable", "Runtime.enable", "Network.enable"] {
            self.call(method, json!({})).await?;
        }
        Ok(())
    }

    async fn install_handlers(&self) {
        let shared = Arc::clone(&self.shared);
        let main_frame = self.tab_id.clone();
        self.session
            .set_listener(
                "Page.frameStartedLoading",
                Some(Arc::new(move |params| {
                    if params["frameId"].as_str() == Some(main_frame.as_str()) {
                        shared.is_loading.store(true, Ordering::SeqCst);
                    }
                })),
            )
            .await;

        let shared = Arc::clone(&self.shared);
        let main_frame = self.tab_id.clone();
        self.session
            .set_listener(
                "Page.frameStoppedLoading",
                Some(Arc::new(move |params| {
                    if params["frameId"].as_str() == Some(main_frame.as_str()) {
                        shared.is_loading.store(false, Ordering::SeqCst);
                        shared.doc_stale.store(true, Ordering::SeqCst);
                    }
                })),
            )
            .await;

        let shared = Arc::clone(&self.shared);
        self.session
            .set_listener(
                "Page.loadEventFired",
                Some(Arc::new(move |_| {
                    shared.is_loading.store(false, Ordering::SeqCst);
                    shared.doc_stale.store(true, Ordering::SeqCst);
                })),
            )
            .await;

        let shared = Arc::clone(&self.shared);
        self.session
            .set_listener(
                "DOM.documentUpdated",
                Some(Arc::new(move |_| {
                    shared.doc_stale.store(true, Ordering::SeqCst);
                })),
            )
            .await;

        let shared = Arc::clone(&self.shared);
        self.session
            .set_listener(
                "Page.frameNavigated",
                Some(Arc::new(move |params| {
                    if params["frame"]["parentId"].is_null() {
                        shared.doc_stale.store(true, Ordering::SeqCst);
                    }
                })),
            )
            .await;

        let shared = Arc::clone(&self.shared);
        let session = self.session.clone();
        let timeout = self.config.timeouts.base_duration();
        self.session
            .set_listener(
                "Page.javascriptDialogOpening",
                Some(Arc::new(move |params| {
                    let kind = DialogKind::parse(params["type"].as_str().unwrap_or_default());
                    {
                        let mut alert = shared.alert.lock().unwrap();
                        *alert = AlertState {
                            active: true,
                            text: params["message"].as_str().unwrap_or_default().to_string(),
                            kind,
                            default_prompt: params["defaultPrompt"]
                                .as_str()
                                .map(|s| s.to_string()),
                            response_accepted: None,
                        };
                    }
                    let auto = *shared.auto_alert.lock().unwrap();
                    if let Some(accept) = auto {
                        let session = session.clone();
                        tokio::spawn(async move {
                            let _ = session
                                .call(
                                    "Page.handleJavaScriptDialog",
                                    json!({ "accept": accept }),
                                    timeout,
                                )
                                .await;
                        });
                    }
                })),
            )
            .await;

        let shared = Arc::clone(&self.shared);
        self.session
            .set_listener(
                "Page.javascriptDialogClosed",
                Some(Arc::new(move |params| {
                    let mut alert = shared.alert.lock().unwrap();
                    alert.active = false;
                    alert.response_accepted = params["result"].as_bool();
                })),
            )
            .await;

        let shared = Arc::clone(&self.shared);
        self.session
            .set_listener(
                "Browser.downloadWillBegin",
                Some(Arc::new(move |_| {
                    shared.download_begun.store(true, Ordering::SeqCst);
                })),
            )
            .await;
    }

    // ---------------------------------------------------------- basics

    pub fn id(&self) -> &str {
        &self.tab_id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Whether the underlying CDP session has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.session.is_stopped()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn base_timeout(&self) -> Duration {
        self.config.timeouts.base_duration()
    }

    /// One CDP call with the default timeout.
    pub(crate) async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.session
            .call(method, params, self.config.timeouts.base_duration())
            .await
    }

    pub(crate) async fn call_t(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        self.session.call(method, params, timeout).await
    }

    /// Evaluate an expression in the page, returning its JSON value.
    pub async fn run_js(&self, expression: &str) -> Result<Value> {
        let reply = self
            .call_t(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
                self.config.timeouts.script_duration(),
            )
            .await?;
        if let Some(details) = reply.get("exceptionDetails") {
            let text = details["exception"]["description"]
                .as_str()
                .or_else(|| details["text"].as_str())
                .unwrap_or("unknown JS exception");
            return Err(DualError::JavaScriptError(text.to_string()));
        }
        Ok(reply["result"].get("value").cloned().unwrap_or(Value::Null))
    }

    async fn run_js_handle(&self, expression: &str) -> Result<Value> {
        let reply = self
            .call(
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": false }),
            )
            .await?;
        if let Some(details) = reply.get("exceptionDetails") {
            let text = details["text"].as_str().unwrap_or("unknown JS exception");
            return Err(DualError::JavaScriptError(text.to_string()));
        }
        Ok(reply["result"].clone())
    }

    /// Object handle for the current document, re-read after any
    /// document update.
    pub(crate) async fn root_object(&self) -> Result<String> {
        if !self.shared.doc_stale.load(Ordering::SeqCst) {
            if let Some(cached) = self.shared.root_object.lock().unwrap().clone() {
                return Ok(cached);
            }
        }
        let doc = self.call("DOM.getDocument", json!({ "depth": 0 })).await?;
        let node_id = doc["root"]["nodeId"]
            .as_i64()
            .ok_or_else(|| DualError::ContextLost("document has no root".to_string()))?;
        let resolved = self
            .call("DOM.resolveNode", json!({ "nodeId": node_id }))
            .await?;
        let object_id = resolved["object"]["objectId"]
            .as_str()
            .ok_or_else(|| DualError::ContextLost("root did not resolve".to_string()))?
            .to_string();
        *self.shared.root_object.lock().unwrap() = Some(object_id.clone());
        self.shared.doc_stale.store(false, Ordering::SeqCst);
        Ok(object_id)
    }

    pub async fn url(&self) -> Result<String> {
        Ok(self
            .run_js("document.location.href")
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    pub async fn title(&self) -> Result<String> {
        Ok(self
            .run_js("document.title")
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    pub async fn html(&self) -> Result<String> {
        Ok(self
            .run_js("document.documentElement.outerHTML")
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    pub async fn ready_state(&self) -> Result<String> {
        Ok(self
            .run_js("document.readyState")
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    pub async fn user_agent(&self) -> Result<String> {
        Ok(self
            .run_js("navigator.userAgent")
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    // ------------------------------------------------------- readiness

    pub fn is_loading(&self) -> bool {
        self.shared.is_loading.load(Ordering::SeqCst)
    }

    /// Wait for the document to reach the configured load strategy's
    /// threshold. Issues `Page.stopLoading` and returns false on
    /// timeout.
    pub async fn wait_loaded(&self, timeout: Duration) -> Result<bool> {
        if self.config.load_strategy == LoadStrategy::None {
            self.shared.is_loading.store(false, Ordering::SeqCst);
            return Ok(true);
        }
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(state) = self.ready_state().await {
                if self.config.load_strategy.satisfied_by(&state) {
                    self.shared.is_loading.store(false, Ordering::SeqCst);
                    return Ok(true);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                let _ = self.call("Page.stopLoading", json!({})).await;
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    // ------------------------------------------------------ navigation

    /// Navigate, wait for readiness, retry on failure. Returns whether
    /// the load succeeded; raises only with `show_errmsg`.
    pub async fn get(&self, url: &str, opts: &RequestOpts) -> Result<bool> {
        let attempts = opts.retry.unwrap_or(self.config.retry.times) + 1;
        let interval = Duration::from_secs_f64(
            opts.interval.unwrap_or(self.config.retry.interval).max(0.0),
        );
        let timeout = Duration::from_secs_f64(
            opts.timeout
                .unwrap_or(self.config.timeouts.page_load)
                .max(0.001),
        );

        let mut last_error = String::new();
        for attempt in 0..attempts {
            if attempt > 0 {
                tracing::debug!("retrying navigation to {url} ({attempt}/{})", attempts - 1);
                tokio::time::sleep(interval).await;
            }
            self.shared.is_loading.store(true, Ordering::SeqCst);
            self.shared.doc_stale.store(true, Ordering::SeqCst);
            match self
                .call_t("Page.navigate", json!({ "url": url }), timeout)
                .await
            {
                Ok(reply) => {
                    if let Some(error_text) = reply["errorText"].as_str() {
                        if !error_text.is_empty() {
                            last_error = error_text.to_string();
                            continue;
                        }
                    }
                    if self.wait_loaded(timeout).await? {
                        return Ok(true);
                    }
                    last_error = "page load timed out".to_string();
                }
                Err(DualError::ConnectionStopped) => return Err(DualError::ConnectionStopped),
                Err(e) => last_error = e.to_string(),
            }
        }

        if opts.show_errmsg {
            Err(DualError::PageError(format!("{url}: {last_error}")))
        } else {
            tracing::debug!("navigation failed: {url}: {last_error}");
            Ok(false)
        }
    }

    pub async fn reload(&self) -> Result<bool> {
        self.shared.is_loading.store(true, Ordering::SeqCst);
        self.shared.doc_stale.store(true, Ordering::SeqCst);
        self.call("Page.reload", json!({})).await?;
        self.wait_loaded(self.config.timeouts.page_load_duration())
            .await
    }

    pub async fn stop_loading(&self) -> Result<()> {
        self.call("Page.stopLoading", json!({})).await?;
        Ok(())
    }

    pub async fn back(&self, steps: usize) -> Result<bool> {
        self.history_step(-(steps as i64)).await
    }

    pub async fn forward(&self, steps: usize) -> Result<bool> {
        self.history_step(steps as i64).await
    }

    async fn history_step(&self, steps: i64) -> Result<bool> {
        if steps == 0 {
            return Ok(false);
        }
        let history = self
            .call("Page.getNavigationHistory", json!({}))
            .await?;
        let entries = history["entries"].as_array().cloned().unwrap_or_default();
        let current = history["currentIndex"].as_i64().unwrap_or(0) as usize;
        let urls: Vec<&str> = entries
            .iter()
            .map(|e| e["url"].as_str().unwrap_or_default())
            .collect();
        let target = walk_history(&urls, current, steps);
        if target == current {
            return Ok(false);
        }
        let entry_id = entries[target]["id"].as_i64().unwrap_or(0);
        self.shared.doc_stale.store(true, Ordering::SeqCst);
        self.call(
            "Page.navigateToHistoryEntry",
            json!({ "entryId": entry_id }),
        )
        .await?;
        Ok(true)
    }

    // --------------------------------------------------------- queries

    /// First page-level match, or `ElementNotFound`.
    pub async fn ele(&self, loc: impl Into<Locator>) -> Result<LiveResult> {
        let loc = loc.into();
        self.try_ele(loc.clone())
            .await?
            .ok_or(DualError::ElementNotFound(loc.expr))
    }

    /// First page-level match, or `None` after the timeout.
    pub async fn try_ele(&self, loc: impl Into<Locator>) -> Result<Option<LiveResult>> {
        Ok(self
            .search(&loc.into(), true, self.base_timeout())
            .await?
            .into_iter()
            .next())
    }

    /// All page-level matches; polls until at least one appears.
    pub async fn eles(&self, loc: impl Into<Locator>) -> Result<Vec<LiveResult>> {
        self.search(&loc.into(), false, self.base_timeout()).await
    }

    /// Page-level dispatch: `DOM.performSearch` (shadow DOM included)
    /// with polling, falling back to a JS query on the root document
    /// for expressions the search API cannot answer (xpath functions,
    /// attribute paths).
    pub(crate) async fn search(
        &self,
        loc: &Locator,
        first_only: bool,
        timeout: Duration,
    ) -> Result<Vec<LiveResult>> {
        // Function-style xpath (count(…), string(…)) never matches
        // nodes; performSearch would treat it as plain text.
        let function_xpath =
            loc.kind == LocKind::XPath && !loc.expr.trim_start().starts_with(['/', '(', '.']);
        if function_xpath {
            let root = self.root_object().await?;
            return query::query_on_object(self, &root, loc, first_only, timeout).await;
        }
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.perform_search_once(loc, first_only).await {
                Ok(results) if !results.is_empty() => return Ok(results),
                Ok(_) => {}
                Err(DualError::ConnectionStopped) => return Err(DualError::ConnectionStopped),
                Err(_) => {
                    let root = self.root_object().await?;
                    let remaining = deadline
                        .saturating_duration_since(tokio::time::Instant::now());
                    return query::query_on_object(self, &root, loc, first_only, remaining).await;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn perform_search_once(
        &self,
        loc: &Locator,
        first_only: bool,
    ) -> Result<Vec<LiveResult>> {
        let search = self
            .call(
                "DOM.performSearch",
                json!({ "query": loc.expr, "includeUserAgentShadowDOM": true }),
            )
            .await?;
        let search_id = search["searchId"].as_str().unwrap_or_default().to_string();
        let count = search["resultCount"].as_i64().unwrap_or(0);
        if count == 0 {
            let _ = self
                .call("DOM.discardSearchResults", json!({ "searchId": search_id }))
                .await;
            return Ok(Vec::new());
        }
        let to_index = if first_only { 1 } else { count };
        let results = self
            .call(
                "DOM.getSearchResults",
                json!({ "searchId": search_id, "fromIndex": 0, "toIndex": to_index }),
            )
            .await?;
        let _ = self
            .call("DOM.discardSearchResults", json!({ "searchId": search_id }))
            .await;
        let mut out = Vec::new();
        for node_id in results["nodeIds"].as_array().into_iter().flatten() {
            if let Some(id) = node_id.as_i64() {
                out.push(LiveResult::Element(self.element_from_node_id(id).await?));
            }
        }
        Ok(out)
    }

    /// Wrap a search-result node, eagerly pinning the durable backend
    /// id — node ids must never be cached across load events.
    pub(crate) async fn element_from_node_id(&self, node_id: i64) -> Result<LiveElement> {
        let element = LiveElement::from_node_id(self.clone(), node_id);
        element.backend_id().await?;
        Ok(element)
    }

    /// Resolve a locator to a frame view. Errors when the match is
    /// not an iframe/frame.
    pub async fn get_frame(
        &self,
        loc: impl Into<Locator>,
    ) -> Result<crate::live::frame::FrameElement> {
        match self.ele(loc).await? {
            LiveResult::Frame(frame) => Ok(frame),
            LiveResult::Element(element) => {
                let tag = element.tag().await?;
                if matches!(tag.as_str(), "iframe" | "frame") {
                    Ok(crate::live::frame::FrameElement::new(element))
                } else {
                    Err(DualError::ElementNotFound(format!(
                        "matched <{tag}>, not a frame"
                    )))
                }
            }
            _ => Err(DualError::ElementNotFound(
                "locator resolved to a non-element".to_string(),
            )),
        }
    }

    /// The focused element.
    pub async fn active_ele(&self) -> Result<LiveElement> {
        let handle = self.run_js_handle("document.activeElement").await?;
        let object_id = handle["objectId"]
            .as_str()
            .ok_or_else(|| DualError::ElementNotFound("no active element".to_string()))?;
        Ok(LiveElement::from_object_id(
            self.clone(),
            object_id.to_string(),
        ))
    }

    // --------------------------------------------------------- cookies

    pub async fn cookies(&self) -> Result<Vec<Cookie>> {
        let reply = self.call("Network.getCookies", json!({})).await?;
        Ok(serde_json::from_value(reply["cookies"].clone()).unwrap_or_default())
    }

    /// Push cookies into the browser; entries without a domain are
    /// dropped.
    pub async fn set_cookies(&self, cookies: &[Cookie]) -> Result<()> {
        let entries: Vec<Value> = cookies.iter().filter_map(Cookie::to_cdp).collect();
        if entries.is_empty() {
            return Ok(());
        }
        self.call("Network.setCookies", json!({ "cookies": entries }))
            .await?;
        Ok(())
    }

    pub async fn clear_cookies(&self) -> Result<()> {
        self.call("Network.clearBrowserCookies", json!({})).await?;
        Ok(())
    }

    pub async fn clear_cache(&self) -> Result<()> {
        self.call("Network.clearBrowserCache", json!({})).await?;
        Ok(())
    }

    pub async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
        self.call(
            "Network.setUserAgentOverride",
            json!({ "userAgent": user_agent }),
        )
        .await?;
        Ok(())
    }

    pub async fn set_headers(&self, headers: &HashMap<String, String>) -> Result<()> {
        self.call("Network.setExtraHTTPHeaders", json!({ "headers": headers }))
            .await?;
        Ok(())
    }

    // --------------------------------------------------------- storage

    pub async fn session_storage(&self, key: &str) -> Result<Option<String>> {
        let expr = format!("sessionStorage.getItem({})", serde_json::to_string(key)?);
        Ok(self.run_js(&expr).await?.as_str().map(|s| s.to_string()))
    }

    /// `None` removes the key.
    pub async fn set_session_storage(&self, key: &str, value: Option<&str>) -> Result<()> {
        let key = serde_json::to_string(key)?;
        let expr = match value {
            Some(v) => format!("sessionStorage.setItem({key}, {})", serde_json::to_string(v)?),
            None => format!("sessionStorage.removeItem({key})"),
        };
        self.run_js(&expr).await?;
        Ok(())
    }

    pub async fn local_storage(&self, key: &str) -> Result<Option<String>> {
        let expr = format!("localStorage.getItem({})", serde_json::to_string(key)?);
        Ok(self.run_js(&expr).await?.as_str().map(|s| s.to_string()))
    }

    pub async fn set_local_storage(&self, key: &str, value: Option<&str>) -> Result<()> {
        let key = serde_json::to_string(key)?;
        let expr = match value {
            Some(v) => format!("localStorage.setItem({key}, {})", serde_json::to_string(v)?),
            None => format!("localStorage.removeItem({key})"),
        };
        self.run_js(&expr).await?;
        Ok(())
    }

    pub async fn clear_storage(&self) -> Result<()> {
        self.run_js("sessionStorage.clear(); localStorage.clear();")
            .await?;
        Ok(())
    }

    // --------------------------------------------------------- dialogs

    pub fn alert_state(&self) -> AlertState {
        self.shared.alert.lock().unwrap().clone()
    }

    /// Automatically accept (`Some(true)`) or dismiss (`Some(false)`)
    /// dialogs as they open; `None` turns auto-handling off.
    pub fn auto_handle_alert(&self, accept: Option<bool>) {
        *self.shared.auto_alert.lock().unwrap() = accept;
    }

    /// Wait for a dialog, answer it, and return its text. `None` when
    /// no dialog showed within the timeout.
    pub async fn handle_alert(
        &self,
        accept: bool,
        send: Option<&str>,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let state = self.alert_state();
            if state.active {
                let mut params = json!({ "accept": accept });
                if let (Some(text), DialogKind::Prompt) = (send, state.kind) {
                    params["promptText"] = json!(text);
                }
                self.call("Page.handleJavaScriptDialog", params).await?;
                return Ok(Some(state.text));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    // ------------------------------------------------------------ tabs

    /// Ids of all page targets, discovery order.
    pub async fn tab_ids(&self) -> Result<Vec<String>> {
        Ok(discovery::page_targets(&self.host)
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect())
    }

    /// Open a tab via `Target.createTarget` and attach to it.
    pub async fn new_tab(&self, url: Option<&str>, switch_to: bool) -> Result<Tab> {
        let reply = self
            .call(
                "Target.createTarget",
                json!({ "url": url.unwrap_or("about:blank") }),
            )
            .await?;
        let target_id = reply["targetId"]
            .as_str()
            .ok_or_else(|| DualError::BrowserConnect("createTarget gave no id".to_string()))?
            .to_string();
        if switch_to {
            discovery::activate_target(&self.host, &target_id).await?;
        }
        Tab::connect(&self.host, Some(&target_id), (*self.config).clone()).await
    }

    pub async fn activate(&self) -> Result<()> {
        discovery::activate_target(&self.host, &self.tab_id).await
    }

    /// Close this tab and stop its session.
    pub async fn close(&self) -> Result<()> {
        let _ = discovery::close_target(&self.host, &self.tab_id).await;
        self.session.stop().await;
        Ok(())
    }

    /// Close the given tabs and wait for the tab list to shrink to the
    /// expected cardinality.
    pub async fn close_tabs(&self, ids: &[String]) -> Result<()> {
        let before = self.tab_ids().await?;
        let closing: Vec<&String> = ids.iter().filter(|id| before.contains(id)).collect();
        if closing.is_empty() {
            return Ok(());
        }
        let expected = before.len() - closing.len();
        for id in &closing {
            discovery::close_target(&self.host, id).await?;
        }
        let deadline = tokio::time::Instant::now() + self.base_timeout();
        while tokio::time::Instant::now() < deadline {
            if self.tab_ids().await?.len() <= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        if closing.iter().any(|id| **id == self.tab_id) {
            self.session.stop().await;
        }
        Ok(())
    }

    pub async fn close_other_tabs(&self) -> Result<()> {
        let others: Vec<String> = self
            .tab_ids()
            .await?
            .into_iter()
            .filter(|id| *id != self.tab_id)
            .collect();
        self.close_tabs(&others).await
    }

    pub async fn stop(&self) {
        self.session.stop().await;
    }

    /// Close the whole browser (`Browser.close`) and stop the session.
    pub async fn quit(&self) -> Result<()> {
        let _ = self.call("Browser.close", json!({})).await;
        self.session.stop().await;
        Ok(())
    }

    // ---------------------------------------------------------- window

    async fn window_id(&self) -> Result<i64> {
        let reply = self.call("Browser.getWindowForTarget", json!({})).await?;
        reply["windowId"]
            .as_i64()
            .ok_or_else(|| DualError::Other("no window for target".to_string()))
    }

    pub async fn window_state(&self) -> Result<WindowState> {
        let reply = self.call("Browser.getWindowForTarget", json!({})).await?;
        Ok(WindowState::parse(
            reply["bounds"]["windowState"].as_str().unwrap_or("normal"),
        ))
    }

    /// Change the window state, passing through `normal` when crossing
    /// between fullscreen/maximized and minimized — Chrome rejects the
    /// direct transition.
    pub async fn set_window_state(&self, state: WindowState) -> Result<()> {
        let window_id = self.window_id().await?;
        let current = self.window_state().await?;
        if current == state {
            return Ok(());
        }
        if current != WindowState::Normal && state != WindowState::Normal {
            self.call(
                "Browser.setWindowBounds",
                json!({ "windowId": window_id, "bounds": { "windowState": "normal" } }),
            )
            .await?;
        }
        self.call(
            "Browser.setWindowBounds",
            json!({ "windowId": window_id, "bounds": { "windowState": state.as_str() } }),
        )
        .await?;
        Ok(())
    }

    pub async fn set_window_size(&self, width: i64, height: i64) -> Result<()> {
        self.set_window_state(WindowState::Normal).await?;
        let window_id = self.window_id().await?;
        self.call(
            "Browser.setWindowBounds",
            json!({ "windowId": window_id, "bounds": { "width": width, "height": height } }),
        )
        .await?;
        Ok(())
    }

    pub async fn set_window_location(&self, left: i64, top: i64) -> Result<()> {
        self.set_window_state(WindowState::Normal).await?;
        let window_id = self.window_id().await?;
        self.call(
            "Browser.setWindowBounds",
            json!({ "windowId": window_id, "bounds": { "left": left, "top": top } }),
        )
        .await?;
        Ok(())
    }

    // ----------------------------------------------- screenshots, etc.

    /// PNG screenshot; `full_page` captures beyond the viewport.
    pub async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>> {
        let params = if full_page {
            let metrics = self.call("Page.getLayoutMetrics", json!({})).await?;
            let size = &metrics["contentSize"];
            json!({
                "format": "png",
                "captureBeyondViewport": true,
                "clip": {
                    "x": 0,
                    "y": 0,
                    "width": size["width"].as_f64().unwrap_or(1280.0),
                    "height": size["height"].as_f64().unwrap_or(720.0),
                    "scale": 1,
                },
            })
        } else {
            json!({ "format": "png" })
        };
        let reply = self.call("Page.captureScreenshot", params).await?;
        let data = reply["data"]
            .as_str()
            .ok_or_else(|| DualError::Other("no screenshot data".to_string()))?;
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| DualError::Other(format!("bad screenshot payload: {e}")))
    }

    pub(crate) async fn main_frame_id(&self) -> Result<String> {
        let reply = self.call("Page.getFrameTree", json!({})).await?;
        Ok(reply["frameTree"]["frame"]["id"]
            .as_str()
            .unwrap_or(&self.tab_id)
            .to_string())
    }

    /// Bytes of a resource already loaded by the page.
    pub async fn get_resource(&self, url: &str) -> Result<Vec<u8>> {
        let frame_id = self.main_frame_id().await?;
        let reply = self
            .call(
                "Page.getResourceContent",
                json!({ "frameId": frame_id, "url": url }),
            )
            .await?;
        let content = reply["content"].as_str().unwrap_or_default();
        if content.is_empty() {
            return Err(DualError::NoResource(url.to_string()));
        }
        if reply["base64Encoded"].as_bool().unwrap_or(false) {
            base64::engine::general_purpose::STANDARD
                .decode(content)
                .map_err(|e| DualError::Other(format!("bad resource payload: {e}")))
        } else {
            Ok(content.as_bytes().to_vec())
        }
    }

    /// Route downloads into `path` and enable download events.
    pub async fn set_download_path(&self, path: &str) -> Result<()> {
        self.call(
            "Browser.setDownloadBehavior",
            json!({ "behavior": "allow", "downloadPath": path, "eventsEnabled": true }),
        )
        .await?;
        Ok(())
    }

    pub(crate) fn take_download_begun(&self) -> bool {
        self.shared.download_begun.swap(false, Ordering::SeqCst)
    }

    // ----------------------------------------------------------- input

    pub(crate) async fn visual_viewport_offset(&self) -> Result<(f64, f64)> {
        let reply = self.call("Page.getLayoutMetrics", json!({})).await?;
        let viewport = &reply["visualViewport"];
        Ok((
            viewport["pageX"].as_f64().unwrap_or(0.0),
            viewport["pageY"].as_f64().unwrap_or(0.0),
        ))
    }

    pub(crate) async fn dispatch_mouse_move(&self, x: f64, y: f64) -> Result<()> {
        self.call(
            "Input.dispatchMouseEvent",
            json!({ "type": "mouseMoved", "x": x, "y": y }),
        )
        .await?;
        Ok(())
    }

    /// Move first so the browser updates its hit-test target, then
    /// press and release.
    pub(crate) async fn dispatch_click(&self, x: f64, y: f64) -> Result<()> {
        self.dispatch_mouse_move(x, y).await?;
        self.call(
            "Input.dispatchMouseEvent",
            json!({
                "type": "mousePressed", "x": x, "y": y,
                "button": "left", "clickCount": 1,
            }),
        )
        .await?;
        self.call(
            "Input.dispatchMouseEvent",
            json!({
                "type": "mouseReleased", "x": x, "y": y,
                "button": "left", "clickCount": 1,
            }),
        )
        .await?;
        Ok(())
    }

    /// One keyDown/keyUp pair with the given held-modifier bitmap.
    pub(crate) async fn dispatch_key(&self, modifiers: u32, ch: char) -> Result<()> {
        let desc = keys::description_for(modifiers, ch);
        let mut down = json!({
            "type": "keyDown",
            "modifiers": modifiers,
            "key": desc.key,
            "code": desc.code,
            "windowsVirtualKeyCode": desc.key_code,
            "location": desc.location,
        });
        if !desc.text.is_empty() {
            down["text"] = json!(desc.text);
        }
        self.call("Input.dispatchKeyEvent", down).await?;
        self.call(
            "Input.dispatchKeyEvent",
            json!({
                "type": "keyUp",
                "modifiers": modifiers,
                "key": desc.key,
                "code": desc.code,
                "windowsVirtualKeyCode": desc.key_code,
                "location": desc.location,
            }),
        )
        .await?;
        Ok(())
    }

    /// Hold, move along a straight 50 Hz path, release. Steps shorter
    /// than 20 ms are stretched.
    pub(crate) async fn drag_path(
        &self,
        from: (f64, f64),
        to: (f64, f64),
        duration: Duration,
    ) -> Result<()> {
        let steps = ((duration.as_secs_f64() * 50.0).round() as usize).max(1);
        let step_pause = (duration / steps as u32).max(Duration::from_millis(20));

        self.dispatch_mouse_move(from.0, from.1).await?;
        self.call(
            "Input.dispatchMouseEvent",
            json!({
                "type": "mousePressed", "x": from.0, "y": from.1,
                "button": "left", "clickCount": 1,
            }),
        )
        .await?;
        for i in 1..=steps {
            let t = i as f64 / steps as f64;
            let x = from.0 + (to.0 - from.0) * t;
            let y = from.1 + (to.1 - from.1) * t;
            self.call(
                "Input.dispatchMouseEvent",
                json!({ "type": "mouseMoved", "x": x, "y": y, "button": "left" }),
            )
            .await?;
            tokio::time::sleep(step_pause).await;
        }
        self.call(
            "Input.dispatchMouseEvent",
            json!({
                "type": "mouseReleased", "x": to.0, "y": to.1,
                "button": "left", "clickCount": 1,
            }),
        )
        .await?;
        Ok(())
    }
}

/// Walk navigation history by `steps` (negative = back), counting a
/// step only when the URL actually changes — consecutive duplicate
/// entries are skipped.
fn walk_history(urls: &[&str], current: usize, steps: i64) -> usize {
    let mut idx = current as i64;
    let mut remaining = steps.abs();
    let direction = steps.signum();
    while remaining > 0 {
        let next = idx + direction;
        if next < 0 || next >= urls.len() as i64 {
            break;
        }
        if urls[next as usize] != urls[idx as usize] {
            remaining -= 1;
        }
        idx = next;
    }
    idx as usize
}
