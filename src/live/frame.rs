//! Frame and shadow-root boundaries.
//!
//! Same-origin frames share the parent tab's CDP session; their
//! content document is reachable as `this.contentDocument` from the
//! host element. Cross-origin frames are separate targets: they get
//! their own CDP session addressed by frame id, and their document is
//! re-read through `DOM.getDocument` on that session.
//!
//! Shadow roots cannot be searched with xpath through CDP, so queries
//! serialize the shadow subtree, run against a transient static
//! parse, and re-resolve each hit inside the shadow by CSS path.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;

use crate::cdp::discovery;
use crate::error::{DualError, Result};
use crate::live::element::LiveElement;
use crate::live::query::{self, LiveResult};
use crate::live::tab::Tab;
use crate::locator::Locator;
use crate::statics::element::{StaticElement, StaticResult};

#[derive(Clone)]
struct FrameInfo {
    frame_id: String,
    same_origin: bool,
    /// Session for a cross-origin frame's own target.
    frame_tab: Option<Tab>,
}

/// An iframe/frame host element plus its routing state.
#[derive(Clone)]
pub struct FrameElement {
    host: LiveElement,
    info: Arc<Mutex<Option<FrameInfo>>>,
}

impl std::fmt::Debug for FrameElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameElement").finish_non_exhaustive()
    }
}

impl FrameElement {
    pub(crate) fn new(host: LiveElement) -> Self {
        Self {
            host,
            info: Arc::new(Mutex::new(None)),
        }
    }

    pub fn host(&self) -> &LiveElement {
        &self.host
    }

    pub fn into_host(self) -> LiveElement {
        self.host
    }

    async fn info(&self) -> Result<FrameInfo> {
        let mut guard = self.info.lock().await;
        if let Some(info) = guard.as_ref() {
            return Ok(info.clone());
        }

        let object_id = self.host.object_id().await?;
        let reply = self
            .host
            .tab()
            .call("DOM.describeNode", json!({ "objectId": object_id }))
            .await?;
        let node = &reply["node"];
        let frame_id = node["frameId"]
            .as_str()
            .ok_or_else(|| DualError::Other("frame host has no frame id".to_string()))?
            .to_string();
        // Same-origin frames expose their document inline.
        let same_origin = !node["contentDocument"].is_null();

        let frame_tab = if same_origin {
            None
        } else {
            let tab = self.host.tab();
            let ws_url = discovery::page_ws_url(tab.host(), &frame_id);
            Some(Tab::attach(&ws_url, tab.host(), &frame_id, tab.config().clone()).await?)
        };

        let info = FrameInfo {
            frame_id,
            same_origin,
            frame_tab,
        };
        *guard = Some(info.clone());
        Ok(info)
    }

    pub async fn frame_id(&self) -> Result<String> {
        Ok(self.info().await?.frame_id)
    }

    pub async fn is_same_origin(&self) -> Result<bool> {
        Ok(self.info().await?.same_origin)
    }

    /// First match inside the frame document, or `ElementNotFound`.
    pub async fn ele(&self, loc: impl Into<Locator>) -> Result<LiveResult> {
        let loc = loc.into();
        self.try_ele(loc.clone())
            .await?
            .ok_or(DualError::ElementNotFound(loc.expr))
    }

    pub async fn try_ele(&self, loc: impl Into<Locator>) -> Result<Option<LiveResult>> {
        Ok(self.query(&loc.into(), true).await?.into_iter().next())
    }

    pub async fn eles(&self, loc: impl Into<Locator>) -> Result<Vec<LiveResult>> {
        self.query(&loc.into(), false).await
    }

    async fn query(&self, loc: &Locator, first_only: bool) -> Result<Vec<LiveResult>> {
        let info = self.info().await?;
        match &info.frame_tab {
            // Same origin: the host's content document answers on the
            // parent session.
            None => {
                query::query_under(&self.host, loc, first_only, self.host.tab().base_timeout())
                    .await
            }
            // Cross origin: the frame's own session, document re-read.
            Some(frame_tab) => {
                let root = frame_tab.root_object().await?;
                query::query_on_object(frame_tab, &root, loc, first_only, frame_tab.base_timeout())
                    .await
            }
        }
    }

    /// The frame document's serialized HTML.
    pub async fn html(&self) -> Result<String> {
        let info = self.info().await?;
        match &info.frame_tab {
            None => Ok(self
                .host
                .call_js(
                    "function(){ return this.contentDocument.documentElement.outerHTML; }",
                    vec![],
                )
                .await?
                .as_str()
                .unwrap_or_default()
                .to_string()),
            Some(frame_tab) => frame_tab.html().await,
        }
    }
}

/// A shadow root, addressed like an element but queried through a
/// static re-parse of its serialized subtree.
#[derive(Clone)]
pub struct ShadowRootElement {
    host: LiveElement,
    object_id: String,
}

impl std::fmt::Debug for ShadowRootElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowRootElement").finish_non_exhaustive()
    }
}

impl ShadowRootElement {
    pub(crate) fn new(host: LiveElement, object_id: String) -> Self {
        Self { host, object_id }
    }

    pub fn host(&self) -> &LiveElement {
        &self.host
    }

    pub async fn inner_html(&self) -> Result<String> {
        let value = query::call_function_on(
            self.host.tab(),
            &self.object_id,
            "function(){ return this.innerHTML; }",
            vec![],
            true,
        )
        .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// First match, or `ElementNotFound`.
    pub async fn ele(&self, loc: impl Into<Locator>) -> Result<LiveResult> {
        let loc = loc.into();
        self.try_ele(loc.clone())
            .await?
            .ok_or(DualError::ElementNotFound(loc.expr))
    }

    pub async fn try_ele(&self, loc: impl Into<Locator>) -> Result<Option<LiveResult>> {
        Ok(self.eles(loc).await?.into_iter().next())
    }

    /// Run the locator on a static parse of the shadow HTML, then
    /// re-resolve each element match live by its CSS path.
    pub async fn eles(&self, loc: impl Into<Locator>) -> Result<Vec<LiveResult>> {
        let loc = loc.into();
        let html = self.inner_html().await?;
        let snapshot = StaticElement::from_html(&format!("<div>{html}</div>"), None)?;
        let matches = snapshot.eles(loc)?;

        let mut out = Vec::new();
        for hit in matches {
            match hit {
                StaticResult::Element(static_el) => {
                    // Path is computed inside our synthetic wrapper div;
                    // drop its leading segment so it applies to the
                    // shadow root's own children.
                    let path = static_el.css_path_below(&snapshot);
                    if path.is_empty() {
                        continue;
                    }
                    let handle = query::call_function_on(
                        self.host.tab(),
                        &self.object_id,
                        "function(p){ return this.querySelector(p); }",
                        vec![json!(path)],
                        false,
                    )
                    .await?;
                    if let Some(object_id) = handle["objectId"].as_str() {
                        out.push(LiveResult::Element(LiveElement::from_object_id(
                            self.host.tab().clone(),
                            object_id.to_string(),
                        )));
                    }
                }
                StaticResult::Str(s) => out.push(LiveResult::Str(s)),
                StaticResult::Num(n) => out.push(LiveResult::Num(n)),
            }
        }
        Ok(out)
    }
}
