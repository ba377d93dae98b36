//! A DOM node in a live tab, addressed by up to three remote
//! identities:
//!
//! - `node_id` — session-local, invalidated when the document rebuilds
//! - `object_id` — JS heap handle, valid until its context is discarded
//! - `backend_id` — browser-process stable, the most durable
//!
//! At least one identity is known at construction; the others resolve
//! lazily. After a document update the backend id is used to recover
//! the rest.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use serde_json::{json, Value};
use url::Url;

use crate::error::{DualError, Result};
use crate::keys::{self, Keys};
use crate::live::query::{self, LiveResult};
use crate::live::tab::Tab;
use crate::locator::Locator;

#[derive(Default)]
struct Ids {
    node_id: Option<i64>,
    object_id: Option<String>,
    backend_id: Option<i64>,
}

/// Border/padding quads from `DOM.getBoxModel`, in viewport
/// coordinates.
#[derive(Debug, Clone, Copy)]
pub struct BoxModel {
    pub border: [f64; 8],
    pub padding: [f64; 8],
    pub width: f64,
    pub height: f64,
}

impl BoxModel {
    /// Top-left corner of the border box.
    pub fn location(&self) -> (f64, f64) {
        (self.border[0], self.border[1])
    }

    /// Center of the border box.
    pub fn midpoint(&self) -> (f64, f64) {
        (
            (self.border[0] + self.border[4]) / 2.0,
            (self.border[1] + self.border[5]) / 2.0,
        )
    }

    /// Where clicks are aimed: horizontal midpoint, one pixel below
    /// the top of the padding box. Stays inside the element even when
    /// the top border has a clickable gap.
    pub fn click_point(&self) -> (f64, f64) {
        (self.midpoint().0, self.padding[1] + 1.0)
    }
}

/// Wrapper over a remote DOM node. Clones share identity caches.
#[derive(Clone)]
pub struct LiveElement {
    tab: Tab,
    ids: Arc<Mutex<Ids>>,
    tag: Arc<Mutex<Option<String>>>,
}

impl std::fmt::Debug for LiveElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids = self.ids.lock().unwrap();
        f.debug_struct("LiveElement")
            .field("node_id", &ids.node_id)
            .field("backend_id", &ids.backend_id)
            .finish()
    }
}

impl LiveElement {
    /// Wrap a session-local node id (e.g. from a DOM search result).
    pub fn from_node_id(tab: Tab, node_id: i64) -> Self {
        Self::with_ids(
            tab,
            Ids {
                node_id: Some(node_id),
                ..Default::default()
            },
        )
    }

    /// Wrap a JS heap handle (e.g. from `Runtime.evaluate`).
    pub fn from_object_id(tab: Tab, object_id: String) -> Self {
        Self::with_ids(
            tab,
            Ids {
                object_id: Some(object_id),
                ..Default::default()
            },
        )
    }

    /// Wrap a browser-stable backend node id.
    pub fn from_backend_id(tab: Tab, backend_id: i64) -> Self {
        Self::with_ids(
            tab,
            Ids {
                backend_id: Some(backend_id),
                ..Default::default()
            },
        )
    }

    fn with_ids(tab: Tab, ids: Ids) -> Self {
        Self {
            tab,
            ids: Arc::new(Mutex::new(ids)),
            tag: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn tab(&self) -> &Tab {
        &self.tab
    }

    // ---------------------------------------------- identity handling

    /// The durable identity; resolved through `DOM.describeNode` from
    /// whichever id is available.
    pub async fn backend_id(&self) -> Result<i64> {
        if let Some(id) = self.ids.lock().unwrap().backend_id {
            return Ok(id);
        }
        let params = {
            let ids = self.ids.lock().unwrap();
            if let Some(node_id) = ids.node_id {
                json!({ "nodeId": node_id })
            } else if let Some(object_id) = &ids.object_id {
                json!({ "objectId": object_id })
            } else {
                return Err(DualError::ElementLost("element has no identity".to_string()));
            }
        };
        let reply = self.tab.call("DOM.describeNode", params).await?;
        let node = &reply["node"];
        let backend = node["backendNodeId"]
            .as_i64()
            .ok_or_else(|| DualError::ElementLost("describeNode had no backend id".to_string()))?;
        {
            let mut ids = self.ids.lock().unwrap();
            ids.backend_id = Some(backend);
        }
        if let Some(name) = node["localName"].as_str() {
            *self.tag.lock().unwrap() = Some(name.to_string());
        }
        Ok(backend)
    }

    /// JS heap handle, re-resolved from the backend id when missing.
    pub async fn object_id(&self) -> Result<String> {
        if let Some(id) = self.ids.lock().unwrap().object_id.clone() {
            return Ok(id);
        }
        let backend = self.backend_id().await?;
        let reply = self
            .tab
            .call("DOM.resolveNode", json!({ "backendNodeId": backend }))
            .await?;
        let object_id = reply["object"]["objectId"]
            .as_str()
            .ok_or_else(|| DualError::ElementLost("resolveNode returned no object".to_string()))?
            .to_string();
        self.ids.lock().unwrap().object_id = Some(object_id.clone());
        Ok(object_id)
    }

    /// Session-local id; never cached across document updates.
    pub async fn node_id(&self) -> Result<i64> {
        if let Some(id) = self.ids.lock().unwrap().node_id {
            return Ok(id);
        }
        let object_id = self.object_id().await?;
        let reply = self
            .tab
            .call("DOM.requestNode", json!({ "objectId": object_id }))
            .await?;
        let node_id = reply["nodeId"]
            .as_i64()
            .filter(|id| *id != 0)
            .ok_or_else(|| DualError::ElementLost("requestNode returned no node id".to_string()))?;
        self.ids.lock().unwrap().node_id = Some(node_id);
        Ok(node_id)
    }

    /// Drop the ephemeral identities so the next call re-resolves from
    /// the backend id. Used after the document was replaced.
    pub(crate) fn invalidate_ephemeral(&self) {
        let mut ids = self.ids.lock().unwrap();
        if ids.backend_id.is_some() {
            ids.node_id = None;
            ids.object_id = None;
        }
    }

    /// Run a CDP call that needs the backend id, recovering once if
    /// the remote side reports the node gone.
    async fn call_with_backend(&self, method: &str, mut params: Value) -> Result<Value> {
        let backend = self.backend_id().await?;
        params["backendNodeId"] = json!(backend);
        match self.tab.call(method, params.clone()).await {
            Err(DualError::ElementLost(_)) => {
                self.invalidate_ephemeral();
                let backend = self.backend_id().await?;
                params["backendNodeId"] = json!(backend);
                self.tab.call(method, params).await
            }
            other => other,
        }
    }

    // ------------------------------------------------------ JS access

    /// Call a JS function with `this` bound to the element.
    pub async fn call_js(&self, function: &str, args: Vec<Value>) -> Result<Value> {
        query::call_function_on(&self.tab, &self.object_id().await?, function, args, true).await
    }

    /// Same, but keep the result as a remote object handle.
    pub(crate) async fn call_js_handle(&self, function: &str, args: Vec<Value>) -> Result<Value> {
        query::call_function_on(&self.tab, &self.object_id().await?, function, args, false).await
    }

    /// JS property value.
    pub async fn prop(&self, name: &str) -> Result<Value> {
        let object_id = self.object_id().await?;
        let reply = self
            .tab
            .call(
                "Runtime.getProperties",
                json!({ "objectId": object_id, "ownProperties": true }),
            )
            .await?;
        if let Some(props) = reply["result"].as_array() {
            for prop in props {
                if prop["name"].as_str() == Some(name) {
                    if let Some(value) = prop["value"].get("value") {
                        return Ok(value.clone());
                    }
                }
            }
        }
        // Accessor properties (innerText and friends) don't show up as
        // own properties; read them through a function call instead.
        self.call_js("function(n){ return this[n]; }", vec![json!(name)])
            .await
    }

    pub async fn set_prop(&self, name: &str, value: Value) -> Result<()> {
        self.call_js(
            "function(n, v){ this[n] = v; }",
            vec![json!(name), value],
        )
        .await?;
        Ok(())
    }

    // ----------------------------------------------------- properties

    /// Lowercase tag name.
    pub async fn tag(&self) -> Result<String> {
        if let Some(tag) = self.tag.lock().unwrap().clone() {
            return Ok(tag);
        }
        // describeNode fills the tag cache as a side effect.
        self.invalidate_tag_and_describe().await?;
        let tag = self.tag.lock().unwrap().clone();
        tag.ok_or_else(|| DualError::ElementLost("node has no tag".to_string()))
    }

    async fn invalidate_tag_and_describe(&self) -> Result<()> {
        let object_id = self.object_id().await?;
        let reply = self
            .tab
            .call("DOM.describeNode", json!({ "objectId": object_id }))
            .await?;
        if let Some(name) = reply["node"]["localName"].as_str() {
            *self.tag.lock().unwrap() = Some(name.to_string());
        }
        Ok(())
    }

    /// Attributes as read from the HTML source (`DOM.getAttributes`).
    pub async fn attrs(&self) -> Result<BTreeMap<String, String>> {
        let node_id = match self.node_id().await {
            Ok(id) => id,
            Err(DualError::ElementLost(_)) => {
                self.invalidate_ephemeral();
                self.node_id().await?
            }
            Err(e) => return Err(e),
        };
        let reply = self
            .tab
            .call("DOM.getAttributes", json!({ "nodeId": node_id }))
            .await?;
        let flat = reply["attributes"].as_array().cloned().unwrap_or_default();
        let mut map = BTreeMap::new();
        for pair in flat.chunks(2) {
            if let [k, v] = pair {
                map.insert(
                    k.as_str().unwrap_or_default().to_string(),
                    v.as_str().unwrap_or_default().to_string(),
                );
            }
        }
        Ok(map)
    }

    /// One attribute, with the synthetic names `text`, `innerText`,
    /// `html`, `innerHTML`, `outerHTML` intercepted and `href`/`src`
    /// made absolute.
    pub async fn attr(&self, name: &str) -> Result<Option<String>> {
        match name {
            "text" | "innerText" => return Ok(Some(self.text().await?)),
            "html" | "innerHTML" => return Ok(Some(self.inner_html().await?)),
            "outerHTML" => return Ok(Some(self.outer_html().await?)),
            _ => {}
        }
        let value = self.attrs().await?.get(name).cloned();
        if let ("href" | "src", Some(raw)) = (name, &value) {
            let trimmed = raw.trim();
            if trimmed.starts_with("javascript:") || trimmed.starts_with("mailto:") {
                return Ok(value);
            }
            let page_url = self.tab.url().await?;
            if let Ok(base) = Url::parse(&page_url) {
                if let Ok(joined) = base.join(trimmed) {
                    return Ok(Some(joined.to_string()));
                }
            }
        }
        Ok(value)
    }

    /// Rendered text (`innerText`).
    pub async fn text(&self) -> Result<String> {
        Ok(self
            .prop("innerText")
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    /// Raw text content (`textContent`).
    pub async fn raw_text(&self) -> Result<String> {
        Ok(self
            .prop("textContent")
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    pub async fn inner_html(&self) -> Result<String> {
        Ok(self
            .call_js("function(){ return this.innerHTML; }", vec![])
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    pub async fn outer_html(&self) -> Result<String> {
        let reply = self.call_with_backend("DOM.getOuterHTML", json!({})).await?;
        Ok(reply["outerHTML"].as_str().unwrap_or_default().to_string())
    }

    // --------------------------------------------------------- queries

    /// First match under this element, or `ElementNotFound`.
    pub async fn ele(&self, loc: impl Into<Locator>) -> Result<LiveResult> {
        let loc = loc.into();
        self.try_ele(loc.clone())
            .await?
            .ok_or(DualError::ElementNotFound(loc.expr))
    }

    /// First match, or `None` after the timeout.
    pub async fn try_ele(&self, loc: impl Into<Locator>) -> Result<Option<LiveResult>> {
        query::query_under(self, &loc.into(), true, self.tab.base_timeout())
            .await
            .map(|mut v| v.pop())
    }

    /// All matches; polls until at least one exists or the timeout
    /// elapses.
    pub async fn eles(&self, loc: impl Into<Locator>) -> Result<Vec<LiveResult>> {
        query::query_under(self, &loc.into(), false, self.tab.base_timeout()).await
    }

    /// Ancestor `level` steps up.
    pub async fn parent(&self, level: usize) -> Result<Option<LiveElement>> {
        let expr = vec![".."; level.max(1)].join("/");
        let found = query::query_under(
            self,
            &Locator::xpath(expr),
            true,
            Duration::from_millis(0),
        )
        .await?;
        Ok(found.into_iter().next().and_then(LiveResult::into_element))
    }

    /// 1-based following element sibling.
    pub async fn next(&self, index: usize) -> Result<Option<LiveElement>> {
        self.relative("following-sibling", index).await
    }

    /// 1-based preceding element sibling (nearest first).
    pub async fn prev(&self, index: usize) -> Result<Option<LiveElement>> {
        self.relative("preceding-sibling", index).await
    }

    /// 1-based element after this one in document order, descendants
    /// excluded.
    pub async fn after(&self, index: usize) -> Result<Option<LiveElement>> {
        self.relative("following", index).await
    }

    /// 1-based element before this one in document order, ancestors
    /// excluded (nearest first).
    pub async fn before(&self, index: usize) -> Result<Option<LiveElement>> {
        self.relative("preceding", index).await
    }

    pub async fn nexts(&self) -> Result<Vec<LiveElement>> {
        self.relatives("following-sibling").await
    }

    pub async fn prevs(&self) -> Result<Vec<LiveElement>> {
        self.relatives("preceding-sibling").await
    }

    /// Element children, via the browser's own xpath engine.
    pub async fn children(&self) -> Result<Vec<LiveElement>> {
        self.relatives("child").await
    }

    async fn relative(&self, axis: &str, index: usize) -> Result<Option<LiveElement>> {
        let expr = format!("{axis}::*[{}]", index.max(1));
        let found = query::query_under(
            self,
            &Locator::xpath(expr),
            true,
            Duration::from_millis(0),
        )
        .await?;
        Ok(found.into_iter().next().and_then(LiveResult::into_element))
    }

    async fn relatives(&self, axis: &str) -> Result<Vec<LiveElement>> {
        let found = query::query_under(
            self,
            &Locator::xpath(format!("{axis}::*")),
            false,
            Duration::from_millis(0),
        )
        .await?;
        Ok(found
            .into_iter()
            .filter_map(LiveResult::into_element)
            .collect())
    }

    /// The element's shadow root, if it has one.
    pub async fn shadow_root(&self) -> Result<Option<crate::live::frame::ShadowRootElement>> {
        let handle = self
            .call_js_handle("function(){ return this.shadowRoot; }", vec![])
            .await?;
        match handle.get("objectId").and_then(Value::as_str) {
            Some(object_id) => Ok(Some(crate::live::frame::ShadowRootElement::new(
                self.clone(),
                object_id.to_string(),
            ))),
            None => Ok(None),
        }
    }

    // -------------------------------------------------------- geometry

    /// Border and padding quads; `NoRect` when the element has no
    /// layout.
    pub async fn box_model(&self) -> Result<BoxModel> {
        let reply = match self.call_with_backend("DOM.getBoxModel", json!({})).await {
            Ok(r) => r,
            Err(DualError::CdpError { message, .. }) => {
                return Err(DualError::NoRect(message));
            }
            Err(e) => return Err(e),
        };
        let model = &reply["model"];
        let quad = |name: &str| -> Result<[f64; 8]> {
            let values = model[name]
                .as_array()
                .ok_or_else(|| DualError::NoRect(format!("missing {name} quad")))?;
            let mut out = [0.0; 8];
            for (i, v) in values.iter().take(8).enumerate() {
                out[i] = v.as_f64().unwrap_or(0.0);
            }
            Ok(out)
        };
        Ok(BoxModel {
            border: quad("border")?,
            padding: quad("padding")?,
            width: model["width"].as_f64().unwrap_or(0.0),
            height: model["height"].as_f64().unwrap_or(0.0),
        })
    }

    pub async fn viewport_location(&self) -> Result<(f64, f64)> {
        Ok(self.box_model().await?.location())
    }

    pub async fn viewport_midpoint(&self) -> Result<(f64, f64)> {
        Ok(self.box_model().await?.midpoint())
    }

    pub async fn viewport_click_point(&self) -> Result<(f64, f64)> {
        Ok(self.box_model().await?.click_point())
    }

    /// Page-absolute coordinates: viewport location plus the visual
    /// viewport's scroll offset.
    pub async fn location(&self) -> Result<(f64, f64)> {
        let (x, y) = self.viewport_location().await?;
        let (page_x, page_y) = self.tab.visual_viewport_offset().await?;
        Ok((x + page_x, y + page_y))
    }

    pub async fn size(&self) -> Result<(f64, f64)> {
        let model = self.box_model().await?;
        Ok((model.width, model.height))
    }

    // ------------------------------------------------ state predicates

    /// Not hidden by visibility, display or a missing offset parent.
    pub async fn is_displayed(&self) -> Result<bool> {
        let value = self
            .call_js(
                "function(){ \
                   const s = getComputedStyle(this); \
                   return !(s.visibility === 'hidden' \
                            || s.display === 'none' \
                            || (this.offsetParent === null && s.position !== 'fixed')); \
                 }",
                vec![],
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    pub async fn is_enabled(&self) -> Result<bool> {
        let value = self
            .call_js("function(){ return !this.disabled; }", vec![])
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    pub async fn is_selected(&self) -> Result<bool> {
        let value = self
            .call_js(
                "function(){ return !!(this.selected || this.checked); }",
                vec![],
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Whether the click point falls inside the viewport.
    pub async fn is_in_viewport(&self) -> Result<bool> {
        let (x, y) = match self.viewport_click_point().await {
            Ok(point) => point,
            Err(DualError::NoRect(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        let value = self
            .call_js(
                "function(x, y){ \
                   const w = document.documentElement.clientWidth; \
                   const h = document.documentElement.clientHeight; \
                   return x >= 0 && y >= 0 && x <= w && y <= h; \
                 }",
                vec![json!(x), json!(y)],
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Whether another node sits on top of the click point.
    pub async fn is_covered(&self) -> Result<bool> {
        let (x, y) = match self.viewport_click_point().await {
            Ok(point) => point,
            Err(DualError::NoRect(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        let reply = self
            .tab
            .call(
                "DOM.getNodeForLocation",
                json!({ "x": x as i64, "y": y as i64 }),
            )
            .await;
        let hit_backend = match reply {
            Ok(r) => r["backendNodeId"].as_i64(),
            // No node at that point: nothing covering us either.
            Err(DualError::CdpError { .. }) => return Ok(false),
            Err(e) => return Err(e),
        };
        match hit_backend {
            Some(hit) => {
                let own = self.backend_id().await?;
                if hit == own {
                    return Ok(false);
                }
                // A hit inside our own subtree is not coverage.
                let descendant = self
                    .call_js(
                        "function(){ \
                           const el = document.elementFromPoint(arguments[0], arguments[1]); \
                           return el !== null && this.contains(el); \
                         }",
                        vec![json!(x), json!(y)],
                    )
                    .await?;
                Ok(!descendant.as_bool().unwrap_or(false))
            }
            None => Ok(false),
        }
    }

    /// Whether the remote node still resolves at all.
    pub async fn is_alive(&self) -> bool {
        self.attrs().await.is_ok()
    }

    // ----------------------------------------------------- interaction

    pub async fn scroll_into_view(&self) -> Result<()> {
        let result = self
            .call_with_backend("DOM.scrollIntoViewIfNeeded", json!({}))
            .await;
        if result.is_err() {
            self.call_js(
                "function(){ this.scrollIntoView({block: 'center', inline: 'nearest'}); }",
                vec![],
            )
            .await?;
        }
        Ok(())
    }

    pub async fn focus(&self) -> Result<()> {
        if self.call_with_backend("DOM.focus", json!({})).await.is_err() {
            self.call_js("function(){ this.focus(); }", vec![]).await?;
        }
        Ok(())
    }

    pub async fn hover(&self) -> Result<()> {
        let (x, y) = self.viewport_midpoint().await?;
        self.tab.dispatch_mouse_move(x, y).await
    }

    /// Click the element.
    ///
    /// - `by_js = Some(true)`: click through JS, no precondition checks.
    /// - `by_js = Some(false)`: real mouse click or `CannotClick`.
    /// - `by_js = None`: real mouse click when possible, JS fallback
    ///   when the element is covered or never enters the viewport.
    pub async fn click(&self, by_js: Option<bool>) -> Result<()> {
        if by_js == Some(true) {
            return self.click_by_js().await;
        }

        self.scroll_into_view().await?;
        let ready = self.wait_clickable(self.tab.base_timeout()).await?;
        if !ready {
            if by_js.is_none() {
                return self.click_by_js().await;
            }
            return Err(DualError::CannotClick(
                "element never became visible, enabled and in viewport".to_string(),
            ));
        }

        if self.is_covered().await? {
            if by_js.is_none() {
                return self.click_by_js().await;
            }
            return Err(DualError::CannotClick(
                "element is covered by another node".to_string(),
            ));
        }

        let (x, y) = self.viewport_click_point().await?;
        self.tab.dispatch_click(x, y).await
    }

    async fn click_by_js(&self) -> Result<()> {
        self.call_js("function(){ this.click(); }", vec![]).await?;
        Ok(())
    }

    async fn wait_clickable(&self, timeout: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let ok = self.is_displayed().await.unwrap_or(false)
                && self.is_enabled().await.unwrap_or(false)
                && self.is_in_viewport().await.unwrap_or(false);
            if ok {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Type into the element.
    ///
    /// File inputs take newline-separated paths. Sequences containing
    /// modifier keys dispatch key by key; plain text goes through
    /// `Input.insertText`, with a synthetic Enter when the text ends
    /// in a newline.
    pub async fn input(&self, text: &str, clear: bool) -> Result<()> {
        if self.tag().await? == "input" {
            let input_type = self.attrs().await?.get("type").cloned().unwrap_or_default();
            if input_type == "file" {
                let files: Vec<&str> = text.lines().filter(|l| !l.is_empty()).collect();
                return self
                    .call_with_backend("DOM.setFileInputFiles", json!({ "files": files }))
                    .await
                    .map(|_| ());
            }
        }

        if clear {
            self.clear().await?;
        }
        self.focus().await?;

        let (modifiers, remaining) = keys::keys_to_typing(text.chars());
        if modifiers != 0 {
            for ch in remaining.chars() {
                self.tab.dispatch_key(modifiers, ch).await?;
            }
            return Ok(());
        }

        let ends_with_newline = text.ends_with('\n');
        let body = if ends_with_newline {
            &text[..text.len() - 1]
        } else {
            text
        };
        if !body.is_empty() {
            self.tab
                .call("Input.insertText", json!({ "text": body }))
                .await?;
        }
        if ends_with_newline {
            self.tab.dispatch_key(0, Keys::ENTER).await?;
        }
        Ok(())
    }

    /// Set a checkbox/radio to the wanted state, with a `change`
    /// event when it flips.
    pub async fn check(&self, state: bool) -> Result<()> {
        self.call_js(
            "function(state){ \
               if (this.checked !== state) { \
                 this.checked = state; \
                 this.dispatchEvent(new Event('change', {bubbles: true})); \
               } \
             }",
            vec![json!(state)],
        )
        .await?;
        Ok(())
    }

    /// View this element as a `<select>` list.
    pub async fn select_list(&self) -> Result<crate::live::select::SelectList> {
        crate::live::select::SelectList::from(self.clone()).await
    }

    /// Select-all plus delete through the key path.
    pub async fn clear(&self) -> Result<()> {
        self.focus().await?;
        self.tab.dispatch_key(keys::MODIFIER_CTRL, 'a').await?;
        self.tab.dispatch_key(0, Keys::DELETE).await?;
        Ok(())
    }

    /// Drag from the element's midpoint to an absolute point, moving
    /// at 50 Hz over `duration`.
    pub async fn drag_to_point(&self, target: (f64, f64), duration: Duration) -> Result<()> {
        self.scroll_into_view().await?;
        let start = self.viewport_midpoint().await?;
        self.tab.drag_path(start, target, duration).await
    }

    /// Drag onto another element's midpoint.
    pub async fn drag_to(&self, other: &LiveElement, duration: Duration) -> Result<()> {
        other.scroll_into_view().await?;
        let target = other.viewport_midpoint().await?;
        self.drag_to_point(target, duration).await
    }

    /// PNG screenshot clipped to the border box.
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        self.scroll_into_view().await?;
        let model = self.box_model().await?;
        let (x, y) = model.location();
        let reply = self
            .tab
            .call(
                "Page.captureScreenshot",
                json!({
                    "format": "png",
                    "clip": {
                        "x": x,
                        "y": y,
                        "width": model.width,
                        "height": model.height,
                        "scale": 1,
                    },
                }),
            )
            .await?;
        let data = reply["data"]
            .as_str()
            .ok_or_else(|| DualError::Other("no screenshot data".to_string()))?;
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| DualError::Other(format!("bad screenshot payload: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_point_sits_below_padding_top() {
        let model = BoxModel {
            border: [10.0, 20.0, 110.0, 20.0, 110.0, 60.0, 10.0, 60.0],
            padding: [12.0, 24.0, 108.0, 24.0, 108.0, 56.0, 12.0, 56.0],
            width: 100.0,
            height: 40.0,
        };
        assert_eq!(model.location(), (10.0, 20.0));
        assert_eq!(model.midpoint(), (60.0, 40.0));
        // Horizontal midpoint, one pixel under the padding top edge.
        assert_eq!(model.click_point(), (60.0, 25.0));
    }

    #[test]
    fn click_point_at_viewport_edge_stays_in_padding_box() {
        // Element flush with the viewport top: y = padding_top + 1
        // is still inside the element.
        let model = BoxModel {
            border: [0.0, 0.0, 50.0, 0.0, 50.0, 30.0, 0.0, 30.0],
            padding: [0.0, 0.0, 50.0, 0.0, 50.0, 30.0, 0.0, 30.0],
            width: 50.0,
            height: 30.0,
        };
        let (x, y) = model.click_point();
        assert!(x > 0.0 && x < 50.0);
        assert!(y > 0.0 && y < 30.0);
    }
}
