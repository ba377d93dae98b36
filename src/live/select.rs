//! `<select>` handling: option reading and selection with a `change`
//! event dispatched after mutation, the way a real interaction would.

use std::time::Duration;

use serde_json::json;

use crate::error::{DualError, Result};
use crate::live::element::LiveElement;
use crate::live::query::{self, LiveResult};
use crate::locator::Locator;

/// Selection/deselection criterion.
enum Pick<'a> {
    Text(&'a str),
    Value(&'a str),
    Index(usize),
}

/// Wrapper over a live `<select>` element.
pub struct SelectList {
    inner: LiveElement,
}

impl SelectList {
    /// Wrap an element; errors unless its tag is `select`.
    pub async fn from(element: LiveElement) -> Result<Self> {
        let tag = element.tag().await?;
        if tag != "select" {
            return Err(DualError::Other(format!(
                "SelectList needs a <select>, got <{tag}>"
            )));
        }
        Ok(Self { inner: element })
    }

    pub fn element(&self) -> &LiveElement {
        &self.inner
    }

    /// Whether multiple selection is allowed.
    pub async fn is_multi(&self) -> Result<bool> {
        Ok(self.inner.attrs().await?.contains_key("multiple"))
    }

    /// All option descendants.
    pub async fn options(&self) -> Result<Vec<LiveElement>> {
        Ok(self
            .inner
            .eles("tag:option")
            .await?
            .into_iter()
            .filter_map(LiveResult::into_element)
            .collect())
    }

    /// The single selected option (`this.options[this.selectedIndex]`).
    pub async fn selected_option(&self) -> Result<Option<LiveElement>> {
        let handle = self
            .inner
            .call_js_handle(
                "function(){ return this.options[this.selectedIndex] || null; }",
                vec![],
            )
            .await?;
        Ok(handle["objectId"].as_str().map(|id| {
            LiveElement::from_object_id(self.inner.tab().clone(), id.to_string())
        }))
    }

    /// All selected options.
    pub async fn selected_options(&self) -> Result<Vec<LiveElement>> {
        let handle = self
            .inner
            .call_js_handle("function(){ return Array.from(this.selectedOptions); }", vec![])
            .await?;
        Ok(query::unwrap_remote(self.inner.tab(), &handle)
            .await?
            .into_iter()
            .filter_map(LiveResult::into_element)
            .collect())
    }

    pub async fn select_by_text(&self, text: &str, timeout: Duration) -> Result<bool> {
        self.apply(Pick::Text(text), true, timeout).await
    }

    pub async fn select_by_value(&self, value: &str, timeout: Duration) -> Result<bool> {
        self.apply(Pick::Value(value), true, timeout).await
    }

    /// 0-based option index.
    pub async fn select_by_index(&self, index: usize, timeout: Duration) -> Result<bool> {
        self.apply(Pick::Index(index), true, timeout).await
    }

    pub async fn deselect_by_text(&self, text: &str, timeout: Duration) -> Result<bool> {
        self.apply(Pick::Text(text), false, timeout).await
    }

    pub async fn deselect_by_value(&self, value: &str, timeout: Duration) -> Result<bool> {
        self.apply(Pick::Value(value), false, timeout).await
    }

    pub async fn deselect_by_index(&self, index: usize, timeout: Duration) -> Result<bool> {
        self.apply(Pick::Index(index), false, timeout).await
    }

    /// Select every option matching a locator.
    pub async fn select_by_locator(&self, loc: impl Into<Locator>) -> Result<bool> {
        let options = self
            .inner
            .eles(loc)
            .await?
            .into_iter()
            .filter_map(LiveResult::into_element)
            .collect::<Vec<_>>();
        if options.is_empty() {
            return Ok(false);
        }
        for option in &options {
            option.set_prop("selected", json!(true)).await?;
        }
        self.fire_change().await?;
        Ok(true)
    }

    /// Select all options (multi-select only).
    pub async fn select_all(&self) -> Result<()> {
        if !self.is_multi().await? {
            return Err(DualError::Other(
                "select_all needs a multi-select".to_string(),
            ));
        }
        self.inner
            .call_js(
                "function(){ \
                   for (const o of this.options) o.selected = true; \
                   this.dispatchEvent(new Event('change', {bubbles: true})); \
                 }",
                vec![],
            )
            .await?;
        Ok(())
    }

    pub async fn deselect_all(&self) -> Result<()> {
        self.inner
            .call_js(
                "function(){ \
                   for (const o of this.options) o.selected = false; \
                   this.dispatchEvent(new Event('change', {bubbles: true})); \
                 }",
                vec![],
            )
            .await?;
        Ok(())
    }

    /// Flip matching options, polling until a match exists or the
    /// timeout elapses (options may render asynchronously).
    async fn apply(&self, pick: Pick<'_>, selected: bool, timeout: Duration) -> Result<bool> {
        let (mode, needle) = match pick {
            Pick::Text(t) => ("text", json!(t)),
            Pick::Value(v) => ("value", json!(v)),
            Pick::Index(i) => ("index", json!(i)),
        };
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let hit = self
                .inner
                .call_js(
                    "function(mode, needle, selected){ \
                       let hit = false; \
                       const opts = this.options; \
                       for (let i = 0; i < opts.length; i++) { \
                         const o = opts[i]; \
                         const match = mode === 'text' ? o.innerText.trim() === needle \
                                     : mode === 'value' ? o.value === needle \
                                     : i === needle; \
                         if (match) { \
                           o.selected = selected; \
                           hit = true; \
                           if (!this.multiple) break; \
                         } \
                       } \
                       if (hit) this.dispatchEvent(new Event('change', {bubbles: true})); \
                       return hit; \
                     }",
                    vec![json!(mode), needle.clone(), json!(selected)],
                )
                .await?;
            if hit.as_bool().unwrap_or(false) {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn fire_change(&self) -> Result<()> {
        self.inner
            .call_js(
                "function(){ this.dispatchEvent(new Event('change', {bubbles: true})); }",
                vec![],
            )
            .await?;
        Ok(())
    }
}
