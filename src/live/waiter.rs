//! State waiters, scroll helpers, and geometry accessors.
//!
//! Element waiters poll a predicate at 20 Hz until the deadline and
//! report the final state as a bool; they never raise on a plain
//! timeout.

use std::time::Duration;

use serde_json::json;

use crate::error::Result;
use crate::live::element::LiveElement;
use crate::live::tab::Tab;
use crate::locator::Locator;

const POLL: Duration = Duration::from_millis(50);

macro_rules! poll_until {
    ($timeout:expr, $probe:expr) => {{
        let deadline = tokio::time::Instant::now() + $timeout;
        loop {
            if $probe {
                break true;
            }
            if tokio::time::Instant::now() >= deadline {
                break false;
            }
            tokio::time::sleep(POLL).await;
        }
    }};
}

impl LiveElement {
    pub async fn wait_displayed(&self, timeout: Duration) -> bool {
        poll_until!(timeout, self.is_displayed().await.unwrap_or(false))
    }

    pub async fn wait_hidden(&self, timeout: Duration) -> bool {
        poll_until!(timeout, !self.is_displayed().await.unwrap_or(true))
    }

    pub async fn wait_enabled(&self, timeout: Duration) -> bool {
        poll_until!(timeout, self.is_enabled().await.unwrap_or(false))
    }

    pub async fn wait_disabled(&self, timeout: Duration) -> bool {
        poll_until!(timeout, !self.is_enabled().await.unwrap_or(true))
    }

    /// Wait for the node to disappear from the document.
    pub async fn wait_deleted(&self, timeout: Duration) -> bool {
        poll_until!(timeout, !self.is_alive().await)
    }

    pub async fn wait_covered(&self, timeout: Duration) -> bool {
        poll_until!(timeout, self.is_covered().await.unwrap_or(false))
    }

    pub async fn wait_uncovered(&self, timeout: Duration) -> bool {
        poll_until!(timeout, !self.is_covered().await.unwrap_or(true))
    }

    // ----------------------------------------------------- scrolling

    pub async fn scroll_by(&self, x: f64, y: f64) -> Result<()> {
        self.call_js(
            "function(x, y){ this.scrollBy(x, y); }",
            vec![json!(x), json!(y)],
        )
        .await?;
        Ok(())
    }

    pub async fn scroll_to(&self, x: f64, y: f64) -> Result<()> {
        self.call_js(
            "function(x, y){ this.scrollTo(x, y); }",
            vec![json!(x), json!(y)],
        )
        .await?;
        Ok(())
    }

    pub async fn scroll_to_bottom(&self) -> Result<()> {
        self.call_js("function(){ this.scrollTo(0, this.scrollHeight); }", vec![])
            .await?;
        Ok(())
    }

    pub async fn scroll_to_top(&self) -> Result<()> {
        self.scroll_to(0.0, 0.0).await
    }
}

impl Tab {
    // -------------------------------------------------- page waiters

    /// Wait for readiness under the configured load strategy.
    pub async fn wait_doc_loaded(&self, timeout: Duration) -> Result<bool> {
        self.wait_loaded(timeout).await
    }

    pub async fn wait_url_contains(&self, needle: &str, timeout: Duration) -> bool {
        poll_until!(
            timeout,
            self.url().await.map(|u| u.contains(needle)).unwrap_or(false)
        )
    }

    pub async fn wait_title_contains(&self, needle: &str, timeout: Duration) -> bool {
        poll_until!(
            timeout,
            self.title()
                .await
                .map(|t| t.contains(needle))
                .unwrap_or(false)
        )
    }

    /// Wait for a tab that was not in `known` to appear; returns its
    /// id.
    pub async fn wait_new_tab(&self, known: &[String], timeout: Duration) -> Option<String> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(ids) = self.tab_ids().await {
                if let Some(fresh) = ids.iter().find(|id| !known.contains(id)) {
                    return Some(fresh.clone());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(POLL).await;
        }
    }

    /// Wait for `Browser.downloadWillBegin`. The latch is consumed.
    pub async fn wait_download_begin(&self, timeout: Duration) -> bool {
        poll_until!(timeout, self.take_download_begun())
    }

    pub async fn wait_ele_displayed(&self, loc: impl Into<Locator>, timeout: Duration) -> bool {
        let loc = loc.into();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Single-shot probe: the outer loop owns the pacing.
            if let Ok(results) = self.search(&loc, true, Duration::ZERO).await {
                if let Some(element) = results.into_iter().next().and_then(|r| r.into_element()) {
                    if element.is_displayed().await.unwrap_or(false) {
                        return true;
                    }
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(POLL).await;
        }
    }

    pub async fn wait_ele_deleted(&self, loc: impl Into<Locator>, timeout: Duration) -> bool {
        let loc = loc.into();
        poll_until!(
            timeout,
            matches!(
                self.search(&loc, true, Duration::ZERO).await,
                Ok(results) if results.is_empty()
            )
        )
    }

    // ------------------------------------------------------ scrolling

    pub async fn scroll_to(&self, x: f64, y: f64) -> Result<()> {
        self.run_js(&format!("window.scrollTo({x}, {y})")).await?;
        Ok(())
    }

    pub async fn scroll_by(&self, x: f64, y: f64) -> Result<()> {
        self.run_js(&format!("window.scrollBy({x}, {y})")).await?;
        Ok(())
    }

    pub async fn scroll_to_top(&self) -> Result<()> {
        self.scroll_to(0.0, 0.0).await
    }

    pub async fn scroll_to_bottom(&self) -> Result<()> {
        self.run_js("window.scrollTo(0, document.body.scrollHeight)")
            .await?;
        Ok(())
    }

    pub async fn scroll_to_half(&self) -> Result<()> {
        self.run_js("window.scrollTo(0, document.body.scrollHeight / 2)")
            .await?;
        Ok(())
    }

    /// Scroll until the first match is in view.
    pub async fn scroll_to_see(&self, loc: impl Into<Locator>) -> Result<()> {
        let result = self.ele(loc).await?;
        if let Some(element) = result.into_element() {
            element.scroll_into_view().await?;
        }
        Ok(())
    }

    // ------------------------------------------------------- geometry

    /// Full document size.
    pub async fn page_size(&self) -> Result<(f64, f64)> {
        let value = self
            .run_js(
                "[document.documentElement.scrollWidth, document.documentElement.scrollHeight]",
            )
            .await?;
        Ok(pair(&value))
    }

    /// Layout viewport size.
    pub async fn viewport_size(&self) -> Result<(f64, f64)> {
        let value = self.run_js("[window.innerWidth, window.innerHeight]").await?;
        Ok(pair(&value))
    }

    /// Current scroll offset.
    pub async fn scroll_position(&self) -> Result<(f64, f64)> {
        let value = self.run_js("[window.pageXOffset, window.pageYOffset]").await?;
        Ok(pair(&value))
    }
}

fn pair(value: &serde_json::Value) -> (f64, f64) {
    let list = value.as_array();
    let get = |i: usize| {
        list.and_then(|l| l.get(i))
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    };
    (get(0), get(1))
}
