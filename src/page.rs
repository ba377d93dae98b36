//! The dual-mode page: one surface, two backends. `Live` talks to a
//! browser tab over CDP; `Static` talks HTTP and parses the response.
//! Switching modes can carry cookies (and the browser's user agent)
//! across and re-issue the last navigation on the new backend.

use std::time::Duration;

use crate::config::Config;
use crate::cookies::{self, Cookie};
use crate::error::{DualError, Result};
use crate::live::query::LiveResult;
use crate::live::tab::Tab;
use crate::locator::Locator;
use crate::statics::element::StaticResult;
use crate::statics::session::{HttpPage, PostData, RequestOpts};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Live,
    Static,
}

/// A query result from whichever backend answered.
#[derive(Debug, Clone)]
pub enum PageResult {
    Live(LiveResult),
    Static(StaticResult),
}

impl PageResult {
    pub fn as_live(&self) -> Option<&LiveResult> {
        match self {
            PageResult::Live(r) => Some(r),
            PageResult::Static(_) => None,
        }
    }

    pub fn as_static(&self) -> Option<&StaticResult> {
        match self {
            PageResult::Static(r) => Some(r),
            PageResult::Live(_) => None,
        }
    }
}

/// One page, two interchangeable backends. At least one backend is
/// materialized after the first operation; both persist across mode
/// switches so their state (cookies, last response) survives.
pub struct DualPage {
    mode: Mode,
    host: String,
    config: Config,
    tab: Option<Tab>,
    http: Option<HttpPage>,
    url: Option<String>,
}

impl DualPage {
    /// A page whose live backend will attach to the browser at
    /// `host:port`. Starts in live mode; backends connect lazily.
    pub fn new(host: impl Into<String>, config: Config) -> Self {
        Self {
            mode: Mode::Live,
            host: host.into(),
            config,
            tab: None,
            http: None,
            url: None,
        }
    }

    /// A page that starts on the HTTP backend.
    pub fn new_static(host: impl Into<String>, config: Config) -> Self {
        Self {
            mode: Mode::Static,
            ..Self::new(host, config)
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The logical URL: the live tab's URL in live mode, else the URL
    /// of the last successful HTTP response.
    pub async fn url(&self) -> Option<String> {
        match self.mode {
            Mode::Live => match &self.tab {
                Some(tab) => tab.url().await.ok(),
                None => self.url.clone(),
            },
            Mode::Static => self
                .http
                .as_ref()
                .and_then(|h| h.url().map(|u| u.to_string()))
                .or_else(|| self.url.clone()),
        }
    }

    pub fn tab(&self) -> Option<&Tab> {
        self.tab.as_ref()
    }

    pub fn http(&self) -> Option<&HttpPage> {
        self.http.as_ref()
    }

    async fn ensure_tab(&mut self) -> Result<&Tab> {
        let stale = self.tab.as_ref().map(|t| t.is_stopped()).unwrap_or(true);
        if stale {
            // If the previous main tab was closed, the head of the
            // remaining list becomes the new main.
            self.tab = Some(Tab::connect(&self.host, None, self.config.clone()).await?);
        }
        Ok(self.tab.as_ref().expect("tab just materialized"))
    }

    fn ensure_http(&mut self) -> Result<&mut HttpPage> {
        if self.http.is_none() {
            self.http = Some(HttpPage::new(self.config.clone())?);
        }
        Ok(self.http.as_mut().expect("http session just materialized"))
    }

    // ------------------------------------------------------ navigation

    /// Navigate on the current backend.
    pub async fn get(&mut self, url: &str, opts: &RequestOpts) -> Result<bool> {
        let ok = match self.mode {
            Mode::Live => self.ensure_tab().await?.get(url, opts).await?,
            Mode::Static => self.ensure_http()?.get(url, opts).await?,
        };
        if ok {
            self.url = Some(url.to_string());
        }
        Ok(ok)
    }

    /// POST always runs on the HTTP backend; the page switches to
    /// static mode first if needed.
    pub async fn post(&mut self, url: &str, data: PostData, opts: &RequestOpts) -> Result<bool> {
        if self.mode != Mode::Static {
            self.change_mode(Mode::Static, false, true).await?;
        }
        let ok = self.ensure_http()?.post(url, data, opts).await?;
        if ok {
            self.url = Some(url.to_string());
        }
        Ok(ok)
    }

    // --------------------------------------------------------- queries

    pub async fn ele(&mut self, loc: impl Into<Locator>) -> Result<PageResult> {
        let loc = loc.into();
        self.try_ele(loc.clone())
            .await?
            .ok_or(DualError::ElementNotFound(loc.expr))
    }

    pub async fn try_ele(&mut self, loc: impl Into<Locator>) -> Result<Option<PageResult>> {
        let loc = loc.into();
        match self.mode {
            Mode::Live => Ok(self
                .ensure_tab()
                .await?
                .try_ele(loc)
                .await?
                .map(PageResult::Live)),
            Mode::Static => Ok(self
                .ensure_http()?
                .try_ele(loc)?
                .map(PageResult::Static)),
        }
    }

    pub async fn eles(&mut self, loc: impl Into<Locator>) -> Result<Vec<PageResult>> {
        let loc = loc.into();
        match self.mode {
            Mode::Live => Ok(self
                .ensure_tab()
                .await?
                .eles(loc)
                .await?
                .into_iter()
                .map(PageResult::Live)
                .collect()),
            Mode::Static => Ok(self
                .ensure_http()?
                .eles(loc)?
                .into_iter()
                .map(PageResult::Static)
                .collect()),
        }
    }

    pub async fn html(&mut self) -> Result<String> {
        match self.mode {
            Mode::Live => self.ensure_tab().await?.html().await,
            Mode::Static => Ok(self
                .ensure_http()?
                .html()
                .unwrap_or_default()
                .to_string()),
        }
    }

    pub async fn title(&mut self) -> Result<String> {
        match self.mode {
            Mode::Live => self.ensure_tab().await?.title().await,
            Mode::Static => Ok(self.ensure_http()?.title().unwrap_or_default()),
        }
    }

    pub async fn cookies(&mut self) -> Result<Vec<Cookie>> {
        match self.mode {
            Mode::Live => self.ensure_tab().await?.cookies().await,
            Mode::Static => Ok(self.ensure_http()?.cookies()),
        }
    }

    // ----------------------------------------------------- mode switch

    /// Switch backends. A switch to the current mode is a no-op.
    ///
    /// With `copy_cookies`, cookies flow from the old backend to the
    /// new one (browser → session also copies the live user agent).
    /// With `go`, the logical URL is re-loaded on the new backend.
    pub async fn change_mode(&mut self, mode: Mode, go: bool, copy_cookies: bool) -> Result<()> {
        if mode == self.mode {
            return Ok(());
        }
        let previous_url = self.url().await;
        self.mode = mode;

        match mode {
            Mode::Live => {
                self.ensure_tab().await?;
                if copy_cookies {
                    self.cookies_to_browser().await?;
                }
                if go {
                    if let Some(url) = previous_url.as_deref() {
                        let opts = RequestOpts::default();
                        self.ensure_tab().await?.get(url, &opts).await?;
                    }
                }
            }
            Mode::Static => {
                self.ensure_http()?;
                if copy_cookies {
                    self.cookies_to_session().await?;
                }
                if go {
                    if let Some(url) = previous_url.as_deref() {
                        let opts = RequestOpts::default();
                        self.ensure_http()?.get(url, &opts).await?;
                    }
                }
            }
        }
        if previous_url.is_some() {
            self.url = previous_url;
        }
        Ok(())
    }

    /// Session → browser: only cookies for the session's registered
    /// domain cross over; domainless entries adopt it.
    async fn cookies_to_browser(&mut self) -> Result<()> {
        let Some(http) = self.http.as_ref() else {
            return Ok(());
        };
        let host = http
            .current_host()
            .or_else(|| self.url.as_deref().and_then(cookies::url_host));
        let Some(host) = host else {
            return Ok(());
        };
        let scoped = cookies::scope_to_host(http.cookies(), &host);
        if scoped.is_empty() {
            return Ok(());
        }
        self.ensure_tab().await?.set_cookies(&scoped).await
    }

    /// Browser → session: all cookies cross, plus the browser's
    /// current user agent.
    async fn cookies_to_session(&mut self) -> Result<()> {
        let Some(tab) = self.tab.clone() else {
            return Ok(());
        };
        let browser_cookies = tab.cookies().await?;
        let user_agent = tab.user_agent().await.ok();
        let http = self.ensure_http()?;
        http.set_cookies(browser_cookies);
        if let Some(ua) = user_agent {
            http.set_user_agent(ua);
        }
        Ok(())
    }

    // --------------------------------------------------------- cleanup

    /// Close the live tab (if any); the HTTP session needs no cleanup.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(tab) = self.tab.take() {
            tab.close().await?;
        }
        Ok(())
    }

    /// Convenience for waiters that need a duration from config.
    pub fn base_timeout(&self) -> Duration {
        self.config.timeouts.base_duration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn change_mode_is_idempotent() {
        let mut page = DualPage::new_static("127.0.0.1:9222", Config::default());
        assert_eq!(page.mode(), Mode::Static);
        // Same mode: nothing happens, no backend is forced into being.
        page.change_mode(Mode::Static, true, true).await.unwrap();
        assert_eq!(page.mode(), Mode::Static);
        assert!(page.http().is_none());
        assert!(page.tab().is_none());
    }

    #[tokio::test]
    async fn static_mode_never_touches_the_browser() {
        let mut page = DualPage::new_static("127.0.0.1:1", Config::default());
        // Querying with no response yet is an error, not a hang on a
        // dead browser port.
        let err = page.ele("#x").await.unwrap_err();
        assert!(matches!(err, DualError::PageError(_)));
        assert!(page.tab().is_none());
    }

    #[tokio::test]
    async fn logical_url_defaults_to_none() {
        let page = DualPage::new_static("127.0.0.1:9222", Config::default());
        assert!(page.url().await.is_none());
    }
}
