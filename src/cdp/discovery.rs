//! Chrome's HTTP discovery endpoints: `/json` and friends on the
//! remote-debugging port. These are plain HTTP, not CDP.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{DualError, Result};

/// One debuggable target as listed by `GET /json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub target_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    pub web_socket_debugger_url: Option<String>,
}

impl TargetInfo {
    pub fn is_page(&self) -> bool {
        self.target_type == "page"
    }
}

/// Discovery requests go to localhost; bypass any configured proxy.
fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// All targets known to the browser at `host` (`host:port`).
pub async fn list_targets(host: &str) -> Result<Vec<TargetInfo>> {
    let url = format!("http://{host}/json");
    let response = client()
        .get(&url)
        .send()
        .await
        .map_err(|e| DualError::BrowserConnect(format!("{url}: {e}")))?;
    response
        .json()
        .await
        .map_err(|e| DualError::BrowserConnect(format!("bad /json payload: {e}")))
}

/// Targets of type `page` — the actual tabs.
pub async fn page_targets(host: &str) -> Result<Vec<TargetInfo>> {
    Ok(list_targets(host)
        .await?
        .into_iter()
        .filter(TargetInfo::is_page)
        .collect())
}

/// Browser-level WebSocket URL from `/json/version`.
pub async fn browser_ws_url(host: &str) -> Result<String> {
    let url = format!("http://{host}/json/version");
    let response = client()
        .get(&url)
        .send()
        .await
        .map_err(|e| DualError::BrowserConnect(format!("{url}: {e}")))?;
    let info: serde_json::Value = response
        .json()
        .await
        .map_err(|e| DualError::BrowserConnect(format!("bad /json/version payload: {e}")))?;
    info.get("webSocketDebuggerUrl")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            DualError::BrowserConnect("no webSocketDebuggerUrl in /json/version".to_string())
        })
}

/// Focus the tab with the given id.
pub async fn activate_target(host: &str, id: &str) -> Result<()> {
    let url = format!("http://{host}/json/activate/{id}");
    let response = client()
        .get(&url)
        .send()
        .await
        .map_err(|e| DualError::BrowserConnect(format!("{url}: {e}")))?;
    if response.status().is_success() {
        Ok(())
    } else {
        Err(DualError::BrowserConnect(format!(
            "activate {id}: HTTP {}",
            response.status()
        )))
    }
}

/// Close the tab with the given id.
pub async fn close_target(host: &str, id: &str) -> Result<()> {
    let url = format!("http://{host}/json/close/{id}");
    let response = client()
        .get(&url)
        .send()
        .await
        .map_err(|e| DualError::BrowserConnect(format!("{url}: {e}")))?;
    if response.status().is_success() {
        Ok(())
    } else {
        Err(DualError::BrowserConnect(format!(
            "close {id}: HTTP {}",
            response.status()
        )))
    }
}

/// Open a new tab via `PUT /json/new` (Chrome 63+ requires PUT).
pub async fn new_target(host: &str, url: Option<&str>) -> Result<TargetInfo> {
    let endpoint = match url {
        Some(u) => format!("http://{host}/json/new?{u}"),
        None => format!("http://{host}/json/new"),
    };
    let response = client()
        .put(&endpoint)
        .send()
        .await
        .map_err(|e| DualError::BrowserConnect(format!("{endpoint}: {e}")))?;
    response
        .json()
        .await
        .map_err(|e| DualError::BrowserConnect(format!("bad /json/new payload: {e}")))
}

/// WebSocket URL for one page target.
pub fn page_ws_url(host: &str, tab_id: &str) -> String {
    format!("ws://{host}/devtools/page/{tab_id}")
}

/// Whether a debug port is answering at all.
pub async fn is_browser_alive(host: &str) -> bool {
    browser_ws_url(host).await.is_ok()
}
