//! The static backend: an HTTP session whose responses are parsed
//! into a static element tree. No browser involved.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use encoding_rs::Encoding;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use scraper::Html;
use url::Url;

use crate::config::Config;
use crate::cookies::{Cookie, SessionJar};
use crate::error::{DualError, Result};
use crate::locator::Locator;
use crate::statics::element::{StaticElement, StaticResult};

/// Per-request overrides; unset fields fall back to the page config.
#[derive(Debug, Clone, Default)]
pub struct RequestOpts {
    pub retry: Option<u32>,
    /// Seconds between attempts.
    pub interval: Option<f64>,
    /// Seconds for the whole request.
    pub timeout: Option<f64>,
    /// Raise instead of returning false on failure.
    pub show_errmsg: bool,
}

/// Body for `post`.
#[derive(Debug, Clone)]
pub enum PostData {
    Form(HashMap<String, String>),
    Json(serde_json::Value),
    Raw(String),
}

struct PageState {
    url: Url,
    status: StatusCode,
    headers: HeaderMap,
    doc: Arc<Html>,
    html: String,
}

/// A stateless-HTTP page: one session, one "current" response.
pub struct HttpPage {
    client: reqwest::Client,
    jar: Arc<SessionJar>,
    config: Config,
    headers: HashMap<String, String>,
    user_agent: Option<String>,
    state: Option<PageState>,
}

impl HttpPage {
    pub fn new(config: Config) -> Result<Self> {
        let jar = Arc::new(SessionJar::new());
        let mut builder = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .redirect(reqwest::redirect::Policy::limited(10));
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        let client = builder.build()?;
        Ok(Self {
            client,
            jar,
            user_agent: config.user_agent.clone(),
            headers: config.headers.clone(),
            config,
            state: None,
        })
    }

    // -------------------------------------------------------- requests

    pub async fn get(&mut self, url: &str, opts: &RequestOpts) -> Result<bool> {
        self.request(Method::GET, url, None, opts).await
    }

    pub async fn post(&mut self, url: &str, data: PostData, opts: &RequestOpts) -> Result<bool> {
        self.request(Method::POST, url, Some(data), opts).await
    }

    async fn request(
        &mut self,
        method: Method,
        url: &str,
        data: Option<PostData>,
        opts: &RequestOpts,
    ) -> Result<bool> {
        let target =
            Url::parse(url).map_err(|e| DualError::PageError(format!("bad url '{url}': {e}")))?;
        let attempts = opts.retry.unwrap_or(self.config.retry.times) + 1;
        let interval = Duration::from_secs_f64(
            opts.interval.unwrap_or(self.config.retry.interval).max(0.0),
        );
        let timeout = Duration::from_secs_f64(
            opts.timeout.unwrap_or(self.config.timeouts.page_load).max(0.001),
        );

        let mut last_error = String::new();
        for attempt in 0..attempts {
            if attempt > 0 {
                tracing::debug!("retrying {target} ({attempt}/{})", attempts - 1);
                tokio::time::sleep(interval).await;
            }
            match self.send_once(&method, &target, &data, timeout).await {
                Ok(state) => {
                    self.state = Some(state);
                    return Ok(true);
                }
                Err(e) => last_error = e,
            }
        }

        if opts.show_errmsg {
            Err(DualError::PageError(format!("{target}: {last_error}")))
        } else {
            tracing::debug!("request failed: {target}: {last_error}");
            Ok(false)
        }
    }

    async fn send_once(
        &self,
        method: &Method,
        target: &Url,
        data: &Option<PostData>,
        timeout: Duration,
    ) -> std::result::Result<PageState, String> {
        let mut request = self
            .client
            .request(method.clone(), target.clone())
            .timeout(timeout);

        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(ua) = &self.user_agent {
            request = request.header("User-Agent", ua);
        }
        if !self.headers.keys().any(|k| k.eq_ignore_ascii_case("referer")) {
            let referer = match &self.state {
                Some(state) => state.url.to_string(),
                None => format!(
                    "{}://{}",
                    target.scheme(),
                    target.host_str().unwrap_or_default()
                ),
            };
            request = request.header("Referer", referer);
        }
        if !self.headers.keys().any(|k| k.eq_ignore_ascii_case("host")) {
            if let Some(host) = target.host_str() {
                request = request.header("Host", host);
            }
        }

        if let Some(data) = data {
            request = match data {
                PostData::Form(form) => request.form(form),
                PostData::Json(json) => request.json(json),
                PostData::Raw(raw) => request.body(raw.clone()),
            };
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }

        let final_url = response.url().clone();
        let headers = response.headers().clone();
        let content_type = headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = response.bytes().await.map_err(|e| e.to_string())?;
        let html = decode_body(&bytes, content_type.as_deref());
        let doc = Arc::new(Html::parse_document(&html));

        Ok(PageState {
            url: final_url,
            status,
            headers,
            doc,
            html,
        })
    }

    /// Fetch a raw resource and write it to `dir`, returning the path.
    pub async fn download(&self, url: &str, dir: &Path, filename: Option<&str>) -> Result<PathBuf> {
        let target =
            Url::parse(url).map_err(|e| DualError::PageError(format!("bad url '{url}': {e}")))?;
        let response = self.client.get(target.clone()).send().await?;
        if !response.status().is_success() {
            return Err(DualError::PageError(format!(
                "{target}: HTTP {}",
                response.status()
            )));
        }
        let name = filename
            .map(|s| s.to_string())
            .or_else(|| {
                target
                    .path_segments()
                    .and_then(|mut s| s.next_back())
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
            })
            .unwrap_or_else(|| "download".to_string());
        let path = dir.join(name);
        let bytes = response.bytes().await?;
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&path, &bytes).await?;
        Ok(path)
    }

    // ----------------------------------------------------------- state

    pub fn url(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.url.as_str())
    }

    pub fn html(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.html.as_str())
    }

    pub fn status(&self) -> Option<u16> {
        self.state.as_ref().map(|s| s.status.as_u16())
    }

    pub fn response_header(&self, name: &str) -> Option<String> {
        self.state
            .as_ref()?
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }

    /// All response headers of the current response.
    pub fn response_headers(&self) -> HashMap<String, String> {
        match &self.state {
            Some(state) => state
                .headers
                .iter()
                .filter_map(|(k, v)| {
                    v.to_str()
                        .ok()
                        .map(|v| (k.as_str().to_string(), v.to_string()))
                })
                .collect(),
            None => HashMap::new(),
        }
    }

    pub fn title(&self) -> Option<String> {
        let root = self.root().ok()?;
        root.try_ele("tag:title")
            .ok()
            .flatten()
            .map(|r| r.text().trim().to_string())
    }

    /// Root element of the current response, or `PageError` before the
    /// first successful request.
    pub fn root(&self) -> Result<StaticElement> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| DualError::PageError("no response loaded yet".to_string()))?;
        StaticElement::document_root(Arc::clone(&state.doc), Some(state.url.clone()))
    }

    // --------------------------------------------------------- queries

    pub fn ele(&self, loc: impl Into<Locator>) -> Result<StaticResult> {
        self.root()?.ele(loc)
    }

    pub fn try_ele(&self, loc: impl Into<Locator>) -> Result<Option<StaticResult>> {
        self.root()?.try_ele(loc)
    }

    pub fn eles(&self, loc: impl Into<Locator>) -> Result<Vec<StaticResult>> {
        self.root()?.eles(loc)
    }

    // --------------------------------------------------------- session

    pub fn cookies(&self) -> Vec<Cookie> {
        self.jar.all()
    }

    pub fn set_cookies(&self, cookies: impl IntoIterator<Item = Cookie>) {
        self.jar.add_all(cookies);
    }

    pub fn clear_cookies(&self) {
        self.jar.clear();
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn set_user_agent(&mut self, ua: impl Into<String>) {
        self.user_agent = Some(ua.into());
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn set_headers(&mut self, headers: HashMap<String, String>) {
        self.headers = headers;
    }

    /// Registered host of the current page, used to scope cookie
    /// bridging.
    pub fn current_host(&self) -> Option<String> {
        self.state
            .as_ref()
            .and_then(|s| s.url.host_str().map(|h| h.to_string()))
    }
}

/// Decode a response body: declared charset wins, then a `<meta
/// charset>` in the first 1 KB for HTML, then lossy UTF-8.
pub(crate) fn decode_body(bytes: &[u8], content_type: Option<&str>) -> String {
    if let Some(label) = content_type.and_then(charset_param) {
        if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
            return encoding.decode(bytes).0.into_owned();
        }
    }
    let is_html = content_type.map(|ct| ct.contains("text/html")).unwrap_or(true);
    if is_html {
        let head = &bytes[..bytes.len().min(1024)];
        if let Some(label) = meta_charset(head) {
            if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
                return encoding.decode(bytes).0.into_owned();
            }
        }
    }
    String::from_utf8_lossy(bytes).into_owned()
}

fn charset_param(content_type: &str) -> Option<String> {
    let lower = content_type.to_ascii_lowercase();
    let idx = lower.find("charset=")?;
    let rest = &content_type[idx + "charset=".len()..];
    let value: String = rest
        .chars()
        .skip_while(|c| matches!(c, '"' | '\'' | ' '))
        .take_while(|c| !matches!(c, ';' | ' ' | '"' | '\''))
        .collect();
    (!value.is_empty()).then_some(value)
}

fn meta_charset(head: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(head).to_ascii_lowercase();
    let idx = text.find("charset=")?;
    let rest = &text[idx + "charset=".len()..];
    let value: String = rest
        .chars()
        .skip_while(|c| matches!(c, '"' | '\'' | ' '))
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .collect();
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// Serve canned HTTP/1.1 responses, one connection each, and report
    /// the raw request heads we received.
    async fn serve(responses: Vec<Vec<u8>>) -> (String, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            for response in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 8192];
                let n = stream.read(&mut buf).await.unwrap_or(0);
                let _ = req_tx.send(String::from_utf8_lossy(&buf[..n]).into_owned());
                stream.write_all(&response).await.unwrap();
                let _ = stream.shutdown().await;
            }
        });
        (format!("http://{addr}"), req_rx)
    }

    fn html_response(body: &str) -> Vec<u8> {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
        .into_bytes()
    }

    fn error_response() -> Vec<u8> {
        b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            .to_vec()
    }

    fn page() -> HttpPage {
        HttpPage::new(Config::default()).unwrap()
    }

    #[tokio::test]
    async fn get_parses_and_queries() {
        let body = "<html><head><title> Hello </title></head><body><p id='x'>hi</p></body></html>";
        let (base, _reqs) = serve(vec![html_response(body)]).await;
        let mut page = page();
        assert!(page.get(&base, &RequestOpts::default()).await.unwrap());
        assert_eq!(page.status(), Some(200));
        assert_eq!(page.title().as_deref(), Some("Hello"));
        let hit = page.ele("#x").unwrap();
        assert_eq!(hit.text(), "hi");
        assert!(page.url().unwrap().starts_with(&base));
    }

    #[tokio::test]
    async fn non_2xx_returns_false_without_errmsg() {
        let (base, _reqs) = serve(vec![error_response()]).await;
        let mut page = page();
        let ok = page.get(&base, &RequestOpts::default()).await.unwrap();
        assert!(!ok);
        assert!(page.url().is_none());
    }

    #[tokio::test]
    async fn non_2xx_raises_with_errmsg() {
        let (base, _reqs) = serve(vec![error_response()]).await;
        let mut page = page();
        let opts = RequestOpts {
            show_errmsg: true,
            ..Default::default()
        };
        let err = page.get(&base, &opts).await.unwrap_err();
        assert!(matches!(err, DualError::PageError(_)));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let (base, _reqs) = serve(vec![
            error_response(),
            html_response("<html><body>ok</body></html>"),
        ])
        .await;
        let mut page = page();
        let opts = RequestOpts {
            retry: Some(1),
            interval: Some(0.01),
            ..Default::default()
        };
        assert!(page.get(&base, &opts).await.unwrap());
        assert_eq!(page.status(), Some(200));
    }

    #[tokio::test]
    async fn referer_and_host_fixups() {
        let (base, mut reqs) = serve(vec![
            html_response("<html><body>one</body></html>"),
            html_response("<html><body>two</body></html>"),
        ])
        .await;
        let mut page = page();
        page.get(&format!("{base}/first"), &RequestOpts::default())
            .await
            .unwrap();
        let first_req = reqs.recv().await.unwrap().to_ascii_lowercase();
        // No prior page: referer falls back to scheme://host.
        assert!(first_req.contains("referer: http://127.0.0.1"), "{first_req}");
        assert!(first_req.contains("host: 127.0.0.1"), "{first_req}");

        page.get(&format!("{base}/second"), &RequestOpts::default())
            .await
            .unwrap();
        let second_req = reqs.recv().await.unwrap().to_ascii_lowercase();
        assert!(second_req.contains("/first"), "{second_req}");
    }

    #[tokio::test]
    async fn set_cookie_lands_in_jar() {
        let body = "<html><body>x</body></html>";
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nSet-Cookie: sid=abc; Path=/\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let (base, _reqs) = serve(vec![response.into_bytes()]).await;
        let mut page = page();
        page.get(&base, &RequestOpts::default()).await.unwrap();
        let cookies = page.cookies();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name, "sid");
        assert_eq!(cookies[0].domain.as_deref(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn gbk_charset_from_header() {
        // "中文" in GBK.
        let body: &[u8] = &[0xd6, 0xd0, 0xce, 0xc4];
        let mut response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=gbk\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        response.extend_from_slice(body);
        let (base, _reqs) = serve(vec![response]).await;
        let mut page = page();
        page.get(&base, &RequestOpts::default()).await.unwrap();
        assert!(page.html().unwrap().contains("中文"));
    }

    #[test]
    fn decode_rules() {
        // Header charset wins.
        let gbk = [0xd6u8, 0xd0, 0xce, 0xc4];
        assert_eq!(decode_body(&gbk, Some("text/html; charset=gbk")), "中文");

        // Meta charset inside the first kilobyte.
        let mut doc = b"<html><head><meta charset=\"gbk\"></head><body>".to_vec();
        doc.extend_from_slice(&gbk);
        doc.extend_from_slice(b"</body></html>");
        let decoded = decode_body(&doc, Some("text/html"));
        assert!(decoded.contains("中文"));

        // Fallback is lossy UTF-8.
        assert_eq!(decode_body("plain".as_bytes(), Some("text/plain")), "plain");

        // Unknown labels fall through to the fallback instead of panicking.
        let decoded = decode_body(b"x", Some("text/html; charset=not-a-charset"));
        assert_eq!(decoded, "x");
    }

    #[test]
    fn charset_param_parsing() {
        assert_eq!(
            charset_param("text/html; charset=UTF-8").as_deref(),
            Some("UTF-8")
        );
        assert_eq!(
            charset_param("text/html; charset=\"gbk\"; boundary=x"),
            Some("gbk".to_string())
        );
        assert_eq!(charset_param("text/html"), None);
    }

    #[test]
    fn meta_charset_scan() {
        assert_eq!(
            meta_charset(b"<html><meta charset='gb2312'>").as_deref(),
            Some("gb2312")
        );
        assert_eq!(
            meta_charset(
                b"<meta http-equiv=\"Content-Type\" content=\"text/html; charset=big5\">"
            )
            .as_deref(),
            Some("big5")
        );
        assert_eq!(meta_charset(b"<html><body>none</body>"), None);
    }
}
