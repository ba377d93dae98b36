//! Cookie model shared by both backends, plus conversions from the
//! loose shapes callers hand us (header strings, JSON maps, CDP
//! cookie arrays) and the domain rules used when bridging cookies
//! between the HTTP session and the browser.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    /// Whether this cookie belongs to `host` under standard domain
    /// matching (leading dot ignored, subdomains of the cookie domain
    /// match).
    pub fn matches_host(&self, host: &str) -> bool {
        match &self.domain {
            None => false,
            Some(d) => domain_matches(d, host),
        }
    }

    /// CDP `Network.setCookies` entry. Returns None when no domain is
    /// known — the browser would reject or misfile such a cookie.
    pub fn to_cdp(&self) -> Option<Value> {
        let domain = self.domain.as_deref()?;
        let mut entry = serde_json::json!({
            "name": self.name,
            "value": self.value,
            "domain": domain,
            "path": self.path.as_deref().unwrap_or("/"),
        });
        if let Some(expires) = self.expires {
            entry["expires"] = serde_json::json!(expires);
        }
        if let Some(secure) = self.secure {
            entry["secure"] = serde_json::json!(secure);
        }
        if let Some(http_only) = self.http_only {
            entry["httpOnly"] = serde_json::json!(http_only);
        }
        if let Some(same_site) = &self.same_site {
            entry["sameSite"] = serde_json::json!(same_site);
        }
        Some(entry)
    }
}

/// Attribute keywords that describe a cookie rather than naming one.
const ATTRIBUTE_KEYS: &[&str] = &[
    "domain", "path", "expires", "max-age", "secure", "httponly", "samesite", "version",
];

/// Parse a `k1=v1; k2=v2; path=/; domain=.example.com` header string.
///
/// Tokens whose key is a cookie attribute apply to every cookie parsed
/// from the string; the rest each become one cookie. Commas separate
/// tokens too, but only when the string contains no semicolons.
pub fn parse_cookie_header(raw: &str) -> Vec<Cookie> {
    let sep = if raw.contains(';') { ';' } else { ',' };
    let mut cookies: Vec<Cookie> = Vec::new();
    let mut domain: Option<String> = None;
    let mut path: Option<String> = None;
    let mut secure = false;
    let mut http_only = false;

    for token in raw.split(sep) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let (key, value) = match token.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (token, ""),
        };
        let key_lower = key.to_ascii_lowercase();
        if ATTRIBUTE_KEYS.contains(&key_lower.as_str()) {
            match key_lower.as_str() {
                "domain" => domain = Some(value.to_string()),
                "path" => path = Some(value.to_string()),
                "secure" => secure = true,
                "httponly" => http_only = true,
                _ => {}
            }
        } else {
            cookies.push(Cookie::new(key, value));
        }
    }

    for cookie in &mut cookies {
        cookie.domain = domain.clone();
        cookie.path = path.clone();
        if secure {
            cookie.secure = Some(true);
        }
        if http_only {
            cookie.http_only = Some(true);
        }
    }
    cookies
}

/// Accept the loose cookie shapes callers pass around: an array of
/// cookie objects, one object (either a full cookie or a plain
/// `{name: value}` map), or a raw header string.
pub fn cookies_from_value(value: &Value) -> Vec<Cookie> {
    match value {
        Value::String(s) => parse_cookie_header(s),
        Value::Array(items) => items.iter().flat_map(cookies_from_value).collect(),
        Value::Object(map) => {
            if map.contains_key("name") && map.contains_key("value") {
                serde_json::from_value(value.clone())
                    .map(|c: Cookie| vec![c])
                    .unwrap_or_default()
            } else {
                map.iter()
                    .map(|(k, v)| {
                        let v = match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        Cookie::new(k, v)
                    })
                    .collect()
            }
        }
        _ => Vec::new(),
    }
}

/// Standard cookie-domain match: exact host, or host is a subdomain
/// of the (dot-stripped) cookie domain.
pub fn domain_matches(cookie_domain: &str, host: &str) -> bool {
    let d = cookie_domain.trim_start_matches('.');
    if d.is_empty() {
        return false;
    }
    host == d || host.ends_with(&format!(".{d}"))
}

/// Host of a URL string, if it has one.
pub fn url_host(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(|h| h.to_string())
}

/// Filter cookies down to those valid for `host`, back-filling missing
/// domains with `host` itself. Used when pushing HTTP-session cookies
/// into the browser.
pub fn scope_to_host(cookies: Vec<Cookie>, host: &str) -> Vec<Cookie> {
    cookies
        .into_iter()
        .filter_map(|mut c| match &c.domain {
            Some(d) if domain_matches(d, host) => Some(c),
            Some(_) => None,
            None => {
                c.domain = Some(host.to_string());
                Some(c)
            }
        })
        .collect()
}

impl Cookie {
    /// Parse one `Set-Cookie` header line. Unlike [`parse_cookie_header`],
    /// this yields exactly one cookie; attribute tokens follow the
    /// name/value pair. Missing domain and path default to the request
    /// host and `/`.
    pub fn from_set_cookie(line: &str, default_host: &str) -> Option<Cookie> {
        let mut tokens = line.split(';');
        let (name, value) = tokens.next()?.trim().split_once('=')?;
        let mut cookie = Cookie::new(name.trim(), value.trim());
        for token in tokens {
            let token = token.trim();
            let (key, val) = match token.split_once('=') {
                Some((k, v)) => (k.trim().to_ascii_lowercase(), v.trim()),
                None => (token.to_ascii_lowercase(), ""),
            };
            match key.as_str() {
                "domain" => cookie.domain = Some(val.to_string()),
                "path" => cookie.path = Some(val.to_string()),
                "secure" => cookie.secure = Some(true),
                "httponly" => cookie.http_only = Some(true),
                "samesite" => cookie.same_site = Some(val.to_string()),
                "expires" | "max-age" | "version" => {}
                _ => {}
            }
        }
        if cookie.domain.is_none() {
            cookie.domain = Some(default_host.to_string());
        }
        if cookie.path.is_none() {
            cookie.path = Some("/".to_string());
        }
        Some(cookie)
    }
}

/// In-memory cookie store for the HTTP session. reqwest's builtin jar
/// cannot be read back out, and cookie bridging needs exactly that, so
/// the session keeps its own.
#[derive(Default)]
pub struct SessionJar {
    inner: std::sync::Mutex<Vec<Cookie>>,
}

impl SessionJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by (name, domain, path).
    pub fn add(&self, cookie: Cookie) {
        let mut cookies = self.inner.lock().unwrap();
        if let Some(existing) = cookies
            .iter_mut()
            .find(|c| c.name == cookie.name && c.domain == cookie.domain && c.path == cookie.path)
        {
            *existing = cookie;
        } else {
            cookies.push(cookie);
        }
    }

    pub fn add_all(&self, cookies: impl IntoIterator<Item = Cookie>) {
        for cookie in cookies {
            self.add(cookie);
        }
    }

    pub fn all(&self) -> Vec<Cookie> {
        self.inner.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    fn matching(&self, url: &Url) -> Vec<Cookie> {
        let host = url.host_str().unwrap_or_default();
        let path = url.path();
        let https = url.scheme() == "https";
        self.inner
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.domain.as_deref().is_some_and(|d| domain_matches(d, host)))
            .filter(|c| {
                let cookie_path = c.path.as_deref().unwrap_or("/");
                path == cookie_path
                    || path.starts_with(&format!("{}/", cookie_path.trim_end_matches('/')))
            })
            .filter(|c| https || c.secure != Some(true))
            .cloned()
            .collect()
    }
}

impl reqwest::cookie::CookieStore for SessionJar {
    fn set_cookies(
        &self,
        cookie_headers: &mut dyn Iterator<Item = &reqwest::header::HeaderValue>,
        url: &Url,
    ) {
        let host = url.host_str().unwrap_or_default();
        for header in cookie_headers {
            if let Ok(line) = header.to_str() {
                if let Some(cookie) = Cookie::from_set_cookie(line, host) {
                    self.add(cookie);
                }
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<reqwest::header::HeaderValue> {
        let matching = self.matching(url);
        if matching.is_empty() {
            return None;
        }
        let header = matching
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");
        reqwest::header::HeaderValue::from_str(&header).ok()
    }
}
