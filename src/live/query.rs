//! Element resolution against a live document: locators compile to a
//! JS runner executed with `Runtime.callFunctionOn`, results come back
//! as remote node handles (or plain values for xpath functions) and
//! are wrapped into live elements.

use std::time::Duration;

use serde_json::{json, Value};

use crate::error::{DualError, Result};
use crate::live::element::LiveElement;
use crate::live::frame::FrameElement;
use crate::live::tab::Tab;
use crate::locator::{LocKind, Locator};

/// What a live query can resolve to.
#[derive(Debug, Clone)]
pub enum LiveResult {
    Element(LiveElement),
    Frame(FrameElement),
    Str(String),
    Num(f64),
}

impl LiveResult {
    pub fn into_element(self) -> Option<LiveElement> {
        match self {
            LiveResult::Element(e) => Some(e),
            LiveResult::Frame(f) => Some(f.into_host()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            LiveResult::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            LiveResult::Num(n) => Some(*n),
            _ => None,
        }
    }
}

/// Marker prefix a runner uses to smuggle an evaluation error out as a
/// string (`document.evaluate` throws synchronously).
const ERROR_MARK: &str = "__dualpage_eval_error__:";

/// Runs an xpath against `this` (or its content document for frame
/// hosts). Elements stay nodes; text/attr/comment nodes collapse to
/// their string value; xpath functions return primitives.
const XPATH_RUNNER: &str = r#"
function(xp) {
    const base = this.contentDocument ? this.contentDocument : this;
    const doc = base.nodeType === 9 ? base : (base.ownerDocument || document);
    try {
        const result = doc.evaluate(xp, base, null, XPathResult.ANY_TYPE, null);
        switch (result.resultType) {
            case XPathResult.NUMBER_TYPE: return result.numberValue;
            case XPathResult.STRING_TYPE: return result.stringValue;
            case XPathResult.BOOLEAN_TYPE: return String(result.booleanValue);
            default: {
                const out = [];
                let node;
                while ((node = result.iterateNext())) {
                    if (node.nodeType === 1) {
                        out.push(node);
                    } else if (node.nodeType === 2) {
                        out.push(node.value);
                    } else {
                        out.push(node.textContent);
                    }
                }
                return out;
            }
        }
    } catch (e) {
        return '__dualpage_eval_error__:' + e.message;
    }
}
"#;

/// Runs a CSS selector against `this` (or its content document for
/// frame hosts).
const CSS_RUNNER: &str = r#"
function(css) {
    try {
        const base = this.contentDocument ? this.contentDocument : this;
        return Array.from(base.querySelectorAll(css));
    } catch (e) {
        return '__dualpage_eval_error__:' + e.message;
    }
}
"#;

/// `Runtime.callFunctionOn` with `this` bound to `object_id`.
/// With `return_by_value` the JSON value comes back directly;
/// otherwise the raw RemoteObject (for node handles).
pub(crate) async fn call_function_on(
    tab: &Tab,
    object_id: &str,
    function: &str,
    args: Vec<Value>,
    return_by_value: bool,
) -> Result<Value> {
    let arguments: Vec<Value> = args.into_iter().map(|v| json!({ "value": v })).collect();
    let reply = tab
        .call(
            "Runtime.callFunctionOn",
            json!({
                "functionDeclaration": function,
                "objectId": object_id,
                "arguments": arguments,
                "returnByValue": return_by_value,
                "awaitPromise": true,
            }),
        )
        .await?;
    if let Some(details) = reply.get("exceptionDetails") {
        let text = details["exception"]["description"]
            .as_str()
            .or_else(|| details["text"].as_str())
            .unwrap_or("unknown JS exception");
        return Err(DualError::JavaScriptError(text.to_string()));
    }
    if return_by_value {
        Ok(reply["result"].get("value").cloned().unwrap_or(Value::Null))
    } else {
        Ok(reply["result"].clone())
    }
}

/// Query under a live element, polling until a match appears or the
/// timeout elapses. A zero timeout means a single attempt.
pub(crate) async fn query_under(
    element: &LiveElement,
    loc: &Locator,
    first_only: bool,
    timeout: Duration,
) -> Result<Vec<LiveResult>> {
    let object_id = element.object_id().await?;
    query_on_object(element.tab(), &object_id, loc, first_only, timeout).await
}

/// Same, but `this` is an arbitrary remote object (a document, a
/// shadow root).
pub(crate) async fn query_on_object(
    tab: &Tab,
    object_id: &str,
    loc: &Locator,
    first_only: bool,
    timeout: Duration,
) -> Result<Vec<LiveResult>> {
    let (runner, expr) = match loc.kind {
        LocKind::XPath => (XPATH_RUNNER, loc.anchored().expr),
        LocKind::Css => {
            let expr = if loc.is_child_css() {
                format!(":scope {}", loc.expr.trim_start())
            } else {
                loc.expr.clone()
            };
            (CSS_RUNNER, expr)
        }
    };

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remote =
            call_function_on(tab, object_id, runner, vec![json!(expr)], false).await?;
        let results = unwrap_remote(tab, &remote).await?;
        if !results.is_empty() {
            if first_only {
                return Ok(results.into_iter().take(1).collect());
            }
            return Ok(results);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(Vec::new());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Turn a runner's RemoteObject result into wrapped values.
pub(crate) async fn unwrap_remote(tab: &Tab, remote: &Value) -> Result<Vec<LiveResult>> {
    match remote["type"].as_str() {
        Some("number") => Ok(vec![LiveResult::Num(
            remote["value"].as_f64().unwrap_or(f64::NAN),
        )]),
        Some("string") => {
            let s = remote["value"].as_str().unwrap_or_default();
            if let Some(message) = s.strip_prefix(ERROR_MARK) {
                return Err(DualError::JavaScriptError(message.to_string()));
            }
            Ok(vec![LiveResult::Str(s.to_string())])
        }
        Some("undefined") => Ok(Vec::new()),
        Some("object") => {
            let Some(array_id) = remote["objectId"].as_str() else {
                return Ok(Vec::new());
            };
            let reply = tab
                .call(
                    "Runtime.getProperties",
                    json!({ "objectId": array_id, "ownProperties": true }),
                )
                .await?;
            let mut indexed: Vec<(usize, LiveResult)> = Vec::new();
            for prop in reply["result"].as_array().into_iter().flatten() {
                let Some(index) = prop["name"].as_str().and_then(|n| n.parse::<usize>().ok())
                else {
                    continue;
                };
                if let Some(result) = wrap_value(tab, &prop["value"]) {
                    indexed.push((index, result));
                }
            }
            indexed.sort_by_key(|(i, _)| *i);
            Ok(indexed.into_iter().map(|(_, r)| r).collect())
        }
        _ => Ok(Vec::new()),
    }
}

/// One array slot: a node handle, or a plain value.
fn wrap_value(tab: &Tab, value: &Value) -> Option<LiveResult> {
    if let Some(object_id) = value["objectId"].as_str() {
        let element = LiveElement::from_object_id(tab.clone(), object_id.to_string());
        let class = value["className"].as_str().unwrap_or_default();
        if matches!(class, "HTMLIFrameElement" | "HTMLFrameElement") {
            return Some(LiveResult::Frame(FrameElement::new(element)));
        }
        return Some(LiveResult::Element(element));
    }
    match value["type"].as_str() {
        Some("string") => Some(LiveResult::Str(
            value["value"].as_str().unwrap_or_default().to_string(),
        )),
        Some("number") => Some(LiveResult::Num(value["value"].as_f64()?)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_mark_matches_runner_literal() {
        // The runners inline the marker; keep the constant in sync.
        assert!(XPATH_RUNNER.contains(ERROR_MARK));
        assert!(CSS_RUNNER.contains(ERROR_MARK));
    }

    #[test]
    fn child_css_rewrites_to_scope() {
        let loc = Locator::css("> li");
        assert!(loc.is_child_css());
        // query_on_object prepends :scope; the raw form stays intact.
        assert_eq!(loc.expr, "> li");
    }
}
