use thiserror::Error;

#[derive(Error, Debug)]
pub enum DualError {
    #[error("Browser connection failed: {0}")]
    BrowserConnect(String),

    #[error("CDP {method} returned error {code}: {message}")]
    CdpError {
        method: String,
        code: i64,
        message: String,
    },

    #[error("CDP session stopped")]
    ConnectionStopped,

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Element was lost: {0}")]
    ElementLost(String),

    #[error("Execution context was replaced: {0}")]
    ContextLost(String),

    #[error("JavaScript execution failed: {0}")]
    JavaScriptError(String),

    #[error("Element has no layout rect: {0}")]
    NoRect(String),

    #[error("Cannot click element: {0}")]
    CannotClick(String),

    #[error("Resource has no content: {0}")]
    NoResource(String),

    #[error("Page request failed: {0}")]
    PageError(String),

    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl DualError {
    /// Classify a CDP error reply. Chrome reports a vanished node with
    /// "Could not find node with given id" (and a few close variants);
    /// those become `ElementLost` so callers can re-resolve via backend id.
    pub(crate) fn from_cdp_reply(method: &str, code: i64, message: String) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("could not find node")
            || lower.contains("no node with given id")
            || lower.contains("node with given id does not belong")
        {
            DualError::ElementLost(message)
        } else if lower.contains("cannot find context")
            || lower.contains("execution context was destroyed")
        {
            DualError::ContextLost(message)
        } else {
            DualError::CdpError {
                method: method.to_string(),
                code,
                message,
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, DualError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vanished_node_maps_to_element_lost() {
        let err = DualError::from_cdp_reply(
            "DOM.describeNode",
            -32000,
            "Could not find node with given id".to_string(),
        );
        assert!(matches!(err, DualError::ElementLost(_)));
    }

    #[test]
    fn destroyed_context_maps_to_context_lost() {
        let err = DualError::from_cdp_reply(
            "Runtime.callFunctionOn",
            -32000,
            "Execution context was destroyed.".to_string(),
        );
        assert!(matches!(err, DualError::ContextLost(_)));
    }

    #[test]
    fn other_cdp_errors_keep_method_and_code() {
        let err = DualError::from_cdp_reply("Page.navigate", -32602, "Invalid params".to_string());
        match err {
            DualError::CdpError { method, code, .. } => {
                assert_eq!(method, "Page.navigate");
                assert_eq!(code, -32602);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
