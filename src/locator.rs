//! Locator language: compact query strings compiled to a normalized
//! `(kind, expression)` pair, where kind is xpath or CSS.
//!
//! The compiler is total. Raw `xpath:`/`css:` prefixes pass through,
//! the sugar forms (`@attr`, `.class`, `#id`, `tag:`, `text=`) compile
//! to xpath, and anything unrecognized becomes a fuzzy text search.

use serde::{Deserialize, Serialize};

/// Backend-facing locator kind after compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocKind {
    XPath,
    Css,
}

/// Legacy selenium-style strategies accepted by [`Locator::from_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum By {
    XPath,
    Css,
    Id,
    ClassName,
    LinkText,
    PartialLinkText,
    Name,
    TagName,
}

/// A normalized locator: exactly one kind and one expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub kind: LocKind,
    pub expr: String,
}

impl Locator {
    pub fn xpath(expr: impl Into<String>) -> Self {
        Self {
            kind: LocKind::XPath,
            expr: expr.into(),
        }
    }

    pub fn css(expr: impl Into<String>) -> Self {
        Self {
            kind: LocKind::Css,
            expr: expr.into(),
        }
    }

    /// Rewrite a legacy `(strategy, value)` pair into xpath or CSS.
    pub fn from_by(by: By, value: &str) -> Self {
        match by {
            By::XPath => Self::xpath(value),
            By::Css => Self::css(value),
            By::Id => Self::xpath(format!("//*[@id={}]", xpath_literal(value))),
            By::ClassName => Self::xpath(format!("//*[@class={}]", xpath_literal(value))),
            By::Name => Self::xpath(format!("//*[@name={}]", xpath_literal(value))),
            By::TagName => Self::xpath(format!("//{value}")),
            By::LinkText => Self::xpath(format!("//a[text()={}]", xpath_literal(value))),
            By::PartialLinkText => {
                Self::xpath(format!("//a[contains(text(), {})]", xpath_literal(value)))
            }
        }
    }

    /// Compile a query string. Never fails: unknown input turns into a
    /// fuzzy search over text nodes.
    pub fn compile(input: &str) -> Self {
        let s = input.trim();

        for (prefix, raw_kind) in [
            ("xpath:", LocKind::XPath),
            ("xpath=", LocKind::XPath),
            ("x:", LocKind::XPath),
            ("x=", LocKind::XPath),
            ("css:", LocKind::Css),
            ("css=", LocKind::Css),
            ("c:", LocKind::Css),
            ("c=", LocKind::Css),
        ] {
            if let Some(rest) = s.strip_prefix(prefix) {
                return Self {
                    kind: raw_kind,
                    expr: rest.to_string(),
                };
            }
        }

        if let Some(rest) = s.strip_prefix("tag:").or_else(|| s.strip_prefix("tag=")) {
            return compile_tag(rest);
        }
        if let Some(rest) = s.strip_prefix("t:").or_else(|| s.strip_prefix("t=")) {
            return compile_tag(rest);
        }

        if let Some(rest) = s.strip_prefix("text=") {
            return Self::xpath(text_xpath("*", rest, true));
        }
        if let Some(rest) = s.strip_prefix("text:") {
            return Self::xpath(text_xpath("*", rest, false));
        }
        if let Some(rest) = s.strip_prefix("tx=") {
            return Self::xpath(text_xpath("*", rest, true));
        }
        if let Some(rest) = s.strip_prefix("tx:") {
            return Self::xpath(text_xpath("*", rest, false));
        }

        if let Some(rest) = s.strip_prefix("@@") {
            return Self::xpath(format!("//*[{}]", multi_attr_predicate(rest)));
        }
        if let Some(rest) = s.strip_prefix('@') {
            return Self::xpath(format!("//*[{}]", attr_predicate(rest)));
        }

        if let Some(rest) = s.strip_prefix('#') {
            return Self::xpath(match rest.strip_prefix(':') {
                Some(fuzzy) => format!("//*[contains(@id, {})]", xpath_literal(fuzzy)),
                None => format!("//*[@id={}]", xpath_literal(rest)),
            });
        }
        if let Some(rest) = s.strip_prefix('.') {
            return Self::xpath(match rest.strip_prefix(':') {
                Some(fuzzy) => format!("//*[contains(@class, {})]", xpath_literal(fuzzy)),
                None => format!("//*[@class={}]", xpath_literal(rest)),
            });
        }

        // Anything else: fuzzy text search across all elements.
        Self::xpath(text_xpath("*", s, false))
    }

    /// Anchor an absolute xpath at the current node for relative searches.
    /// `//div` becomes `.//div`; CSS and already-relative xpath pass through.
    pub(crate) fn anchored(&self) -> Locator {
        match self.kind {
            LocKind::XPath if self.expr.starts_with('/') => {
                Self::xpath(format!(".{}", self.expr))
            }
            _ => self.clone(),
        }
    }

    /// Whether a CSS locator asks for direct children of the anchor
    /// (leading `>`); the live query layer rewrites these against the
    /// anchor's absolute CSS path.
    pub(crate) fn is_child_css(&self) -> bool {
        self.kind == LocKind::Css && self.expr.trim_start().starts_with('>')
    }
}

impl From<&str> for Locator {
    fn from(s: &str) -> Self {
        Locator::compile(s)
    }
}

impl From<(By, &str)> for Locator {
    fn from((by, value): (By, &str)) -> Self {
        Locator::from_by(by, value)
    }
}

/// `tag:div`, `tag:div@attr=v`, `tag:div@@a=1@@-b`, `tag:div@text():s`.
fn compile_tag(rest: &str) -> Locator {
    let (tag, filters) = match rest.find('@') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };
    let tag_test = format!("name()={}", xpath_literal(&tag.to_lowercase()));

    if filters.is_empty() {
        return Locator::xpath(format!("//*[{tag_test}]"));
    }

    if let Some(multi) = filters.strip_prefix("@@") {
        return Locator::xpath(format!(
            "//*[{tag_test} and {}]",
            multi_attr_predicate(multi)
        ));
    }

    let single = &filters[1..];
    // text() is a pseudo attribute selecting by subtree text.
    if let Some(text) = single.strip_prefix("text():") {
        return Locator::xpath(text_node_step(&format!("//*[{tag_test}]"), text, false));
    }
    if let Some(text) = single.strip_prefix("text()=") {
        return Locator::xpath(text_node_step(&format!("//*[{tag_test}]"), text, true));
    }
    Locator::xpath(format!("//*[{tag_test} and {}]", attr_predicate(single)))
}

/// One `k=v` / `k:v` / `k` clause into an xpath predicate.
fn attr_predicate(clause: &str) -> String {
    if let Some(text) = clause.strip_prefix("text():") {
        return format!("contains(text(), {})", xpath_literal(text));
    }
    if let Some(text) = clause.strip_prefix("text()=") {
        return format!("text()={}", xpath_literal(text));
    }
    match split_clause(clause) {
        (key, Some('='), value) => format!("@{key}={}", xpath_literal(value)),
        (key, Some(':'), value) => format!("contains(@{key}, {})", xpath_literal(value)),
        (key, _, _) => format!("@{key}"),
    }
}

/// `a=1@@-b@@c:x` into `@a="1" and not(@b) and contains(@c, "x")`.
fn multi_attr_predicate(clauses: &str) -> String {
    clauses
        .split("@@")
        .filter(|c| !c.is_empty())
        .map(|clause| match clause.strip_prefix('-') {
            Some(negated) => format!("not({})", attr_predicate(negated)),
            None => attr_predicate(clause),
        })
        .collect::<Vec<_>>()
        .join(" and ")
}

/// Split `key=value` / `key:value` at the first separator outside the key.
fn split_clause(clause: &str) -> (&str, Option<char>, &str) {
    for (i, ch) in clause.char_indices() {
        if ch == '=' || ch == ':' {
            return (&clause[..i], Some(ch), &clause[i + ch.len_utf8()..]);
        }
    }
    (clause, None, "")
}

/// Text-node search rooted at `//{tag}`: selects elements whose direct
/// text matches, by stepping into text() and back up to the parent.
fn text_xpath(tag: &str, needle: &str, exact: bool) -> String {
    text_node_step(&format!("//{tag}"), needle, exact)
}

fn text_node_step(base: &str, needle: &str, exact: bool) -> String {
    let literal = xpath_literal(needle);
    if exact {
        format!("{base}/text()[.={literal}]/..")
    } else {
        format!("{base}/text()[contains(., {literal})]/..")
    }
}

/// Quote a string for use inside an xpath expression. Plain double
/// quoting unless the value itself contains a double quote, in which
/// case a `concat("a",'"',"b",…)` form keeps the query syntactically
/// valid.
pub(crate) fn xpath_literal(value: &str) -> String {
    if !value.contains('"') {
        return format!("\"{value}\"");
    }
    let parts: Vec<String> = value.split('"').map(|p| format!("\"{p}\"")).collect();
    format!("concat({})", parts.join(",'\"',"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_prefixes_pass_through() {
        assert_eq!(
            Locator::compile("xpath://div[@id='x']"),
            Locator::xpath("//div[@id='x']")
        );
        assert_eq!(Locator::compile("x://a"), Locator::xpath("//a"));
        assert_eq!(Locator::compile("css:div.item"), Locator::css("div.item"));
        assert_eq!(Locator::compile("c:#main > li"), Locator::css("#main > li"));
    }

    #[test]
    fn multi_attr_with_negation() {
        assert_eq!(
            Locator::compile("@@class=foo@@-id"),
            Locator::xpath(r#"//*[@class="foo" and not(@id)]"#)
        );
    }

    #[test]
    fn tag_with_text_pseudo_attribute() {
        let loc = Locator::compile("tag:div@text():hello");
        assert_eq!(loc.kind, LocKind::XPath);
        assert_eq!(
            loc.expr,
            r#"//*[name()="div"]/text()[contains(., "hello")]/.."#
        );
    }

    #[test]
    fn tag_alone_and_with_attribute() {
        assert_eq!(
            Locator::compile("tag:input"),
            Locator::xpath(r#"//*[name()="input"]"#)
        );
        assert_eq!(
            Locator::compile("tag:input@name=q"),
            Locator::xpath(r#"//*[name()="input" and @name="q"]"#)
        );
        assert_eq!(
            Locator::compile("tag:div@@class=a@@-hidden"),
            Locator::xpath(r#"//*[name()="div" and @class="a" and not(@hidden)]"#)
        );
    }

    #[test]
    fn attribute_forms() {
        assert_eq!(
            Locator::compile("@name=q"),
            Locator::xpath(r#"//*[@name="q"]"#)
        );
        assert_eq!(
            Locator::compile("@class:btn"),
            Locator::xpath(r#"//*[contains(@class, "btn")]"#)
        );
        assert_eq!(Locator::compile("@disabled"), Locator::xpath("//*[@disabled]"));
    }

    #[test]
    fn class_and_id_sugar() {
        assert_eq!(
            Locator::compile(".nav-item"),
            Locator::xpath(r#"//*[@class="nav-item"]"#)
        );
        assert_eq!(
            Locator::compile(".:nav"),
            Locator::xpath(r#"//*[contains(@class, "nav")]"#)
        );
        assert_eq!(
            Locator::compile("#main"),
            Locator::xpath(r#"//*[@id="main"]"#)
        );
        assert_eq!(
            Locator::compile("#:ma"),
            Locator::xpath(r#"//*[contains(@id, "ma")]"#)
        );
    }

    #[test]
    fn text_forms() {
        assert_eq!(
            Locator::compile("text=Sign in"),
            Locator::xpath(r#"//*/text()[.="Sign in"]/.."#)
        );
        assert_eq!(
            Locator::compile("text:Sign"),
            Locator::xpath(r#"//*/text()[contains(., "Sign")]/.."#)
        );
        assert_eq!(Locator::compile("tx:Sign"), Locator::compile("text:Sign"));
    }

    #[test]
    fn bare_text_is_fuzzy_search() {
        assert_eq!(
            Locator::compile("Welcome back"),
            Locator::xpath(r#"//*/text()[contains(., "Welcome back")]/.."#)
        );
    }

    #[test]
    fn compiler_is_total() {
        // Invariant: any input produces exactly one locator.
        for weird in ["", "   ", "@@@", "::::", "tag:", "@", "#", ".", ">><<"] {
            let loc = Locator::compile(weird);
            assert!(matches!(loc.kind, LocKind::XPath | LocKind::Css), "{weird}");
        }
    }

    #[test]
    fn embedded_quotes_use_concat() {
        let loc = Locator::compile(r#"text=say "hi""#);
        assert!(loc.expr.contains(r#"concat("say ",'"',"hi",'"',"")"#), "{}", loc.expr);
    }

    #[test]
    fn legacy_strategies_rewrite_to_xpath() {
        assert_eq!(
            Locator::from_by(By::Id, "main"),
            Locator::xpath(r#"//*[@id="main"]"#)
        );
        assert_eq!(
            Locator::from_by(By::LinkText, "More"),
            Locator::xpath(r#"//a[text()="More"]"#)
        );
        assert_eq!(
            Locator::from_by(By::PartialLinkText, "Mo"),
            Locator::xpath(r#"//a[contains(text(), "Mo")]"#)
        );
        assert_eq!(Locator::from_by(By::TagName, "div"), Locator::xpath("//div"));
        assert_eq!(
            Locator::from_by(By::Name, "q"),
            Locator::xpath(r#"//*[@name="q"]"#)
        );
        assert_eq!(Locator::from_by(By::Css, "a.x"), Locator::css("a.x"));
    }

    #[test]
    fn tag_with_exact_text() {
        assert_eq!(
            Locator::compile("tag:div@text()=hello"),
            Locator::xpath(r#"//*[name()="div"]/text()[.="hello"]/.."#)
        );
    }

    #[test]
    fn short_aliases_match_long_forms() {
        assert_eq!(Locator::compile("t:div"), Locator::compile("tag:div"));
        assert_eq!(Locator::compile("t=div"), Locator::compile("tag=div"));
        assert_eq!(Locator::compile("tx=Go"), Locator::compile("text=Go"));
        assert_eq!(Locator::compile("x=//a"), Locator::compile("xpath://a"));
        assert_eq!(Locator::compile("c=div a"), Locator::compile("css:div a"));
    }

    #[test]
    fn from_impls_compile_and_rewrite() {
        let from_str: Locator = "#main".into();
        assert_eq!(from_str, Locator::xpath(r#"//*[@id="main"]"#));
        let from_tuple: Locator = (By::ClassName, "item").into();
        assert_eq!(from_tuple, Locator::xpath(r#"//*[@class="item"]"#));
    }

    #[test]
    fn whitespace_is_trimmed_before_dispatch() {
        assert_eq!(
            Locator::compile("  css:div.x  "),
            Locator::css("div.x")
        );
    }

    #[test]
    fn anchoring_rules() {
        assert_eq!(Locator::xpath("//div").anchored(), Locator::xpath(".//div"));
        assert_eq!(Locator::xpath(".//div").anchored(), Locator::xpath(".//div"));
        assert_eq!(Locator::css("div").anchored(), Locator::css("div"));
        assert!(Locator::css("> li").is_child_css());
        assert!(!Locator::css("li").is_child_css());
    }
}
