//! Element wrapper over a parsed HTML tree. Static elements never
//! touch the network: they expose the document as it was received,
//! plus absolute-URL resolution against the owning page's URL.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;

use ego_tree::{NodeId, NodeRef};
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use crate::error::{DualError, Result};
use crate::locator::{LocKind, Locator};
use crate::statics::xpath::{self, XNode, XValue};

/// What a static query can resolve to: an element, a string (text
/// node or attribute value), or a number (xpath functions).
#[derive(Debug, Clone)]
pub enum StaticResult {
    Element(StaticElement),
    Str(String),
    Num(f64),
}

impl StaticResult {
    pub fn into_element(self) -> Option<StaticElement> {
        match self {
            StaticResult::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_element(&self) -> Option<&StaticElement> {
        match self {
            StaticResult::Element(e) => Some(e),
            _ => None,
        }
    }

    /// String form: element text, string value, or formatted number.
    pub fn text(&self) -> String {
        match self {
            StaticResult::Element(e) => e.text(),
            StaticResult::Str(s) => s.clone(),
            StaticResult::Num(n) => {
                if n.fract() == 0.0 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
        }
    }
}

/// An immutable element inside a parsed page.
#[derive(Clone)]
pub struct StaticElement {
    doc: Arc<Html>,
    node: NodeId,
    base_url: Option<Url>,
}

impl std::fmt::Debug for StaticElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticElement")
            .field("tag", &self.tag())
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .finish()
    }
}

impl PartialEq for StaticElement {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.doc, &other.doc) && self.node == other.node
    }
}

const SKIP_TAGS: &[&str] = &[
    "script", "style", "template", "video", "audio", "svg", "noscript",
];

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "details", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr",
    "li", "main", "nav", "ol", "p", "pre", "section", "table", "tbody", "tfoot", "thead", "tr",
    "ul",
];

impl StaticElement {
    pub(crate) fn new(doc: Arc<Html>, node: NodeId, base_url: Option<Url>) -> Self {
        Self {
            doc,
            node,
            base_url,
        }
    }

    /// Parse an HTML snippet into a standalone element (its first
    /// non-wrapper element).
    pub fn from_html(html: &str, base_url: Option<&str>) -> Result<Self> {
        let doc = Arc::new(Html::parse_fragment(html));
        let base_url = base_url.and_then(|u| Url::parse(u).ok());
        let root = doc.tree.root();
        let node = root
            .descendants()
            .find(|n| match n.value() {
                Node::Element(el) => el.name() != "html",
                _ => false,
            })
            .or_else(|| {
                root.descendants()
                    .find(|n| matches!(n.value(), Node::Element(_)))
            })
            .map(|n| n.id())
            .ok_or_else(|| DualError::ElementNotFound("no element in snippet".to_string()))?;
        Ok(Self {
            doc,
            node,
            base_url,
        })
    }

    /// Root element of a parsed document.
    pub(crate) fn document_root(doc: Arc<Html>, base_url: Option<Url>) -> Result<Self> {
        let node = doc
            .tree
            .root()
            .children()
            .find(|n| matches!(n.value(), Node::Element(_)))
            .map(|n| n.id())
            .ok_or_else(|| DualError::ElementNotFound("document has no root element".to_string()))?;
        Ok(Self {
            doc,
            node,
            base_url,
        })
    }

    fn node_ref(&self) -> NodeRef<'_, Node> {
        self.doc
            .tree
            .get(self.node)
            .expect("node id belongs to this tree")
    }

    fn element_ref(&self) -> ElementRef<'_> {
        ElementRef::wrap(self.node_ref()).expect("static element wraps an element node")
    }

    fn wrap(&self, node: NodeId) -> StaticElement {
        StaticElement::new(Arc::clone(&self.doc), node, self.base_url.clone())
    }

    // ------------------------------------------------------ properties

    /// Lowercase tag name.
    pub fn tag(&self) -> String {
        self.element_ref().value().name().to_string()
    }

    /// All attributes, name-ordered.
    pub fn attrs(&self) -> BTreeMap<String, String> {
        self.element_ref()
            .value()
            .attrs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// One attribute. `href`/`src` are resolved against the page URL;
    /// `text`, `innerText`, `html`, `innerHTML` and `outerHTML` are
    /// synthetic.
    pub fn attr(&self, name: &str) -> Option<String> {
        match name {
            "text" | "innerText" => Some(self.text()),
            "html" | "innerHTML" => Some(self.inner_html()),
            "outerHTML" => Some(self.outer_html()),
            "href" | "src" => self
                .element_ref()
                .value()
                .attr(name)
                .map(|v| self.absolutize(v)),
            _ => self
                .element_ref()
                .value()
                .attr(name)
                .map(|v| v.to_string()),
        }
    }

    /// Resolve a possibly-relative URL against the owning page.
    /// `javascript:` and `mailto:` values pass through untouched.
    pub fn absolutize(&self, value: &str) -> String {
        let trimmed = value.trim();
        if trimmed.starts_with("javascript:") || trimmed.starts_with("mailto:") {
            return value.to_string();
        }
        match &self.base_url {
            Some(base) => base
                .join(trimmed)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| value.to_string()),
            None => value.to_string(),
        }
    }

    /// Formatted subtree text: newlines after block elements, tabs
    /// between table cells, `<pre>` preserved, other whitespace runs
    /// collapsed, script/style/media/template bodies skipped.
    pub fn text(&self) -> String {
        let mut out = String::new();
        render_text(self.node_ref(), &mut out, false);
        out.trim_matches(|c| c == ' ' || c == '\n' || c == '\t').to_string()
    }

    /// Unformatted concatenation of the subtree's text nodes.
    pub fn raw_text(&self) -> String {
        let mut out = String::new();
        for node in self.node_ref().descendants() {
            if let Node::Text(t) = node.value() {
                out.push_str(&t);
            }
        }
        out
    }

    pub fn inner_html(&self) -> String {
        self.element_ref().inner_html()
    }

    pub fn outer_html(&self) -> String {
        self.element_ref().html()
    }

    // --------------------------------------------------------- queries

    /// First match, or `ElementNotFound`.
    pub fn ele(&self, loc: impl Into<Locator>) -> Result<StaticResult> {
        let loc = loc.into();
        self.try_ele(loc.clone())?
            .ok_or(DualError::ElementNotFound(loc.expr))
    }

    /// First match, or `None`.
    pub fn try_ele(&self, loc: impl Into<Locator>) -> Result<Option<StaticResult>> {
        Ok(self.eles(loc)?.into_iter().next())
    }

    /// All matches.
    pub fn eles(&self, loc: impl Into<Locator>) -> Result<Vec<StaticResult>> {
        let loc = loc.into();
        match loc.kind {
            LocKind::XPath => self.eval_xpath(&loc.anchored().expr),
            LocKind::Css => self.eval_css(&loc),
        }
    }

    fn eval_xpath(&self, expr: &str) -> Result<Vec<StaticResult>> {
        let value = xpath::evaluate(&self.doc, self.node_ref(), expr)?;
        Ok(match value {
            XValue::Nodes(nodes) => nodes
                .into_iter()
                .filter_map(|n| match n {
                    XNode::Elem(e) => {
                        matches!(e.value(), Node::Element(_)).then(|| {
                            StaticResult::Element(self.wrap(e.id()))
                        })
                    }
                    XNode::Text(t) => Some(StaticResult::Str(match t.value() {
                        Node::Text(text) => text.to_string(),
                        _ => String::new(),
                    })),
                    XNode::Attr { value, .. } => Some(StaticResult::Str(value)),
                })
                .collect(),
            XValue::Str(s) => vec![StaticResult::Str(s)],
            XValue::Num(n) => vec![StaticResult::Num(n)],
            XValue::Bool(b) => vec![StaticResult::Str(b.to_string())],
        })
    }

    fn eval_css(&self, loc: &Locator) -> Result<Vec<StaticResult>> {
        if loc.is_child_css() {
            let rest = loc.expr.trim_start().trim_start_matches('>').trim();
            let selector = parse_selector(rest)?;
            let me = self.element_ref();
            return Ok(me
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|c| selector.matches(c))
                .map(|c| StaticResult::Element(self.wrap(c.id())))
                .collect());
        }
        let selector = parse_selector(&loc.expr)?;
        Ok(self
            .element_ref()
            .select(&selector)
            .map(|e| StaticResult::Element(self.wrap(e.id())))
            .collect())
    }

    /// Whether this element matches a filter locator.
    pub fn matches(&self, loc: &Locator) -> Result<bool> {
        match loc.kind {
            LocKind::Css => {
                let selector = parse_selector(&loc.expr)?;
                Ok(selector.matches(&self.element_ref()))
            }
            LocKind::XPath => {
                let value = xpath::evaluate(&self.doc, self.doc.tree.root(), &loc.expr)?;
                let ids: HashSet<NodeId> = match value {
                    XValue::Nodes(nodes) => nodes
                        .into_iter()
                        .filter_map(|n| match n {
                            XNode::Elem(e) => Some(e.id()),
                            _ => None,
                        })
                        .collect(),
                    _ => HashSet::new(),
                };
                Ok(ids.contains(&self.node))
            }
        }
    }

    // --------------------------------------------------- tree walking

    /// Ancestor `level` steps up (1 = direct parent).
    pub fn parent(&self, level: usize) -> Option<StaticElement> {
        let mut current = self.node_ref();
        let mut remaining = level.max(1);
        while remaining > 0 {
            current = current.parent()?;
            if matches!(current.value(), Node::Element(_)) {
                remaining -= 1;
            } else {
                return None;
            }
        }
        Some(self.wrap(current.id()))
    }

    /// Nearest ancestor matching the locator.
    pub fn parent_matching(&self, loc: impl Into<Locator>) -> Result<Option<StaticElement>> {
        let loc = loc.into();
        let mut current = self.node_ref().parent();
        while let Some(node) = current {
            if matches!(node.value(), Node::Element(_)) {
                let candidate = self.wrap(node.id());
                if candidate.matches(&loc)? {
                    return Ok(Some(candidate));
                }
            }
            current = node.parent();
        }
        Ok(None)
    }

    /// Element children, optionally filtered.
    pub fn children(&self, filter: Option<&Locator>) -> Result<Vec<StaticElement>> {
        self.collect_filtered(
            self.node_ref()
                .children()
                .filter(|n| matches!(n.value(), Node::Element(_)))
                .map(|n| n.id()),
            filter,
        )
    }

    /// 1-based indexed child after filtering.
    pub fn child(&self, filter: Option<&Locator>, index: usize) -> Result<Option<StaticElement>> {
        Ok(self.children(filter)?.into_iter().nth(index.saturating_sub(1)))
    }

    /// Following element siblings.
    pub fn nexts(&self, filter: Option<&Locator>) -> Result<Vec<StaticElement>> {
        let mut ids = Vec::new();
        let mut current = self.node_ref().next_sibling();
        while let Some(node) = current {
            if matches!(node.value(), Node::Element(_)) {
                ids.push(node.id());
            }
            current = node.next_sibling();
        }
        self.collect_filtered(ids.into_iter(), filter)
    }

    pub fn next(&self, filter: Option<&Locator>, index: usize) -> Result<Option<StaticElement>> {
        Ok(self.nexts(filter)?.into_iter().nth(index.saturating_sub(1)))
    }

    /// Preceding element siblings, nearest first.
    pub fn prevs(&self, filter: Option<&Locator>) -> Result<Vec<StaticElement>> {
        let mut ids = Vec::new();
        let mut current = self.node_ref().prev_sibling();
        while let Some(node) = current {
            if matches!(node.value(), Node::Element(_)) {
                ids.push(node.id());
            }
            current = node.prev_sibling();
        }
        self.collect_filtered(ids.into_iter(), filter)
    }

    pub fn prev(&self, filter: Option<&Locator>, index: usize) -> Result<Option<StaticElement>> {
        Ok(self.prevs(filter)?.into_iter().nth(index.saturating_sub(1)))
    }

    /// Elements after this one in document order, descendants excluded
    /// (the `following::` axis), nearest first.
    pub fn afters(&self, filter: Option<&Locator>) -> Result<Vec<StaticElement>> {
        let me = self.node_ref();
        let my_descendants: HashSet<NodeId> = me.descendants().map(|n| n.id()).collect();
        let mut seen_self = false;
        let mut ids = Vec::new();
        for node in self.doc.tree.root().descendants() {
            if node.id() == self.node {
                seen_self = true;
                continue;
            }
            if seen_self
                && matches!(node.value(), Node::Element(_))
                && !my_descendants.contains(&node.id())
            {
                ids.push(node.id());
            }
        }
        self.collect_filtered(ids.into_iter(), filter)
    }

    pub fn after(&self, filter: Option<&Locator>, index: usize) -> Result<Option<StaticElement>> {
        Ok(self.afters(filter)?.into_iter().nth(index.saturating_sub(1)))
    }

    /// Elements before this one in document order, ancestors excluded
    /// (the `preceding::` axis), nearest first.
    pub fn befores(&self, filter: Option<&Locator>) -> Result<Vec<StaticElement>> {
        let ancestors: HashSet<NodeId> = self.node_ref().ancestors().map(|n| n.id()).collect();
        let mut ids = Vec::new();
        for node in self.doc.tree.root().descendants() {
            if node.id() == self.node {
                break;
            }
            if matches!(node.value(), Node::Element(_)) && !ancestors.contains(&node.id()) {
                ids.push(node.id());
            }
        }
        ids.reverse();
        self.collect_filtered(ids.into_iter(), filter)
    }

    pub fn before(&self, filter: Option<&Locator>, index: usize) -> Result<Option<StaticElement>> {
        Ok(self
            .befores(filter)?
            .into_iter()
            .nth(index.saturating_sub(1)))
    }

    /// CSS path from (but excluding) `ancestor` down to this element:
    /// `tag:nth-child(i) > tag:nth-child(j) > …`. Empty when `self`
    /// is not strictly below `ancestor`.
    pub fn css_path_below(&self, ancestor: &StaticElement) -> String {
        let mut segments: Vec<String> = Vec::new();
        let mut current = self.node_ref();
        while current.id() != ancestor.node {
            let Node::Element(el) = current.value() else {
                return String::new();
            };
            // nth-child counts element siblings, any tag.
            let mut position = 1;
            let mut sibling = current.prev_sibling();
            while let Some(s) = sibling {
                if matches!(s.value(), Node::Element(_)) {
                    position += 1;
                }
                sibling = s.prev_sibling();
            }
            segments.push(format!("{}:nth-child({position})", el.name()));
            match current.parent() {
                Some(parent) => current = parent,
                None => return String::new(),
            }
        }
        segments.reverse();
        segments.join(" > ")
    }

    fn collect_filtered(
        &self,
        ids: impl Iterator<Item = NodeId>,
        filter: Option<&Locator>,
    ) -> Result<Vec<StaticElement>> {
        let mut out = Vec::new();
        for id in ids {
            let candidate = self.wrap(id);
            if match filter {
                Some(loc) => candidate.matches(loc)?,
                None => true,
            } {
                out.push(candidate);
            }
        }
        Ok(out)
    }
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| DualError::InvalidLocator(format!("bad CSS selector '{css}': {e}")))
}

fn render_text(node: NodeRef<'_, Node>, out: &mut String, in_pre: bool) {
    for child in node.children() {
        match child.value() {
            Node::Text(t) => push_text(out, &t, in_pre),
            Node::Element(el) => {
                let name = el.name();
                if SKIP_TAGS.contains(&name) {
                    continue;
                }
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                render_text(child, out, in_pre || name == "pre");
                if matches!(name, "td" | "th") {
                    let mut sibling = child.next_sibling();
                    let mut next_is_cell = false;
                    while let Some(s) = sibling {
                        if let Node::Element(e) = s.value() {
                            next_is_cell = matches!(e.name(), "td" | "th");
                            break;
                        }
                        sibling = s.next_sibling();
                    }
                    if next_is_cell {
                        out.push('\t');
                    }
                } else if BLOCK_TAGS.contains(&name) && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

fn push_text(out: &mut String, text: &str, in_pre: bool) {
    if in_pre {
        out.push_str(text);
        return;
    }
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !out.is_empty() && !out.ends_with([' ', '\n', '\t']) {
                out.push(' ');
            }
        } else {
            out.push(ch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_element(html: &str, base: Option<&str>) -> StaticElement {
        let doc = Arc::new(Html::parse_document(html));
        let base_url = base.and_then(|u| Url::parse(u).ok());
        StaticElement::document_root(doc, base_url).unwrap()
    }

    const PAGE: &str = r#"
        <html><body>
            <div id="nav">
                <a href="/docs">Docs</a>
                <a href="https://other.example/page">External</a>
                <a href="javascript:void(0)">Noop</a>
            </div>
            <table>
                <tr><td>a</td><td>b</td></tr>
                <tr><td>c</td><td>d</td></tr>
            </table>
            <pre>  keep
  this</pre>
            <p>one   two
            three</p>
            <script>var x = 1;</script>
        </body></html>
    "#;

    #[test]
    fn href_resolution_follows_page_url() {
        let root = page_element(PAGE, Some("https://a.example/x/y"));
        let links = root.eles("tag:a").unwrap();
        let first = links[0].as_element().unwrap();
        assert_eq!(first.attr("href").as_deref(), Some("https://a.example/docs"));
        let external = links[1].as_element().unwrap();
        assert_eq!(
            external.attr("href").as_deref(),
            Some("https://other.example/page")
        );
        let noop = links[2].as_element().unwrap();
        assert_eq!(noop.attr("href").as_deref(), Some("javascript:void(0)"));
    }

    #[test]
    fn href_without_page_url_passes_through() {
        let root = page_element(PAGE, None);
        let link = root.ele("tag:a").unwrap();
        assert_eq!(
            link.as_element().unwrap().attr("href").as_deref(),
            Some("/docs")
        );
    }

    #[test]
    fn scheme_relative_url_inherits_scheme() {
        let root = page_element(
            r#"<html><body><img src="//cdn.example/i.png"></body></html>"#,
            Some("https://a.example/"),
        );
        let img = root.ele("tag:img").unwrap();
        assert_eq!(
            img.as_element().unwrap().attr("src").as_deref(),
            Some("https://cdn.example/i.png")
        );
    }

    #[test]
    fn text_rendering_rules() {
        let root = page_element(PAGE, None);
        let text = root.text();
        // Table cells separated by tabs, rows by newlines.
        assert!(text.contains("a\tb"), "{text:?}");
        assert!(text.contains("c\td"), "{text:?}");
        // Whitespace collapses outside pre.
        assert!(text.contains("one two three"), "{text:?}");
        // pre keeps its shape.
        assert!(text.contains("  keep\n  this"), "{text:?}");
        // Script bodies are skipped.
        assert!(!text.contains("var x"), "{text:?}");
        // No trailing newline.
        assert!(!text.ends_with('\n'));
    }

    #[test]
    fn queries_return_mixed_results() {
        let root = page_element(PAGE, None);
        // Attribute-valued xpath yields strings.
        let hrefs = root.eles("x://a/@href").unwrap();
        assert_eq!(hrefs.len(), 3);
        assert_eq!(hrefs[0].text(), "/docs");
        // count() yields a number.
        let count = root.ele("x:count(//a)").unwrap();
        assert!(matches!(count, StaticResult::Num(n) if n == 3.0));
        // Text-node xpath yields the text.
        let text = root.ele("x://td/text()").unwrap();
        assert_eq!(text.text(), "a");
    }

    #[test]
    fn css_and_child_css() {
        let root = page_element(PAGE, None);
        let cells = root.eles("css:td").unwrap();
        assert_eq!(cells.len(), 4);

        let nav = root.ele("#nav").unwrap().into_element().unwrap();
        let direct = nav.eles("css:> a").unwrap();
        assert_eq!(direct.len(), 3);
        let nested = nav.eles("css:> td").unwrap();
        assert!(nested.is_empty());
    }

    #[test]
    fn relative_xpath_anchors_at_element() {
        let root = page_element(PAGE, None);
        let nav = root.ele("#nav").unwrap().into_element().unwrap();
        // Rooted expression is re-anchored, so only nav's links match.
        let links = nav.eles("x://a").unwrap();
        assert_eq!(links.len(), 3);
        let cells = nav.eles("x://td").unwrap();
        assert!(cells.is_empty());
    }

    #[test]
    fn tree_navigation() {
        let root = page_element(PAGE, None);
        let nav = root.ele("#nav").unwrap().into_element().unwrap();

        let children = nav.children(None).unwrap();
        assert_eq!(children.len(), 3);
        assert_eq!(children[0].text(), "Docs");

        let second = nav.child(None, 2).unwrap().unwrap();
        assert_eq!(second.text(), "External");

        let first = &children[0];
        assert_eq!(first.next(None, 1).unwrap().unwrap().text(), "External");
        assert_eq!(first.next(None, 2).unwrap().unwrap().text(), "Noop");
        assert!(first.prev(None, 1).unwrap().is_none());

        assert_eq!(first.parent(1).unwrap().tag(), "div");
        assert_eq!(first.parent(2).unwrap().tag(), "body");

        // Document-order navigation crosses sibling boundaries.
        let table = first.after(Some(&Locator::compile("tag:table")), 1)
            .unwrap()
            .unwrap();
        assert_eq!(table.tag(), "table");
        let before_table = table.before(None, 1).unwrap().unwrap();
        assert_eq!(before_table.tag(), "a"); // nearest preceding element

        let by_filter = nav
            .child(Some(&Locator::compile("@href:other")), 1)
            .unwrap()
            .unwrap();
        assert_eq!(by_filter.text(), "External");
    }

    #[test]
    fn outer_html_round_trip_preserves_identity() {
        let root = page_element(PAGE, None);
        let nav = root.ele("#nav").unwrap().into_element().unwrap();
        let rebuilt = StaticElement::from_html(&nav.outer_html(), None).unwrap();
        assert_eq!(rebuilt.tag(), nav.tag());
        assert_eq!(rebuilt.attrs(), nav.attrs());
    }

    #[test]
    fn snippet_parsing_finds_first_element() {
        let el = StaticElement::from_html("<li class=\"x\">item</li>", None).unwrap();
        assert_eq!(el.tag(), "li");
        assert_eq!(el.attr("class").as_deref(), Some("x"));
        assert_eq!(el.text(), "item");
    }

    #[test]
    fn css_path_below_uses_nth_child() {
        let root = StaticElement::from_html(
            "<div><span>a</span><p><b>x</b></p></div>",
            None,
        )
        .unwrap();
        let b = root.ele("tag:b").unwrap().into_element().unwrap();
        assert_eq!(b.css_path_below(&root), "p:nth-child(2) > b:nth-child(1)");
        // Self below self is empty.
        assert_eq!(root.css_path_below(&root), "");
    }

    #[test]
    fn parent_matching_by_locator() {
        let root = page_element(PAGE, None);
        let link = root.ele("tag:a").unwrap().into_element().unwrap();
        let hit = link.parent_matching("#nav").unwrap().unwrap();
        assert_eq!(hit.tag(), "div");
        assert!(link.parent_matching("#missing").unwrap().is_none());
    }
}
