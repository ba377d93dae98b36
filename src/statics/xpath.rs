//! XPath 1.0 subset evaluator over a parsed HTML tree.
//!
//! Covers the expressions the locator compiler emits plus the common
//! hand-written queries: absolute and relative paths, `//`, `*` and
//! name tests, `@attr` and `text()` steps, `.` and `..`, predicates
//! with `and`/`or`/`not()`/`contains()`/`starts-with()`/
//! `normalize-space()`/`name()`/position tests, union `|`, and the
//! top-level functions `count()`, `string()`, `concat()`. Unsupported
//! constructs fail with `InvalidLocator` instead of silently matching
//! nothing.

use std::collections::HashSet;

use ego_tree::NodeRef;
use scraper::{Html, Node};

use crate::error::{DualError, Result};

/// A node selected by an xpath: an element, a text node, or an
/// attribute (value captured at selection time).
#[derive(Debug, Clone)]
pub enum XNode<'a> {
    Elem(NodeRef<'a, Node>),
    Text(NodeRef<'a, Node>),
    Attr {
        owner: NodeRef<'a, Node>,
        name: String,
        value: String,
    },
}

impl<'a> XNode<'a> {
    pub fn string_value(&self) -> String {
        match self {
            XNode::Elem(node) => collect_text(*node),
            XNode::Text(node) => match node.value() {
                Node::Text(t) => t.to_string(),
                _ => String::new(),
            },
            XNode::Attr { value, .. } => value.clone(),
        }
    }

    fn dedup_key(&self) -> (ego_tree::NodeId, Option<String>) {
        match self {
            XNode::Elem(n) | XNode::Text(n) => (n.id(), None),
            XNode::Attr { owner, name, .. } => (owner.id(), Some(name.clone())),
        }
    }
}

fn collect_text(node: NodeRef<'_, Node>) -> String {
    let mut out = String::new();
    for descendant in node.descendants() {
        if let Node::Text(t) = descendant.value() {
            out.push_str(&t);
        }
    }
    out
}

/// Result of evaluating an expression.
#[derive(Debug, Clone)]
pub enum XValue<'a> {
    Nodes(Vec<XNode<'a>>),
    Str(String),
    Num(f64),
    Bool(bool),
}

impl<'a> XValue<'a> {
    pub fn truthy(&self) -> bool {
        match self {
            XValue::Nodes(ns) => !ns.is_empty(),
            XValue::Str(s) => !s.is_empty(),
            XValue::Num(n) => *n != 0.0 && !n.is_nan(),
            XValue::Bool(b) => *b,
        }
    }

    pub fn as_string(&self) -> String {
        match self {
            XValue::Nodes(ns) => ns.first().map(XNode::string_value).unwrap_or_default(),
            XValue::Str(s) => s.clone(),
            XValue::Num(n) => format_number(*n),
            XValue::Bool(b) => b.to_string(),
        }
    }

    fn as_number(&self) -> f64 {
        match self {
            XValue::Num(n) => *n,
            XValue::Str(s) => s.trim().parse().unwrap_or(f64::NAN),
            XValue::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            XValue::Nodes(_) => self.as_string().trim().parse().unwrap_or(f64::NAN),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Evaluate `expr` with `context` as the context node. Pass the tree
/// root to query the whole document.
pub fn evaluate<'a>(
    doc: &'a Html,
    context: NodeRef<'a, Node>,
    expr: &str,
) -> Result<XValue<'a>> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        source: expr,
    };
    let ast = parser.parse_expr()?;
    parser.expect_end()?;
    let ctx = EvalCtx {
        root: doc.tree.root(),
        node: XNode::Elem(context),
        position: 1,
        size: 1,
    };
    eval_expr(&ast, &ctx)
}

// ---------------------------------------------------------------- lexer

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Slash,
    DoubleSlash,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Comma,
    Pipe,
    Eq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    Dot,
    DotDot,
    Star,
    Axis(String),
    Name(String),
    Literal(String),
    Number(f64),
}

fn tokenize(expr: &str) -> Result<Vec<Tok>> {
    let bytes: Vec<char> = expr.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '/' => {
                if bytes.get(i + 1) == Some(&'/') {
                    out.push(Tok::DoubleSlash);
                    i += 2;
                } else {
                    out.push(Tok::Slash);
                    i += 1;
                }
            }
            '[' => {
                out.push(Tok::LBracket);
                i += 1;
            }
            ']' => {
                out.push(Tok::RBracket);
                i += 1;
            }
            '(' => {
                out.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                out.push(Tok::RParen);
                i += 1;
            }
            '@' => {
                out.push(Tok::At);
                i += 1;
            }
            ',' => {
                out.push(Tok::Comma);
                i += 1;
            }
            '|' => {
                out.push(Tok::Pipe);
                i += 1;
            }
            '=' => {
                out.push(Tok::Eq);
                i += 1;
            }
            '!' => {
                if bytes.get(i + 1) == Some(&'=') {
                    out.push(Tok::NotEq);
                    i += 2;
                } else {
                    return Err(DualError::InvalidLocator(format!(
                        "unexpected '!' in xpath: {expr}"
                    )));
                }
            }
            '<' => {
                if bytes.get(i + 1) == Some(&'=') {
                    out.push(Tok::Le);
                    i += 2;
                } else {
                    out.push(Tok::Lt);
                    i += 1;
                }
            }
            '>' => {
                if bytes.get(i + 1) == Some(&'=') {
                    out.push(Tok::Ge);
                    i += 2;
                } else {
                    out.push(Tok::Gt);
                    i += 1;
                }
            }
            '*' => {
                out.push(Tok::Star);
                i += 1;
            }
            '.' => {
                if bytes.get(i + 1) == Some(&'.') {
                    out.push(Tok::DotDot);
                    i += 2;
                } else {
                    out.push(Tok::Dot);
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    s.push(bytes[i]);
                    i += 1;
                }
                if i >= bytes.len() {
                    return Err(DualError::InvalidLocator(format!(
                        "unterminated string literal in xpath: {expr}"
                    )));
                }
                i += 1;
                out.push(Tok::Literal(s));
            }
            '0'..='9' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == '.') {
                    i += 1;
                }
                let num: String = bytes[start..i].iter().collect();
                let parsed = num.parse().map_err(|_| {
                    DualError::InvalidLocator(format!("bad number '{num}' in xpath: {expr}"))
                })?;
                out.push(Tok::Number(parsed));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_alphanumeric() || matches!(bytes[i], '_' | '-'))
                {
                    i += 1;
                }
                let name: String = bytes[start..i].iter().collect();
                if bytes.get(i) == Some(&':') && bytes.get(i + 1) == Some(&':') {
                    out.push(Tok::Axis(name));
                    i += 2;
                } else {
                    out.push(Tok::Name(name));
                }
            }
            other => {
                return Err(DualError::InvalidLocator(format!(
                    "unexpected '{other}' in xpath: {expr}"
                )));
            }
        }
    }
    Ok(out)
}

// --------------------------------------------------------------- parser

#[derive(Debug, Clone)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, CmpOp, Box<Expr>),
    Union(Vec<Expr>),
    Path(Path),
    Call(String, Vec<Expr>),
    Literal(String),
    Number(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone)]
struct Path {
    absolute: bool,
    steps: Vec<Step>,
}

#[derive(Debug, Clone)]
struct Step {
    /// Preceded by `//` (descendant-or-self expansion).
    descendant: bool,
    kind: StepKind,
    predicates: Vec<Expr>,
}

#[derive(Debug, Clone)]
enum StepKind {
    SelfNode,
    Parent,
    Attr(Option<String>),
    Elem(Option<String>),
    TextNodes,
    AnyNode,
}

struct Parser<'s> {
    tokens: Vec<Tok>,
    pos: usize,
    source: &'s str,
}

impl<'s> Parser<'s> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn fail(&self, what: &str) -> DualError {
        DualError::InvalidLocator(format!("{what} in xpath: {}", self.source))
    }

    fn expect_end(&self) -> Result<()> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(self.fail("trailing tokens"))
        }
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Tok::Name(n)) if n == "or") {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_compare()?;
        while matches!(self.peek(), Some(Tok::Name(n)) if n == "and") {
            self.pos += 1;
            let right = self.parse_compare()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_compare(&mut self) -> Result<Expr> {
        let mut left = self.parse_union()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Eq) => CmpOp::Eq,
                Some(Tok::NotEq) => CmpOp::NotEq,
                Some(Tok::Lt) => CmpOp::Lt,
                Some(Tok::Gt) => CmpOp::Gt,
                Some(Tok::Le) => CmpOp::Le,
                Some(Tok::Ge) => CmpOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_union()?;
            left = Expr::Compare(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_union(&mut self) -> Result<Expr> {
        let first = self.parse_path_or_primary()?;
        if self.peek() != Some(&Tok::Pipe) {
            return Ok(first);
        }
        let mut arms = vec![first];
        while self.eat(&Tok::Pipe) {
            arms.push(self.parse_path_or_primary()?);
        }
        Ok(Expr::Union(arms))
    }

    fn parse_path_or_primary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Tok::Slash) | Some(Tok::DoubleSlash) => self.parse_path(true),
            Some(Tok::At) | Some(Tok::Dot) | Some(Tok::DotDot) | Some(Tok::Star)
            | Some(Tok::Axis(_)) => self.parse_path(false),
            Some(Tok::Name(name)) => {
                let name = name.clone();
                if self.tokens.get(self.pos + 1) == Some(&Tok::LParen)
                    && !matches!(name.as_str(), "text" | "node")
                {
                    self.parse_call()
                } else {
                    self.parse_path(false)
                }
            }
            Some(Tok::Literal(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(Expr::Literal(s))
            }
            Some(Tok::Number(n)) => {
                let n = *n;
                self.pos += 1;
                Ok(Expr::Number(n))
            }
            Some(Tok::LParen) => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                if !self.eat(&Tok::RParen) {
                    return Err(self.fail("expected ')'"));
                }
                Ok(inner)
            }
            _ => Err(self.fail("expected expression")),
        }
    }

    fn parse_call(&mut self) -> Result<Expr> {
        let name = match self.next() {
            Some(Tok::Name(n)) => n,
            _ => return Err(self.fail("expected function name")),
        };
        if !self.eat(&Tok::LParen) {
            return Err(self.fail("expected '('"));
        }
        let mut args = Vec::new();
        if self.peek() != Some(&Tok::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
        }
        if !self.eat(&Tok::RParen) {
            return Err(self.fail("expected ')' after arguments"));
        }
        Ok(Expr::Call(name, args))
    }

    fn parse_path(&mut self, rooted: bool) -> Result<Expr> {
        let mut absolute = false;
        let mut pending_descendant = false;
        if rooted {
            absolute = true;
            match self.next() {
                Some(Tok::Slash) => {}
                Some(Tok::DoubleSlash) => pending_descendant = true,
                _ => return Err(self.fail("expected '/'")),
            }
        }

        let mut steps = Vec::new();
        loop {
            if absolute && steps.is_empty() && self.peek().is_none() && !pending_descendant {
                // Bare "/" selects the document root.
                break;
            }
            let mut step = self.parse_step()?;
            step.descendant = pending_descendant;
            steps.push(step);
            match self.peek() {
                Some(Tok::Slash) => {
                    self.pos += 1;
                    pending_descendant = false;
                }
                Some(Tok::DoubleSlash) => {
                    self.pos += 1;
                    pending_descendant = true;
                }
                _ => break,
            }
        }
        Ok(Expr::Path(Path { absolute, steps }))
    }

    fn parse_step(&mut self) -> Result<Step> {
        let kind = match self.next() {
            Some(Tok::Dot) => StepKind::SelfNode,
            Some(Tok::DotDot) => StepKind::Parent,
            Some(Tok::At) => match self.next() {
                Some(Tok::Name(name)) => StepKind::Attr(Some(name)),
                Some(Tok::Star) => StepKind::Attr(None),
                _ => return Err(self.fail("expected attribute name after '@'")),
            },
            Some(Tok::Star) => StepKind::Elem(None),
            Some(Tok::Axis(axis)) => return self.parse_axis_step(&axis),
            Some(Tok::Name(name)) => {
                if self.peek() == Some(&Tok::LParen) {
                    self.pos += 1;
                    if !self.eat(&Tok::RParen) {
                        return Err(self.fail("expected ')' in node test"));
                    }
                    match name.as_str() {
                        "text" => StepKind::TextNodes,
                        "node" => StepKind::AnyNode,
                        other => {
                            return Err(self.fail(&format!("unsupported node test '{other}()'")));
                        }
                    }
                } else {
                    StepKind::Elem(Some(name))
                }
            }
            _ => return Err(self.fail("expected step")),
        };
        let predicates = self.parse_predicates()?;
        Ok(Step {
            descendant: false,
            kind,
            predicates,
        })
    }

    fn parse_axis_step(&mut self, axis: &str) -> Result<Step> {
        // A handful of verbose axes map onto the abbreviated forms.
        let mut step = match axis {
            "child" | "descendant" | "descendant-or-self" | "self" | "parent" | "attribute" => {
                self.parse_step()?
            }
            other => return Err(self.fail(&format!("unsupported axis '{other}::'"))),
        };
        match axis {
            "descendant" | "descendant-or-self" => step.descendant = true,
            "self" => {
                step.kind = match step.kind {
                    StepKind::AnyNode | StepKind::Elem(None) => StepKind::SelfNode,
                    other => other,
                }
            }
            "parent" => {
                step.kind = match step.kind {
                    StepKind::AnyNode | StepKind::Elem(None) => StepKind::Parent,
                    other => other,
                }
            }
            "attribute" => {
                step.kind = match step.kind {
                    StepKind::Elem(name) => StepKind::Attr(name),
                    other => other,
                }
            }
            _ => {}
        }
        Ok(step)
    }

    fn parse_predicates(&mut self) -> Result<Vec<Expr>> {
        let mut predicates = Vec::new();
        while self.eat(&Tok::LBracket) {
            predicates.push(self.parse_expr()?);
            if !self.eat(&Tok::RBracket) {
                return Err(self.fail("expected ']'"));
            }
        }
        Ok(predicates)
    }
}

// ------------------------------------------------------------ evaluator

struct EvalCtx<'a> {
    root: NodeRef<'a, Node>,
    node: XNode<'a>,
    position: usize,
    size: usize,
}

fn eval_expr<'a>(expr: &Expr, ctx: &EvalCtx<'a>) -> Result<XValue<'a>> {
    match expr {
        Expr::Literal(s) => Ok(XValue::Str(s.clone())),
        Expr::Number(n) => Ok(XValue::Num(*n)),
        Expr::Or(a, b) => Ok(XValue::Bool(
            eval_expr(a, ctx)?.truthy() || eval_expr(b, ctx)?.truthy(),
        )),
        Expr::And(a, b) => Ok(XValue::Bool(
            eval_expr(a, ctx)?.truthy() && eval_expr(b, ctx)?.truthy(),
        )),
        Expr::Compare(a, op, b) => {
            let left = eval_expr(a, ctx)?;
            let right = eval_expr(b, ctx)?;
            Ok(XValue::Bool(compare(&left, *op, &right)))
        }
        Expr::Union(arms) => {
            let mut nodes = Vec::new();
            for arm in arms {
                match eval_expr(arm, ctx)? {
                    XValue::Nodes(ns) => nodes.extend(ns),
                    _ => {
                        return Err(DualError::InvalidLocator(
                            "union arms must be node sets".to_string(),
                        ))
                    }
                }
            }
            Ok(XValue::Nodes(dedup(nodes)))
        }
        Expr::Path(path) => eval_path(path, ctx).map(XValue::Nodes),
        Expr::Call(name, args) => eval_call(name, args, ctx),
    }
}

fn eval_path<'a>(path: &Path, ctx: &EvalCtx<'a>) -> Result<Vec<XNode<'a>>> {
    let start = if path.absolute {
        XNode::Elem(ctx.root)
    } else {
        ctx.node.clone()
    };
    let mut current = vec![start];
    for step in &path.steps {
        let mut next = Vec::new();
        for node in &current {
            next.extend(apply_step(node, step, ctx)?);
        }
        current = dedup(next);
    }
    Ok(current)
}

fn node_ref<'a>(node: &XNode<'a>) -> Option<NodeRef<'a, Node>> {
    match node {
        XNode::Elem(n) | XNode::Text(n) => Some(*n),
        XNode::Attr { .. } => None,
    }
}

fn apply_step<'a>(node: &XNode<'a>, step: &Step, ctx: &EvalCtx<'a>) -> Result<Vec<XNode<'a>>> {
    let Some(base) = node_ref(node) else {
        return Ok(Vec::new());
    };

    let bases: Vec<NodeRef<'a, Node>> = if step.descendant {
        base.descendants().collect()
    } else {
        vec![base]
    };

    let mut out = Vec::new();
    for b in bases {
        let group: Vec<XNode<'a>> = match &step.kind {
            StepKind::SelfNode => vec![wrap(b)],
            StepKind::Parent => b.parent().map(wrap).into_iter().collect(),
            StepKind::Attr(name) => match b.value() {
                Node::Element(el) => el
                    .attrs()
                    .filter(|(k, _)| name.as_deref().map_or(true, |n| *k == n))
                    .map(|(k, v)| XNode::Attr {
                        owner: b,
                        name: k.to_string(),
                        value: v.to_string(),
                    })
                    .collect(),
                _ => Vec::new(),
            },
            StepKind::Elem(name) => b
                .children()
                .filter(|c| match c.value() {
                    Node::Element(el) => name.as_deref().map_or(true, |n| el.name() == n),
                    _ => false,
                })
                .map(XNode::Elem)
                .collect(),
            StepKind::TextNodes => b
                .children()
                .filter(|c| matches!(c.value(), Node::Text(_)))
                .map(XNode::Text)
                .collect(),
            StepKind::AnyNode => b.children().map(wrap).collect(),
        };
        out.extend(filter_predicates(group, &step.predicates, ctx)?);
    }
    Ok(out)
}

fn wrap(node: NodeRef<'_, Node>) -> XNode<'_> {
    match node.value() {
        Node::Text(_) => XNode::Text(node),
        _ => XNode::Elem(node),
    }
}

fn filter_predicates<'a>(
    group: Vec<XNode<'a>>,
    predicates: &[Expr],
    ctx: &EvalCtx<'a>,
) -> Result<Vec<XNode<'a>>> {
    let mut current = group;
    for predicate in predicates {
        let size = current.len();
        let mut kept = Vec::new();
        for (idx, node) in current.into_iter().enumerate() {
            let pred_ctx = EvalCtx {
                root: ctx.root,
                node: node.clone(),
                position: idx + 1,
                size,
            };
            let value = eval_expr(predicate, &pred_ctx)?;
            let keep = match value {
                // A bare number is a position test.
                XValue::Num(n) => (idx + 1) as f64 == n,
                other => other.truthy(),
            };
            if keep {
                kept.push(node);
            }
        }
        current = kept;
    }
    Ok(current)
}

fn dedup<'a>(nodes: Vec<XNode<'a>>) -> Vec<XNode<'a>> {
    let mut seen = HashSet::new();
    nodes
        .into_iter()
        .filter(|n| seen.insert(n.dedup_key()))
        .collect()
}

fn compare(left: &XValue<'_>, op: CmpOp, right: &XValue<'_>) -> bool {
    // Node-sets compare existentially against the other side.
    if let XValue::Nodes(ns) = left {
        return ns
            .iter()
            .any(|n| compare(&XValue::Str(n.string_value()), op, right));
    }
    if let XValue::Nodes(ns) = right {
        return ns
            .iter()
            .any(|n| compare(left, op, &XValue::Str(n.string_value())));
    }
    match op {
        CmpOp::Eq | CmpOp::NotEq => {
            let equal = match (left, right) {
                (XValue::Num(a), b) | (b, XValue::Num(a)) => *a == b.as_number(),
                (XValue::Bool(a), b) | (b, XValue::Bool(a)) => *a == b.truthy(),
                (a, b) => a.as_string() == b.as_string(),
            };
            (op == CmpOp::Eq) == equal
        }
        CmpOp::Lt => left.as_number() < right.as_number(),
        CmpOp::Gt => left.as_number() > right.as_number(),
        CmpOp::Le => left.as_number() <= right.as_number(),
        CmpOp::Ge => left.as_number() >= right.as_number(),
    }
}

fn eval_call<'a>(name: &str, args: &[Expr], ctx: &EvalCtx<'a>) -> Result<XValue<'a>> {
    let arg = |i: usize| -> Result<XValue<'a>> {
        args.get(i)
            .map(|a| eval_expr(a, ctx))
            .transpose()?
            .ok_or_else(|| DualError::InvalidLocator(format!("{name}() missing argument {i}")))
    };
    match name {
        "contains" => Ok(XValue::Bool(
            arg(0)?.as_string().contains(&arg(1)?.as_string()),
        )),
        "starts-with" => Ok(XValue::Bool(
            arg(0)?.as_string().starts_with(&arg(1)?.as_string()),
        )),
        "not" => Ok(XValue::Bool(!arg(0)?.truthy())),
        "concat" => {
            let mut out = String::new();
            for a in args {
                out.push_str(&eval_expr(a, ctx)?.as_string());
            }
            Ok(XValue::Str(out))
        }
        "count" => match arg(0)? {
            XValue::Nodes(ns) => Ok(XValue::Num(ns.len() as f64)),
            _ => Err(DualError::InvalidLocator(
                "count() needs a node set".to_string(),
            )),
        },
        "string" => {
            if args.is_empty() {
                Ok(XValue::Str(ctx.node.string_value()))
            } else {
                Ok(XValue::Str(arg(0)?.as_string()))
            }
        }
        "normalize-space" => {
            let raw = if args.is_empty() {
                ctx.node.string_value()
            } else {
                arg(0)?.as_string()
            };
            Ok(XValue::Str(
                raw.split_whitespace().collect::<Vec<_>>().join(" "),
            ))
        }
        "name" => {
            let target = if args.is_empty() {
                Some(ctx.node.clone())
            } else {
                match arg(0)? {
                    XValue::Nodes(ns) => ns.first().cloned(),
                    _ => None,
                }
            };
            let name = match target {
                Some(XNode::Elem(n)) => match n.value() {
                    Node::Element(el) => el.name().to_string(),
                    _ => String::new(),
                },
                Some(XNode::Attr { name, .. }) => name,
                _ => String::new(),
            };
            Ok(XValue::Str(name))
        }
        "last" => Ok(XValue::Num(ctx.size as f64)),
        "position" => Ok(XValue::Num(ctx.position as f64)),
        "true" => Ok(XValue::Bool(true)),
        "false" => Ok(XValue::Bool(false)),
        other => Err(DualError::InvalidLocator(format!(
            "unsupported xpath function '{other}()'"
        ))),
    }
}
