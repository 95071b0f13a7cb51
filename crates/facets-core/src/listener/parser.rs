//! Listener pattern parser
//!
//! Patterns compile into an immutable arena of nodes. An item node matches
//! one facet name (or a prefix / metadata selection) and may point at the
//! node that continues the path; a group node fans out to several items.
//! The `*` repeat marker produces cycles in the arena, so every traversal
//! keeps a visited set.

use super::lexer::{tokenize, Token};
use crate::error::{FacetError, FacetResult};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;
use std::sync::Arc;

/// Index of a node inside a [`Pattern`]
pub(crate) type NodeId = usize;

static SIMPLE_NAME: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok());

static SIMPLE_LINK: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)(\.|:)([A-Za-z_][A-Za-z0-9_]*)$").ok());

static CACHE: Lazy<DashMap<String, Arc<Pattern>>> = Lazy::new(DashMap::new);

/// Whether `text` is a single plain facet name
pub fn is_simple_name(text: &str) -> bool {
    SIMPLE_NAME.as_ref().is_some_and(|re| re.is_match(text))
}

/// One path segment
#[derive(Debug, Clone)]
pub(crate) struct Item {
    /// Facet name, or name prefix when not `simple`
    pub name: String,
    /// Exact-name match
    pub simple: bool,
    /// Metadata key tested by `+meta` / `-meta`
    pub metadata_name: String,
    /// `+meta` (defined) versus `-meta` (undefined)
    pub metadata_defined: bool,
    /// Bare `-`: every facet change on the object
    pub is_any_facet: bool,
    /// `name?`: the facet may not exist
    pub optional: bool,
    /// `.` link (forward link changes) versus `:` (suppress)
    pub notify: bool,
    /// `name[]`: only element add/remove events
    pub list_handler: bool,
    /// Continuation of the path
    pub next: Option<NodeId>,
}

impl Item {
    fn named(name: String) -> Self {
        Self {
            name,
            simple: true,
            metadata_name: String::new(),
            metadata_defined: false,
            is_any_facet: false,
            optional: false,
            notify: true,
            list_handler: false,
            next: None,
        }
    }
}

/// Pattern arena node
#[derive(Debug, Clone)]
pub(crate) enum Node {
    Item(Item),
    Group(Vec<NodeId>),
}

/// A compiled listener pattern
#[derive(Debug)]
pub struct Pattern {
    text: String,
    nodes: Vec<Node>,
    root: NodeId,
}

impl Pattern {
    /// Parse `text`, reusing a previously compiled pattern when possible
    pub fn parse(text: &str) -> FacetResult<Arc<Pattern>> {
        if let Some(cached) = CACHE.get(text) {
            return Ok(cached.clone());
        }
        let pattern = Arc::new(Parser::new(text).parse()?);
        CACHE.insert(text.to_string(), pattern.clone());
        Ok(pattern)
    }

    /// Source text
    pub fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub(crate) fn item(&self, id: NodeId) -> Option<&Item> {
        match &self.nodes[id] {
            Node::Item(item) => Some(item),
            Node::Group(_) => None,
        }
    }

    /// Plain facet names, if the pattern is just a name or a list of names
    /// with no links or wildcards
    pub fn simple_names(&self) -> Option<Vec<String>> {
        let roots = match &self.nodes[self.root] {
            Node::Item(_) => vec![self.root],
            Node::Group(items) => items.clone(),
        };
        let mut names = Vec::with_capacity(roots.len());
        for id in roots {
            match &self.nodes[id] {
                Node::Item(item)
                    if item.simple && item.next.is_none() && !item.optional && !item.list_handler =>
                {
                    names.push(item.name.clone())
                }
                _ => return None,
            }
        }
        Some(names)
    }

    /// Check that every notifying link resolves to exactly one destination
    /// facet, as required for handlers that only receive values
    pub(crate) fn check_resolvable(&self) -> Result<(), String> {
        for node in &self.nodes {
            let Node::Item(item) = node else {
                continue;
            };
            let Some(mut next) = item.next.filter(|_| item.notify) else {
                continue;
            };
            let mut seen = FxHashSet::default();
            loop {
                if !seen.insert(next) {
                    return Err(format!("the path after '{}' repeats", item.name));
                }
                match &self.nodes[next] {
                    Node::Item(link) if link.simple && !link.list_handler => match link.next {
                        Some(n) => next = n,
                        None => break,
                    },
                    _ => {
                        return Err(format!(
                            "the path after '{}' does not lead to a single facet",
                            item.name
                        ))
                    }
                }
            }
        }
        Ok(())
    }
}

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<(Token, usize)>,
    pos: usize,
    nodes: Vec<Node>,
}

#[derive(Clone, Copy, PartialEq)]
enum Terminator {
    End,
    Bracket,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            tokens: Vec::new(),
            pos: 0,
            nodes: Vec::new(),
        }
    }

    fn parse(mut self) -> FacetResult<Pattern> {
        let simple_link = SIMPLE_LINK.as_ref().and_then(|re| re.captures(self.text));
        let root = if let Some(caps) = simple_link {
            let last = self.push(Node::Item(Item::named(caps[3].to_string())));
            let mut first = Item::named(caps[1].to_string());
            first.notify = &caps[2] == ".";
            first.next = Some(last);
            self.push(Node::Item(first))
        } else if is_simple_name(self.text) {
            self.push(Node::Item(Item::named(self.text.to_string())))
        } else {
            self.tokens = tokenize(self.text)?;
            if self.tokens.is_empty() {
                return Err(self.error("Expected a facet name"));
            }
            self.parse_group(Terminator::End)?
        };
        Ok(Pattern {
            text: self.text.to_string(),
            nodes: self.nodes,
            root,
        })
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        self.pos += 1;
        token
    }

    fn at_terminator(&self, terminator: Terminator) -> bool {
        match terminator {
            Terminator::End => self.peek().is_none(),
            Terminator::Bracket => self.peek() == Some(&Token::RBracket),
        }
    }

    fn error(&self, message: &str) -> FacetError {
        let column = self
            .tokens
            .get(self.pos)
            .map(|(_, col)| *col)
            .unwrap_or(self.text.len());
        FacetError::PatternSyntax {
            text: self.text.to_string(),
            column,
            message: message.to_string(),
        }
    }

    fn parse_group(&mut self, terminator: Terminator) -> FacetResult<NodeId> {
        let mut items = Vec::new();
        loop {
            items.push(self.parse_item(terminator)?);
            if self.at_terminator(terminator) {
                if terminator == Terminator::Bracket {
                    self.bump();
                }
                break;
            }
            if self.peek() != Some(&Token::Comma) {
                return Err(match terminator {
                    Terminator::End => self.error("Expected ',' or end of string"),
                    Terminator::Bracket => self.error("Expected ',' or ']'"),
                });
            }
            self.bump();
        }
        if items.len() == 1 {
            return Ok(items[0]);
        }
        Ok(self.push(Node::Group(items)))
    }

    fn parse_item(&mut self, terminator: Terminator) -> FacetResult<NodeId> {
        let result = if self.peek() == Some(&Token::LBracket) {
            self.bump();
            self.parse_group(Terminator::Bracket)?
        } else {
            let name = match self.peek() {
                Some(Token::Name(name)) => {
                    let name = name.clone();
                    self.bump();
                    name
                }
                _ => String::new(),
            };
            let mut item = Item::named(name);
            match self.peek() {
                Some(Token::Plus) | Some(Token::Minus) => {
                    item.metadata_defined = self.bump() == Some(Token::Plus);
                    if let Some(Token::Name(meta)) = self.peek() {
                        item.metadata_name = meta.clone();
                        self.bump();
                    }
                    item.simple = false;
                    item.is_any_facet = !item.metadata_defined
                        && item.name.is_empty()
                        && item.metadata_name.is_empty();
                    let at_end = self.at_terminator(terminator)
                        || (self.peek() == Some(&Token::Comma) && terminator == Terminator::Bracket)
                        || (self.peek() == Some(&Token::Comma) && terminator == Terminator::End);
                    if item.is_any_facet && !at_end {
                        return Err(self.error("Expected end of name"));
                    }
                }
                Some(Token::Question) => {
                    if item.name.is_empty() {
                        return Err(self.error("Expected non-empty name preceding '?'"));
                    }
                    item.optional = true;
                    self.bump();
                }
                _ if item.name.is_empty() => return Err(self.error("Expected a facet name")),
                _ => {}
            }
            self.push(Node::Item(item))
        };

        let cycle = self.peek() == Some(&Token::Star);
        if cycle {
            self.bump();
        }

        if matches!(self.peek(), Some(Token::Dot) | Some(Token::Colon)) {
            let notify = self.bump() == Some(Token::Dot);
            let next = self.parse_item(terminator)?;
            if cycle {
                let group = self.push(Node::Group(vec![next, result]));
                self.link_tails(result, notify, group);
                return Ok(group);
            }
            self.link_tails(result, notify, next);
            return Ok(result);
        }

        if self.peek() == Some(&Token::LBracket) {
            self.bump();
            if self.bump() != Some(Token::RBracket) {
                return Err(self.error("Expected '[]' at the end of an item"));
            }
            let follows_ok = self.at_terminator(terminator) || self.peek() == Some(&Token::Comma);
            if !follows_ok {
                return Err(self.error("Expected '[]' at the end of an item"));
            }
            for tail in self.tails(result) {
                if let Node::Item(item) = &mut self.nodes[tail] {
                    item.list_handler = true;
                }
            }
        }

        if cycle {
            self.link_tails(result, true, result);
        }
        Ok(result)
    }

    /// Items that end the chains starting at `id`
    fn tails(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut seen = FxHashSet::default();
        self.collect_tails(id, &mut seen, &mut out);
        out
    }

    fn collect_tails(&self, id: NodeId, seen: &mut FxHashSet<NodeId>, out: &mut Vec<NodeId>) {
        if !seen.insert(id) {
            return;
        }
        match &self.nodes[id] {
            Node::Item(item) => match item.next {
                Some(next) => self.collect_tails(next, seen, out),
                None => out.push(id),
            },
            Node::Group(items) => {
                for &member in items {
                    self.collect_tails(member, seen, out);
                }
            }
        }
    }

    fn link_tails(&mut self, id: NodeId, notify: bool, next: NodeId) {
        for tail in self.tails(id) {
            if let Node::Item(item) = &mut self.nodes[tail] {
                item.notify = notify;
                item.next = Some(next);
            }
        }
    }
}
