//! Turns raw element maps handed out by a store into [`Path`] values.
//!
//! Stores may key identity and label either with a symbolic [`Token`] or with a
//! plain string. Both spellings are folded into the canonical [`Node`]/[`Edge`]
//! model here, at the boundary, so nothing downstream sees them.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    errors::RouteGraphError,
    graph::{Edge, EdgeId, Node, NodeId, PropertyMap},
};

/// Placeholder used when a projected property is missing.
pub const UNKNOWN: &str = "unknown";

/// Reserved element keys a store may use instead of plain strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Token {
    Id,
    Label,
    Source,
    Target,
}

impl Token {
    pub fn name(self) -> &'static str {
        match self {
            Token::Id => "id",
            Token::Label => "label",
            Token::Source => "source",
            Token::Target => "target",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RawKey {
    Token(Token),
    Name(String),
}

impl fmt::Display for RawKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawKey::Token(token) => f.write_str(token.name()),
            RawKey::Name(name) => f.write_str(name),
        }
    }
}

impl From<Token> for RawKey {
    fn from(token: Token) -> Self {
        RawKey::Token(token)
    }
}

impl From<&str> for RawKey {
    fn from(name: &str) -> Self {
        RawKey::Name(name.to_string())
    }
}

/// Untyped key/value map for one path element, in the order the store produced it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ElementMap {
    entries: Vec<(RawKey, Value)>,
}

impl ElementMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<RawKey>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<RawKey>, value: impl Into<Value>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn entries(&self) -> &[(RawKey, Value)] {
        &self.entries
    }

    /// Looks `name` up: exact string key first, then any key whose string form
    /// equals `name` (case-sensitive).
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(key, _)| matches!(key, RawKey::Name(k) if k == name))
            .or_else(|| self.entries.iter().find(|(key, _)| key.to_string() == name))
            .map(|(_, value)| value)
    }

    /// String rendering of [`ElementMap::lookup`], or [`UNKNOWN`].
    pub fn display(&self, name: &str) -> String {
        match self.lookup(name) {
            Some(value) => value_to_display(value),
            None => UNKNOWN.to_string(),
        }
    }

    fn lookup_token(&self, token: Token) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(key, _)| *key == RawKey::Token(token))
            .map(|(_, value)| value)
            .or_else(|| self.lookup(token.name()))
    }

    fn has_token(&self, token: Token) -> bool {
        self.entries
            .iter()
            .any(|(key, _)| *key == RawKey::Token(token))
    }

    /// Plain-string entries. A reserved name is dropped only when it stands in
    /// for a missing token, since it then already fed identity or label.
    fn properties(&self) -> PropertyMap {
        let mut properties = PropertyMap::new();
        for (key, value) in &self.entries {
            if let RawKey::Name(name) = key {
                if reserved_token(name).is_some_and(|token| !self.has_token(token)) {
                    continue;
                }
                properties.entry(name.clone()).or_insert_with(|| value.clone());
            }
        }
        properties
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RawElement {
    Node(ElementMap),
    Edge(ElementMap),
}

impl RawElement {
    pub fn map(&self) -> &ElementMap {
        match self {
            RawElement::Node(map) | RawElement::Edge(map) => map,
        }
    }
}

/// Which property names the display projection reads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub node_key: String,
    pub edge_key: String,
}

impl Projection {
    pub fn new(node_key: impl Into<String>, edge_key: impl Into<String>) -> Self {
        Self {
            node_key: node_key.into(),
            edge_key: edge_key.into(),
        }
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::new("name", "label")
    }
}

/// One node of the display projection with the edge value used to reach it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayStep {
    pub name: String,
    pub via: Option<String>,
}

/// Alternating node/edge sequence with its aggregated cost.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub total_cost: f64,
    pub display: Vec<DisplayStep>,
}

impl Path {
    pub fn hops(&self) -> usize {
        self.edges.len()
    }

    pub fn start(&self) -> Option<&Node> {
        self.nodes.first()
    }

    pub fn end(&self) -> Option<&Node> {
        self.nodes.last()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|node| node.id).collect()
    }

    pub fn edge_ids(&self) -> Vec<EdgeId> {
        self.edges.iter().map(|edge| edge.id).collect()
    }

    /// Display names in path order.
    pub fn names(&self) -> Vec<&str> {
        self.display.iter().map(|step| step.name.as_str()).collect()
    }

    /// Re-encodes the path in the raw shape accepted by [`materialize`].
    pub fn to_raw(&self) -> Vec<RawElement> {
        let mut raw = Vec::with_capacity(self.nodes.len() + self.edges.len());
        for (idx, node) in self.nodes.iter().enumerate() {
            if let Some(edge) = idx.checked_sub(1).and_then(|prev| self.edges.get(prev)) {
                raw.push(RawElement::Edge(edge_element_map(edge)));
            }
            raw.push(RawElement::Node(node_element_map(node)));
        }
        raw
    }
}

pub fn node_element_map(node: &Node) -> ElementMap {
    let mut map = ElementMap::new()
        .with(Token::Id, node.id.0)
        .with(Token::Label, node.label.as_str());
    for (key, value) in &node.properties {
        map.insert(key.as_str(), value.clone());
    }
    map
}

pub fn edge_element_map(edge: &Edge) -> ElementMap {
    let mut map = ElementMap::new()
        .with(Token::Id, edge.id.0)
        .with(Token::Label, edge.label.as_str())
        .with(Token::Source, edge.source.0)
        .with(Token::Target, edge.target.0);
    for (key, value) in &edge.properties {
        map.insert(key.as_str(), value.clone());
    }
    map
}

/// Builds a [`Path`] from alternating raw node/edge maps.
///
/// `total_cost` is whatever the caller accumulated during the search; the
/// materializer never recomputes it. Missing display properties fall back to
/// [`UNKNOWN`]; structural problems are errors.
pub fn materialize(
    raw: &[RawElement],
    projection: &Projection,
    total_cost: f64,
) -> Result<Path, RouteGraphError> {
    if raw.len() % 2 == 0 {
        return Err(RouteGraphError::invalid_input(format!(
            "path must hold an odd number of elements, got {}",
            raw.len()
        )));
    }
    let mut nodes = Vec::with_capacity(raw.len() / 2 + 1);
    let mut edges = Vec::with_capacity(raw.len() / 2);
    let mut display = Vec::with_capacity(raw.len() / 2 + 1);
    let mut via = None;
    for (idx, element) in raw.iter().enumerate() {
        match (idx % 2, element) {
            (0, RawElement::Node(map)) => {
                nodes.push(normalize_node(map)?);
                display.push(DisplayStep {
                    name: map.display(&projection.node_key),
                    via: via.take(),
                });
            }
            (1, RawElement::Edge(map)) => {
                edges.push(normalize_edge(map)?);
                via = Some(map.display(&projection.edge_key));
            }
            _ => {
                return Err(RouteGraphError::invalid_input(format!(
                    "path element {idx} is out of node/edge alternation"
                )));
            }
        }
    }
    Ok(Path {
        nodes,
        edges,
        total_cost,
        display,
    })
}

fn normalize_node(map: &ElementMap) -> Result<Node, RouteGraphError> {
    Ok(Node {
        id: NodeId(required_id(map, Token::Id, "node")?),
        label: optional_label(map),
        properties: map.properties(),
    })
}

fn normalize_edge(map: &ElementMap) -> Result<Edge, RouteGraphError> {
    Ok(Edge {
        id: EdgeId(required_id(map, Token::Id, "edge")?),
        label: optional_label(map),
        source: NodeId(required_id(map, Token::Source, "edge")?),
        target: NodeId(required_id(map, Token::Target, "edge")?),
        properties: map.properties(),
    })
}

fn required_id(map: &ElementMap, token: Token, what: &str) -> Result<i64, RouteGraphError> {
    let value = map.lookup_token(token).ok_or_else(|| {
        RouteGraphError::invalid_input(format!("{what} element has no {}", token.name()))
    })?;
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| {
        RouteGraphError::invalid_input(format!(
            "{what} element has a non-integer {}: {value}",
            token.name()
        ))
    })
}

fn optional_label(map: &ElementMap) -> String {
    map.lookup_token(Token::Label)
        .map(value_to_display)
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn reserved_token(name: &str) -> Option<Token> {
    match name {
        "id" => Some(Token::Id),
        "label" => Some(Token::Label),
        "source" => Some(Token::Source),
        "target" => Some(Token::Target),
        _ => None,
    }
}

fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
