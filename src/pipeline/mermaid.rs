//! Mermaid diagram text → [`DiagramGraph`].
//!
//! Only the practical flowchart subset is understood: six node shapes,
//! directed edges with optional `|label|`, and `style` fill overrides.
//! Everything else is skipped silently so a richer diagram still yields a
//! usable (if partial) graph.
//!
//! ## Tokenising
//!
//! Every body line is first classified by [`classify`] into one
//! [`LineKind`]. Node text is then matched against [`SHAPE_TABLE`], an
//! ordered list of patterns where the first match wins:
//!
//! | # | Syntax      | Shape              | Default fill  |
//! |---|-------------|--------------------|---------------|
//! | 1 | `id[..]`    | rectangle          | `lightblue`   |
//! | 2 | `id([..])`  | rounded rectangle  | `lightgreen`  |
//! | 3 | `id((..))`  | circle             | `lightblue`   |
//! | 4 | `id{..}`    | rhombus            | `lightyellow` |
//! | 5 | `id{{..}}`  | hexagon            | `lightpink`   |
//! | 6 | `id`        | plain text         | none          |
//!
//! Parsing runs three passes over the body: nodes, then edges (which
//! synthesize any endpoint not declared yet), then style overrides.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

// ── Diagram kind ─────────────────────────────────────────────────────────────

/// The diagram family named by the declaration line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagramKind {
    Flowchart,
    Sequence,
    Class,
    State,
    EntityRelationship,
    Gantt,
    Pie,
    Unknown,
}

impl DiagramKind {
    /// Classify diagram text by its first significant line.
    pub fn detect(source: &str) -> Self {
        match declaration_line(source) {
            Some(line) => Self::from_keyword(first_word(line)),
            None => DiagramKind::Unknown,
        }
    }

    fn from_keyword(word: &str) -> Self {
        let word = word.to_ascii_lowercase();
        if word == "flowchart" || word == "graph" {
            DiagramKind::Flowchart
        } else if word.starts_with("sequencediagram") {
            DiagramKind::Sequence
        } else if word.starts_with("classdiagram") {
            DiagramKind::Class
        } else if word.starts_with("statediagram") {
            DiagramKind::State
        } else if word.starts_with("erdiagram") {
            DiagramKind::EntityRelationship
        } else if word == "gantt" {
            DiagramKind::Gantt
        } else if word == "pie" {
            DiagramKind::Pie
        } else {
            DiagramKind::Unknown
        }
    }

    /// Caption used when the diagram carries no explicit title.
    ///
    /// Unknown declarations fall back to the flowchart caption.
    pub fn title(self) -> &'static str {
        match self {
            DiagramKind::Flowchart | DiagramKind::Unknown => "Flowchart",
            DiagramKind::Sequence => "Sequence Diagram",
            DiagramKind::Class => "Class Diagram",
            DiagramKind::State => "State Diagram",
            DiagramKind::EntityRelationship => "ER Diagram",
            DiagramKind::Gantt => "Gantt Chart",
            DiagramKind::Pie => "Pie Chart",
        }
    }

    /// Whether the declaration is a recognised keyword.
    pub fn is_known(self) -> bool {
        self != DiagramKind::Unknown
    }

    /// Only flowcharts are parsed into a [`DiagramGraph`].
    pub fn is_flowchart(self) -> bool {
        self == DiagramKind::Flowchart
    }
}

// ── Graph model ──────────────────────────────────────────────────────────────

/// Layout direction from the declaration line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    TopBottom,
    BottomTop,
    LeftRight,
    RightLeft,
}

impl Direction {
    fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "TB" | "TD" => Some(Direction::TopBottom),
            "BT" => Some(Direction::BottomTop),
            "LR" => Some(Direction::LeftRight),
            "RL" => Some(Direction::RightLeft),
            _ => None,
        }
    }

    /// Graphviz `rankdir` value.
    pub fn rankdir(self) -> &'static str {
        match self {
            Direction::TopBottom => "TB",
            Direction::BottomTop => "BT",
            Direction::LeftRight => "LR",
            Direction::RightLeft => "RL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeShape {
    Rectangle,
    RoundedRectangle,
    Circle,
    Rhombus,
    Hexagon,
    PlainText,
}

impl NodeShape {
    /// Fill assigned when a node is first declared with this shape.
    pub fn default_fill(self) -> Option<&'static str> {
        match self {
            NodeShape::Rectangle | NodeShape::Circle => Some("lightblue"),
            NodeShape::RoundedRectangle => Some("lightgreen"),
            NodeShape::Rhombus => Some("lightyellow"),
            NodeShape::Hexagon => Some("lightpink"),
            NodeShape::PlainText => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramNode {
    pub id: String,
    pub label: String,
    pub shape: NodeShape,
    /// `None` means unfilled.
    pub fill: Option<String>,
}

impl DiagramNode {
    fn styled(id: &str, label: String, shape: NodeShape) -> Self {
        Self {
            id: id.to_string(),
            label,
            shape,
            fill: shape.default_fill().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramEdge {
    pub source: String,
    pub target: String,
    pub label: Option<String>,
}

/// Directed graph of styled nodes and labelled edges.
///
/// Nodes keep declaration order; every edge endpoint is present in the node
/// set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiagramGraph {
    pub direction: Direction,
    nodes: Vec<DiagramNode>,
    index: HashMap<String, usize>,
    edges: Vec<DiagramEdge>,
}

impl DiagramGraph {
    pub fn node(&self, id: &str) -> Option<&DiagramNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn nodes(&self) -> &[DiagramNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[DiagramEdge] {
        &self.edges
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn upsert(&mut self, node: DiagramNode) {
        match self.index.get(&node.id) {
            Some(&i) => self.nodes[i] = node,
            None => {
                self.index.insert(node.id.clone(), self.nodes.len());
                self.nodes.push(node);
            }
        }
    }

    fn node_mut(&mut self, id: &str) -> Option<&mut DiagramNode> {
        match self.index.get(id) {
            Some(&i) => Some(&mut self.nodes[i]),
            None => None,
        }
    }
}

// ── Tokeniser ────────────────────────────────────────────────────────────────

struct ShapePattern {
    shape: NodeShape,
    regex: Regex,
}

/// Ordered node-shape patterns; the first match wins.
static SHAPE_TABLE: Lazy<Vec<ShapePattern>> = Lazy::new(|| {
    [
        (NodeShape::Rectangle, r"^\s*(\w+)\s*\[\s*([^\]]+?)\s*\]"),
        (
            NodeShape::RoundedRectangle,
            r"^\s*(\w+)\s*\(\s*\[\s*([^\]]+?)\s*\]\s*\)",
        ),
        (NodeShape::Circle, r"^\s*(\w+)\s*\(\(\s*([^)]+?)\s*\)\)"),
        (NodeShape::Rhombus, r"^\s*(\w+)\s*\{\s*([^{}]+?)\s*\}"),
        (NodeShape::Hexagon, r"^\s*(\w+)\s*\{\{\s*([^{}]+?)\s*\}\}"),
        (NodeShape::PlainText, r"^\s*(\w+)"),
    ]
    .into_iter()
    .map(|(shape, pattern)| ShapePattern {
        shape,
        regex: Regex::new(pattern).unwrap(),
    })
    .collect()
});

static RE_EDGE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"-\.->|==>|-->").unwrap());

static RE_LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());

static RE_FILL: Lazy<Regex> = Lazy::new(|| Regex::new(r"fill\s*:\s*([^,;\s]+)").unwrap());

const DIRECTIVES: &[&str] = &[
    "subgraph",
    "end",
    "classDef",
    "class",
    "linkStyle",
    "click",
    "direction",
    "accTitle",
    "accDescr",
    "title",
];

/// One classified body line.
#[derive(Debug, PartialEq, Eq)]
enum LineKind<'a> {
    Blank,
    Comment,
    Directive,
    Style { id: &'a str, body: &'a str },
    Edge(Vec<&'a str>),
    Node(&'a str),
}

fn classify(line: &str) -> LineKind<'_> {
    let line = line.trim().trim_end_matches(';').trim_end();
    if line.is_empty() {
        return LineKind::Blank;
    }
    if line.starts_with("%%") {
        return LineKind::Comment;
    }
    if let Some(rest) = line.strip_prefix("style ") {
        let rest = rest.trim_start();
        let (id, body) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        return LineKind::Style {
            id,
            body: body.trim(),
        };
    }
    if DIRECTIVES.contains(&first_word(line)) {
        return LineKind::Directive;
    }
    if RE_EDGE_TOKEN.is_match(line) {
        return LineKind::Edge(RE_EDGE_TOKEN.split(line).collect());
    }
    LineKind::Node(line)
}

/// A node reference as written in the source: id, optional label, shape.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NodeToken {
    id: String,
    label: Option<String>,
    shape: NodeShape,
    /// Byte offset just past the node reference.
    end: usize,
}

fn match_shape(text: &str) -> Option<NodeToken> {
    SHAPE_TABLE.iter().find_map(|pattern| {
        pattern.regex.captures(text).map(|caps| NodeToken {
            id: caps[1].to_string(),
            label: caps.get(2).map(|m| clean_label(m.as_str())),
            shape: pattern.shape,
            end: caps[0].len(),
        })
    })
}

fn clean_label(raw: &str) -> String {
    let unquoted = raw.trim().trim_matches(|c| c == '"' || c == '\'');
    RE_LINE_BREAK.replace_all(unquoted, "\n").trim().to_string()
}

fn first_word(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or("")
}

fn declaration_line(source: &str) -> Option<&str> {
    source
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("%%"))
}

// ── Parser ───────────────────────────────────────────────────────────────────

/// Parse flowchart text into a [`DiagramGraph`]. Never fails; unmatched lines
/// are skipped.
pub fn parse(source: &str) -> DiagramGraph {
    let mut graph = DiagramGraph::default();
    let mut lines: Vec<&str> = source.lines().collect();

    // Drop the declaration (and anything before it) when there is one.
    if let Some(pos) = lines
        .iter()
        .position(|l| !l.trim().is_empty() && !l.trim().starts_with("%%"))
    {
        let declaration = lines[pos].trim();
        if DiagramKind::from_keyword(first_word(declaration)).is_known() {
            graph.direction = declaration
                .split_whitespace()
                .skip(1)
                .find_map(Direction::from_token)
                .unwrap_or_default();
            lines.drain(..=pos);
        }
    }

    let classified: Vec<LineKind<'_>> = lines.iter().map(|l| classify(l)).collect();

    // Pass 1: node declarations.
    for kind in &classified {
        let LineKind::Node(text) = kind else { continue };
        let Some(token) = match_shape(text) else {
            continue;
        };
        match token.label {
            Some(label) => graph.upsert(DiagramNode::styled(&token.id, label, token.shape)),
            None if !graph.contains(&token.id) => {
                graph.upsert(DiagramNode::styled(&token.id, token.id.clone(), token.shape))
            }
            None => {}
        }
    }

    // Pass 2: edges, synthesising undeclared endpoints.
    for kind in &classified {
        let LineKind::Edge(segments) = kind else {
            continue;
        };
        let mut previous: Option<String> = None;
        let mut pending_label: Option<String> = None;
        for segment in segments {
            let (piped_label, endpoint) = split_edge_label(segment);
            let Some(token) = match_shape(endpoint) else {
                previous = None;
                pending_label = None;
                continue;
            };
            let label = piped_label.or(pending_label.take());
            pending_label = inline_label(&endpoint[token.end..]);
            if !graph.contains(&token.id) {
                let label = token.label.clone().unwrap_or_else(|| token.id.clone());
                debug!(node = %token.id, "synthesising node from edge endpoint");
                graph.upsert(DiagramNode::styled(&token.id, label, token.shape));
            }
            if let Some(source) = previous.take() {
                graph.edges.push(DiagramEdge {
                    source,
                    target: token.id.clone(),
                    label,
                });
            }
            previous = Some(token.id);
        }
    }

    // Pass 3: style overrides on known nodes.
    for kind in &classified {
        let LineKind::Style { id, body } = kind else {
            continue;
        };
        let Some(fill) = RE_FILL.captures(body).map(|c| c[1].to_string()) else {
            continue;
        };
        if let Some(node) = graph.node_mut(id) {
            node.fill = Some(fill);
        }
    }

    debug!(
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        direction = graph.direction.rankdir(),
        "parsed diagram graph"
    );
    graph
}

/// Split a leading `|label|` off an edge segment.
fn split_edge_label(segment: &str) -> (Option<String>, &str) {
    let trimmed = segment.trim();
    if let Some(rest) = trimmed.strip_prefix('|') {
        if let Some((label, endpoint)) = rest.split_once('|') {
            let label = clean_label(label);
            let label = (!label.is_empty()).then_some(label);
            return (label, endpoint.trim());
        }
    }
    (None, trimmed)
}

/// A `-- label` or `== label` trailing a node reference, as in
/// `A -- yes --> B`. Applies to the edge leaving that node.
fn inline_label(rest: &str) -> Option<String> {
    let rest = rest.trim();
    let label = rest
        .strip_prefix("--")
        .or_else(|| rest.strip_prefix("=="))?;
    let label = clean_label(label);
    (!label.is_empty()).then_some(label)
}

/// Rewrite a legacy `graph` declaration to `flowchart` for tools that only
/// accept the newer keyword.
pub fn normalise_declaration(source: &str) -> String {
    let trimmed = source.trim_start();
    match trimmed.strip_prefix("graph ") {
        Some(rest) => format!("flowchart {rest}"),
        None => trimmed.to_string(),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
