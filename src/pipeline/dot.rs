//! Graphviz DOT generation from a parsed [`DiagramGraph`].

use crate::pipeline::mermaid::{DiagramGraph, NodeShape};
use std::fmt::Write;

/// Graph-wide layout settings.
#[derive(Debug, Clone)]
pub struct DotStyle<'a> {
    pub font: &'a str,
    pub dpi: u32,
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn shape_attrs(shape: NodeShape) -> (&'static str, Option<&'static str>) {
    match shape {
        NodeShape::Rectangle => ("box", None),
        NodeShape::RoundedRectangle => ("box", Some("rounded")),
        NodeShape::Circle => ("circle", None),
        NodeShape::Rhombus => ("diamond", None),
        NodeShape::Hexagon => ("hexagon", None),
        NodeShape::PlainText => ("plaintext", None),
    }
}

/// Render `graph` as a DOT digraph named `title`.
pub fn to_dot(graph: &DiagramGraph, title: &str, style: &DotStyle<'_>) -> String {
    let mut dot = String::new();
    let font = quote(style.font);

    // Writing into a String cannot fail.
    let _ = writeln!(dot, "digraph {} {{", quote(title));
    let _ = writeln!(
        dot,
        "  graph [rankdir={}, dpi={}, nodesep=0.8, ranksep=1.0, fontname={font}, fontsize=14];",
        graph.direction.rankdir(),
        style.dpi,
    );
    let _ = writeln!(dot, "  node [fontname={font}, fontsize=14];");
    let _ = writeln!(dot, "  edge [fontname={font}, fontsize=12];");

    for node in graph.nodes() {
        let (shape, extra_style) = shape_attrs(node.shape);
        let mut styles: Vec<&str> = Vec::new();
        if node.fill.is_some() {
            styles.push("filled");
        }
        if let Some(extra) = extra_style {
            styles.push(extra);
        }
        let _ = write!(
            dot,
            "  {} [label={}, shape={shape}",
            quote(&node.id),
            quote(&node.label)
        );
        if !styles.is_empty() {
            let _ = write!(dot, ", style={}", quote(&styles.join(",")));
        }
        if let Some(fill) = &node.fill {
            let _ = write!(dot, ", fillcolor={}", quote(fill));
        }
        dot.push_str("];\n");
    }

    for edge in graph.edges() {
        let _ = write!(dot, "  {} -> {}", quote(&edge.source), quote(&edge.target));
        if let Some(label) = &edge.label {
            let _ = write!(dot, " [label={}]", quote(label));
        }
        dot.push_str(";\n");
    }

    dot.push_str("}\n");
    dot
}
