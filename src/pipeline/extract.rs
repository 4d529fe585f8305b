//! Artifact extraction: pull rich content out of the document text.
//!
//! Three source forms are recognised, in precedence order:
//!
//! 1. `<chat-artifact id=".." version=".." type=".." title="..">…</chat-artifact>`
//!    tagged blocks (attributes in any order, all four required).
//! 2. Fenced diagram blocks: a ```` ```mermaid ```` fence, or a bare fence
//!    whose body opens with a recognised diagram keyword.
//! 3. Vector graphics: ```` ```svg ```` fences holding a complete `<svg>`
//!    element, then bare `<svg …>…</svg>` spans outside other code fences.
//!
//! Each block is cut out and replaced by a standalone placeholder line,
//! `[artifact:<id>]`, surrounded by blank lines. Generated ids share one
//! counter that starts at the number of tagged blocks, so they never collide
//! with positions already taken.

use crate::artifact::{Artifact, ArtifactKind, ArtifactMap, MERMAID_TYPE, SVG_TYPE};
use crate::pipeline::mermaid::DiagramKind;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;
use tracing::debug;

static RE_TAGGED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<chat-artifact\b([^>]*)>([\s\S]*?)</chat-artifact>").unwrap());

static RE_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_][-A-Za-z0-9_]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
});

static RE_BARE_SVG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<svg[\s>][\s\S]*?</svg>").unwrap());

static RE_SVG_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<title[^>]*>([\s\S]*?)</title>").unwrap());

const DEFAULT_VERSION: &str = "1.0";

/// Document text with placeholders, plus the artifacts that were cut out.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub text: String,
    pub artifacts: ArtifactMap,
}

/// The placeholder block that stands in for an extracted artifact.
pub fn placeholder(id: &str) -> String {
    format!("\n\n[artifact:{id}]\n\n")
}

/// Extract every artifact from `markdown`. Pure; never fails.
pub fn extract_artifacts(markdown: &str) -> Extraction {
    let mut artifacts = ArtifactMap::new();

    // ── Pass 1: tagged blocks ────────────────────────────────────────────
    let text = extract_tagged(markdown, &mut artifacts);
    let mut counter = artifacts.len();

    // ── Pass 2: fenced diagrams ──────────────────────────────────────────
    let text = extract_fenced_diagrams(&text, &mut artifacts, &mut counter);

    // ── Pass 3: vector graphics ──────────────────────────────────────────
    let text = extract_fenced_svg(&text, &mut artifacts, &mut counter);
    let text = extract_bare_svg(&text, &mut artifacts, &mut counter);

    debug!(artifacts = artifacts.len(), "extraction complete");
    Extraction { text, artifacts }
}

fn extract_tagged(text: &str, artifacts: &mut ArtifactMap) -> String {
    RE_TAGGED
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let attrs = parse_attributes(&caps[1]);
            let get = |name: &str| {
                attrs
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v.clone())
            };
            match (get("id"), get("version"), get("type"), get("title")) {
                (Some(id), Some(version), Some(declared), Some(title)) => {
                    let kind = ArtifactKind::from_declared(&declared);
                    debug!(id = %id, kind = %kind, "tagged artifact");
                    let block = placeholder(&id);
                    artifacts.insert(Artifact {
                        id,
                        version,
                        kind,
                        title,
                        content: caps[2].trim().to_string(),
                    });
                    block
                }
                _ => {
                    debug!("tagged block missing required attributes; left in place");
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

fn parse_attributes(raw: &str) -> Vec<(String, String)> {
    RE_ATTR
        .captures_iter(raw)
        .map(|c| {
            let value = c.get(2).or_else(|| c.get(3)).map_or("", |m| m.as_str());
            (c[1].to_string(), value.to_string())
        })
        .collect()
}

fn extract_fenced_diagrams(text: &str, artifacts: &mut ArtifactMap, counter: &mut usize) -> String {
    let mut edits = Vec::new();
    for fence in scan_fences(text) {
        let body = fence.body.trim();
        if body.is_empty() {
            continue;
        }
        let kind = DiagramKind::detect(body);
        let accepted = match fence.info.as_str() {
            "mermaid" => true,
            "" => kind.is_known(),
            _ => false,
        };
        if !accepted {
            continue;
        }
        let (id, _) = next_id("inline_mermaid", artifacts, counter);
        edits.push((fence.range.clone(), placeholder(&id)));
        artifacts.insert(Artifact {
            id,
            version: DEFAULT_VERSION.to_string(),
            kind: ArtifactKind::from_declared(MERMAID_TYPE),
            title: kind.title().to_string(),
            content: body.to_string(),
        });
    }
    splice(text, edits)
}

fn extract_fenced_svg(text: &str, artifacts: &mut ArtifactMap, counter: &mut usize) -> String {
    let mut edits = Vec::new();
    for fence in scan_fences(text) {
        let body = fence.body.trim();
        if fence.info != "svg" || !body.starts_with("<svg") || !body.ends_with("</svg>") {
            continue;
        }
        let id = insert_svg(body, artifacts, counter);
        edits.push((fence.range.clone(), placeholder(&id)));
    }
    splice(text, edits)
}

fn extract_bare_svg(text: &str, artifacts: &mut ArtifactMap, counter: &mut usize) -> String {
    let fenced: Vec<Range<usize>> = scan_fences(text).into_iter().map(|f| f.range).collect();
    let mut edits = Vec::new();
    for m in RE_BARE_SVG.find_iter(text) {
        if fenced.iter().any(|r| r.start <= m.start() && m.start() < r.end) {
            continue;
        }
        let id = insert_svg(m.as_str(), artifacts, counter);
        edits.push((m.range(), placeholder(&id)));
    }
    splice(text, edits)
}

/// Next `<prefix>_<n>` id from the shared counter, skipping ids a tagged
/// block already claimed.
fn next_id(prefix: &str, artifacts: &ArtifactMap, counter: &mut usize) -> (String, usize) {
    loop {
        let n = *counter;
        *counter += 1;
        let id = format!("{prefix}_{n}");
        if !artifacts.contains(&id) {
            return (id, n);
        }
    }
}

fn insert_svg(markup: &str, artifacts: &mut ArtifactMap, counter: &mut usize) -> String {
    let (id, n) = next_id("inline_svg", artifacts, counter);
    let title = RE_SVG_TITLE
        .captures(markup)
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| format!("Inline SVG {}", n + 1));
    artifacts.insert(Artifact {
        id: id.clone(),
        version: DEFAULT_VERSION.to_string(),
        kind: ArtifactKind::from_declared(SVG_TYPE),
        title,
        content: markup.to_string(),
    });
    id
}

// ── Fence scanning ───────────────────────────────────────────────────────────

/// A closed backtick fence: the byte range it covers (opening line through
/// closing backticks) plus its info string and body.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fence {
    range: Range<usize>,
    info: String,
    body: String,
}

/// Find closed backtick fences line by line. Unclosed fences are ignored.
fn scan_fences(text: &str) -> Vec<Fence> {
    let mut fences = Vec::new();
    let mut open: Option<(usize, usize, String, usize)> = None; // start, ticks, info, body start
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let content = line.trim_end_matches(['\n', '\r']);
        let stripped = content.trim_start();
        let ticks = stripped.chars().take_while(|&c| c == '`').count();

        match open.take() {
            None => {
                if ticks >= 3 && content.len() - stripped.len() <= 3 {
                    let info = stripped[ticks..].trim().to_ascii_lowercase();
                    if !info.contains('`') {
                        open = Some((line_start, ticks, info, offset));
                        continue;
                    }
                }
            }
            Some((start, want, info, body_start)) => {
                if ticks >= want && stripped[ticks..].trim().is_empty() {
                    let end = line_start + (content.len() - stripped.len()) + ticks;
                    fences.push(Fence {
                        range: start..end,
                        info,
                        body: text[body_start..line_start].to_string(),
                    });
                } else {
                    open = Some((start, want, info, body_start));
                }
            }
        }
    }
    fences
}

/// Apply non-overlapping, ordered `(range, replacement)` edits.
fn splice(text: &str, edits: Vec<(Range<usize>, String)>) -> String {
    if edits.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (range, replacement) in edits {
        out.push_str(&text[cursor..range.start]);
        out.push_str(&replacement);
        cursor = range.end;
    }
    out.push_str(&text[cursor..]);
    out
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_document_unchanged() {
        let doc = "# Title\n\nJust text with `code` and $x^2$.\n\n```rust\nfn main() {}\n```\n";
        let out = extract_artifacts(doc);
        assert_eq!(out.text, doc);
        assert!(out.artifacts.is_empty());
    }

    #[test]
    fn tagged_block_extracted() {
        let doc = "Before\n<chat-artifact id=\"chart-1\" version=\"2\" type=\"image/svg+xml\" title=\"Sales\">\n<svg></svg>\n</chat-artifact>\nAfter";
        let out = extract_artifacts(doc);
        assert_eq!(out.text, "Before\n\n\n[artifact:chart-1]\n\n\nAfter");
        let a = out.artifacts.get("chart-1").expect("artifact");
        assert_eq!(a.version, "2");
        assert_eq!(a.kind, ArtifactKind::VectorImage);
        assert_eq!(a.title, "Sales");
        assert_eq!(a.content, "<svg></svg>");
    }

    #[test]
    fn tagged_attributes_any_order() {
        let doc = "<chat-artifact title='T' type=\"text/html\" id=\"h\" version=\"1\"><p>x</p></chat-artifact>";
        let out = extract_artifacts(doc);
        let a = out.artifacts.get("h").expect("artifact");
        assert_eq!(a.kind, ArtifactKind::Unsupported("text/html".into()));
        assert_eq!(a.title, "T");
    }

    #[test]
    fn tagged_missing_attribute_left_alone() {
        let doc = "<chat-artifact id=\"x\" type=\"image/svg+xml\" title=\"t\">body</chat-artifact>";
        let out = extract_artifacts(doc);
        assert!(out.artifacts.is_empty());
        assert_eq!(out.text, doc);
    }

    #[test]
    fn mermaid_counter_seeded_by_tagged_count() {
        let mut doc = String::new();
        for i in 0..3 {
            doc.push_str(&format!(
                "<chat-artifact id=\"t{i}\" version=\"1\" type=\"text/plain\" title=\"t\">x</chat-artifact>\n"
            ));
        }
        doc.push_str("\n```mermaid\ngraph TD\nA-->B\n```\n");
        let out = extract_artifacts(&doc);
        assert_eq!(out.artifacts.len(), 4);
        let d = out.artifacts.get("inline_mermaid_3").expect("diagram id");
        assert_eq!(d.kind, ArtifactKind::Diagram);
        assert_eq!(d.title, "Flowchart");
        assert_eq!(d.content, "graph TD\nA-->B");
        assert!(out.text.contains("\n\n[artifact:inline_mermaid_3]\n\n"));
    }

    #[test]
    fn diagram_titles_follow_keyword() {
        let doc = "```mermaid\nsequenceDiagram\nA->>B: hi\n```\n\n```\ngantt\ntitle x\n```\n\n```mermaid\njourney\n```";
        let out = extract_artifacts(doc);
        let titles: Vec<&str> = out.artifacts.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Sequence Diagram", "Gantt Chart", "Flowchart"]);
    }

    #[test]
    fn bare_fence_without_keyword_is_code() {
        let doc = "```\nA --> B\n```";
        let out = extract_artifacts(doc);
        assert!(out.artifacts.is_empty());
        assert_eq!(out.text, doc);
    }

    #[test]
    fn empty_mermaid_fence_left_alone() {
        let doc = "```mermaid\n\n```";
        let out = extract_artifacts(doc);
        assert!(out.artifacts.is_empty());
        assert_eq!(out.text, doc);
    }

    #[test]
    fn fenced_svg_requires_complete_element() {
        let good = "```svg\n<svg width=\"10\"><title>Dot</title></svg>\n```";
        let out = extract_artifacts(good);
        let a = out.artifacts.get("inline_svg_0").expect("svg");
        assert_eq!(a.title, "Dot");
        assert_eq!(out.text, placeholder("inline_svg_0"));

        let bad = "```svg\n<rect/>\n```";
        let out = extract_artifacts(bad);
        assert!(out.artifacts.is_empty());
        assert_eq!(out.text, bad);
    }

    #[test]
    fn bare_svg_gets_default_title_and_shared_counter() {
        let doc = "```mermaid\ngraph LR\nA-->B\n```\n\ntext <svg viewBox=\"0 0 1 1\"><rect/></svg> more";
        let out = extract_artifacts(doc);
        let ids: Vec<&str> = out.artifacts.ids().collect();
        assert_eq!(ids, vec!["inline_mermaid_0", "inline_svg_1"]);
        let svg = out.artifacts.get("inline_svg_1").expect("svg");
        assert_eq!(svg.title, "Inline SVG 2");
        assert!(svg.content.starts_with("<svg viewBox"));
    }

    #[test]
    fn svg_inside_other_fence_is_kept() {
        let doc = "```html\n<svg><rect/></svg>\n```";
        let out = extract_artifacts(doc);
        assert!(out.artifacts.is_empty());
        assert_eq!(out.text, doc);
    }

    #[test]
    fn generated_ids_skip_tagged_ids() {
        let doc = "<chat-artifact id=\"inline_svg_1\" version=\"1\" type=\"application/vnd.chat.mermaid\" title=\"Flow\">graph TD\nA-->B</chat-artifact>\n\n\
                   <chat-artifact id=\"inline_mermaid_2\" version=\"1\" type=\"text/plain\" title=\"Note\">x</chat-artifact>\n\n\
                   ```mermaid\ngraph LR\nC-->D\n```\n\n<svg><rect/></svg>";
        let out = extract_artifacts(doc);
        let ids: Vec<&str> = out.artifacts.ids().collect();
        assert_eq!(
            ids,
            vec!["inline_svg_1", "inline_mermaid_2", "inline_mermaid_3", "inline_svg_4"]
        );
        let tagged = out.artifacts.get("inline_svg_1").expect("tagged");
        assert_eq!(tagged.kind, ArtifactKind::Diagram);
        assert_eq!(tagged.title, "Flow");
        for id in &ids {
            assert_eq!(out.text.matches(&format!("[artifact:{id}]")).count(), 1);
        }
    }

    #[test]
    fn duplicate_tagged_id_overwrites() {
        let doc = "<chat-artifact id=\"a\" version=\"1\" type=\"image/svg+xml\" title=\"one\"><svg></svg></chat-artifact>\n\
                   <chat-artifact id=\"a\" version=\"2\" type=\"image/svg+xml\" title=\"two\"><svg></svg></chat-artifact>";
        let out = extract_artifacts(doc);
        assert_eq!(out.artifacts.len(), 1);
        assert_eq!(out.artifacts.get("a").map(|a| a.title.as_str()), Some("two"));
        assert_eq!(out.text.matches("[artifact:a]").count(), 2);
    }

    #[test]
    fn scan_fences_ignores_unclosed() {
        let fences = scan_fences("```rust\nfn x() {}\n");
        assert!(fences.is_empty());
        let fences = scan_fences("````\n```\ninner\n```\n````\n");
        assert_eq!(fences.len(), 1);
        assert_eq!(fences[0].body, "```\ninner\n```\n");
    }
}
