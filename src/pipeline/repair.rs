//! Heuristic repair of malformed SVG markup before rasterising.
//!
//! Generated SVG often carries mistakes that make renderers reject or
//! mangle it: `<line>` tags with a duplicated coordinate where the end point
//! should be, TeX notation inside `<text>`, stray solid bars left over from
//! a broken layout, charts whose axes disappeared. Each problem is one
//! [`RepairRule`]; [`SvgRepairer`] runs them in order and finally consults a
//! [`FallbackTable`] of hand-authored replacements.
//!
//! ## Rule Order
//!
//! 1. [`LineAttributes`]: fix duplicated and missing `<line>` coordinates
//! 2. [`MathNotation`]: translate `$…$` spans inside `<text>` elements
//! 3. [`StrayShapes`]: drop wide, thin, solid-black rectangles
//! 4. [`AxisPresence`]: add two default axes when no `<line>` remains
//!
//! Line repair runs before axis detection so a repaired line counts as an
//! axis. No rule fails; a rule that cannot help returns its input.

use crate::pipeline::math::{tspans_balanced, MathTranslator, TokenTable, EXPRESSION_SPAN};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// One independent, idempotent markup transformation.
pub trait RepairRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap pre-check; `apply` is skipped when this returns false.
    fn applies(&self, svg: &str) -> bool;

    fn apply(&self, svg: &str) -> String;
}

/// Outcome of [`SvgRepairer::repair`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repair {
    pub markup: String,
    /// Rules that changed the markup, in application order.
    pub applied: Vec<&'static str>,
    /// Caption of the curated document used instead, if any.
    pub replaced_by: Option<String>,
}

impl Repair {
    pub fn changed(&self) -> bool {
        !self.applied.is_empty() || self.replaced_by.is_some()
    }
}

/// Runs the rule list, then the curated-fallback check.
pub struct SvgRepairer {
    rules: Vec<Box<dyn RepairRule>>,
    stray: StrayShapes,
    fallbacks: FallbackTable,
}

impl Default for SvgRepairer {
    fn default() -> Self {
        Self::new(FallbackTable::builtin())
    }
}

impl SvgRepairer {
    /// Default rule list with the given fallback table.
    pub fn new(fallbacks: FallbackTable) -> Self {
        let stray = StrayShapes::default();
        Self {
            rules: vec![
                Box::new(LineAttributes),
                Box::new(MathNotation::default()),
                Box::new(stray.clone()),
                Box::new(AxisPresence),
            ],
            stray,
            fallbacks,
        }
    }

    /// Custom rule list. `stray` decides whether a curated replacement is
    /// still needed after the rules ran.
    pub fn with_rules(
        rules: Vec<Box<dyn RepairRule>>,
        stray: StrayShapes,
        fallbacks: FallbackTable,
    ) -> Self {
        Self {
            rules,
            stray,
            fallbacks,
        }
    }

    pub fn repair(&self, svg: &str) -> Repair {
        let mut markup = svg.to_string();
        let mut applied = Vec::new();

        for rule in &self.rules {
            if !rule.applies(&markup) {
                continue;
            }
            let next = rule.apply(&markup);
            if next != markup {
                debug!(rule = rule.name(), "repair rule changed markup");
                applied.push(rule.name());
                markup = next;
            }
        }

        if let Some(entry) = self.fallbacks.find(svg) {
            let remaining = self.stray.remaining(&markup);
            if remaining > 0 {
                info!(
                    caption = %entry.caption,
                    remaining,
                    "stray shapes survived repair, using curated replacement"
                );
                return Repair {
                    markup: entry.markup.clone(),
                    applied,
                    replaced_by: Some(entry.caption.clone()),
                };
            }
        }

        Repair {
            markup,
            applied,
            replaced_by: None,
        }
    }
}

// ── Attribute helpers ────────────────────────────────────────────────────────

static RE_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
});

fn attributes(raw: &str) -> Vec<(String, String)> {
    RE_ATTR
        .captures_iter(raw)
        .map(|c| {
            let value = c.get(2).or_else(|| c.get(3)).map_or("", |m| m.as_str());
            (c[1].to_string(), value.to_string())
        })
        .collect()
}

fn attribute<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
}

fn number(value: &str) -> Option<f64> {
    value.trim().trim_end_matches("px").trim().parse().ok()
}

// ── Rule 1: Line attributes ──────────────────────────────────────────────────

static RE_LINE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<line\b([^>]*?)(/?)>").unwrap());

/// Default end coordinate for a vertical line that lost its `y2`.
const VERTICAL_LINE_END: &str = "50";

pub struct LineAttributes;

impl RepairRule for LineAttributes {
    fn name(&self) -> &'static str {
        "line-attributes"
    }

    fn applies(&self, svg: &str) -> bool {
        svg.contains("<line")
    }

    fn apply(&self, svg: &str) -> String {
        RE_LINE_TAG
            .replace_all(svg, |caps: &regex::Captures<'_>| {
                match fix_line(attributes(&caps[1])) {
                    Some(fixed) => {
                        let mut tag = String::from("<line");
                        for (name, value) in fixed {
                            tag.push_str(&format!(" {name}=\"{}\"", value.replace('"', "&quot;")));
                        }
                        tag.push_str(if caps[2].is_empty() { ">" } else { "/>" });
                        tag
                    }
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

fn is_coordinate(name: &str) -> bool {
    matches!(name, "x1" | "y1" | "x2" | "y2")
}

/// Returns the corrected attribute list, or `None` when nothing changed.
fn fix_line(attrs: Vec<(String, String)>) -> Option<Vec<(String, String)>> {
    let mut out: Vec<(String, String)> = Vec::with_capacity(attrs.len() + 2);
    let mut changed = false;

    for (name, value) in attrs {
        let seen = out.iter().any(|(n, _)| *n == name);
        if is_coordinate(&name) && seen {
            changed = true;
            // A repeated start coordinate was meant to be the end point.
            let end = match name.as_str() {
                "x1" => "x2",
                "y1" => "y2",
                _ => continue,
            };
            if attribute(&out, end).is_none() {
                out.push((end.to_string(), value));
            }
            continue;
        }
        out.push((name, value));
    }

    let (Some(x1), Some(y1)) = (
        attribute(&out, "x1").map(str::to_string),
        attribute(&out, "y1").map(str::to_string),
    ) else {
        return changed.then_some(out);
    };

    let x2 = match attribute(&out, "x2") {
        Some(x2) => x2.to_string(),
        None => {
            changed = true;
            out.push(("x2".into(), x1.clone()));
            x1.clone()
        }
    };

    if attribute(&out, "y2").is_none() {
        changed = true;
        let vertical = match (number(&x1), number(&x2)) {
            (Some(a), Some(b)) => a == b,
            _ => x1 == x2,
        };
        let y2 = if vertical {
            VERTICAL_LINE_END.to_string()
        } else {
            y1
        };
        out.push(("y2".into(), y2));
    }

    changed.then_some(out)
}

// ── Rule 2: Math notation ────────────────────────────────────────────────────

static RE_TEXT_ELEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(<text\b[^>]*>)(.*?)(</text>)").unwrap());

static RE_MATH_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\$([^$]+)\$\$|\$([^$]+)\$").unwrap());

pub struct MathNotation {
    translator: Arc<dyn MathTranslator>,
}

impl Default for MathNotation {
    fn default() -> Self {
        Self::new(Arc::new(TokenTable))
    }
}

impl MathNotation {
    pub fn new(translator: Arc<dyn MathTranslator>) -> Self {
        Self { translator }
    }

    fn translate_content(&self, content: &str) -> String {
        RE_MATH_SPAN
            .replace_all(content, |caps: &regex::Captures<'_>| {
                let Some(inner) = caps.get(1).or_else(|| caps.get(2)) else {
                    return caps[0].to_string();
                };
                if inner.as_str().contains('<') {
                    return caps[0].to_string();
                }
                format!(
                    "{EXPRESSION_SPAN}{}</tspan>",
                    self.translator.translate(inner.as_str())
                )
            })
            .into_owned()
    }
}

impl RepairRule for MathNotation {
    fn name(&self) -> &'static str {
        "math-notation"
    }

    fn applies(&self, svg: &str) -> bool {
        svg.contains('$') && svg.contains("<text")
    }

    fn apply(&self, svg: &str) -> String {
        RE_TEXT_ELEMENT
            .replace_all(svg, |caps: &regex::Captures<'_>| {
                let content = &caps[2];
                if !RE_MATH_SPAN.is_match(content) {
                    return caps[0].to_string();
                }
                let translated = self.translate_content(content);
                if !tspans_balanced(&translated) {
                    debug!("math translation unbalanced markup, reverting element");
                    return caps[0].to_string();
                }
                format!("{}{}{}", &caps[1], translated, &caps[3])
            })
            .into_owned()
    }
}

// ── Rule 3: Stray shapes ─────────────────────────────────────────────────────

static RE_RECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"<rect\b[^>]*?/?>").unwrap());
static RE_STYLE_FILL: Lazy<Regex> = Lazy::new(|| Regex::new(r"fill\s*:\s*([^;]+)").unwrap());

/// Marker left where a stray shape was removed.
pub const STRAY_MARKER: &str = "<!-- stray shape removed -->";

/// Wide, thin, filled rectangles that a broken layout leaves across a chart.
#[derive(Debug, Clone)]
pub struct StrayShapes {
    /// Width must exceed `aspect_ratio × height`.
    pub aspect_ratio: f64,
    /// Height must be below this.
    pub max_height: f64,
    /// Normalised fill values treated as stray (lower case, no spaces).
    pub fills: Vec<String>,
}

impl Default for StrayShapes {
    fn default() -> Self {
        Self {
            aspect_ratio: 5.0,
            max_height: 40.0,
            fills: ["black", "#000", "#000000", "rgb(0,0,0)"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl StrayShapes {
    fn has_stray_fill(&self, attrs: &[(String, String)]) -> bool {
        let style_fill = attribute(attrs, "style")
            .and_then(|s| RE_STYLE_FILL.captures(s))
            .map(|c| c[1].to_string());
        let fill = style_fill.or_else(|| attribute(attrs, "fill").map(str::to_string));
        match fill {
            Some(fill) => {
                let normalised: String = fill
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect::<String>()
                    .to_ascii_lowercase();
                self.fills.iter().any(|f| *f == normalised)
            }
            None => false,
        }
    }

    fn is_stray(&self, attrs: &[(String, String)]) -> bool {
        if !self.has_stray_fill(attrs) {
            return false;
        }
        let width = attribute(attrs, "width").and_then(number);
        let height = attribute(attrs, "height").and_then(number);
        match (width, height) {
            (Some(w), Some(h)) => w > self.aspect_ratio * h && h < self.max_height,
            _ => false,
        }
    }

    /// Count rectangles still carrying a stray fill, whatever their size.
    pub fn remaining(&self, svg: &str) -> usize {
        RE_RECT
            .find_iter(svg)
            .filter(|m| self.has_stray_fill(&attributes(m.as_str())))
            .count()
    }
}

impl RepairRule for StrayShapes {
    fn name(&self) -> &'static str {
        "stray-shapes"
    }

    fn applies(&self, svg: &str) -> bool {
        svg.contains("<rect")
    }

    fn apply(&self, svg: &str) -> String {
        RE_RECT
            .replace_all(svg, |caps: &regex::Captures<'_>| {
                if self.is_stray(&attributes(&caps[0])) {
                    STRAY_MARKER.to_string()
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned()
    }
}

// ── Rule 4: Axis presence ────────────────────────────────────────────────────

static RE_ANY_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<line\b").unwrap());

const DEFAULT_AXES: &str = concat!(
    r#"<line x1="50" y1="320" x2="650" y2="320" stroke="rgba(0,0,0,0.8)" stroke-width="2"/>"#,
    "\n",
    r#"<line x1="50" y1="50" x2="50" y2="320" stroke="rgba(0,0,0,0.8)" stroke-width="2"/>"#,
    "\n",
);

pub struct AxisPresence;

impl RepairRule for AxisPresence {
    fn name(&self) -> &'static str {
        "axis-presence"
    }

    fn applies(&self, svg: &str) -> bool {
        !RE_ANY_LINE.is_match(svg)
    }

    fn apply(&self, svg: &str) -> String {
        match svg.rfind("</svg>") {
            Some(pos) => format!("{}{}{}", &svg[..pos], DEFAULT_AXES, &svg[pos..]),
            None => svg.to_string(),
        }
    }
}

// ── Curated fallbacks ────────────────────────────────────────────────────────

/// A hand-authored replacement keyed by a caption substring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackEntry {
    pub caption: String,
    pub markup: String,
}

/// Curated replacement documents, consulted when repair could not clear
/// every stray shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackTable {
    entries: Vec<FallbackEntry>,
}

impl FallbackTable {
    /// The two curated chart documents shipped with the crate.
    pub fn builtin() -> Self {
        Self::default()
            .with_entry(
                "Cp参数与球间距离的理论关系",
                include_str!("../../assets/fallbacks/cp-vs-distance.svg"),
            )
            .with_entry(
                "近场耦合区域Cp参数行为",
                include_str!("../../assets/fallbacks/near-field-cp.svg"),
            )
    }

    pub fn with_entry(mut self, caption: impl Into<String>, markup: impl Into<String>) -> Self {
        self.entries.push(FallbackEntry {
            caption: caption.into(),
            markup: markup.into(),
        });
        self
    }

    /// First entry whose caption occurs in `svg`.
    pub fn find(&self, svg: &str) -> Option<&FallbackEntry> {
        self.entries.iter().find(|e| svg.contains(&e.caption))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn line_coords(svg: &str) -> Vec<(String, String, String, String)> {
        RE_LINE_TAG
            .captures_iter(svg)
            .map(|c| {
                let a = attributes(&c[1]);
                let get = |n: &str| attribute(&a, n).unwrap_or("").to_string();
                (get("x1"), get("y1"), get("x2"), get("y2"))
            })
            .collect()
    }

    #[test]
    fn missing_end_y_on_horizontal_line() {
        let svg = r#"<svg><line x1="50" y1="320" x2="650" stroke="black"/></svg>"#;
        let out = LineAttributes.apply(svg);
        assert_eq!(
            line_coords(&out),
            vec![("50".into(), "320".into(), "650".into(), "320".into())]
        );
        assert!(out.contains(r#"stroke="black""#));
    }

    #[test]
    fn missing_end_y_on_vertical_line() {
        let svg = r#"<svg><line x1="50" y1="320" x2="50"/></svg>"#;
        let out = LineAttributes.apply(svg);
        assert_eq!(
            line_coords(&out),
            vec![("50".into(), "320".into(), "50".into(), "50".into())]
        );
    }

    #[test]
    fn repeated_start_y_becomes_end_y() {
        let svg = r#"<line x1="10" y1="20" x2="30" y1="40" x2="50"/>"#;
        let out = LineAttributes.apply(svg);
        assert_eq!(
            line_coords(&out),
            vec![("10".into(), "20".into(), "30".into(), "40".into())]
        );
    }

    #[test]
    fn repeated_end_x_is_dropped() {
        let svg = r#"<line x1="10" y1="20" x2="30" x2="30" y2="60"/>"#;
        let out = LineAttributes.apply(svg);
        assert_eq!(out, r#"<line x1="10" y1="20" x2="30" y2="60"/>"#);
    }

    #[test]
    fn complete_line_is_untouched() {
        let svg = r#"<line   x1='1' y1="2" x2="3" y2="4" >"#;
        assert_eq!(LineAttributes.apply(svg), svg);
    }

    #[test]
    fn math_in_text_translated() {
        let svg = r#"<svg><text x="1">Angle $\theta^2$ here</text></svg>"#;
        let out = MathNotation::default().apply(svg);
        assert!(out.contains(EXPRESSION_SPAN));
        assert!(out.contains('θ'));
        assert!(!out.contains('$'));
        assert!(out.starts_with(r#"<svg><text x="1">Angle "#));
    }

    #[test]
    fn math_with_markup_left_alone() {
        let svg = r#"<text>$a<tspan>b</tspan>$</text>"#;
        assert_eq!(MathNotation::default().apply(svg), svg);
    }

    struct Unbalanced;
    impl MathTranslator for Unbalanced {
        fn translate(&self, _: &str) -> String {
            "<tspan>".into()
        }
    }

    #[test]
    fn unbalanced_translation_reverts() {
        let svg = r#"<text>$x$</text>"#;
        let rule = MathNotation::new(Arc::new(Unbalanced));
        assert_eq!(rule.apply(svg), svg);
    }

    #[test]
    fn stray_black_bar_removed() {
        let svg = r##"<svg><rect x="0" y="0" width="600" height="12" fill="#000"/><rect width="100" height="50" fill="black"/><rect width="600" height="10" fill="blue"/></svg>"##;
        let out = StrayShapes::default().apply(svg);
        assert_eq!(out.matches(STRAY_MARKER).count(), 1);
        assert!(out.contains(r#"height="50""#));
        assert!(out.contains(r#"fill="blue""#));
    }

    #[test]
    fn stray_fill_from_style_attribute() {
        let svg = r#"<rect width="300" height="5" style="stroke:none; fill: rgb(0, 0, 0)"/>"#;
        assert_eq!(StrayShapes::default().apply(svg), STRAY_MARKER);
    }

    #[test]
    fn axes_added_when_no_line() {
        let svg = "<svg><circle r=\"3\"/></svg>";
        let out = AxisPresence.apply(svg);
        assert_eq!(out.matches("<line").count(), 2);
        assert!(out.ends_with("</svg>"));
        assert!(!AxisPresence.applies(&out));
    }

    #[test]
    fn repair_is_idempotent_on_wellformed_markup() {
        let svg = r#"<svg width="100" height="100"><line x1="0" y1="0" x2="10" y2="10"/><text>plain</text></svg>"#;
        let repairer = SvgRepairer::default();
        let once = repairer.repair(svg);
        assert!(!once.changed());
        assert_eq!(once.markup, svg);
        let twice = repairer.repair(&once.markup);
        assert_eq!(twice.markup, once.markup);
    }

    #[test]
    fn repair_twice_equals_once_for_fixable_markup() {
        let svg = r#"<svg><line x1="5" y1="5" x2="50"/><text>$\alpha$</text><rect width="500" height="3" fill="black"/></svg>"#;
        let repairer = SvgRepairer::default();
        let once = repairer.repair(svg);
        assert_eq!(
            once.applied,
            vec!["line-attributes", "math-notation", "stray-shapes"]
        );
        let twice = repairer.repair(&once.markup);
        assert_eq!(twice.markup, once.markup);
    }

    #[test]
    fn curated_replacement_when_stray_fill_remains() {
        let caption = "Cp参数与球间距离的理论关系";
        let svg = format!(
            r#"<svg><text>{caption}</text><line x1="0" y1="0" x2="1" y2="1"/><rect width="50" height="50" fill="black"/></svg>"#
        );
        let out = SvgRepairer::default().repair(&svg);
        assert_eq!(out.replaced_by.as_deref(), Some(caption));
        assert!(out.markup.contains(r#"width="700""#));
        assert_eq!(StrayShapes::default().remaining(&out.markup), 0);
    }

    #[test]
    fn no_curated_replacement_when_clean() {
        let caption = "近场耦合区域Cp参数行为";
        let svg = format!(r#"<svg><text>{caption}</text><line x1="0" y1="0" x2="1" y2="1"/></svg>"#);
        let out = SvgRepairer::default().repair(&svg);
        assert!(out.replaced_by.is_none());
        assert_eq!(out.markup, svg);
    }

    #[test]
    fn empty_table_never_replaces() {
        let svg = r#"<svg><text>Cp参数与球间距离的理论关系</text><rect width="5" height="5" fill="black"/></svg>"#;
        let out = SvgRepairer::new(FallbackTable::default()).repair(svg);
        assert!(out.replaced_by.is_none());
    }

    #[test]
    fn builtin_table_has_two_entries() {
        let table = FallbackTable::builtin();
        assert_eq!(table.len(), 2);
        assert!(table.find("…近场耦合区域Cp参数行为…").is_some());
        assert!(table.find("unrelated").is_none());
    }
}
