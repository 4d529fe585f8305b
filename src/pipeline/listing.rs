//! SVG text listings and in-process rasterisation.
//!
//! Two listing layouts exist:
//!
//! * [`source_listing_svg`]: the guaranteed renderer's output. A titled
//!   box of the raw content, wrapped at [`LISTING_COLUMNS`] and truncated to
//!   [`LISTING_MAX_LINES`].
//! * [`source_box_svg`]: a diagram's source in a rounded box, used when no
//!   diagram tool is available. Not truncated.
//!
//! [`rasterize_svg`] is CPU-bound; async callers run it in `spawn_blocking`.

use crate::error::ArtifactError;
use once_cell::sync::Lazy;
use resvg::tiny_skia::{Color, Pixmap, Transform};
use resvg::usvg;
use std::path::Path;
use std::sync::Arc;

pub const LISTING_COLUMNS: usize = 90;
pub const LISTING_MAX_LINES: usize = 30;

const LISTING_WIDTH: usize = 800;
const LINE_HEIGHT: usize = 24;
/// Largest edge, in pixels, a rasterised image may have.
const MAX_RASTER_EDGE: f32 = 16_000.0;

static FONT_DB: Lazy<Arc<usvg::fontdb::Database>> = Lazy::new(|| {
    let mut options = usvg::Options::default();
    options.fontdb_mut().load_system_fonts();
    Arc::clone(&options.fontdb)
});

/// XML-escape text content.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Display width in monospace cells; wide East Asian characters take two.
fn cell_width(c: char) -> usize {
    if c >= '\u{1100}'
        && (c <= '\u{115f}'
            || ('\u{2e80}'..='\u{a4cf}').contains(&c)
            || ('\u{ac00}'..='\u{d7a3}').contains(&c)
            || ('\u{f900}'..='\u{faff}').contains(&c)
            || ('\u{fe30}'..='\u{fe4f}').contains(&c)
            || ('\u{ff00}'..='\u{ff60}').contains(&c)
            || ('\u{ffe0}'..='\u{ffe6}').contains(&c))
    {
        2
    } else {
        1
    }
}

/// Hard-wrap one line at `columns` cells. Tabs become four spaces.
pub fn wrap_line(line: &str, columns: usize) -> Vec<String> {
    let line = line.replace('\t', "    ");
    let mut rows = Vec::new();
    let mut current = String::new();
    let mut used = 0;
    for c in line.chars() {
        let w = cell_width(c);
        if used + w > columns && !current.is_empty() {
            rows.push(std::mem::take(&mut current));
            used = 0;
        }
        current.push(c);
        used += w;
    }
    rows.push(current);
    rows
}

/// Wrapped, truncated rows for the guaranteed listing.
pub fn listing_rows(content: &str) -> Vec<String> {
    let mut rows: Vec<String> = content
        .lines()
        .flat_map(|l| wrap_line(l, LISTING_COLUMNS))
        .collect();
    if rows.is_empty() {
        rows.push(String::new());
    }
    if rows.len() > LISTING_MAX_LINES {
        rows.truncate(LISTING_MAX_LINES - 3);
        rows.push("…".into());
        rows.push(String::new());
        rows.push("(listing truncated)".into());
    }
    rows
}

/// Titled monospace listing of `content`.
pub fn source_listing_svg(title: &str, content: &str, mono_font: &str) -> String {
    let rows = listing_rows(content);
    let height = rows.len() * LINE_HEIGHT + 80;
    let font = escape_xml(mono_font);

    let mut svg = format!(
        r##"<svg width="{LISTING_WIDTH}" height="{height}" xmlns="http://www.w3.org/2000/svg">
<rect x="0" y="0" width="{LISTING_WIDTH}" height="{height}" fill="white"/>
<text x="20" y="40" font-family="{font}, sans-serif" font-size="16" font-weight="bold">{}</text>
<rect x="10" y="60" width="{}" height="{}" fill="#f8f8f8" stroke="#dddddd" rx="4"/>
"##,
        escape_xml(title),
        LISTING_WIDTH - 20,
        height - 70,
    );
    for (i, row) in rows.iter().enumerate() {
        svg.push_str(&format!(
            r#"<text x="20" y="{}" font-family="{font}, monospace" font-size="14" xml:space="preserve">{}</text>
"#,
            84 + i * LINE_HEIGHT,
            escape_xml(row),
        ));
    }
    svg.push_str("</svg>\n");
    svg
}

/// Rounded box showing a diagram's source, titled.
pub fn source_box_svg(title: &str, content: &str, sans_font: &str, mono_font: &str) -> String {
    let rows: Vec<String> = content
        .lines()
        .flat_map(|l| wrap_line(l, LISTING_COLUMNS))
        .collect();
    let height = 110 + rows.len().max(1) * 18;
    let sans = escape_xml(sans_font);
    let mono = escape_xml(mono_font);

    let mut svg = format!(
        r##"<svg width="{LISTING_WIDTH}" height="{height}" xmlns="http://www.w3.org/2000/svg">
<rect x="0" y="0" width="{LISTING_WIDTH}" height="{height}" fill="white"/>
<text x="{}" y="36" text-anchor="middle" font-family="{sans}, sans-serif" font-size="18" font-weight="bold">{}</text>
<rect x="20" y="56" width="{}" height="{}" rx="10" ry="10" fill="#f0f4f8" stroke="#8aa4c0" stroke-width="1.5"/>
"##,
        LISTING_WIDTH / 2,
        escape_xml(title),
        LISTING_WIDTH - 40,
        height - 76,
    );
    for (i, row) in rows.iter().enumerate() {
        svg.push_str(&format!(
            r##"<text x="36" y="{}" font-family="{mono}, monospace" font-size="13" fill="#333333" xml:space="preserve">{}</text>
"##,
            82 + i * 18,
            escape_xml(row),
        ));
    }
    svg.push_str("</svg>\n");
    svg
}

/// Rasterise `svg` to a PNG at `output`, scaled by `scale`, on a white
/// background.
pub fn rasterize_svg(
    svg: &str,
    output: &Path,
    scale: f32,
    font_family: &str,
) -> Result<(), ArtifactError> {
    let mut options = usvg::Options::default();
    options.font_family = font_family.to_string();
    options.fontdb = Arc::clone(&FONT_DB);

    let tree = usvg::Tree::from_str(svg, &options)
        .map_err(|e| ArtifactError::Rasterise(format!("invalid SVG: {e}")))?;

    let size = tree.size().to_int_size();
    let width = (size.width() as f32 * scale).ceil();
    let height = (size.height() as f32 * scale).ceil();
    if !(1.0..=MAX_RASTER_EDGE).contains(&width) || !(1.0..=MAX_RASTER_EDGE).contains(&height) {
        return Err(ArtifactError::Rasterise(format!(
            "unsupported raster size {width}x{height}"
        )));
    }

    let mut pixmap = Pixmap::new(width as u32, height as u32).ok_or_else(|| {
        ArtifactError::Rasterise(format!("cannot allocate {width}x{height} surface"))
    })?;
    pixmap.fill(Color::WHITE);
    resvg::render(&tree, Transform::from_scale(scale, scale), &mut pixmap.as_mut());

    pixmap
        .save_png(output)
        .map_err(|e| ArtifactError::Rasterise(format!("PNG encoding failed: {e}")))
}
