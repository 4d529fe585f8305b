//! # md2pdf
//!
//! Render Markdown documents that embed SVG images, Mermaid diagrams and
//! tagged chat artifacts into PDF.
//!
//! ## Why this crate?
//!
//! Markdown exported from chat tools carries rich content that typesetters
//! cannot use directly: `<chat-artifact>` blocks, raw `<svg>` markup with
//! LaTeX in its text nodes, Mermaid source. This crate cuts that content out,
//! repairs the common defects, renders each piece to an image through a chain
//! of fallback strategies and hands pandoc a document that only references
//! image files. Every artifact ends up with *some* embeddable image: if every
//! tool is missing, a titled source listing is rendered in-process.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Markdown
//!  │
//!  ├─ 1. Input    read local file or download from URL
//!  ├─ 2. Extract  tagged blocks, fenced diagrams, inline SVG → placeholders
//!  ├─ 3. Repair   line attributes, math notation, stray shapes, axes
//!  ├─ 4. Parse    flowchart source → graph model (for Graphviz)
//!  ├─ 5. Render   inkscape / resvg / dot / mmdc …, then source listing
//!  ├─ 6. Resolve  placeholders → ![title](asset) + caption
//!  └─ 7. Typeset  pandoc + XeLaTeX, full → reduced → minimal profile
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use md2pdf::{convert_to_pdf, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .fonts(md2pdf::fonts::detect().await)
//!         .build()?;
//!     let output = convert_to_pdf("report.md", "report.pdf", &config).await?;
//!     eprintln!(
//!         "{} artifacts, {} rendered as listings",
//!         output.stats.total_artifacts, output.stats.listing_fallbacks
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `md2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! md2pdf = { version = "0.3", default-features = false }
//! ```
//!
//! ## External Tools
//!
//! | Program    | Used for                          | Required |
//! |------------|-----------------------------------|----------|
//! | `pandoc`   | typesetting                       | for PDF output |
//! | `xelatex`  | pandoc's PDF engine               | for PDF output |
//! | `inkscape` | SVG → PNG                         | no |
//! | `dot`      | flowcharts                        | no |
//! | `mmdc`     | all other Mermaid diagrams        | no |
//! | `fc-list`  | CJK font detection on Linux       | no |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifact;
pub mod config;
pub mod convert;
pub mod error;
pub mod fonts;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod typeset;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use artifact::{Artifact, ArtifactKind, ArtifactMap};
pub use config::{ConversionConfig, ConversionConfigBuilder, ToolPaths};
pub use convert::{convert_sync, convert_to_dir, convert_to_pdf, inspect, render_markdown};
pub use error::{ArtifactError, Md2PdfError};
pub use fonts::FontSet;
pub use output::{ArtifactReport, ArtifactSummary, ConversionOutput, ConversionStats, SkippedAttempt};
pub use pipeline::repair::{FallbackEntry, FallbackTable};
pub use pipeline::strategy::StrategyKind;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use typeset::TypesetProfile;
