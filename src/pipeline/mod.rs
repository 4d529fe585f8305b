//! Pipeline stages for Markdown-to-PDF conversion.
//!
//! Each submodule implements one transformation step and is testable on its
//! own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ repair ──▶ mermaid ──▶ render ──▶ resolve
//! (path/URL) (artifacts) (SVG fixes) (graphs)  (assets)   (Markdown)
//! ```
//!
//! 1. [`input`]   — read the local file or download the URL
//! 2. [`extract`] — cut artifacts out of the text, leave placeholders
//! 3. [`repair`]  — rule-based fixes for vector images, with [`math`]
//!    translating LaTeX inside text elements
//! 4. [`mermaid`] — parse flowchart diagrams into a graph model
//! 5. [`render`]  — try each [`strategy`] in order, falling back to a source
//!    [`listing`]; external programs go through [`tool`], flowcharts through
//!    [`dot`]
//! 6. [`resolve`] — replace placeholders with image references

pub mod dot;
pub mod extract;
pub mod input;
pub mod listing;
pub mod math;
pub mod mermaid;
pub mod render;
pub mod repair;
pub mod resolve;
pub mod strategy;
pub mod tool;
