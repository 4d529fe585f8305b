//! Configuration types for Markdown-to-PDF conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The config is built once per run and
//! passed by reference to every stage, fonts and tool paths included.

use crate::artifact::ArtifactKind;
use crate::error::Md2PdfError;
use crate::fonts::FontSet;
use crate::pipeline::repair::FallbackTable;
use crate::pipeline::strategy::StrategyKind;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration for a Markdown-to-PDF conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use md2pdf::{ConversionConfig, StrategyKind};
///
/// let config = ConversionConfig::builder()
///     .concurrency(4)
///     .tool_timeout_secs(10)
///     .vector_strategies(vec![StrategyKind::Resvg])
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Artifacts rendered at once. Output order is preserved regardless.
    /// Default: 1.
    pub concurrency: usize,

    /// Wall-clock limit for each external rendering tool, in seconds. Default: 30.
    pub tool_timeout_secs: u64,

    /// Wall-clock limit for each typesetter attempt, in seconds. Default: 600.
    pub typeset_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Files smaller than this are rejected as rendering failures. Default: 100.
    pub min_asset_bytes: u64,

    /// Scale factor for in-process rasterisation. Range: (0, 8]. Default: 2.0.
    pub raster_scale: f32,

    /// DPI passed to Inkscape and Graphviz. Range: 72–600. Default: 300.
    pub export_dpi: u32,

    /// Strategy chain for vector images. The source listing is always
    /// appended and must not be listed.
    pub vector_strategies: Vec<StrategyKind>,

    /// Strategy chain for diagrams.
    pub diagram_strategies: Vec<StrategyKind>,

    /// External program names or paths.
    pub tools: ToolPaths,

    /// Fonts for diagrams, listings and the typesetter.
    pub fonts: FontSet,

    /// Curated replacements for known broken vector images. Default: built-in table.
    pub fallbacks: FallbackTable,

    /// Typesetter PDF engine. Default: "xelatex".
    pub pdf_engine: String,

    /// Emit a table of contents. Default: true.
    pub toc: bool,

    /// Number section headings. Default: true.
    pub number_sections: bool,

    /// Receives per-artifact events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            tool_timeout_secs: 30,
            typeset_timeout_secs: 600,
            download_timeout_secs: 120,
            min_asset_bytes: 100,
            raster_scale: 2.0,
            export_dpi: 300,
            vector_strategies: StrategyKind::vector_defaults(),
            diagram_strategies: StrategyKind::diagram_defaults(),
            tools: ToolPaths::default(),
            fonts: FontSet::default(),
            fallbacks: FallbackTable::builtin(),
            pdf_engine: "xelatex".into(),
            toc: true,
            number_sections: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("concurrency", &self.concurrency)
            .field("tool_timeout_secs", &self.tool_timeout_secs)
            .field("typeset_timeout_secs", &self.typeset_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("min_asset_bytes", &self.min_asset_bytes)
            .field("raster_scale", &self.raster_scale)
            .field("export_dpi", &self.export_dpi)
            .field("vector_strategies", &self.vector_strategies)
            .field("diagram_strategies", &self.diagram_strategies)
            .field("tools", &self.tools)
            .field("fonts", &self.fonts)
            .field("fallbacks", &self.fallbacks.len())
            .field("pdf_engine", &self.pdf_engine)
            .field("toc", &self.toc)
            .field("number_sections", &self.number_sections)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn tool_timeout_secs(mut self, secs: u64) -> Self {
        self.config.tool_timeout_secs = secs.max(1);
        self
    }

    pub fn typeset_timeout_secs(mut self, secs: u64) -> Self {
        self.config.typeset_timeout_secs = secs.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs.max(1);
        self
    }

    pub fn min_asset_bytes(mut self, bytes: u64) -> Self {
        self.config.min_asset_bytes = bytes;
        self
    }

    pub fn raster_scale(mut self, scale: f32) -> Self {
        self.config.raster_scale = scale.clamp(0.1, 8.0);
        self
    }

    pub fn export_dpi(mut self, dpi: u32) -> Self {
        self.config.export_dpi = dpi.clamp(72, 600);
        self
    }

    pub fn vector_strategies(mut self, kinds: Vec<StrategyKind>) -> Self {
        self.config.vector_strategies = kinds;
        self
    }

    pub fn diagram_strategies(mut self, kinds: Vec<StrategyKind>) -> Self {
        self.config.diagram_strategies = kinds;
        self
    }

    pub fn tools(mut self, tools: ToolPaths) -> Self {
        self.config.tools = tools;
        self
    }

    pub fn fonts(mut self, fonts: FontSet) -> Self {
        self.config.fonts = fonts;
        self
    }

    pub fn fallbacks(mut self, table: FallbackTable) -> Self {
        self.config.fallbacks = table;
        self
    }

    /// Disable curated replacements entirely.
    pub fn no_curated_fallbacks(mut self) -> Self {
        self.config.fallbacks = FallbackTable::default();
        self
    }

    pub fn pdf_engine(mut self, engine: impl Into<String>) -> Self {
        self.config.pdf_engine = engine.into();
        self
    }

    pub fn toc(mut self, v: bool) -> Self {
        self.config.toc = v;
        self
    }

    pub fn number_sections(mut self, v: bool) -> Self {
        self.config.number_sections = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Md2PdfError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(Md2PdfError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if !(c.raster_scale > 0.0 && c.raster_scale <= 8.0) {
            return Err(Md2PdfError::InvalidConfig(format!(
                "Raster scale must be in (0, 8], got {}",
                c.raster_scale
            )));
        }
        if c.tool_timeout_secs == 0 || c.typeset_timeout_secs == 0 {
            return Err(Md2PdfError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.pdf_engine.trim().is_empty() {
            return Err(Md2PdfError::InvalidConfig("PDF engine must not be empty".into()));
        }
        check_chain("vector", &c.vector_strategies, &ArtifactKind::VectorImage)?;
        check_chain("diagram", &c.diagram_strategies, &ArtifactKind::Diagram)?;
        Ok(self.config)
    }
}

fn check_chain(
    label: &str,
    chain: &[StrategyKind],
    kind: &ArtifactKind,
) -> Result<(), Md2PdfError> {
    for strategy in chain {
        if *strategy == StrategyKind::Listing {
            return Err(Md2PdfError::InvalidConfig(format!(
                "'listing' is always the last {label} strategy and cannot be configured"
            )));
        }
        if !strategy.accepts(kind) {
            return Err(Md2PdfError::InvalidConfig(format!(
                "'{strategy}' cannot render {label} artifacts"
            )));
        }
    }
    Ok(())
}

// ── Tool paths ───────────────────────────────────────────────────────────

/// Names (or paths) of the external programs the pipeline may invoke.
///
/// Each is looked up on `PATH` when it is a bare name. A missing program is
/// never fatal for rendering; the strategy using it is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPaths {
    pub inkscape: String,
    pub dot: String,
    pub mermaid_cli: String,
    pub pandoc: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            inkscape: "inkscape".into(),
            dot: "dot".into(),
            mermaid_cli: "mmdc".into(),
            pandoc: "pandoc".into(),
        }
    }
}
