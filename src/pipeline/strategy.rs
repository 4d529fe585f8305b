//! Rendering strategies: one way each of turning an artifact into a file.
//!
//! A strategy either produces a path or an [`ArtifactError`] explaining why
//! it could not. The [`crate::pipeline::render::Renderer`] tries them in the
//! configured order and always finishes with [`ListingStrategy`].
//!
//! | Kind         | Artifact | How                                          |
//! |--------------|----------|----------------------------------------------|
//! | `inkscape`   | vector   | `inkscape in.svg --export-filename out.png`  |
//! | `resvg`      | vector   | in-process rasterisation                     |
//! | `embed-svg`  | vector   | write the markup as `<id>.svg`               |
//! | `graphviz`   | diagram  | DOT from the parsed graph, `dot -Tpng`       |
//! | `mermaid-cli`| diagram  | `mmdc -i in.mmd -o out.png`                  |
//! | `source-box` | diagram  | titled box of the diagram source, rasterised |
//! | `listing`    | any      | titled source listing (guaranteed)           |

use crate::artifact::{Artifact, ArtifactKind};
use crate::config::ConversionConfig;
use crate::error::ArtifactError;
use crate::pipeline::dot::{to_dot, DotStyle};
use crate::pipeline::listing::{rasterize_svg, source_box_svg, source_listing_svg};
use crate::pipeline::mermaid::{normalise_declaration, DiagramGraph};
use crate::pipeline::tool::run_tool;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Registry of rendering strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    Inkscape,
    Resvg,
    EmbedSvg,
    Graphviz,
    MermaidCli,
    SourceBox,
    /// The guaranteed renderer. Always appended; never configured.
    Listing,
}

impl StrategyKind {
    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::Inkscape => "inkscape",
            StrategyKind::Resvg => "resvg",
            StrategyKind::EmbedSvg => "embed-svg",
            StrategyKind::Graphviz => "graphviz",
            StrategyKind::MermaidCli => "mermaid-cli",
            StrategyKind::SourceBox => "source-box",
            StrategyKind::Listing => "listing",
        }
    }

    /// Default chain for vector artifacts.
    pub fn vector_defaults() -> Vec<StrategyKind> {
        vec![
            StrategyKind::Inkscape,
            StrategyKind::Resvg,
            StrategyKind::EmbedSvg,
        ]
    }

    /// Default chain for diagram artifacts.
    pub fn diagram_defaults() -> Vec<StrategyKind> {
        vec![
            StrategyKind::Graphviz,
            StrategyKind::MermaidCli,
            StrategyKind::SourceBox,
        ]
    }

    /// Whether this strategy can render artifacts of `kind`.
    pub fn accepts(self, kind: &ArtifactKind) -> bool {
        match self {
            StrategyKind::Inkscape | StrategyKind::Resvg | StrategyKind::EmbedSvg => {
                *kind == ArtifactKind::VectorImage
            }
            StrategyKind::Graphviz | StrategyKind::MermaidCli | StrategyKind::SourceBox => {
                *kind == ArtifactKind::Diagram
            }
            StrategyKind::Listing => !matches!(kind, ArtifactKind::Unsupported(_)),
        }
    }

    /// Instantiate the strategy object.
    pub fn build(self) -> Box<dyn RenderStrategy> {
        match self {
            StrategyKind::Inkscape => Box::new(InkscapeStrategy),
            StrategyKind::Resvg => Box::new(ResvgStrategy),
            StrategyKind::EmbedSvg => Box::new(EmbedSvgStrategy),
            StrategyKind::Graphviz => Box::new(GraphvizStrategy),
            StrategyKind::MermaidCli => Box::new(MermaidCliStrategy),
            StrategyKind::SourceBox => Box::new(SourceBoxStrategy),
            StrategyKind::Listing => Box::new(ListingStrategy),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_ascii_lowercase().replace('_', "-");
        [
            StrategyKind::Inkscape,
            StrategyKind::Resvg,
            StrategyKind::EmbedSvg,
            StrategyKind::Graphviz,
            StrategyKind::MermaidCli,
            StrategyKind::SourceBox,
            StrategyKind::Listing,
        ]
        .into_iter()
        .find(|k| k.name() == normalised)
        .ok_or_else(|| format!("unknown rendering strategy '{s}'"))
    }
}

/// File-system safe stem for an artifact id.
///
/// Ids made of ASCII alphanumerics, `-` and `_` are used as they are. Any
/// other id is sanitised and suffixed with a hash of the raw id, so distinct
/// ids never share a stem.
pub fn file_stem(id: &str) -> String {
    let safe: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if safe == id && !id.is_empty() {
        return safe;
    }

    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    let tag = hasher.finish();
    match safe.trim_matches('_') {
        "" => format!("artifact-{tag:016x}"),
        base => format!("{base}-{tag:016x}"),
    }
}

/// Everything a strategy needs to render one artifact.
pub struct RenderJob<'a> {
    pub artifact: &'a Artifact,
    /// Parsed graph, for flowchart diagrams only.
    pub graph: Option<&'a DiagramGraph>,
    pub workdir: &'a Path,
    pub config: &'a ConversionConfig,
}

impl<'a> RenderJob<'a> {
    /// File-system safe stem derived from the artifact id. See [`file_stem`].
    pub fn file_stem(&self) -> String {
        file_stem(&self.artifact.id)
    }

    /// `<workdir>/<stem>.<ext>`.
    pub fn path(&self, ext: &str) -> PathBuf {
        self.workdir.join(format!("{}.{ext}", self.file_stem()))
    }

    /// Like [`Self::path`], but removes a stale file from an earlier attempt.
    async fn fresh_output(&self, ext: &str) -> Result<PathBuf, ArtifactError> {
        let path = self.path(ext);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(path)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.tool_timeout_secs)
    }
}

/// One way of turning an artifact into an embeddable file.
pub trait RenderStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn attempt<'a>(&'a self, job: &'a RenderJob<'a>) -> BoxFuture<'a, Result<PathBuf, ArtifactError>>;
}

/// Rasterise on the blocking pool.
async fn rasterize_blocking(
    svg: String,
    output: PathBuf,
    scale: f32,
    font: String,
) -> Result<PathBuf, ArtifactError> {
    tokio::task::spawn_blocking(move || rasterize_svg(&svg, &output, scale, &font).map(|_| output))
        .await
        .map_err(|e| ArtifactError::Rasterise(format!("render task panicked: {e}")))?
}

// ── Vector strategies ────────────────────────────────────────────────────────

pub struct InkscapeStrategy;

impl RenderStrategy for InkscapeStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Inkscape
    }

    fn attempt<'a>(&'a self, job: &'a RenderJob<'a>) -> BoxFuture<'a, Result<PathBuf, ArtifactError>> {
        async move {
            let input = job.path("svg");
            tokio::fs::write(&input, &job.artifact.content).await?;
            let output = job.fresh_output("png").await?;
            run_tool(
                &job.config.tools.inkscape,
                [
                    input.into_os_string(),
                    "--export-filename".into(),
                    output.clone().into_os_string(),
                    format!("--export-dpi={}", job.config.export_dpi).into(),
                ],
                job.timeout(),
            )
            .await?;
            Ok(output)
        }
        .boxed()
    }
}

pub struct ResvgStrategy;

impl RenderStrategy for ResvgStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Resvg
    }

    fn attempt<'a>(&'a self, job: &'a RenderJob<'a>) -> BoxFuture<'a, Result<PathBuf, ArtifactError>> {
        async move {
            let output = job.fresh_output("png").await?;
            rasterize_blocking(
                job.artifact.content.clone(),
                output,
                job.config.raster_scale,
                job.config.fonts.sans.clone(),
            )
            .await
        }
        .boxed()
    }
}

pub struct EmbedSvgStrategy;

impl RenderStrategy for EmbedSvgStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::EmbedSvg
    }

    fn attempt<'a>(&'a self, job: &'a RenderJob<'a>) -> BoxFuture<'a, Result<PathBuf, ArtifactError>> {
        async move {
            let output = job.path("svg");
            tokio::fs::write(&output, &job.artifact.content).await?;
            Ok(output)
        }
        .boxed()
    }
}

// ── Diagram strategies ───────────────────────────────────────────────────────

pub struct GraphvizStrategy;

impl RenderStrategy for GraphvizStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Graphviz
    }

    fn attempt<'a>(&'a self, job: &'a RenderJob<'a>) -> BoxFuture<'a, Result<PathBuf, ArtifactError>> {
        async move {
            let graph = job
                .graph
                .filter(|g| !g.is_empty())
                .ok_or(ArtifactError::MissingGraph)?;
            let style = DotStyle {
                font: &job.config.fonts.sans,
                dpi: job.config.export_dpi,
            };
            let input = job.path("dot");
            tokio::fs::write(&input, to_dot(graph, &job.artifact.title, &style)).await?;
            let output = job.fresh_output("png").await?;
            run_tool(
                &job.config.tools.dot,
                [
                    "-Tpng".into(),
                    input.into_os_string(),
                    "-o".into(),
                    output.clone().into_os_string(),
                ],
                job.timeout(),
            )
            .await?;
            Ok(output)
        }
        .boxed()
    }
}

pub struct MermaidCliStrategy;

impl RenderStrategy for MermaidCliStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MermaidCli
    }

    fn attempt<'a>(&'a self, job: &'a RenderJob<'a>) -> BoxFuture<'a, Result<PathBuf, ArtifactError>> {
        async move {
            let input = job.path("mmd");
            tokio::fs::write(&input, normalise_declaration(&job.artifact.content)).await?;
            let output = job.fresh_output("png").await?;
            run_tool(
                &job.config.tools.mermaid_cli,
                [
                    "-i".into(),
                    input.into_os_string(),
                    "-o".into(),
                    output.clone().into_os_string(),
                    "-b".into(),
                    std::ffi::OsString::from("white"),
                ],
                job.timeout(),
            )
            .await?;
            Ok(output)
        }
        .boxed()
    }
}

pub struct SourceBoxStrategy;

impl RenderStrategy for SourceBoxStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SourceBox
    }

    fn attempt<'a>(&'a self, job: &'a RenderJob<'a>) -> BoxFuture<'a, Result<PathBuf, ArtifactError>> {
        async move {
            let fonts = &job.config.fonts;
            let svg = source_box_svg(
                &job.artifact.title,
                &job.artifact.content,
                &fonts.sans,
                &fonts.mono,
            );
            let output = job.fresh_output("png").await?;
            rasterize_blocking(svg, output, job.config.raster_scale, fonts.sans.clone()).await
        }
        .boxed()
    }
}

// ── Guaranteed renderer ──────────────────────────────────────────────────────

/// Titled source listing. Falls back from PNG to the listing SVG itself, so
/// only a failed file write can stop it.
pub struct ListingStrategy;

impl RenderStrategy for ListingStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Listing
    }

    fn attempt<'a>(&'a self, job: &'a RenderJob<'a>) -> BoxFuture<'a, Result<PathBuf, ArtifactError>> {
        async move {
            let fonts = &job.config.fonts;
            let svg = source_listing_svg(&job.artifact.title, &job.artifact.content, &fonts.mono);
            let png = job.workdir.join(format!("{}-listing.png", job.file_stem()));
            match rasterize_blocking(svg.clone(), png, job.config.raster_scale, fonts.sans.clone())
                .await
            {
                Ok(path) => Ok(path),
                Err(e) => {
                    warn!(artifact = %job.artifact.id, "listing rasterisation failed, embedding SVG: {e}");
                    let path = job.workdir.join(format!("{}-listing.svg", job.file_stem()));
                    tokio::fs::write(&path, svg).await?;
                    Ok(path)
                }
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip_through_from_str() {
        for kind in StrategyKind::vector_defaults()
            .into_iter()
            .chain(StrategyKind::diagram_defaults())
        {
            assert_eq!(kind.name().parse::<StrategyKind>(), Ok(kind));
        }
        assert_eq!("Embed_SVG".parse::<StrategyKind>(), Ok(StrategyKind::EmbedSvg));
        assert!("latex".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn serde_uses_kebab_case() {
        let json = serde_json::to_string(&StrategyKind::MermaidCli).unwrap();
        assert_eq!(json, "\"mermaid-cli\"");
    }

    #[test]
    fn accepts_matches_artifact_kind() {
        assert!(StrategyKind::Resvg.accepts(&ArtifactKind::VectorImage));
        assert!(!StrategyKind::Resvg.accepts(&ArtifactKind::Diagram));
        assert!(StrategyKind::Graphviz.accepts(&ArtifactKind::Diagram));
        assert!(StrategyKind::Listing.accepts(&ArtifactKind::Diagram));
        assert!(!StrategyKind::Listing.accepts(&ArtifactKind::Unsupported("x".into())));
    }

    #[test]
    fn build_reports_its_kind() {
        for kind in [StrategyKind::Inkscape, StrategyKind::SourceBox, StrategyKind::Listing] {
            assert_eq!(kind.build().kind(), kind);
        }
    }

    #[test]
    fn file_stem_is_sanitised() {
        let artifact = Artifact {
            id: "chart/1 v2".into(),
            version: "1".into(),
            kind: ArtifactKind::VectorImage,
            title: "t".into(),
            content: String::new(),
        };
        let config = ConversionConfig::default();
        let job = RenderJob {
            artifact: &artifact,
            graph: None,
            workdir: Path::new("/tmp/x"),
            config: &config,
        };
        let stem = job.file_stem();
        assert!(stem.starts_with("chart_1_v2-"), "{stem}");
        assert_eq!(job.path("png"), PathBuf::from(format!("/tmp/x/{stem}.png")));
    }

    #[test]
    fn plain_ids_keep_their_stem() {
        assert_eq!(file_stem("chart-1_v2"), "chart-1_v2");
        assert_eq!(file_stem("inline_svg_3"), "inline_svg_3");
    }

    #[test]
    fn distinct_ids_never_share_a_stem() {
        let ids = ["图一", "图二", "a.b", "a_b", "a b", "", "_"];
        let stems: Vec<String> = ids.iter().map(|id| file_stem(id)).collect();
        for (i, a) in stems.iter().enumerate() {
            assert!(!a.is_empty());
            assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
            for b in &stems[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(stems[0].starts_with("artifact-"));
        assert_eq!(file_stem("图一"), stems[0]);
    }
}
