//! Conversion entry points.
//!
//! [`render_markdown`] is the core: extract, repair, parse, render and
//! resolve, all inside a caller-supplied directory. It never fails; an
//! artifact that cannot be rendered becomes a caption.
//!
//! [`convert_to_pdf`] wraps it with input resolution, a per-run
//! [`TempDir`] and the typesetter. [`convert_to_dir`] keeps the assets and
//! the resolved Markdown instead.

use crate::artifact::{Artifact, ArtifactKind};
use crate::config::ConversionConfig;
use crate::error::Md2PdfError;
use crate::output::{ArtifactReport, ArtifactSummary, ConversionOutput, ConversionStats};
use crate::pipeline::extract::{extract_artifacts, Extraction};
use crate::pipeline::mermaid::{self, DiagramGraph, DiagramKind};
use crate::pipeline::render::{RenderedAsset, Renderer};
use crate::pipeline::repair::SvgRepairer;
use crate::pipeline::resolve::resolve;
use crate::pipeline::strategy::RenderJob;
use crate::pipeline::input;
use crate::typeset::typeset;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info};

/// Render every artifact in `markdown` into `workdir` and resolve the
/// placeholders.
///
/// Asset references in the returned Markdown are file names relative to
/// `workdir`.
pub async fn render_markdown(
    markdown: &str,
    workdir: &Path,
    config: &ConversionConfig,
) -> ConversionOutput {
    let total_start = Instant::now();

    // ── Step 1: Extract artifacts ────────────────────────────────────────
    let Extraction {
        text,
        mut artifacts,
    } = extract_artifacts(markdown);
    info!("Extracted {} artifacts", artifacts.len());
    let mut reports: Vec<ArtifactReport> = artifacts.iter().map(ArtifactReport::new).collect();

    // ── Step 2: Repair vector images ─────────────────────────────────────
    let repairer = SvgRepairer::new(config.fallbacks.clone());
    for (artifact, report) in artifacts.iter_mut().zip(reports.iter_mut()) {
        if artifact.kind != ArtifactKind::VectorImage {
            continue;
        }
        let repair = repairer.repair(&artifact.content);
        if repair.changed() {
            debug!(artifact = %artifact.id, rules = ?repair.applied, "vector image repaired");
        }
        report.repairs = repair.applied.iter().map(|r| r.to_string()).collect();
        report.curated_replacement = repair.replaced_by;
        artifact.content = repair.markup;
    }

    // ── Step 3: Parse flowchart diagrams ─────────────────────────────────
    let graphs: HashMap<String, DiagramGraph> = artifacts
        .iter()
        .filter(|a| a.kind == ArtifactKind::Diagram)
        .filter(|a| DiagramKind::detect(&a.content).is_flowchart())
        .map(|a| (a.id.clone(), mermaid::parse(&a.content)))
        .collect();
    debug!("Parsed {} flowchart graphs", graphs.len());

    // ── Step 4: Render ───────────────────────────────────────────────────
    let render_start = Instant::now();
    let renderable: Vec<&Artifact> = artifacts
        .iter()
        .filter(|a| !matches!(a.kind, ArtifactKind::Unsupported(_)))
        .collect();
    let total = renderable.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(total);
    }

    let renderer = Renderer::from_config(config);
    let renderer = &renderer;
    let graphs = &graphs;
    let rendered: Vec<Option<RenderedAsset>> =
        stream::iter(renderable.into_iter().enumerate().map(|(i, artifact)| async move {
            let index = i + 1;
            if let Some(ref cb) = config.progress_callback {
                cb.on_artifact_start(index, total, &artifact.id);
            }
            let job = RenderJob {
                artifact,
                graph: graphs.get(&artifact.id),
                workdir,
                config,
            };
            let asset = renderer.render(&job).await;
            if let Some(ref cb) = config.progress_callback {
                match &asset {
                    Some(a) => cb.on_artifact_complete(index, total, a.strategy.name()),
                    None => cb.on_artifact_error(index, total, "no asset could be written"),
                }
            }
            asset
        }))
        // `buffered` keeps document order.
        .buffered(config.concurrency)
        .collect()
        .await;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;

    let mut assets = HashMap::new();
    for asset in rendered.into_iter().flatten() {
        if let Some(report) = reports.iter_mut().find(|r| r.id == asset.artifact_id) {
            report.strategy = Some(asset.strategy);
            report.asset = Some(asset.file_name.clone());
            report.skipped = asset.skipped;
        }
        assets.insert(asset.artifact_id, asset.file_name);
    }

    // ── Step 5: Resolve placeholders ─────────────────────────────────────
    let markdown = resolve(&text, &artifacts, &assets);

    // ── Step 6: Compute stats ────────────────────────────────────────────
    let mut stats = compute_stats(&reports);
    stats.render_duration_ms = render_duration_ms;
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Rendering complete: {}/{} artifacts natively, {} listings, {}ms",
        stats.rendered_artifacts - stats.listing_fallbacks,
        total,
        stats.listing_fallbacks,
        stats.render_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(total, stats.rendered_artifacts - stats.listing_fallbacks);
    }

    ConversionOutput {
        markdown,
        artifacts: reports,
        stats,
    }
}

/// Convert a Markdown file or URL to PDF.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `input_str` — Local file path or HTTP/HTTPS URL to a Markdown document
/// * `output_path` — Destination PDF; parent directories are created
/// * `config` — Conversion configuration
///
/// # Errors
/// Returns `Err(Md2PdfError)` only for fatal errors:
/// - File not found / permission denied / not UTF-8
/// - The working directory could not be created
/// - The typesetter is missing or failed on every profile
pub async fn convert_to_pdf(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2PdfError> {
    let total_start = Instant::now();
    let input_str = input_str.as_ref();
    info!("Starting conversion: {}", input_str);

    let source = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let workdir = TempDir::new().map_err(|source| Md2PdfError::WorkDirFailed { source })?;
    debug!("Working directory: {}", workdir.path().display());

    let mut output = render_markdown(&source.text, workdir.path(), config).await;

    let resource_dirs: Vec<PathBuf> = source.base_dir.into_iter().collect();
    let profile = typeset(
        &output.markdown,
        workdir.path(),
        &resource_dirs,
        output_path.as_ref(),
        config,
    )
    .await?;

    output.stats.typeset_profile = Some(profile.name().to_string());
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    info!(
        "Conversion complete: {} artifacts, {}ms total",
        output.stats.total_artifacts, output.stats.total_duration_ms
    );
    Ok(output)
}

/// Render a document's artifacts into `dir` and write the resolved Markdown
/// next to them, without typesetting.
///
/// The Markdown file is named after the input (`report.md` for
/// `docs/report.md`) and its image references resolve relative to `dir`.
pub async fn convert_to_dir(
    input_str: impl AsRef<str>,
    dir: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2PdfError> {
    let input_str = input_str.as_ref();
    let dir = dir.as_ref();
    let source = input::resolve_input(input_str, config.download_timeout_secs).await?;

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| Md2PdfError::WorkDirFailed { source })?;

    let output = render_markdown(&source.text, dir, config).await;

    let md_path = dir.join(markdown_file_name(input_str));
    tokio::fs::write(&md_path, &output.markdown)
        .await
        .map_err(|e| Md2PdfError::OutputWriteFailed {
            path: md_path.clone(),
            source: e,
        })?;
    info!("Resolved Markdown written to {}", md_path.display());
    Ok(output)
}

/// Synchronous wrapper around [`convert_to_pdf`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2PdfError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Md2PdfError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert_to_pdf(input_str, output_path, config))
}

/// List the artifacts a document contains without rendering anything.
///
/// Does not require any external tool.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<Vec<ArtifactSummary>, Md2PdfError> {
    let source = input::resolve_input(input_str.as_ref(), 120).await?;
    let extraction = extract_artifacts(&source.text);
    Ok(extraction.artifacts.iter().map(ArtifactSummary::from).collect())
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn compute_stats(reports: &[ArtifactReport]) -> ConversionStats {
    let count = |f: &dyn Fn(&ArtifactReport) -> bool| reports.iter().filter(|r| f(r)).count();
    let renderable = count(&|r| !matches!(r.kind, ArtifactKind::Unsupported(_)));
    let rendered = count(&|r| r.asset.is_some());
    ConversionStats {
        total_artifacts: reports.len(),
        vector_artifacts: count(&|r| r.kind == ArtifactKind::VectorImage),
        diagram_artifacts: count(&|r| r.kind == ArtifactKind::Diagram),
        unsupported_artifacts: reports.len() - renderable,
        repaired_artifacts: count(&|r| !r.repairs.is_empty() || r.curated_replacement.is_some()),
        curated_replacements: count(&|r| r.curated_replacement.is_some()),
        rendered_artifacts: rendered,
        listing_fallbacks: count(&|r| r.asset.is_some() && !r.rendered_natively()),
        unrendered_artifacts: renderable - rendered,
        ..ConversionStats::default()
    }
}

fn markdown_file_name(input_str: &str) -> String {
    let pdf = input::default_output_path(input_str);
    let stem = pdf
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string());
    format!("{stem}.md")
}
