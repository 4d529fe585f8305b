//! The rendering pipeline: try strategies in order until one produces a
//! valid asset.
//!
//! ## Why a guaranteed last step?
//!
//! External tools come and go between machines; a document must still build
//! on a host with none of them. [`Renderer::render`] therefore ends every
//! chain with [`ListingStrategy`], which needs nothing but the file system.
//! The only way to get `None` back is an I/O failure writing that listing.

use crate::artifact::ArtifactKind;
use crate::config::ConversionConfig;
use crate::output::SkippedAttempt;
use crate::pipeline::strategy::{ListingStrategy, RenderJob, RenderStrategy, StrategyKind};
use crate::pipeline::tool::validate_asset;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// A rendered file plus the history of how it was obtained.
#[derive(Debug, Clone)]
pub struct RenderedAsset {
    pub artifact_id: String,
    pub path: PathBuf,
    /// File name relative to the working directory, as referenced from Markdown.
    pub file_name: String,
    pub strategy: StrategyKind,
    pub skipped: Vec<SkippedAttempt>,
}

/// Holds the configured strategy chains for both artifact kinds.
pub struct Renderer {
    vector: Vec<Box<dyn RenderStrategy>>,
    diagram: Vec<Box<dyn RenderStrategy>>,
    guaranteed: ListingStrategy,
    min_asset_bytes: u64,
}

impl Renderer {
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self::with_strategies(
            config.vector_strategies.iter().map(|k| k.build()).collect(),
            config.diagram_strategies.iter().map(|k| k.build()).collect(),
            config.min_asset_bytes,
        )
    }

    /// Explicit strategy objects, e.g. custom implementations.
    pub fn with_strategies(
        vector: Vec<Box<dyn RenderStrategy>>,
        diagram: Vec<Box<dyn RenderStrategy>>,
        min_asset_bytes: u64,
    ) -> Self {
        Self {
            vector,
            diagram,
            guaranteed: ListingStrategy,
            min_asset_bytes,
        }
    }

    /// Render one artifact. Unsupported artifacts yield `None` without any
    /// attempt.
    pub async fn render(&self, job: &RenderJob<'_>) -> Option<RenderedAsset> {
        let artifact = job.artifact;
        let chain = match artifact.kind {
            ArtifactKind::VectorImage => &self.vector,
            ArtifactKind::Diagram => &self.diagram,
            ArtifactKind::Unsupported(_) => return None,
        };

        let mut skipped = Vec::new();
        for strategy in chain {
            let kind = strategy.kind();
            debug!(artifact = %artifact.id, strategy = %kind, "attempting strategy");
            let result = match strategy.attempt(job).await {
                Ok(path) => validate_asset(&path, self.min_asset_bytes).await.map(|_| path),
                Err(e) => Err(e),
            };
            match result {
                Ok(path) => {
                    info!(artifact = %artifact.id, strategy = %kind, "rendered");
                    return Some(asset(&artifact.id, path, kind, skipped));
                }
                Err(e) => {
                    warn!(artifact = %artifact.id, strategy = %kind, "strategy skipped: {e}");
                    skipped.push(SkippedAttempt {
                        strategy: kind,
                        error: e,
                    });
                }
            }
        }

        match self.guaranteed.attempt(job).await {
            Ok(path) => {
                info!(artifact = %artifact.id, "rendered as source listing");
                Some(asset(&artifact.id, path, StrategyKind::Listing, skipped))
            }
            Err(e) => {
                error!(artifact = %artifact.id, "no asset could be written: {e}");
                None
            }
        }
    }
}

fn asset(
    artifact_id: &str,
    path: PathBuf,
    strategy: StrategyKind,
    skipped: Vec<SkippedAttempt>,
) -> RenderedAsset {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    RenderedAsset {
        artifact_id: artifact_id.to_string(),
        path,
        file_name,
        strategy,
        skipped,
    }
}
