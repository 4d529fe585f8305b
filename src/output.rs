//! Output types returned by the conversion functions.

use crate::artifact::{Artifact, ArtifactKind};
use crate::error::ArtifactError;
use crate::pipeline::strategy::StrategyKind;
use serde::{Deserialize, Serialize};

/// Result of rendering one document's artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Markdown with every placeholder resolved to an image block or caption.
    pub markdown: String,
    /// One report per extracted artifact, in extraction order.
    pub artifacts: Vec<ArtifactReport>,
    pub stats: ConversionStats,
}

/// What happened to a single artifact during the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactReport {
    pub id: String,
    #[serde(flatten)]
    pub kind: ArtifactKind,
    pub title: String,
    /// Names of the repair rules that changed the markup.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repairs: Vec<String>,
    /// Caption of the curated document that replaced the markup, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curated_replacement: Option<String>,
    /// Strategy that produced the asset. `None` when nothing was rendered.
    pub strategy: Option<StrategyKind>,
    /// Asset file name relative to the working directory.
    pub asset: Option<String>,
    /// Strategies tried before the successful one, with the reason each was skipped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedAttempt>,
}

impl ArtifactReport {
    pub(crate) fn new(artifact: &Artifact) -> Self {
        Self {
            id: artifact.id.clone(),
            kind: artifact.kind.clone(),
            title: artifact.title.clone(),
            repairs: Vec::new(),
            curated_replacement: None,
            strategy: None,
            asset: None,
            skipped: Vec::new(),
        }
    }

    /// True if a higher-fidelity strategy produced the asset.
    pub fn rendered_natively(&self) -> bool {
        matches!(self.strategy, Some(kind) if kind != StrategyKind::Listing)
    }
}

/// A strategy that was tried and passed over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedAttempt {
    pub strategy: StrategyKind,
    pub error: ArtifactError,
}

/// Aggregate counts and timings for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    pub total_artifacts: usize,
    pub vector_artifacts: usize,
    pub diagram_artifacts: usize,
    pub unsupported_artifacts: usize,
    /// Vector artifacts whose markup changed during repair.
    pub repaired_artifacts: usize,
    pub curated_replacements: usize,
    /// Artifacts with an asset, from any strategy.
    pub rendered_artifacts: usize,
    /// Artifacts that only the guaranteed listing could render.
    pub listing_fallbacks: usize,
    /// Renderable artifacts left without an asset.
    pub unrendered_artifacts: usize,
    /// Typesetter profile that succeeded, when a PDF was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typeset_profile: Option<String>,
    pub render_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Extraction-only view of one artifact, returned by [`crate::inspect`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub id: String,
    pub version: String,
    #[serde(flatten)]
    pub kind: ArtifactKind,
    pub title: String,
    pub content_bytes: usize,
}

impl From<&Artifact> for ArtifactSummary {
    fn from(a: &Artifact) -> Self {
        Self {
            id: a.id.clone(),
            version: a.version.clone(),
            kind: a.kind.clone(),
            title: a.title.clone(),
            content_bytes: a.content.len(),
        }
    }
}
