//! Artifact records and the ordered map that owns them for one run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// MIME-style type string for vector artifacts created from inline SVG.
pub const SVG_TYPE: &str = "image/svg+xml";

/// MIME-style type string for diagram artifacts created from fenced blocks.
pub const MERMAID_TYPE: &str = "application/vnd.chat.mermaid";

/// What an artifact contains, and therefore which strategy chain renders it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "declared_type", rename_all = "snake_case")]
pub enum ArtifactKind {
    /// SVG markup.
    VectorImage,
    /// Mermaid diagram source.
    Diagram,
    /// Anything else; kept so the placeholder can still be captioned.
    Unsupported(String),
}

impl ArtifactKind {
    /// Map the `type` attribute of a tagged block onto a kind.
    pub fn from_declared(declared: &str) -> Self {
        match declared.trim().to_ascii_lowercase().as_str() {
            "image/svg+xml" | "image/svg" | "svg" => ArtifactKind::VectorImage,
            "application/vnd.chat.mermaid" | "text/x-mermaid" | "mermaid" => {
                ArtifactKind::Diagram
            }
            _ => ArtifactKind::Unsupported(declared.to_string()),
        }
    }

    /// The type string as it would appear in a tagged block.
    pub fn declared_type(&self) -> &str {
        match self {
            ArtifactKind::VectorImage => SVG_TYPE,
            ArtifactKind::Diagram => MERMAID_TYPE,
            ArtifactKind::Unsupported(t) => t,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::VectorImage => f.write_str("svg"),
            ArtifactKind::Diagram => f.write_str("mermaid"),
            ArtifactKind::Unsupported(t) => write!(f, "unsupported ({t})"),
        }
    }
}

/// One addressable unit of rich content found in the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub version: String,
    pub kind: ArtifactKind,
    pub title: String,
    /// Raw body. For vector artifacts this is replaced by the repaired
    /// markup before rendering.
    pub content: String,
}

/// Insertion-ordered map of artifact id → [`Artifact`].
///
/// Re-inserting an existing id replaces the earlier record but keeps its
/// original position.
#[derive(Debug, Clone, Default)]
pub struct ArtifactMap {
    entries: Vec<Artifact>,
    index: HashMap<String, usize>,
}

impl ArtifactMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an artifact, returning the record it replaced (if any).
    pub fn insert(&mut self, artifact: Artifact) -> Option<Artifact> {
        match self.index.get(&artifact.id) {
            Some(&pos) => Some(std::mem::replace(&mut self.entries[pos], artifact)),
            None => {
                self.index.insert(artifact.id.clone(), self.entries.len());
                self.entries.push(artifact);
                None
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Artifact> {
        self.index.get(id).map(|&pos| &self.entries[pos])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Artifact> {
        match self.index.get(id) {
            Some(&pos) => Some(&mut self.entries[pos]),
            None => None,
        }
    }

    /// Remove an artifact. Placeholders naming it become dangling, which the
    /// resolver tolerates.
    pub fn remove(&mut self, id: &str) -> Option<Artifact> {
        let pos = self.index.remove(id)?;
        let removed = self.entries.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Artifacts in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Artifact> {
        self.entries.iter_mut()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|a| a.id.as_str())
    }
}

impl Extend<Artifact> for ArtifactMap {
    fn extend<T: IntoIterator<Item = Artifact>>(&mut self, iter: T) {
        for artifact in iter {
            self.insert(artifact);
        }
    }
}
