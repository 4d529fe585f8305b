//! Error types for the md2pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Md2PdfError`] — **Fatal**: the run cannot proceed at all (missing
//!   input, unreadable file, the typesetter rejected the document on every
//!   attempt). Returned as `Err(Md2PdfError)` from the top-level `convert*`
//!   functions.
//!
//! * [`ArtifactError`] — **Non-fatal**: one rendering strategy for one
//!   artifact failed (tool not installed, non-zero exit, timeout, corrupt
//!   output). The renderer records it and moves on to the next strategy; it
//!   is surfaced only inside [`crate::output::ArtifactReport`].
//!
//! Malformed tagged blocks and math repairs that would unbalance markup are
//! not errors at all: the block stays plain text and the repair is reverted.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the md2pdf library.
#[derive(Debug, Error)]
pub enum Md2PdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Markdown file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// The input was read but is not UTF-8 text.
    #[error("Input '{source_name}' is not valid UTF-8 text")]
    NotUtf8 { source_name: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Run errors ────────────────────────────────────────────────────────
    /// The per-run working directory could not be created.
    #[error("Failed to create working directory: {source}")]
    WorkDirFailed {
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Typesetter errors ─────────────────────────────────────────────────
    /// The typesetting program could not be started at all.
    #[error("Typesetter '{program}' is not installed or not on PATH.\nInstall pandoc from https://pandoc.org/installing.html and a TeX distribution with XeLaTeX.")]
    TypesetterMissing { program: String },

    /// Every attempt on the escalation ladder failed.
    #[error("Typesetting failed after {attempts} attempts.\nLast error: {last_error}")]
    TypesetFailed { attempts: usize, last_error: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure of one rendering strategy for one artifact.
///
/// Stored in [`crate::output::ArtifactReport::skipped`] so callers can see
/// why a higher-fidelity strategy was passed over.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ArtifactError {
    /// The external program could not be spawned.
    #[error("{tool}: not installed or not on PATH")]
    ToolUnavailable { tool: String },

    /// The external program exited with a non-zero status.
    #[error("{tool}: exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    /// The external program did not finish in time and was killed.
    #[error("{tool}: timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    /// The strategy reported success but its output is missing or unusable.
    #[error("output '{path}' rejected: {reason}")]
    InvalidOutput { path: String, reason: String },

    /// The strategy needs a parsed diagram graph and none was available.
    #[error("no diagram graph available for this artifact")]
    MissingGraph,

    /// In-process rasterisation failed.
    #[error("rasterisation failed: {0}")]
    Rasterise(String),

    /// Reading or writing an artifact-local file failed.
    #[error("i/o error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ArtifactError {
    fn from(e: std::io::Error) -> Self {
        ArtifactError::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typeset_failed_display() {
        let e = Md2PdfError::TypesetFailed {
            attempts: 3,
            last_error: "! LaTeX Error: File `xeCJK.sty' not found.".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("3 attempts"), "got: {msg}");
        assert!(msg.contains("xeCJK"), "got: {msg}");
    }

    #[test]
    fn tool_failed_display() {
        let e = ArtifactError::ToolFailed {
            tool: "dot".into(),
            status: "exit status: 1".into(),
            stderr: "syntax error in line 3".into(),
        };
        let msg = e.to_string();
        assert!(msg.starts_with("dot:"));
        assert!(msg.contains("line 3"));
    }

    #[test]
    fn timeout_display() {
        let e = ArtifactError::Timeout {
            tool: "mmdc".into(),
            secs: 30,
        };
        assert_eq!(e.to_string(), "mmdc: timed out after 30s");
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let e: ArtifactError = io.into();
        assert!(matches!(e, ArtifactError::Io(ref d) if d.contains("disk full")));
    }

    #[test]
    fn artifact_error_serialises() {
        let e = ArtifactError::ToolUnavailable {
            tool: "inkscape".into(),
        };
        let json = serde_json::to_string(&e).expect("serialise");
        assert!(json.contains("inkscape"));
    }
}
