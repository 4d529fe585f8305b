//! Running external programs and validating what they produce.
//!
//! Every external tool (inkscape, dot, mmdc, pandoc, fc-list) goes through
//! [`run_tool`], which enforces a wall-clock timeout and kills the child if
//! the future is dropped.

use crate::error::ArtifactError;
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Longest stderr excerpt kept in an error.
const STDERR_TAIL_CHARS: usize = 600;

/// Run `program` with `args`, waiting at most `timeout`.
///
/// Returns the captured output on a zero exit status.
pub async fn run_tool<I, S>(
    program: &str,
    args: I,
    timeout: Duration,
) -> Result<Output, ArtifactError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(program, "spawning tool");
    let child = command.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
            ArtifactError::ToolUnavailable {
                tool: program.to_string(),
            }
        }
        _ => ArtifactError::ToolFailed {
            tool: program.to_string(),
            status: "spawn failed".into(),
            stderr: e.to_string(),
        },
    })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        // Dropping the wait future drops the child, which kills it.
        Err(_) => {
            return Err(ArtifactError::Timeout {
                tool: program.to_string(),
                secs: timeout.as_secs(),
            })
        }
    };

    if output.status.success() {
        Ok(output)
    } else {
        Err(ArtifactError::ToolFailed {
            tool: program.to_string(),
            status: output.status.to_string(),
            stderr: stderr_tail(&output.stderr),
        })
    }
}

/// Last few hundred characters of a tool's stderr, trimmed.
pub fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let count = text.chars().count();
    if count <= STDERR_TAIL_CHARS {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - STDERR_TAIL_CHARS).collect();
    format!("…{tail}")
}

/// Check that a produced asset exists, is large enough, and looks like what
/// its extension claims.
pub async fn validate_asset(path: &Path, min_bytes: u64) -> Result<(), ArtifactError> {
    let display = path.display().to_string();
    let reject = |reason: String| ArtifactError::InvalidOutput {
        path: display.clone(),
        reason,
    };

    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|_| reject("file was not created".into()))?;
    if meta.len() < min_bytes {
        return Err(reject(format!(
            "{} bytes is below the {min_bytes}-byte minimum",
            meta.len()
        )));
    }

    match path.extension().and_then(OsStr::to_str) {
        Some("png") => {
            let (w, h) =
                image::image_dimensions(path).map_err(|e| reject(format!("unreadable PNG: {e}")))?;
            if w == 0 || h == 0 {
                return Err(reject("empty image".into()));
            }
        }
        Some("svg") => {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| reject(format!("unreadable SVG: {e}")))?;
            let head = text.trim_start();
            if !head.starts_with("<svg") && !head.starts_with("<?xml") {
                return Err(reject("missing <svg> root".into()));
            }
        }
        _ => {}
    }
    Ok(())
}
