//! Input resolution: read a user-supplied path or URL into memory.
//!
//! Markdown is small, so URL inputs are downloaded straight into a `String`.
//! Local inputs remember their directory so relative image references in the
//! document still resolve when the typesetter runs from a temp directory.

use crate::error::Md2PdfError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A Markdown document ready for conversion.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub text: String,
    /// File name or URL, for messages.
    pub name: String,
    /// Directory of a local input; `None` for downloads.
    pub base_dir: Option<PathBuf>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Where the PDF goes when no output path is given: the input path with a
/// `.pdf` extension, or the URL's last path segment in the current directory.
pub fn default_output_path(input: &str) -> PathBuf {
    if is_url(input) {
        let stem = reqwest::Url::parse(input)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut s| s.next_back().map(str::to_string))
            })
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "document".to_string());
        return Path::new(&stem).with_extension("pdf");
    }
    Path::new(input).with_extension("pdf")
}

/// Resolve the input string to document text.
///
/// If the input is a URL, download it. If the input is a local file,
/// validate that it exists, is readable and is UTF-8.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<SourceDocument, Md2PdfError> {
    if input.trim().is_empty() {
        return Err(Md2PdfError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input).await
    }
}

async fn resolve_local(path_str: &str) -> Result<SourceDocument, Md2PdfError> {
    let path = PathBuf::from(path_str);

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Md2PdfError::PermissionDenied { path });
        }
        Err(_) => return Err(Md2PdfError::FileNotFound { path }),
    };
    let text = String::from_utf8(bytes).map_err(|_| Md2PdfError::NotUtf8 {
        source_name: path.display().to_string(),
    })?;

    let base_dir = path
        .parent()
        .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
        .map(Path::to_path_buf);

    debug!("Resolved local Markdown: {}", path.display());
    Ok(SourceDocument {
        text,
        name: path.display().to_string(),
        base_dir,
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<SourceDocument, Md2PdfError> {
    info!("Downloading Markdown from: {}", url);

    let failed = |reason: String| Md2PdfError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Md2PdfError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    let text = String::from_utf8(bytes.to_vec()).map_err(|_| Md2PdfError::NotUtf8 {
        source_name: url.to_string(),
    })?;

    info!("Downloaded {} bytes", text.len());
    Ok(SourceDocument {
        text,
        name: url.to_string(),
        base_dir: None,
    })
}
