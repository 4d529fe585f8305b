//! Typesetting: resolved Markdown → PDF via pandoc and a LaTeX engine.
//!
//! LaTeX installs differ wildly in which packages they carry, so the
//! typesetter climbs down an escalation ladder until one attempt succeeds:
//!
//! | Profile   | Header             | TOC / numbering | Fonts                  |
//! |-----------|--------------------|-----------------|------------------------|
//! | `full`    | `header_full.tex`  | as configured   | CJK main, sans, mono   |
//! | `reduced` | `header_basic.tex` | off             | CJK main, mono         |
//! | `minimal` | none               | off             | CJK main, mono         |

use crate::config::ConversionConfig;
use crate::error::{ArtifactError, Md2PdfError};
use crate::pipeline::tool::run_tool;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

const HEADER_FULL: &str = include_str!("../assets/latex/header_full.tex");
const HEADER_BASIC: &str = include_str!("../assets/latex/header_basic.tex");

const DOCUMENT_FILE: &str = "document.md";
const PDF_FILE: &str = "document.pdf";

/// One rung of the escalation ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypesetProfile {
    Full,
    Reduced,
    Minimal,
}

impl TypesetProfile {
    pub const LADDER: [TypesetProfile; 3] = [
        TypesetProfile::Full,
        TypesetProfile::Reduced,
        TypesetProfile::Minimal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TypesetProfile::Full => "full",
            TypesetProfile::Reduced => "reduced",
            TypesetProfile::Minimal => "minimal",
        }
    }

    fn header(self) -> Option<(&'static str, &'static str)> {
        match self {
            TypesetProfile::Full => Some(("header_full.tex", HEADER_FULL)),
            TypesetProfile::Reduced => Some(("header_basic.tex", HEADER_BASIC)),
            TypesetProfile::Minimal => None,
        }
    }
}

impl fmt::Display for TypesetProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pandoc arguments for one attempt. `workdir` holds the document and the
/// header files; `resource_dirs` are searched for images, in order.
pub fn pandoc_args(
    profile: TypesetProfile,
    workdir: &Path,
    resource_dirs: &[PathBuf],
    output: &Path,
    config: &ConversionConfig,
) -> Vec<OsString> {
    let fonts = &config.fonts;
    let mut args: Vec<OsString> = vec![
        workdir.join(DOCUMENT_FILE).into(),
        "-o".into(),
        output.into(),
        format!("--pdf-engine={}", config.pdf_engine).into(),
    ];

    if let Some((file, _)) = profile.header() {
        args.push("--include-in-header".into());
        args.push(workdir.join(file).into());
    }

    args.push("-V".into());
    args.push(format!("CJKmainfont={}", fonts.serif).into());
    if profile == TypesetProfile::Full {
        args.push("-V".into());
        args.push(format!("CJKsansfont={}", fonts.sans).into());
    }
    args.push("-V".into());
    args.push(format!("CJKmonofont={}", fonts.mono).into());

    if profile == TypesetProfile::Full {
        args.extend(
            ["-V", "geometry:margin=2.5cm", "-V", "colorlinks=true"]
                .into_iter()
                .map(OsString::from),
        );
        if config.toc {
            args.push("--toc".into());
            args.push("--toc-depth=3".into());
        }
        if config.number_sections {
            args.push("--number-sections".into());
        }
    }

    args.push("--listings".into());

    let mut search = vec![workdir.to_path_buf()];
    search.extend(resource_dirs.iter().cloned());
    // Paths containing the separator are dropped rather than failing the run.
    let resource_path = std::env::join_paths(&search)
        .unwrap_or_else(|_| workdir.as_os_str().to_os_string());
    args.push("--resource-path".into());
    args.push(resource_path);

    args
}

/// Typeset `markdown` and write the PDF to `output`.
///
/// Returns the profile that succeeded. A missing typesetter aborts straight
/// away; any other failure escalates to the next profile.
pub async fn typeset(
    markdown: &str,
    workdir: &Path,
    resource_dirs: &[PathBuf],
    output: &Path,
    config: &ConversionConfig,
) -> Result<TypesetProfile, Md2PdfError> {
    let internal = |e: std::io::Error| Md2PdfError::Internal(format!("cannot stage document: {e}"));
    tokio::fs::write(workdir.join(DOCUMENT_FILE), markdown)
        .await
        .map_err(internal)?;
    for profile in TypesetProfile::LADDER {
        if let Some((file, contents)) = profile.header() {
            tokio::fs::write(workdir.join(file), contents)
                .await
                .map_err(internal)?;
        }
    }

    let staged = workdir.join(PDF_FILE);
    let timeout = Duration::from_secs(config.typeset_timeout_secs);
    let mut failures = Vec::new();

    for profile in TypesetProfile::LADDER {
        if let Some(cb) = &config.progress_callback {
            cb.on_typeset_attempt(profile.name());
        }
        info!(profile = %profile, engine = %config.pdf_engine, "typesetting");

        let args = pandoc_args(profile, workdir, resource_dirs, &staged, config);
        match run_tool(&config.tools.pandoc, args, timeout).await {
            Ok(_) if staged.exists() => {
                copy_output(&staged, output).await?;
                info!(profile = %profile, output = %output.display(), "PDF written");
                return Ok(profile);
            }
            Ok(_) => {
                warn!(profile = %profile, "typesetter reported success but wrote no PDF");
                failures.push(format!("[{profile}] no PDF produced"));
            }
            Err(ArtifactError::ToolUnavailable { tool }) => {
                return Err(Md2PdfError::TypesetterMissing { program: tool });
            }
            Err(e) => {
                warn!(profile = %profile, "typesetting attempt failed: {e}");
                failures.push(format!("[{profile}] {e}"));
            }
        }
    }

    Err(Md2PdfError::TypesetFailed {
        attempts: failures.len(),
        last_error: failures.join("\n"),
    })
}

async fn copy_output(staged: &Path, output: &Path) -> Result<(), Md2PdfError> {
    let write_failed = |source| Md2PdfError::OutputWriteFailed {
        path: output.to_path_buf(),
        source,
    };
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }
    tokio::fs::copy(staged, output).await.map_err(write_failed)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolPaths;
    use tempfile::TempDir;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn full_profile_carries_everything() {
        let config = ConversionConfig::default();
        let args = strings(&pandoc_args(
            TypesetProfile::Full,
            Path::new("/w"),
            &[PathBuf::from("/docs")],
            Path::new("/w/out.pdf"),
            &config,
        ));
        assert_eq!(args[0], "/w/document.md");
        assert!(args.contains(&"--pdf-engine=xelatex".to_string()));
        assert!(args.contains(&"/w/header_full.tex".to_string()));
        assert!(args.contains(&format!("CJKsansfont={}", config.fonts.sans)));
        assert!(args.contains(&"--toc".to_string()));
        assert!(args.contains(&"--number-sections".to_string()));
        assert!(args.contains(&"geometry:margin=2.5cm".to_string()));
        let rp = args.iter().position(|a| a == "--resource-path").unwrap();
        assert!(args[rp + 1].starts_with("/w") && args[rp + 1].ends_with("/docs"));
    }

    #[test]
    fn reduced_and_minimal_drop_extras() {
        let config = ConversionConfig::default();
        let reduced = strings(&pandoc_args(
            TypesetProfile::Reduced,
            Path::new("/w"),
            &[],
            Path::new("o.pdf"),
            &config,
        ));
        assert!(reduced.contains(&"/w/header_basic.tex".to_string()));
        assert!(!reduced.contains(&"--toc".to_string()));
        assert!(!reduced.contains(&"--number-sections".to_string()));

        let minimal = strings(&pandoc_args(
            TypesetProfile::Minimal,
            Path::new("/w"),
            &[],
            Path::new("o.pdf"),
            &config,
        ));
        assert!(!minimal.contains(&"--include-in-header".to_string()));
        assert!(minimal.contains(&"--listings".to_string()));
    }

    #[test]
    fn toc_and_numbering_follow_config() {
        let config = ConversionConfig::builder()
            .toc(false)
            .number_sections(false)
            .build()
            .unwrap();
        let args = strings(&pandoc_args(
            TypesetProfile::Full,
            Path::new("/w"),
            &[],
            Path::new("o.pdf"),
            &config,
        ));
        assert!(!args.contains(&"--toc".to_string()));
        assert!(!args.contains(&"--number-sections".to_string()));
    }

    #[tokio::test]
    async fn missing_typesetter_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = ConversionConfig::builder()
            .tools(ToolPaths {
                pandoc: "md2pdf-missing-pandoc".into(),
                ..ToolPaths::default()
            })
            .build()
            .unwrap();
        let err = typeset("# hi", dir.path(), &[], &dir.path().join("o.pdf"), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, Md2PdfError::TypesetterMissing { ref program } if program == "md2pdf-missing-pandoc"));
        assert!(dir.path().join("document.md").exists());
        assert!(dir.path().join("header_full.tex").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn all_attempts_failing_reports_each() {
        let dir = TempDir::new().unwrap();
        let config = ConversionConfig::builder()
            .tools(ToolPaths {
                pandoc: "false".into(),
                ..ToolPaths::default()
            })
            .build()
            .unwrap();
        let err = typeset("# hi", dir.path(), &[], &dir.path().join("o.pdf"), &config)
            .await
            .unwrap_err();
        match err {
            Md2PdfError::TypesetFailed { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("[minimal]"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
