//! CJK font selection for diagrams, listings and the typesetter.
//!
//! [`detect`] looks for a fixed list of CJK font families on the host and
//! falls back to per-platform defaults. The result is stored in
//! [`crate::ConversionConfig::fonts`] and passed down explicitly.

use crate::pipeline::tool::run_tool;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Families searched for, in preference order.
pub const CANDIDATE_FAMILIES: &[&str] = &[
    "Source Han Serif CN",
    "思源宋体",
    "Noto Serif CJK SC",
    "Source Han Sans CN",
    "思源黑体",
    "Noto Sans CJK SC",
    "SimSun",
    "宋体",
    "SimHei",
    "黑体",
    "Microsoft YaHei",
    "微软雅黑",
    "FangSong",
    "仿宋",
    "KaiTi",
    "楷体",
    "STSong",
    "华文宋体",
];

const FONT_EXTENSIONS: &[&str] = &[".ttf", ".otf", ".ttc"];

/// The three font roles used when rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontSet {
    pub serif: String,
    pub sans: String,
    pub mono: String,
}

impl Default for FontSet {
    fn default() -> Self {
        let (serif, sans, mono) = if cfg!(target_os = "macos") {
            ("STSong", "STHeiti", "STFangsong")
        } else if cfg!(windows) {
            ("SimSun", "SimHei", "KaiTi")
        } else {
            ("Noto Serif CJK SC", "Noto Sans CJK SC", "Noto Sans Mono CJK SC")
        };
        Self {
            serif: serif.into(),
            sans: sans.into(),
            mono: mono.into(),
        }
    }
}

impl FontSet {
    /// Assign detected families to roles: first → serif, second → sans,
    /// third → mono, each falling back to the previous role.
    pub fn from_families(families: &[String]) -> Self {
        let Some(serif) = families.first() else {
            return Self::default();
        };
        let sans = families.get(1).unwrap_or(serif);
        let mono = families.get(2).unwrap_or(sans);
        Self {
            serif: serif.clone(),
            sans: sans.clone(),
            mono: mono.clone(),
        }
    }
}

/// Probe the host for CJK fonts. Never fails; see [`FontSet::default`].
pub async fn detect() -> FontSet {
    let haystack = if cfg!(target_os = "linux") {
        fc_list().await
    } else {
        font_file_names(font_dirs()).await
    };
    let found = match_candidates(&haystack);
    let fonts = FontSet::from_families(&found);
    info!(serif = %fonts.serif, sans = %fonts.sans, mono = %fonts.mono, "fonts selected");
    fonts
}

async fn fc_list() -> Vec<String> {
    match run_tool("fc-list", [":lang=zh"], Duration::from_secs(10)).await {
        Ok(output) => String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect(),
        Err(e) => {
            debug!("fc-list unavailable: {e}");
            Vec::new()
        }
    }
}

fn font_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if cfg!(target_os = "macos") {
        dirs.push(PathBuf::from("/System/Library/Fonts"));
        dirs.push(PathBuf::from("/Library/Fonts"));
        if let Some(home) = std::env::var_os("HOME") {
            dirs.push(PathBuf::from(home).join("Library/Fonts"));
        }
    } else if cfg!(windows) {
        if let Some(windir) = std::env::var_os("WINDIR") {
            dirs.push(PathBuf::from(windir).join("Fonts"));
        }
    }
    dirs
}

async fn font_file_names(dirs: Vec<PathBuf>) -> Vec<String> {
    let mut names = Vec::new();
    for dir in dirs {
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if FONT_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
                names.push(name);
            }
        }
    }
    names
}

fn squash(s: &str) -> String {
    s.to_lowercase().replace(' ', "")
}

/// Candidates that appear in any haystack line, in candidate order, deduplicated.
fn match_candidates(haystack: &[String]) -> Vec<String> {
    let lines: Vec<String> = haystack.iter().map(|l| squash(l)).collect();
    CANDIDATE_FAMILIES
        .iter()
        .filter(|family| {
            let needle = squash(family);
            lines.iter().any(|l| l.contains(&needle))
        })
        .map(|f| f.to_string())
        .collect()
}
