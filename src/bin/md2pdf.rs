//! CLI binary for md2pdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use md2pdf::pipeline::input::default_output_path;
use md2pdf::{
    convert_to_dir, convert_to_pdf, fonts, inspect, ConversionConfig, ConversionOutput,
    ConversionProgressCallback, FontSet, ProgressCallback, StrategyKind,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per artifact.
/// Artifacts may start out of order when `--concurrency` is above 1.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-artifact start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_conversion_start` tells us the artifact count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} artifacts  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Rendering");
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total: usize) {
        self.activate_bar(total);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Rendering {total} artifacts…"))
        ));
    }

    fn on_artifact_start(&self, index: usize, _total: usize, id: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(id.to_string());
    }

    fn on_artifact_complete(&self, index: usize, total: usize, strategy: &str) {
        let secs = self.elapsed_secs(index);
        let mark = if strategy == StrategyKind::Listing.name() {
            yellow("◌")
        } else {
            green("✓")
        };
        self.bar.println(format!(
            "  {} Artifact {:>3}/{:<3}  {:<12}  {}",
            mark,
            index,
            total,
            dim(strategy),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_artifact_error(&self, index: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Artifact {:>3}/{:<3}  {}  {}",
            red("✗"),
            index,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, total: usize, rendered: usize) {
        let errors = self.errors.load(Ordering::SeqCst);
        let listings = total.saturating_sub(rendered + errors);
        self.bar.set_length(0);
        self.bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        self.bar.set_prefix("Typesetting");
        self.bar.set_message("");

        let summary = format!(
            "{} {} artifacts rendered",
            if errors == 0 { green("✔") } else { cyan("⚠") },
            bold(&format!("{rendered}/{total}")),
        );
        if listings > 0 {
            self.bar
                .println(format!("{summary}  ({} as source listings)", yellow(&listings.to_string())));
        } else {
            self.bar.println(summary);
        }
    }

    fn on_typeset_attempt(&self, profile: &str) {
        self.bar.set_message(format!("pandoc, {profile} profile"));
    }
}

impl Drop for CliProgressCallback {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic conversion (writes report.pdf next to the input)
  md2pdf report.md

  # Choose the output path
  md2pdf report.md -o build/report.pdf

  # Keep the rendered images and the resolved Markdown, skip the PDF
  md2pdf report.md --emit-markdown out/

  # List the artifacts a document contains
  md2pdf --inspect-only --json report.md

  # Only in-process rendering, no external tools
  md2pdf --vector-strategies resvg --diagram-strategies source-box report.md

  # Convert from URL
  md2pdf https://example.com/notes.md -o notes.pdf

RENDERING STRATEGIES:
  Vector images:  inkscape, resvg, embed-svg         (default: all three, in order)
  Diagrams:       graphviz, mermaid-cli, source-box  (default: all three, in order)
  A titled source listing is always tried last, so every artifact gets an image.

EXTERNAL TOOLS:
  pandoc + xelatex   required for PDF output
  inkscape           optional, SVG → PNG
  dot (Graphviz)     optional, flowcharts
  mmdc (mermaid-cli) optional, other diagram types
  fc-list            optional, CJK font detection on Linux

ENVIRONMENT VARIABLES:
  Every flag has an MD2PDF_* counterpart, e.g. MD2PDF_CONCURRENCY=4.
  RUST_LOG overrides the log filter (e.g. RUST_LOG=md2pdf=debug).
"#;

/// Render Markdown with embedded SVG, Mermaid and chat artifacts to PDF.
#[derive(Parser, Debug)]
#[command(
    name = "md2pdf",
    version,
    about = "Render Markdown with embedded SVG, Mermaid and chat artifacts to PDF",
    long_about = "Extract SVG images, Mermaid diagrams and <chat-artifact> blocks from a \
Markdown document, repair and render each one to an image, and typeset the result with \
pandoc and XeLaTeX. Every artifact gets an image, even when no rendering tool is installed.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local Markdown file path or HTTP/HTTPS URL.
    input: String,

    /// Write the PDF here. Default: the input path with a .pdf extension.
    #[arg(short, long, env = "MD2PDF_OUTPUT")]
    output: Option<PathBuf>,

    /// Render assets and the resolved Markdown into DIR instead of producing a PDF.
    #[arg(long, value_name = "DIR", env = "MD2PDF_EMIT_MARKDOWN")]
    emit_markdown: Option<PathBuf>,

    /// List extracted artifacts only; nothing is rendered.
    #[arg(long, env = "MD2PDF_INSPECT_ONLY")]
    inspect_only: bool,

    /// Print a JSON report (ConversionOutput, or the artifact list) to stdout.
    #[arg(long, env = "MD2PDF_JSON")]
    json: bool,

    /// Artifacts rendered at once.
    #[arg(short, long, env = "MD2PDF_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Timeout for each external rendering tool, in seconds.
    #[arg(long, env = "MD2PDF_TOOL_TIMEOUT", default_value_t = 30)]
    tool_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "MD2PDF_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Typesetter PDF engine.
    #[arg(long, env = "MD2PDF_PDF_ENGINE", default_value = "xelatex")]
    pdf_engine: String,

    /// Serif (body) CJK font. Skips font detection when all three are given.
    #[arg(long, env = "MD2PDF_SERIF_FONT")]
    serif_font: Option<String>,

    /// Sans-serif CJK font, used for diagrams.
    #[arg(long, env = "MD2PDF_SANS_FONT")]
    sans_font: Option<String>,

    /// Monospace CJK font, used for code and listings.
    #[arg(long, env = "MD2PDF_MONO_FONT")]
    mono_font: Option<String>,

    /// Omit the table of contents and section numbers.
    #[arg(long, env = "MD2PDF_NO_TOC")]
    no_toc: bool,

    /// Never substitute curated replacements for broken vector images.
    #[arg(long, env = "MD2PDF_NO_CURATED_FALLBACKS")]
    no_curated_fallbacks: bool,

    /// Comma-separated strategy order for vector images.
    #[arg(long, env = "MD2PDF_VECTOR_STRATEGIES", value_delimiter = ',',
          value_parser = parse_strategy)]
    vector_strategies: Option<Vec<StrategyKind>>,

    /// Comma-separated strategy order for diagrams.
    #[arg(long, env = "MD2PDF_DIAGRAM_STRATEGIES", value_delimiter = ',',
          value_parser = parse_strategy)]
    diagram_strategies: Option<Vec<StrategyKind>>,

    /// Disable progress bar.
    #[arg(long, env = "MD2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MD2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MD2PDF_QUIET")]
    quiet: bool,
}

fn parse_strategy(s: &str) -> std::result::Result<StrategyKind, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let artifacts = inspect(&cli.input).await.context("Failed to inspect document")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&artifacts).context("Failed to serialize artifacts")?
            );
        } else {
            println!("File:       {}", cli.input);
            println!("Artifacts:  {}", artifacts.len());
            for a in &artifacts {
                println!(
                    "  {:<24} {:<28} {:>7} bytes  {}",
                    a.id,
                    a.kind.to_string(),
                    a.content_bytes,
                    a.title
                );
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // ── Run conversion ───────────────────────────────────────────────────
    let (output, destination) = if let Some(ref dir) = cli.emit_markdown {
        let output = convert_to_dir(&cli.input, dir, &config)
            .await
            .context("Rendering failed")?;
        (output, dir.clone())
    } else {
        let pdf = cli
            .output
            .clone()
            .unwrap_or_else(|| default_output_path(&cli.input));
        let output = convert_to_pdf(&cli.input, &pdf, &config)
            .await
            .context("Conversion failed")?;
        (output, pdf)
    };
    // Finish the bar before printing the summary.
    drop(config);

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&output, &destination);
    }

    Ok(())
}

fn print_summary(output: &ConversionOutput, destination: &std::path::Path) {
    let stats = &output.stats;
    eprintln!(
        "{}  {} artifacts  {}ms  →  {}",
        if stats.unrendered_artifacts == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        stats.total_artifacts,
        stats.total_duration_ms,
        bold(&destination.display().to_string()),
    );
    if stats.repaired_artifacts > 0 {
        eprintln!(
            "   {} vector images repaired, {} replaced by curated versions",
            dim(&stats.repaired_artifacts.to_string()),
            dim(&stats.curated_replacements.to_string()),
        );
    }
    for report in output.artifacts.iter().filter(|r| !r.skipped.is_empty()) {
        let reasons: Vec<String> = report
            .skipped
            .iter()
            .map(|s| format!("{}: {}", s.strategy, s.error))
            .collect();
        eprintln!("   {} {}  {}", dim("·"), report.id, dim(&reasons.join("; ")));
    }
    if let Some(ref profile) = stats.typeset_profile {
        eprintln!("   typeset with the {} profile", dim(profile));
    }
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let fonts = match (&cli.serif_font, &cli.sans_font, &cli.mono_font) {
        (Some(serif), Some(sans), Some(mono)) => FontSet {
            serif: serif.clone(),
            sans: sans.clone(),
            mono: mono.clone(),
        },
        (serif, sans, mono) => {
            let detected = fonts::detect().await;
            FontSet {
                serif: serif.clone().unwrap_or(detected.serif),
                sans: sans.clone().unwrap_or(detected.sans),
                mono: mono.clone().unwrap_or(detected.mono),
            }
        }
    };

    let mut builder = ConversionConfig::builder()
        .concurrency(cli.concurrency)
        .tool_timeout_secs(cli.tool_timeout)
        .download_timeout_secs(cli.download_timeout)
        .pdf_engine(cli.pdf_engine.clone())
        .fonts(fonts)
        .toc(!cli.no_toc)
        .number_sections(!cli.no_toc);

    if cli.no_curated_fallbacks {
        builder = builder.no_curated_fallbacks();
    }
    if let Some(ref kinds) = cli.vector_strategies {
        builder = builder.vector_strategies(kinds.clone());
    }
    if let Some(ref kinds) = cli.diagram_strategies {
        builder = builder.diagram_strategies(kinds.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn strategy_lists_parse() {
        let cli = Cli::try_parse_from([
            "md2pdf",
            "doc.md",
            "--vector-strategies",
            "resvg,embed-svg",
            "--diagram-strategies",
            "source-box",
        ])
        .unwrap();
        assert_eq!(
            cli.vector_strategies,
            Some(vec![StrategyKind::Resvg, StrategyKind::EmbedSvg])
        );
        assert_eq!(cli.diagram_strategies, Some(vec![StrategyKind::SourceBox]));
    }

    #[test]
    fn unknown_strategy_rejected() {
        assert!(Cli::try_parse_from(["md2pdf", "doc.md", "--vector-strategies", "latex"]).is_err());
    }

    #[tokio::test]
    async fn explicit_fonts_skip_detection() {
        let cli = Cli::try_parse_from([
            "md2pdf",
            "doc.md",
            "--serif-font",
            "A",
            "--sans-font",
            "B",
            "--mono-font",
            "C",
            "--no-toc",
        ])
        .unwrap();
        let config = build_config(&cli, None).await.unwrap();
        assert_eq!(config.fonts.sans, "B");
        assert!(!config.toc);
        assert!(!config.number_sections);
    }
}
