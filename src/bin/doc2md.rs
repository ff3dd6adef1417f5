//! CLI binary for edgequake-doc2md.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_doc2md::{
    ConversionConfig, ConversionOutput, ConversionProgressCallback, ConversionStage,
    ConversionStatus, Converter, ImageOutput, PageSeparator, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner showing the current stage, plus one
/// log line per rewritten chunk. Chunks may complete out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    fallbacks: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            fallbacks: AtomicUsize::new(0),
        })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, filename: &str, size_bytes: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {filename} ({size_bytes} bytes)…"))
        ));
    }

    fn on_stage(&self, _filename: &str, stage: ConversionStage) {
        match stage {
            ConversionStage::Completed | ConversionStage::Failed => {
                self.bar.finish_and_clear();
            }
            other => {
                self.bar.set_prefix("Converting");
                self.bar.set_message(other.to_string());
            }
        }
    }

    fn on_chunk_complete(&self, chunk: usize, total: usize, fell_back: bool) {
        if fell_back {
            self.fallbacks.fetch_add(1, Ordering::SeqCst);
        }
        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {}",
            if fell_back { yellow("↺") } else { green("✓") },
            chunk,
            total,
            dim(if fell_back { "fallback formatting" } else { "rewritten" }),
        ));
    }

    fn on_conversion_complete(&self, filename: &str, images: usize, warnings: usize) {
        let fallbacks = self.fallbacks.load(Ordering::SeqCst);
        eprintln!(
            "{} {}  {} image(s)  {} warning(s){}",
            if warnings == 0 { green("✔") } else { cyan("⚠") },
            bold(filename),
            images,
            warnings,
            if fallbacks > 0 {
                format!("  ({fallbacks} chunk(s) used fallback)")
            } else {
                String::new()
            }
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic conversion (stdout, images inlined as data URIs)
  doc2md report.docx

  # Convert to file, images written next to it
  doc2md slides.pdf -o out/slides.md --images-dir out/images --image-url-prefix images

  # Use a specific model
  doc2md --model gpt-4.1 --provider openai report.docx

  # Convert from URL
  doc2md https://example.com/whitepaper.pdf -o whitepaper.md

  # No LLM at all (extraction + reading order + images only)
  doc2md --offline report.docx

  # Check the image store and the LLM provider are reachable
  doc2md --check

  # JSON output with images, warnings and stats
  doc2md --json report.docx > output.json

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory), for PDF input

SETUP:
  1. Set API key:     export OPENAI_API_KEY=sk-...
  2. Convert:         doc2md report.docx -o report.md

  DOCX needs nothing else. PDF needs a pdfium shared library: place it next
  to the working directory, install it system-wide, or set PDFIUM_LIB_PATH.
"#;

/// Convert PDF and DOCX files to Markdown, keeping images in place.
#[derive(Parser, Debug)]
#[command(
    name = "doc2md",
    version,
    about = "Convert PDF and DOCX files to Markdown, keeping images in place",
    long_about = "Convert PDF and DOCX documents (local files or URLs) to clean Markdown. \
Text and images are extracted with their positions, put in reading order, and rewritten into \
Markdown by an LLM. Every image is kept at its original position, whatever the model does. \
Supports OpenAI, Anthropic, Google Gemini, Azure OpenAI, and any OpenAI-compatible endpoint.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local .pdf/.docx file path or HTTP/HTTPS URL.
    #[arg(required_unless_present = "check")]
    input: Option<String>,

    /// Write Markdown to this file instead of stdout.
    #[arg(short, long, env = "DOC2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// Skip the LLM: text keeps its extracted form, images are still placed.
    #[arg(long, env = "DOC2MD_OFFLINE")]
    offline: bool,

    /// Check the image store and the LLM provider, then exit.
    #[arg(long)]
    check: bool,

    /// Write images to this directory instead of inlining them as data URIs.
    #[arg(long, env = "DOC2MD_IMAGES_DIR")]
    images_dir: Option<PathBuf>,

    /// URL prefix for images written with --images-dir.
    #[arg(long, env = "DOC2MD_IMAGE_URL_PREFIX", requires = "images_dir")]
    image_url_prefix: Option<String>,

    /// Character budget per LLM call; longer text is split into chunks.
    #[arg(long, env = "DOC2MD_MAX_INPUT_CHARS", default_value_t = 12_000)]
    max_input_chars: usize,

    /// Minimum ratio of words a rewrite must keep (0.0–1.0).
    #[arg(long, env = "DOC2MD_MIN_WORD_RATIO", default_value_t = 0.7)]
    min_word_ratio: f32,

    /// Vertical distance (points) within which PDF text shares a line.
    #[arg(long, env = "DOC2MD_LINE_TOLERANCE", default_value_t = 5.0)]
    line_tolerance: f32,

    /// Number of concurrent LLM calls.
    #[arg(short, long, env = "DOC2MD_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// PDF page separator: none, hr, comment, or custom string.
    #[arg(long, env = "DOC2MD_SEPARATOR", default_value = "hr")]
    separator: String,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "DOC2MD_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens per chunk.
    #[arg(long, env = "DOC2MD_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "DOC2MD_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Retries per chunk on LLM failure or timeout.
    #[arg(long, env = "DOC2MD_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "DOC2MD_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DOC2MD_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Output structured JSON (ConversionOutput) instead of Markdown.
    #[arg(long, env = "DOC2MD_JSON")]
    json: bool,

    /// Disable progress output.
    #[arg(long, env = "DOC2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOC2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOC2MD_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner already reports stages; keep library INFO logs out of its way.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.check;
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

    // ── Build converter ──────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;
    let converter = if cli.offline {
        Converter::offline(config)
    } else {
        Converter::from_config(config).context("Failed to initialise the LLM provider")?
    };

    // ── Health check ─────────────────────────────────────────────────────
    if cli.check {
        let report = converter.health().await;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialise report")?
            );
        } else {
            let mark = |ok: bool| if ok { green("ok") } else { red("unreachable") };
            println!("Image store:  {}", mark(report.storage_reachable));
            println!("Rewriter:     {}", mark(report.rewriter_reachable));
            for detail in &report.details {
                println!("  {}", dim(detail));
            }
        }
        if !report.is_healthy() {
            std::process::exit(1);
        }
        return Ok(());
    }

    // ── Run conversion ───────────────────────────────────────────────────
    let input = cli.input.as_deref().context("No input given")?;

    if let Some(ref output_path) = cli.output {
        let output = converter
            .convert_to_file(input, output_path)
            .await
            .context("Conversion failed")?;

        if cli.json {
            print_json(&output)?;
        } else if !cli.quiet {
            eprintln!(
                "{}  {} chunk(s)  {} image(s)  {}ms  →  {}",
                status_mark(output.status),
                output.stats.chunks,
                output.images.len(),
                output.stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
            print_warnings(&output);
        }
    } else {
        let output = converter
            .convert_path(input)
            .await
            .context("Conversion failed")?;

        if cli.json {
            print_json(&output)?;
        } else {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(output.markdown.as_bytes())
                .context("Failed to write to stdout")?;
            if !output.markdown.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }

        if !cli.quiet && !cli.json {
            if !show_progress {
                eprintln!(
                    "Converted {} in {}ms ({} image(s), {} chunk(s), {} fallback)",
                    output.filename,
                    output.stats.total_duration_ms,
                    output.images.len(),
                    output.stats.chunks,
                    output.stats.fallback_chunks
                );
            }
            print_warnings(&output);
        }
    }

    Ok(())
}

fn status_mark(status: ConversionStatus) -> String {
    match status {
        ConversionStatus::Success => green("✔"),
        ConversionStatus::Degraded => cyan("⚠"),
        ConversionStatus::NoContent => dim("∅"),
    }
}

fn print_warnings(output: &ConversionOutput) {
    for w in &output.warnings {
        eprintln!("  {} {}", yellow("!"), dim(&w.to_string()));
    }
}

fn print_json(output: &ConversionOutput) -> Result<()> {
    let json = serde_json::to_string_pretty(output).context("Failed to serialise output")?;
    println!("{json}");
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let image_output = match cli.images_dir {
        Some(ref dir) => ImageOutput::Directory {
            path: dir.clone(),
            url_prefix: cli.image_url_prefix.clone(),
        },
        None => ImageOutput::Inline,
    };

    let mut builder = ConversionConfig::builder()
        .max_input_chars(cli.max_input_chars)
        .min_word_ratio(cli.min_word_ratio)
        .line_tolerance(cli.line_tolerance)
        .concurrency(cli.concurrency)
        .page_separator(parse_separator(&cli.separator))
        .image_output(image_output)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .rewrite_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--separator` string into `PageSeparator`.
fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "none" => PageSeparator::None,
        "hr" | "---" => PageSeparator::HorizontalRule,
        "comment" => PageSeparator::Comment,
        _ => PageSeparator::Custom(s.to_string()),
    }
}
