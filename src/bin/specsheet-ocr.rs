//! CLI binary for specsheet-ocr.
//!
//! A thin shim over the library crate that maps CLI flags to `OcrConfig`
//! and writes the result set.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use specsheet_ocr::sink::{csv_bytes, json_bytes};
use specsheet_ocr::{
    default_artifacts_dir, ocr_images, ocr_pdf, split_pdf, write_results, OcrConfig, OcrConfigBuilder,
    OcrProgressCallback, OutputFormat, PageSelection, ProgressCallback, ResultSet, SegmentConfig,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
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

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One line per image plus a bar at the bottom. Items may finish out of
/// order when `--concurrency` is above 1.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Rendering and segmenting…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
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

impl OcrProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_items: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER);

        self.bar.set_length(total_items as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("OCR");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Sending {total_items} images…"))
        ));
    }

    fn on_item_start(&self, index: usize, _total: usize, filename: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(filename.to_string());
    }

    fn on_item_complete(&self, index: usize, total: usize, filename: &str) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:>4}/{:<4} {:<24} {}",
            green("✓"),
            index + 1,
            total,
            filename,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, index: usize, total: usize, filename: &str, error: &str) {
        let secs = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>4}/{:<4} {:<24} {}  {}",
            red("✗"),
            index + 1,
            total,
            filename,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_items: usize, answered: usize) {
        let failed = total_items.saturating_sub(answered);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} images answered",
                green("✔"),
                bold(&answered.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} images answered  ({} failed)",
                if answered == 0 { red("✘") } else { cyan("⚠") },
                bold(&answered.to_string()),
                total_items,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Split every page into boxes and read each box (JSON to stdout)
  specsheet-ocr pdf drawings.pdf --endpoint https://api.openai.com/v1

  # Write a CSV with the Markdown-table prompt, boxes under artifacts/drawings
  specsheet-ocr pdf drawings.pdf --format csv -o result/drawings.csv

  # Read a directory of pre-cut images image0.png, image1.png, …
  specsheet-ocr images split_images/3 -o result/3.json

  # Only produce the page and box images, no requests
  specsheet-ocr split drawings.pdf --artifacts-dir out/drawings

ENVIRONMENT VARIABLES:
  OCR_ENDPOINT            OpenAI-compatible API base URL (…/v1)
  OCR_API_KEY             Bearer credential for OCR_ENDPOINT
  OCR_MODEL               Model ID (default gpt-4o-mini)
  OPENAI_API_KEY          Used through edgequake-llm when no endpoint is set
  EDGEQUAKE_LLM_PROVIDER  Provider override for edgequake-llm
  PDFIUM_LIB_PATH         Path to an existing libpdfium, skips auto-download
  RUST_LOG                Log filter, overrides -v / -q
"#;

/// Read part numbers and quantities off lighting-fixture spec sheets.
#[derive(Parser, Debug)]
#[command(
    name = "specsheet-ocr",
    version,
    about = "Read part numbers and quantities off lighting-fixture spec sheets with a vision model",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "OCR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "OCR_QUIET")]
    quiet: bool,

    /// Disable the progress bar.
    #[arg(long, global = true, env = "OCR_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rasterise a PDF, split pages into boxes and read each box.
    Pdf {
        /// PDF file.
        input: PathBuf,

        /// Send whole pages instead of segmented boxes.
        #[arg(long)]
        no_split: bool,

        #[command(flatten)]
        render: RenderArgs,

        #[command(flatten)]
        request: RequestArgs,
    },
    /// Read numbered images ({prefix}0.png, {prefix}1.png, …) from a directory.
    Images {
        /// Directory holding the images.
        dir: PathBuf,

        /// File name prefix before the number.
        #[arg(long, default_value = "image")]
        prefix: String,

        #[command(flatten)]
        request: RequestArgs,
    },
    /// Rasterise and segment a PDF, saving the images without any request.
    Split {
        /// PDF file.
        input: PathBuf,

        #[command(flatten)]
        render: RenderArgs,
    },
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Rendering DPI (72–600). Segmentation thresholds assume the default.
    #[arg(long, env = "OCR_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, default_value = "all")]
    pages: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "OCR_PDF_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Save page images to DIR/pages and box crops to DIR/regions
    /// [default: artifacts/<pdf stem>].
    #[arg(long, value_name = "DIR")]
    artifacts_dir: Option<PathBuf>,

    /// Keep page and box images in memory only.
    #[arg(long, conflicts_with = "artifacts_dir")]
    no_artifacts: bool,

    /// Canny low / high hysteresis thresholds.
    #[arg(long, num_args = 2, value_names = ["LOW", "HIGH"], default_values_t = [50.0, 150.0])]
    canny: Vec<f32>,

    /// Boxes must be wider and taller than this many pixels.
    #[arg(long, default_value_t = 50)]
    min_size: u32,
}

#[derive(Args, Debug)]
struct RequestArgs {
    /// Write results to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Result format: json (parsed fields) or csv (raw text per image).
    #[arg(long, value_enum, default_value = "json")]
    format: FormatArg,

    /// OpenAI-compatible API base URL.
    #[arg(long, env = "OCR_ENDPOINT")]
    endpoint: Option<String>,

    /// Bearer credential for --endpoint.
    #[arg(long, env = "OCR_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model ID.
    #[arg(long, env = "OCR_MODEL", default_value = specsheet_ocr::config::DEFAULT_MODEL)]
    model: String,

    /// edgequake-llm provider, used when no endpoint is set.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Max output tokens per image.
    #[arg(long, default_value_t = 1000)]
    max_tokens: usize,

    /// Sampling temperature (0.0–2.0). Left to the service when unset.
    #[arg(long)]
    temperature: Option<f32>,

    /// Per-request timeout in seconds. No timeout when unset.
    #[arg(long)]
    api_timeout: Option<u64>,

    /// Requests in flight at once. Results keep document order.
    #[arg(short, long, env = "OCR_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Text file with a custom prompt; `{filename}` is substituted.
    #[arg(long, value_name = "FILE")]
    prompt_file: Option<PathBuf>,

    /// Remove an outer ```json fence before parsing.
    #[arg(long)]
    strip_fences: bool,

    /// Append each finished record to this JSON Lines file.
    #[arg(long, value_name = "FILE")]
    journal: Option<PathBuf>,

    /// Exit with an error if any request failed.
    #[arg(long)]
    strict: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Csv,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Csv => OutputFormat::Csv,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO logs would interleave with the progress bar, so they are only
    // shown when the bar is off.
    let show_progress = !cli.quiet && !cli.no_progress && !matches!(cli.command, Command::Split { .. });
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

    match cli.command {
        Command::Pdf {
            ref input,
            no_split,
            ref render,
            ref request,
        } => {
            ensure_pdfium(cli.quiet)?;
            let progress = show_progress.then(|| CliProgressCallback::new() as ProgressCallback);
            let builder =
                apply_render(OcrConfig::builder(), input, render)?.split_regions(!no_split);
            let config = apply_request(builder, request, progress).await?;

            let results = ocr_pdf(input, &config).await.context("OCR failed")?;
            finish(results, request, &config, cli.quiet).await
        }
        Command::Images {
            ref dir,
            ref prefix,
            ref request,
        } => {
            let progress = show_progress.then(|| CliProgressCallback::new() as ProgressCallback);
            let builder = OcrConfig::builder().image_prefix(prefix.clone());
            let config = apply_request(builder, request, progress).await?;

            let results = ocr_images(dir, &config).await.context("OCR failed")?;
            finish(results, request, &config, cli.quiet).await
        }
        Command::Split {
            ref input,
            ref render,
        } => {
            if render.no_artifacts {
                anyhow::bail!("split only writes images; drop --no-artifacts");
            }
            let dir = artifacts_dir(input, render);
            ensure_pdfium(cli.quiet)?;
            let config = apply_render(OcrConfig::builder(), input, render)?
                .build()
                .context("Invalid configuration")?;

            let pages = split_pdf(input, &config).await.context("Split failed")?;
            let regions: usize = pages.iter().map(|p| p.regions.len()).sum();
            if !cli.quiet {
                for page in &pages {
                    eprintln!(
                        "  {} page {:>3}  {} boxes",
                        green("✓"),
                        page.page,
                        page.regions.len()
                    );
                }
                eprintln!(
                    "{} {} pages, {} boxes  →  {}",
                    green("✔"),
                    pages.len(),
                    regions,
                    bold(&dir.display().to_string())
                );
            }
            Ok(())
        }
    }
}

/// Make sure the pdfium library is available, downloading it with a progress
/// bar on first use.
fn ensure_pdfium(quiet: bool) -> Result<()> {
    if pdfium_auto::is_pdfium_cached() {
        return Ok(());
    }

    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}

fn artifacts_dir(input: &Path, render: &RenderArgs) -> PathBuf {
    render
        .artifacts_dir
        .clone()
        .unwrap_or_else(|| default_artifacts_dir(input))
}

/// Map rendering flags onto the builder.
fn apply_render(
    builder: OcrConfigBuilder,
    input: &Path,
    render: &RenderArgs,
) -> Result<OcrConfigBuilder> {
    let mut builder = builder
        .dpi(render.dpi)
        .pages(parse_pages(&render.pages)?)
        .segment(SegmentConfig {
            canny_low: render.canny[0],
            canny_high: render.canny[1],
            min_width: render.min_size,
            min_height: render.min_size,
        });

    if let Some(ref pwd) = render.password {
        builder = builder.password(pwd.clone());
    }
    if !render.no_artifacts {
        builder = builder.artifacts_dir(artifacts_dir(input, render));
    }
    Ok(builder)
}

/// Map request flags onto the builder and build the config.
async fn apply_request(
    builder: OcrConfigBuilder,
    request: &RequestArgs,
    progress: Option<ProgressCallback>,
) -> Result<OcrConfig> {
    let mut builder = builder
        .model(request.model.clone())
        .max_tokens(request.max_tokens)
        .concurrency(request.concurrency)
        .output_format(request.format.into())
        .strip_code_fences(request.strip_fences);

    if let Some(ref url) = request.endpoint {
        builder = builder.endpoint(url.clone());
    }
    if let Some(ref key) = request.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref name) = request.provider {
        builder = builder.provider_name(name.clone());
    }
    if let Some(t) = request.temperature {
        builder = builder.temperature(t);
    }
    if let Some(secs) = request.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if let Some(ref path) = request.prompt_file {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.prompt(prompt);
    }
    if let Some(ref path) = request.journal {
        builder = builder.journal(path.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Write the result set and print the summary line.
async fn finish(
    results: ResultSet,
    request: &RequestArgs,
    config: &OcrConfig,
    quiet: bool,
) -> Result<()> {
    match request.output {
        Some(ref path) => {
            write_results(path, &results, config.output_format)
                .await
                .context("Failed to write results")?;
        }
        None => {
            let bytes = match config.output_format {
                OutputFormat::Csv => csv_bytes(&results)?,
                OutputFormat::Json => json_bytes(&results.json_records())?,
            };
            io::stdout()
                .lock()
                .write_all(&bytes)
                .context("Failed to write to stdout")?;
        }
    }

    let s = &results.stats;
    if !quiet {
        eprintln!(
            "{}  {} images  {} parsed  {} unparsed  {} failed  {:.2}s{}",
            if s.failed == 0 { green("✔") } else { cyan("⚠") },
            s.total_items,
            s.parsed,
            s.unparsed,
            s.failed,
            s.total_duration_ms as f64 / 1000.0,
            match request.output {
                Some(ref p) => format!("  →  {}", bold(&p.display().to_string())),
                None => String::new(),
            }
        );
    }

    if request.strict {
        results.into_result().context("Some requests failed")?;
    }
    Ok(())
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;
        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!("Invalid page range '{}-{}': start must be <= end", start, end);
        }
        return Ok(PageSelection::Range(start, end));
    }

    if s.contains(',') {
        let pages = s
            .split(',')
            .map(|p| {
                let n: usize = p
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid page number: '{}'", p.trim()))?;
                if n < 1 {
                    anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", n);
                }
                Ok(n)
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(PageSelection::Set(pages));
    }

    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }
    Ok(PageSelection::Single(page))
}
