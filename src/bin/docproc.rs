//! CLI binary for edgequake-docproc.
//!
//! A thin shim over the library crate: reads a rule file, wires the chosen
//! OCR backend into a [`ProcessRun`], and prints the run summary.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_docproc::sink::write_atomic;
use edgequake_docproc::{
    DocumentStatus, JsonLinesSink, OcrExtractor, PipelineConfig, ProcessRun, ProcessSummary,
    ProgressCallback, RuleSet, RunProgressCallback, RunStatus, TesseractOcrExtractor,
    VisionOcrExtractor,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
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

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar for the whole batch plus one log line per finished document.
/// Documents may finish out of order when `--concurrency > 1`.
struct CliProgressCallback {
    bar: ProgressBar,
    failures: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            failures: AtomicUsize::new(0),
        })
    }
}

impl RunProgressCallback for CliProgressCallback {
    fn on_run_start(&self, _run_id: &str, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER);
        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Processing");
    }

    fn on_document_start(&self, _index: usize, _total: usize, doc_id: &str) {
        self.bar.set_message(doc_id.to_string());
    }

    fn on_document_complete(&self, index: usize, total: usize, doc_id: &str, status: &str) {
        let mark = if status == DocumentStatus::Done.to_string() {
            green("✓")
        } else {
            yellow("⚠")
        };
        self.bar.println(format!(
            "  {mark} {index:>3}/{total:<3}  {doc_id}  {}",
            dim(status)
        ));
        self.bar.inc(1);
    }

    fn on_document_failed(&self, index: usize, total: usize, doc_id: &str, error: &str) {
        self.failures.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {index:>3}/{total:<3}  {doc_id}  {}",
            red("✗"),
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, _run_id: &str, overall_status: &str, processed: usize) {
        self.bar.finish_and_clear();
        let failed = self.failures.load(Ordering::SeqCst);
        if overall_status == RunStatus::Aborted.to_string() {
            eprintln!("{} run aborted", red("✘"));
        } else if failed == 0 {
            eprintln!("{} {} documents processed", green("✔"), bold(&processed.to_string()));
        } else {
            eprintln!(
                "{} {} documents processed  ({} failed)",
                yellow("⚠"),
                bold(&processed.to_string()),
                red(&failed.to_string())
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Classify and extract a folder of scans with a vision model
  docproc --rules invoice_rules.json scans/*.pdf

  # Local OCR, four documents at a time, records to a JSON-lines file
  docproc --rules rules.json --ocr tesseract -c 4 --records out.jsonl scans/*.png

  # Full JSON summary on stdout
  docproc --rules rules.json --json https://example.com/receipt.png

RULE FILE:
  {
    "classification": [{ "type": "invoice", "keywords": ["invoice"] }],
    "retrievers": {
      "invoice": [{ "field": "invoice_number", "pattern": "Invoice No[:\\s]+([A-Z0-9-]+)" }]
    },
    "validators": {
      "invoice_number": [{ "kind": "length", "params": { "min_length": 3 } }]
    },
    "required_fields": ["invoice_number"]
  }

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (vision OCR)
  ANTHROPIC_API_KEY       Anthropic API key (vision OCR)
  GEMINI_API_KEY          Google Gemini API key (vision OCR)
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Directory holding libpdfium for PDF rendering

EXIT STATUS:
  0  the run completed, even if some documents failed
  1  bad arguments, unreadable rules, aborted run, or unwritable output
"#;

/// Classify, extract and validate scanned documents.
#[derive(Parser, Debug)]
#[command(
    name = "docproc",
    version,
    about = "Classify, extract and validate scanned documents",
    long_about = "Run PDFs, images and text files through OCR, keyword classification, \
pattern-based field retrieval and field validation. Documents that fail a stage are \
reported individually; the rest of the batch carries on.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// JSON rule file (classification, retrievers, validators).
    #[arg(short, long, env = "DOCPROC_RULES")]
    rules: PathBuf,

    /// OCR backend.
    #[arg(long, env = "DOCPROC_OCR", value_enum, default_value = "vision")]
    ocr: OcrArg,

    /// Documents processed at once.
    #[arg(short, long, env = "DOCPROC_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Vision model ID (e.g. gpt-4.1-nano, gpt-4.1).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Vision provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// PDF rendering DPI (72–400).
    #[arg(long, env = "DOCPROC_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Language for `tesseract -l`.
    #[arg(long, env = "DOCPROC_TESSERACT_LANG", default_value = "eng")]
    tesseract_lang: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "DOCPROC_PASSWORD")]
    password: Option<String>,

    /// Retries per OCR call.
    #[arg(long, env = "DOCPROC_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DOCPROC_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-OCR-call timeout in seconds.
    #[arg(long, env = "DOCPROC_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Characters of OCR text shown per document in the summary.
    #[arg(long, env = "DOCPROC_SNIPPET_LEN", default_value_t = 100)]
    snippet_len: usize,

    /// Write one JSON record per finished document to this file.
    #[arg(long, env = "DOCPROC_RECORDS")]
    records: Option<PathBuf>,

    /// Write the run summary as JSON to this file.
    #[arg(long, env = "DOCPROC_SUMMARY")]
    summary: Option<PathBuf>,

    /// Print the run summary as JSON on stdout.
    #[arg(long, env = "DOCPROC_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCPROC_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCPROC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCPROC_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum OcrArg {
    Vision,
    Tesseract,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose asks for them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    let rules = RuleSet::load(&cli.rules)
        .with_context(|| format!("Failed to load rules from {}", cli.rules.display()))?;

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn RunProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let ocr: Arc<dyn OcrExtractor> = match cli.ocr {
        OcrArg::Vision => Arc::new(
            VisionOcrExtractor::from_config(&config).context("Vision OCR is not configured")?,
        ),
        OcrArg::Tesseract => {
            let tesseract = TesseractOcrExtractor::new(&config);
            if !tesseract.is_available().await {
                anyhow::bail!("tesseract binary not found on PATH");
            }
            Arc::new(tesseract)
        }
    };

    let mut run = ProcessRun::new(config);
    run.set_ocr_extractor(ocr);
    rules.apply(&mut run).context("Invalid rules")?;
    for input in &cli.inputs {
        run.enqueue(input);
    }

    let done = run.run().await;
    let summary = done.process_summary();

    if let Some(ref path) = cli.records {
        let sink = JsonLinesSink::new(path);
        let stored = done.persist(&sink).await.context("Failed to write records")?;
        if !cli.quiet {
            eprintln!("   {} records  →  {}", stored, bold(&path.display().to_string()));
        }
    }

    let json = summary.to_json_pretty().context("Failed to serialise summary")?;
    if let Some(ref path) = cli.summary {
        write_atomic(path, json.as_bytes())
            .await
            .context("Failed to write summary")?;
    }

    if cli.json {
        println!("{json}");
    } else if !cli.quiet {
        print_table(&summary);
    }

    if summary.overall_status == RunStatus::Aborted {
        anyhow::bail!("Run aborted: {}", summary.run_errors.join("; "));
    }
    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .concurrency(cli.concurrency)
        .dpi(cli.dpi)
        .snippet_len(cli.snippet_len)
        .max_retries(cli.max_retries)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout)
        .tesseract_language(cli.tesseract_lang.clone());

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_table(summary: &ProcessSummary) {
    for doc in &summary.documents {
        let status = doc.status.to_string();
        let status = match doc.status {
            DocumentStatus::Done => green(&status),
            DocumentStatus::Failed(_) => red(&status),
            _ => yellow(&status),
        };
        println!(
            "{}  {}  {}  {}",
            bold(&doc.source_locator),
            status,
            dim(doc.classified_type.as_deref().unwrap_or("-")),
            dim(&format!("{} errors", doc.errors.len()))
        );
        for (name, value) in &doc.extracted_fields {
            println!("    {name}: {value}");
        }
        for error in &doc.errors {
            println!("    {} {}", red("!"), error);
        }
        for warning in &doc.warnings {
            println!("    {} {}", yellow("~"), warning);
        }
    }
    println!(
        "{}  {}/{} processed  {} failed",
        summary.overall_status,
        summary.processed_count,
        summary.queued_count,
        summary.failed_count()
    );
}
