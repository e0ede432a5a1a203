//! CLI binary for office2pdf.
//!
//! `serve` runs the conversion server; `convert`, `download` and `status`
//! talk to a running one. A thin shim that maps flags onto the library's
//! config builders and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use office2pdf::pipeline::archive::ARCHIVE_NAME;
use office2pdf::{
    BatchProgressCallback, BatchQueue, ClientConfig, ConverterClient, ProgressCallback,
    ServerConfig,
};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
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
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per finished file. Files may finish
/// out of order when `--concurrency` is above 1.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>2}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Converting");
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

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_files} file(s)…"))
        ));
    }

    fn on_file_start(&self, index: usize, _total: usize, name: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_file_complete(&self, index: usize, total: usize, name: &str, pdf_size: u64) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:>2}/{:<2}  {}  {}  {}",
            green("✓"),
            index,
            total,
            name,
            dim(&human_size(pdf_size)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, total: usize, name: &str, error: &str) {
        let secs = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            let mut s: String = error.chars().take(79).collect();
            s.push('\u{2026}');
            s
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:>2}/{:<2}  {}  {}  {}",
            red("✗"),
            index,
            total,
            name,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        self.bar.finish_and_clear();
        if failed == 0 && success_count == total {
            eprintln!(
                "{} {} file(s) converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} file(s) converted  ({} failed)",
                if success_count == 0 { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Start the server on the default address (127.0.0.1:5000)
  office2pdf serve

  # Convert a batch and download the PDFs as one ZIP
  office2pdf convert deck.pptx memo.docx --zip -o out/

  # Fetch the outputs of jobs 3 and 4 from a running server
  office2pdf download 3 4 -o out/

  # Show every job the server knows about
  office2pdf status

ENVIRONMENT VARIABLES:
  SOFFICE_PATH            Path to the LibreOffice executable (skips the search)
  OFFICE2PDF_SERVER       Server URL used by convert/download/status
  RUST_LOG                Log filter, overrides --verbose/--quiet

SETUP:
  LibreOffice must be installed on the server machine:
    Debian/Ubuntu:  sudo apt install libreoffice
    macOS:          brew install --cask libreoffice
"#;

/// Convert PowerPoint and Word documents to PDF through LibreOffice.
#[derive(Parser, Debug)]
#[command(
    name = "office2pdf",
    version,
    about = "Convert PowerPoint and Word documents to PDF through LibreOffice",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "OFFICE2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "OFFICE2PDF_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the conversion server.
    Serve(ServeArgs),
    /// Upload local documents to a server and download the PDFs.
    Convert(ConvertArgs),
    /// Download finished PDFs by job id as one ZIP.
    Download(DownloadArgs),
    /// Show one job, or every job, on a server.
    Status(StatusArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Listen address.
    #[arg(long, env = "OFFICE2PDF_BIND", default_value = "127.0.0.1:5000")]
    bind: SocketAddr,

    /// Directory for uploaded documents.
    #[arg(long, env = "OFFICE2PDF_UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Directory for converted PDFs.
    #[arg(long, env = "OFFICE2PDF_OUTPUT_DIR", default_value = "converted")]
    output_dir: PathBuf,

    /// Parent directory for per-conversion scratch space.
    #[arg(long, env = "OFFICE2PDF_SCRATCH_DIR", default_value = "temp")]
    scratch_dir: PathBuf,

    /// LibreOffice executable (default: search SOFFICE_PATH, PATH, install dirs).
    #[arg(long, env = "OFFICE2PDF_SOFFICE")]
    soffice: Option<PathBuf>,

    /// Per-document conversion timeout in seconds.
    #[arg(long, env = "OFFICE2PDF_TIMEOUT", default_value_t = 60)]
    timeout: u64,

    /// Largest accepted upload in megabytes.
    #[arg(long, env = "OFFICE2PDF_MAX_UPLOAD_MB", default_value_t = 100)]
    max_upload_mb: u64,

    /// Delete uploads, outputs and finished jobs older than this many hours.
    #[arg(long, env = "OFFICE2PDF_RETENTION_HOURS", default_value_t = 24)]
    retention_hours: u64,

    /// Seconds between cleanup runs.
    #[arg(long, env = "OFFICE2PDF_SWEEP_INTERVAL", default_value_t = 3600)]
    sweep_interval: u64,
}

#[derive(Args, Debug)]
struct ClientArgs {
    /// Server base URL.
    #[arg(long, env = "OFFICE2PDF_SERVER", default_value = "http://127.0.0.1:5000")]
    server: String,

    /// Per-request timeout in seconds.
    #[arg(long, env = "OFFICE2PDF_REQUEST_TIMEOUT", default_value_t = 30)]
    request_timeout: u64,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Documents to convert (.ppt, .pptx, .doc, .docx).
    #[arg(required = true)]
    files: Vec<PathBuf>,

    #[command(flatten)]
    client: ClientArgs,

    /// Directory to save PDFs in.
    #[arg(short, long, env = "OFFICE2PDF_OUT_DIR", default_value = ".")]
    out_dir: PathBuf,

    /// Download all PDFs as converted_pdfs.zip instead of one by one.
    #[arg(long)]
    zip: bool,

    /// Files in flight at once.
    #[arg(short, long, env = "OFFICE2PDF_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Milliseconds to wait between submissions.
    #[arg(long, env = "OFFICE2PDF_PACING_MS", default_value_t = 500)]
    pacing_ms: u64,

    /// Disable progress bar.
    #[arg(long, env = "OFFICE2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Print the batch summary and files as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct DownloadArgs {
    /// Job ids whose PDFs to fetch.
    #[arg(required = true)]
    job_ids: Vec<u64>,

    #[command(flatten)]
    client: ClientArgs,

    /// Directory to save the ZIP in.
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,
}

#[derive(Args, Debug)]
struct StatusArgs {
    /// Job id; omit to list every job.
    job_id: Option<u64>,

    #[command(flatten)]
    client: ClientArgs,
}

impl ClientArgs {
    fn config(&self) -> office2pdf::ClientConfigBuilder {
        ClientConfig::builder()
            .server_url(&self.server)
            .request_timeout_secs(self.request_timeout)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs during `convert`.
    let show_progress = matches!(&cli.command, Command::Convert(a) if !a.no_progress && !a.json)
        && !cli.quiet;
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
        Command::Serve(args) => run_serve(args).await,
        Command::Convert(args) => run_convert(args, show_progress, cli.quiet).await,
        Command::Download(args) => run_download(args, cli.quiet).await,
        Command::Status(args) => run_status(args).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut builder = ServerConfig::builder()
        .bind(args.bind)
        .upload_dir(args.upload_dir)
        .output_dir(args.output_dir)
        .scratch_dir(args.scratch_dir)
        .conversion_timeout_secs(args.timeout)
        .max_upload_bytes(args.max_upload_mb.saturating_mul(1024 * 1024))
        .retention_secs(args.retention_hours.saturating_mul(3600))
        .sweep_interval_secs(args.sweep_interval);
    if let Some(path) = args.soffice {
        builder = builder.soffice_path(path);
    }
    let config = builder.build().context("Invalid configuration")?;
    office2pdf::serve(config).await.context("Server failed")
}

async fn run_convert(args: ConvertArgs, show_progress: bool, quiet: bool) -> Result<()> {
    let config = args
        .client
        .config()
        .concurrency(args.concurrency)
        .pacing_ms(args.pacing_ms)
        .build()
        .context("Invalid configuration")?;
    let queue = BatchQueue::new(config).context("Failed to create client")?;

    // ── Queue ────────────────────────────────────────────────────────────
    let added = queue.add_files(&args.files).await;
    if !quiet {
        for r in &added.rejected {
            eprintln!("{} {}: {}", red("✗"), r.path.display(), r.reason);
        }
        for w in &added.warnings {
            eprintln!("{} {}", cyan("⚠"), w);
        }
    }
    if added.added.is_empty() {
        anyhow::bail!("No files to convert");
    }

    // ── Submit ───────────────────────────────────────────────────────────
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let summary = queue.submit_all(progress).await;

    if args.json {
        let report = serde_json::json!({
            "summary": summary,
            "files": queue.files(),
            "converted": queue.converted(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise output")?
        );
    } else if !quiet && !show_progress {
        eprintln!(
            "Converted {}/{} file(s): {} failed, {} cancelled",
            summary.succeeded, summary.total, summary.failed, summary.cancelled
        );
        for f in queue.files() {
            if let Some(e) = &f.error {
                eprintln!("  {} {}", red("✗"), e);
            }
        }
    }

    // ── Download ─────────────────────────────────────────────────────────
    let converted = queue.converted();
    if converted.is_empty() {
        anyhow::bail!("No files were converted");
    }
    if args.zip {
        match queue.download_zip(&args.out_dir).await {
            Ok(path) => {
                if !quiet {
                    eprintln!("{} saved {}", green("✔"), bold(&path.display().to_string()));
                }
                return Ok(());
            }
            Err(e) => eprintln!("{} {}", cyan("⚠"), e),
        }
    }
    for file in &converted {
        let path = queue
            .download_file(file, &args.out_dir)
            .await
            .with_context(|| format!("Failed to download {}", file.name))?;
        if !quiet {
            eprintln!(
                "{} {}  {}",
                green("✔"),
                bold(&path.display().to_string()),
                dim(&human_size(file.pdf_size))
            );
        }
    }
    Ok(())
}

async fn run_download(args: DownloadArgs, quiet: bool) -> Result<()> {
    let config = args.client.config().build().context("Invalid configuration")?;
    let client = ConverterClient::new(&config).context("Failed to create client")?;
    let bytes = client
        .download_zip(&args.job_ids)
        .await
        .context("Failed to download ZIP")?;

    tokio::fs::create_dir_all(&args.out_dir)
        .await
        .with_context(|| format!("Failed to create {}", args.out_dir.display()))?;
    let dest = args.out_dir.join(ARCHIVE_NAME);
    tokio::fs::write(&dest, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", dest.display()))?;
    if !quiet {
        eprintln!(
            "{} saved {}  {}",
            green("✔"),
            bold(&dest.display().to_string()),
            dim(&human_size(bytes.len() as u64))
        );
    }
    Ok(())
}

async fn run_status(args: StatusArgs) -> Result<()> {
    let config = args.client.config().build().context("Invalid configuration")?;
    let client = ConverterClient::new(&config).context("Failed to create client")?;
    let json = match args.job_id {
        Some(id) => serde_json::to_string_pretty(&client.job(id).await.context("Lookup failed")?),
        None => serde_json::to_string_pretty(&client.jobs().await.context("Lookup failed")?),
    }
    .context("Failed to serialise output")?;
    println!("{json}");
    Ok(())
}
