//! CLI binary for fileconv-gateway.
//!
//! Drives the gateway from the terminal: the "upload" is a local file, the
//! "chat" is stderr, and delivery writes the converted file into an output
//! directory.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::Parser;
use fileconv_gateway::{
    Action, Artifact, DeliveryError, Gateway, GatewayConfig, JobOutcome, JobStatus, MessageRef,
    Transport, UserId,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
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

/// The single local "user".
const CONSOLE_USER: UserId = 0;

// ── Console transport ────────────────────────────────────────────────────────

/// Shows status on a spinner and writes delivered files to `out_dir`.
struct ConsoleTransport {
    out_dir: PathBuf,
    bar: Option<ProgressBar>,
    quiet: bool,
    delivered: Mutex<Option<PathBuf>>,
}

impl ConsoleTransport {
    fn new(out_dir: PathBuf, show_progress: bool, quiet: bool) -> Self {
        let bar = show_progress.then(|| {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner:.cyan} {msg}  {elapsed:.dim}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
            );
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        Self {
            out_dir,
            bar,
            quiet,
            delivered: Mutex::new(None),
        }
    }

    fn delivered_path(&self) -> Option<PathBuf> {
        self.delivered.lock().ok().and_then(|slot| slot.clone())
    }

    fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    async fn update_status(
        &self,
        _user: UserId,
        _message: &MessageRef,
        status: &JobStatus,
    ) -> Result<(), DeliveryError> {
        let text = status.to_string();
        match (&self.bar, status.is_error()) {
            (Some(bar), true) => bar.println(red(&text)),
            (Some(bar), false) => bar.set_message(text),
            (None, _) if !self.quiet => eprintln!("{text}"),
            (None, _) => {}
        }
        Ok(())
    }

    async fn deliver(&self, _user: UserId, artifact: Artifact) -> Result<(), DeliveryError> {
        tokio::fs::create_dir_all(&self.out_dir)
            .await
            .map_err(|e| DeliveryError::new(format!("create {}: {e}", self.out_dir.display())))?;

        // Atomic write: write to temp, then rename
        let path = self.out_dir.join(&artifact.filename);
        let mut tmp_name = artifact.filename.clone();
        tmp_name.push_str(".tmp");
        let tmp_path = self.out_dir.join(tmp_name);
        tokio::fs::write(&tmp_path, &artifact.bytes)
            .await
            .map_err(|e| DeliveryError::new(format!("write {}: {e}", tmp_path.display())))?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(DeliveryError::new(format!("rename to {}: {e}", path.display())));
        }

        if let Ok(mut slot) = self.delivered.lock() {
            *slot = Some(path);
        }
        Ok(())
    }
}

// ── CLI ──────────────────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Show the conversions offered for a file
  fileconv report.pdf

  # Convert PDF to Word into ./out
  fileconv report.pdf --action pdf_to_docx -o out

  # Treat a picture as a photo upload (named image.jpg)
  fileconv --photo scan.jpg --action image_to_word

  # JSON outcome for scripting
  fileconv sheet.xlsx --action excel_to_pdf --json

  # List every action
  fileconv --list-actions

  # Remove orphaned temp files and exit
  fileconv --sweep

EXTERNAL TOOLS:
  pdf_to_docx, pdf_to_image       pdfium shared library (PDFIUM_LIB_PATH or system)
  docx_to_*, excel_to_*           libreoffice on PATH
  image_to_word, image_to_excel   tesseract on PATH
"#;

/// Convert documents and images between PDF, Word, Excel and image formats.
#[derive(Parser, Debug)]
#[command(
    name = "fileconv",
    version,
    about = "Convert documents and images between PDF, Word, Excel and image formats",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// File to convert.
    #[arg(required_unless_present_any = ["list_actions", "sweep"])]
    input: Option<PathBuf>,

    /// Action id (e.g. pdf_to_docx). Without it, the menu is printed.
    #[arg(short, long)]
    action: Option<String>,

    /// Directory the converted file is written to.
    #[arg(short, long = "output-dir", env = "FILECONV_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Stage the input as a photo upload.
    #[arg(long)]
    photo: bool,

    /// Print every supported action and exit.
    #[arg(long)]
    list_actions: bool,

    /// Run one maintenance sweep over the temp directory and exit.
    #[arg(long)]
    sweep: bool,

    /// Output structured JSON instead of text.
    #[arg(long, env = "FILECONV_JSON")]
    json: bool,

    /// Temp directory for staged uploads and outputs.
    #[arg(long, env = "FILECONV_TEMP_ROOT")]
    temp_root: Option<PathBuf>,

    /// Office-suite executable.
    #[arg(long, env = "FILECONV_OFFICE_COMMAND", default_value = "libreoffice")]
    office_command: String,

    /// OCR executable.
    #[arg(long, env = "FILECONV_OCR_COMMAND", default_value = "tesseract")]
    ocr_command: String,

    /// OCR language code.
    #[arg(long, env = "FILECONV_OCR_LANGUAGE", default_value = "eng")]
    ocr_language: String,

    /// Per-process timeout in seconds.
    #[arg(long, env = "FILECONV_PROCESS_TIMEOUT", default_value_t = 120)]
    process_timeout: u64,

    /// Pixel width for PDF → PNG rendering (200–8000).
    #[arg(long, env = "FILECONV_PDF_RENDER_WIDTH", default_value_t = 1600,
          value_parser = clap::value_parser!(u32).range(200..=8000))]
    pdf_render_width: u32,

    /// Path to the pdfium shared library.
    #[arg(long, env = "FILECONV_PDFIUM_LIBRARY")]
    pdfium_library: Option<PathBuf>,

    /// Seconds a staged upload may wait for an action.
    #[arg(long, env = "FILECONV_SESSION_TTL", default_value_t = 3600)]
    session_ttl: u64,

    /// Age in seconds after which unowned temp entries are swept.
    #[arg(long, env = "FILECONV_ORPHAN_MAX_AGE", default_value_t = 7200)]
    orphan_max_age: u64,

    /// Seconds between maintenance sweeps.
    #[arg(long, env = "FILECONV_SWEEP_INTERVAL", default_value_t = 600)]
    sweep_interval: u64,

    /// Disable the progress spinner.
    #[arg(long, env = "FILECONV_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FILECONV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "FILECONV_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && cli.action.is_some();
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

    if cli.list_actions {
        return list_actions(cli.json);
    }

    let config = build_config(&cli)?;
    let transport = Arc::new(ConsoleTransport::new(
        cli.output_dir.clone(),
        show_progress,
        cli.quiet,
    ));
    let gateway = Gateway::new(config, transport.clone());

    if cli.sweep {
        let report = gateway.sweep_once().await;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else if !cli.quiet {
            eprintln!(
                "{} removed {} orphaned temp entries from {}",
                green("✔"),
                report.files_removed,
                gateway.temp().root().display()
            );
        }
        return Ok(());
    }

    let Some(input) = cli.input.as_deref() else {
        bail!("No input file given");
    };
    let message = MessageRef::new("console");

    // ── Stage ────────────────────────────────────────────────────────────
    let file = tokio::fs::File::open(input)
        .await
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let staged = if cli.photo {
        gateway
            .on_photo_received(CONSOLE_USER, message.clone(), file)
            .await
    } else {
        gateway
            .on_file_received(CONSOLE_USER, message.clone(), file, &display_name(input))
            .await
    }
    .context("Upload rejected")?;

    // ── Menu only ────────────────────────────────────────────────────────
    let Some(action) = cli.action.as_deref() else {
        gateway.cancel(CONSOLE_USER).await;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&staged)?);
        } else {
            println!("{} ({})", bold(&display_name(input)), staged.category);
            for choice in &staged.choices {
                println!("  {:<16} {}", choice.id, dim(&choice.label));
            }
        }
        return Ok(());
    };

    // ── Convert ──────────────────────────────────────────────────────────
    let outcome = gateway
        .on_action_selected(CONSOLE_USER, message, action)
        .await;
    transport.finish();
    let outcome = outcome.with_context(|| format!("Cannot run '{action}'"))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }

    match &outcome {
        JobOutcome::Delivered { size, .. } => {
            if !cli.quiet && !cli.json {
                let path = transport.delivered_path().unwrap_or_default();
                eprintln!(
                    "{}  {}  {}",
                    green("✔"),
                    bold(&path.display().to_string()),
                    dim(&format!("{size} bytes"))
                );
            }
            Ok(())
        }
        JobOutcome::ConversionFailed => bail!("Conversion failed"),
        JobOutcome::DeliveryFailed { reason } => bail!("Could not write result: {reason}"),
    }
}

/// Map CLI args to `GatewayConfig`.
fn build_config(cli: &Cli) -> Result<GatewayConfig> {
    let mut builder = GatewayConfig::builder()
        .office_command(&cli.office_command)
        .ocr_command(&cli.ocr_command)
        .ocr_language(&cli.ocr_language)
        .process_timeout_secs(cli.process_timeout)
        .pdf_render_width(cli.pdf_render_width)
        .session_ttl_secs(cli.session_ttl)
        .orphan_max_age_secs(cli.orphan_max_age)
        .sweep_interval_secs(cli.sweep_interval);

    if let Some(ref root) = cli.temp_root {
        builder = builder.temp_root(root);
    }
    if let Some(ref lib) = cli.pdfium_library {
        builder = builder.pdfium_library(lib);
    }

    builder.build().context("Invalid configuration")
}

fn list_actions(json: bool) -> Result<()> {
    if json {
        let rows: Vec<_> = Action::ALL
            .iter()
            .map(|a| {
                serde_json::json!({
                    "id": a.id(),
                    "label": a.label(),
                    "category": a.category(),
                    "output_extension": a.output_extension(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    for action in Action::ALL {
        println!(
            "{:<16} {:<20} {:<6} → .{}",
            action.id(),
            action.label(),
            action.category(),
            action.output_extension()
        );
    }
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
