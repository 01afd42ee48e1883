//! CLI binary for edgequake-receipts.
//!
//! A thin shim over the library crate: `scan` runs a batch of inputs through
//! one session and exports the result, `shell` drives a session interactively.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_receipts::{
    export_workbook, render_history, render_receipt, AttemptError, CameraStream, Event,
    ObserverRef, Receipt, ScanObserver, Scanner, ScannerConfig, Session, ViewState,
    DEFAULT_EXPORT_FILE,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
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

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Shows a spinner while a receipt is being analysed and a one-line result
/// afterwards.
struct CliObserver {
    spinner: Mutex<Option<ProgressBar>>,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            spinner: Mutex::new(None),
        })
    }

    fn stop(&self) {
        if let Some(bar) = self.spinner.lock().unwrap().take() {
            bar.finish_and_clear();
        }
    }
}

impl ScanObserver for CliObserver {
    fn on_extraction_start(&self, media_type: &str, encoded_len: usize) {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Analyzing");
        bar.set_message(format!("{media_type}, {} KiB", encoded_len / 1024));
        bar.enable_steady_tick(Duration::from_millis(80));
        if let Some(old) = self.spinner.lock().unwrap().replace(bar) {
            old.finish_and_clear();
        }
    }

    fn on_extraction_complete(&self, receipt: &Receipt, elapsed_ms: u64) {
        self.stop();
        eprintln!(
            "{} {}  {}",
            green("✓"),
            bold(receipt.merchant.as_deref().unwrap_or("Receipt")),
            dim(&format!(
                "{} items, {:.1}s",
                receipt.items.len(),
                elapsed_ms as f64 / 1000.0
            )),
        );
    }

    fn on_attempt_error(&self, _error: &AttemptError) {
        self.stop();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Scan two receipts and export them
  receipts scan lunch.jpg groceries.pdf -o april.xlsx

  # Scan from a URL and print JSON
  receipts scan https://example.com/receipt.png --json

  # Interactive session (camera, review, export)
  receipts shell

SHELL COMMANDS:
  camera              open the camera
  snap                capture the current frame and analyse it
  cancel              close the camera
  file <path|url>     analyse an image (JPG, PNG) or PDF (first page)
  accept              add the reviewed receipt to history
  retry               discard the reviewed receipt
  history             show history and running total
  export [path]       write history to an .xlsx workbook
  dismiss             clear the error message
  help | quit

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default provider)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
"#;

/// Scan receipts with Vision LLMs and export them to Excel.
#[derive(Parser, Debug)]
#[command(
    name = "receipts",
    version,
    about = "Scan receipts with Vision LLMs and export them to Excel",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    opts: GlobalOpts,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan inputs one after another, accept every success and export.
    Scan {
        /// Image or PDF paths, HTTP/HTTPS URLs or data URLs.
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Workbook to write.
        #[arg(short, long, env = "RECEIPTS_OUTPUT", default_value = DEFAULT_EXPORT_FILE)]
        output: PathBuf,

        /// Print the accepted receipts as JSON instead of the history table.
        #[arg(long, env = "RECEIPTS_JSON")]
        json: bool,
    },
    /// Interactive session: camera, file, review, history and export.
    Shell {
        /// Default workbook for `export`.
        #[arg(short, long, env = "RECEIPTS_OUTPUT", default_value = DEFAULT_EXPORT_FILE)]
        output: PathBuf,
    },
}

#[derive(Args, Debug)]
struct GlobalOpts {
    /// LLM provider: gemini, openai, anthropic, ollama, ...
    #[arg(long, global = true, env = "RECEIPTS_PROVIDER")]
    provider: Option<String>,

    /// Vision model ID (default: the provider's vision model).
    #[arg(long, global = true, env = "RECEIPTS_MODEL")]
    model: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "RECEIPTS_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max tokens for the JSON answer.
    #[arg(long, global = true, env = "RECEIPTS_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// Scale factor for rendering the first PDF page.
    #[arg(long, global = true, env = "RECEIPTS_PDF_SCALE", default_value_t = 2.0)]
    pdf_scale: f32,

    /// JPEG quality for PDF pages and camera frames (1–100).
    #[arg(long, global = true, env = "RECEIPTS_JPEG_QUALITY", default_value_t = 92)]
    jpeg_quality: u8,

    /// Path to a text file with a custom extraction instruction.
    #[arg(long, global = true, env = "RECEIPTS_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Extraction timeout in seconds (default: none).
    #[arg(long, global = true, env = "RECEIPTS_API_TIMEOUT")]
    api_timeout: Option<u64>,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, env = "RECEIPTS_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Video device used by the camera.
    #[arg(long, global = true, env = "RECEIPTS_CAMERA_DEVICE", default_value = "/dev/video0")]
    camera_device: PathBuf,

    /// Frame grabber executable.
    #[arg(long, global = true, env = "RECEIPTS_CAMERA_PROGRAM", default_value = "ffmpeg")]
    camera_program: String,

    /// Disable the spinner.
    #[arg(long, global = true, env = "RECEIPTS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "RECEIPTS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, global = true, env = "RECEIPTS_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let opts = &cli.opts;

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if opts.verbose {
        "debug"
    } else if opts.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let json = matches!(cli.command, Command::Scan { json: true, .. });
    let observer: Option<ObserverRef> = if opts.quiet || opts.no_progress || json {
        None
    } else {
        Some(CliObserver::new() as ObserverRef)
    };

    let config = build_config(opts, observer).await?;
    let scanner = Scanner::from_config(config).context("Cannot start the scanner")?;

    match cli.command {
        Command::Scan {
            ref inputs,
            ref output,
            json,
        } => run_scan(&scanner, inputs, output, json, opts.quiet).await,
        Command::Shell { ref output } => run_shell(&scanner, output).await,
    }
}

/// Map CLI args to `ScannerConfig`.
async fn build_config(opts: &GlobalOpts, observer: Option<ObserverRef>) -> Result<ScannerConfig> {
    let mut builder = ScannerConfig::builder()
        .temperature(opts.temperature)
        .max_tokens(opts.max_tokens)
        .pdf_scale(opts.pdf_scale)
        .jpeg_quality(opts.jpeg_quality)
        .download_timeout_secs(opts.download_timeout)
        .camera_device(opts.camera_device.clone())
        .camera_program(opts.camera_program.clone());

    if let Some(ref name) = opts.provider {
        builder = builder.provider_name(name.clone());
    }
    if let Some(ref model) = opts.model {
        builder = builder.model(model.clone());
    }
    if let Some(secs) = opts.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if let Some(ref path) = opts.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(obs) = observer {
        builder = builder.observer(obs);
    }

    builder.build().context("Invalid configuration")
}

// ── Batch mode ───────────────────────────────────────────────────────────────

async fn run_scan(
    scanner: &Scanner,
    inputs: &[String],
    output: &Path,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let mut session = Session::new();
    let mut failed = 0usize;

    for input in inputs {
        session = scanner.analyze_input(session, input).await;

        if let Some(err) = session.error() {
            failed += 1;
            eprintln!("{} {}  {}", red("✗"), input, red(&err.to_string()));
            session = scanner.transition(session, Event::DismissError);
            continue;
        }
        if session.state() == ViewState::Reviewing {
            session = scanner.transition(session, Event::Accept);
        }
    }

    if json {
        let out = serde_json::to_string_pretty(session.history())
            .context("Failed to serialise receipts")?;
        println!("{out}");
    } else if !quiet {
        println!("{}", render_history(session.history()));
    }

    if let Some(stats) = export_workbook(session.history(), output).context("Export failed")? {
        if !quiet {
            eprintln!(
                "{}  {} receipts  →  {}",
                green("✔"),
                stats.receipts,
                bold(&stats.path.display().to_string()),
            );
        }
    }

    if session.history().is_empty() && failed > 0 {
        anyhow::bail!("No receipt could be extracted ({failed} failed)");
    }
    if failed > 0 && !quiet {
        eprintln!("{} {} of {} inputs failed", cyan("⚠"), failed, inputs.len());
    }
    Ok(())
}

// ── Interactive shell ────────────────────────────────────────────────────────

struct Shell<'a> {
    scanner: &'a Scanner,
    session: Session,
    stream: Option<Box<dyn CameraStream>>,
    default_output: PathBuf,
}

impl Shell<'_> {
    fn apply(&mut self, event: Event) {
        if !self.session.accepts(&event) {
            eprintln!("{}", dim(&format!("Not available while {:?}.", self.session.state())));
            return;
        }
        let session = std::mem::take(&mut self.session);
        self.session = self.scanner.transition(session, event);
    }

    /// Returns `false` when the shell should exit.
    async fn dispatch(&mut self, line: &str) -> Result<bool> {
        let (cmd, arg) = match line.split_once(char::is_whitespace) {
            Some((c, a)) => (c, a.trim()),
            None => (line, ""),
        };

        match cmd {
            "" => {}
            "camera" => {
                let session = std::mem::take(&mut self.session);
                let (session, stream) = self.scanner.open_camera(session).await;
                self.session = session;
                if stream.is_some() {
                    self.stream = stream;
                    println!("Camera open. Type {} to capture or {}.", bold("snap"), bold("cancel"));
                }
            }
            "snap" => match self.stream.take() {
                Some(stream) => {
                    let session = std::mem::take(&mut self.session);
                    self.session = self.scanner.capture(session, stream).await;
                }
                None => eprintln!("{}", dim("Camera is not open.")),
            },
            "cancel" => match self.stream.take() {
                Some(stream) => {
                    let session = std::mem::take(&mut self.session);
                    self.session = self.scanner.cancel_camera(session, stream);
                }
                None => eprintln!("{}", dim("Camera is not open.")),
            },
            "file" => {
                if arg.is_empty() {
                    eprintln!("usage: file <path|url|data-url>");
                } else if self.session.state() != ViewState::Home {
                    eprintln!("{}", dim(&format!("Not available while {:?}.", self.session.state())));
                } else {
                    let session = std::mem::take(&mut self.session);
                    self.session = self.scanner.analyze_input(session, arg).await;
                }
            }
            "accept" => self.apply(Event::Accept),
            "retry" => self.apply(Event::Discard),
            "dismiss" => self.apply(Event::DismissError),
            "history" => println!("{}", render_history(self.session.history())),
            "export" => {
                let path = if arg.is_empty() {
                    self.default_output.clone()
                } else {
                    PathBuf::from(arg)
                };
                match export_workbook(self.session.history(), &path) {
                    Ok(Some(stats)) => println!(
                        "{}  {} receipts  →  {}",
                        green("✔"),
                        stats.receipts,
                        bold(&stats.path.display().to_string())
                    ),
                    Ok(None) => println!("{}", dim("Nothing to export yet.")),
                    Err(e) => eprintln!("{} {}", red("✗"), e),
                }
            }
            "help" | "?" => print!("{}", SHELL_HELP),
            "quit" | "exit" | "q" => return Ok(false),
            other => eprintln!("Unknown command '{other}'. Type {} for commands.", bold("help")),
        }
        Ok(true)
    }

    fn show(&self) {
        if let Some(msg) = self.session.error_message() {
            println!("{} {}  {}", red("✗"), red(&msg), dim("(dismiss)"));
        }
        if let (ViewState::Reviewing, Some(receipt)) = (self.session.state(), self.session.current()) {
            println!("\n{}", render_receipt(receipt));
            println!("{} or {}?", bold("accept"), bold("retry"));
        }
    }

    fn prompt(&self) -> String {
        let state = match self.session.state() {
            ViewState::Home => "home",
            ViewState::Capturing => "camera",
            ViewState::Analyzing => "analyzing",
            ViewState::Reviewing => "review",
        };
        format!("{} {} ", cyan(&format!("receipts[{state}]")), dim(&format!("({})", self.session.history().len())))
    }
}

const SHELL_HELP: &str = "\
  camera              open the camera
  snap                capture and analyse
  cancel              close the camera
  file <path|url>     analyse an image or PDF
  accept              add the receipt to history
  retry               discard the receipt
  history             show history and running total
  export [path]       write the .xlsx workbook
  dismiss             clear the error message
  quit
";

async fn run_shell(scanner: &Scanner, output: &Path) -> Result<()> {
    let mut shell = Shell {
        scanner,
        session: Session::new(),
        stream: None,
        default_output: output.to_path_buf(),
    };
    println!("{}", bold("Receipt scanner. Type 'help' for commands."));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{}", shell.prompt());
        io::stdout().flush().ok();

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        if !shell.dispatch(line.trim()).await? {
            break;
        }
        shell.show();
    }

    if !shell.session.history().is_empty() {
        println!("{}", render_history(shell.session.history()));
    }
    Ok(())
}
