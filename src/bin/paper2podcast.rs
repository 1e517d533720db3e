//! CLI binary for paper2podcast.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PodcastConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use paper2podcast::{
    generate_podcast, generate_podcast_to_file, generate_script, CancelFlag, PodcastConfig,
    PodcastLength, PodcastOutput, PodcastProgressCallback, ProgressCallback, Stage, Tone,
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

/// Terminal progress callback: one bar tracking overall percent, plus a log
/// line per finished step, dialog and failed line. Per-task hooks may fire
/// out of order when `--concurrency` is above 1.
struct CliProgressCallback {
    bar: ProgressBar,
    failed_lines: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold:>10}  [{bar:42.green/238}] {pos:>3}%  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        let bar = ProgressBar::new(100);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            failed_lines: AtomicUsize::new(0),
        })
    }
}

impl PodcastProgressCallback for CliProgressCallback {
    fn on_stage(&self, stage: Stage, percent: u8, message: &str) {
        self.bar.set_prefix(stage.to_string());
        self.bar.set_message(message.to_string());
        self.bar.set_position(percent as u64);
    }

    fn on_task_complete(&self, stage: Stage, index: usize, total: usize) {
        let what = match stage {
            Stage::Solve => "answered",
            Stage::Dialog => "scripted",
            _ => "done",
        };
        self.bar.println(format!(
            "  {} Step {:>3}/{:<3}  {}",
            green("✓"),
            index + 1,
            total,
            dim(what),
        ));
    }

    fn on_line_synthesised(&self, index: usize, total: usize) {
        self.bar.set_message(format!("line {}/{}", index + 1, total));
    }

    fn on_line_failed(&self, index: usize, total: usize, error: &str) {
        self.failed_lines.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Line {:>3}/{:<3}  {}",
            red("✗"),
            index + 1,
            total,
            red(&msg),
        ));
    }

    fn on_complete(&self, dialogs: usize, audio: bool) {
        self.bar.finish_and_clear();
        let failed = self.failed_lines.load(Ordering::SeqCst);
        if audio && failed == 0 {
            eprintln!(
                "{} {} dialog(s) narrated",
                green("✔"),
                bold(&dialogs.to_string())
            );
        } else if audio {
            eprintln!(
                "{} {} dialog(s) narrated  ({} line(s) failed)",
                cyan("⚠"),
                bold(&dialogs.to_string()),
                red(&failed.to_string()),
            );
        } else {
            eprintln!("{} {} dialog(s) scripted", cyan("◆"), bold(&dialogs.to_string()));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Generate an episode (path printed on stdout)
  paper2podcast paper.pdf

  # Write the episode to a file
  paper2podcast paper.pdf -o episode.wav

  # From a URL, chatty and a bit longer
  paper2podcast https://arxiv.org/pdf/1706.03762 --tone conversational --length medium

  # Scripts only, no TTS
  paper2podcast --script-only paper.pdf

  # Everything as JSON
  paper2podcast --json paper.pdf > run.json

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY               Google Gemini API key (preferred when set)
  OPENAI_API_KEY               OpenAI API key
  ANTHROPIC_API_KEY            Anthropic API key (via auto-detection)
  PAPER2PODCAST_LLM_PROVIDER   Override provider (gemini, openai, anthropic, ollama)
  PAPER2PODCAST_MODEL          Override model ID
  PDFIUM_LIB_PATH              Directory containing libpdfium
  RUST_LOG                     Log filter, e.g. paper2podcast=debug

A .env file in the working directory is loaded on startup.
"#;

/// Turn research-paper PDFs into two-speaker podcasts.
#[derive(Parser, Debug)]
#[command(
    name = "paper2podcast",
    version,
    about = "Turn research-paper PDFs into two-speaker podcasts",
    long_about = "Reads a research paper (local PDF or URL) with a vision LLM, plans it as a \
series of steps, scripts each step as a conversation between a host and a guest expert, \
voices the script with a hosted TTS model and writes one WAV episode.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write the episode to this file instead of the work directory.
    #[arg(short, long, env = "PAPER2PODCAST_OUTPUT")]
    output: Option<PathBuf>,

    /// Dialog tone.
    #[arg(long, env = "PAPER2PODCAST_TONE", value_enum, default_value = "formal")]
    tone: ToneArg,

    /// Length of each dialog segment.
    #[arg(long, env = "PAPER2PODCAST_LENGTH", value_enum, default_value = "short")]
    length: LengthArg,

    /// Output language for the dialog and TTS.
    #[arg(long, env = "PAPER2PODCAST_LANGUAGE", default_value = "EN")]
    language: String,

    /// LLM model ID (e.g. gemini-1.5-flash, gpt-4.1-mini).
    #[arg(long, env = "PAPER2PODCAST_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama.
    #[arg(
        long,
        env = "PAPER2PODCAST_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: gemini, openai, anthropic, ollama, or any provider edgequake-llm knows."
    )]
    provider: Option<String>,

    /// Parallel LLM calls in the solve and dialog stages.
    #[arg(short, long, env = "PAPER2PODCAST_CONCURRENCY", default_value_t = 1,
          value_parser = clap::value_parser!(u32).range(1..=32))]
    concurrency: u32,

    /// Print the dialog scripts and skip narration.
    #[arg(long, env = "PAPER2PODCAST_SCRIPT_ONLY")]
    script_only: bool,

    /// Output structured JSON (PodcastOutput) instead of text.
    #[arg(long, env = "PAPER2PODCAST_JSON")]
    json: bool,

    /// Scratch directory for clips, bumpers and episodes.
    #[arg(long, env = "PAPER2PODCAST_WORK_DIR", default_value = "temp")]
    work_dir: PathBuf,

    /// Base URL of the Gradio TTS space.
    #[arg(long, env = "PAPER2PODCAST_TTS_ENDPOINT")]
    tts_endpoint: Option<String>,

    /// Path to a text file containing a custom dialog system prompt.
    #[arg(long, env = "PAPER2PODCAST_DIALOG_PROMPT")]
    dialog_prompt: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PAPER2PODCAST_PASSWORD")]
    password: Option<String>,

    /// Retries per LLM call on failure.
    #[arg(long, env = "PAPER2PODCAST_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PAPER2PODCAST_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Per-LLM-call timeout in seconds.
    #[arg(long, env = "PAPER2PODCAST_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PAPER2PODCAST_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "PAPER2PODCAST_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PAPER2PODCAST_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PAPER2PODCAST_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ToneArg {
    Formal,
    Conversational,
}

impl From<ToneArg> for Tone {
    fn from(v: ToneArg) -> Self {
        match v {
            ToneArg::Formal => Tone::Formal,
            ToneArg::Conversational => Tone::Conversational,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LengthArg {
    Short,
    Medium,
}

impl From<LengthArg> for PodcastLength {
    fn from(v: LengthArg) -> Self {
        match v {
            LengthArg::Short => PodcastLength::Short,
            LengthArg::Medium => PodcastLength::Medium,
        }
    }
}

#[tokio::main]
async fn main() {
    // A missing .env is the normal case.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("{} {}", red("error:"), err);
        for cause in err.chain().skip(1) {
            eprintln!("  {} {}", dim("caused by:"), cause);
        }
        eprintln!("Check your input PDF and try again.");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
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

    // ── Cancellation ─────────────────────────────────────────────────────
    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{}", dim("Cancelling after the current step…"));
                cancel.cancel();
            }
        });
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PodcastProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb, cancel).await?;

    // ── Run ──────────────────────────────────────────────────────────────
    if cli.script_only {
        let output = generate_script(&cli.input, &config)
            .await
            .context("Script generation failed")?;
        if cli.json {
            print_json(&output)?;
        } else {
            print_scripts(&output, &config)?;
        }
        return Ok(());
    }

    let output = match &cli.output {
        Some(path) => generate_podcast_to_file(&cli.input, path, &config)
            .await
            .context("Podcast generation failed")?,
        None => generate_podcast(&cli.input, &config)
            .await
            .context("Podcast generation failed")?,
    };

    if cli.json {
        print_json(&output)?;
    } else {
        match &output.audio_path {
            Some(path) => println!("{}", path.display()),
            None => eprintln!(
                "{} no line produced audio; nothing was written",
                cyan("⚠")
            ),
        }
    }

    if !cli.quiet && !cli.json {
        let stats = &output.stats;
        eprintln!(
            "   {} step(s)  {}/{} line(s) voiced  {:.1}s of audio  {}ms total",
            stats.steps,
            stats.lines_synthesised,
            stats.lines_total,
            stats.audio_duration_ms as f64 / 1000.0,
            stats.total_duration_ms,
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out  over {} call(s)",
            dim(&stats.llm.input_tokens.to_string()),
            dim(&stats.llm.output_tokens.to_string()),
            stats.llm.calls,
        );
    }

    Ok(())
}

fn print_json(output: &PodcastOutput) -> Result<()> {
    let json = serde_json::to_string_pretty(output).context("Failed to serialise output")?;
    println!("{json}");
    Ok(())
}

fn print_scripts(output: &PodcastOutput, config: &PodcastConfig) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    for dialog in &output.dialogs {
        let script = dialog.script.to_text(&config.host, &config.guest);
        writeln!(
            handle,
            "## {}. {}\n\n{}\n",
            dialog.index + 1,
            dialog.step.description,
            script
        )
        .context("Failed to write to stdout")?;
    }
    Ok(())
}

/// Map CLI args to `PodcastConfig`.
async fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
    cancel: CancelFlag,
) -> Result<PodcastConfig> {
    let mut builder = PodcastConfig::builder()
        .tone(cli.tone.into())
        .length(cli.length.into())
        .language(cli.language.clone())
        .concurrency(cli.concurrency as usize)
        .work_dir(cli.work_dir.clone())
        .max_retries(cli.max_retries)
        .temperature(cli.temperature)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .cancel_flag(cancel);

    if let Some(ref path) = cli.dialog_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read dialog prompt from {:?}", path))?;
        builder = builder.dialog_prompt(prompt);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref endpoint) = cli.tts_endpoint {
        builder = builder.tts_endpoint(endpoint.clone());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
