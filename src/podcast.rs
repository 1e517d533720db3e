//! Eager (whole-episode) entry points.
//!
//! ## Why eager vs. streaming?
//!
//! This module provides the simpler API: wait for the run to finish, then
//! return the scripts, per-line outcomes and the episode path together. Use
//! [`crate::stream::podcast_events`] instead to observe dialogs and clips as
//! they are produced.
//!
//! ## Failure model
//!
//! Input, PDF and LLM errors are fatal. TTS failures are not: each failed
//! line is recorded in [`PodcastOutput::lines`] and narration moves on. A run
//! where no line produced audio still returns `Ok` with `audio_path: None`;
//! only [`generate_podcast_to_file`], which promises a file, turns that into
//! [`PodcastError::NoAudio`].

use crate::audio::assemble::{assemble, AssemblyReport};
use crate::audio::synth::{Synthesis, Synthesizer};
use crate::audio::tts::{GradioSpeech, SpeechBackend};
use crate::config::PodcastConfig;
use crate::error::PodcastError;
use crate::output::{LineOutcome, LineReport, PodcastOutput, PodcastStats};
use crate::pipeline::llm::{ChatModel, LlmClient, ProviderModel};
use crate::pipeline::orchestrator::Orchestrator;
use crate::pipeline::state::StepDialog;
use crate::pipeline::{encode, input, render, Stage};
use crate::stream::PipelineEvent;
use edgequake_llm::{ImageData, ProviderFactory};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Environment variable naming the LLM provider, paired with [`MODEL_ENV`].
pub const PROVIDER_ENV: &str = "PAPER2PODCAST_LLM_PROVIDER";
/// Environment variable naming the LLM model, paired with [`PROVIDER_ENV`].
pub const MODEL_ENV: &str = "PAPER2PODCAST_MODEL";

/// Generate a podcast episode from a PDF file or URL.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(PodcastOutput)` once every stage has run, even if some lines failed
/// to synthesise (see `output.stats.lines_failed`).
///
/// # Errors
/// Returns `Err(PodcastError)` only for fatal errors:
/// - File not found, not a PDF, unreadable or without renderable pages
/// - No LLM provider configured
/// - An LLM call failed after all retries
/// - The run was cancelled
pub async fn generate_podcast(
    input: impl AsRef<str>,
    config: &PodcastConfig,
) -> Result<PodcastOutput, PodcastError> {
    run_from_input(input.as_ref(), config, true, None).await
}

/// Generate only the dialog scripts; no TTS call is made.
///
/// The returned output has no `lines` and `audio_path: None`.
pub async fn generate_script(
    input: impl AsRef<str>,
    config: &PodcastConfig,
) -> Result<PodcastOutput, PodcastError> {
    run_from_input(input.as_ref(), config, false, None).await
}

/// Generate a podcast from pages that are already encoded.
///
/// Skips input resolution and rendering; useful when the caller has page
/// images from another source, or does not have libpdfium available.
pub async fn generate_podcast_from_images(
    images: Vec<ImageData>,
    config: &PodcastConfig,
) -> Result<PodcastOutput, PodcastError> {
    run_from_images(images, config, true, None).await
}

/// Generate a podcast from PDF bytes in memory.
///
/// The bytes are written to a managed [`tempfile`] that is removed when the
/// run returns.
///
/// # Example
/// ```rust,no_run
/// use paper2podcast::{generate_podcast_from_bytes, PodcastConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes: Vec<u8> = std::fs::read("paper.pdf")?;
/// let output = generate_podcast_from_bytes(&bytes, &PodcastConfig::default()).await?;
/// println!("{:?}", output.audio_path);
/// # Ok(())
/// # }
/// ```
pub async fn generate_podcast_from_bytes(
    bytes: &[u8],
    config: &PodcastConfig,
) -> Result<PodcastOutput, PodcastError> {
    let mut tmp = tempfile::Builder::new()
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| PodcastError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| PodcastError::Internal(format!("tempfile write: {e}")))?;
    let path = tmp.path().to_string_lossy().to_string();
    // `tmp` is dropped (and the file deleted) when the run returns
    generate_podcast(&path, config).await
}

/// Generate a podcast and write the episode to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files. Fails
/// with [`PodcastError::NoAudio`] when no line produced audio.
pub async fn generate_podcast_to_file(
    input: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &PodcastConfig,
) -> Result<PodcastOutput, PodcastError> {
    let mut output = generate_podcast(input, config).await?;
    let path = output_path.as_ref();
    let episode = output.audio_path.clone().ok_or(PodcastError::NoAudio {
        lines: output.lines.len(),
    })?;

    let write_err = |e| PodcastError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let tmp_path = path.with_extension("wav.tmp");
    tokio::fs::copy(&episode, &tmp_path).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    info!("Episode written to {}", path.display());
    output.audio_path = Some(path.to_path_buf());
    Ok(output)
}

/// Synchronous wrapper around [`generate_podcast`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_podcast_sync(
    input: impl AsRef<str>,
    config: &PodcastConfig,
) -> Result<PodcastOutput, PodcastError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PodcastError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate_podcast(input, config))
}

/// Per-line reports and the assembled episode.
#[derive(Debug, Clone, Default)]
pub struct Narration {
    /// One report per script line, in script order.
    pub lines: Vec<LineReport>,
    pub assembly: AssemblyReport,
}

/// Synthesise every line of `dialogs` in order and assemble the episode.
///
/// Useful to re-narrate scripts from an earlier [`generate_script`] run.
pub async fn narrate(
    dialogs: &[StepDialog],
    config: &PodcastConfig,
) -> Result<Narration, PodcastError> {
    let synth = Synthesizer::new(resolve_speech_backend(config)?, config);
    narrate_with(dialogs, &synth, config, &Events(None)).await
}

// ── Internal run ─────────────────────────────────────────────────────────

/// Optional event sink shared by the run's stages.
struct Events(Option<mpsc::Sender<PipelineEvent>>);

impl Events {
    async fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.0 {
            let _ = tx.send(event).await;
        }
    }

    /// Stage boundary: honour cancellation, then report the stage.
    async fn begin(
        &self,
        config: &PodcastConfig,
        stage: Stage,
        percent: u8,
        message: &str,
    ) -> Result<(), PodcastError> {
        if config.is_cancelled() {
            info!("Cancelled before {}", stage);
            return Err(PodcastError::Cancelled { stage });
        }
        info!("Stage {}: {}", stage, message);
        if let Some(cb) = &config.progress_callback {
            cb.on_stage(stage, percent, message);
        }
        self.emit(PipelineEvent::StageStarted { stage }).await;
        Ok(())
    }
}

/// The collaborators a run needs, resolved before any work starts.
struct Backends {
    chat: Arc<dyn ChatModel>,
    speech: Option<Arc<dyn SpeechBackend>>,
}

impl Backends {
    fn resolve(config: &PodcastConfig, with_audio: bool) -> Result<Self, PodcastError> {
        let chat = resolve_chat_model(config)?;
        let speech = if with_audio {
            Some(resolve_speech_backend(config)?)
        } else {
            None
        };
        Ok(Self { chat, speech })
    }
}

pub(crate) async fn run_from_input(
    input_str: &str,
    config: &PodcastConfig,
    with_audio: bool,
    events: Option<mpsc::Sender<PipelineEvent>>,
) -> Result<PodcastOutput, PodcastError> {
    let total_start = Instant::now();
    let events = Events(events);
    info!("Starting podcast generation: {}", input_str);

    // ── Step 1: Resolve backends ─────────────────────────────────────────
    let backends = Backends::resolve(config, with_audio)?;

    // ── Step 2: Resolve input ────────────────────────────────────────────
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;

    // ── Step 3: Rasterise pages ──────────────────────────────────────────
    events
        .begin(config, Stage::Render, 0, "Rendering pages")
        .await?;
    let render_start = Instant::now();
    let rendered = render::render_pages(resolved.path(), config).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!(
        "Rendered {} pages in {}ms",
        rendered.len(),
        render_duration_ms
    );

    // ── Step 4: Encode images ────────────────────────────────────────────
    let images: Vec<ImageData> = rendered
        .iter()
        .filter_map(|(idx, img)| match encode::encode_page(img, config.image_format) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("Failed to encode page {}: {}", idx + 1, e);
                None
            }
        })
        .collect();
    if images.is_empty() {
        return Err(PodcastError::NoPages {
            path: resolved.path().to_path_buf(),
        });
    }

    let mut output = run_pages(images, backends, config, &events).await?;
    output.stats.pages_rendered = rendered.len();
    output.stats.render_duration_ms = render_duration_ms;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    Ok(output)
}

pub(crate) async fn run_from_images(
    images: Vec<ImageData>,
    config: &PodcastConfig,
    with_audio: bool,
    events: Option<mpsc::Sender<PipelineEvent>>,
) -> Result<PodcastOutput, PodcastError> {
    let total_start = Instant::now();
    let events = Events(events);
    let backends = Backends::resolve(config, with_audio)?;
    let pages = images.len();

    let mut output = run_pages(images, backends, config, &events).await?;
    output.stats.pages_rendered = pages;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    Ok(output)
}

/// Generation, then (optionally) narration and assembly.
async fn run_pages(
    images: Vec<ImageData>,
    backends: Backends,
    config: &PodcastConfig,
    events: &Events,
) -> Result<PodcastOutput, PodcastError> {
    // ── Step 5: Generate dialogs ─────────────────────────────────────────
    let client = LlmClient::new(backends.chat, config);
    info!("Using model {}", client.model_name());
    let mut orchestrator = Orchestrator::new(client, config.clone());
    if let Some(tx) = &events.0 {
        orchestrator = orchestrator.with_events(tx.clone());
    }
    let llm_start = Instant::now();
    let state = orchestrator.run(images).await?;
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    let mut stats = PodcastStats {
        plan_parsed: state.plan_parsed,
        steps: state.plan.len(),
        dialogs: state.dialogs.len(),
        llm: orchestrator.client().usage(),
        llm_duration_ms,
        ..PodcastStats::default()
    };

    // ── Step 6: Narrate and assemble ─────────────────────────────────────
    let narration = match backends.speech {
        Some(speech) => {
            let synth = Synthesizer::new(speech, config);
            let tts_start = Instant::now();
            let narration = narrate_with(&state.dialogs, &synth, config, events).await?;
            stats.tts_duration_ms = tts_start.elapsed().as_millis() as u64;
            narration
        }
        None => Narration::default(),
    };

    // ── Step 7: Compute stats ────────────────────────────────────────────
    stats.lines_total = narration.lines.len();
    for line in &narration.lines {
        match line.outcome {
            LineOutcome::Clip { .. } => stats.lines_synthesised += 1,
            LineOutcome::Failed { .. } => stats.lines_failed += 1,
            LineOutcome::NoAudio => {}
        }
    }
    stats.clips_skipped = narration.assembly.skipped.len();
    stats.audio_duration_ms = narration.assembly.duration_ms;

    let audio_path = narration.assembly.path.clone();
    info!(
        "Podcast complete: {} dialog(s), {}/{} line(s) voiced",
        stats.dialogs, stats.lines_synthesised, stats.lines_total
    );
    if let Some(cb) = &config.progress_callback {
        cb.on_complete(stats.dialogs, audio_path.is_some());
    }

    Ok(PodcastOutput {
        audio_path,
        outline: state.raw_content.first().cloned().unwrap_or_default(),
        plan: state.plan,
        dialogs: state.dialogs,
        lines: narration.lines,
        stats,
    })
}

/// Lines are voiced one at a time, in script order.
async fn narrate_with(
    dialogs: &[StepDialog],
    synth: &Synthesizer,
    config: &PodcastConfig,
    events: &Events,
) -> Result<Narration, PodcastError> {
    let total: usize = dialogs.iter().map(|d| d.script.lines.len()).sum();
    let message = format!("Narrating {total} line(s)");
    events.begin(config, Stage::Synthesize, 80, &message).await?;

    let mut lines = Vec::with_capacity(total);
    let mut outcomes = Vec::with_capacity(total);
    let mut index = 0;
    for dialog in dialogs {
        for (line_no, line) in dialog.script.lines.iter().enumerate() {
            if config.is_cancelled() {
                return Err(PodcastError::Cancelled {
                    stage: Stage::Synthesize,
                });
            }
            let outcome = match synth.synthesize(line).await {
                Ok(Synthesis::Clip(clip)) => {
                    if let Some(cb) = &config.progress_callback {
                        cb.on_line_synthesised(index, total);
                    }
                    let outcome = LineOutcome::Clip {
                        path: clip.path.clone(),
                    };
                    outcomes.push(Synthesis::Clip(clip));
                    outcome
                }
                Ok(Synthesis::NoAudio) => LineOutcome::NoAudio,
                Err(e) => {
                    warn!(
                        "Line {} of dialog {} failed after all attempts: {}",
                        line_no, dialog.index, e
                    );
                    if let Some(cb) = &config.progress_callback {
                        cb.on_line_failed(index, total, &e.to_string());
                    }
                    LineOutcome::Failed { error: e }
                }
            };
            let report = LineReport {
                dialog: dialog.index,
                line: line_no,
                speaker: line.speaker(),
                outcome,
            };
            events
                .emit(PipelineEvent::LineSynthesised {
                    index,
                    report: report.clone(),
                })
                .await;
            lines.push(report);
            index += 1;
        }
    }

    let message = format!("Assembling {} clip(s)", outcomes.len());
    events.begin(config, Stage::Assemble, 95, &message).await?;
    let assembly = assemble(&outcomes, config).await?;
    events
        .emit(PipelineEvent::Assembled {
            report: assembly.clone(),
        })
        .await;

    Ok(Narration { lines, assembly })
}

// ── Backend resolution ───────────────────────────────────────────────────

/// Default model for a named provider when none is configured.
fn default_model(provider: &str) -> &'static str {
    match provider {
        "gemini" | "google" => "gemini-1.5-flash",
        "anthropic" => "claude-3-5-haiku-latest",
        _ => "gpt-4.1-nano",
    }
}

/// Instantiate a named provider with the given model.
fn create_chat_model(provider: &str, model: &str) -> Result<Arc<dyn ChatModel>, PodcastError> {
    let llm = ProviderFactory::create_llm_provider(provider, model).map_err(|e| {
        PodcastError::ProviderNotConfigured {
            provider: provider.to_string(),
            hint: format!("{e}"),
        }
    })?;
    Ok(Arc::new(ProviderModel::new(llm, format!("{provider}/{model}"))))
}

/// Resolve the chat model, from most-specific to least-specific.
///
/// 1. **Pre-built model** (`config.chat_model`), used as-is. This is how
///    tests and custom middleware plug in.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`PAPER2PODCAST_LLM_PROVIDER` +
///    `PAPER2PODCAST_MODEL`), honoured even when several API keys exist.
/// 4. **Gemini**, when `GEMINI_API_KEY` is set.
/// 5. **OpenAI**, when `OPENAI_API_KEY` is set.
/// 6. **Full auto-detection** (`ProviderFactory::from_env`).
fn resolve_chat_model(config: &PodcastConfig) -> Result<Arc<dyn ChatModel>, PodcastError> {
    // 1) User-provided model takes priority
    if let Some(model) = &config.chat_model {
        return Ok(Arc::clone(model));
    }

    // 2) Provider name + model
    if let Some(name) = &config.provider_name {
        let model = config.model.as_deref().unwrap_or(default_model(name));
        return create_chat_model(name, model);
    }

    // 3) Environment pair
    if let (Ok(provider), Ok(model)) = (std::env::var(PROVIDER_ENV), std::env::var(MODEL_ENV)) {
        if !provider.is_empty() && !model.is_empty() {
            return create_chat_model(&provider, &model);
        }
    }

    // 4) and 5) Known API keys, Gemini first
    for (key, provider) in [("GEMINI_API_KEY", "gemini"), ("OPENAI_API_KEY", "openai")] {
        if std::env::var(key).map(|v| !v.is_empty()).unwrap_or(false) {
            let model = config.model.as_deref().unwrap_or(default_model(provider));
            return create_chat_model(provider, model);
        }
    }

    // 6) Whatever the factory can find
    let (llm, _embedding) =
        ProviderFactory::from_env().map_err(|e| PodcastError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;
    Ok(Arc::new(ProviderModel::new(llm, "auto")))
}

/// The configured backend, or the Gradio space at `tts_endpoint`.
fn resolve_speech_backend(config: &PodcastConfig) -> Result<Arc<dyn SpeechBackend>, PodcastError> {
    if let Some(backend) = &config.speech_backend {
        return Ok(Arc::clone(backend));
    }
    let gradio = GradioSpeech::new(
        config.tts_endpoint.clone(),
        config.tts_api_name.clone(),
        config.voices_dir(),
        config.tts_timeout_secs,
    )
    .map_err(|e| PodcastError::Internal(format!("Failed to build TTS client: {e}")))?;
    Ok(Arc::new(gradio))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::{Completion, LlmRequest};
    use async_trait::async_trait;

    /// Never answers; only its name matters.
    struct Named;

    #[async_trait]
    impl ChatModel for Named {
        fn name(&self) -> &str {
            "named"
        }

        async fn complete(&self, _request: &LlmRequest) -> Result<Completion, String> {
            Err("unused".into())
        }
    }

    #[test]
    fn default_models_per_provider() {
        assert_eq!(default_model("gemini"), "gemini-1.5-flash");
        assert_eq!(default_model("openai"), "gpt-4.1-nano");
        assert_eq!(default_model("anthropic"), "claude-3-5-haiku-latest");
    }

    #[test]
    fn prebuilt_chat_model_wins() {
        let config = PodcastConfig::builder()
            .chat_model(Arc::new(Named))
            .provider_name("openai")
            .build()
            .unwrap();
        assert_eq!(resolve_chat_model(&config).unwrap().name(), "named");
    }

    #[tokio::test]
    async fn missing_file_fails_before_any_llm_call() {
        let config = PodcastConfig::builder()
            .chat_model(Arc::new(Named))
            .build()
            .unwrap();
        let err = generate_script("/definitely/not/here.pdf", &config)
            .await
            .unwrap_err();
        assert!(matches!(err, PodcastError::FileNotFound { .. }));
    }
}
