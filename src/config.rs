//! Configuration types for paper-to-podcast generation.
//!
//! Every knob of a run lives in [`PodcastConfig`], built via its
//! [`PodcastConfigBuilder`] and passed by reference into each stage. There is
//! no process-wide state: two runs with different configs can share a process
//! (and a Tokio runtime) without observing each other.
//!
//! # Design choice: builder over constructor
//! The config has grown past twenty fields. The builder lets callers set only
//! what they care about and rely on the documented defaults for the rest,
//! while [`PodcastConfigBuilder::build`] rejects combinations that would only
//! fail halfway through a run.

use crate::audio::tts::SpeechBackend;
use crate::error::PodcastError;
use crate::pipeline::llm::ChatModel;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Default hosted TTS endpoint (MeloTTS English on Hugging Face Spaces).
pub const DEFAULT_TTS_ENDPOINT: &str = "https://myshell-ai-melotts-english.hf.space";

/// Default Gradio API name of the synthesis function.
pub const DEFAULT_TTS_API_NAME: &str = "synthesize";

/// Configuration for one paper-to-podcast run.
///
/// Built via [`PodcastConfig::builder()`] or using [`PodcastConfig::default()`].
///
/// # Example
/// ```rust
/// use paper2podcast::{PodcastConfig, PodcastLength, Tone};
///
/// let config = PodcastConfig::builder()
///     .tone(Tone::Conversational)
///     .length(PodcastLength::Medium)
///     .concurrency(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 4);
/// ```
#[derive(Clone)]
pub struct PodcastConfig {
    // ── LLM ──────────────────────────────────────────────────────────────
    /// LLM model identifier, e.g. "gemini-1.5-flash". If None, uses the
    /// provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed chat model. Takes precedence over `provider_name`.
    pub chat_model: Option<Arc<dyn ChatModel>>,

    /// Sampling temperature. Default: 0.0.
    ///
    /// The outline and structurer stages need the model to stay close to the
    /// paper; any creativity shows up as invented steps.
    pub temperature: f32,

    /// Maximum output tokens per call. If None, uses the provider default.
    pub max_tokens: Option<usize>,

    /// Client-level retries on a failed LLM call. Default: 2.
    ///
    /// A call is attempted `max_retries + 1` times. Once exhausted, the error
    /// is fatal for the run.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-LLM-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Fan-out parallelism for the solve and dialog stages. Default: 1.
    ///
    /// With 1 every step is solved (and then scripted) one after the other.
    /// Higher values issue that many LLM calls at once; results are always
    /// gathered back into step order.
    pub concurrency: usize,

    // ── Episode ──────────────────────────────────────────────────────────
    /// Tone of the dialog. Default: [`Tone::Formal`].
    pub tone: Tone,

    /// Target length of each dialog segment. Default: [`PodcastLength::Short`].
    pub length: PodcastLength,

    /// Output language, passed to the dialog prompt and to TTS. Default: "EN".
    pub language: String,

    /// Host persona. Default: Jane, voice `EN-US`.
    pub host: Persona,

    /// Guest persona. Default: Dr. Sharma, voice `EN_INDIA`.
    pub guest: Persona,

    /// Custom dialog system prompt. If None, uses the built-in one.
    pub dialog_prompt: Option<String>,

    // ── PDF ──────────────────────────────────────────────────────────────
    /// Encoding of page images sent to the LLM. Default: [`ImageFormat::Png`].
    pub image_format: ImageFormat,

    /// Maximum rendered image dimension in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    // ── Speech ───────────────────────────────────────────────────────────
    /// Base URL of the Gradio TTS space.
    pub tts_endpoint: String,

    /// Gradio API name of the synthesis function. Default: "synthesize".
    pub tts_api_name: String,

    /// Pre-constructed speech backend. Takes precedence over `tts_endpoint`.
    pub speech_backend: Option<Arc<dyn SpeechBackend>>,

    /// Attempts per dialog line before giving up. Default: 3.
    pub tts_attempts: u32,

    /// Fixed pause between TTS attempts in milliseconds. Default: 1000.
    pub tts_retry_pause_ms: u64,

    /// Per-TTS-call timeout in seconds. Default: 120.
    pub tts_timeout_secs: u64,

    // ── Assembly ─────────────────────────────────────────────────────────
    /// Scratch directory. Clips land in `voices/`, episodes in `voices/tmp/`.
    /// Default: "temp".
    pub work_dir: PathBuf,

    /// Sample rate of the assembled episode. Default: 44 100 Hz.
    pub sample_rate: u32,

    /// Tone played before the first clip. Default: 440 Hz for 1000 ms.
    pub lead_bumper: Bumper,

    /// Tone played after the last clip. Default: 220 Hz for 1000 ms.
    pub trail_bumper: Bumper,

    // ── Run control ──────────────────────────────────────────────────────
    /// Progress observer.
    pub progress_callback: Option<ProgressCallback>,

    /// Cooperative cancellation, checked between stages and fan-out items.
    pub cancel: Option<CancelFlag>,
}

impl Default for PodcastConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            chat_model: None,
            temperature: 0.0,
            max_tokens: None,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            concurrency: 1,
            tone: Tone::default(),
            length: PodcastLength::default(),
            language: "EN".to_string(),
            host: Persona::default_host(),
            guest: Persona::default_guest(),
            dialog_prompt: None,
            image_format: ImageFormat::default(),
            max_rendered_pixels: 2000,
            password: None,
            download_timeout_secs: 120,
            tts_endpoint: DEFAULT_TTS_ENDPOINT.to_string(),
            tts_api_name: DEFAULT_TTS_API_NAME.to_string(),
            speech_backend: None,
            tts_attempts: 3,
            tts_retry_pause_ms: 1000,
            tts_timeout_secs: 120,
            work_dir: PathBuf::from("temp"),
            sample_rate: 44_100,
            lead_bumper: Bumper::new(440.0, 1000),
            trail_bumper: Bumper::new(220.0, 1000),
            progress_callback: None,
            cancel: None,
        }
    }
}

impl fmt::Debug for PodcastConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PodcastConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("chat_model", &self.chat_model.as_ref().map(|m| m.name()))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("tone", &self.tone)
            .field("length", &self.length)
            .field("language", &self.language)
            .field("host", &self.host)
            .field("guest", &self.guest)
            .field("image_format", &self.image_format)
            .field("tts_endpoint", &self.tts_endpoint)
            .field(
                "speech_backend",
                &self.speech_backend.as_ref().map(|_| "<dyn SpeechBackend>"),
            )
            .field("tts_attempts", &self.tts_attempts)
            .field("work_dir", &self.work_dir)
            .field("sample_rate", &self.sample_rate)
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl PodcastConfig {
    /// Create a new builder for `PodcastConfig`.
    pub fn builder() -> PodcastConfigBuilder {
        PodcastConfigBuilder {
            config: Self::default(),
        }
    }

    /// True once the run's [`CancelFlag`] has been raised.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }

    /// Directory holding synthesised clips and cached bumpers.
    pub fn voices_dir(&self) -> PathBuf {
        self.work_dir.join("voices")
    }

    /// Directory receiving assembled episodes.
    pub fn episodes_dir(&self) -> PathBuf {
        self.voices_dir().join("tmp")
    }
}

/// Builder for [`PodcastConfig`].
#[derive(Debug)]
pub struct PodcastConfigBuilder {
    config: PodcastConfig,
}

impl PodcastConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn chat_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.config.chat_model = Some(model);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn tone(mut self, tone: Tone) -> Self {
        self.config.tone = tone;
        self
    }

    pub fn length(mut self, length: PodcastLength) -> Self {
        self.config.length = length;
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.config.language = language.into();
        self
    }

    pub fn host(mut self, persona: Persona) -> Self {
        self.config.host = persona;
        self
    }

    pub fn guest(mut self, persona: Persona) -> Self {
        self.config.guest = persona;
        self
    }

    pub fn dialog_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.dialog_prompt = Some(prompt.into());
        self
    }

    pub fn image_format(mut self, format: ImageFormat) -> Self {
        self.config.image_format = format;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn tts_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.tts_endpoint = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn tts_api_name(mut self, name: impl Into<String>) -> Self {
        self.config.tts_api_name = name.into().trim_start_matches('/').to_string();
        self
    }

    pub fn speech_backend(mut self, backend: Arc<dyn SpeechBackend>) -> Self {
        self.config.speech_backend = Some(backend);
        self
    }

    pub fn tts_attempts(mut self, n: u32) -> Self {
        self.config.tts_attempts = n;
        self
    }

    pub fn tts_retry_pause_ms(mut self, ms: u64) -> Self {
        self.config.tts_retry_pause_ms = ms;
        self
    }

    pub fn tts_timeout_secs(mut self, secs: u64) -> Self {
        self.config.tts_timeout_secs = secs;
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = dir.into();
        self
    }

    pub fn sample_rate(mut self, hz: u32) -> Self {
        self.config.sample_rate = hz;
        self
    }

    pub fn lead_bumper(mut self, bumper: Bumper) -> Self {
        self.config.lead_bumper = bumper;
        self
    }

    pub fn trail_bumper(mut self, bumper: Bumper) -> Self {
        self.config.trail_bumper = bumper;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.config.cancel = Some(flag);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PodcastConfig, PodcastError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(PodcastError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 || c.tts_timeout_secs == 0 {
            return Err(PodcastError::InvalidConfig(format!(
                "Timeouts must be ≥ 1 s, got api={} tts={}",
                c.api_timeout_secs, c.tts_timeout_secs
            )));
        }
        if c.tts_attempts == 0 {
            return Err(PodcastError::InvalidConfig(
                "TTS attempts must be ≥ 1".into(),
            ));
        }
        if c.sample_rate < 8_000 {
            return Err(PodcastError::InvalidConfig(format!(
                "Sample rate must be ≥ 8000 Hz, got {}",
                c.sample_rate
            )));
        }
        let nyquist = c.sample_rate as f32 / 2.0;
        for (label, bumper) in [("lead", &c.lead_bumper), ("trail", &c.trail_bumper)] {
            if !(bumper.frequency_hz > 0.0 && bumper.frequency_hz < nyquist) {
                return Err(PodcastError::InvalidConfig(format!(
                    "{label} bumper frequency must be in (0, {nyquist}) Hz, got {}",
                    bumper.frequency_hz
                )));
            }
        }
        if c.host.name.trim().is_empty() || c.guest.name.trim().is_empty() {
            return Err(PodcastError::InvalidConfig(
                "Persona names must not be empty".into(),
            ));
        }
        if c.host.name == c.guest.name {
            return Err(PodcastError::InvalidConfig(format!(
                "Host and guest must have different names, both are '{}'",
                c.host.name
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Tone of the generated dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Tone {
    /// Measured, lecture-like delivery. (default)
    #[default]
    Formal,
    /// Relaxed, chatty delivery.
    Conversational,
}

impl Tone {
    /// The wording inserted into the dialog prompt's TONE line.
    pub fn as_prompt_str(&self) -> &'static str {
        match self {
            Tone::Formal => "Formal",
            Tone::Conversational => "Conversational",
        }
    }
}

/// Target length of each dialog segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PodcastLength {
    /// Short (1-2 min). (default)
    #[default]
    Short,
    /// Medium (3-5 min).
    Medium,
}

impl PodcastLength {
    /// Human label, as shown to users.
    pub fn label(&self) -> &'static str {
        match self {
            PodcastLength::Short => "Short (1-2 min)",
            PodcastLength::Medium => "Medium (3-5 min)",
        }
    }

    /// Instruction sentence for the dialog prompt's LENGTH line.
    pub fn instruction(&self) -> &'static str {
        match self {
            PodcastLength::Short => "Keep the podcast brief, around 1-2 minutes long.",
            PodcastLength::Medium => "Aim for a moderate length, about 3-5 minutes.",
        }
    }
}

/// Encoding of page images sent to the LLM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageFormat {
    /// Lossless; best for small print. (default)
    #[default]
    Png,
    /// Smaller payloads for image-heavy papers.
    Jpeg,
}

// ── Personas & audio ─────────────────────────────────────────────────────

/// TTS voice selection for one persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// Speaker id understood by the TTS model, e.g. "EN-US".
    pub speaker: String,
    /// Speech speed multiplier.
    pub speed: f32,
}

/// A named speaker of the podcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub voice: VoiceProfile,
}

impl Persona {
    pub fn new(name: impl Into<String>, speaker: impl Into<String>, speed: f32) -> Self {
        Self {
            name: name.into(),
            voice: VoiceProfile {
                speaker: speaker.into(),
                speed,
            },
        }
    }

    pub fn default_host() -> Self {
        Self::new("Jane", "EN-US", 0.9)
    }

    pub fn default_guest() -> Self {
        Self::new("Dr. Sharma", "EN_INDIA", 0.9)
    }

    /// The bold speaker label that opens this persona's lines: `**Jane:**`.
    pub fn marker(&self) -> String {
        format!("**{}:**", self.name)
    }
}

/// A generated sine tone framing the episode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bumper {
    pub frequency_hz: f32,
    pub duration_ms: u32,
}

impl Bumper {
    pub fn new(frequency_hz: f32, duration_ms: u32) -> Self {
        Self {
            frequency_hz,
            duration_ms,
        }
    }
}

// ── Cancellation ─────────────────────────────────────────────────────────

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Work already in flight finishes; nothing new starts.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = PodcastConfig::default();
        assert_eq!(c.temperature, 0.0);
        assert_eq!(c.max_retries, 2);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.tone, Tone::Formal);
        assert_eq!(c.length, PodcastLength::Short);
        assert_eq!(c.language, "EN");
        assert_eq!(c.host.marker(), "**Jane:**");
        assert_eq!(c.guest.marker(), "**Dr. Sharma:**");
        assert_eq!(c.guest.voice.speaker, "EN_INDIA");
        assert_eq!(c.tts_attempts, 3);
        assert_eq!(c.tts_retry_pause_ms, 1000);
        assert_eq!(c.lead_bumper, Bumper::new(440.0, 1000));
        assert_eq!(c.trail_bumper, Bumper::new(220.0, 1000));
        assert_eq!(c.episodes_dir(), PathBuf::from("temp/voices/tmp"));
    }

    #[test]
    fn builder_clamps_temperature() {
        let c = PodcastConfig::builder().temperature(7.5).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn builder_trims_endpoint_slashes() {
        let c = PodcastConfig::builder()
            .tts_endpoint("http://localhost:7860/")
            .tts_api_name("/speak")
            .build()
            .unwrap();
        assert_eq!(c.tts_endpoint, "http://localhost:7860");
        assert_eq!(c.tts_api_name, "speak");
    }

    #[test]
    fn zero_concurrency_rejected() {
        let err = PodcastConfig::builder().concurrency(0).build().unwrap_err();
        assert!(matches!(err, PodcastError::InvalidConfig(_)));
    }

    #[test]
    fn zero_timeouts_rejected() {
        let err = PodcastConfig::builder().api_timeout_secs(0).build().unwrap_err();
        assert!(err.to_string().contains("api=0"), "got: {err}");
        let err = PodcastConfig::builder().tts_timeout_secs(0).build().unwrap_err();
        assert!(err.to_string().contains("tts=0"), "got: {err}");
    }

    #[test]
    fn zero_tts_attempts_rejected() {
        let err = PodcastConfig::builder().tts_attempts(0).build().unwrap_err();
        assert!(err.to_string().contains("TTS attempts"));
    }

    #[test]
    fn bumper_above_nyquist_rejected() {
        let err = PodcastConfig::builder()
            .sample_rate(8_000)
            .lead_bumper(Bumper::new(5_000.0, 500))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("lead bumper"), "got: {err}");
    }

    #[test]
    fn identical_persona_names_rejected() {
        let err = PodcastConfig::builder()
            .guest(Persona::new("Jane", "EN-BR", 1.0))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("different names"));
    }

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let config = PodcastConfig::builder()
            .cancel_flag(flag.clone())
            .build()
            .unwrap();
        assert!(!config.is_cancelled());
        flag.cancel();
        assert!(config.is_cancelled());
    }

    #[test]
    fn length_instructions() {
        assert_eq!(PodcastLength::Short.label(), "Short (1-2 min)");
        assert!(PodcastLength::Medium.instruction().contains("3-5 minutes"));
    }
}
