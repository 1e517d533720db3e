//! # paper2podcast
//!
//! Turn a PDF research paper into a two-speaker podcast episode.
//!
//! ## Why this crate?
//!
//! Reading a paper is slow; listening to two people talk it through is not.
//! This crate shows the page images to a vision LLM, has it plan the paper as
//! a list of steps with guiding questions, answers each step from the pages,
//! scripts every answer as a host/guest conversation, voices each line with a
//! TTS service and stitches the clips into one WAV file.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Render     rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Encode     PNG/JPEG → base64 ImageData
//!  ├─ 4. Extract    all pages → free-text outline          (1 LLM call)
//!  ├─ 5. Structure  outline → JSON plan of steps            (1 LLM call)
//!  ├─ 6. Solve      one answer per step                     (N LLM calls)
//!  ├─ 7. Dialog     one host/guest script per answer        (N LLM calls)
//!  ├─ 8. Narrate    one clip per script line                (TTS)
//!  └─ 9. Assemble   bumper + clips + bumper → WAV
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paper2podcast::{generate_podcast, PodcastConfig, Tone};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / ...
//!     let config = PodcastConfig::builder()
//!         .tone(Tone::Conversational)
//!         .build()?;
//!     let output = generate_podcast("paper.pdf", &config).await?;
//!     for dialog in &output.dialogs {
//!         println!("{}", dialog.raw);
//!     }
//!     println!("episode: {:?}", output.audio_path);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `paper2podcast` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! paper2podcast = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime requirements
//!
//! Rendering needs libpdfium, found via `PDFIUM_LIB_PATH` or the system
//! library path. Narration talks to a Gradio TTS space (MeloTTS by default).

// ── Modules ──────────────────────────────────────────────────────────────

pub mod audio;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod podcast;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use audio::assemble::{AssemblyReport, SkippedClip};
pub use audio::synth::{AudioClip, Synthesis, Synthesizer};
pub use audio::tts::{GradioSpeech, SpeechBackend, SpeechRequest};
pub use config::{
    Bumper, CancelFlag, ImageFormat, Persona, PodcastConfig, PodcastConfigBuilder, PodcastLength,
    Tone, VoiceProfile,
};
pub use error::{PodcastError, TtsError};
pub use output::{LineOutcome, LineReport, PodcastOutput, PodcastStats};
pub use pipeline::dialog::{Script, ScriptLine, Speaker};
pub use pipeline::llm::{ChatModel, Completion, LlmRequest, LlmUsage, ProviderModel};
pub use pipeline::state::{Step, StepDialog};
pub use pipeline::Stage;
pub use podcast::{
    generate_podcast, generate_podcast_from_bytes, generate_podcast_from_images,
    generate_podcast_sync, generate_podcast_to_file, generate_script, narrate, Narration,
};
pub use progress::{NoopProgressCallback, PodcastProgressCallback, ProgressCallback};
pub use stream::{podcast_events, podcast_events_from_images, EventStream, PipelineEvent};
