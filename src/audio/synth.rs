//! Script line → voice clip, with a bounded retry.
//!
//! Voice selection follows the line's speaker: the host and guest personas
//! each carry their own TTS speaker id and speed. Lines with nothing to say
//! ([`ScriptLine::Direction`]) short-circuit to [`Synthesis::NoAudio`] without
//! touching the backend.
//!
//! ## Retry Strategy
//!
//! Hosted TTS spaces fail often but briefly (cold starts, queue overflows).
//! Each line gets `tts_attempts` calls with a fixed `tts_retry_pause_ms`
//! between them; the last error is returned and the caller moves on to the
//! next line. Every call is also bounded by `tts_timeout_secs`.

use crate::audio::tts::{SpeechBackend, SpeechRequest};
use crate::config::{Persona, PodcastConfig};
use crate::error::TtsError;
use crate::pipeline::dialog::{ScriptLine, Speaker};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::warn;

/// A synthesised clip on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioClip {
    pub path: PathBuf,
    pub speaker: Speaker,
}

/// Result of a successful synthesis call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Synthesis {
    Clip(AudioClip),
    /// The line was not speakable; nothing was sent to the backend.
    NoAudio,
}

/// Turns script lines into clips.
#[derive(Clone)]
pub struct Synthesizer {
    backend: Arc<dyn SpeechBackend>,
    host: Persona,
    guest: Persona,
    language: String,
    attempts: u32,
    pause: Duration,
    timeout_secs: u64,
}

impl Synthesizer {
    pub fn new(backend: Arc<dyn SpeechBackend>, config: &PodcastConfig) -> Self {
        Self {
            backend,
            host: config.host.clone(),
            guest: config.guest.clone(),
            language: config.language.clone(),
            attempts: config.tts_attempts.max(1),
            pause: Duration::from_millis(config.tts_retry_pause_ms),
            timeout_secs: config.tts_timeout_secs,
        }
    }

    /// Synthesise one parsed script line.
    pub async fn synthesize(&self, line: &ScriptLine) -> Result<Synthesis, TtsError> {
        let (speaker, text) = match line {
            ScriptLine::Spoken { speaker, text } => (*speaker, text),
            ScriptLine::Direction { .. } => return Ok(Synthesis::NoAudio),
        };
        let persona = match speaker {
            Speaker::Host => &self.host,
            Speaker::Guest => &self.guest,
        };
        let request = SpeechRequest {
            text: text.clone(),
            language: self.language.clone(),
            speaker: persona.voice.speaker.clone(),
            speed: persona.voice.speed,
        };

        let path = self.call_with_retry(&request).await?;
        Ok(Synthesis::Clip(AudioClip { path, speaker }))
    }

    /// Classify a raw, marker-prefixed line and synthesise it.
    pub async fn synthesize_text(&self, line: &str) -> Result<Synthesis, TtsError> {
        let line = ScriptLine::classify(line, &self.host, &self.guest);
        self.synthesize(&line).await
    }

    async fn call_with_retry(&self, request: &SpeechRequest) -> Result<PathBuf, TtsError> {
        let per_call = Duration::from_secs(self.timeout_secs);
        let mut attempt = 1;
        loop {
            let result = match timeout(per_call, self.backend.synthesize(request)).await {
                Ok(result) => result,
                Err(_) => Err(TtsError::Timeout {
                    secs: self.timeout_secs,
                }),
            };
            match result {
                Ok(path) => return Ok(path),
                Err(e) if attempt >= self.attempts => return Err(e),
                Err(e) => {
                    warn!("TTS attempt {}/{} failed: {}", attempt, self.attempts, e);
                    sleep(self.pause).await;
                    attempt += 1;
                }
            }
        }
    }
}
