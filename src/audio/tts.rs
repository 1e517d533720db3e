//! Speech backends: the [`SpeechBackend`] seam and a Gradio client for it.
//!
//! ## Gradio call protocol
//!
//! Hosted TTS models on Hugging Face Spaces expose Gradio's two-step API:
//!
//! 1. `POST {endpoint}/call/{api}` with `{"data": [...]}` returns an
//!    `event_id`;
//! 2. `GET {endpoint}/call/{api}/{event_id}` streams server-sent events until
//!    an `event: complete` (payload: the output file) or `event: error`.
//!
//! The output file is then downloaded into the configured directory, so the
//! rest of the crate only ever deals with local paths.

use crate::error::TtsError;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// One utterance to synthesise.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    /// Language code, e.g. "EN".
    pub language: String,
    /// Speaker id of the TTS model, e.g. "EN-US".
    pub speaker: String,
    pub speed: f32,
}

/// A text-to-speech engine that writes audio files.
///
/// Implementors must be `Send + Sync` so they can be shared as
/// `Arc<dyn SpeechBackend>`. Retrying is the caller's job.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Synthesise `request` and return the path of the local audio file.
    async fn synthesize(&self, request: &SpeechRequest) -> Result<PathBuf, TtsError>;
}

// ── Gradio client ────────────────────────────────────────────────────────

/// [`SpeechBackend`] for a Gradio TTS app such as MeloTTS.
pub struct GradioSpeech {
    client: reqwest::Client,
    endpoint: String,
    api_name: String,
    out_dir: PathBuf,
}

#[derive(Deserialize)]
struct CallResponse {
    event_id: String,
}

impl GradioSpeech {
    /// `endpoint` is the app's base URL; clips are stored under `out_dir`.
    pub fn new(
        endpoint: impl Into<String>,
        api_name: impl Into<String>,
        out_dir: impl Into<PathBuf>,
        timeout_secs: u64,
    ) -> Result<Self, TtsError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TtsError::Http(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_name: api_name.into().trim_start_matches('/').to_string(),
            out_dir: out_dir.into(),
        })
    }

    fn call_url(&self) -> String {
        format!("{}/call/{}", self.endpoint, self.api_name)
    }

    async fn submit(&self, request: &SpeechRequest) -> Result<String, TtsError> {
        // Positional inputs of the MeloTTS `synthesize` function.
        let body = json!({
            "data": [request.speaker, request.text, request.speed, request.language]
        });
        let response = self
            .client
            .post(self.call_url())
            .json(&body)
            .send()
            .await
            .map_err(http_error)?;

        if !response.status().is_success() {
            return Err(TtsError::Http(format!("HTTP {}", response.status())));
        }
        let call: CallResponse = response
            .json()
            .await
            .map_err(|e| TtsError::Protocol(format!("missing event_id: {e}")))?;
        Ok(call.event_id)
    }

    async fn await_result(&self, event_id: &str) -> Result<String, TtsError> {
        let url = format!("{}/{}", self.call_url(), event_id);
        let response = self.client.get(url).send().await.map_err(http_error)?;
        if !response.status().is_success() {
            return Err(TtsError::Http(format!("HTTP {}", response.status())));
        }

        let mut body = response.bytes_stream();
        let mut parser = SseParser::default();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(http_error)?;
            for event in parser.feed(&chunk) {
                if let Some(result) = interpret_event(&event, &self.endpoint) {
                    return result;
                }
            }
        }
        for event in parser.finish() {
            if let Some(result) = interpret_event(&event, &self.endpoint) {
                return result;
            }
        }
        Err(TtsError::Protocol(
            "event stream ended without a result".into(),
        ))
    }

    async fn download(&self, file_url: &str) -> Result<PathBuf, TtsError> {
        let response = self.client.get(file_url).send().await.map_err(http_error)?;
        if !response.status().is_success() {
            return Err(TtsError::Http(format!(
                "HTTP {} fetching {}",
                response.status(),
                file_url
            )));
        }
        let bytes = response.bytes().await.map_err(http_error)?;
        let dir = self.out_dir.clone();
        let suffix = extension_of(file_url);

        tokio::task::spawn_blocking(move || store_clip(&dir, &suffix, &bytes))
            .await
            .map_err(|e| TtsError::Io(format!("store task panicked: {e}")))?
    }
}

#[async_trait]
impl SpeechBackend for GradioSpeech {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<PathBuf, TtsError> {
        let event_id = self.submit(request).await?;
        debug!("TTS call {} submitted ({} chars)", event_id, request.text.len());
        let file_url = self.await_result(&event_id).await?;
        let path = self.download(&file_url).await?;
        debug!("TTS call {} stored at {}", event_id, path.display());
        Ok(path)
    }
}

fn http_error(e: reqwest::Error) -> TtsError {
    TtsError::Http(e.to_string())
}

/// Write clip bytes to a fresh, persistent file in `dir`.
fn store_clip(dir: &Path, suffix: &str, bytes: &[u8]) -> Result<PathBuf, TtsError> {
    std::fs::create_dir_all(dir).map_err(|e| TtsError::Io(e.to_string()))?;
    let mut file = tempfile::Builder::new()
        .prefix("clip-")
        .suffix(suffix)
        .tempfile_in(dir)
        .map_err(|e| TtsError::Io(e.to_string()))?;
    file.write_all(bytes).map_err(|e| TtsError::Io(e.to_string()))?;
    let (_, path) = file.keep().map_err(|e| TtsError::Io(e.to_string()))?;
    Ok(path)
}

/// `.wav` unless the URL names another extension.
fn extension_of(url: &str) -> String {
    let name = url.rsplit('/').next().unwrap_or("");
    match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.len() <= 4 && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            format!(".{ext}")
        }
        _ => ".wav".to_string(),
    }
}

// ── Server-sent events ───────────────────────────────────────────────────

/// One `event:`/`data:` pair from the result stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Line-buffering SSE decoder. Chunks may split lines anywhere, including
/// inside a multi-byte character; only complete lines are decoded.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: String,
}

impl SseParser {
    /// Feed raw bytes; returns every event whose `data:` line is complete.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            if let Some(event) = self.line(line.trim()) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a final line that had no trailing newline.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest);
        self.line(line.trim()).into_iter().collect()
    }

    fn line(&mut self, line: &str) -> Option<SseEvent> {
        if let Some(name) = line.strip_prefix("event:") {
            self.event = name.trim().to_string();
            None
        } else {
            line.strip_prefix("data:").map(|data| SseEvent {
                event: self.event.clone(),
                data: data.trim().to_string(),
            })
        }
    }
}

/// Turn a terminal event into the audio file URL (or an error).
///
/// Returns `None` for progress events such as `heartbeat` and `generating`.
pub fn interpret_event(event: &SseEvent, endpoint: &str) -> Option<Result<String, TtsError>> {
    match event.event.as_str() {
        "complete" => Some(file_url_from_data(&event.data, endpoint)),
        "error" => Some(Err(TtsError::Remote(if event.data == "null" {
            "the TTS app reported an error".to_string()
        } else {
            event.data.clone()
        }))),
        _ => None,
    }
}

fn file_url_from_data(data: &str, endpoint: &str) -> Result<String, TtsError> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| TtsError::Protocol(format!("result is not JSON: {e}")))?;
    let first = match &value {
        Value::Array(items) => items.first(),
        other => Some(other),
    }
    .ok_or_else(|| TtsError::Protocol("empty result".into()))?;

    match first {
        Value::Object(file) => {
            if let Some(url) = file.get("url").and_then(Value::as_str) {
                Ok(url.to_string())
            } else if let Some(path) = file.get("path").and_then(Value::as_str) {
                Ok(format!("{endpoint}/file={path}"))
            } else {
                Err(TtsError::Protocol(format!("no file in result: {data}")))
            }
        }
        Value::String(path) => Ok(format!("{endpoint}/file={path}")),
        _ => Err(TtsError::Protocol(format!("unexpected result: {data}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENDPOINT: &str = "https://tts.example";

    #[test]
    fn parser_handles_split_chunks() {
        let mut p = SseParser::default();
        assert_eq!(p.feed(b"event: heartbeat\ndata: null\n\nevent: comp").len(), 1);
        let events = p.feed(b"lete\ndata: [{\"path\": \"/tmp/a.wav\"}]\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: "complete".into(),
                data: "[{\"path\": \"/tmp/a.wav\"}]".into()
            }]
        );
    }

    #[test]
    fn parser_keeps_characters_split_across_chunks() {
        let mut p = SseParser::default();
        let bytes = "event: error\ndata: \"café\"\n".as_bytes();
        let cut = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;
        assert!(p.feed(&bytes[..cut]).is_empty());
        let events = p.feed(&bytes[cut..]);
        assert_eq!(
            events,
            vec![SseEvent {
                event: "error".into(),
                data: "\"café\"".into()
            }]
        );
    }

    #[test]
    fn parser_flushes_unterminated_line() {
        let mut p = SseParser::default();
        assert!(p.feed(b"event: error\ndata: \"quota\"").is_empty());
        let events = p.finish();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "error");
    }

    #[test]
    fn complete_event_prefers_url() {
        let ev = SseEvent {
            event: "complete".into(),
            data: r#"[{"path": "/tmp/x.wav", "url": "https://cdn/x.wav"}]"#.into(),
        };
        assert_eq!(
            interpret_event(&ev, ENDPOINT),
            Some(Ok("https://cdn/x.wav".to_string()))
        );
    }

    #[test]
    fn complete_event_falls_back_to_file_route() {
        let ev = SseEvent {
            event: "complete".into(),
            data: r#"["/tmp/gradio/y.wav"]"#.into(),
        };
        assert_eq!(
            interpret_event(&ev, ENDPOINT),
            Some(Ok("https://tts.example/file=/tmp/gradio/y.wav".to_string()))
        );
    }

    #[test]
    fn error_and_progress_events() {
        let err = SseEvent {
            event: "error".into(),
            data: "null".into(),
        };
        assert!(matches!(
            interpret_event(&err, ENDPOINT),
            Some(Err(TtsError::Remote(_)))
        ));

        let beat = SseEvent {
            event: "heartbeat".into(),
            data: "null".into(),
        };
        assert_eq!(interpret_event(&beat, ENDPOINT), None);
    }

    #[test]
    fn malformed_result_is_protocol_error() {
        let ev = SseEvent {
            event: "complete".into(),
            data: "[]".into(),
        };
        assert!(matches!(
            interpret_event(&ev, ENDPOINT),
            Some(Err(TtsError::Protocol(_)))
        ));
    }

    #[test]
    fn clip_extension_from_url() {
        assert_eq!(extension_of("https://h/file=/tmp/a.mp3"), ".mp3");
        assert_eq!(extension_of("https://h/file=/tmp/blob"), ".wav");
    }

    #[test]
    fn stored_clips_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_clip(dir.path(), ".wav", b"RIFF").unwrap();
        assert!(path.starts_with(dir.path()));
        assert_eq!(std::fs::read(&path).unwrap(), b"RIFF");
    }
}
