//! Error types for the paper2podcast library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PodcastError`]: **Fatal**: the run cannot proceed at all (bad input
//!   file, provider not configured, an outline or dialog LLM call failed after
//!   its retries). Returned as `Err(PodcastError)` from the top-level
//!   `generate_*` functions.
//!
//! * [`TtsError`]: **Non-fatal**: one dialog line could not be synthesised
//!   even after the retry budget. Stored inside
//!   [`crate::output::LineOutcome::Failed`] so the rest of the episode is
//!   still narrated and assembled.
//!
//! Malformed structurer output is not an error at all: it degrades to an
//! empty plan (see [`crate::pipeline::structure::PlanOutcome`]).

use crate::pipeline::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the paper2podcast library.
#[derive(Debug, Error)]
pub enum PodcastError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// No page of the document could be rasterised and encoded.
    #[error("No page of '{path}' could be rendered")]
    NoPages { path: PathBuf },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium for your platform, or set PDFIUM_LIB_PATH to the\n\
directory that contains it.\n"
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// An LLM call kept failing after every client-level retry.
    #[error("{stage} stage: LLM call failed after {attempts} attempt(s): {detail}")]
    LlmCallFailed {
        stage: Stage,
        attempts: u32,
        detail: String,
    },

    /// An LLM call exceeded the per-call timeout on its final attempt.
    #[error("{stage} stage: LLM call timed out after {secs}s")]
    ApiTimeout { stage: Stage, secs: u64 },

    /// The run was cancelled through its [`crate::config::CancelFlag`].
    #[error("Cancelled at the {stage} stage")]
    Cancelled { stage: Stage },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The run finished but no dialog line produced any audio.
    #[error("No audio was generated ({lines} script line(s), none synthesised)")]
    NoAudio { lines: usize },

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not encode a WAV file (bumper or combined episode).
    #[error("Failed to write audio '{path}': {detail}")]
    AudioWriteFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single speech-synthesis call.
///
/// The synthesizer retries every variant; once the attempt budget is spent the
/// last error is handed to the caller, which records it and moves on to the
/// next line.
#[derive(Debug, Clone, Error, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum TtsError {
    /// The TTS endpoint could not be reached or answered with an HTTP error.
    #[error("TTS request failed: {0}")]
    Http(String),

    /// The TTS service accepted the request but reported a failure.
    #[error("TTS service error: {0}")]
    Remote(String),

    /// The TTS response did not have the expected shape.
    #[error("Unexpected TTS response: {0}")]
    Protocol(String),

    /// The synthesised audio could not be stored locally.
    #[error("Failed to store synthesised audio: {0}")]
    Io(String),

    /// The TTS call did not finish in time.
    #[error("TTS call timed out after {secs}s")]
    Timeout { secs: u64 },
}
