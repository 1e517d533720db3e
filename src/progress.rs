//! Progress-callback trait for stage and per-task events.
//!
//! Inject an [`Arc<dyn PodcastProgressCallback>`] via
//! [`crate::config::PodcastConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through its stages.
//!
//! # Why callbacks instead of channels?
//!
//! Callers can forward events to a channel, a WebSocket or a terminal
//! progress bar without the library knowing how the host application
//! communicates. For a pull-based interface see [`crate::stream`], which is
//! itself built on an internal event sink.
//!
//! # Example
//!
//! ```rust
//! use paper2podcast::{PodcastConfig, PodcastProgressCallback, Stage};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl PodcastProgressCallback for Printer {
//!     fn on_stage(&self, stage: Stage, percent: u8, message: &str) {
//!         eprintln!("[{percent:>3}%] {stage}: {message}");
//!     }
//! }
//!
//! let config = PodcastConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use crate::pipeline::Stage;
use std::sync::Arc;

/// Called by the pipeline as it runs.
///
/// Implementations must be `Send + Sync`: with `concurrency > 1` the per-task
/// hooks fire from concurrently running tasks. All methods default to no-ops.
pub trait PodcastProgressCallback: Send + Sync {
    /// A stage has started. `percent` is the overall progress estimate (0–100).
    fn on_stage(&self, stage: Stage, percent: u8, message: &str) {
        let _ = (stage, percent, message);
    }

    /// One fan-out task of `stage` finished.
    ///
    /// # Arguments
    /// * `index`: 0-based position of the task in its batch
    /// * `total`: batch size
    fn on_task_complete(&self, stage: Stage, index: usize, total: usize) {
        let _ = (stage, index, total);
    }

    /// One script line produced audio.
    fn on_line_synthesised(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// One script line failed after all TTS attempts.
    fn on_line_failed(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// The run finished. `audio` is false when nothing was synthesised.
    fn on_complete(&self, dialogs: usize, audio: bool) {
        let _ = (dialogs, audio);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl PodcastProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PodcastConfig`].
pub type ProgressCallback = Arc<dyn PodcastProgressCallback>;
