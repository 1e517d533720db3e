//! Result types returned by the top-level API.

use crate::error::TtsError;
use crate::pipeline::dialog::Speaker;
use crate::pipeline::llm::LlmUsage;
use crate::pipeline::state::{Step, StepDialog};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything a run produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodcastOutput {
    /// The assembled episode. `None` when no line produced audio, or when
    /// only the script was generated.
    pub audio_path: Option<PathBuf>,

    /// Free-text outline from the extract stage.
    pub outline: String,

    /// Parsed plan. Empty when the structurer output was unusable.
    pub plan: Vec<Step>,

    /// One dialog per solved step, in plan order.
    pub dialogs: Vec<StepDialog>,

    /// One entry per script line handed to the synthesizer, in script order.
    pub lines: Vec<LineReport>,

    pub stats: PodcastStats,
}

/// What happened to one script line during narration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineReport {
    /// Index of the dialog (= plan step) the line belongs to.
    pub dialog: usize,
    /// Index of the line within that dialog's script.
    pub line: usize,
    pub speaker: Option<Speaker>,
    pub outcome: LineOutcome,
}

/// Outcome of synthesising one line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LineOutcome {
    /// Audio was written to `path`.
    Clip { path: PathBuf },
    /// The line has nothing to say (no persona marker, or no words).
    NoAudio,
    /// Every TTS attempt failed.
    Failed { error: TtsError },
}

/// Counters and timings for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodcastStats {
    pub pages_rendered: usize,
    pub plan_parsed: bool,
    pub steps: usize,
    pub dialogs: usize,
    pub lines_total: usize,
    pub lines_synthesised: usize,
    pub lines_failed: usize,
    /// Clips that were synthesised but could not be decoded during assembly.
    pub clips_skipped: usize,
    pub llm: LlmUsage,
    pub render_duration_ms: u64,
    pub llm_duration_ms: u64,
    pub tts_duration_ms: u64,
    pub total_duration_ms: u64,
    /// Length of the assembled episode, bumpers included.
    pub audio_duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_outcome_json_shape() {
        let failed = LineOutcome::Failed {
            error: TtsError::Http("502".into()),
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"]["Http"], "502");

        let json = serde_json::to_value(LineOutcome::NoAudio).unwrap();
        assert_eq!(json, serde_json::json!({"status": "no_audio"}));
    }
}
