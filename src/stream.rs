//! Streaming API: observe a run as a sequence of tagged events.
//!
//! ## Why stream?
//!
//! A paper takes minutes to turn into an episode. [`podcast_events`] lets
//! callers show the outline as soon as it exists, display each dialog as it
//! is written, or persist clips incrementally, instead of waiting for
//! [`crate::podcast::generate_podcast`] to return everything at once.
//!
//! Every event names the [`Stage`] it belongs to, and fan-out results carry
//! the plan index of their step, so consumers never need to infer position
//! from arrival order. With `concurrency > 1`, `StepSolved` and `DialogReady`
//! events arrive in completion order; the final output is in plan order.
//!
//! The stream ends with either [`PipelineEvent::Finished`] or one `Err`.

use crate::audio::assemble::AssemblyReport;
use crate::config::PodcastConfig;
use crate::error::PodcastError;
use crate::output::{LineReport, PodcastOutput};
use crate::pipeline::state::{Step, StepDialog};
use crate::pipeline::Stage;
use crate::podcast;
use edgequake_llm::ImageData;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;

/// Buffered events before the pipeline waits for the consumer.
const EVENT_BUFFER: usize = 64;

/// One observable step of a run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A stage is about to run.
    StageStarted { stage: Stage },
    /// The extract stage's outline.
    Outline { text: String },
    /// The structurer's raw output.
    Structured { text: String },
    /// The parsed plan; `parsed` is false when it fell back to empty.
    Plan { steps: Vec<Step>, parsed: bool },
    /// One step was answered.
    StepSolved {
        index: usize,
        step: Step,
        solution: String,
    },
    /// One step was scripted.
    DialogReady { dialog: StepDialog },
    /// One script line went through the synthesizer. `index` counts lines
    /// across all dialogs in narration order.
    LineSynthesised { index: usize, report: LineReport },
    /// The episode was assembled.
    Assembled { report: AssemblyReport },
    /// The run completed.
    Finished { output: Box<PodcastOutput> },
}

impl PipelineEvent {
    /// The stage this event belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineEvent::StageStarted { stage } => *stage,
            PipelineEvent::Outline { .. } => Stage::Extract,
            PipelineEvent::Structured { .. } => Stage::Structure,
            PipelineEvent::Plan { .. } => Stage::Parse,
            PipelineEvent::StepSolved { .. } => Stage::Solve,
            PipelineEvent::DialogReady { .. } => Stage::Dialog,
            PipelineEvent::LineSynthesised { .. } => Stage::Synthesize,
            PipelineEvent::Assembled { .. } | PipelineEvent::Finished { .. } => Stage::Assemble,
        }
    }

    /// Position of the task within its stage, for fan-out and per-line events.
    pub fn index(&self) -> Option<usize> {
        match self {
            PipelineEvent::StepSolved { index, .. } => Some(*index),
            PipelineEvent::DialogReady { dialog } => Some(dialog.index),
            PipelineEvent::LineSynthesised { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// A boxed stream of run events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<PipelineEvent, PodcastError>> + Send>>;

/// Generate a podcast from a PDF path or URL, streaming events as they occur.
///
/// The run starts immediately on a spawned task. Dropping the stream does not
/// stop it; use the config's [`crate::config::CancelFlag`] for that.
///
/// # Example
/// ```rust,no_run
/// use paper2podcast::{podcast_events, PipelineEvent, PodcastConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PodcastConfig::default();
/// let mut events = podcast_events("paper.pdf", &config);
/// while let Some(event) = events.next().await {
///     match event? {
///         PipelineEvent::DialogReady { dialog } => println!("step {} scripted", dialog.index),
///         PipelineEvent::Finished { output } => println!("{:?}", output.audio_path),
///         other => println!("{}", other.stage()),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn podcast_events(input: impl Into<String>, config: &PodcastConfig) -> EventStream {
    let input = input.into();
    let config = config.clone();
    spawn_with_events(move |tx| async move {
        podcast::run_from_input(&input, &config, true, Some(tx)).await
    })
}

/// Like [`podcast_events`], for pages that are already encoded.
pub fn podcast_events_from_images(images: Vec<ImageData>, config: &PodcastConfig) -> EventStream {
    let config = config.clone();
    spawn_with_events(move |tx| async move {
        podcast::run_from_images(images, &config, true, Some(tx)).await
    })
}

/// Run `job` on its own task and expose its events followed by its result.
fn spawn_with_events<F, Fut>(job: F) -> EventStream
where
    F: FnOnce(mpsc::Sender<PipelineEvent>) -> Fut,
    Fut: std::future::Future<Output = Result<PodcastOutput, PodcastError>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let handle = tokio::spawn(job(tx));

    // The sender is dropped when the job ends, which ends `events`; only then
    // is the join handle polled for the final result.
    let events = ReceiverStream::new(rx).map(Ok);
    let result = stream::once(async move {
        match handle.await {
            Ok(Ok(output)) => Ok(PipelineEvent::Finished {
                output: Box::new(output),
            }),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(PodcastError::Internal(format!("Pipeline task failed: {e}"))),
        }
    });
    Box::pin(events.chain(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::LineOutcome;

    #[test]
    fn events_report_stage_and_index() {
        let ev = PipelineEvent::StepSolved {
            index: 3,
            step: Step::new("x", vec![]),
            solution: String::new(),
        };
        assert_eq!(ev.stage(), Stage::Solve);
        assert_eq!(ev.index(), Some(3));

        let ev = PipelineEvent::LineSynthesised {
            index: 7,
            report: LineReport {
                dialog: 1,
                line: 2,
                speaker: None,
                outcome: LineOutcome::NoAudio,
            },
        };
        assert_eq!(ev.stage(), Stage::Synthesize);
        assert_eq!(ev.index(), Some(7));

        assert_eq!(
            PipelineEvent::StageStarted { stage: Stage::Dialog }.index(),
            None
        );
    }

    #[test]
    fn events_serialise_with_tag() {
        let json = serde_json::to_value(PipelineEvent::Plan {
            steps: vec![],
            parsed: false,
        })
        .unwrap();
        assert_eq!(json["event"], "plan");
        assert_eq!(json["parsed"], false);
    }
}
