//! Offline integration tests: a scripted chat model and a fake TTS backend
//! that writes real WAV clips, driven through the public API.
//!
//! Rendering is skipped by feeding page images directly, so these tests need
//! neither libpdfium nor network access.
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use edgequake_llm::ImageData;
use futures::StreamExt;
use paper2podcast::{
    generate_podcast_from_images, narrate, podcast_events_from_images, CancelFlag, ChatModel,
    Completion, LineOutcome, LlmRequest, PipelineEvent, PodcastConfig, PodcastError,
    PodcastProgressCallback, ScriptLine, SpeechBackend, SpeechRequest, Speaker, Stage, TtsError,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ── Test doubles ─────────────────────────────────────────────────────────────

const PLAN_JSON: &str = r#"```json
[
  {"step": "Collect data", "substeps": [{"key": "q1", "value": "Which corpus?"}]},
  {"step": "Train model", "substeps": [{"key": "q1", "value": "Which optimiser?"}, {"key": "q2", "value": "How long?"}]}
]
```"#;

/// Answers every stage from its prompt wording.
struct PaperModel {
    plan: String,
    /// Solve delay per step description.
    delays: Vec<(String, u64)>,
    /// Solve calls for this step always fail.
    failing_step: Option<String>,
    dialog_calls: AtomicUsize,
}

impl PaperModel {
    fn new(plan: &str) -> Self {
        Self {
            plan: plan.to_string(),
            delays: Vec::new(),
            failing_step: None,
            dialog_calls: AtomicUsize::new(0),
        }
    }
}

fn after<'a>(prompt: &'a str, tag: &str) -> &'a str {
    prompt
        .rsplit_once(tag)
        .map(|(_, rest)| rest)
        .unwrap_or_default()
}

#[async_trait]
impl ChatModel for PaperModel {
    fn name(&self) -> &str {
        "paper-model"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<Completion, String> {
        let p = &request.prompt;
        let content = if p.contains("\nTEXT: ") {
            self.dialog_calls.fetch_add(1, Ordering::SeqCst);
            let text = after(p, "\nTEXT: ").trim();
            format!(
                "<scratchpad>plan the chat</scratchpad>\n## Podcast Script\n\
                 **Host:** Today: {text}.\n\
                 **Dr. Sharma:** Right, {text}.\n\
                 (both laugh)"
            )
        } else if p.contains("identify all the steps") {
            "1. Collect data\n2. Train model".to_string()
        } else if p.contains("schema:") {
            self.plan.clone()
        } else if p.contains("Instruction:") {
            let step = after(p, "Instruction:\n").lines().next().unwrap_or_default();
            if self.failing_step.as_deref() == Some(step) {
                return Err("HTTP 500".to_string());
            }
            if let Some((_, ms)) = self.delays.iter().find(|(s, _)| s == step) {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            format!("answer for {step}")
        } else {
            return Err(format!("unexpected prompt: {p}"));
        };
        Ok(Completion::text(content))
    }
}

/// Writes a 100 ms, 22.05 kHz mono clip per call; fails lines containing
/// `fail_on`.
struct FakeSpeech {
    dir: PathBuf,
    calls: AtomicUsize,
    requests: Mutex<Vec<SpeechRequest>>,
    fail_on: Option<String>,
}

impl FakeSpeech {
    fn new(dir: &Path) -> Arc<Self> {
        Arc::new(Self {
            dir: dir.to_path_buf(),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            fail_on: None,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechBackend for FakeSpeech {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<PathBuf, TtsError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(marker) = &self.fail_on {
            if request.text.contains(marker.as_str()) {
                return Err(TtsError::Remote("queue full".into()));
            }
        }

        let path = self.dir.join(format!("fake-{n}.wav"));
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..2_205 {
            writer.write_sample(((i % 50) * 100) as i16).unwrap();
        }
        writer.finalize().unwrap();
        Ok(path)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn pages() -> Vec<ImageData> {
    vec![ImageData::new("aGVsbG8=", "image/png")]
}

fn config(model: Arc<PaperModel>, speech: Arc<FakeSpeech>, work: &TempDir) -> PodcastConfig {
    PodcastConfig::builder()
        .chat_model(model)
        .speech_backend(speech)
        .work_dir(work.path())
        .retry_backoff_ms(0)
        .tts_retry_pause_ms(0)
        .build()
        .unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn paper_becomes_one_episode() {
    let work = TempDir::new().unwrap();
    let clips = TempDir::new().unwrap();
    let model = Arc::new(PaperModel::new(PLAN_JSON));
    let speech = FakeSpeech::new(clips.path());

    let output = generate_podcast_from_images(pages(), &config(model, speech.clone(), &work))
        .await
        .unwrap();

    assert_eq!(output.outline, "1. Collect data\n2. Train model");
    assert_eq!(output.plan.len(), 2);
    assert_eq!(output.plan[1].substeps, vec!["Which optimiser?", "How long?"]);
    assert_eq!(output.dialogs.len(), 2);

    // Two spoken lines and one direction per dialog.
    assert_eq!(output.lines.len(), 6);
    assert_eq!(speech.calls(), 4);
    assert_eq!(output.stats.lines_synthesised, 4);
    assert_eq!(output.stats.lines_failed, 0);
    assert_eq!(output.lines[2].outcome, LineOutcome::NoAudio);
    assert_eq!(output.lines[0].speaker, Some(Speaker::Host));
    assert_eq!(output.lines[1].speaker, Some(Speaker::Guest));

    // `**Host:**` was normalised to the host persona; the scratchpad is gone.
    let first = &speech.requests.lock().unwrap()[0];
    assert_eq!(first.text, "Today: answer for Collect data.");
    assert_eq!(first.speaker, "EN-US");

    let path = output.audio_path.expect("episode written");
    assert!(path.starts_with(work.path().join("voices").join("tmp")));
    let reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, 44_100);
    assert_eq!(spec.bits_per_sample, 16);

    // 1 s lead + 4 × 100 ms + 1 s trail.
    let ms = output.stats.audio_duration_ms;
    assert!((2_350..=2_450).contains(&ms), "duration was {ms}ms");
}

#[tokio::test]
async fn dialogs_stay_aligned_with_plan() {
    let work = TempDir::new().unwrap();
    let clips = TempDir::new().unwrap();
    let model = Arc::new(PaperModel::new(PLAN_JSON));
    let speech = FakeSpeech::new(clips.path());

    let output = generate_podcast_from_images(pages(), &config(model, speech, &work))
        .await
        .unwrap();

    for (i, dialog) in output.dialogs.iter().enumerate() {
        assert_eq!(dialog.index, i);
        assert_eq!(dialog.step, output.plan[i]);
        assert_eq!(dialog.solution, format!("answer for {}", output.plan[i].description));
    }
    let dialog_of_lines: Vec<usize> = output.lines.iter().map(|l| l.dialog).collect();
    assert_eq!(dialog_of_lines, vec![0, 0, 0, 1, 1, 1]);
}

#[tokio::test]
async fn unparseable_plan_gives_empty_episode() {
    let work = TempDir::new().unwrap();
    let clips = TempDir::new().unwrap();
    let model = Arc::new(PaperModel::new("Sorry, here are the steps: first, second"));
    let speech = FakeSpeech::new(clips.path());

    let output = generate_podcast_from_images(pages(), &config(model, speech.clone(), &work))
        .await
        .unwrap();

    assert!(output.plan.is_empty());
    assert!(!output.stats.plan_parsed);
    assert!(output.dialogs.is_empty());
    assert!(output.lines.is_empty());
    assert!(output.audio_path.is_none());
    assert_eq!(speech.calls(), 0);
}

#[tokio::test]
async fn empty_plan_still_counts_as_parsed() {
    let work = TempDir::new().unwrap();
    let clips = TempDir::new().unwrap();
    let model = Arc::new(PaperModel::new("```json\n[]\n```"));
    let speech = FakeSpeech::new(clips.path());

    let output = generate_podcast_from_images(pages(), &config(model, speech.clone(), &work))
        .await
        .unwrap();

    assert!(output.plan.is_empty());
    assert!(output.stats.plan_parsed);
    assert!(output.dialogs.is_empty());
    assert_eq!(speech.calls(), 0);
}

#[tokio::test]
async fn concurrent_fan_in_keeps_plan_order() {
    let work = TempDir::new().unwrap();
    let clips = TempDir::new().unwrap();
    let plan = r#"[
        {"step": "A", "substeps": []},
        {"step": "B", "substeps": []},
        {"step": "C", "substeps": []}
    ]"#;
    let mut model = PaperModel::new(plan);
    model.delays = vec![("A".into(), 200), ("B".into(), 100), ("C".into(), 0)];
    let model = Arc::new(model);
    let speech = FakeSpeech::new(clips.path());
    let config = PodcastConfig::builder()
        .chat_model(model)
        .speech_backend(speech)
        .work_dir(work.path())
        .concurrency(3)
        .build()
        .unwrap();

    let mut events = podcast_events_from_images(pages(), &config);
    let mut solved_order = Vec::new();
    let mut output = None;
    while let Some(event) = events.next().await {
        match event.unwrap() {
            PipelineEvent::StepSolved { index, .. } => solved_order.push(index),
            PipelineEvent::Finished { output: o } => output = Some(o),
            _ => {}
        }
    }
    let output = output.expect("finished event");

    // Completion order follows the delays; results follow the plan.
    assert_eq!(solved_order.first(), Some(&2));
    let mut sorted = solved_order.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![0, 1, 2]);

    let descriptions: Vec<&str> = output
        .dialogs
        .iter()
        .map(|d| d.step.description.as_str())
        .collect();
    assert_eq!(descriptions, vec!["A", "B", "C"]);
    assert_eq!(output.dialogs[0].solution, "answer for A");
}

#[tokio::test]
async fn failing_step_aborts_the_run() {
    let work = TempDir::new().unwrap();
    let clips = TempDir::new().unwrap();
    let mut model = PaperModel::new(PLAN_JSON);
    model.failing_step = Some("Train model".into());
    let model = Arc::new(model);
    let speech = FakeSpeech::new(clips.path());
    let config = PodcastConfig::builder()
        .chat_model(model.clone())
        .speech_backend(speech.clone())
        .work_dir(work.path())
        .max_retries(1)
        .retry_backoff_ms(0)
        .build()
        .unwrap();

    let err = generate_podcast_from_images(pages(), &config)
        .await
        .unwrap_err();

    match err {
        PodcastError::LlmCallFailed {
            stage, attempts, ..
        } => {
            assert_eq!(stage, Stage::Solve);
            assert_eq!(attempts, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(model.dialog_calls.load(Ordering::SeqCst), 0);
    assert_eq!(speech.calls(), 0);
}

#[tokio::test]
async fn failed_lines_are_reported_and_skipped() {
    let work = TempDir::new().unwrap();
    let clips = TempDir::new().unwrap();
    let model = Arc::new(PaperModel::new(PLAN_JSON));
    let speech = Arc::new(FakeSpeech {
        dir: clips.path().to_path_buf(),
        calls: AtomicUsize::new(0),
        requests: Mutex::new(Vec::new()),
        fail_on: Some("Right, answer for Train model".into()),
    });

    let output = generate_podcast_from_images(pages(), &config(model, speech.clone(), &work))
        .await
        .unwrap();

    // Three spoken lines succeed first time; the failing one uses all attempts.
    assert_eq!(speech.calls(), 3 + 3);
    assert_eq!(output.stats.lines_synthesised, 3);
    assert_eq!(output.stats.lines_failed, 1);
    assert_eq!(
        output.lines[4].outcome,
        LineOutcome::Failed {
            error: TtsError::Remote("queue full".into())
        }
    );
    assert!(output.audio_path.is_some());
}

/// Cancels the run as soon as the named stage starts.
struct CancelAt {
    stage: Stage,
    flag: CancelFlag,
}

impl PodcastProgressCallback for CancelAt {
    fn on_stage(&self, stage: Stage, _percent: u8, _message: &str) {
        if stage == self.stage {
            self.flag.cancel();
        }
    }
}

#[tokio::test]
async fn cancellation_stops_before_next_task() {
    let work = TempDir::new().unwrap();
    let clips = TempDir::new().unwrap();
    let model = Arc::new(PaperModel::new(PLAN_JSON));
    let speech = FakeSpeech::new(clips.path());
    let flag = CancelFlag::new();
    let config = PodcastConfig::builder()
        .chat_model(model.clone())
        .speech_backend(speech.clone())
        .work_dir(work.path())
        .cancel_flag(flag.clone())
        .progress_callback(Arc::new(CancelAt {
            stage: Stage::Solve,
            flag,
        }))
        .build()
        .unwrap();

    let err = generate_podcast_from_images(pages(), &config)
        .await
        .unwrap_err();

    assert!(matches!(err, PodcastError::Cancelled { stage: Stage::Solve }));
    assert_eq!(err.to_string(), "Cancelled at the solve stage");
    assert_eq!(model.dialog_calls.load(Ordering::SeqCst), 0);
    assert_eq!(speech.calls(), 0);
}

#[tokio::test]
async fn event_stream_tags_stage_and_index() {
    let work = TempDir::new().unwrap();
    let clips = TempDir::new().unwrap();
    let model = Arc::new(PaperModel::new(PLAN_JSON));
    let speech = FakeSpeech::new(clips.path());

    let events: Vec<PipelineEvent> = podcast_events_from_images(pages(), &config(model, speech, &work))
        .map(|e| e.unwrap())
        .collect()
        .await;

    let stages: Vec<Stage> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::StageStarted { stage } => Some(*stage),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![
            Stage::Extract,
            Stage::Structure,
            Stage::Parse,
            Stage::Solve,
            Stage::Dialog,
            Stage::Synthesize,
            Stage::Assemble
        ]
    );

    let dialog_indices: Vec<usize> = events
        .iter()
        .filter(|e| e.stage() == Stage::Dialog)
        .filter_map(PipelineEvent::index)
        .collect();
    assert_eq!(dialog_indices, vec![0, 1]);

    let line_indices: Vec<usize> = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::LineSynthesised { .. }))
        .filter_map(PipelineEvent::index)
        .collect();
    assert_eq!(line_indices, (0..6).collect::<Vec<_>>());

    assert!(matches!(
        events.iter().find(|e| matches!(e, PipelineEvent::Plan { .. })),
        Some(PipelineEvent::Plan { parsed: true, .. })
    ));
    assert!(matches!(events.last(), Some(PipelineEvent::Finished { .. })));
}

#[tokio::test]
async fn scripts_can_be_narrated_later() {
    let work = TempDir::new().unwrap();
    let clips = TempDir::new().unwrap();
    let model = Arc::new(PaperModel::new(PLAN_JSON));
    let speech = FakeSpeech::new(clips.path());
    let config = config(model, speech.clone(), &work);

    let first = generate_podcast_from_images(pages(), &config).await.unwrap();
    let calls_after_first = speech.calls();

    let again = narrate(&first.dialogs, &config).await.unwrap();
    assert_eq!(speech.calls(), calls_after_first * 2);
    assert_eq!(again.lines.len(), first.lines.len());
    assert_eq!(again.assembly.included, 4);
    assert!(again.assembly.path.is_some());
    assert_ne!(again.assembly.path, first.audio_path);

    // Directions are carried through untouched.
    assert!(matches!(
        first.dialogs[0].script.lines[2],
        ScriptLine::Direction { .. }
    ));
}
