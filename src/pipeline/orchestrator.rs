//! The fixed stage topology, and the only writer of [`PipelineState`].
//!
//! ```text
//! extract ─▶ structure ─▶ parse ─▶ solve × N ─▶ dialog × N
//! ```
//!
//! ## Fan-in ordering
//!
//! Both fan-outs run through `buffer_unordered(concurrency)`, so with
//! `concurrency > 1` tasks finish in any order. Results are gathered into a
//! `BTreeMap` keyed by the task's plan index and read back in key order:
//! `steps`, `solutions` and `dialogs` are always in plan order, whatever the
//! completion order was. With the default `concurrency = 1` tasks simply run
//! one after the other.
//!
//! ## Failure and cancellation
//!
//! Any LLM error is fatal and aborts the batch it occurred in; in-flight
//! sibling tasks are dropped. The [`crate::config::CancelFlag`] is checked
//! before every stage and before every fan-out task starts.

use crate::config::PodcastConfig;
use crate::error::PodcastError;
use crate::pipeline::dialog::{generate_dialog, DialogTask};
use crate::pipeline::extract::extract_outline;
use crate::pipeline::llm::LlmClient;
use crate::pipeline::solve::solve_step;
use crate::pipeline::state::{PipelineState, Step};
use crate::pipeline::structure::{parse_plan, structure_outline, PlanOutcome};
use crate::pipeline::Stage;
use crate::stream::PipelineEvent;
use edgequake_llm::ImageData;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Runs the generation stages over one paper.
pub struct Orchestrator {
    client: LlmClient,
    config: PodcastConfig,
    events: Option<mpsc::Sender<PipelineEvent>>,
}

impl Orchestrator {
    pub fn new(client: LlmClient, config: PodcastConfig) -> Self {
        Self {
            client,
            config,
            events: None,
        }
    }

    /// Also publish every stage start and task result on `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn client(&self) -> &LlmClient {
        &self.client
    }

    /// Run extract → structure → parse → solve → dialog.
    pub async fn run(&self, images: Vec<ImageData>) -> Result<PipelineState, PodcastError> {
        let mut state = PipelineState::new(images);

        // ── Stage 1: Extract ─────────────────────────────────────────────
        self.begin(Stage::Extract, 10, "Reading the paper").await?;
        let outline = extract_outline(&self.client, &state.images).await?;
        state.raw_content.push(outline.clone());
        self.emit(PipelineEvent::Outline { text: outline }).await;

        // ── Stage 2: Structure ───────────────────────────────────────────
        self.begin(Stage::Structure, 25, "Structuring the outline").await?;
        let structured = structure_outline(&self.client, state.latest_raw()).await?;
        state.raw_content.push(structured.clone());
        self.emit(PipelineEvent::Structured { text: structured }).await;

        // ── Stage 3: Parse ───────────────────────────────────────────────
        self.begin(Stage::Parse, 30, "Parsing the plan").await?;
        let outcome = parse_plan(state.latest_raw());
        let parsed = matches!(outcome, PlanOutcome::Parsed(_));
        state.plan_parsed = parsed;
        state.plan = outcome.into_plan();
        info!("Plan has {} step(s)", state.plan.len());
        self.emit(PipelineEvent::Plan {
            steps: state.plan.clone(),
            parsed,
        })
        .await;

        // ── Stage 4: Solve (fan-out 1) ───────────────────────────────────
        let message = format!("Answering {} step(s)", state.plan.len());
        self.begin(Stage::Solve, 35, &message).await?;
        let images = Arc::clone(&state.images);
        let solved = self
            .fan_out(Stage::Solve, state.plan.clone(), |index, step: Step| {
                let images = Arc::clone(&images);
                async move {
                    let solution = solve_step(&self.client, &step, &images).await?;
                    self.emit(PipelineEvent::StepSolved {
                        index,
                        step: step.clone(),
                        solution: solution.clone(),
                    })
                    .await;
                    Ok((step, solution))
                }
            })
            .await?;
        state.record_solutions(solved);

        // ── Stage 5: Dialog (fan-out 2) ──────────────────────────────────
        let message = format!("Scripting {} dialog(s)", state.steps.len());
        self.begin(Stage::Dialog, 60, &message).await?;
        let tasks: Vec<DialogTask> = state
            .solved_steps()
            .map(|(index, step, solution)| {
                DialogTask::new(index, step.clone(), solution.to_string(), &self.config)
            })
            .collect();
        state.dialogs = self
            .fan_out(Stage::Dialog, tasks, |_, task| async move {
                let dialog = generate_dialog(&self.client, task, &self.config).await?;
                self.emit(PipelineEvent::DialogReady {
                    dialog: dialog.clone(),
                })
                .await;
                Ok(dialog)
            })
            .await?;

        info!("Generated {} dialog(s)", state.dialogs.len());
        Ok(state)
    }

    /// Run `task` over `items` with bounded parallelism, returning results in
    /// item order. The first error aborts the batch.
    async fn fan_out<T, R, F, Fut>(
        &self,
        stage: Stage,
        items: Vec<T>,
        task: F,
    ) -> Result<Vec<R>, PodcastError>
    where
        F: Fn(usize, T) -> Fut,
        Fut: Future<Output = Result<R, PodcastError>>,
    {
        let total = items.len();
        let task = &task;
        let gathered: BTreeMap<usize, R> = stream::iter(items.into_iter().enumerate())
            .map(|(index, item)| async move {
                if self.config.is_cancelled() {
                    return Err(PodcastError::Cancelled { stage });
                }
                let result = task(index, item).await?;
                if let Some(cb) = &self.config.progress_callback {
                    cb.on_task_complete(stage, index, total);
                }
                Ok((index, result))
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .try_collect()
            .await?;
        Ok(gathered.into_values().collect())
    }

    /// Stage boundary: honour cancellation, then report the stage.
    async fn begin(&self, stage: Stage, percent: u8, message: &str) -> Result<(), PodcastError> {
        if self.config.is_cancelled() {
            info!("Cancelled before {}", stage);
            return Err(PodcastError::Cancelled { stage });
        }
        info!("Stage {}: {}", stage, message);
        if let Some(cb) = &self.config.progress_callback {
            cb.on_stage(stage, percent, message);
        }
        self.emit(PipelineEvent::StageStarted { stage }).await;
        Ok(())
    }

    async fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is listening any more.
            let _ = tx.send(event).await;
        }
    }
}
