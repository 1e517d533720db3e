//! The record a run accumulates as it moves through the stages.
//!
//! The orchestrator is the only writer. Fan-out tasks receive owned copies of
//! what they need (a [`Step`], the shared images) and hand results back by
//! index; they never touch [`PipelineState`] directly, so there is nothing to
//! lock.

use crate::pipeline::dialog::Script;
use edgequake_llm::ImageData;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One step of the paper's method, with its sub-questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub description: String,
    pub substeps: Vec<String>,
}

impl Step {
    pub fn new(description: impl Into<String>, substeps: Vec<String>) -> Self {
        Self {
            description: description.into(),
            substeps,
        }
    }
}

/// The dialog produced for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDialog {
    /// Position of the step in the plan.
    pub index: usize,
    pub step: Step,
    /// Solver output the dialog was written from.
    pub solution: String,
    /// Dialog text as returned by the LLM.
    pub raw: String,
    pub script: Script,
}

/// Accumulated state of one run.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    /// Encoded page images, in page order. Set once.
    pub images: Arc<Vec<ImageData>>,
    /// Append-only: the outline, then the structurer output.
    pub raw_content: Vec<String>,
    /// Parsed plan. Empty when the structurer output could not be parsed.
    pub plan: Vec<Step>,
    /// Whether the structurer output parsed, even into an empty plan.
    pub plan_parsed: bool,
    /// Steps that were solved, index-aligned with `solutions`.
    pub steps: Vec<Step>,
    pub solutions: Vec<String>,
    /// One entry per scripted step, in plan order.
    pub dialogs: Vec<StepDialog>,
}

impl PipelineState {
    pub fn new(images: Vec<ImageData>) -> Self {
        Self {
            images: Arc::new(images),
            ..Default::default()
        }
    }

    /// Most recent entry of `raw_content`, or "" before the first stage ran.
    pub fn latest_raw(&self) -> &str {
        self.raw_content.last().map(String::as_str).unwrap_or("")
    }

    /// Append solved steps, keeping `steps` and `solutions` aligned.
    pub fn record_solutions(&mut self, solved: impl IntoIterator<Item = (Step, String)>) {
        for (step, solution) in solved {
            self.steps.push(step);
            self.solutions.push(solution);
        }
    }

    /// `(index, step, solution)` triples in plan order.
    pub fn solved_steps(&self) -> impl Iterator<Item = (usize, &Step, &str)> {
        self.steps
            .iter()
            .zip(&self.solutions)
            .enumerate()
            .map(|(i, (step, solution))| (i, step, solution.as_str()))
    }
}
