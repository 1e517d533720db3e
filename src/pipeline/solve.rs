//! One plan step → answers to its sub-questions.
//!
//! The solver sees the full page images again: the outline is lossy, and the
//! answers should come from the paper, not from the model's summary of it.

use crate::error::PodcastError;
use crate::pipeline::llm::LlmClient;
use crate::pipeline::state::Step;
use crate::pipeline::Stage;
use crate::prompts::solve_prompt;
use edgequake_llm::ImageData;
use tracing::debug;

pub async fn solve_step(
    client: &LlmClient,
    step: &Step,
    images: &[ImageData],
) -> Result<String, PodcastError> {
    debug!(
        "Solving step '{}' ({} question(s))",
        step.description,
        step.substeps.len()
    );
    client
        .invoke(
            Stage::Solve,
            None,
            solve_prompt(&step.description, &step.substeps),
            images.to_vec(),
        )
        .await
}
