//! Page images → free-text outline of the paper's steps.

use crate::error::PodcastError;
use crate::pipeline::llm::LlmClient;
use crate::pipeline::Stage;
use crate::prompts::OUTLINE_PROMPT;
use edgequake_llm::ImageData;
use tracing::info;

/// One LLM call over every page image. The outline is returned verbatim.
pub async fn extract_outline(
    client: &LlmClient,
    images: &[ImageData],
) -> Result<String, PodcastError> {
    info!("Extracting outline from {} page image(s)", images.len());
    client
        .invoke(
            Stage::Extract,
            None,
            OUTLINE_PROMPT.to_string(),
            images.to_vec(),
        )
        .await
}
