//! Prompts for the four LLM stages.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: changing what a stage asks for requires
//!    editing exactly one place, never the retry or fan-out logic.
//!
//! 2. **Testability**: unit tests can inspect the built prompts directly
//!    without spinning up a real LLM, making prompt regressions easy to catch.
//!
//! Callers can replace the dialog system prompt via
//! [`crate::config::PodcastConfig::dialog_prompt`]; the tone, length and
//! language lines are appended to whichever prompt is in effect.

use crate::config::{Persona, PodcastLength, Tone};

/// Outline prompt, sent together with every page image.
pub const OUTLINE_PROMPT: &str = r#"Consider you are a research scientist in artificial intelligence who is expert in understanding research papers.
You will be given a research paper and you need to identify all the steps a researcher need to perform.
Identify each steps and their substeps."#;

/// Schema prompt for the structurer. `{content}` is replaced by the outline.
const STRUCTURE_PROMPT: &str = r#"You are given a markdown content and you need to parse this data into json format. Follow correctly key and value
pairs for each bullet point.
Follow following schema strictly.

schema:
[
  {
    "step": "description of step 1",
    "substeps": [
      {
        "key": "title of sub step 1 of step 1",
        "value": "description of sub step 1 of step 1"
      },
      {
        "key": "title of sub step 2 of step 1",
        "value": "description of sub step 2 of step 1"
      }
    ]
  },
  {
    "step": "description of step 2",
    "substeps": [
      {
        "key": "title of sub step 1 of step 2",
        "value": "description of sub step 1 of step 2"
      }
    ]
  }
]

Content:
{content}"#;

/// Build the structurer prompt around the outline text.
pub fn structure_prompt(outline: &str) -> String {
    STRUCTURE_PROMPT.replace("{content}", outline)
}

/// Build the solver prompt for one step.
///
/// Each substep becomes a `Question:`/`Answer:` scaffold; the scaffolds are
/// joined with a single space so the model answers them in order.
pub fn solve_prompt(description: &str, substeps: &[String]) -> String {
    let questions = substeps
        .iter()
        .map(|s| format!("\n Question: {s} \n Answer:"))
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "You will be given instruction to analyze research papers. You need to understand the\n\
instruction and solve all the questions mentioned in the list.\n\
Keep the pair of Question and its answer in your response. Your response should be next to the keyword \"Answer\"\n\
\n\
Instruction:\n\
{description}\n\
Questions:\n\
{questions}\n"
    )
}

/// Built-in dialog system prompt. `{host}` and `{guest}` are persona names.
const DIALOG_SYSTEM_PROMPT: &str = r#"You are a world-class podcast producer tasked with transforming the provided input text into an engaging and informative podcast script. The input may be unstructured or messy, sourced from PDFs or web pages. Your goal is to extract the most interesting and insightful content for a compelling podcast discussion.

# Steps to Follow:

1. **Analyze the Input:**
   Carefully examine the text, identifying key topics, points, and interesting facts or anecdotes that
   could drive an engaging podcast conversation. Disregard irrelevant information or formatting issues.

2. **Brainstorm Ideas:**
   In the `<scratchpad>`, creatively brainstorm ways to present the key points engagingly. Consider:
   - Analogies, storytelling techniques, or hypothetical scenarios to make content relatable
   - Ways to make complex topics accessible to a general audience
   - Thought-provoking questions to explore during the podcast
   - Creative approaches to fill any gaps in the information

3. **Craft the Dialogue:**
   Develop a natural, conversational flow between the host ({host}) and {guest} (the author or an expert on the topic). Incorporate:
   - The best ideas from your brainstorming session
   - Clear explanations of complex topics
   - An engaging and lively tone to captivate listeners
   - A balance of information and entertainment

   Rules for the dialogue:
   - The host ({host}) always initiates the conversation and interviews {guest}
   - Include thoughtful questions from the host to guide the discussion
   - Incorporate natural speech patterns, including occasional verbal fillers (e.g., "um," "well," "you know")
   - Allow for natural interruptions and back-and-forth between host and {guest}
   - Ensure {guest}'s responses are substantiated by the input text, avoiding unsupported claims
   - Maintain a PG-rated conversation appropriate for all audiences
   - Avoid any marketing or self-promotional content from {guest}
   - The host concludes the conversation

4. **Summarize Key Insights:**
   Naturally weave a summary of key points into the closing part of the dialogue. This should feel like a casual conversation rather than a formal recap, reinforcing the main takeaways before signing off.

5. **Maintain Authenticity:**
   Throughout the script, strive for authenticity in the conversation. Include:
   - Moments of genuine curiosity or surprise from the host
   - Instances where {guest} might briefly struggle to articulate a complex idea
   - Light-hearted moments or humor when appropriate
   - Brief personal anecdotes or examples that relate to the topic (within the bounds of the input text)

6. **Consider Pacing and Structure:**
   Ensure the dialogue has a natural ebb and flow:
   - Start with a strong hook to grab the listener's attention
   - Gradually build complexity as the conversation progresses
   - Include brief "breather" moments for listeners to absorb complex information
   - End on a high note, perhaps with a thought-provoking question or a call-to-action for listeners

7. **Script Format:**
   Put the finished dialogue under a `## Podcast Script` heading. Write one spoken turn per line and
   start every spoken line with the speaker's bold label, either `**{host}:**` or `**{guest}:**`.
"#;

/// Build the full dialog prompt for one step.
///
/// `base` overrides the built-in system prompt; `{host}` and `{guest}`
/// placeholders in it are substituted either way.
pub fn dialog_prompt(
    base: Option<&str>,
    host: &Persona,
    guest: &Persona,
    tone: Tone,
    length: PodcastLength,
    language: &str,
    text: &str,
) -> String {
    let mut prompt = base
        .unwrap_or(DIALOG_SYSTEM_PROMPT)
        .replace("{host}", &host.name)
        .replace("{guest}", &guest.name);

    prompt.push_str("\nPLEASE paraphrase the following TEXT in dialog format.");
    prompt.push_str(&format!(
        "\n\nTONE: The tone of the podcast should be {}.",
        tone.as_prompt_str()
    ));
    prompt.push_str(&format!("\n\nLENGTH: {}", length.instruction()));
    if !language.trim().is_empty() {
        prompt.push_str(&format!(
            "\n\nOUTPUT LANGUAGE <IMPORTANT>: The podcast should be in {language}."
        ));
    }
    prompt.push_str("\nTEXT: ");
    prompt.push_str(text);
    prompt
}
