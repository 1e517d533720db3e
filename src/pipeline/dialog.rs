//! Step solution → two-speaker podcast script.
//!
//! Generation is one LLM call per [`DialogTask`]. The raw response is kept
//! as-is on the [`StepDialog`]; a cleaned copy is parsed into a [`Script`] so
//! that synthesis never has to look at markdown again.
//!
//! ## Cleanup rules (applied in order)
//!
//! 1. Normalise line endings (CRLF → LF)
//! 2. Drop `<scratchpad>…</scratchpad>` blocks (the prompt asks the model to
//!    brainstorm there, and some models echo it)
//! 3. Keep only the text after the last `## Podcast Script` heading
//! 4. Rewrite stray speaker labels to the persona markers: `**Guest:**`,
//!    `**Host:**`, `[Guest name]`, and `**Name**:` with the colon outside
//!
//! Each non-blank line of what remains becomes one [`ScriptLine`].

use crate::config::{Persona, PodcastConfig, PodcastLength, Tone};
use crate::error::PodcastError;
use crate::pipeline::llm::LlmClient;
use crate::pipeline::state::{Step, StepDialog};
use crate::pipeline::Stage;
use crate::prompts::dialog_prompt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Input of one Dialog Generator call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogTask {
    /// Position of the step in the plan.
    pub index: usize,
    pub step: Step,
    /// The step's solution, paraphrased into dialog.
    pub text: String,
    pub tone: Tone,
    pub length: PodcastLength,
    pub language: String,
}

impl DialogTask {
    pub fn new(index: usize, step: Step, text: String, config: &PodcastConfig) -> Self {
        Self {
            index,
            step,
            text,
            tone: config.tone,
            length: config.length,
            language: config.language.clone(),
        }
    }
}

/// Write the dialog for one step and parse it.
pub async fn generate_dialog(
    client: &LlmClient,
    task: DialogTask,
    config: &PodcastConfig,
) -> Result<StepDialog, PodcastError> {
    let prompt = dialog_prompt(
        config.dialog_prompt.as_deref(),
        &config.host,
        &config.guest,
        task.tone,
        task.length,
        &task.language,
        &task.text,
    );
    let raw = client.invoke(Stage::Dialog, None, prompt, Vec::new()).await?;
    let script = Script::parse(&raw, &config.host, &config.guest);
    debug!(
        "Step {}: script with {} spoken line(s) of {}",
        task.index,
        script.spoken_count(),
        script.lines.len()
    );

    Ok(StepDialog {
        index: task.index,
        step: task.step,
        solution: task.text,
        raw,
        script,
    })
}

// ── Script model ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Host,
    Guest,
}

/// One line of a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ScriptLine {
    /// Words to be spoken by one persona, without the marker.
    Spoken { speaker: Speaker, text: String },
    /// Anything else: headings, stage directions, a marker with no words.
    Direction { text: String },
}

impl ScriptLine {
    /// Classify one line by its persona marker.
    ///
    /// A host marker wins: every occurrence is removed and the rest trimmed.
    /// Otherwise, for a guest marker, the text after its last occurrence is
    /// kept. A line with neither marker, or with nothing left after removing
    /// it, is a direction.
    pub fn classify(line: &str, host: &Persona, guest: &Persona) -> Self {
        let host_marker = host.marker();
        let guest_marker = guest.marker();

        let spoken = if line.contains(&host_marker) {
            Some((Speaker::Host, line.replace(&host_marker, "").trim().to_string()))
        } else {
            line.rsplit_once(&guest_marker)
                .map(|(_, after)| (Speaker::Guest, after.trim().to_string()))
        };

        match spoken {
            Some((speaker, text)) if !text.is_empty() => ScriptLine::Spoken { speaker, text },
            _ => ScriptLine::Direction {
                text: line.trim().to_string(),
            },
        }
    }

    pub fn speaker(&self) -> Option<Speaker> {
        match self {
            ScriptLine::Spoken { speaker, .. } => Some(*speaker),
            ScriptLine::Direction { .. } => None,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            ScriptLine::Spoken { text, .. } | ScriptLine::Direction { text } => text,
        }
    }
}

/// An ordered podcast script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub lines: Vec<ScriptLine>,
}

impl Script {
    /// Clean raw LLM output and classify each non-blank line.
    pub fn parse(raw: &str, host: &Persona, guest: &Persona) -> Self {
        let cleaned = clean_script(raw, host, guest);
        let lines = cleaned
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| ScriptLine::classify(l, host, guest))
            .collect();
        Self { lines }
    }

    pub fn spoken_count(&self) -> usize {
        self.lines.iter().filter(|l| l.speaker().is_some()).count()
    }

    /// Render back to marker-prefixed text, one line per script line.
    pub fn to_text(&self, host: &Persona, guest: &Persona) -> String {
        self.lines
            .iter()
            .map(|line| match line {
                ScriptLine::Spoken {
                    speaker: Speaker::Host,
                    text,
                } => format!("{} {}", host.marker(), text),
                ScriptLine::Spoken {
                    speaker: Speaker::Guest,
                    text,
                } => format!("{} {}", guest.marker(), text),
                ScriptLine::Direction { text } => text.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ── Cleanup ──────────────────────────────────────────────────────────────

static RE_SCRATCHPAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<scratchpad>.*?</scratchpad>").unwrap());

const SCRIPT_HEADING: &str = "## Podcast Script";

/// Apply the cleanup rules listed in the module docs.
pub fn clean_script(raw: &str, host: &Persona, guest: &Persona) -> String {
    let s = raw.replace("\r\n", "\n");
    let s = RE_SCRATCHPAD.replace_all(&s, "");
    let s = match s.rsplit_once(SCRIPT_HEADING) {
        Some((_, after)) => after,
        None => s.as_ref(),
    };

    s.trim()
        .replace("[Guest name]", &guest.name)
        .replace("**Guest:**", &guest.marker())
        .replace("**Host:**", &host.marker())
        .replace(&format!("**{}**:", guest.name), &guest.marker())
        .replace(&format!("**{}**:", host.name), &host.marker())
}
