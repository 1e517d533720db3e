//! Outline → plan: one LLM call plus a tolerant, deterministic parser.
//!
//! The structurer asks for a JSON array of `{step, substeps:[{key, value}]}`.
//! Models routinely wrap it in code fences, so the parser drops fence lines
//! before parsing. Anything else that is wrong with the text (bad syntax, a
//! missing field, the wrong shape) yields [`PlanOutcome::Unparseable`]: the
//! run continues with an empty plan instead of failing.

use crate::error::PodcastError;
use crate::pipeline::llm::LlmClient;
use crate::pipeline::state::Step;
use crate::pipeline::Stage;
use crate::prompts::structure_prompt;
use serde::Deserialize;
use tracing::{debug, warn};

/// Ask the LLM to turn the outline into schema-shaped JSON text.
pub async fn structure_outline(client: &LlmClient, outline: &str) -> Result<String, PodcastError> {
    client
        .invoke(Stage::Structure, None, structure_prompt(outline), Vec::new())
        .await
}

/// Result of parsing the structurer output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    Parsed(Vec<Step>),
    Unparseable { reason: String },
}

impl PlanOutcome {
    /// The parsed steps, or an empty plan.
    pub fn into_plan(self) -> Vec<Step> {
        match self {
            PlanOutcome::Parsed(steps) => steps,
            PlanOutcome::Unparseable { .. } => Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct RawStep {
    step: String,
    substeps: Vec<RawSubstep>,
}

/// `key` is the substep title; only `value` is carried into the plan.
#[derive(Deserialize)]
struct RawSubstep {
    value: String,
}

/// Parse structurer output into a plan.
///
/// Lines whose trimmed form starts with ```` ``` ```` or `'''` are dropped,
/// the rest are joined and parsed. Each substep contributes its `value`, in
/// order.
pub fn parse_plan(text: &str) -> PlanOutcome {
    let json: String = text
        .lines()
        .filter(|line| {
            let t = line.trim();
            !t.starts_with("```") && !t.starts_with("'''")
        })
        .collect::<Vec<_>>()
        .join("\n");
    let json = json.trim();

    match serde_json::from_str::<Vec<RawStep>>(json) {
        Ok(raw) => {
            let steps: Vec<Step> = raw
                .into_iter()
                .map(|r| Step {
                    description: r.step,
                    substeps: r.substeps.into_iter().map(|s| s.value).collect(),
                })
                .collect();
            debug!("Parsed plan with {} steps", steps.len());
            PlanOutcome::Parsed(steps)
        }
        Err(e) => {
            warn!("Structurer output is not a valid plan, continuing with none: {}", e);
            PlanOutcome::Unparseable {
                reason: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FENCED: &str = r#"```json
[
  {"step": "Collect data", "substeps": [
    {"key": "Source", "value": "Scrape arXiv"},
    {"key": "Clean", "value": "Drop duplicates"}
  ]},
  {"step": "Train", "substeps": []},
  {"step": "Evaluate", "substeps": [{"key": "Metric", "value": "BLEU"}]}
]
```"#;

    #[test]
    fn parses_fenced_plan_in_order() {
        let plan = parse_plan(FENCED).into_plan();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].description, "Collect data");
        assert_eq!(plan[0].substeps, vec!["Scrape arXiv", "Drop duplicates"]);
        assert!(plan[1].substeps.is_empty());
        assert_eq!(plan[2].substeps, vec!["BLEU"]);
    }

    #[test]
    fn triple_quote_fences_are_dropped() {
        let text = "'''\n[{\"step\": \"A\", \"substeps\": [{\"value\": \"x\"}]}]\n'''";
        assert_eq!(
            parse_plan(text),
            PlanOutcome::Parsed(vec![Step::new("A", vec!["x".into()])])
        );
    }

    #[test]
    fn invalid_json_yields_empty_plan() {
        let outcome = parse_plan("Here are the steps:\n1. Read the paper");
        assert!(matches!(outcome, PlanOutcome::Unparseable { .. }));
        assert!(outcome.into_plan().is_empty());
    }

    #[test]
    fn schema_mismatch_is_unparseable() {
        // Valid JSON, but substeps are plain strings.
        let outcome = parse_plan(r#"[{"step": "A", "substeps": ["x"]}]"#);
        assert!(matches!(outcome, PlanOutcome::Unparseable { .. }));
    }

    #[test]
    fn empty_array_is_an_empty_plan() {
        assert_eq!(parse_plan("```\n[]\n```"), PlanOutcome::Parsed(vec![]));
    }
}
