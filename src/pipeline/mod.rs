//! Pipeline stages for paper-to-podcast generation.
//!
//! Each submodule implements exactly one transformation step. Keeping stages
//! separate makes each independently testable and lets the orchestrator stay
//! a plain description of the topology.
//!
//! ## Data Flow
//!
//! ```text
//! input ─▶ render ─▶ encode ─▶ extract ─▶ structure ─▶ parse
//! (path)   (pdfium)  (base64)  (outline)  (JSON-ish)    │
//!                                                        ▼
//!                      dialog ◀══ fan-out ══ solve ◀══ fan-out
//!                      (script)              (answers)
//! ```
//!
//! 1. [`input`]: canonicalise the user-supplied path or URL to a local file
//! 2. [`render`]: rasterise every page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`encode`]: PNG/JPEG-encode and base64-wrap each page for the LLM
//! 4. [`extract`]: one LLM call: page images → free-text outline
//! 5. [`structure`]: one LLM call: outline → JSON, plus the tolerant parser
//! 6. [`solve`]: one LLM call per step: questions → answers
//! 7. [`dialog`]: one LLM call per step: answers → host/guest script
//!
//! [`orchestrator`] wires 4–7 together over a [`state::PipelineState`];
//! [`llm`] is the only module that talks to a provider.

pub mod dialog;
pub mod encode;
pub mod extract;
pub mod input;
pub mod llm;
pub mod orchestrator;
pub mod render;
pub mod solve;
pub mod state;
pub mod structure;

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named step of a run, used to tag errors, events and progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Render,
    Extract,
    Structure,
    Parse,
    Solve,
    Dialog,
    Synthesize,
    Assemble,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Render => "render",
            Stage::Extract => "extract",
            Stage::Structure => "structure",
            Stage::Parse => "parse",
            Stage::Solve => "solve",
            Stage::Dialog => "dialog",
            Stage::Synthesize => "synthesize",
            Stage::Assemble => "assemble",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
