//! Narration: script lines → voice clips → one episode.
//!
//! ```text
//! ScriptLine ─▶ synth ─▶ tts ─▶ AudioClip ─┐
//!   (marker)   (retry)  (HTTP)             ├─▶ assemble ─▶ episode.wav
//!                         bumpers (sine) ──┘   (hound)
//! ```
//!
//! * [`tts`]: the [`tts::SpeechBackend`] seam and the Gradio client
//! * [`synth`]: voice selection per speaker and the bounded retry loop
//! * [`assemble`]: decode, downmix, resample and concatenate, off the runtime

pub mod assemble;
pub mod synth;
pub mod tts;
