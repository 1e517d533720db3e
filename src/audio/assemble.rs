//! Clips → one episode: lead bumper, every clip in order, trail bumper.
//!
//! ## Why normalise every clip?
//!
//! TTS backends return whatever their model emits: 22 kHz or 44.1 kHz,
//! mono or stereo, 16-bit or float. Each clip is decoded to `f32`, downmixed
//! to mono and linearly resampled to the episode rate before concatenation,
//! so the output is one uniform 16-bit mono WAV.
//!
//! ## Bumper cache
//!
//! Bumpers are sine tones cached under `<work_dir>/voices/`. They are written
//! to a temp file in the same directory and renamed into place, so a
//! concurrent run never reads a half-written bumper.
//!
//! Decoding and encoding are CPU-bound and run in `spawn_blocking`.

use crate::audio::synth::Synthesis;
use crate::config::{Bumper, PodcastConfig};
use crate::error::PodcastError;
use serde::{Deserialize, Serialize};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A clip that could not be included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedClip {
    pub path: PathBuf,
    pub reason: String,
}

/// What assembly produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyReport {
    /// The episode file. `None` when there was nothing to assemble.
    pub path: Option<PathBuf>,
    /// Clips that made it into the episode.
    pub included: usize,
    pub skipped: Vec<SkippedClip>,
    /// Episode length, bumpers included.
    pub duration_ms: u64,
}

/// Assemble the episode from synthesis outcomes, in the order given.
///
/// `NoAudio` entries are ignored. If no clip remains, or none of them can be
/// decoded, nothing is written and the report's `path` is `None`.
pub async fn assemble(
    outcomes: &[Synthesis],
    config: &PodcastConfig,
) -> Result<AssemblyReport, PodcastError> {
    let clips: Vec<PathBuf> = outcomes
        .iter()
        .filter_map(|o| match o {
            Synthesis::Clip(clip) => Some(clip.path.clone()),
            Synthesis::NoAudio => None,
        })
        .collect();

    if clips.is_empty() {
        info!("No clips to assemble");
        return Ok(AssemblyReport::default());
    }

    let job = AssemblyJob {
        clips,
        voices_dir: config.voices_dir(),
        episodes_dir: config.episodes_dir(),
        sample_rate: config.sample_rate,
        lead: config.lead_bumper,
        trail: config.trail_bumper,
    };

    tokio::task::spawn_blocking(move || job.run())
        .await
        .map_err(|e| PodcastError::Internal(format!("Assembly task panicked: {e}")))?
}

struct AssemblyJob {
    clips: Vec<PathBuf>,
    voices_dir: PathBuf,
    episodes_dir: PathBuf,
    sample_rate: u32,
    lead: Bumper,
    trail: Bumper,
}

impl AssemblyJob {
    fn run(self) -> Result<AssemblyReport, PodcastError> {
        let mut report = AssemblyReport::default();
        let mut voice: Vec<f32> = Vec::new();

        for path in &self.clips {
            match load_mono(path, self.sample_rate) {
                Ok(samples) => {
                    debug!("Loaded {} ({} samples)", path.display(), samples.len());
                    voice.extend_from_slice(&samples);
                    report.included += 1;
                }
                Err(reason) => {
                    warn!("Skipping clip {}: {}", path.display(), reason);
                    report.skipped.push(SkippedClip {
                        path: path.clone(),
                        reason,
                    });
                }
            }
        }

        if report.included == 0 {
            warn!("None of {} clip(s) could be decoded", self.clips.len());
            return Ok(report);
        }

        let lead_path = ensure_bumper(&self.voices_dir, "lead", self.lead, self.sample_rate)?;
        let trail_path = ensure_bumper(&self.voices_dir, "trail", self.trail, self.sample_rate)?;
        let bumper = |path: &Path| {
            load_mono(path, self.sample_rate).map_err(|detail| PodcastError::AudioWriteFailed {
                path: path.to_path_buf(),
                detail,
            })
        };
        let lead = bumper(&lead_path)?;
        let trail = bumper(&trail_path)?;

        let mut episode = Vec::with_capacity(lead.len() + voice.len() + trail.len());
        episode.extend_from_slice(&lead);
        episode.extend_from_slice(&voice);
        episode.extend_from_slice(&trail);

        let tmp = write_temp(&self.episodes_dir, "podcast-", |file| {
            write_wav(file, &episode, self.sample_rate)
        })?;
        let (_, path) = tmp.keep().map_err(|e| PodcastError::OutputWriteFailed {
            path: self.episodes_dir.clone(),
            source: e.error,
        })?;

        report.duration_ms = episode.len() as u64 * 1000 / self.sample_rate as u64;
        info!(
            "Assembled {} clip(s) into {} ({} ms)",
            report.included,
            path.display(),
            report.duration_ms
        );
        report.path = Some(path);
        Ok(report)
    }
}

// ── Bumpers ──────────────────────────────────────────────────────────────

/// Sine tone at half amplitude.
pub fn sine_tone(bumper: Bumper, sample_rate: u32) -> Vec<f32> {
    let n = (sample_rate as u64 * bumper.duration_ms as u64 / 1000) as usize;
    let step = 2.0 * std::f32::consts::PI * bumper.frequency_hz / sample_rate as f32;
    (0..n).map(|i| 0.5 * (step * i as f32).sin()).collect()
}

/// Return the cached bumper, writing it first if missing.
fn ensure_bumper(
    dir: &Path,
    label: &str,
    bumper: Bumper,
    sample_rate: u32,
) -> Result<PathBuf, PodcastError> {
    let path = dir.join(format!(
        "{label}-{}hz-{}ms-{sample_rate}.wav",
        bumper.frequency_hz, bumper.duration_ms
    ));
    if path.is_file() {
        return Ok(path);
    }

    let tmp = write_temp(dir, ".bumper-", |file| {
        write_wav(file, &sine_tone(bumper, sample_rate), sample_rate)
    })?;
    tmp.persist(&path).map_err(|e| PodcastError::OutputWriteFailed {
        path: path.clone(),
        source: e.error,
    })?;
    debug!("Wrote bumper {}", path.display());
    Ok(path)
}

// ── WAV I/O ──────────────────────────────────────────────────────────────

/// Write a `.wav` temp file in `dir` through `write`.
///
/// The file is removed again if `write` fails; the caller decides whether to
/// keep or persist it.
fn write_temp(
    dir: &Path,
    prefix: &str,
    write: impl FnOnce(std::fs::File) -> Result<(), String>,
) -> Result<tempfile::NamedTempFile, PodcastError> {
    let io_err = |e: std::io::Error| PodcastError::OutputWriteFailed {
        path: dir.to_path_buf(),
        source: e,
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;
    let tmp = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".wav")
        .tempfile_in(dir)
        .map_err(io_err)?;
    let file = tmp.reopen().map_err(io_err)?;
    write(file).map_err(|detail| PodcastError::AudioWriteFailed {
        path: tmp.path().to_path_buf(),
        detail,
    })?;
    Ok(tmp)
}

/// Write mono `f32` samples as 16-bit PCM.
fn write_wav(file: std::fs::File, samples: &[f32], sample_rate: u32) -> Result<(), String> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer =
        hound::WavWriter::new(BufWriter::new(file), spec).map_err(|e| e.to_string())?;
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        writer.write_sample(v).map_err(|e| e.to_string())?;
    }
    writer.finalize().map_err(|e| e.to_string())
}

/// Decode a WAV file to mono `f32` at `target_rate`.
pub fn load_mono(path: &Path, target_rate: u32) -> Result<Vec<f32>, String> {
    let mut reader = hound::WavReader::open(path).map_err(|e| e.to_string())?;
    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| e.to_string())?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| e.to_string())?
        }
    };
    let mono = downmix(&interleaved, spec.channels);
    Ok(resample_linear(&mono, spec.sample_rate, target_rate))
}

/// Average interleaved channels into one.
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

/// Linear-interpolation resampler.
pub fn resample_linear(samples: &[f32], from: u32, to: u32) -> Vec<f32> {
    if from == to || samples.is_empty() || from == 0 {
        return samples.to_vec();
    }
    let ratio = to as f64 / from as f64;
    let out_len = (samples.len() as f64 * ratio).round() as usize;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 / ratio;
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            match (samples.get(idx), samples.get(idx + 1)) {
                (Some(a), Some(b)) => a * (1.0 - frac) + b * frac,
                (Some(a), None) => *a,
                _ => 0.0,
            }
        })
        .collect()
}
