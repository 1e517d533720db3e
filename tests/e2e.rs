//! End-to-end integration tests for paper2podcast.
//!
//! These tests render a real PDF with pdfium, make live LLM API calls and
//! talk to the hosted TTS space. They are gated behind the `E2E_ENABLED`
//! environment variable so they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 E2E_PDF=paper.pdf cargo test --test e2e -- --nocapture
//!
//! `E2E_PDF` may also be an HTTP/HTTPS URL.

use paper2podcast::{
    generate_podcast_to_file, generate_script, LineOutcome, PodcastConfig, PodcastLength, Tone,
};
use tempfile::TempDir;

/// Skip this test unless E2E_ENABLED and E2E_PDF are both set.
macro_rules! e2e_input_or_skip {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        match std::env::var("E2E_PDF") {
            Ok(p) if !p.is_empty() => p,
            _ => {
                println!("SKIP: set E2E_PDF to a PDF path or URL");
                return;
            }
        }
    }};
}

#[tokio::test]
async fn e2e_script_only() {
    let input = e2e_input_or_skip!();
    let work = TempDir::new().unwrap();
    let config = PodcastConfig::builder()
        .work_dir(work.path())
        .tone(Tone::Conversational)
        .length(PodcastLength::Short)
        .concurrency(2)
        .build()
        .unwrap();

    let output = generate_script(&input, &config).await.unwrap();

    println!("outline:\n{}\n", output.outline);
    println!(
        "plan: {} step(s), {} dialog(s), {} tokens in / {} out",
        output.plan.len(),
        output.dialogs.len(),
        output.stats.llm.input_tokens,
        output.stats.llm.output_tokens
    );
    assert!(output.stats.pages_rendered > 0);
    assert!(!output.outline.trim().is_empty());
    assert_eq!(output.dialogs.len(), output.plan.len());
    assert!(output.audio_path.is_none());
    for dialog in &output.dialogs {
        assert!(
            dialog.script.spoken_count() > 0,
            "dialog {} has no spoken line:\n{}",
            dialog.index,
            dialog.raw
        );
    }
}

#[tokio::test]
async fn e2e_full_episode() {
    let input = e2e_input_or_skip!();
    let work = TempDir::new().unwrap();
    let out = work.path().join("episode.wav");
    let config = PodcastConfig::builder()
        .work_dir(work.path())
        .build()
        .unwrap();

    let output = generate_podcast_to_file(&input, &out, &config).await.unwrap();

    let failed = output
        .lines
        .iter()
        .filter(|l| matches!(l.outcome, LineOutcome::Failed { .. }))
        .count();
    println!(
        "{} line(s), {} voiced, {} failed, {:.1}s of audio",
        output.lines.len(),
        output.stats.lines_synthesised,
        failed,
        output.stats.audio_duration_ms as f64 / 1000.0
    );
    assert_eq!(output.audio_path.as_deref(), Some(out.as_path()));
    let reader = hound::WavReader::open(&out).unwrap();
    assert_eq!(reader.spec().channels, 1);
    assert!(reader.duration() > 0);
}
