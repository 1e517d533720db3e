//! Input resolution: turn a user-supplied path or URL into a local PDF.
//!
//! ## Why download to a temp file?
//!
//! pdfium opens documents by path. Downloading into a `TempDir` gives it one
//! while guaranteeing cleanup when [`PaperSource`] is dropped. The `%PDF`
//! magic is checked up front for both kinds of input, so a mistyped path or
//! an HTML error page surfaces as [`PodcastError::NotAPdf`] instead of a
//! pdfium failure three layers down.

use crate::error::PodcastError;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A paper ready to be rendered.
#[derive(Debug)]
pub enum PaperSource {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL. The directory lives as long as this value.
    Downloaded { path: PathBuf, _dir: TempDir },
}

impl PaperSource {
    pub fn path(&self) -> &Path {
        match self {
            PaperSource::Local(p) => p,
            PaperSource::Downloaded { path, .. } => path,
        }
    }
}

/// True for `http://` and `https://` inputs.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve `input` to a local PDF, downloading it first if it is a URL.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<PaperSource, PodcastError> {
    if is_url(input) {
        download(input, timeout_secs).await
    } else {
        let path = PathBuf::from(input);
        tokio::task::spawn_blocking(move || open_local(path))
            .await
            .map_err(|e| PodcastError::Internal(format!("Input task panicked: {e}")))?
    }
}

fn open_local(path: PathBuf) -> Result<PaperSource, PodcastError> {
    if !path.is_file() {
        return Err(PodcastError::FileNotFound { path });
    }

    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PodcastError::PermissionDenied { path });
        }
        Err(_) => return Err(PodcastError::FileNotFound { path }),
    };

    let mut head = [0u8; 4];
    let n = file
        .read(&mut head)
        .map_err(|e| PodcastError::Internal(format!("Failed to read {}: {e}", path.display())))?;
    check_magic(&head[..n], &path)?;

    debug!("Resolved local PDF: {}", path.display());
    Ok(PaperSource::Local(path))
}

/// Reject anything that does not start with `%PDF`.
fn check_magic(head: &[u8], path: &Path) -> Result<(), PodcastError> {
    if head.len() >= 4 && &head[..4] == PDF_MAGIC {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = head.len().min(4);
    magic[..n].copy_from_slice(&head[..n]);
    Err(PodcastError::NotAPdf {
        path: path.to_path_buf(),
        magic,
    })
}

async fn download(url: &str, timeout_secs: u64) -> Result<PaperSource, PodcastError> {
    info!("Downloading paper from {}", url);

    let failed = |reason: String| PodcastError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            PodcastError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let filename = filename_from_url(response.url());
    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;

    let dir = TempDir::new().map_err(|e| PodcastError::Internal(e.to_string()))?;
    let path = dir.path().join(filename);
    check_magic(&bytes, &path)?;

    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| PodcastError::OutputWriteFailed {
            path: path.clone(),
            source: e,
        })?;

    info!("Downloaded {} bytes to {}", bytes.len(), path.display());
    Ok(PaperSource::Downloaded { path, _dir: dir })
}

/// Last non-empty path segment with an extension, else `paper.pdf`.
fn filename_from_url(url: &reqwest::Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|last| !last.is_empty() && last.contains('.'))
        .map(str::to_string)
        .unwrap_or_else(|| "paper.pdf".to_string())
}
