//! PDF rasterisation: render every page to a `DynamicImage` via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is CPU-heavy and keeps
//! thread-local state. `tokio::task::spawn_blocking` moves the work onto the
//! blocking pool so Tokio worker threads never stall during rendering.
//!
//! ## Failure granularity
//!
//! A document that cannot be opened is fatal. A single page that fails to
//! rasterise is logged and skipped; the outline is built from whatever pages
//! rendered, and only a document with no renderable page at all is an error.

use crate::config::PodcastConfig;
use crate::error::PodcastError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming the directory that holds libpdfium.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Rasterise every page of a PDF.
///
/// # Returns
/// `(page_index_0based, image)` pairs in page order, without the pages that
/// failed to render.
pub async fn render_pages(
    pdf_path: &Path,
    config: &PodcastConfig,
) -> Result<Vec<(usize, DynamicImage)>, PodcastError> {
    let path = pdf_path.to_path_buf();
    let max_pixels = config.max_rendered_pixels;
    let password = config.password.clone();

    tokio::task::spawn_blocking(move || render_blocking(&path, max_pixels, password.as_deref()))
        .await
        .map_err(|e| PodcastError::Internal(format!("Render task panicked: {e}")))?
}

/// Bind to libpdfium: `PDFIUM_LIB_PATH` first, then the system library.
pub fn bind_pdfium() -> Result<Pdfium, PodcastError> {
    let bindings = match std::env::var_os(PDFIUM_LIB_PATH_ENV) {
        Some(dir) => {
            let dir = PathBuf::from(dir);
            debug!("Binding pdfium from {}", dir.display());
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
                .map_err(|e| PodcastError::PdfiumBindingFailed(format!("{}: {e:?}", dir.display())))?
        }
        None => Pdfium::bind_to_system_library()
            .map_err(|e| PodcastError::PdfiumBindingFailed(format!("{e:?}")))?,
    };
    Ok(Pdfium::new(bindings))
}

fn render_blocking(
    pdf_path: &Path,
    max_pixels: u32,
    password: Option<&str>,
) -> Result<Vec<(usize, DynamicImage)>, PodcastError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| classify_load_error(pdf_path, password.is_some(), &format!("{e:?}")))?;

    let pages = document.pages();
    let total = pages.len() as usize;
    info!("PDF loaded: {} pages", total);

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut rendered = Vec::with_capacity(total);
    for (idx, page) in pages.iter().enumerate() {
        match page.render_with_config(&render_config) {
            Ok(bitmap) => {
                let image = bitmap.as_image();
                debug!("Rendered page {} → {}x{} px", idx + 1, image.width(), image.height());
                rendered.push((idx, image));
            }
            Err(e) => warn!("Skipping page {}/{}: {:?}", idx + 1, total, e),
        }
    }

    if rendered.is_empty() {
        return Err(PodcastError::NoPages {
            path: pdf_path.to_path_buf(),
        });
    }
    Ok(rendered)
}

/// Map a pdfium load failure onto the password / corruption variants.
fn classify_load_error(path: &Path, had_password: bool, detail: &str) -> PodcastError {
    let path = path.to_path_buf();
    if detail.to_ascii_lowercase().contains("password") {
        if had_password {
            PodcastError::WrongPassword { path }
        } else {
            PodcastError::PasswordRequired { path }
        }
    } else {
        PodcastError::CorruptPdf {
            path,
            detail: detail.to_string(),
        }
    }
}
