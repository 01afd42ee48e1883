//! PDF rasterisation: render the first page to a `DynamicImage` via pdfium.
//!
//! Receipts are single pages. Only page 1 is rendered; any further pages are
//! ignored without error. The page is scaled by a fixed factor (2.0× by
//! default) so thermal-printer text survives JPEG compression.
//!
//! `pdfium-render` wraps the pdfium C++ library, which uses thread-local
//! state and is CPU-bound, so rendering runs under
//! `tokio::task::spawn_blocking`.

use crate::error::{AttemptError, ScanError};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::ops::Range;
use std::path::PathBuf;
use tracing::{debug, info};

/// Bind to a pdfium shared library.
///
/// Resolution order: `PDFIUM_LIB_PATH`, the working directory, then the
/// system library search path.
pub fn bind_pdfium() -> Result<Pdfium, ScanError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => {
            let path = PathBuf::from(path);
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            Pdfium::bind_to_library(lib)
        }
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| ScanError::PdfiumBindingFailed(format!("{e:?}")))?;

    Ok(Pdfium::new(bindings))
}

/// Check that pdfium can be loaded, without rendering anything.
pub fn pdfium_available() -> Result<(), ScanError> {
    bind_pdfium().map(|_| ())
}

/// Indices of the pages to rasterise for a document with `total_pages`.
///
/// Always the first page only, whatever the page count.
pub fn pages_to_render(total_pages: usize) -> Range<usize> {
    0..total_pages.min(1)
}

/// Rasterise the first page of an in-memory PDF.
///
/// # Errors
/// [`AttemptError::PdfProcessing`] when pdfium is unavailable, the document
/// is unreadable, has no pages, or rendering fails.
pub async fn render_first_page(bytes: Vec<u8>, scale: f32) -> Result<DynamicImage, AttemptError> {
    tokio::task::spawn_blocking(move || render_first_page_blocking(&bytes, scale))
        .await
        .map_err(|e| AttemptError::PdfProcessing {
            detail: format!("Render task panicked: {e}"),
        })?
}

/// Blocking implementation of first-page rendering.
fn render_first_page_blocking(bytes: &[u8], scale: f32) -> Result<DynamicImage, AttemptError> {
    let failed = |detail: String| AttemptError::PdfProcessing { detail };

    let pdfium = bind_pdfium().map_err(|e| failed(e.to_string()))?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| failed(format!("{e:?}")))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages, rendering page 1 only", total_pages);

    let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);

    let mut rendered = None;
    for idx in pages_to_render(total_pages) {
        let page = pages
            .get(idx as u16)
            .map_err(|e| failed(format!("page {}: {e:?}", idx + 1)))?;
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| failed(format!("page {}: {e:?}", idx + 1)))?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} at {}x → {}x{} px",
            idx + 1,
            scale,
            image.width(),
            image.height()
        );
        rendered = Some(image);
    }

    rendered.ok_or_else(|| failed("document has no pages".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_first_page_is_ever_selected() {
        assert_eq!(pages_to_render(0), 0..0);
        assert_eq!(pages_to_render(1), 0..1);
        for total in [2, 3, 50, 10_000] {
            assert_eq!(pages_to_render(total).collect::<Vec<_>>(), vec![0]);
        }
    }

    #[tokio::test]
    async fn garbage_bytes_are_a_pdf_processing_error() {
        // Fails either at binding (no pdfium on the test host) or at parsing;
        // both surface as PdfProcessing.
        let err = render_first_page(b"not a pdf".to_vec(), 2.0).await.unwrap_err();
        assert!(matches!(err, AttemptError::PdfProcessing { .. }), "got {err:?}");
    }
}
