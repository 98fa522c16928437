//! PDF rasterisation: render every page to a `DynamicImage` via pdfium.
//!
//! pdfium keeps thread-local state and is CPU-bound, so all work happens
//! inside `tokio::task::spawn_blocking`. Pages render at the requested DPI,
//! capped by their longest edge (`max_rendered_pixels`) so a poster-sized
//! page cannot exhaust memory.

use crate::error::OcrError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info};

/// Render all pages of an in-memory PDF, in page order.
pub async fn render_pdf(
    bytes: Vec<u8>,
    dpi: u32,
    max_pixels: u32,
    password: Option<String>,
) -> Result<Vec<DynamicImage>, OcrError> {
    tokio::task::spawn_blocking(move || render_pdf_blocking(bytes, dpi, max_pixels, password.as_deref()))
        .await
        .map_err(|e| OcrError::Service(format!("Render task failed: {e}")))?
}

/// Bind to pdfium in `PDFIUM_LIB_PATH`, next to the executable, or the
/// system library, in that order.
fn bind_pdfium() -> Result<Pdfium, OcrError> {
    let dir = std::env::var("PDFIUM_LIB_PATH").unwrap_or_else(|_| "./".to_string());
    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|e| OcrError::Config(format!("pdfium library not available: {e:?}")))
}

fn render_pdf_blocking(
    bytes: Vec<u8>,
    dpi: u32,
    max_pixels: u32,
    password: Option<&str>,
) -> Result<Vec<DynamicImage>, OcrError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium.load_pdf_from_byte_vec(bytes, password).map_err(|e| {
        let detail = format!("{e:?}");
        if detail.to_lowercase().contains("password") {
            if password.is_some() {
                OcrError::Config("PDF password is incorrect".into())
            } else {
                OcrError::Config("PDF is encrypted and no password was configured".into())
            }
        } else {
            OcrError::Unsupported(format!("corrupt or unreadable PDF: {detail}"))
        }
    })?;

    let pages = document.pages();
    let total = pages.len() as usize;
    info!("PDF loaded: {} pages", total);
    if total == 0 {
        return Err(OcrError::Unsupported("PDF has no pages".into()));
    }

    let mut images = Vec::with_capacity(total);
    for idx in 0..total {
        let page = pages
            .get(idx as u16)
            .map_err(|e| OcrError::Unsupported(format!("page {}: {e:?}", idx + 1)))?;
        let width = target_width(page.width().value, dpi, max_pixels);
        let render_config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_maximum_height(max_pixels as i32);
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| OcrError::Unsupported(format!("page {} failed to render: {e:?}", idx + 1)))?;
        let image = bitmap.as_image();
        debug!("Rendered page {} → {}x{} px", idx + 1, image.width(), image.height());
        images.push(image);
    }
    Ok(images)
}

/// Pixel width for a page `width_pts` points wide at `dpi`, capped at
/// `max_pixels` and never zero.
fn target_width(width_pts: f32, dpi: u32, max_pixels: u32) -> u32 {
    let px = (width_pts * dpi as f32 / 72.0).round();
    (px as u32).clamp(1, max_pixels.max(1))
}
