//! OCR over the raster images of scanned PDFs.
//!
//! Pages are handled one at a time, and within a page one image at a time,
//! so at most one decoded raster is resident and OCR calls never overlap.
//! Per page:
//!
//! 1. Collect image paints from the operator list.
//! 2. OCR every XObject image, then every inline image.
//! 3. When the page yields no image at all, use its text layer instead.
//!
//! Failures of a single image or page are logged and skipped.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::ExtractError;
use crate::ocr::{recognize_with_fallback, OcrEngine};
use crate::pdf::{run_blocking, ImagePaint, PdfDocument};
use crate::raster::{ImageObject, RasterImage};

/// Bounds on the OCR page loop.
#[derive(Debug, Clone)]
pub struct OcrLimits {
    pub page_cap: usize,
    /// Checked before each page; a page already started is finished.
    pub deadline: Option<Duration>,
}

/// Tier C: OCR of embedded page images.
pub async fn extract_pdf_ocr(
    doc: Arc<dyn PdfDocument>,
    engine: &dyn OcrEngine,
    languages: &[String],
    limits: &OcrLimits,
) -> Result<String, ExtractError> {
    let pages = doc.page_count().min(limits.page_cap);
    let started = Instant::now();

    let mut parts = Vec::new();
    for page in 0..pages {
        if let Some(deadline) = limits.deadline {
            if started.elapsed() >= deadline {
                debug!(page = page + 1, "OCR deadline reached, stopping");
                break;
            }
        }
        match ocr_page(&doc, page, engine, languages).await {
            Ok(text) if !text.is_empty() => parts.push(text),
            Ok(_) => {}
            Err(e) => debug!(page = page + 1, error = %e, "skipping page"),
        }
    }
    Ok(parts.join("\n\n").trim().to_string())
}

async fn ocr_page(
    doc: &Arc<dyn PdfDocument>,
    page: usize,
    engine: &dyn OcrEngine,
    languages: &[String],
) -> Result<String, ExtractError> {
    let paints = {
        let doc = Arc::clone(doc);
        run_blocking(move || doc.image_paints(page)).await?
    };

    let mut xobjects = Vec::new();
    let mut inline = Vec::new();
    for paint in paints {
        match paint {
            ImagePaint::XObject(path) => xobjects.push(path),
            ImagePaint::Inline(arg) => inline.push(arg.into_image()),
        }
    }

    let mut images_found = 0usize;
    let mut texts = Vec::new();

    for path in xobjects {
        let resolved = {
            let doc = Arc::clone(doc);
            let path = path.clone();
            run_blocking(move || doc.resolve_xobject(page, &path)).await
        };
        let image = match resolved {
            Ok(Some(image)) => image,
            Ok(None) => continue,
            Err(e) => {
                debug!(page = page + 1, xobject = %path, error = %e, "skipping image");
                continue;
            }
        };
        images_found += 1;
        ocr_image(image, engine, languages, page, &mut texts).await;
    }

    for image in inline {
        images_found += 1;
        ocr_image(image, engine, languages, page, &mut texts).await;
    }

    if images_found == 0 {
        let doc = Arc::clone(doc);
        let text = run_blocking(move || doc.page_text(page)).await?;
        return Ok(text.trim().to_string());
    }
    Ok(texts.join("\n\n"))
}

async fn ocr_image(
    image: ImageObject,
    engine: &dyn OcrEngine,
    languages: &[String],
    page: usize,
    texts: &mut Vec<String>,
) {
    let Some(raster) = RasterImage::from_object(&image) else {
        debug!(
            page = page + 1,
            width = image.width,
            height = image.height,
            bytes = image.data.len(),
            "unrecognized pixel layout"
        );
        return;
    };
    drop(image);

    let png = match run_blocking(move || raster.to_png()).await {
        Ok(png) => png,
        Err(e) => {
            debug!(page = page + 1, error = %e, "skipping image");
            return;
        }
    };
    match recognize_with_fallback(engine, &png, languages).await {
        Ok(text) if !text.is_empty() => texts.push(text),
        Ok(_) => {}
        Err(e) => debug!(page = page + 1, error = %e, "OCR failed for image"),
    }
}
