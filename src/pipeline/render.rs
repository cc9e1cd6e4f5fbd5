//! Rasterisation: PDF pages → `DynamicImage` via pdfium.
//!
//! pdfium is a blocking C library, so all of this runs inside
//! `spawn_blocking`. Pages are rendered at the configured DPI, then clamped
//! so neither edge exceeds `max_rendered_pixels` (a poster-sized page would
//! otherwise produce an image the vision API rejects).
//!
//! The library is located at run time, in order:
//!
//! 1. `PDFIUM_LIB_PATH` (the library file, or a directory holding it)
//! 2. the current directory
//! 3. the system library search path

use crate::config::PageSelection;
use crate::error::Pdf2XlsxError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Points per inch in PDF user space.
const POINTS_PER_INCH: f32 = 72.0;

/// Render settings taken from the extraction config.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub dpi: u32,
    pub max_rendered_pixels: u32,
    pub password: Option<String>,
    pub pages: PageSelection,
}

/// Output of [`render_pages`].
#[derive(Debug)]
pub struct RenderedDocument {
    /// Pages in the whole document, selected or not.
    pub total_pages: usize,
    /// `(1-indexed page number, image)` in document order.
    pub pages: Vec<(usize, DynamicImage)>,
}

/// Render the selected pages of `pdf_path`.
pub async fn render_pages(pdf_path: &Path, options: &RenderOptions) -> Result<RenderedDocument, Pdf2XlsxError> {
    let path = pdf_path.to_path_buf();
    let options = options.clone();

    tokio::task::spawn_blocking(move || render_blocking(&path, &options))
        .await
        .map_err(|e| Pdf2XlsxError::Internal(format!("render task panicked: {e}")))?
}

fn render_blocking(pdf_path: &Path, options: &RenderOptions) -> Result<RenderedDocument, Pdf2XlsxError> {
    let pdfium = bind_pdfium()?;
    let password = options.password.as_deref();

    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| open_error(pdf_path, password.is_some(), e))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    let indices = options.pages.to_indices(total_pages);
    if indices.is_empty() {
        return Err(Pdf2XlsxError::NoPagesSelected { total: total_pages });
    }
    info!("PDF has {} page(s), rendering {}", total_pages, indices.len());

    let max = options.max_rendered_pixels as i32;
    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(options.dpi as f32 / POINTS_PER_INCH)
        .set_maximum_width(max)
        .set_maximum_height(max);

    let mut rendered = Vec::with_capacity(indices.len());
    for idx in indices {
        let page_num = idx + 1;
        let raster_err = |e: PdfiumError| Pdf2XlsxError::RasterisationFailed {
            page: page_num,
            detail: format!("{e:?}"),
        };

        let page = pages.get(idx as u16).map_err(raster_err)?;
        let image = page
            .render_with_config(&render_config)
            .map_err(raster_err)?
            .as_image();

        debug!("Rendered page {} → {}x{} px", page_num, image.width(), image.height());
        rendered.push((page_num, image));
    }

    Ok(RenderedDocument {
        total_pages,
        pages: rendered,
    })
}

fn open_error(path: &Path, had_password: bool, err: PdfiumError) -> Pdf2XlsxError {
    let detail = format!("{err:?}");
    let path = path.to_path_buf();
    match (detail.to_lowercase().contains("password"), had_password) {
        (true, true) => Pdf2XlsxError::WrongPassword { path },
        (true, false) => Pdf2XlsxError::PasswordRequired { path },
        (false, _) => Pdf2XlsxError::CorruptPdf { path, detail },
    }
}

/// Bind to the first pdfium library found.
pub fn bind_pdfium() -> Result<Pdfium, Pdf2XlsxError> {
    let from_env = env_library_path().and_then(|path| match Pdfium::bind_to_library(&path) {
        Ok(bindings) => Some(bindings),
        Err(e) => {
            warn!("PDFIUM_LIB_PATH '{}' could not be loaded: {:?}", path, e);
            None
        }
    });

    let bindings = match from_env {
        Some(bindings) => bindings,
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| Pdf2XlsxError::PdfiumBindingFailed(format!("{e:?}")))?,
    };
    Ok(Pdfium::new(bindings))
}

/// `PDFIUM_LIB_PATH` as a library file; a directory is joined with the
/// platform library name.
fn env_library_path() -> Option<String> {
    let raw = std::env::var("PDFIUM_LIB_PATH").ok()?;
    if Path::new(&raw).is_dir() {
        let file = PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(raw.as_str()));
        Some(file.to_string_lossy().into_owned())
    } else {
        Some(raw)
    }
}
