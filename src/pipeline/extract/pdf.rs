//! PDF extraction via pdfium: text segments and embedded image objects, each
//! with its position on the page.
//!
//! pdfium reports coordinates with a bottom-left origin. Everything leaving
//! this module is flipped to top-left so the linearizer can sort by `top`
//! directly.
//!
//! A page whose text layer cannot be read, or an image whose pixels cannot be
//! decoded, is recorded in `skipped` and the rest of the document carries on.
//! Only a document pdfium refuses to open fails the request. A missing
//! pdfium library is reported the same way, as `ExtractionFailed`, with a
//! hint naming `PDFIUM_LIB_PATH`.

use crate::element::{
    BoundingBox, ContentElement, DocumentFormat, ExtractedDocument, ExtractedPage, ImageData,
};
use crate::error::Doc2MdError;
use crate::pipeline::encode::encode_png;
use pdfium_render::prelude::*;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming the pdfium library file or its directory.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Bind to pdfium: `lib_path` (the value of `PDFIUM_LIB_PATH`) first, then
/// the working directory, then the system library search path.
fn bind_pdfium(lib_path: Option<OsString>) -> Result<Pdfium, PdfiumError> {
    let bindings = match lib_path {
        Some(raw) if !raw.is_empty() => {
            let path = PathBuf::from(raw);
            let library = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            Pdfium::bind_to_library(library)
        }
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }?;

    Ok(Pdfium::new(bindings))
}

/// Extract positioned elements from a PDF held in memory.
///
/// Blocking: call from `spawn_blocking`.
pub fn extract_pdf(filename: &str, bytes: &[u8]) -> Result<ExtractedDocument, Doc2MdError> {
    extract_pdf_with(std::env::var_os(PDFIUM_LIB_PATH_ENV), filename, bytes)
}

fn extract_pdf_with(
    lib_path: Option<OsString>,
    filename: &str,
    bytes: &[u8],
) -> Result<ExtractedDocument, Doc2MdError> {
    // pdfium reads from a path; the scratch file is removed on drop.
    let mut scratch = tempfile::Builder::new()
        .prefix("doc2md-")
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| Doc2MdError::Internal(format!("Failed to create temp file: {}", e)))?;
    scratch
        .write_all(bytes)
        .and_then(|_| scratch.flush())
        .map_err(|e| Doc2MdError::Internal(format!("Failed to write temp file: {}", e)))?;

    let pdfium = bind_pdfium(lib_path).map_err(|e| Doc2MdError::ExtractionFailed {
        filename: filename.to_string(),
        detail: format!(
            "pdfium library unavailable ({:?}); set {}=/path/to/libpdfium, place it in \
             the working directory, or install it system-wide",
            e, PDFIUM_LIB_PATH_ENV
        ),
    })?;
    extract_from_path(&pdfium, filename, scratch.path())
}

fn extract_from_path(
    pdfium: &Pdfium,
    filename: &str,
    path: &Path,
) -> Result<ExtractedDocument, Doc2MdError> {
    let document = pdfium.load_pdf_from_file(path, None).map_err(|e| {
        let detail = format!("{:?}", e);
        let detail = if detail.to_ascii_lowercase().contains("password") {
            format!("document is password protected ({detail})")
        } else {
            detail
        };
        Doc2MdError::ExtractionFailed {
            filename: filename.to_string(),
            detail,
        }
    })?;

    let mut pages = Vec::new();
    let mut skipped = Vec::new();

    for (idx, page) in document.pages().iter().enumerate() {
        let number = idx + 1;
        let width = page.width().value;
        let height = page.height().value;
        let mut elements = Vec::new();

        match page.text() {
            Ok(text) => {
                for segment in text.segments().iter() {
                    let content = segment.text();
                    if content.trim().is_empty() {
                        continue;
                    }
                    let b = segment.bounds();
                    let bbox = flip(
                        b.left().value,
                        b.top().value,
                        b.right().value,
                        b.bottom().value,
                        height,
                    );
                    elements.push(ContentElement::text(number, bbox, content));
                }
            }
            Err(e) => {
                warn!("Page {}: text layer unreadable: {:?}", number, e);
                skipped.push((number, format!("text layer unreadable: {:?}", e)));
            }
        }

        let mut image_seq = 0usize;
        for object in page.objects().iter() {
            let Some(image) = object.as_image_object() else {
                continue;
            };
            image_seq += 1;
            let name = format!("page{}-img{}.png", number, image_seq);

            let bbox = object
                .bounds()
                .map(|b| {
                    flip(
                        b.left().value,
                        b.top().value,
                        b.right().value,
                        b.bottom().value,
                        height,
                    )
                })
                .unwrap_or_else(|_| BoundingBox::full_page(width, height));

            let png = image
                .get_raw_image()
                .map_err(|e| format!("{:?}", e))
                .and_then(|img| encode_png(&img).map_err(|e| e.to_string()));

            match png {
                Ok(bytes) => elements.push(ContentElement::image(
                    number,
                    bbox,
                    ImageData {
                        bytes,
                        mime_type: "image/png".to_string(),
                        suggested_name: name,
                        description: None,
                    },
                )),
                Err(detail) => {
                    warn!("Page {}: skipping image {}: {}", number, name, detail);
                    skipped.push((number, format!("{}: {}", name, detail)));
                }
            }
        }

        debug!(
            "Page {}: {} elements ({} image objects)",
            number,
            elements.len(),
            image_seq
        );
        pages.push(ExtractedPage {
            number,
            width,
            height,
            elements,
        });
    }

    info!("PDF '{}': {} pages extracted", filename, pages.len());

    Ok(ExtractedDocument {
        format: DocumentFormat::Pdf,
        pages,
        skipped,
    })
}

/// Convert a bottom-left-origin rectangle to a top-left-origin box.
fn flip(left: f32, top: f32, right: f32, bottom: f32, page_height: f32) -> BoundingBox {
    BoundingBox::new(left, page_height - top, right, page_height - bottom)
}
