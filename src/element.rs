//! Positioned content elements produced by the extractors.
//!
//! Coordinates use a top-left origin in document units (PDF points), with `y`
//! growing downwards. The PDF extractor flips pdfium's bottom-left origin
//! before constructing a [`BoundingBox`] so the linearizer never has to care
//! which format an element came from.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// The two document formats the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// Coordinate-based: every element carries an absolute position.
    Pdf,
    /// Flow-based: position is paragraph order.
    Docx,
}

impl DocumentFormat {
    /// Dispatch on the file name extension (case-insensitive).
    ///
    /// Returns `None` for anything other than `.pdf` / `.docx`.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())?
            .to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "docx" => Some(DocumentFormat::Docx),
            _ => None,
        }
    }

    /// Whether elements carry real coordinates and need a geometric sort.
    pub fn is_positioned(self) -> bool {
        matches!(self, DocumentFormat::Pdf)
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentFormat::Pdf => f.write_str("pdf"),
            DocumentFormat::Docx => f.write_str("docx"),
        }
    }
}

/// Axis-aligned box `(x0, y0)`–`(x1, y1)`, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    /// Build a box, normalising swapped corners.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// The whole page. Used for images whose position is unknown.
    pub fn full_page(width: f32, height: f32) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    /// Flow position for formats without coordinates: a unit-height slot per
    /// paragraph index.
    pub fn flow_slot(index: usize) -> Self {
        let y = index as f32;
        Self::new(0.0, y, 0.0, y + 1.0)
    }

    pub fn top(&self) -> f32 {
        self.y0
    }

    pub fn left(&self) -> f32 {
        self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
}

/// Block-level hint carried by a text element.
///
/// Only DOCX provides these reliably (paragraph styles); PDF text is always
/// [`TextStyle::Plain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextStyle {
    #[default]
    Plain,
    /// Heading level 1–6.
    Heading(u8),
    /// Bulleted or numbered list item.
    ListItem { ordered: bool },
    /// A pre-rendered GFM pipe table.
    Table,
}

/// Raw image bytes as discovered in the document.
#[derive(Clone, PartialEq)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
    /// Name to suggest to the image store, e.g. `page3-img1.png`.
    pub suggested_name: String,
    /// Alt text, when the document provides one.
    pub description: Option<String>,
}

impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageData")
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("mime_type", &self.mime_type)
            .field("suggested_name", &self.suggested_name)
            .field("description", &self.description)
            .finish()
    }
}

/// What an element contains.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementPayload {
    Text { text: String, style: TextStyle },
    Image(ImageData),
}

/// One extracted element. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentElement {
    /// 1-indexed page number (always 1 for DOCX).
    pub page: usize,
    pub bbox: BoundingBox,
    pub payload: ElementPayload,
}

impl ContentElement {
    pub fn text(page: usize, bbox: BoundingBox, text: impl Into<String>) -> Self {
        Self::styled_text(page, bbox, text, TextStyle::Plain)
    }

    pub fn styled_text(
        page: usize,
        bbox: BoundingBox,
        text: impl Into<String>,
        style: TextStyle,
    ) -> Self {
        Self {
            page,
            bbox,
            payload: ElementPayload::Text {
                text: text.into(),
                style,
            },
        }
    }

    pub fn image(page: usize, bbox: BoundingBox, data: ImageData) -> Self {
        Self {
            page,
            bbox,
            payload: ElementPayload::Image(data),
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self.payload, ElementPayload::Image(_))
    }
}

/// All elements of one page, in discovery order (not reading order).
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPage {
    /// 1-indexed.
    pub number: usize,
    pub width: f32,
    pub height: f32,
    pub elements: Vec<ContentElement>,
}

/// Extractor output for a whole document.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedDocument {
    pub format: DocumentFormat,
    pub pages: Vec<ExtractedPage>,
    /// Per-element failures absorbed during extraction (page, detail).
    pub skipped: Vec<(usize, String)>,
}

impl ExtractedDocument {
    pub fn element_count(&self) -> usize {
        self.pages.iter().map(|p| p.elements.len()).sum()
    }

    pub fn image_count(&self) -> usize {
        self.pages
            .iter()
            .flat_map(|p| p.elements.iter())
            .filter(|e| e.is_image())
            .count()
    }

    /// `true` when there is no non-blank text and no image at all.
    pub fn is_empty(&self) -> bool {
        !self.pages.iter().flat_map(|p| p.elements.iter()).any(|e| {
            match &e.payload {
                ElementPayload::Text { text, .. } => !text.trim().is_empty(),
                ElementPayload::Image(_) => true,
            }
        })
    }
}
