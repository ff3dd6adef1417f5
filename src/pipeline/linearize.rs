//! Reading-order reconstruction.
//!
//! PDF pages arrive as an unordered bag of positioned elements. The ordering
//! rule is deliberately simple:
//!
//! 1. sort by top edge, then left edge, then discovery order;
//! 2. walk the sorted list and open a new line whenever an element's top edge
//!    is at least `line_tolerance` away from the current line's reference top
//!    (the top of the line's first element);
//! 3. order each line left to right (discovery order breaks ties);
//! 4. concatenate lines top to bottom.
//!
//! Multi-column layouts come out row-interleaved; that is a known limitation.
//!
//! DOCX is a flow format: traversal order already *is* reading order, so the
//! geometric pass is skipped and only paragraph rendering applies.

use crate::config::ConversionConfig;
use crate::element::{
    ContentElement, ElementPayload, ExtractedDocument, ExtractedPage, ImageData, TextStyle,
};

/// Vertical gap, as a multiple of the previous line height, that starts a new
/// paragraph in PDF text.
const PARAGRAPH_GAP_FACTOR: f32 = 1.5;

/// One entry of the linear document.
#[derive(Debug, Clone, PartialEq)]
pub enum LinearItem {
    /// A block of text; becomes one Markdown paragraph.
    Paragraph(String),
    /// An image at this position.
    Image(ImageData),
    /// Marker between two PDF pages.
    PageBreak(String),
}

/// The document as a single ordered sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearDocument {
    pub items: Vec<LinearItem>,
}

impl LinearDocument {
    pub fn image_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i, LinearItem::Image(_)))
            .count()
    }
}

/// Linearize a whole extracted document.
pub fn linearize(doc: &ExtractedDocument, config: &ConversionConfig) -> LinearDocument {
    let mut items = Vec::new();

    for (i, page) in doc.pages.iter().enumerate() {
        if !doc.format.is_positioned() {
            linearize_flow(&page.elements, &mut items);
            continue;
        }
        if i > 0 {
            if let Some(marker) = config.page_separator.render(page.number) {
                items.push(LinearItem::PageBreak(marker));
            }
        }
        linearize_positioned(page, config.line_tolerance, &mut items);
    }

    LinearDocument { items }
}

/// Group the elements of one page into lines, top to bottom, each ordered
/// left to right.
pub fn group_lines(elements: &[ContentElement], tolerance: f32) -> Vec<Vec<&ContentElement>> {
    let mut indexed: Vec<(usize, &ContentElement)> = elements.iter().enumerate().collect();
    indexed.sort_by(|(ia, a), (ib, b)| {
        a.bbox
            .top()
            .total_cmp(&b.bbox.top())
            .then_with(|| a.bbox.left().total_cmp(&b.bbox.left()))
            .then_with(|| ia.cmp(ib))
    });

    let mut lines: Vec<Vec<(usize, &ContentElement)>> = Vec::new();
    let mut reference_top = f32::NEG_INFINITY;

    for (idx, el) in indexed {
        let top = el.bbox.top();
        match lines.last_mut() {
            Some(line) if (top - reference_top).abs() < tolerance => line.push((idx, el)),
            _ => {
                reference_top = top;
                lines.push(vec![(idx, el)]);
            }
        }
    }

    lines
        .into_iter()
        .map(|mut line| {
            line.sort_by(|(ia, a), (ib, b)| {
                a.bbox
                    .left()
                    .total_cmp(&b.bbox.left())
                    .then_with(|| ia.cmp(ib))
            });
            line.into_iter().map(|(_, el)| el).collect()
        })
        .collect()
}

/// Geometric pass for coordinate-based pages.
fn linearize_positioned(page: &ExtractedPage, tolerance: f32, out: &mut Vec<LinearItem>) {
    let mut paragraph: Vec<String> = Vec::new();
    // (bottom, height) of the previous text line on this page.
    let mut prev_line: Option<(f32, f32)> = None;

    for line in group_lines(&page.elements, tolerance) {
        let mut fragments: Vec<&str> = Vec::new();
        let mut line_bottom = f32::NEG_INFINITY;
        let line_top = line
            .iter()
            .map(|e| e.bbox.top())
            .fold(f32::INFINITY, f32::min);

        for el in line {
            match &el.payload {
                ElementPayload::Text { text, .. } => {
                    let t = text.trim();
                    if !t.is_empty() {
                        fragments.push(t);
                        line_bottom = line_bottom.max(el.bbox.y1);
                    }
                }
                ElementPayload::Image(data) => {
                    push_line(&mut paragraph, &mut fragments);
                    flush_paragraph(&mut paragraph, out);
                    out.push(LinearItem::Image(data.clone()));
                    prev_line = None;
                }
            }
        }

        if fragments.is_empty() {
            continue;
        }

        if let Some((prev_bottom, prev_height)) = prev_line {
            let gap = line_top - prev_bottom;
            if prev_height > 0.0 && gap > prev_height * PARAGRAPH_GAP_FACTOR {
                flush_paragraph(&mut paragraph, out);
            }
        }

        let height = (line_bottom - line_top).max(0.0);
        push_line(&mut paragraph, &mut fragments);
        prev_line = Some((line_bottom, height));
    }

    flush_paragraph(&mut paragraph, out);
}

fn push_line(paragraph: &mut Vec<String>, fragments: &mut Vec<&str>) {
    if !fragments.is_empty() {
        paragraph.push(fragments.join(" "));
        fragments.clear();
    }
}

fn flush_paragraph(paragraph: &mut Vec<String>, out: &mut Vec<LinearItem>) {
    if !paragraph.is_empty() {
        out.push(LinearItem::Paragraph(paragraph.join("\n")));
        paragraph.clear();
    }
}

/// Consecutive list items, rendered as one block.
#[derive(Default)]
struct ListBlock {
    lines: Vec<String>,
    /// Kind of the previous item; numbering restarts when it changes.
    ordered: Option<bool>,
    number: usize,
}

impl ListBlock {
    fn push(&mut self, ordered: bool, text: &str) {
        if self.ordered != Some(ordered) {
            self.ordered = Some(ordered);
            self.number = 0;
        }
        if ordered {
            self.number += 1;
            self.lines.push(format!("{}. {}", self.number, text));
        } else {
            self.lines.push(format!("- {}", text));
        }
    }
}

/// Flow documents: discovery order is reading order.
fn linearize_flow(elements: &[ContentElement], out: &mut Vec<LinearItem>) {
    let mut list = ListBlock::default();

    for el in elements {
        match &el.payload {
            ElementPayload::Text { text, style } => {
                let t = text.trim();
                if t.is_empty() {
                    continue;
                }
                match style {
                    TextStyle::ListItem { ordered } => list.push(*ordered, t),
                    TextStyle::Heading(level) => {
                        flush_list(&mut list, out);
                        let hashes = "#".repeat((*level).clamp(1, 6) as usize);
                        out.push(LinearItem::Paragraph(format!("{} {}", hashes, t)));
                    }
                    TextStyle::Plain | TextStyle::Table => {
                        flush_list(&mut list, out);
                        out.push(LinearItem::Paragraph(t.to_string()));
                    }
                }
            }
            ElementPayload::Image(data) => {
                flush_list(&mut list, out);
                out.push(LinearItem::Image(data.clone()));
            }
        }
    }

    flush_list(&mut list, out);
}

fn flush_list(list: &mut ListBlock, out: &mut Vec<LinearItem>) {
    let block = std::mem::take(list);
    if !block.lines.is_empty() {
        out.push(LinearItem::Paragraph(block.lines.join("\n")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{BoundingBox, DocumentFormat};

    fn order_page(elements: &[ContentElement], tolerance: f32) -> Vec<&ContentElement> {
        group_lines(elements, tolerance).into_iter().flatten().collect()
    }

    fn img(name: &str) -> ImageData {
        ImageData {
            bytes: vec![1, 2, 3],
            mime_type: "image/png".into(),
            suggested_name: name.into(),
            description: None,
        }
    }

    fn label(el: &ContentElement) -> String {
        match &el.payload {
            ElementPayload::Text { text, .. } => text.clone(),
            ElementPayload::Image(d) => d.suggested_name.clone(),
        }
    }

    #[test]
    fn image_between_text_blocks() {
        // Discovery order deliberately scrambled.
        let elements = vec![
            ContentElement::text(1, BoundingBox::new(72.0, 100.0, 300.0, 112.0), "below"),
            ContentElement::image(1, BoundingBox::new(0.0, 50.0, 612.0, 90.0), img("fig.png")),
            ContentElement::text(1, BoundingBox::new(72.0, 0.0, 300.0, 12.0), "above"),
        ];
        let order: Vec<String> = order_page(&elements, 5.0).into_iter().map(label).collect();
        assert_eq!(order, vec!["above", "fig.png", "below"]);
    }

    #[test]
    fn same_line_orders_left_to_right() {
        let elements = vec![
            ContentElement::text(1, BoundingBox::new(300.0, 101.0, 400.0, 110.0), "right"),
            ContentElement::text(1, BoundingBox::new(10.0, 98.0, 100.0, 110.0), "left"),
            ContentElement::text(1, BoundingBox::new(10.0, 130.0, 100.0, 140.0), "next"),
        ];
        let lines = group_lines(&elements, 5.0);
        assert_eq!(lines.len(), 2);
        let first: Vec<String> = lines[0].iter().map(|e| label(e)).collect();
        assert_eq!(first, vec!["left", "right"]);
    }

    #[test]
    fn threshold_is_measured_from_line_reference() {
        // 0 → 4 → 8: the third element is 8 away from the reference top.
        let elements = vec![
            ContentElement::text(1, BoundingBox::new(0.0, 0.0, 10.0, 5.0), "a"),
            ContentElement::text(1, BoundingBox::new(20.0, 4.0, 30.0, 9.0), "b"),
            ContentElement::text(1, BoundingBox::new(40.0, 8.0, 50.0, 13.0), "c"),
        ];
        let lines = group_lines(&elements, 5.0);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 2);
    }

    #[test]
    fn identical_positions_keep_discovery_order() {
        let b = BoundingBox::new(10.0, 10.0, 20.0, 20.0);
        let elements = vec![
            ContentElement::text(1, b, "first"),
            ContentElement::text(1, b, "second"),
            ContentElement::text(1, b, "third"),
        ];
        let order: Vec<String> = order_page(&elements, 5.0).into_iter().map(label).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[test]
    fn unknown_image_position_sorts_first() {
        let elements = vec![
            ContentElement::text(1, BoundingBox::new(72.0, 20.0, 300.0, 30.0), "text"),
            ContentElement::image(1, BoundingBox::full_page(612.0, 792.0), img("bg.png")),
        ];
        let order: Vec<String> = order_page(&elements, 5.0).into_iter().map(label).collect();
        assert_eq!(order, vec!["bg.png", "text"]);
    }

    #[test]
    fn pdf_pages_get_separator_and_paragraphs() {
        let doc = ExtractedDocument {
            format: DocumentFormat::Pdf,
            pages: vec![
                ExtractedPage {
                    number: 1,
                    width: 612.0,
                    height: 792.0,
                    elements: vec![
                        ContentElement::text(1, BoundingBox::new(72.0, 72.0, 300.0, 84.0), "Line one"),
                        ContentElement::text(1, BoundingBox::new(72.0, 86.0, 300.0, 98.0), "line two"),
                        ContentElement::text(1, BoundingBox::new(72.0, 200.0, 300.0, 212.0), "Far below"),
                    ],
                },
                ExtractedPage {
                    number: 2,
                    width: 612.0,
                    height: 792.0,
                    elements: vec![ContentElement::text(
                        2,
                        BoundingBox::new(72.0, 72.0, 300.0, 84.0),
                        "Page two",
                    )],
                },
            ],
            skipped: vec![],
        };
        let lin = linearize(&doc, &ConversionConfig::default());
        assert_eq!(
            lin.items,
            vec![
                LinearItem::Paragraph("Line one\nline two".into()),
                LinearItem::Paragraph("Far below".into()),
                LinearItem::PageBreak("---".into()),
                LinearItem::Paragraph("Page two".into()),
            ]
        );
    }

    #[test]
    fn docx_flow_is_identity_with_styles() {
        let doc = ExtractedDocument {
            format: DocumentFormat::Docx,
            pages: vec![ExtractedPage {
                number: 1,
                width: 0.0,
                height: 0.0,
                elements: vec![
                    ContentElement::styled_text(1, BoundingBox::flow_slot(0), "Intro", TextStyle::Heading(2)),
                    ContentElement::styled_text(
                        1,
                        BoundingBox::flow_slot(1),
                        "alpha",
                        TextStyle::ListItem { ordered: true },
                    ),
                    ContentElement::styled_text(
                        1,
                        BoundingBox::flow_slot(2),
                        "beta",
                        TextStyle::ListItem { ordered: true },
                    ),
                    ContentElement::image(1, BoundingBox::flow_slot(3), img("a.png")),
                    ContentElement::text(1, BoundingBox::flow_slot(4), "After"),
                ],
            }],
            skipped: vec![],
        };
        let lin = linearize(&doc, &ConversionConfig::default());
        assert_eq!(lin.items.len(), 4);
        assert_eq!(lin.items[0], LinearItem::Paragraph("## Intro".into()));
        assert_eq!(lin.items[1], LinearItem::Paragraph("1. alpha\n2. beta".into()));
        assert!(matches!(lin.items[2], LinearItem::Image(_)));
        assert_eq!(lin.items[3], LinearItem::Paragraph("After".into()));
        assert_eq!(lin.image_count(), 1);
    }

    fn list_item(slot: usize, text: &str, ordered: bool) -> ContentElement {
        ContentElement::styled_text(
            1,
            BoundingBox::flow_slot(slot),
            text,
            TextStyle::ListItem { ordered },
        )
    }

    #[test]
    fn numbering_restarts_when_list_kind_changes() {
        let doc = ExtractedDocument {
            format: DocumentFormat::Docx,
            pages: vec![ExtractedPage {
                number: 1,
                width: 0.0,
                height: 0.0,
                elements: vec![
                    list_item(0, "note", false),
                    list_item(1, "one", true),
                    list_item(2, "two", true),
                    list_item(3, "aside", false),
                    list_item(4, "again", true),
                ],
            }],
            skipped: vec![],
        };
        let lin = linearize(&doc, &ConversionConfig::default());
        assert_eq!(
            lin.items,
            vec![LinearItem::Paragraph(
                "- note\n1. one\n2. two\n- aside\n1. again".into()
            )]
        );
    }

    #[test]
    fn separate_lists_number_from_one() {
        let doc = ExtractedDocument {
            format: DocumentFormat::Docx,
            pages: vec![ExtractedPage {
                number: 1,
                width: 0.0,
                height: 0.0,
                elements: vec![
                    list_item(0, "a", true),
                    list_item(1, "b", true),
                    ContentElement::text(1, BoundingBox::flow_slot(2), "Between"),
                    list_item(3, "c", true),
                ],
            }],
            skipped: vec![],
        };
        let lin = linearize(&doc, &ConversionConfig::default());
        assert_eq!(lin.items[2], LinearItem::Paragraph("1. c".into()));
    }
}
