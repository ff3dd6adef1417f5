//! DOCX extraction: paragraphs, tables and inline images in document order.
//!
//! A `.docx` file is a ZIP archive. The body lives in `word/document.xml`;
//! images are referenced from `a:blip r:embed="rIdN"` (or legacy
//! `v:imagedata r:id`) and resolved through `word/_rels/document.xml.rels` to
//! an entry under `word/media/`. Numbering formats come from
//! `word/numbering.xml` and decide whether a list is ordered.
//!
//! There are no coordinates: each element gets a flow slot equal to its index,
//! and the discovery order is the reading order.
//!
//! Element names are matched on their local part, so documents written with
//! unusual namespace prefixes still parse.
//!
//! Text boxes nest whole paragraphs inside a drawing that sits in a run of
//! the outer paragraph. Open paragraphs are kept on a stack: the outer text
//! read so far is emitted before the box, and the rest of the outer paragraph
//! follows it.
//!
//! `mc:AlternateContent` carries the same content twice (`mc:Choice` and a
//! legacy `mc:Fallback`). Only the first branch is read.

use crate::element::{
    BoundingBox, ContentElement, DocumentFormat, ExtractedDocument, ExtractedPage, ImageData,
    TextStyle,
};
use crate::error::Doc2MdError;
use crate::storage::mime_from_name;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use tracing::{debug, warn};
use zip::ZipArchive;

const DOCUMENT_XML: &str = "word/document.xml";
const RELS_XML: &str = "word/_rels/document.xml.rels";
const NUMBERING_XML: &str = "word/numbering.xml";

/// Extract all elements of a DOCX held in memory.
pub fn extract_docx(filename: &str, bytes: &[u8]) -> Result<ExtractedDocument, Doc2MdError> {
    let fail = |detail: String| Doc2MdError::ExtractionFailed {
        filename: filename.to_string(),
        detail,
    };

    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| fail(format!("not a ZIP archive: {e}")))?;

    let body = read_entry_string(&mut archive, DOCUMENT_XML)
        .ok_or_else(|| fail(format!("missing {DOCUMENT_XML}")))?;
    let relationships = match read_entry_string(&mut archive, RELS_XML) {
        Some(xml) => parse_relationships(&xml).map_err(fail)?,
        None => HashMap::new(),
    };
    let numbering = read_entry_string(&mut archive, NUMBERING_XML)
        .map(|xml| parse_numbering(&xml))
        .unwrap_or_default();

    let mut walker = BodyWalker::new(&mut archive, &relationships, &numbering);
    walker.walk(&body).map_err(fail)?;
    let (elements, skipped) = walker.finish();

    debug!(
        "DOCX '{}': {} elements, {} skipped",
        filename,
        elements.len(),
        skipped.len()
    );

    Ok(ExtractedDocument {
        format: DocumentFormat::Docx,
        pages: vec![ExtractedPage {
            number: 1,
            width: 0.0,
            height: 0.0,
            elements,
        }],
        skipped,
    })
}

// ── ZIP / XML helpers ────────────────────────────────────────────────────

fn read_entry_bytes<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Option<Vec<u8>> {
    let mut entry = archive.by_name(name).ok()?;
    let mut buffer = Vec::new();
    entry.read_to_end(&mut buffer).ok()?;
    Some(buffer)
}

fn read_entry_string<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Option<String> {
    read_entry_bytes(archive, name).map(|b| String::from_utf8_lossy(&b).into_owned())
}

fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Attribute value by local key (`r:embed` matches `b"embed"`).
fn get_attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .with_checks(false)
        .filter_map(Result::ok)
        .find(|a| local_name(a.key.as_ref()) == key)
        .map(|a| match a.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&a.value).into_owned(),
        })
}

/// `rId` → target path, from `word/_rels/document.xml.rels`.
fn parse_relationships(xml: &str) -> Result<HashMap<String, String>, String> {
    let mut relationships = HashMap::new();
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if local_name(e.name().as_ref()) == b"Relationship" =>
            {
                if let (Some(id), Some(target)) = (get_attr(e, b"Id"), get_attr(e, b"Target")) {
                    relationships.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("error parsing relationships: {e}")),
            _ => {}
        }
        buf.clear();
    }

    Ok(relationships)
}

/// `numId` → whether the list is ordered (level 0 format is not a bullet).
fn parse_numbering(xml: &str) -> HashMap<String, bool> {
    let mut abstract_ordered: HashMap<String, bool> = HashMap::new();
    let mut num_to_abstract: HashMap<String, String> = HashMap::new();

    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut current_abstract: Option<String> = None;
    let mut current_num: Option<String> = None;
    let mut in_level_zero = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                match local_name(e.name().as_ref()) {
                    b"abstractNum" => current_abstract = get_attr(e, b"abstractNumId"),
                    b"lvl" => in_level_zero = get_attr(e, b"ilvl").as_deref() == Some("0"),
                    b"numFmt" if in_level_zero => {
                        if let (Some(id), Some(fmt)) = (&current_abstract, get_attr(e, b"val")) {
                            abstract_ordered
                                .entry(id.clone())
                                .or_insert(fmt != "bullet" && fmt != "none");
                        }
                    }
                    b"num" => current_num = get_attr(e, b"numId"),
                    b"abstractNumId" => {
                        if let (Some(num), Some(abs)) = (&current_num, get_attr(e, b"val")) {
                            num_to_abstract.insert(num.clone(), abs);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => match local_name(e.name().as_ref()) {
                b"abstractNum" => current_abstract = None,
                b"lvl" => in_level_zero = false,
                b"num" => current_num = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!("Ignoring malformed numbering.xml: {}", e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    num_to_abstract
        .into_iter()
        .map(|(num, abs)| {
            let ordered = abstract_ordered.get(&abs).copied().unwrap_or(false);
            (num, ordered)
        })
        .collect()
}

/// Resolve a relationship target (relative to `word/`) to a ZIP entry name.
fn resolve_target(target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut parts: Vec<&str> = vec!["word"];
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

/// Map a paragraph style id to a heading level or list kind.
fn style_from_id(style_id: &str) -> Option<TextStyle> {
    let id = style_id.to_ascii_lowercase().replace(' ', "");
    if id == "title" {
        return Some(TextStyle::Heading(1));
    }
    if id == "subtitle" {
        return Some(TextStyle::Heading(2));
    }
    if let Some(level) = id.strip_prefix("heading") {
        let level: u8 = level.parse().ok()?;
        return Some(TextStyle::Heading(level.clamp(1, 6)));
    }
    if id.starts_with("listnumber") {
        return Some(TextStyle::ListItem { ordered: true });
    }
    if id.starts_with("listbullet") || id == "listparagraph" {
        return Some(TextStyle::ListItem { ordered: false });
    }
    None
}

// ── Body walker ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Paragraph {
    text: String,
    style: TextStyle,
    num_id: Option<String>,
}

#[derive(Default)]
struct TableBuilder {
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: String,
    images: Vec<ImageData>,
}

#[derive(Default)]
struct Drawing {
    rel_id: Option<String>,
    description: Option<String>,
}

struct BodyWalker<'a, R: Read + Seek> {
    archive: &'a mut ZipArchive<R>,
    relationships: &'a HashMap<String, String>,
    numbering: &'a HashMap<String, bool>,
    elements: Vec<ContentElement>,
    skipped: Vec<(usize, String)>,
    /// Open paragraphs outside tables, innermost last.
    paragraphs: Vec<Paragraph>,
    tables: Vec<TableBuilder>,
    drawings: Vec<Drawing>,
    /// One entry per open `mc:AlternateContent`: whether a branch was taken.
    alternates: Vec<bool>,
    /// Depth inside a skipped `mc:AlternateContent` branch.
    skip_depth: usize,
    in_text: bool,
    /// Open `w:r` elements; text boxes nest runs inside runs.
    run_depth: usize,
}

impl<'a, R: Read + Seek> BodyWalker<'a, R> {
    fn new(
        archive: &'a mut ZipArchive<R>,
        relationships: &'a HashMap<String, String>,
        numbering: &'a HashMap<String, bool>,
    ) -> Self {
        Self {
            archive,
            relationships,
            numbering,
            elements: Vec::new(),
            skipped: Vec::new(),
            paragraphs: Vec::new(),
            tables: Vec::new(),
            drawings: Vec::new(),
            alternates: Vec::new(),
            skip_depth: 0,
            in_text: false,
            run_depth: 0,
        }
    }

    fn walk(&mut self, xml: &str) -> Result<(), String> {
        let mut reader = Reader::from_str(xml);
        let mut buf = Vec::new();

        loop {
            let event = reader.read_event_into(&mut buf);
            if self.skip_depth > 0 {
                match event {
                    Ok(Event::Start(_)) => self.skip_depth += 1,
                    Ok(Event::End(_)) => self.skip_depth -= 1,
                    Ok(Event::Eof) => break,
                    _ => {}
                }
                buf.clear();
                continue;
            }
            match event {
                Ok(Event::Start(ref e)) => self.on_start(e),
                Ok(Event::Empty(ref e)) => self.on_empty(e),
                Ok(Event::Text(ref e)) => {
                    if self.in_text {
                        let text = e.unescape().map_err(|e| format!("bad text node: {e}"))?;
                        self.push_text(&text);
                    }
                }
                Ok(Event::End(ref e)) => {
                    let name = e.name();
                    self.on_end(local_name(name.as_ref()));
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(format!(
                        "error parsing {} at byte {}: {}",
                        DOCUMENT_XML,
                        reader.buffer_position(),
                        e
                    ))
                }
                _ => {}
            }
            buf.clear();
        }
        Ok(())
    }

    fn finish(mut self) -> (Vec<ContentElement>, Vec<(usize, String)>) {
        while !self.paragraphs.is_empty() {
            self.close_paragraph();
        }
        while !self.tables.is_empty() {
            self.close_table();
        }
        (self.elements, self.skipped)
    }

    fn on_start(&mut self, e: &BytesStart) {
        match local_name(e.name().as_ref()) {
            b"p" => {
                if self.tables.is_empty() {
                    self.flush_paragraph();
                    self.paragraphs.push(Paragraph::default());
                }
            }
            b"r" => self.run_depth += 1,
            b"t" => self.in_text = true,
            b"tbl" => {
                self.flush_paragraph();
                self.tables.push(TableBuilder::default());
            }
            b"tr" => {
                if let Some(t) = self.tables.last_mut() {
                    t.row.clear();
                }
            }
            b"tc" => {
                if let Some(t) = self.tables.last_mut() {
                    t.cell.clear();
                }
            }
            b"drawing" | b"pict" => self.drawings.push(Drawing::default()),
            b"AlternateContent" => self.alternates.push(false),
            b"Choice" | b"Fallback" => match self.alternates.last_mut() {
                Some(taken) if *taken => self.skip_depth = 1,
                Some(taken) => *taken = true,
                None => {}
            },
            _ => self.on_empty(e),
        }
    }

    /// Attribute-carrying elements, which may appear as `<x/>` or `<x>…</x>`.
    fn on_empty(&mut self, e: &BytesStart) {
        match local_name(e.name().as_ref()) {
            b"pStyle" => {
                if let Some(style) = get_attr(e, b"val").as_deref().and_then(style_from_id) {
                    if let (true, Some(p)) = (self.tables.is_empty(), self.paragraphs.last_mut()) {
                        p.style = style;
                    }
                }
            }
            b"numId" => {
                if let Some(id) = get_attr(e, b"val").filter(|v| v != "0") {
                    if let (true, Some(p)) = (self.tables.is_empty(), self.paragraphs.last_mut()) {
                        p.num_id = Some(id);
                    }
                }
            }
            b"tab" if self.run_depth > 0 => self.push_text("\t"),
            b"br" | b"cr" if self.run_depth > 0 => {
                if self.tables.is_empty() {
                    self.push_text("\n");
                } else {
                    self.push_text(" ");
                }
            }
            b"docPr" => {
                if let Some(d) = self.drawings.last_mut() {
                    d.description = get_attr(e, b"descr")
                        .or_else(|| get_attr(e, b"title"))
                        .filter(|s| !s.trim().is_empty());
                }
            }
            b"blip" => {
                if let Some(d) = self.drawings.last_mut() {
                    if d.rel_id.is_none() {
                        d.rel_id = get_attr(e, b"embed");
                    }
                }
            }
            b"imagedata" => {
                if let Some(d) = self.drawings.last_mut() {
                    if d.rel_id.is_none() {
                        d.rel_id = get_attr(e, b"id");
                    }
                    if d.description.is_none() {
                        d.description = get_attr(e, b"title").filter(|s| !s.trim().is_empty());
                    }
                }
            }
            _ => {}
        }
    }

    fn on_end(&mut self, local: &[u8]) {
        match local {
            b"t" => self.in_text = false,
            b"r" => self.run_depth = self.run_depth.saturating_sub(1),
            b"p" => {
                if let Some(t) = self.tables.last_mut() {
                    if !t.cell.is_empty() && !t.cell.ends_with(' ') {
                        t.cell.push(' ');
                    }
                } else {
                    self.close_paragraph();
                }
            }
            b"tc" => {
                if let Some(t) = self.tables.last_mut() {
                    let cell = t.cell.trim().replace('|', "\\|");
                    t.row.push(cell);
                    t.cell.clear();
                }
            }
            b"tr" => {
                if let Some(t) = self.tables.last_mut() {
                    let row = std::mem::take(&mut t.row);
                    if !row.is_empty() {
                        t.rows.push(row);
                    }
                }
            }
            b"tbl" => self.close_table(),
            b"drawing" | b"pict" => {
                if let Some(d) = self.drawings.pop() {
                    self.on_drawing(d);
                }
            }
            b"AlternateContent" => {
                self.alternates.pop();
            }
            _ => {}
        }
    }

    fn push_text(&mut self, text: &str) {
        if let Some(t) = self.tables.last_mut() {
            t.cell.push_str(text);
            return;
        }
        if self.paragraphs.is_empty() {
            self.paragraphs.push(Paragraph::default());
        }
        if let Some(p) = self.paragraphs.last_mut() {
            p.text.push_str(text);
        }
    }

    fn close_paragraph(&mut self) {
        self.flush_paragraph();
        self.paragraphs.pop();
    }

    /// Emit the innermost open paragraph's text, keeping its style for any
    /// text that follows in the same paragraph.
    fn flush_paragraph(&mut self) {
        let Some(paragraph) = self.paragraphs.last_mut() else {
            return;
        };
        let text = std::mem::take(&mut paragraph.text);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        let style = match (paragraph.style, &paragraph.num_id) {
            (TextStyle::Heading(level), _) => TextStyle::Heading(level),
            (_, Some(id)) => TextStyle::ListItem {
                ordered: self.numbering.get(id).copied().unwrap_or(false),
            },
            (style, None) => style,
        };
        self.push_element(|slot| ContentElement::styled_text(1, slot, trimmed, style));
    }

    fn close_table(&mut self) {
        let Some(mut table) = self.tables.pop() else {
            return;
        };
        if !table.row.is_empty() {
            let row = std::mem::take(&mut table.row);
            table.rows.push(row);
        }

        match self.tables.last_mut() {
            Some(outer) => {
                // Nested tables collapse into the enclosing cell.
                let flat = table
                    .rows
                    .iter()
                    .map(|r| r.join(" / "))
                    .collect::<Vec<_>>()
                    .join(" / ");
                if !outer.cell.is_empty() {
                    outer.cell.push(' ');
                }
                outer.cell.push_str(&flat);
                outer.images.append(&mut table.images);
            }
            None => {
                if let Some(md) = render_table(&table.rows) {
                    self.push_element(|slot| {
                        ContentElement::styled_text(1, slot, md, TextStyle::Table)
                    });
                }
                for image in table.images {
                    self.push_element(|slot| ContentElement::image(1, slot, image));
                }
            }
        }
    }

    fn on_drawing(&mut self, drawing: Drawing) {
        let Some(rel_id) = drawing.rel_id else {
            return;
        };
        let image = match self.load_image(&rel_id) {
            Ok(mut image) => {
                image.description = drawing.description;
                image
            }
            Err(detail) => {
                warn!("Skipping DOCX image {}: {}", rel_id, detail);
                self.skipped.push((1, format!("image {rel_id}: {detail}")));
                return;
            }
        };

        match self.tables.last_mut() {
            Some(t) => t.images.push(image),
            None => {
                self.flush_paragraph();
                self.push_element(|slot| ContentElement::image(1, slot, image));
            }
        }
    }

    fn load_image(&mut self, rel_id: &str) -> Result<ImageData, String> {
        let target = self
            .relationships
            .get(rel_id)
            .ok_or_else(|| format!("relationship {rel_id} not found"))?;
        let entry = resolve_target(target);
        let bytes = read_entry_bytes(self.archive, &entry)
            .ok_or_else(|| format!("media entry '{entry}' not found"))?;
        if bytes.is_empty() {
            return Err(format!("media entry '{entry}' is empty"));
        }
        let name = entry.rsplit('/').next().unwrap_or(&entry).to_string();
        Ok(ImageData {
            bytes,
            mime_type: mime_from_name(&name).to_string(),
            suggested_name: name,
            description: None,
        })
    }

    fn push_element(&mut self, build: impl FnOnce(BoundingBox) -> ContentElement) {
        let slot = BoundingBox::flow_slot(self.elements.len());
        self.elements.push(build(slot));
    }
}

/// Render rows as a GFM pipe table. The first row is the header.
fn render_table(rows: &[Vec<String>]) -> Option<String> {
    let cols = rows.iter().map(Vec::len).max().unwrap_or(0);
    if cols == 0 || rows.iter().all(|r| r.iter().all(|c| c.is_empty())) {
        return None;
    }

    let line = |row: &[String]| {
        let mut out = String::from("|");
        for i in 0..cols {
            out.push(' ');
            out.push_str(row.get(i).map(String::as_str).unwrap_or(""));
            out.push_str(" |");
        }
        out
    };

    let mut lines = vec![line(&rows[0])];
    lines.push(format!("|{}", " --- |".repeat(cols)));
    lines.extend(rows[1..].iter().map(|r| line(r)));
    Some(lines.join("\n"))
}
