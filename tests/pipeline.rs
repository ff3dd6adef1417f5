//! Integration tests for the full conversion pipeline.
//!
//! DOCX files are built in memory with `zip::ZipWriter`, so these tests need
//! no fixtures, no pdfium and no API key. The image store and the rewriter
//! are in-memory stubs that record what they receive.
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use edgequake_doc2md::{
    ConversionConfig, ConversionProgressCallback, ConversionStage, ConversionStatus, Converter,
    DirectoryImageStore, Doc2MdError, ImageStore, RewriteConstraints, RewriteError, StageWarning,
    StorageError, TextRewriter, NO_CONTENT_MARKDOWN,
};
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zip::write::SimpleFileOptions;

// ── DOCX builder ─────────────────────────────────────────────────────────────

const NAMESPACES: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main""#;

/// Minimal DOCX: a body made of `blocks`, one image relationship per entry in
/// `images` (`rId1`, `rId2`, … → `media/imageN.png`).
struct DocxBuilder {
    blocks: Vec<String>,
    images: usize,
}

impl DocxBuilder {
    fn new() -> Self {
        Self {
            blocks: Vec::new(),
            images: 0,
        }
    }

    fn para(mut self, text: &str) -> Self {
        self.blocks
            .push(format!(r#"<w:p><w:r><w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#));
        self
    }

    fn heading(mut self, level: u8, text: &str) -> Self {
        self.blocks.push(format!(
            r#"<w:p><w:pPr><w:pStyle w:val="Heading{level}"/></w:pPr><w:r><w:t>{text}</w:t></w:r></w:p>"#
        ));
        self
    }

    fn image(mut self, descr: &str) -> Self {
        self.images += 1;
        let n = self.images;
        self.blocks.push(format!(
            r#"<w:p><w:r><w:drawing><wp:inline><wp:docPr id="{n}" name="Picture {n}" descr="{descr}"/><a:graphic><a:graphicData><a:blip r:embed="rId{n}"/></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#
        ));
        self
    }

    fn build(self) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let opts = SimpleFileOptions::default();

        zip.start_file("word/document.xml", opts).unwrap();
        write!(
            zip,
            r#"<?xml version="1.0" encoding="UTF-8"?><w:document {NAMESPACES}><w:body>{}</w:body></w:document>"#,
            self.blocks.concat()
        )
        .unwrap();

        zip.start_file("word/_rels/document.xml.rels", opts).unwrap();
        let mut rels = String::from(
            r#"<?xml version="1.0"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for n in 1..=self.images {
            rels.push_str(&format!(
                r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image{n}.png"/>"#
            ));
        }
        rels.push_str("</Relationships>");
        zip.write_all(rels.as_bytes()).unwrap();

        for n in 1..=self.images {
            zip.start_file(format!("word/media/image{n}.png"), opts)
                .unwrap();
            zip.write_all(format!("\u{89}PNG image {n}").as_bytes())
                .unwrap();
        }
        zip.finish().unwrap().into_inner()
    }
}

// ── Stub collaborators ───────────────────────────────────────────────────────

/// Stores nothing; returns `mem://<n>/<name>`.
#[derive(Default)]
struct RecordingStore {
    names: Mutex<Vec<String>>,
}

#[async_trait]
impl ImageStore for RecordingStore {
    async fn store(&self, _bytes: &[u8], suggested_name: &str) -> Result<String, StorageError> {
        let mut names = self.names.lock().unwrap();
        names.push(suggested_name.to_string());
        Ok(format!("mem://{}/{}", names.len(), suggested_name))
    }
}

struct BrokenStore;

#[async_trait]
impl ImageStore for BrokenStore {
    async fn store(&self, _bytes: &[u8], _name: &str) -> Result<String, StorageError> {
        Err(StorageError::Unavailable("bucket offline".into()))
    }

    async fn check(&self) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("bucket offline".into()))
    }
}

/// Behaviour of [`StubRewriter`].
#[derive(Clone, Copy)]
enum Mode {
    Identity,
    Empty,
    Failing,
    /// Drops every line containing a token, keeps everything else.
    DropTokens,
    /// Repeats every paragraph twice.
    Duplicate,
    Slow,
}

struct StubRewriter {
    mode: Mode,
    calls: AtomicUsize,
    inputs: Mutex<Vec<String>>,
}

impl StubRewriter {
    fn new(mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextRewriter for StubRewriter {
    async fn rewrite(
        &self,
        text: &str,
        _constraints: &RewriteConstraints,
    ) -> Result<String, RewriteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(text.to_string());
        match self.mode {
            Mode::Identity => Ok(text.to_string()),
            Mode::Empty => Ok(String::new()),
            Mode::Failing => Err(RewriteError::Backend("HTTP 503".into())),
            Mode::DropTokens => Ok(text
                .lines()
                .filter(|l| !l.contains("IMG_PLACEHOLDER"))
                .collect::<Vec<_>>()
                .join("\n")),
            Mode::Duplicate => Ok(format!("{text}\n\n{text}")),
            Mode::Slow => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(text.to_string())
            }
        }
    }
}

fn fast_config() -> ConversionConfig {
    ConversionConfig::builder()
        .max_retries(0)
        .retry_backoff_ms(1)
        .rewrite_timeout_secs(1)
        .build()
        .unwrap()
}

fn converter(store: Arc<dyn ImageStore>, rewriter: Arc<dyn TextRewriter>) -> Converter {
    Converter::new(fast_config(), store, rewriter)
}

fn hello_chart_bye() -> Vec<u8> {
    DocxBuilder::new()
        .para("Hello")
        .image("A chart")
        .para("Bye")
        .build()
}

// ── Happy path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn identity_rewrite_keeps_text_and_image_in_place() {
    let store = Arc::new(RecordingStore::default());
    let rewriter = StubRewriter::new(Mode::Identity);
    let out = converter(store.clone(), rewriter.clone())
        .convert_bytes("memo.docx", &hello_chart_bye())
        .await
        .unwrap();

    assert_eq!(
        out.markdown,
        "Hello\n\n![A chart](mem://1/image1.png)\n\nBye\n"
    );
    assert_eq!(out.status, ConversionStatus::Success);
    assert_eq!(out.filename, "memo.docx");
    assert_eq!(out.images.len(), 1);
    assert_eq!(out.images[0].reference, "mem://1/image1.png");
    assert_eq!(out.placeholders.len(), 1);
    assert!(out.warnings.is_empty());
    assert_eq!(rewriter.calls(), 1);
    assert_eq!(*store.names.lock().unwrap(), vec!["image1.png".to_string()]);

    // The rewriter saw a token, never the image.
    let inputs = rewriter.inputs.lock().unwrap();
    assert!(inputs[0].contains("[[IMG_PLACEHOLDER_1]]"));
}

#[tokio::test]
async fn images_keep_discovery_order() {
    let docx = DocxBuilder::new()
        .heading(1, "Report")
        .image("first")
        .para("middle text")
        .image("second")
        .image("third")
        .build();
    let out = converter(
        Arc::new(RecordingStore::default()),
        StubRewriter::new(Mode::Identity),
    )
    .convert_bytes("report.docx", &docx)
    .await
    .unwrap();

    let md = &out.markdown;
    assert!(md.starts_with("# Report\n"));
    let p1 = md.find("![first]").unwrap();
    let pm = md.find("middle text").unwrap();
    let p2 = md.find("![second]").unwrap();
    let p3 = md.find("![third]").unwrap();
    assert!(p1 < pm && pm < p2 && p2 < p3, "order broken:\n{md}");
}

#[tokio::test]
async fn stage_events_follow_the_state_machine() {
    struct Log(Mutex<Vec<ConversionStage>>);
    impl ConversionProgressCallback for Log {
        fn on_stage(&self, _filename: &str, stage: ConversionStage) {
            self.0.lock().unwrap().push(stage);
        }
    }

    let log = Arc::new(Log(Mutex::new(Vec::new())));
    let config = ConversionConfig::builder()
        .progress_callback(log.clone())
        .build()
        .unwrap();
    Converter::new(
        config,
        Arc::new(RecordingStore::default()),
        StubRewriter::new(Mode::Identity),
    )
    .convert_bytes("a.docx", &hello_chart_bye())
    .await
    .unwrap();

    use ConversionStage::*;
    assert_eq!(
        *log.0.lock().unwrap(),
        vec![Received, Extracting, Linearizing, Encoding, Rewriting, Decoding, Verifying, Completed]
    );
}

// ── Rewriter misbehaviour ────────────────────────────────────────────────────

#[tokio::test]
async fn empty_rewrite_falls_back_with_title() {
    let out = converter(
        Arc::new(RecordingStore::default()),
        StubRewriter::new(Mode::Empty),
    )
    .convert_bytes("quarterly_report.docx", &hello_chart_bye())
    .await
    .unwrap();

    assert!(out.markdown.starts_with("# quarterly report\n\nHello"));
    assert!(out.markdown.contains("![A chart](mem://1/image1.png)"));
    assert!(out.markdown.contains("Bye"));
    assert_eq!(out.status, ConversionStatus::Degraded);
    assert!(matches!(
        out.warnings[0],
        StageWarning::ContentLossDetected { chunk: 1, .. }
    ));
    assert_eq!(out.stats.fallback_chunks, 1);
}

#[tokio::test]
async fn failing_rewriter_still_returns_markdown() {
    let out = converter(
        Arc::new(RecordingStore::default()),
        StubRewriter::new(Mode::Failing),
    )
    .convert_bytes("memo.docx", &hello_chart_bye())
    .await
    .unwrap();

    assert!(out.markdown.contains("Hello"));
    assert!(out.markdown.contains("![A chart](mem://1/image1.png)"));
    assert!(out
        .warnings
        .iter()
        .any(|w| matches!(w, StageWarning::RewriteFailed { chunk: 1, .. })));
}

#[tokio::test]
async fn timed_out_rewrite_falls_back() {
    let out = converter(
        Arc::new(RecordingStore::default()),
        StubRewriter::new(Mode::Slow),
    )
    .convert_bytes("memo.docx", &hello_chart_bye())
    .await
    .unwrap();

    assert!(out.markdown.contains("Hello"));
    assert!(out.markdown.contains("Bye"));
    assert!(out
        .warnings
        .iter()
        .any(|w| matches!(w, StageWarning::RewriteTimeout { secs: 1, .. })));
}

#[tokio::test]
async fn dropped_token_is_appended_at_end() {
    let docx = DocxBuilder::new()
        .para("one two three four five six seven eight nine ten")
        .image("lost")
        .para("eleven twelve thirteen")
        .build();
    let out = converter(
        Arc::new(RecordingStore::default()),
        StubRewriter::new(Mode::DropTokens),
    )
    .convert_bytes("memo.docx", &docx)
    .await
    .unwrap();

    assert!(out
        .markdown
        .trim_end()
        .ends_with("![lost](mem://1/image1.png)"));
    assert_eq!(out.markdown.matches("mem://1/image1.png").count(), 1);
    assert_eq!(out.stats.images_appended, 1);
    assert!(out.warnings.contains(&StageWarning::PlaceholderRecovered {
        placeholder: "[[IMG_PLACEHOLDER_1]]".into()
    }));
}

#[tokio::test]
async fn duplicated_token_appears_once() {
    let out = converter(
        Arc::new(RecordingStore::default()),
        StubRewriter::new(Mode::Duplicate),
    )
    .convert_bytes("memo.docx", &hello_chart_bye())
    .await
    .unwrap();

    assert_eq!(out.markdown.matches("![A chart]").count(), 1);
    assert!(!out.markdown.contains("IMG_PLACEHOLDER"));
}

// ── Chunking ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn chunking_never_splits_a_token() {
    let mut builder = DocxBuilder::new();
    for i in 0..40 {
        builder = builder.para(&format!("Paragraph {i} with a handful of ordinary words in it."));
        if i % 5 == 0 {
            builder = builder.image(&format!("figure {i}"));
        }
    }
    let config = ConversionConfig::builder()
        .max_input_chars(256)
        .build()
        .unwrap();
    let rewriter = StubRewriter::new(Mode::Identity);
    let out = Converter::new(config, Arc::new(RecordingStore::default()), rewriter.clone())
        .convert_bytes("long.docx", &builder.build())
        .await
        .unwrap();

    let inputs = rewriter.inputs.lock().unwrap();
    assert!(inputs.len() > 1, "expected several chunks");
    for chunk in inputs.iter() {
        assert!(chunk.chars().count() <= 256);
        assert_eq!(
            chunk.matches("[[IMG_PLACEHOLDER_").count(),
            chunk.matches("]]").count(),
            "split token in chunk: {chunk}"
        );
    }
    assert_eq!(out.images.len(), 8);
    for image in &out.images {
        assert_eq!(out.markdown.matches(image.reference.as_str()).count(), 1);
    }
    assert_eq!(out.status, ConversionStatus::Success);
    assert_eq!(out.stats.chunks, inputs.len());
}

// ── Rejections and degenerate input ──────────────────────────────────────────

#[tokio::test]
async fn unsupported_extension_is_rejected_before_processing() {
    let rewriter = StubRewriter::new(Mode::Identity);
    let err = converter(Arc::new(RecordingStore::default()), rewriter.clone())
        .convert_bytes("report.txt", b"plain text")
        .await
        .unwrap_err();

    assert!(matches!(err, Doc2MdError::UnsupportedFormat { .. }));
    assert!(err.is_client_error());
    assert_eq!(rewriter.calls(), 0);
}

#[tokio::test]
async fn empty_upload_is_rejected() {
    let err = converter(
        Arc::new(RecordingStore::default()),
        StubRewriter::new(Mode::Identity),
    )
    .convert_bytes("empty.pdf", b"")
    .await
    .unwrap_err();
    assert!(matches!(err, Doc2MdError::EmptyInput { .. }));
}

#[tokio::test]
async fn document_without_content_skips_rewriter() {
    let rewriter = StubRewriter::new(Mode::Identity);
    let out = converter(Arc::new(RecordingStore::default()), rewriter.clone())
        .convert_bytes("blank.docx", &DocxBuilder::new().para("   ").build())
        .await
        .unwrap();

    assert_eq!(out.status, ConversionStatus::NoContent);
    assert_eq!(out.markdown, NO_CONTENT_MARKDOWN);
    assert!(out.images.is_empty());
    assert_eq!(rewriter.calls(), 0);
}

// ── Storage ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn storage_failure_drops_only_the_image() {
    let out = converter(Arc::new(BrokenStore), StubRewriter::new(Mode::Identity))
        .convert_bytes("memo.docx", &hello_chart_bye())
        .await
        .unwrap();

    assert_eq!(out.markdown, "Hello\n\nBye\n");
    assert!(out.images.is_empty());
    assert_eq!(out.status, ConversionStatus::Degraded);
    assert!(matches!(
        out.warnings[0],
        StageWarning::StorageFailed { ref name, .. } if name == "image1.png"
    ));
}

#[tokio::test]
async fn directory_store_writes_referenced_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DirectoryImageStore::new(
        dir.path(),
        Some("https://cdn.example.com/img".into()),
    ));
    let out = converter(store, StubRewriter::new(Mode::Identity))
        .convert_bytes("memo.docx", &hello_chart_bye())
        .await
        .unwrap();

    let reference = &out.images[0].reference;
    assert!(reference.starts_with("https://cdn.example.com/img/"));
    assert!(out.markdown.contains(reference.as_str()));

    let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(files.len(), 1);
}

#[tokio::test]
async fn natural_token_text_is_not_treated_as_image() {
    let docx = DocxBuilder::new()
        .para("The marker [[IMG_PLACEHOLDER_7]] is documented here.")
        .build();
    let out = converter(
        Arc::new(RecordingStore::default()),
        StubRewriter::new(Mode::Identity),
    )
    .convert_bytes("doc.docx", &docx)
    .await
    .unwrap();

    assert!(out.images.is_empty());
    assert!(out.markdown.contains("IMG_PLACEHOLDER_7"));
    assert!(out.warnings.is_empty());
}

#[tokio::test]
async fn image_syntax_in_document_text_survives_rewrite() {
    let docx = DocxBuilder::new()
        .para("Write ![logo](logo.png) to embed a picture.")
        .build();
    let out = converter(
        Arc::new(RecordingStore::default()),
        StubRewriter::new(Mode::Identity),
    )
    .convert_bytes("markdown-guide.docx", &docx)
    .await
    .unwrap();

    assert_eq!(out.markdown, "Write ![logo](logo.png) to embed a picture.\n");
    assert!(out.images.is_empty());
    assert_eq!(out.status, ConversionStatus::Success);
}

#[tokio::test]
async fn health_reports_broken_store() {
    let report = converter(Arc::new(BrokenStore), StubRewriter::new(Mode::Identity))
        .health()
        .await;
    assert!(!report.storage_reachable);
    assert!(report.rewriter_reachable);
    assert!(!report.is_healthy());
    assert_eq!(report.details.len(), 1);
}
