//! Placeholder encoding and decoding.
//!
//! Images cannot travel through the text rewriter, so each one is replaced by
//! an opaque token, `[[IMG_PLACEHOLDER_<n>]]`, at its position in the linear
//! text. After rewriting, every token is swapped back for Markdown image
//! syntax. Position is carried by string order alone: there is no side table
//! of offsets to keep in sync.
//!
//! This module is the only place tokens are minted or parsed.
//!
//! ## Guarantees
//!
//! * Every image that was stored appears **exactly once** in the decoded
//!   Markdown: inline where its token survived, appended at the end (in
//!   discovery order) where the rewriter dropped it.
//! * Text that happens to contain the token prefix is escaped before
//!   encoding, so a document can never forge a token.
//! * Tokens whose underscores were Markdown-escaped by the rewriter
//!   (`[[IMG\_PLACEHOLDER\_3]]`) are still recognised. Duplicates and unknown
//!   numbers are removed.

use crate::error::StageWarning;
use crate::output::ImageRecord;
use crate::pipeline::linearize::{LinearDocument, LinearItem};
use crate::storage::ImageStore;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Literal prefix shared by every token.
pub const TOKEN_PREFIX: &str = "[[IMG_PLACEHOLDER_";

/// Canonical and escaped-underscore forms, with optional inner padding.
const TOKEN_PATTERN: &str = r"\[\[\s*IMG\\?_PLACEHOLDER\\?_(\d+)\s*\]\]";

static RE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(TOKEN_PATTERN).unwrap());

/// A token used as an image target (`![alt](TOKEN)`, `![alt](<TOKEN>)`) or
/// inside a code span.
static RE_WRAPPED_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"!\[[^\]]*\]\(\s*<?(?P<img>{TOKEN_PATTERN})>?\s*\)|`(?P<code>{TOKEN_PATTERN})`"
    ))
    .unwrap()
});

/// Anything in source text that could be read back as a token.
static RE_NATURAL_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[(\s*IMG\\?_PLACEHOLDER\\?_)").unwrap());

// ── Placeholder ──────────────────────────────────────────────────────────

/// One image position marker. Numbering starts at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Placeholder(usize);

impl Placeholder {
    pub fn new(n: usize) -> Self {
        Self(n)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}]]", TOKEN_PREFIX, self.0)
    }
}

/// Error returned when a string is not a canonical token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a placeholder token: '{0}'")]
pub struct ParsePlaceholderError(String);

impl FromStr for Placeholder {
    type Err = ParsePlaceholderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(TOKEN_PREFIX)
            .and_then(|rest| rest.strip_suffix("]]"))
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse().ok())
            .map(Placeholder)
            .ok_or_else(|| ParsePlaceholderError(s.to_string()))
    }
}

impl Serialize for Placeholder {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Placeholder {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ── PlaceholderMap ───────────────────────────────────────────────────────

/// Placeholder → image, in discovery order. Built once by [`encode`], read
/// once by [`decode`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceholderMap {
    records: Vec<ImageRecord>,
}

impl PlaceholderMap {
    pub fn get(&self, placeholder: Placeholder) -> Option<&ImageRecord> {
        self.records.iter().find(|r| r.placeholder == placeholder)
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn push(&mut self, record: ImageRecord) {
        self.records.push(record);
    }
}

// ── Encode ───────────────────────────────────────────────────────────────

/// Linear text ready for the rewriter, plus what is needed to undo it.
#[derive(Debug, Clone, Default)]
pub struct EncodedDocument {
    /// Paragraphs separated by blank lines; each image is a token paragraph.
    pub text: String,
    pub map: PlaceholderMap,
    /// Images the store refused. They are absent from `text` and `map`.
    pub warnings: Vec<StageWarning>,
}

/// Walk the linear document, storing each image and minting its token.
///
/// Images are stored one at a time, in discovery order. A token is minted
/// only after its image was stored, so a storage failure never leaves a
/// dangling token behind.
pub async fn encode(doc: &LinearDocument, store: &dyn ImageStore) -> EncodedDocument {
    let mut paragraphs: Vec<String> = Vec::with_capacity(doc.items.len());
    let mut map = PlaceholderMap::default();
    let mut warnings = Vec::new();

    for item in &doc.items {
        match item {
            LinearItem::Paragraph(text) => paragraphs.push(escape_natural_tokens(text)),
            LinearItem::PageBreak(marker) => paragraphs.push(marker.clone()),
            LinearItem::Image(data) => {
                match store.store(&data.bytes, &data.suggested_name).await {
                    Ok(reference) => {
                        let placeholder = Placeholder(map.len() + 1);
                        debug!("{} → {}", placeholder, data.suggested_name);
                        paragraphs.push(placeholder.to_string());
                        map.push(ImageRecord {
                            reference,
                            mime_type: data.mime_type.clone(),
                            description: data.description.clone().unwrap_or_default(),
                            placeholder,
                        });
                    }
                    Err(e) => {
                        warn!("Dropping image '{}': {}", data.suggested_name, e);
                        warnings.push(StageWarning::StorageFailed {
                            name: data.suggested_name.clone(),
                            detail: e.to_string(),
                        });
                    }
                }
            }
        }
    }

    EncodedDocument {
        text: paragraphs.join("\n\n"),
        map,
        warnings,
    }
}

/// Escape anything in document text that the decoder would read as a token.
pub fn escape_natural_tokens(text: &str) -> String {
    RE_NATURAL_PREFIX
        .replace_all(text, |caps: &Captures| format!("\\[\\[{}", &caps[1]))
        .into_owned()
}

/// Undo Markdown the rewriter put around a token, leaving the bare token.
pub fn unwrap_tokens(text: &str) -> String {
    RE_WRAPPED_TOKEN
        .replace_all(text, |caps: &Captures| {
            caps.name("img")
                .or_else(|| caps.name("code"))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        })
        .into_owned()
}

// ── Decode ───────────────────────────────────────────────────────────────

/// Result of [`decode`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    pub markdown: String,
    /// Images whose token was substituted in place.
    pub inline: usize,
    /// Images whose token was missing and were appended, in discovery order.
    pub appended: Vec<Placeholder>,
    /// Duplicate or unknown tokens that were deleted.
    pub removed: usize,
}

/// Replace tokens with image Markdown.
///
/// The first occurrence of each known token becomes `![description](reference)`;
/// later occurrences and tokens not in `map` are deleted. Images whose token
/// never appeared are appended at the end of the document.
pub fn decode(text: &str, map: &PlaceholderMap) -> Decoded {
    let mut seen: HashSet<Placeholder> = HashSet::new();
    let mut removed = 0usize;

    let replaced = RE_TOKEN.replace_all(text, |caps: &Captures| {
        let record = caps[1]
            .parse::<usize>()
            .ok()
            .map(Placeholder)
            .and_then(|p| map.get(p));
        match record {
            Some(r) if seen.insert(r.placeholder) => r.markdown(),
            _ => {
                removed += 1;
                String::new()
            }
        }
    });
    let mut markdown = replaced.into_owned();

    let appended: Vec<Placeholder> = map
        .records()
        .iter()
        .filter(|r| !seen.contains(&r.placeholder))
        .map(|r| r.placeholder)
        .collect();

    if !appended.is_empty() {
        warn!(
            "{} image token(s) lost during rewriting; appending at the end",
            appended.len()
        );
        for p in &appended {
            if let Some(r) = map.get(*p) {
                append_paragraph(&mut markdown, &r.markdown());
            }
        }
    }
    if removed > 0 {
        debug!("Removed {} duplicate or unknown image token(s)", removed);
    }

    Decoded {
        markdown,
        inline: seen.len(),
        appended,
        removed,
    }
}

/// Append any record whose reference is absent from `markdown`.
///
/// Returns the placeholders that had to be injected. After [`decode`] this is
/// normally empty; a later cleanup pass is the only thing that could remove a
/// reference.
pub fn ensure_all_present(markdown: &mut String, map: &PlaceholderMap) -> Vec<Placeholder> {
    let missing: Vec<&ImageRecord> = map
        .records()
        .iter()
        .filter(|r| !markdown.contains(&r.reference))
        .collect();

    let mut injected = Vec::with_capacity(missing.len());
    for r in missing {
        append_paragraph(markdown, &r.markdown());
        injected.push(r.placeholder);
    }
    injected
}

fn append_paragraph(markdown: &mut String, paragraph: &str) {
    let trimmed_len = markdown.trim_end().len();
    markdown.truncate(trimmed_len);
    if !markdown.is_empty() {
        markdown.push_str("\n\n");
    }
    markdown.push_str(paragraph);
    markdown.push('\n');
}
