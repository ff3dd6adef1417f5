//! Post-processing: deterministic cleanup of rewriter output.
//!
//! The rewriter only ever sees text and image tokens, so everything it adds
//! beyond Markdown structure is noise to undo before decoding:
//!
//! - a ` ```markdown ... ``` ` fence around the whole answer
//! - `\r\n` line endings and trailing blanks
//! - a token turned into an image or code span, e.g. `![fig]([[IMG_PLACEHOLDER_1]])`
//! - image links for pictures it imagined from the surrounding text
//!
//! Two entry points:
//!
//! * [`clean_rewrite`] runs on each rewritten chunk *before* placeholder
//!   decoding, so it sees tokens, never real image references.
//! * [`finalize_document`] runs once on the decoded document and only touches
//!   whitespace.

use crate::placeholder;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Clean one rewritten chunk. `source` is the text the rewriter was given.
///
/// Rules, in order:
/// 1. strip an outer Markdown fence
/// 2. normalise line endings and trim trailing whitespace per line
/// 3. unwrap tokens from image or code-span syntax
/// 4. replace image links absent from `source` by their alt text
/// 5. collapse runs of blank lines and put a blank line before headings
/// 6. strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
///
/// The result is trimmed; chunks are joined by the caller.
pub fn clean_rewrite(output: &str, source: &str) -> String {
    let s = strip_outer_fence(output);
    let s = normalise_lines(&s);
    let s = placeholder::unwrap_tokens(&s);
    let s = drop_invented_images(&s, source);
    let s = collapse_blank_lines(&s);
    let s = space_headings(&s);
    let s = remove_invisible_chars(&s);
    s.trim().to_string()
}

/// Whitespace-only cleanup of the final document, ending in one newline.
pub fn finalize_document(input: &str) -> String {
    let s = normalise_lines(input);
    let s = collapse_blank_lines(&s);
    let trimmed = s.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

// ── Fences and whitespace ────────────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?[ \t]*\n(.*)\n```\s*$").unwrap());

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

fn normalise_lines(input: &str) -> String {
    input
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

/// At most two blank lines in a row.
fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n\n").into_owned()
}

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s").unwrap());

fn space_headings(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for line in input.lines() {
        let needs_gap = RE_HEADING.is_match(line)
            && out.last().is_some_and(|prev| !prev.trim().is_empty());
        if needs_gap {
            out.push("");
        }
        out.push(line);
    }
    out.join("\n")
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Invented images ──────────────────────────────────────────────────────
//
// Every real image is still a token at this point, so an image link the
// document itself did not contain was made up by the rewriter. Its alt text
// is kept as emphasis so no words are lost.

static RE_IMAGE_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").unwrap());

fn drop_invented_images(input: &str, source: &str) -> String {
    RE_IMAGE_LINK
        .replace_all(input, |caps: &Captures<'_>| {
            if source.contains(&caps[0]) {
                return caps[0].to_string();
            }
            match caps[1].trim() {
                "" => String::new(),
                alt => format!("*{}*", alt),
            }
        })
        .into_owned()
}
