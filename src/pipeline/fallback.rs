//! Deterministic fallback formatting.
//!
//! Used for any chunk the rewriter could not be trusted with (error, timeout,
//! content loss). The original text is kept word for word; only bullet glyphs
//! are normalised to Markdown list markers. The first chunk of a document also
//! gets a top-level heading derived from the file name when it does not
//! already start with one.

use std::path::Path;

const BULLETS: &[char] = &['•', '◦', '▪', '▫', '●', '○', '■', '□', '‣', '∙'];

/// Format `chunk` without the rewriter.
///
/// `title` is only passed for the first chunk of a document.
pub fn format_chunk(chunk: &str, title: Option<&str>) -> String {
    let body = chunk
        .lines()
        .map(normalise_bullet)
        .collect::<Vec<_>>()
        .join("\n");

    match title {
        Some(t) if !t.is_empty() && !body.trim_start().starts_with('#') => {
            format!("# {}\n\n{}", t, body)
        }
        _ => body,
    }
}

/// `"quarterly_report-2024.docx"` → `"quarterly report 2024"`.
pub fn title_from_filename(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalise_bullet(line: &str) -> String {
    let trimmed = line.trim_end();
    let content = trimmed.trim_start();
    let indent = &trimmed[..trimmed.len() - content.len()];
    match content.strip_prefix(BULLETS) {
        Some(rest) => format!("{}- {}", indent, rest.trim_start()),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_from_filename_cleans_separators() {
        assert_eq!(title_from_filename("quarterly_report-2024.docx"), "quarterly report 2024");
        assert_eq!(title_from_filename("dir/My  File.pdf"), "My File");
        assert_eq!(title_from_filename(".pdf"), ".pdf");
    }

    #[test]
    fn first_chunk_gets_title() {
        let md = format_chunk("Hello world", Some("Report"));
        assert_eq!(md, "# Report\n\nHello world");
    }

    #[test]
    fn existing_heading_is_kept() {
        let md = format_chunk("## Intro\n\ntext", Some("Report"));
        assert_eq!(md, "## Intro\n\ntext");
    }

    #[test]
    fn bullets_are_normalised() {
        let md = format_chunk("Items:\n• one\n  ◦ two  \nplain", None);
        assert_eq!(md, "Items:\n- one\n  - two\nplain");
    }

    #[test]
    fn words_are_preserved() {
        let src = "The quick brown fox\n\njumps over [[IMG_PLACEHOLDER_1]] the lazy dog";
        let md = format_chunk(src, None);
        assert_eq!(
            md.split_whitespace().collect::<Vec<_>>(),
            src.split_whitespace().collect::<Vec<_>>()
        );
    }
}
