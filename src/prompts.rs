//! Prompts for the Markdown rewrite.
//!
//! Every prompt lives here so behaviour changes touch exactly one place and
//! tests can inspect the prompts without calling a model.
//!
//! Callers can override the system prompt via
//! [`crate::config::ConversionConfig::system_prompt`]. The placeholder rule is
//! not part of the overridable text: [`system_prompt`] always appends it,
//! since decoding depends on tokens surviving the rewrite.

/// Default system prompt for turning extracted document text into Markdown.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert document converter. Convert the document text you are given into well-structured Markdown.

Follow these rules precisely:

1. TEXT PRESERVATION
   - Preserve ALL information; do not summarise, shorten or omit anything
   - Keep the order of the text exactly as given
   - Do not invent content that is not in the input

2. STRUCTURE
   - Use # for the document title, ## for major sections, ### for subsections
   - Use - for unordered lists and 1. 2. 3. for ordered lists
   - Keep lines that already are Markdown (headings, lists, tables) as they are
   - Re-join lines that were broken in the middle of a sentence

3. TABLES
   - Convert tabular text to GFM pipe tables

4. CODE
   - Wrap code in triple backticks with a language identifier when known

5. OUTPUT FORMAT
   - Output ONLY the Markdown content
   - Do NOT wrap the output in ```markdown fences
   - Do NOT add commentary or explanations"#;

/// Rule appended to every system prompt, including user overrides.
pub const PLACEHOLDER_RULE: &str = r#"

6. IMAGE MARKERS
   - The input contains markers of the form [[IMG_PLACEHOLDER_1]]
   - Copy every marker verbatim, exactly once, on its own line, at the same
     position relative to the surrounding text
   - Never escape, rename, renumber, translate or drop a marker
   - Text written as \[\[IMG_PLACEHOLDER_ is ordinary document text; keep it escaped"#;

/// Build the full system prompt, honouring an optional override.
pub fn system_prompt(custom: Option<&str>) -> String {
    let base = custom.unwrap_or(DEFAULT_SYSTEM_PROMPT);
    format!("{}{}", base, PLACEHOLDER_RULE)
}

/// Build the user message for one chunk.
///
/// `part` is `(index, total)`, 1-indexed. Single-chunk documents get no part
/// header.
pub fn chunk_message(chunk: &str, part: (usize, usize)) -> String {
    let (index, total) = part;
    if total > 1 {
        format!(
            "This is part {} of {} of a longer document. Convert only this part.\n\nDocument content:\n{}",
            index, total, chunk
        )
    } else {
        format!("Document content:\n{}", chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_keeps_placeholder_rule() {
        let p = system_prompt(Some("Be terse."));
        assert!(p.starts_with("Be terse."));
        assert!(p.contains("[[IMG_PLACEHOLDER_1]]"));
    }

    #[test]
    fn default_prompt_used_without_override() {
        let p = system_prompt(None);
        assert!(p.starts_with(DEFAULT_SYSTEM_PROMPT));
    }

    #[test]
    fn chunk_message_part_header() {
        assert_eq!(chunk_message("x", (1, 1)), "Document content:\nx");
        let m = chunk_message("x", (2, 3));
        assert!(m.starts_with("This is part 2 of 3"));
        assert!(m.ends_with("Document content:\nx"));
    }
}
