//! Paragraph-boundary chunking for the rewriter.
//!
//! Text is split on blank lines and packed greedily into chunks of at most
//! `max_chars` characters. A single paragraph larger than the budget is split
//! at line breaks, then at whitespace. No split ever happens inside a run of
//! non-whitespace characters, so placeholder tokens (which contain no
//! whitespace) always land whole in exactly one chunk. A single token larger
//! than the budget becomes an oversized chunk of its own.

/// Split `text` into rewrite chunks of at most `max_chars` characters each.
pub fn split_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if char_len(para) > max_chars {
            flush(&mut current, &mut chunks);
            chunks.extend(split_oversized(para, max_chars));
            continue;
        }
        let sep = if current.is_empty() { 0 } else { 2 };
        if char_len(&current) + sep + char_len(para) > max_chars {
            flush(&mut current, &mut chunks);
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(para);
    }

    flush(&mut current, &mut chunks);
    chunks
}

/// Split one paragraph at `\n`, falling back to whitespace for long lines.
fn split_oversized(para: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for line in para.lines() {
        if char_len(line) > max_chars {
            flush(&mut current, &mut pieces);
            pieces.extend(pack(line.split_whitespace(), " ", max_chars));
            continue;
        }
        let sep = if current.is_empty() { 0 } else { 1 };
        if char_len(&current) + sep + char_len(line) > max_chars {
            flush(&mut current, &mut pieces);
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }

    flush(&mut current, &mut pieces);
    pieces
}

fn pack<'a>(words: impl Iterator<Item = &'a str>, sep: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for word in words {
        let extra = if current.is_empty() { 0 } else { sep.len() };
        if !current.is_empty() && char_len(&current) + extra + char_len(word) > max_chars {
            flush(&mut current, &mut out);
        }
        if !current.is_empty() {
            current.push_str(sep);
        }
        current.push_str(word);
    }
    flush(&mut current, &mut out);
    out
}

fn flush(current: &mut String, out: &mut Vec<String>) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    current.clear();
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placeholder::Placeholder;

    fn assert_tokens_whole(chunks: &[String]) {
        for chunk in chunks {
            let mut rest = chunk.as_str();
            while let Some(pos) = rest.find("[[IMG_PLACEHOLDER_") {
                let tail = &rest[pos + "[[IMG_PLACEHOLDER_".len()..];
                let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
                assert!(!digits.is_empty(), "cut token in chunk: {chunk:?}");
                assert!(
                    tail[digits.len()..].starts_with("]]"),
                    "cut token in chunk: {chunk:?}"
                );
                rest = &tail[digits.len()..];
            }
            assert!(
                !chunk.starts_with("IMG_PLACEHOLDER") && !chunk.starts_with(']'),
                "chunk starts mid-token: {chunk:?}"
            );
        }
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = split_chunks("a\n\nb\n\nc", 100);
        assert_eq!(chunks, vec!["a\n\nb\n\nc"]);
    }

    #[test]
    fn packs_paragraphs_greedily() {
        let text = "aaaa\n\nbbbb\n\ncccc";
        let chunks = split_chunks(text, 10);
        assert_eq!(chunks, vec!["aaaa\n\nbbbb", "cccc"]);
    }

    #[test]
    fn identity_rejoin_for_paragraph_splits() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {i} with a few words."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = split_chunks(&text, 300);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 300));
        assert_eq!(chunks.join("\n\n"), text);
    }

    #[test]
    fn tokens_never_split_at_any_budget() {
        let mut paras = Vec::new();
        for i in 1..=30 {
            paras.push(format!("Some words before image {i} and after it."));
            paras.push(Placeholder::new(i).to_string());
            paras.push(format!("word{i} {} trailing", Placeholder::new(100 + i)));
        }
        let text = paras.join("\n\n");

        for budget in [5usize, 17, 23, 40, 64, 97, 256] {
            let chunks = split_chunks(&text, budget);
            assert_tokens_whole(&chunks);
            for i in 1..=30 {
                let tok = Placeholder::new(i).to_string();
                let hits: usize = chunks.iter().map(|c| c.matches(&tok).count()).sum();
                assert_eq!(hits, 1, "budget {budget}: {tok} appears {hits} times");
            }
        }
    }

    #[test]
    fn oversized_paragraph_splits_on_lines_then_words() {
        let para = "alpha beta gamma\ndelta epsilon zeta eta theta iota kappa";
        let chunks = split_chunks(para, 20);
        assert_eq!(chunks[0], "alpha beta gamma");
        assert!(chunks.iter().all(|c| c.chars().count() <= 20), "{chunks:?}");
        let words: Vec<&str> = chunks.iter().flat_map(|c| c.split_whitespace()).collect();
        assert_eq!(words, para.split_whitespace().collect::<Vec<_>>());
    }

    #[test]
    fn blank_input_has_no_chunks() {
        assert!(split_chunks("  \n\n\n\n ", 100).is_empty());
    }
}
