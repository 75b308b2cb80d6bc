//! Paragraph extractor.
//!
//! Splits raw document text into paragraphs on blank-line boundaries and
//! keeps only spans meeting a minimum word count. Paragraph order is
//! preserved and no paragraph ever spans more than one original gap.

/// Split `text` into trimmed paragraphs of at least `min_words` words.
///
/// A blank line is any line containing only whitespace. Empty input
/// yields an empty vector, not an error.
pub fn extract_paragraphs(text: &str, min_words: usize) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            flush_paragraph(&mut current, min_words, &mut paragraphs);
        } else {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        }
    }
    flush_paragraph(&mut current, min_words, &mut paragraphs);

    paragraphs
}

fn flush_paragraph(buf: &mut String, min_words: usize, out: &mut Vec<String>) {
    let trimmed = buf.trim();
    if !trimmed.is_empty() && word_count(trimmed) >= min_words {
        out.push(trimmed.to_string());
    }
    buf.clear();
}

/// Whitespace-delimited word count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
