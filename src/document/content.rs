use tdoc::{Document, Paragraph, Span};

pub(crate) fn ensure_document_initialized(document: &mut Document) {
    if document.paragraphs.is_empty() {
        document
            .paragraphs
            .push(Paragraph::new_text().with_content(vec![Span::new_text("")]));
    }
}

pub fn char_to_byte_idx(text: &str, char_idx: usize) -> usize {
    if char_idx == 0 {
        return 0;
    }
    for (count, (byte_idx, _)) in text.char_indices().enumerate() {
        if count == char_idx {
            return byte_idx;
        }
    }
    text.len()
}

pub(crate) fn split_text(text: &str, offset: usize) -> (String, String) {
    let byte_idx = char_to_byte_idx(text, offset);
    (text[..byte_idx].to_string(), text[byte_idx..].to_string())
}

/// Chars `[start, end)` of `text`, clamped to its length.
pub fn char_slice(text: &str, start: usize, end: usize) -> &str {
    let from = char_to_byte_idx(text, start);
    let to = char_to_byte_idx(text, end.max(start));
    &text[from..to]
}

pub(crate) fn insert_char_into(text: &mut String, offset: usize, ch: char) {
    let clamped_offset = offset.min(text.chars().count());
    let byte_idx = char_to_byte_idx(text, clamped_offset);
    text.insert(byte_idx, ch);
}

pub(crate) fn remove_char_from_text(text: &mut String, offset: usize) -> bool {
    let char_len = text.chars().count();
    if offset >= char_len {
        return false;
    }
    let start = char_to_byte_idx(text, offset);
    let end = char_to_byte_idx(text, offset + 1);
    if start >= end || end > text.len() {
        return false;
    }
    text.drain(start..end);
    true
}

/// Whether the span's own text is addressable as a leaf.
pub(crate) fn span_has_text_leaf(span: &Span) -> bool {
    span.children.is_empty() || !span.text.is_empty()
}
