//! Character-budget helpers used when threading outputs between agents.

/// Returns at most `max_chars` characters of `text`, never splitting a
/// UTF-8 code point.
pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Truncates `text` to `max_chars` characters and appends a
/// `[... truncated N chars]` marker naming how much was cut.
pub fn truncate_with_marker(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    format!(
        "{}\n\n[... truncated {} chars]",
        preview(text, max_chars),
        total - max_chars
    )
}
