//! Text normalization shared by the scope cache and repeat detection.

/// Trim, collapse internal whitespace runs to a single space, and lowercase.
///
/// Two messages that differ only in spacing or letter case normalize to the
/// same key.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    out
}
