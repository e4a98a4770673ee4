//! Case-insensitive substring matching
//!
//! Text is lowercased char by char. Lowercasing can change byte lengths, so
//! every folded byte remembers the original byte offset it came from, and
//! match positions are reported against the original text.

/// One occurrence of the query in a page's text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextMatch<'a> {
    /// Byte offset into the original text
    pub position: usize,
    /// The matched slice, in its original case
    pub text: &'a str,
}

struct Folded {
    text: String,
    /// Original byte offset for each byte of `text`
    origin: Vec<usize>,
}

fn fold(text: &str) -> Folded {
    let mut folded = String::with_capacity(text.len());
    let mut origin = Vec::with_capacity(text.len());
    for (offset, c) in text.char_indices() {
        for lower in c.to_lowercase() {
            folded.push(lower);
            origin.resize(folded.len(), offset);
        }
    }
    Folded {
        text: folded,
        origin,
    }
}

/// Find non-overlapping, case-insensitive occurrences of `query` in `haystack`.
///
/// After a match the scan resumes at the end of it, so `"aa"` occurs twice
/// in `"aaaa"`, not three times.
pub fn find_matches<'a>(haystack: &'a str, query: &str) -> Vec<TextMatch<'a>> {
    let needle: String = query.chars().flat_map(char::to_lowercase).collect();
    if needle.is_empty() {
        return Vec::new();
    }

    let folded = fold(haystack);
    let mut matches = Vec::new();
    let mut cursor = 0;
    while let Some(found) = folded.text[cursor..].find(&needle) {
        let start = cursor + found;
        let end = start + needle.len();

        let original_start = folded.origin[start];
        let last = folded.origin[end - 1];
        let original_end = last + haystack[last..].chars().next().map_or(0, char::len_utf8);

        matches.push(TextMatch {
            position: original_start,
            text: &haystack[original_start..original_end],
        });
        cursor = end;
    }
    matches
}
