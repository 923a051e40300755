//! Text predicates and truncation shared by routing, mention matching, and
//! the output humanizer.

fn is_token_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Char-boundary-safe truncation that appends `...` when the input is cut.
pub fn truncate_with_ellipsis(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated = String::new();
    for ch in value.chars().take(max_chars) {
        truncated.push(ch);
    }
    truncated.push_str("...");
    truncated
}

/// True when `word` appears in `haystack` as a whole token, ignoring case.
///
/// Token boundaries are non-alphanumeric characters, so `"Dev, ping"`
/// matches `Dev` while `"Devon"` does not.
pub fn contains_whole_word_ci(haystack: &str, word: &str) -> bool {
    find_whole_word_ci(haystack, word).is_some()
}

/// Byte range of the first whole-token occurrence of `word` in `haystack`,
/// ignoring case.
///
/// The offsets index `haystack` itself, never a lowercased copy, so slicing
/// at either end of the range cannot split a character. That distinction
/// matters: `to_lowercase` changes byte lengths for characters like `İ`, so
/// an offset found in the lowered copy is not safe in the original.
pub fn find_whole_word_ci(haystack: &str, word: &str) -> Option<(usize, usize)> {
    let word = word.trim();
    if word.is_empty() {
        return None;
    }
    let word_lower = word.to_lowercase();
    let mut previous: Option<char> = None;
    for (start, ch) in haystack.char_indices() {
        let boundary_before = previous.map(|p| !is_token_char(p)).unwrap_or(true);
        previous = Some(ch);
        if !boundary_before {
            continue;
        }
        let Some(matched) = match_prefix_ci(&haystack[start..], &word_lower) else {
            continue;
        };
        let end = start + matched;
        let boundary_after = haystack[end..]
            .chars()
            .next()
            .map(|next| !is_token_char(next))
            .unwrap_or(true);
        if boundary_after {
            return Some((start, end));
        }
    }
    None
}

/// Byte length of the prefix of `text` whose lowercase form equals
/// `word_lower`, or `None` on mismatch. The returned length always lands on
/// a char boundary of `text`; a haystack character whose lowercase expansion
/// overruns the word is a mismatch, not a partial match.
fn match_prefix_ci(text: &str, word_lower: &str) -> Option<usize> {
    let mut remaining = word_lower.chars();
    let mut matched = 0;
    for ch in text.chars() {
        for folded in ch.to_lowercase() {
            if remaining.next() != Some(folded) {
                return None;
            }
        }
        matched += ch.len_utf8();
        if remaining.as_str().is_empty() {
            return Some(matched);
        }
    }
    None
}

/// True when `text` begins with `token` as a whole word, ignoring case and
/// leading whitespace. A name appearing mid-sentence never matches.
pub fn starts_with_token_ci(text: &str, token: &str) -> bool {
    let token = token.trim();
    if token.is_empty() {
        return false;
    }
    let trimmed = text.trim_start();
    let trimmed_lower = trimmed.to_lowercase();
    let token_lower = token.to_lowercase();
    if !trimmed_lower.starts_with(&token_lower) {
        return false;
    }
    trimmed_lower[token_lower.len()..]
        .chars()
        .next()
        .map(|ch| !is_token_char(ch))
        .unwrap_or(true)
}
