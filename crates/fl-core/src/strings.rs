//! Text helpers used by the classifier, the filter pipeline and the
//! rule synthesizer.
//!
//! All helpers work on string slices and only allocate when they have to
//! build a new string.

/// Part of `s` after the first occurrence of `separator`.
/// Returns an empty slice if `separator` is not found.
#[inline]
pub fn substring_after<'a>(s: &'a str, separator: &str) -> &'a str {
    match s.find(separator) {
        Some(pos) => &s[pos + separator.len()..],
        None => "",
    }
}

/// Part of `s` before the first occurrence of `separator`.
/// Returns the whole string if `separator` is not found.
#[inline]
pub fn substring_before<'a>(s: &'a str, separator: &str) -> &'a str {
    match s.find(separator) {
        Some(pos) => &s[..pos],
        None => s,
    }
}

/// Case-insensitive substring check.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Truncate to at most `max_len` characters, ending with `...` when cut.
pub fn truncate(s: &str, max_len: usize) -> String {
    const OMISSION: &str = "...";

    if s.chars().count() <= max_len {
        return s.to_string();
    }

    let keep = max_len.saturating_sub(OMISSION.len());
    let mut out: String = s.chars().take(keep).collect();
    out.push_str(OMISSION);
    out
}

/// Insert `value` at char boundary `index` of `s`.
pub fn insert_at(s: &str, index: usize, value: &str) -> String {
    let index = s
        .char_indices()
        .nth(index)
        .map(|(pos, _)| pos)
        .unwrap_or(s.len());

    let mut out = String::with_capacity(s.len() + value.len());
    out.push_str(&s[..index]);
    out.push_str(value);
    out.push_str(&s[index..]);
    out
}
