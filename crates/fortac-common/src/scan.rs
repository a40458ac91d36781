//! Small text-scanning utilities shared by statement classification and
//! declaration parsing.
//!
//! Fortran statement text nests parenthesized expressions (kind specs,
//! array bounds, argument lists), so naive `split`/`find` calls are wrong
//! almost everywhere. These helpers are all parenthesis-depth aware.

/// Split `s` on `sep`, ignoring separators inside parentheses.
pub fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, ch) in s.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Find the first occurrence of `pat` outside any parentheses.
pub fn find_top_level(s: &str, pat: &str) -> Option<usize> {
    let mut depth = 0usize;
    let bytes = s.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            _ if depth == 0 && s.is_char_boundary(i) && s[i..].starts_with(pat) => {
                return Some(i);
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// For `s` starting with `(`, return the text inside the matching close
/// paren and the remainder after it.
pub fn paren_inner(s: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    if !s.starts_with('(') {
        return None;
    }
    for (i, ch) in s.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some((&s[1..i], &s[i + 1..]));
                }
            }
            _ => {}
        }
    }
    None
}

/// Whether `s` is a plain Fortran identifier (leading underscores are
/// tolerated for compiler-generated names).
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split off the leading identifier of `s`; returns `(ident, rest)`.
pub fn take_identifier(s: &str) -> (&str, &str) {
    let end = s
        .char_indices()
        .find(|&(i, c)| {
            if i == 0 {
                !(c.is_ascii_alphabetic() || c == '_')
            } else {
                !(c.is_ascii_alphanumeric() || c == '_')
            }
        })
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    (&s[..end], &s[end..])
}

/// Remove all parenthesized index expressions from a variable expression:
/// `a(i,j)%b(k)%c` becomes `a%b%c`.
pub fn strip_array_indexing(expr: &str) -> String {
    let mut out = String::with_capacity(expr.len());
    let mut depth = 0usize;
    for ch in expr.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}
