//! List-marker tokens shared by item formatting and enumeration.
//!
//! A marker is a whitespace-delimited token of one of the shapes `(N)`, `[N]`, `<N>`,
//! `N.`, `N)` or `N_` with `N` one or two digits. Whitespace between tokens is kept
//! byte-for-byte.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+").expect("token regex"));

static MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\((?P<p>\d{1,2})\)|\[(?P<b>\d{1,2})\]|<(?P<a>\d{1,2})>|(?P<s>\d{1,2})[.)_])$")
        .expect("marker regex")
});

/// Byte range of the number inside a marker token, or `None` when `token` is not a marker.
pub(crate) fn marker_number(token: &str) -> Option<Range<usize>> {
    let caps = MARKER.captures(token)?;
    ["p", "b", "a", "s"]
        .iter()
        .find_map(|g| caps.name(g))
        .map(|m| m.range())
}

/// True when `text` has at least one marker token.
pub fn contains_marker(text: &str) -> bool {
    TOKEN
        .find_iter(text)
        .any(|m| marker_number(m.as_str()).is_some())
}

/// Rewrites each marker token with `f(token, number_range)`; `None` keeps the token.
pub(crate) fn map_markers<F>(text: &str, mut f: F) -> String
where
    F: FnMut(&str, Range<usize>) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in TOKEN.find_iter(text) {
        out.push_str(&text[last..m.start()]);
        let token = m.as_str();
        match marker_number(token).and_then(|range| f(token, range)) {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(token),
        }
        last = m.end();
    }
    out.push_str(&text[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_marker_shapes() {
        for token in ["(1)", "[2]", "<3>", "4.", "5)", "6_", "12."] {
            assert!(marker_number(token).is_some(), "{}", token);
        }
        for token in ["1", "100.", "a.", "(1", "2+3", "1.5", "(1)."] {
            assert!(marker_number(token).is_none(), "{}", token);
        }
    }

    #[test]
    fn number_range_points_inside_token() {
        let token = "[12]";
        let range = marker_number(token).unwrap();
        assert_eq!(&token[range], "12");
    }

    #[test]
    fn map_markers_preserves_whitespace() {
        let text = "  1. apples\n\t2. pears ";
        let out = map_markers(text, |token, range| Some(format!("<{}>", &token[range])));
        assert_eq!(out, "  <1> apples\n\t<2> pears ");
    }

    #[test]
    fn contains_marker_ignores_bare_numbers() {
        assert!(!contains_marker("Solve 3*4 and 2 more"));
        assert!(contains_marker("Options: 1) yes 2) no"));
    }
}
