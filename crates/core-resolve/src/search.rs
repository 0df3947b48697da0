//! Literal occurrence search over a live snapshot.

use core_text::{TextSnapshot, grapheme};
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Candidate {
    pub bytes: Range<usize>,
    pub scalar_start: usize,
}

/// Every (possibly overlapping) exact occurrence of `needle` that starts and
/// ends on grapheme boundaries.
pub(crate) fn find_exact(live: &TextSnapshot, needle: &str) -> Vec<Candidate> {
    scan(live, needle, |hay, at| {
        hay[at..].starts_with(needle).then(|| at + needle.len())
    })
}

/// Occurrences equal to `needle` ignoring letter case, same scalar count.
pub(crate) fn find_case_insensitive(live: &TextSnapshot, needle: &str) -> Vec<Candidate> {
    let wanted: Vec<char> = needle.chars().collect();
    scan(live, needle, |hay, at| {
        let mut end = at;
        let mut chars = hay[at..].chars();
        for w in &wanted {
            let c = chars.next()?;
            if !c.to_lowercase().eq(w.to_lowercase()) {
                return None;
            }
            end += c.len_utf8();
        }
        Some(end)
    })
}

fn scan<F>(live: &TextSnapshot, needle: &str, matches_at: F) -> Vec<Candidate>
where
    F: Fn(&str, usize) -> Option<usize>,
{
    if needle.is_empty() {
        return Vec::new();
    }
    let hay = live.text();
    let index = live.index();
    let mut out = Vec::new();
    for (scalar_start, (at, _)) in hay.char_indices().enumerate() {
        let Some(end) = matches_at(hay, at) else {
            continue;
        };
        let scalar_end = scalar_start + hay[at..end].chars().count();
        if index.is_cluster_boundary(scalar_start) && index.is_cluster_boundary(scalar_end) {
            out.push(Candidate {
                bytes: at..end,
                scalar_start,
            });
        }
    }
    out
}

/// Word-bounded candidates first, then nearest to `origin`, then earliest.
pub(crate) fn best<'a>(candidates: &'a [Candidate], hay: &str, origin: usize) -> Option<&'a Candidate> {
    candidates.iter().min_by_key(|c| {
        (
            !grapheme::is_word_bounded(hay, &c.bytes),
            c.scalar_start.abs_diff(origin),
            c.scalar_start,
        )
    })
}
