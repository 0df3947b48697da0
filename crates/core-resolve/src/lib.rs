//! Selection resolver (annotation range → live range to mutate).
//!
//! The range an annotation carries was computed against the snapshot that was
//! analyzed. By the time the user accepts a suggestion the live buffer may
//! have drifted (typing, autocorrect, host-side reformatting), so the literal
//! text is located again before anything is selected.
//!
//! Resolution order:
//! 1. Stable offsets: when the host profile guarantees no drift, the range is
//!    converted directly into the host encoding.
//! 2. Literal search for the analyzed text. An exact match at the original
//!    position wins; otherwise a single match differing only in letter case
//!    (autocorrect capitalisation) is preferred; otherwise exact matches rank
//!    word-bounded first, then nearest to the original position.
//! 3. Lone separators and empty ranges (a space, a comma, an insertion point)
//!    match everywhere, so the surrounding word context is located instead
//!    and the range is narrowed back down inside it.
//! 4. Nothing found: `Unresolvable`. No fallback range is ever guessed.
//!
//! Every resolved range is checked to fall on grapheme boundaries of the live
//! snapshot and to convert cleanly into the host encoding.

use core_host::{Capabilities, StrategyProfile};
use core_text::{Encoding, OffsetRange, TextSnapshot, grapheme};
use std::ops::Range;
use thiserror::Error;
use tracing::{debug, trace};

mod search;

use search::{Candidate, find_case_insensitive, find_exact};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("annotated text not found in live buffer ({reason})")]
    Unresolvable { reason: &'static str },
}

impl ResolveError {
    fn because(reason: &'static str) -> Self {
        ResolveError::Unresolvable { reason }
    }
}

/// Which heuristic produced the live range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMethod {
    StableOffsets,
    ExactMatch,
    CaseInsensitiveMatch,
    ContextMatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Live range in Unicode scalars.
    pub live: OffsetRange,
    /// Same range in the host's offset encoding.
    pub host: OffsetRange,
    /// Text the live range currently denotes.
    pub current_text: String,
    pub method: ResolveMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionResolver {
    host_encoding: Encoding,
    stable_offsets: bool,
}

impl SelectionResolver {
    pub fn new(host_encoding: Encoding, stable_offsets: bool) -> Self {
        Self {
            host_encoding,
            stable_offsets,
        }
    }

    pub fn for_profile(profile: &StrategyProfile) -> Self {
        Self::new(
            profile.offset_encoding(),
            profile.has(Capabilities::STABLE_OFFSETS),
        )
    }

    /// Locate `range` (computed against `analyzed`) inside `live`.
    pub fn resolve(
        &self,
        range: OffsetRange,
        analyzed: &TextSnapshot,
        live: &TextSnapshot,
    ) -> Result<ResolvedTarget, ResolveError> {
        if self.stable_offsets {
            match self.finish(live, range, ResolveMethod::StableOffsets) {
                Ok(t) => return Ok(t),
                Err(e) => debug!(target: "resolve", error = %e, "stable_offsets_rejected"),
            }
        }

        let bytes = analyzed
            .byte_range(range)
            .map_err(|_| ResolveError::because("range outside analyzed snapshot"))?;
        let origin = analyzed
            .convert_range(range, Encoding::UnicodeScalar)
            .map_err(|_| ResolveError::because("range misaligned in analyzed snapshot"))?
            .start()
            .value;
        let literal = &analyzed.text()[bytes.clone()];

        let target = if literal.is_empty() || grapheme::is_lone_separator(literal) {
            self.resolve_in_context(analyzed.text(), bytes, live)?
        } else {
            self.resolve_literal(literal, origin, live)?
        };
        trace!(
            target: "resolve",
            method = ?target.method,
            origin,
            start = target.live.start().value,
            len = target.live.len(),
            "resolved"
        );
        Ok(target)
    }

    fn resolve_literal(
        &self,
        literal: &str,
        origin: usize,
        live: &TextSnapshot,
    ) -> Result<ResolvedTarget, ResolveError> {
        let exact = find_exact(live, literal);
        if let Some(c) = exact.iter().find(|c| c.scalar_start == origin) {
            return self.finish_bytes(live, c.bytes.clone(), ResolveMethod::ExactMatch);
        }
        let recased: Vec<Candidate> = find_case_insensitive(live, literal)
            .into_iter()
            .filter(|c| &live.text()[c.bytes.clone()] != literal)
            .collect();
        if let [only] = recased.as_slice() {
            return self.finish_bytes(live, only.bytes.clone(), ResolveMethod::CaseInsensitiveMatch);
        }
        if let Some(best) = search::best(&exact, live.text(), origin) {
            return self.finish_bytes(live, best.bytes.clone(), ResolveMethod::ExactMatch);
        }
        if let Some(best) = search::best(&recased, live.text(), origin) {
            return self.finish_bytes(live, best.bytes.clone(), ResolveMethod::CaseInsensitiveMatch);
        }
        Err(ResolveError::because("no occurrence"))
    }

    fn resolve_in_context(
        &self,
        analyzed_text: &str,
        bytes: Range<usize>,
        live: &TextSnapshot,
    ) -> Result<ResolvedTarget, ResolveError> {
        let context = grapheme::word_context(analyzed_text, bytes.clone());
        let needle = &analyzed_text[context.clone()];
        if needle.is_empty() {
            return Err(ResolveError::because("empty context"));
        }
        let origin = analyzed_text[..context.start].chars().count();
        let matches = find_exact(live, needle);
        let best = search::best(&matches, live.text(), origin)
            .ok_or_else(|| ResolveError::because("context not found"))?;
        let inner_start = best.bytes.start + (bytes.start - context.start);
        let inner_end = inner_start + bytes.len();
        self.finish_bytes(live, inner_start..inner_end, ResolveMethod::ContextMatch)
    }

    fn finish_bytes(
        &self,
        live: &TextSnapshot,
        bytes: Range<usize>,
        method: ResolveMethod,
    ) -> Result<ResolvedTarget, ResolveError> {
        let range = live
            .range_of_bytes(bytes, Encoding::UnicodeScalar)
            .map_err(|_| ResolveError::because("match off scalar boundary"))?;
        self.finish(live, range, method)
    }

    fn finish(
        &self,
        live: &TextSnapshot,
        range: OffsetRange,
        method: ResolveMethod,
    ) -> Result<ResolvedTarget, ResolveError> {
        let scalar = live
            .convert_range(range, Encoding::UnicodeScalar)
            .map_err(|_| ResolveError::because("range outside live snapshot"))?;
        let index = live.index();
        if !index.is_cluster_boundary(scalar.start().value)
            || !index.is_cluster_boundary(scalar.end().value)
        {
            return Err(ResolveError::because("match splits a grapheme cluster"));
        }
        let host = live
            .convert_range(scalar, self.host_encoding)
            .map_err(|_| ResolveError::because("no exact host offset"))?;
        let current_text = live
            .slice(scalar)
            .map_err(|_| ResolveError::because("range outside live snapshot"))?
            .to_string();
        Ok(ResolvedTarget {
            live: scalar,
            host,
            current_text,
            method,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_text::HostIdentity;
    use pretty_assertions::assert_eq;

    fn snap(text: &str) -> TextSnapshot {
        TextSnapshot::new(HostIdentity::new("test"), text)
    }

    fn scalar(s: usize, e: usize) -> OffsetRange {
        OffsetRange::scalar(s, e).unwrap()
    }

    #[test]
    fn stable_offsets_convert_into_host_encoding() {
        let r = SelectionResolver::new(Encoding::Utf16Unit, true);
        let live = snap("😀 qick");
        let t = r.resolve(scalar(2, 6), &live, &live).unwrap();
        assert_eq!(t.method, ResolveMethod::StableOffsets);
        assert_eq!(t.host, OffsetRange::from_values(3, 7, Encoding::Utf16Unit).unwrap());
        assert_eq!(t.current_text, "qick");
    }

    #[test]
    fn drifted_literal_is_found_by_search() {
        let r = SelectionResolver::new(Encoding::UnicodeScalar, false);
        let analyzed = snap("The qick fox");
        let live = snap("Oh! The qick fox");
        let t = r.resolve(scalar(4, 8), &analyzed, &live).unwrap();
        assert_eq!(t.live, scalar(8, 12));
        assert_eq!(t.method, ResolveMethod::ExactMatch);
    }

    #[test]
    fn nearest_word_bounded_occurrence_wins() {
        let r = SelectionResolver::new(Encoding::UnicodeScalar, false);
        let analyzed = snap("teh cat and teh dog");
        let live = snap("X teh cat and teh dog, tehran");
        // Second "teh" drifted by two; nearest exact match is at 14.
        let t = r.resolve(scalar(12, 15), &analyzed, &live).unwrap();
        assert_eq!(t.live, scalar(14, 17));
    }

    #[test]
    fn single_recased_match_preferred() {
        let r = SelectionResolver::new(Encoding::UnicodeScalar, false);
        let analyzed = snap("teh end. teh start");
        let live = snap("teh end. Teh start");
        let t = r.resolve(scalar(9, 12), &analyzed, &live).unwrap();
        assert_eq!(t.live, scalar(9, 12));
        assert_eq!(t.current_text, "Teh");
        assert_eq!(t.method, ResolveMethod::CaseInsensitiveMatch);
    }

    #[test]
    fn lone_comma_resolved_through_word_context() {
        let r = SelectionResolver::new(Encoding::UnicodeScalar, false);
        let analyzed = snap("a, b, however, c");
        let live = snap("zz a, b, however, c");
        // The comma after "however".
        let t = r.resolve(scalar(13, 14), &analyzed, &live).unwrap();
        assert_eq!(t.method, ResolveMethod::ContextMatch);
        assert_eq!(t.live, scalar(16, 17));
        assert_eq!(t.current_text, ",");
    }

    #[test]
    fn missing_text_is_unresolvable() {
        let r = SelectionResolver::new(Encoding::UnicodeScalar, false);
        let err = r
            .resolve(scalar(4, 8), &snap("The qick fox"), &snap("The quick fox"))
            .unwrap_err();
        assert!(matches!(err, ResolveError::Unresolvable { .. }));
    }

    #[test]
    fn match_inside_cluster_is_rejected_for_grapheme_hosts() {
        let r = SelectionResolver::new(Encoding::GraphemeCluster, false);
        let analyzed = snap("e only");
        let live = snap("e\u{0301} only");
        let err = r.resolve(scalar(0, 1), &analyzed, &live).unwrap_err();
        assert!(matches!(err, ResolveError::Unresolvable { .. }));
    }
}
