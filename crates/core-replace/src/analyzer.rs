//! Seams to the external analysis and suggestion engines.

use core_annotations::Annotation;
use core_cache::StyleTemplate;
use core_diff::words::{WordSegment, word_diff};
use core_text::{Encoding, OffsetRange, TextSnapshot};

/// Produces raw annotations for a snapshot. Ranges are Unicode-scalar
/// offsets into `snapshot`; ids are reassigned by the session on ingest.
pub trait Analyzer: Send + Sync {
    fn analyze(&self, snapshot: &TextSnapshot, profile: &str) -> Vec<Annotation>;
}

impl<F> Analyzer for F
where
    F: Fn(&TextSnapshot, &str) -> Vec<Annotation> + Send + Sync,
{
    fn analyze(&self, snapshot: &TextSnapshot, profile: &str) -> Vec<Annotation> {
        self(snapshot, profile)
    }
}

/// One rewrite proposed by a suggestion engine, identified by the literal
/// text it replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSuggestion {
    pub original: String,
    pub suggested: String,
    pub reason: String,
}

/// Style rewrites for a whole buffer under one template and model.
pub trait SuggestionProvider: Send + Sync {
    fn suggest(&self, text: &str, style: StyleTemplate, model: &str) -> Vec<RawSuggestion>;
}

/// A [`RawSuggestion`] located in the buffer it was produced for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleSuggestion {
    /// Unicode-scalar range of `original` in the analyzed snapshot.
    pub range: OffsetRange,
    pub original: String,
    pub suggested: String,
    pub reason: String,
    /// Word-level preview of the rewrite.
    pub preview: Vec<WordSegment>,
}

/// Locate each suggestion's original text, scanning forward so repeated
/// phrases map to successive occurrences. Unlocatable suggestions are dropped.
pub(crate) fn locate(snapshot: &TextSnapshot, raw: Vec<RawSuggestion>) -> Vec<StyleSuggestion> {
    let text = snapshot.text();
    let mut cursor = 0usize;
    let mut out = Vec::with_capacity(raw.len());
    for s in raw {
        if s.original.is_empty() {
            continue;
        }
        let found = text[cursor..]
            .find(&s.original)
            .map(|at| cursor + at)
            .or_else(|| text.find(&s.original));
        let Some(at) = found else {
            continue;
        };
        let bytes = at..at + s.original.len();
        let Ok(range) = snapshot.range_of_bytes(bytes.clone(), Encoding::UnicodeScalar) else {
            continue;
        };
        cursor = bytes.end;
        out.push(StyleSuggestion {
            range,
            preview: word_diff(&s.original, &s.suggested),
            original: s.original,
            suggested: s.suggested,
            reason: s.reason,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_diff::words::SegmentKind;
    use core_text::HostIdentity;
    use pretty_assertions::assert_eq;

    fn raw(original: &str, suggested: &str) -> RawSuggestion {
        RawSuggestion {
            original: original.into(),
            suggested: suggested.into(),
            reason: "tone".into(),
        }
    }

    #[test]
    fn located_ranges_are_scalar_indices() {
        let snap = TextSnapshot::new(HostIdentity::new("s"), "😀 gonna go. gonna stay.");
        let out = locate(
            &snap,
            vec![raw("gonna go", "going to go"), raw("gonna", "going to"), raw("missing", "x")],
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].range, OffsetRange::scalar(2, 10).unwrap());
        // Second "gonna" is found after the first match.
        assert_eq!(out[1].range, OffsetRange::scalar(12, 17).unwrap());
        assert!(out[0].preview.iter().any(|s| s.kind == SegmentKind::Added));
    }
}
