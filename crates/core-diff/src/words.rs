//! Word-level diff between an original span and a suggested replacement,
//! used to render suggestion previews (struck-through removals, highlighted
//! additions). Consecutive changes of the same kind are merged into one segment.

use similar::{ChangeTag, TextDiff};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Unchanged,
    Added,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordSegment {
    pub text: String,
    pub kind: SegmentKind,
}

pub fn word_diff(original: &str, suggested: &str) -> Vec<WordSegment> {
    let diff = TextDiff::from_words(original, suggested);
    let mut segments: Vec<WordSegment> = Vec::new();
    for change in diff.iter_all_changes() {
        let kind = match change.tag() {
            ChangeTag::Equal => SegmentKind::Unchanged,
            ChangeTag::Insert => SegmentKind::Added,
            ChangeTag::Delete => SegmentKind::Removed,
        };
        if let Some(last) = segments.last_mut()
            && last.kind == kind
        {
            last.text.push_str(change.value());
            continue;
        }
        segments.push(WordSegment {
            text: change.value().to_string(),
            kind,
        });
    }
    segments
}
