//! Immutable text snapshots and encoding-aware offsets.
//!
//! A `TextSnapshot` is a capture of an externally owned buffer at one instant,
//! tagged with the host it was read from. Offsets are only meaningful against
//! the snapshot they were computed on; conversions between grapheme, UTF-16
//! and scalar counting live in [`offset`] and share one lazily built
//! [`segment::BoundaryIndex`] per snapshot content.

use ahash::AHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

pub mod offset;
pub mod segment;

pub use offset::{Encoding, Offset, OffsetError, OffsetRange, convert, convert_range};
pub use segment::BoundaryIndex;

/// Identity of the application / element a snapshot was read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostIdentity(Arc<str>);

impl HostIdentity {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash of raw text content. Fixed-key `AHasher`, so equal text always yields
/// equal hashes within a build; used for cache keys and snapshot identity.
pub fn content_hash(text: &str) -> u64 {
    let mut hasher = AHasher::default();
    text.hash(&mut hasher);
    hasher.finish()
}

/// Immutable capture of buffer content.
#[derive(Clone)]
pub struct TextSnapshot {
    text: Arc<str>,
    host: HostIdentity,
    captured_at: Instant,
    hash: u64,
    index: Arc<OnceLock<BoundaryIndex>>,
}

impl fmt::Debug for TextSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Content stays out of debug output; length and hash identify it.
        f.debug_struct("TextSnapshot")
            .field("host", &self.host)
            .field("bytes", &self.text.len())
            .field("hash", &self.hash)
            .finish()
    }
}

impl TextSnapshot {
    pub fn new(host: HostIdentity, text: impl Into<Arc<str>>) -> Self {
        Self::captured_at(host, text, Instant::now())
    }

    pub fn captured_at(host: HostIdentity, text: impl Into<Arc<str>>, at: Instant) -> Self {
        let text: Arc<str> = text.into();
        let hash = content_hash(&text);
        Self {
            text,
            host,
            captured_at: at,
            hash,
            index: Arc::new(OnceLock::new()),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
    pub fn host(&self) -> &HostIdentity {
        &self.host
    }
    pub fn capture_instant(&self) -> Instant {
        self.captured_at
    }
    pub fn content_hash(&self) -> u64 {
        self.hash
    }

    /// True when both snapshots hold identical text (host and time ignored).
    pub fn same_content(&self, other: &TextSnapshot) -> bool {
        self.hash == other.hash && self.text == other.text
    }

    pub fn index(&self) -> &BoundaryIndex {
        self.index.get_or_init(|| {
            tracing::trace!(target: "text.offset", bytes = self.text.len(), "boundary_index_built");
            BoundaryIndex::build(&self.text)
        })
    }

    /// Length of the text counted in `encoding`.
    pub fn len_in(&self, encoding: Encoding) -> usize {
        let index = self.index();
        match encoding {
            Encoding::GraphemeCluster => index.grapheme_len(),
            Encoding::Utf16Unit => index.utf16_len(),
            Encoding::UnicodeScalar => index.scalar_len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn convert(&self, offset: Offset, to: Encoding) -> Result<Offset, OffsetError> {
        convert(offset, to, self)
    }

    pub fn convert_range(&self, range: OffsetRange, to: Encoding) -> Result<OffsetRange, OffsetError> {
        convert_range(range, to, self)
    }

    /// UTF-8 byte range for an offset range in any encoding.
    pub fn byte_range(&self, range: OffsetRange) -> Result<Range<usize>, OffsetError> {
        let scalar = self.convert_range(range, Encoding::UnicodeScalar)?;
        let index = self.index();
        let out_of_range = |o: Offset| OffsetError::OutOfRange {
            value: o.value,
            encoding: o.encoding,
            len: index.scalar_len(),
        };
        let start = index
            .mark(scalar.start().value)
            .ok_or_else(|| out_of_range(scalar.start()))?
            .byte;
        let end = index
            .mark(scalar.end().value)
            .ok_or_else(|| out_of_range(scalar.end()))?
            .byte;
        Ok(start..end)
    }

    /// Text denoted by `range`.
    pub fn slice(&self, range: OffsetRange) -> Result<&str, OffsetError> {
        let bytes = self.byte_range(range)?;
        Ok(&self.text[bytes])
    }

    /// Offset (in `encoding`) of a UTF-8 byte position, when it lands on a boundary of that encoding.
    pub fn offset_of_byte(&self, byte: usize, encoding: Encoding) -> Result<Offset, OffsetError> {
        let index = self.index();
        let scalar = index
            .scalar_at_byte(byte)
            .ok_or(OffsetError::OutOfRange {
                value: byte,
                encoding: Encoding::UnicodeScalar,
                len: index.byte_len(),
            })?;
        self.convert(Offset::scalar(scalar), encoding)
    }

    /// Range (in `encoding`) covering a UTF-8 byte range.
    pub fn range_of_bytes(
        &self,
        bytes: Range<usize>,
        encoding: Encoding,
    ) -> Result<OffsetRange, OffsetError> {
        let start = self.offset_of_byte(bytes.start, encoding)?;
        let end = self.offset_of_byte(bytes.end, encoding)?;
        OffsetRange::new(start, end)
    }
}

/// Grapheme and word helpers operating on plain `&str`.
pub mod grapheme {
    use std::ops::Range;
    use unicode_segmentation::UnicodeSegmentation;

    /// Iterate grapheme clusters.
    pub fn iter(text: &str) -> impl Iterator<Item = &str> {
        text.graphemes(true)
    }

    /// Naive word classification: alphanumeric or underscore start.
    pub fn is_word(g: &str) -> bool {
        g.chars()
            .next()
            .map(|c| c == '_' || c.is_alphanumeric())
            .unwrap_or(false)
    }

    /// True when `text` is a single whitespace or punctuation grapheme.
    pub fn is_lone_separator(text: &str) -> bool {
        let mut clusters = text.graphemes(true);
        match (clusters.next(), clusters.next()) {
            (Some(g), None) => g
                .chars()
                .next()
                .map(|c| !c.is_alphanumeric() && c != '_')
                .unwrap_or(false),
            _ => false,
        }
    }

    /// True when `bytes` starts and ends on word boundaries of `text`.
    pub fn is_word_bounded(text: &str, bytes: &Range<usize>) -> bool {
        let before_ok = text[..bytes.start]
            .graphemes(true)
            .next_back()
            .map(|g| !is_word(g))
            .unwrap_or(true);
        let after_ok = text[bytes.end..]
            .graphemes(true)
            .next()
            .map(|g| !is_word(g))
            .unwrap_or(true);
        before_ok && after_ok
    }

    /// Expand `bytes` to the nearest whole word on each side (the word ending
    /// at or before the start, and the word starting at or after the end).
    /// Sides without a neighbouring word stay where they are.
    pub fn word_context(text: &str, bytes: Range<usize>) -> Range<usize> {
        let mut start = bytes.start;
        let mut end = bytes.end;
        for (idx, seg) in text.split_word_bound_indices() {
            let seg_end = idx + seg.len();
            if seg_end <= bytes.start && is_word(seg) {
                start = idx;
            }
            if idx >= bytes.end && is_word(seg) {
                end = seg_end;
                break;
            }
        }
        start..end
    }
}
