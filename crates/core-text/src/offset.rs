//! Encoding-tagged offsets and the offset translator.
//!
//! An `Offset` never travels as a bare integer: the encoding tag is part of
//! the value and every change of encoding goes through [`convert`] against
//! the snapshot the offset was computed for. Conversions never clamp; an
//! offset past the end of its own encoding is `OutOfRange`, and an offset that
//! has no exact counterpart in the target encoding (inside a grapheme cluster,
//! inside a surrogate pair) is `Misaligned`.

use crate::TextSnapshot;
use std::fmt;
use thiserror::Error;

/// Counting scheme an offset is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Encoding {
    GraphemeCluster,
    Utf16Unit,
    UnicodeScalar,
}

impl Encoding {
    pub const ALL: [Encoding; 3] = [
        Encoding::GraphemeCluster,
        Encoding::Utf16Unit,
        Encoding::UnicodeScalar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::GraphemeCluster => "grapheme",
            Encoding::Utf16Unit => "utf16",
            Encoding::UnicodeScalar => "scalar",
        }
    }

    /// Parse the config spelling (`grapheme`, `utf16`, `scalar`), case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "grapheme" | "grapheme_cluster" | "cluster" => Some(Encoding::GraphemeCluster),
            "utf16" | "utf-16" | "utf16_unit" => Some(Encoding::Utf16Unit),
            "scalar" | "unicode_scalar" | "char" => Some(Encoding::UnicodeScalar),
            _ => None,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OffsetError {
    #[error("offset {value} ({encoding}) exceeds snapshot length {len}")]
    OutOfRange {
        value: usize,
        encoding: Encoding,
        len: usize,
    },
    #[error("offset {value} ({from}) has no exact {to} position")]
    Misaligned {
        value: usize,
        from: Encoding,
        to: Encoding,
    },
    #[error("expected {expected} offsets, got {actual}")]
    EncodingMismatch { expected: Encoding, actual: Encoding },
    #[error("inverted range {start}..{end}")]
    Inverted { start: usize, end: usize },
}

/// Integer position paired with its encoding tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Offset {
    pub value: usize,
    pub encoding: Encoding,
}

impl Offset {
    pub const fn new(value: usize, encoding: Encoding) -> Self {
        Self { value, encoding }
    }
    pub const fn scalar(value: usize) -> Self {
        Self::new(value, Encoding::UnicodeScalar)
    }
    pub const fn utf16(value: usize) -> Self {
        Self::new(value, Encoding::Utf16Unit)
    }
    pub const fn grapheme(value: usize) -> Self {
        Self::new(value, Encoding::GraphemeCluster)
    }

    /// Apply a signed delta within the same encoding. Returns None on underflow.
    pub fn shifted(self, delta: isize) -> Option<Self> {
        self.value
            .checked_add_signed(delta)
            .map(|value| Self { value, ..self })
    }
}

/// Half-open `[start, end)` range; both ends share one encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OffsetRange {
    start: Offset,
    end: Offset,
}

impl OffsetRange {
    pub fn new(start: Offset, end: Offset) -> Result<Self, OffsetError> {
        if start.encoding != end.encoding {
            return Err(OffsetError::EncodingMismatch {
                expected: start.encoding,
                actual: end.encoding,
            });
        }
        if start.value > end.value {
            return Err(OffsetError::Inverted {
                start: start.value,
                end: end.value,
            });
        }
        Ok(Self { start, end })
    }

    /// Build from raw values in one encoding. Errors only when inverted.
    pub fn from_values(start: usize, end: usize, encoding: Encoding) -> Result<Self, OffsetError> {
        Self::new(Offset::new(start, encoding), Offset::new(end, encoding))
    }

    /// Build from two values in one encoding, swapping them when inverted.
    pub fn ordered(a: usize, b: usize, encoding: Encoding) -> Self {
        Self {
            start: Offset::new(a.min(b), encoding),
            end: Offset::new(a.max(b), encoding),
        }
    }

    /// Empty range at `at`.
    pub fn empty(at: Offset) -> Self {
        Self { start: at, end: at }
    }

    pub fn scalar(start: usize, end: usize) -> Result<Self, OffsetError> {
        Self::from_values(start, end, Encoding::UnicodeScalar)
    }

    pub fn start(&self) -> Offset {
        self.start
    }
    pub fn end(&self) -> Offset {
        self.end
    }
    pub fn encoding(&self) -> Encoding {
        self.start.encoding
    }
    pub fn len(&self) -> usize {
        self.end.value - self.start.value
    }
    pub fn is_empty(&self) -> bool {
        self.start.value == self.end.value
    }

    /// True when both ranges share at least one unit. An empty range
    /// intersects another range only when strictly inside it.
    pub fn intersects(&self, other: &OffsetRange) -> bool {
        let (a0, a1) = (self.start.value, self.end.value);
        let (b0, b1) = (other.start.value, other.end.value);
        if a0 == a1 {
            return b0 < a0 && a0 < b1;
        }
        if b0 == b1 {
            return a0 < b0 && b0 < a1;
        }
        a0 < b1 && b0 < a1
    }

    pub fn contains_range(&self, other: &OffsetRange) -> bool {
        self.start.value <= other.start.value && other.end.value <= self.end.value
    }
}

impl fmt::Display for OffsetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}) {}",
            self.start.value, self.end.value, self.start.encoding
        )
    }
}

/// Convert `offset` into `to` against `against`.
///
/// Conversions route through the scalar boundary table, so A→B→A is the
/// identity for every offset that converts successfully.
pub fn convert(offset: Offset, to: Encoding, against: &TextSnapshot) -> Result<Offset, OffsetError> {
    let scalar = to_scalar(offset, against)?;
    from_scalar(scalar, offset, to, against)
}

/// Convert both ends of a range.
pub fn convert_range(
    range: OffsetRange,
    to: Encoding,
    against: &TextSnapshot,
) -> Result<OffsetRange, OffsetError> {
    if range.encoding() == to {
        check_in_range(range.end(), against)?;
        return Ok(range);
    }
    let start = convert(range.start(), to, against)?;
    let end = convert(range.end(), to, against)?;
    OffsetRange::new(start, end)
}

fn check_in_range(offset: Offset, snapshot: &TextSnapshot) -> Result<(), OffsetError> {
    let len = snapshot.len_in(offset.encoding);
    if offset.value > len {
        return Err(OffsetError::OutOfRange {
            value: offset.value,
            encoding: offset.encoding,
            len,
        });
    }
    Ok(())
}

fn to_scalar(offset: Offset, snapshot: &TextSnapshot) -> Result<usize, OffsetError> {
    check_in_range(offset, snapshot)?;
    let index = snapshot.index();
    let misaligned = || OffsetError::Misaligned {
        value: offset.value,
        from: offset.encoding,
        to: Encoding::UnicodeScalar,
    };
    match offset.encoding {
        Encoding::UnicodeScalar => Ok(offset.value),
        Encoding::Utf16Unit => index.scalar_at_utf16(offset.value).ok_or_else(misaligned),
        Encoding::GraphemeCluster => index.scalar_at_cluster(offset.value).ok_or_else(misaligned),
    }
}

fn from_scalar(
    scalar: usize,
    source: Offset,
    to: Encoding,
    snapshot: &TextSnapshot,
) -> Result<Offset, OffsetError> {
    let index = snapshot.index();
    let misaligned = || OffsetError::Misaligned {
        value: source.value,
        from: source.encoding,
        to,
    };
    let value = match to {
        Encoding::UnicodeScalar => scalar,
        Encoding::Utf16Unit => index.mark(scalar).map(|m| m.utf16).ok_or_else(misaligned)?,
        Encoding::GraphemeCluster => index.cluster_at_scalar(scalar).ok_or_else(misaligned)?,
    };
    Ok(Offset::new(value, to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HostIdentity;
    use pretty_assertions::assert_eq;

    fn snap(text: &str) -> TextSnapshot {
        TextSnapshot::new(HostIdentity::new("test"), text)
    }

    #[test]
    fn flag_emoji_converts_in_every_direction() {
        // "a🇯🇵b": 4 scalars, 6 utf16 units, 3 clusters
        let s = snap("a🇯🇵b");
        let g = Offset::grapheme(2);
        let u = convert(g, Encoding::Utf16Unit, &s).unwrap();
        assert_eq!(u, Offset::utf16(5));
        let c = convert(u, Encoding::UnicodeScalar, &s).unwrap();
        assert_eq!(c, Offset::scalar(3));
        assert_eq!(convert(c, Encoding::GraphemeCluster, &s).unwrap(), g);
    }

    #[test]
    fn out_of_range_is_reported_not_clamped() {
        let s = snap("abc");
        let err = convert(Offset::scalar(4), Encoding::Utf16Unit, &s).unwrap_err();
        assert_eq!(
            err,
            OffsetError::OutOfRange {
                value: 4,
                encoding: Encoding::UnicodeScalar,
                len: 3
            }
        );
    }

    #[test]
    fn end_of_text_is_valid() {
        let s = snap("é!");
        assert_eq!(
            convert(Offset::scalar(2), Encoding::GraphemeCluster, &s).unwrap(),
            Offset::grapheme(2)
        );
    }

    #[test]
    fn mid_cluster_scalar_is_misaligned_for_graphemes() {
        let s = snap("e\u{0301}x");
        let err = convert(Offset::scalar(1), Encoding::GraphemeCluster, &s).unwrap_err();
        assert!(matches!(err, OffsetError::Misaligned { .. }));
        // Same scalar is fine in UTF-16.
        assert_eq!(
            convert(Offset::scalar(1), Encoding::Utf16Unit, &s).unwrap(),
            Offset::utf16(1)
        );
    }

    #[test]
    fn mid_surrogate_utf16_is_misaligned() {
        let s = snap("😀");
        let err = convert(Offset::utf16(1), Encoding::UnicodeScalar, &s).unwrap_err();
        assert!(matches!(err, OffsetError::Misaligned { .. }));
    }

    #[test]
    fn range_rejects_mixed_encodings_and_inversion() {
        assert!(OffsetRange::new(Offset::scalar(0), Offset::utf16(1)).is_err());
        assert!(OffsetRange::scalar(3, 1).is_err());
    }

    #[test]
    fn empty_range_intersection_requires_strict_interior() {
        let a = OffsetRange::scalar(4, 8).unwrap();
        assert!(OffsetRange::scalar(5, 5).unwrap().intersects(&a));
        assert!(!OffsetRange::scalar(4, 4).unwrap().intersects(&a));
        assert!(!OffsetRange::scalar(8, 8).unwrap().intersects(&a));
        assert!(OffsetRange::scalar(7, 9).unwrap().intersects(&a));
        assert!(!OffsetRange::scalar(8, 9).unwrap().intersects(&a));
    }

    #[test]
    fn encoding_parse_accepts_config_spellings() {
        assert_eq!(Encoding::parse("UTF16"), Some(Encoding::Utf16Unit));
        assert_eq!(Encoding::parse("grapheme"), Some(Encoding::GraphemeCluster));
        assert_eq!(Encoding::parse("bytes"), None);
    }
}
