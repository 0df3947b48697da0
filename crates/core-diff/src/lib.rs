//! Changed-region detection between two snapshots of the same buffer.
//!
//! Algorithm: longest common prefix, then longest common suffix bounded by
//! the prefix, both counted in Unicode scalars and then pulled back to
//! grapheme boundaries shared by both snapshots. The complement is the changed
//! region, reported in the *new* snapshot's offsets together with the old end
//! so callers can derive the length delta.
//!
//! Classification policy:
//! * `Small`: removed + inserted scalars is at or below the configured
//!   threshold; callers adjust annotations incrementally.
//! * `Large`: anything above it (bulk paste, select-all replace). Callers drop
//!   every annotation and re-ingest from scratch.

use core_text::{Encoding, Offset, OffsetRange, TextSnapshot};
use tracing::trace;

pub mod words;

/// Default bulk-edit threshold in scalars.
pub const DEFAULT_LARGE_EDIT_THRESHOLD: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditClass {
    Small,
    Large,
}

/// Minimal differing region between two snapshots (Unicode scalar offsets).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangedRegion {
    start: usize,
    old_end: usize,
    new_end: usize,
    class: EditClass,
}

impl ChangedRegion {
    /// Region start; identical in both snapshots.
    pub fn start(&self) -> Offset {
        Offset::scalar(self.start)
    }

    /// Replaced span in the old snapshot.
    pub fn old_range(&self) -> OffsetRange {
        range(self.start, self.old_end)
    }

    /// Inserted span in the new snapshot.
    pub fn new_range(&self) -> OffsetRange {
        range(self.start, self.new_end)
    }

    pub fn removed_len(&self) -> usize {
        self.old_end - self.start
    }

    pub fn inserted_len(&self) -> usize {
        self.new_end - self.start
    }

    /// Scalars removed plus scalars inserted.
    pub fn changed_units(&self) -> usize {
        self.removed_len() + self.inserted_len()
    }

    pub fn length_delta(&self) -> isize {
        self.inserted_len() as isize - self.removed_len() as isize
    }

    pub fn class(&self) -> EditClass {
        self.class
    }

    pub fn is_large(&self) -> bool {
        self.class == EditClass::Large
    }
}

fn range(start: usize, end: usize) -> OffsetRange {
    OffsetRange::ordered(start, end, Encoding::UnicodeScalar)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOutcome {
    NoChange,
    Changed(ChangedRegion),
}

impl DiffOutcome {
    pub fn region(&self) -> Option<&ChangedRegion> {
        match self {
            DiffOutcome::NoChange => None,
            DiffOutcome::Changed(r) => Some(r),
        }
    }
}

/// Stateless diff engine carrying only the bulk-edit threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffEngine {
    large_edit_threshold: usize,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new(DEFAULT_LARGE_EDIT_THRESHOLD)
    }
}

impl DiffEngine {
    pub fn new(large_edit_threshold: usize) -> Self {
        Self {
            large_edit_threshold,
        }
    }

    pub fn threshold(&self) -> usize {
        self.large_edit_threshold
    }

    pub fn diff(&self, old: &TextSnapshot, new: &TextSnapshot) -> DiffOutcome {
        if old.same_content(new) {
            return DiffOutcome::NoChange;
        }
        let old_len = old.len_in(Encoding::UnicodeScalar);
        let new_len = new.len_in(Encoding::UnicodeScalar);

        let mut prefix = old
            .text()
            .chars()
            .zip(new.text().chars())
            .take_while(|(a, b)| a == b)
            .count();
        let max_suffix = old_len.min(new_len) - prefix;
        let mut suffix = old
            .text()
            .chars()
            .rev()
            .zip(new.text().chars().rev())
            .take(max_suffix)
            .take_while(|(a, b)| a == b)
            .count();

        // Never split a grapheme cluster in either snapshot.
        let (oi, ni) = (old.index(), new.index());
        while prefix > 0 && !(oi.is_cluster_boundary(prefix) && ni.is_cluster_boundary(prefix)) {
            prefix -= 1;
        }
        while suffix > 0
            && !(oi.is_cluster_boundary(old_len - suffix) && ni.is_cluster_boundary(new_len - suffix))
        {
            suffix -= 1;
        }

        let old_end = old_len - suffix;
        let new_end = new_len - suffix;
        let changed = (old_end - prefix) + (new_end - prefix);
        let class = if changed > self.large_edit_threshold {
            EditClass::Large
        } else {
            EditClass::Small
        };
        trace!(
            target: "diff",
            start = prefix,
            old_end,
            new_end,
            changed,
            large = class == EditClass::Large,
            "changed_region"
        );
        DiffOutcome::Changed(ChangedRegion {
            start: prefix,
            old_end,
            new_end,
            class,
        })
    }
}

/// Splice `old` outside the region with `new` inside it. Equals `new` for any
/// region produced by [`DiffEngine::diff`].
pub fn reconstruct(old: &TextSnapshot, new: &TextSnapshot, region: &ChangedRegion) -> Option<String> {
    let head = old.slice(OffsetRange::scalar(0, region.start).ok()?).ok()?;
    let middle = new.slice(region.new_range()).ok()?;
    let old_len = old.len_in(Encoding::UnicodeScalar);
    let tail = old.slice(OffsetRange::scalar(region.old_end, old_len).ok()?).ok()?;
    Some(format!("{head}{middle}{tail}"))
}
