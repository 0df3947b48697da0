use crate::dedupe::collapse_identical_spans_by;
use crate::{Annotation, AnnotationId};
use core_text::{Encoding, OffsetRange};
use thiserror::Error;
use tracing::{trace, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store tracks {expected} offsets, got {actual}")]
    EncodingMismatch { expected: Encoding, actual: Encoding },
}

/// Non-fatal finding surfaced by an adjustment pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreDiagnostic {
    /// Position arithmetic produced an impossible range; the annotation was
    /// dropped. Indicates upstream drift between edit reports and the store.
    #[error("annotation {id} dropped: adjusted range {start}..{end} is invalid")]
    InconsistentAdjustment {
        id: AnnotationId,
        start: isize,
        end: isize,
    },
}

/// What part of the store a fresh analysis result replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestScope {
    /// Tracked annotations intersecting this range are replaced.
    Region(OffsetRange),
    /// Every tracked annotation is replaced (initial analysis, large edits).
    Everything,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AdjustReport {
    pub shifted: usize,
    pub resized: usize,
    pub diagnostics: Vec<StoreDiagnostic>,
}

impl AdjustReport {
    pub fn dropped(&self) -> usize {
        self.diagnostics.len()
    }
}

#[derive(Debug, Clone)]
struct Tracked {
    seq: u64,
    annotation: Annotation,
}

/// Current annotations for one buffer, ordered by range start.
///
/// Equal starts keep insertion order: a monotonically increasing sequence
/// number is stamped on first ingest and survives every later adjustment.
#[derive(Debug)]
pub struct AnnotationStore {
    encoding: Encoding,
    entries: Vec<Tracked>,
    next_seq: u64,
}

impl Default for AnnotationStore {
    fn default() -> Self {
        Self::new(Encoding::UnicodeScalar)
    }
}

impl AnnotationStore {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            entries: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.entries.iter().map(|t| &t.annotation)
    }

    /// Owned copy of the current annotations in store order.
    pub fn current(&self) -> Vec<Annotation> {
        self.iter().cloned().collect()
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.iter().find(|a| a.id == id)
    }

    fn check(&self, range: &OffsetRange) -> Result<(), StoreError> {
        if range.encoding() != self.encoding {
            return Err(StoreError::EncodingMismatch {
                expected: self.encoding,
                actual: range.encoding(),
            });
        }
        Ok(())
    }

    /// Merge a fresh analysis result.
    ///
    /// Tracked annotations inside `scope` are dropped; a fresh annotation that
    /// repeats a surviving finding exactly is discarded so the survivor keeps
    /// its id. Identical spans then collapse by category priority. Returns
    /// the resulting set in store order.
    pub fn ingest(
        &mut self,
        fresh: Vec<Annotation>,
        scope: IngestScope,
    ) -> Result<Vec<Annotation>, StoreError> {
        if let IngestScope::Region(region) = &scope {
            self.check(region)?;
        }
        for a in &fresh {
            self.check(&a.range)?;
        }

        let before = self.entries.len();
        match scope {
            IngestScope::Everything => self.entries.clear(),
            IngestScope::Region(region) => self
                .entries
                .retain(|t| !t.annotation.range.intersects(&region)),
        }
        let survivors = self.entries.len();

        let mut added = 0usize;
        for annotation in fresh {
            if self
                .entries
                .iter()
                .any(|t| t.annotation.same_finding(&annotation))
            {
                continue;
            }
            let seq = self.next_seq;
            self.next_seq += 1;
            self.entries.push(Tracked { seq, annotation });
            added += 1;
        }

        // Survivors are older (lower seq) so they win full ties.
        self.entries.sort_by_key(|t| t.seq);
        let entries = std::mem::take(&mut self.entries);
        self.entries = collapse_identical_spans_by(entries, |t| &t.annotation);
        self.sort();

        trace!(
            target: "annotations.store",
            before,
            survivors,
            added,
            after = self.entries.len(),
            "ingest"
        );
        Ok(self.current())
    }

    /// Shift tracked ranges after an edit replaced `edit` with text of
    /// `edit.len() + delta` units.
    ///
    /// * starts at or after `edit.end`: both ends shift by `delta`
    /// * ends at or before `edit.start`: untouched
    /// * overlapping: the range becomes its union with the edit, mapped
    ///   through it (for an edit inside the annotation only the end moves)
    ///
    /// Any result with a negative end point or `start > end` drops the
    /// annotation and is reported as [`StoreDiagnostic::InconsistentAdjustment`].
    pub fn adjust_after_edit(
        &mut self,
        edit: OffsetRange,
        delta: isize,
    ) -> Result<AdjustReport, StoreError> {
        self.check(&edit)?;
        let (e0, e1) = (edit.start().value as isize, edit.end().value as isize);
        let mut report = AdjustReport::default();
        let encoding = self.encoding;

        self.entries.retain_mut(|t| {
            let a = &mut t.annotation;
            let (a0, a1) = (a.range.start().value as isize, a.range.end().value as isize);
            let (n0, n1) = if a0 >= e1 {
                report.shifted += 1;
                (a0 + delta, a1 + delta)
            } else if a1 <= e0 {
                return true;
            } else {
                report.resized += 1;
                (a0.min(e0), a1.max(e1) + delta)
            };
            match valid_range(n0, n1, encoding) {
                Some(range) => {
                    a.range = range;
                    true
                }
                None => {
                    warn!(
                        target: "annotations.store",
                        id = a.id.0,
                        start = n0,
                        end = n1,
                        "annotation_dropped_inconsistent"
                    );
                    report.diagnostics.push(StoreDiagnostic::InconsistentAdjustment {
                        id: a.id,
                        start: n0,
                        end: n1,
                    });
                    false
                }
            }
        });
        self.sort();
        trace!(
            target: "annotations.store",
            shifted = report.shifted,
            resized = report.resized,
            dropped = report.dropped(),
            delta,
            "adjust_after_edit"
        );
        Ok(report)
    }

    /// Remove every annotation matching `pred`; returns the removed ones.
    pub fn remove<F>(&mut self, mut pred: F) -> Vec<Annotation>
    where
        F: FnMut(&Annotation) -> bool,
    {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.entries.len());
        for t in self.entries.drain(..) {
            if pred(&t.annotation) {
                removed.push(t.annotation);
            } else {
                kept.push(t);
            }
        }
        self.entries = kept;
        if !removed.is_empty() {
            trace!(target: "annotations.store", removed = removed.len(), "remove");
        }
        removed
    }

    pub fn remove_id(&mut self, id: AnnotationId) -> Option<Annotation> {
        self.remove(|a| a.id == id).into_iter().next()
    }

    /// Drop everything (large edits, profile switches). Returns the count.
    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    fn sort(&mut self) {
        self.entries
            .sort_by_key(|t| (t.annotation.range.start().value, t.seq));
    }
}

fn valid_range(start: isize, end: isize, encoding: Encoding) -> Option<OffsetRange> {
    if start < 0 || end < 0 {
        return None;
    }
    OffsetRange::from_values(start as usize, end as usize, encoding).ok()
}
