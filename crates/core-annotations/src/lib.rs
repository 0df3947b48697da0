//! Positioned diagnostics ("annotations") and the per-buffer store that keeps
//! them pointing at the right text while the host buffer changes.
//!
//! Ownership:
//! - Annotations are created by the analysis collaborator; the `id` stays
//!   stable for the annotation's lifetime.
//! - Only [`store::AnnotationStore`] mutates a tracked annotation, and only its
//!   range (position adjustment) or its membership (removal).
//! - Every range in a store shares the store's encoding; mixing encodings is a
//!   hard error rather than a silent reinterpretation of raw integers.

use core_text::OffsetRange;
use std::fmt;

pub mod dedupe;
pub mod store;

pub use store::{AdjustReport, AnnotationStore, IngestScope, StoreDiagnostic, StoreError};

/// Stable identifier assigned by the analysis collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnnotationId(pub u64);

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    /// Higher is more severe.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Error => 3,
            Severity::Warning => 2,
            Severity::Info => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub id: AnnotationId,
    pub range: OffsetRange,
    /// Coarse grouping (`GRAMMAR`, `SPELLING`, `STYLE`, ...).
    pub category: String,
    /// Identifier of the rule that produced the finding.
    pub lint_id: String,
    pub message: String,
    pub severity: Severity,
    /// Suggested replacement texts, best first.
    pub suggestions: Vec<String>,
}

impl Annotation {
    pub fn new(
        id: AnnotationId,
        range: OffsetRange,
        category: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            id,
            range,
            category: category.into(),
            lint_id: String::new(),
            message: message.into(),
            severity,
            suggestions: Vec::new(),
        }
    }

    pub fn with_lint_id(mut self, lint_id: impl Into<String>) -> Self {
        self.lint_id = lint_id.into();
        self
    }

    pub fn with_suggestions<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions = suggestions.into_iter().map(Into::into).collect();
        self
    }

    /// Same finding at the same place (ids ignored). Used to keep ids stable
    /// across re-analysis.
    pub fn same_finding(&self, other: &Annotation) -> bool {
        self.range == other.range
            && self.category == other.category
            && self.lint_id == other.lint_id
            && self.message == other.message
    }
}
