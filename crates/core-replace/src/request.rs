//! Replacement request data and the shared progress cell.

use crate::error::{ReplaceError, StrategyFailure};
use core_annotations::AnnotationId;
use core_host::Strategy;
use core_resolve::ResolvedTarget;
use core_text::{OffsetRange, TextSnapshot};
use std::fmt;
use std::sync::Arc;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Per-request state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Resolving,
    Selecting(Strategy),
    Mutating(Strategy),
    Verifying(Strategy),
    RetryingNextStrategy,
    Committed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyAttempt {
    pub strategy: Strategy,
    pub result: Result<(), StrategyFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementRequest {
    pub id: RequestId,
    pub annotation: AnnotationId,
    /// Annotation range in store coordinates when the request was created.
    pub range: OffsetRange,
    pub original_text: String,
    pub replacement: String,
    pub strategy_history: Vec<StrategyAttempt>,
}

impl ReplacementRequest {
    /// Replacement length minus replaced length, in scalars.
    pub fn length_delta(&self) -> isize {
        self.replacement.chars().count() as isize - self.original_text.chars().count() as isize
    }

    pub fn strategies_tried(&self) -> Vec<Strategy> {
        self.strategy_history.iter().map(|a| a.strategy).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// Applied and confirmed by read-back.
    Committed,
    /// Applied per the strategy's own report; host offers no read-back.
    UnverifiedSuccess,
    Failed(ReplaceError),
    Cancelled,
}

impl OutcomeStatus {
    pub fn applied(&self) -> bool {
        matches!(self, OutcomeStatus::Committed | OutcomeStatus::UnverifiedSuccess)
    }
}

/// Terminal result of [`crate::ReplacementTask::run`].
#[derive(Debug, Clone)]
pub struct ReplacementOutcome {
    pub request: ReplacementRequest,
    pub status: OutcomeStatus,
    pub target: Option<ResolvedTarget>,
    /// Live snapshot the target was resolved against.
    pub live_before: Option<TextSnapshot>,
    /// Read-back snapshot after the committing strategy, when available.
    pub live_after: Option<TextSnapshot>,
    pub transitions: Vec<RequestState>,
    /// True once any strategy began mutating the host.
    pub mutation_started: bool,
}

const PENDING: u8 = 0;
const RESOLVING: u8 = 1;
const SELECTING: u8 = 2;
const MUTATING: u8 = 3;
const TERMINAL: u8 = 4;
const CANCELLED: u8 = 5;

/// Coarse progress shared between a running task and its session. Only ever
/// moves forward; once `Mutating` is reached it can no longer be cancelled.
#[derive(Debug, Default)]
pub(crate) struct Progress {
    phase: AtomicU8,
    /// The task was dropped before reaching a terminal state.
    orphaned: AtomicBool,
}

impl Progress {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            phase: AtomicU8::new(PENDING),
            orphaned: AtomicBool::new(false),
        })
    }

    /// Move forward to `next` unless cancelled. Returns false when cancelled.
    fn advance(&self, next: u8) -> bool {
        let mut current = self.phase.load(Ordering::Acquire);
        loop {
            if current == CANCELLED {
                return false;
            }
            if current >= next {
                return true;
            }
            match self
                .phase
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    pub(crate) fn resolving(&self) -> bool {
        self.advance(RESOLVING)
    }
    pub(crate) fn selecting(&self) -> bool {
        self.advance(SELECTING)
    }
    pub(crate) fn mutating(&self) -> bool {
        self.advance(MUTATING)
    }

    pub(crate) fn finish(&self) {
        let _ = self.phase.fetch_max(TERMINAL, Ordering::AcqRel);
    }

    /// Cancel if no mutation has started. Returns true when the cancel took.
    pub(crate) fn cancel(&self) -> bool {
        let mut current = self.phase.load(Ordering::Acquire);
        loop {
            if current == CANCELLED {
                return true;
            }
            if current >= MUTATING {
                return false;
            }
            match self
                .phase
                .compare_exchange(current, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.phase.load(Ordering::Acquire) == CANCELLED
    }

    /// Mutating or verifying right now.
    pub(crate) fn in_mutation(&self) -> bool {
        self.phase.load(Ordering::Acquire) == MUTATING && !self.is_orphaned()
    }

    /// Dropped while a strategy was touching the host.
    pub(crate) fn orphaned_mid_mutation(&self) -> bool {
        self.is_orphaned() && self.phase.load(Ordering::Acquire) == MUTATING
    }

    fn orphan(&self) {
        if self.phase.load(Ordering::Acquire) < TERMINAL {
            self.orphaned.store(true, Ordering::Release);
        }
    }

    pub(crate) fn is_orphaned(&self) -> bool {
        self.orphaned.load(Ordering::Acquire)
    }

    /// No outcome will ever need this request's slot: the task is gone, or
    /// it was cancelled and cannot touch the host.
    pub(crate) fn releasable(&self) -> bool {
        self.is_orphaned() || self.is_cancelled()
    }
}

/// The task's handle on its [`Progress`]. Dropping it before the task
/// finishes marks the request orphaned so the session can free its slot.
#[derive(Debug)]
pub(crate) struct TaskProgress(Arc<Progress>);

impl TaskProgress {
    pub(crate) fn new(progress: Arc<Progress>) -> Self {
        Self(progress)
    }

    pub(crate) fn shared(&self) -> Arc<Progress> {
        self.0.clone()
    }
}

impl Deref for TaskProgress {
    type Target = Progress;

    fn deref(&self) -> &Progress {
        &self.0
    }
}

impl Drop for TaskProgress {
    fn drop(&mut self) {
        self.0.orphan();
    }
}

/// Cancels a pending replacement before it starts mutating.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    progress: Arc<Progress>,
}

impl CancelHandle {
    pub(crate) fn new(progress: Arc<Progress>) -> Self {
        Self { progress }
    }

    /// True when the request will not mutate the host. False once mutation
    /// has begun; the cascade then runs to a terminal state.
    pub fn cancel(&self) -> bool {
        self.progress.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.progress.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_wins_before_mutation_only() {
        let p = Progress::new();
        assert!(p.resolving());
        assert!(p.selecting());
        assert!(p.cancel());
        assert!(!p.mutating());
        assert!(p.is_cancelled());

        let p = Progress::new();
        assert!(p.mutating());
        assert!(!p.cancel());
        assert!(p.in_mutation());
        p.finish();
        assert!(!p.in_mutation());
        assert!(!p.cancel());
    }

    #[test]
    fn dropping_an_unfinished_task_orphans_it() {
        let p = Progress::new();
        let task = TaskProgress::new(p.clone());
        assert!(task.resolving());
        drop(task);
        assert!(p.is_orphaned());
        assert!(p.releasable());
        assert!(!p.orphaned_mid_mutation());

        let p = Progress::new();
        let task = TaskProgress::new(p.clone());
        assert!(task.mutating());
        drop(task);
        assert!(p.is_orphaned());
        assert!(!p.in_mutation());
        assert!(p.orphaned_mid_mutation());

        let p = Progress::new();
        let task = TaskProgress::new(p.clone());
        task.finish();
        drop(task);
        assert!(!p.is_orphaned());
        assert!(!p.releasable());
    }

    #[test]
    fn phase_never_moves_backwards() {
        let p = Progress::new();
        assert!(p.mutating());
        assert!(p.selecting());
        assert!(p.in_mutation());
    }
}
