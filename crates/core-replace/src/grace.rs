//! Grace window and the re-analysis requests it holds back.

use core_text::TextSnapshot;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Why re-analysis is (or is not) deferred right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraceState {
    Idle,
    /// A replacement is in flight; `mutating` once a strategy touched the
    /// host. Resolving and selecting leave the text alone, so only a
    /// mutating request holds re-analysis back.
    InFlight { mutating: bool },
    /// The last replacement settled; the host may still be catching up.
    Settling { until: Instant },
}

impl GraceState {
    pub fn defers_analysis(&self) -> bool {
        matches!(self, GraceState::InFlight { mutating: true } | GraceState::Settling { .. })
    }
}

#[derive(Debug, Default)]
pub(crate) struct GraceWindow {
    settle_until: Option<Instant>,
}

impl GraceWindow {
    pub(crate) fn open(&mut self, now: Instant, period: Duration) {
        let until = now + period;
        self.settle_until = Some(self.settle_until.map_or(until, |u| u.max(until)));
    }

    pub(crate) fn settling(&self, now: Instant) -> Option<Instant> {
        self.settle_until.filter(|until| *until > now)
    }
}

/// FIFO of snapshots waiting for the grace window to close. A snapshot with
/// the same content as one already queued is not queued twice.
#[derive(Debug, Default)]
pub(crate) struct DeferredQueue {
    queue: VecDeque<TextSnapshot>,
}

impl DeferredQueue {
    /// Returns false when coalesced into an existing entry.
    pub(crate) fn push(&mut self, snapshot: TextSnapshot) -> bool {
        let hash = snapshot.content_hash();
        if self.queue.iter().any(|s| s.content_hash() == hash) {
            debug!(target: "replace.session", hash, "reanalysis_coalesced");
            return false;
        }
        self.queue.push_back(snapshot);
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn drain(&mut self) -> Vec<TextSnapshot> {
        self.queue.drain(..).collect()
    }

    pub(crate) fn clear(&mut self) {
        self.queue.clear();
    }
}
