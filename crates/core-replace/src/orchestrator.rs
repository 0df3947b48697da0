//! One replacement request as an explicit async state machine.
//!
//! ```text
//! Resolving → Selecting → Mutating → Verifying → Committed
//!                 ↑                       │
//!                 └─ RetryingNextStrategy ┘ (cascade exhausted → Failed)
//! ```
//!
//! The task owns everything it needs (request, analyzed snapshot, profile) so
//! the session is free while it suspends on the host. Every host call runs
//! under the strategy timeout; a timeout counts as a failed attempt.
//!
//! Verification with read-back compares the buffer against the snapshot the
//! target was resolved in:
//! * replacement present at the target with its surroundings intact: committed,
//!   even if the strategy reported failure
//! * buffer unchanged: re-read once after the settle delay, then advance
//! * anything else: the buffer moved underneath us; stop with `BufferChanged`
//!   rather than risk applying twice
//!
//! Without read-back the strategy's own report is trusted after the settle
//! delay. Either way the first success is final.

use crate::error::{ReplaceError, StrategyFailure};
use crate::request::{
    CancelHandle, OutcomeStatus, Progress, ReplacementOutcome, ReplacementRequest, RequestState,
    StrategyAttempt, TaskProgress,
};
use crate::settings::SessionSettings;
use crate::strategy::{self, SavedClipboard};
use core_host::{Capabilities, HostError, MutationHost, Primitive, Strategy, StrategyProfile};
use core_resolve::{ResolvedTarget, SelectionResolver};
use core_text::TextSnapshot;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Scalars of unchanged text on each side that must survive the mutation.
const CONTEXT_CHECK: usize = 16;

enum AttemptError {
    /// Recoverable; try the next strategy.
    Next(StrategyFailure),
    /// Stop the cascade.
    Fatal {
        failure: StrategyFailure,
        error: ReplaceError,
    },
    Cancelled,
}

#[derive(Default)]
struct Record {
    transitions: Vec<RequestState>,
    history: Vec<StrategyAttempt>,
    target: Option<ResolvedTarget>,
    live_before: Option<TextSnapshot>,
    live_after: Option<TextSnapshot>,
    mutation_started: bool,
}

impl Record {
    fn enter(&mut self, state: RequestState) {
        self.transitions.push(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Landed,
    Unchanged,
    Diverged,
}

pub struct ReplacementTask {
    request: ReplacementRequest,
    analyzed: TextSnapshot,
    profile: StrategyProfile,
    settings: SessionSettings,
    progress: TaskProgress,
}

impl std::fmt::Debug for ReplacementTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplacementTask")
            .field("request", &self.request.id)
            .field("annotation", &self.request.annotation)
            .field("host", &self.profile.host)
            .finish()
    }
}

impl ReplacementTask {
    pub(crate) fn new(
        request: ReplacementRequest,
        analyzed: TextSnapshot,
        profile: StrategyProfile,
        settings: SessionSettings,
        progress: Arc<Progress>,
    ) -> Self {
        Self {
            request,
            analyzed,
            profile,
            settings,
            progress: TaskProgress::new(progress),
        }
    }

    pub fn request(&self) -> &ReplacementRequest {
        &self.request
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(self.progress.shared())
    }

    fn limit(&self) -> Duration {
        self.profile
            .strategy_timeout
            .unwrap_or(self.settings.strategy_timeout)
    }

    /// Drive the request to a terminal state against `host`.
    pub async fn run(self, host: &dyn MutationHost) -> ReplacementOutcome {
        let mut rec = Record::default();
        let status = self.drive(host, &mut rec).await;
        self.progress.finish();
        rec.enter(match &status {
            OutcomeStatus::Committed | OutcomeStatus::UnverifiedSuccess => RequestState::Committed,
            OutcomeStatus::Failed(_) => RequestState::Failed,
            OutcomeStatus::Cancelled => RequestState::Cancelled,
        });
        match &status {
            OutcomeStatus::Failed(e) => warn!(
                target: "replace.orchestrator",
                request = %self.request.id,
                annotation = %self.request.annotation,
                attempts = rec.history.len(),
                error = %e,
                "replacement_failed"
            ),
            _ => info!(
                target: "replace.orchestrator",
                request = %self.request.id,
                annotation = %self.request.annotation,
                attempts = rec.history.len(),
                status = ?status,
                "replacement_settled"
            ),
        }
        let mut request = self.request;
        request.strategy_history = rec.history;
        ReplacementOutcome {
            request,
            status,
            target: rec.target,
            live_before: rec.live_before,
            live_after: rec.live_after,
            transitions: rec.transitions,
            mutation_started: rec.mutation_started,
        }
    }

    async fn drive(&self, host: &dyn MutationHost, rec: &mut Record) -> OutcomeStatus {
        if !self.progress.resolving() {
            return OutcomeStatus::Cancelled;
        }
        rec.enter(RequestState::Resolving);
        let live = match self.read(host).await {
            Ok(live) => live,
            Err(e) => return OutcomeStatus::Failed(ReplaceError::Host(e)),
        };
        let resolver = SelectionResolver::for_profile(&self.profile);
        let target = match resolver.resolve(self.request.range, &self.analyzed, &live) {
            Ok(t) => t,
            Err(e) => {
                debug!(target: "replace.orchestrator", request = %self.request.id, error = %e, "resolve_failed");
                return OutcomeStatus::Failed(e.into());
            }
        };
        rec.target = Some(target.clone());
        rec.live_before = Some(live.clone());

        for (i, strategy) in self.profile.cascade().into_iter().enumerate() {
            if i > 0 {
                rec.enter(RequestState::RetryingNextStrategy);
            }
            match self.attempt(host, strategy, &target, &live, rec).await {
                Ok(status) => {
                    rec.history.push(StrategyAttempt {
                        strategy,
                        result: Ok(()),
                    });
                    return status;
                }
                Err(AttemptError::Next(failure)) => {
                    warn!(
                        target: "replace.orchestrator",
                        request = %self.request.id,
                        strategy = strategy.as_str(),
                        error = %failure,
                        "strategy_attempt_failed"
                    );
                    rec.history.push(StrategyAttempt {
                        strategy,
                        result: Err(failure),
                    });
                }
                Err(AttemptError::Fatal { failure, error }) => {
                    rec.history.push(StrategyAttempt {
                        strategy,
                        result: Err(failure),
                    });
                    return OutcomeStatus::Failed(error);
                }
                Err(AttemptError::Cancelled) => return OutcomeStatus::Cancelled,
            }
        }
        OutcomeStatus::Failed(ReplaceError::AllStrategiesExhausted {
            attempts: rec.history.len(),
        })
    }

    async fn attempt(
        &self,
        host: &dyn MutationHost,
        strategy: Strategy,
        target: &ResolvedTarget,
        live: &TextSnapshot,
        rec: &mut Record,
    ) -> Result<OutcomeStatus, AttemptError> {
        let limit = self.limit();
        if !self.progress.selecting() {
            return Err(AttemptError::Cancelled);
        }
        rec.enter(RequestState::Selecting(strategy));
        match timeout(limit, strategy::select(host, &self.profile, strategy, target, live)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if self.profile.has(Capabilities::UNRELIABLE_SELECTION) => {
                debug!(target: "replace.orchestrator", strategy = strategy.as_str(), error = %e, "selection_failure_ignored");
            }
            Ok(Err(source)) => {
                return Err(AttemptError::Next(StrategyFailure::SelectionFailed {
                    strategy,
                    source,
                }));
            }
            Err(_) => {
                return Err(AttemptError::Next(StrategyFailure::StrategyTimeout {
                    strategy,
                    after: limit,
                }));
            }
        }

        let saved = if strategy::uses_clipboard(strategy) {
            Some(SavedClipboard::take(host).await)
        } else {
            None
        };
        if !self.progress.mutating() {
            return Err(AttemptError::Cancelled);
        }
        rec.mutation_started = true;
        rec.enter(RequestState::Mutating(strategy));
        let reported = match timeout(limit, strategy::mutate(host, strategy, &self.request.replacement)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(StrategyFailure::StrategyRejected { strategy, source }),
            Err(_) => Err(StrategyFailure::StrategyTimeout {
                strategy,
                after: limit,
            }),
        };
        if let Some(saved) = saved {
            saved.restore(host).await;
        }

        rec.enter(RequestState::Verifying(strategy));
        self.verify(host, strategy, target, live, reported, rec).await
    }

    async fn verify(
        &self,
        host: &dyn MutationHost,
        strategy: Strategy,
        target: &ResolvedTarget,
        before: &TextSnapshot,
        reported: Result<(), StrategyFailure>,
        rec: &mut Record,
    ) -> Result<OutcomeStatus, AttemptError> {
        if !self.profile.has(Capabilities::READ_BACK) {
            return match reported {
                Ok(()) => {
                    sleep(self.settings.settle_delay).await;
                    Ok(OutcomeStatus::UnverifiedSuccess)
                }
                Err(failure) => Err(AttemptError::Next(failure)),
            };
        }

        let mut waited = false;
        loop {
            let after = match self.read(host).await {
                Ok(after) => after,
                Err(e) => {
                    warn!(target: "replace.orchestrator", strategy = strategy.as_str(), error = %e, "read_back_failed");
                    return match reported {
                        Ok(()) => Ok(OutcomeStatus::UnverifiedSuccess),
                        Err(failure) => Err(AttemptError::Next(failure)),
                    };
                }
            };
            match verdict(before, &after, target, &self.request.replacement) {
                Verdict::Landed => {
                    if reported.is_err() {
                        warn!(target: "replace.orchestrator", strategy = strategy.as_str(), "strategy_reported_failure_but_applied");
                    }
                    rec.live_after = Some(after);
                    return Ok(OutcomeStatus::Committed);
                }
                Verdict::Unchanged if !waited && reported.is_ok() => {
                    waited = true;
                    sleep(self.settings.settle_delay).await;
                }
                Verdict::Unchanged => {
                    return Err(AttemptError::Next(
                        reported.err().unwrap_or(StrategyFailure::VerificationMismatch { strategy }),
                    ));
                }
                Verdict::Diverged => {
                    warn!(
                        target: "replace.orchestrator",
                        strategy = strategy.as_str(),
                        before = before.content_hash(),
                        after = after.content_hash(),
                        "buffer_diverged_during_replacement"
                    );
                    rec.live_after = Some(after);
                    return Err(AttemptError::Fatal {
                        failure: StrategyFailure::BufferDiverged { strategy },
                        error: ReplaceError::BufferChanged,
                    });
                }
            }
        }
    }

    async fn read(&self, host: &dyn MutationHost) -> Result<TextSnapshot, HostError> {
        match timeout(self.limit(), host.read_current_text()).await {
            Ok(r) => r,
            Err(_) => Err(HostError::Timeout(Primitive::ReadCurrentText)),
        }
    }
}

/// Where the replacement stands in `after`, relative to `before`.
fn verdict(before: &TextSnapshot, after: &TextSnapshot, target: &ResolvedTarget, replacement: &str) -> Verdict {
    let start = target.live.start().value;
    let end = target.live.end().value;
    let lead = start.min(CONTEXT_CHECK);

    let mut got = after.text().chars().skip(start - lead);
    let prefix_ok = before
        .text()
        .chars()
        .skip(start - lead)
        .take(lead)
        .eq(got.by_ref().take(lead));
    let body_ok = prefix_ok && replacement.chars().eq(got.by_ref().take(replacement.chars().count()));
    let suffix_ok = body_ok
        && before
            .text()
            .chars()
            .skip(end)
            .take(CONTEXT_CHECK)
            .eq(got.take(CONTEXT_CHECK));
    if suffix_ok {
        Verdict::Landed
    } else if after.same_content(before) {
        Verdict::Unchanged
    } else {
        Verdict::Diverged
    }
}
