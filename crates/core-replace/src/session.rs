//! Per-buffer owner of annotations, caches and the in-flight replacement.
//!
//! Everything here is synchronous and runs on the buffer's serialized
//! context. The only async step, [`ReplacementTask::run`], happens between
//! [`BufferSession::begin_replacement`] and
//! [`BufferSession::complete_replacement`] while the session stays free for
//! reads such as [`BufferSession::current_annotations`].

use crate::analyzer::{self, Analyzer, StyleSuggestion, SuggestionProvider};
use crate::error::ReplaceError;
use crate::grace::{DeferredQueue, GraceState, GraceWindow};
use crate::orchestrator::ReplacementTask;
use crate::request::{
    CancelHandle, OutcomeStatus, Progress, ReplacementOutcome, ReplacementRequest, RequestId,
};
use crate::settings::SessionSettings;
use core_annotations::{Annotation, AnnotationId, AnnotationStore, IngestScope};
use core_cache::{
    AnalysisKey, CacheMetricsSnapshot, CachePolicy, ResultCache, StyleTemplate, SuggestionKey,
};
use core_config::Config;
use core_diff::{ChangedRegion, DiffEngine, DiffOutcome};
use core_events::{Observers, ReplacementSettled, SessionObserver, SettleStatus};
use core_host::{MutationHost, StrategyProfile};
use core_resolve::ResolveError;
use core_text::{Encoding, HostIdentity, TextSnapshot, grapheme};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Result of one re-analysis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reanalysis {
    /// Queued until the grace window closes.
    Deferred,
    Unchanged,
    /// Small edit: positions adjusted, only the edited region re-ingested.
    Incremental { region: ChangedRegion, dropped: usize },
    /// First analysis, large edit, or profile switch.
    Full,
}

#[derive(Debug)]
struct InFlight {
    id: RequestId,
    annotation: AnnotationId,
    progress: Arc<Progress>,
}

pub struct BufferSession {
    identity: HostIdentity,
    profile: StrategyProfile,
    settings: SessionSettings,
    store: AnnotationStore,
    analysis_cache: ResultCache<AnalysisKey, Vec<Annotation>>,
    suggestion_cache: ResultCache<SuggestionKey, Vec<StyleSuggestion>>,
    diff: DiffEngine,
    analyzed: Option<TextSnapshot>,
    analysis_profile: Arc<str>,
    style: StyleTemplate,
    model: Arc<str>,
    observers: Observers,
    grace: GraceWindow,
    deferred: DeferredQueue,
    in_flight: Option<InFlight>,
    tracking: bool,
    next_request: u64,
    next_annotation: u64,
}

impl std::fmt::Debug for BufferSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferSession")
            .field("identity", &self.identity)
            .field("annotations", &self.store.len())
            .field("tracking", &self.tracking)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

impl BufferSession {
    pub fn new(profile: StrategyProfile, settings: SessionSettings) -> Self {
        Self::with_caches(
            profile,
            settings,
            ResultCache::new("analysis", CachePolicy::analysis()),
            ResultCache::new("suggestion", CachePolicy::suggestion()),
        )
    }

    pub fn with_caches(
        profile: StrategyProfile,
        settings: SessionSettings,
        analysis_cache: ResultCache<AnalysisKey, Vec<Annotation>>,
        suggestion_cache: ResultCache<SuggestionKey, Vec<StyleSuggestion>>,
    ) -> Self {
        Self {
            identity: profile.host.clone(),
            diff: DiffEngine::new(settings.large_edit_threshold),
            profile,
            settings,
            store: AnnotationStore::new(Encoding::UnicodeScalar),
            analysis_cache,
            suggestion_cache,
            analyzed: None,
            analysis_profile: Arc::from("default"),
            style: StyleTemplate::Default,
            model: Arc::from("none"),
            observers: Observers::new(),
            grace: GraceWindow::default(),
            deferred: DeferredQueue::default(),
            in_flight: None,
            tracking: true,
            next_request: 1,
            next_annotation: 1,
        }
    }

    /// Session for `host` with its registered profile and configured sizing.
    pub fn from_config(host: HostIdentity, config: &Config) -> Self {
        let mut session = Self::with_caches(
            config.registry().lookup(&host),
            SessionSettings::from_config(config),
            ResultCache::new("analysis", config.analysis_cache()),
            ResultCache::new("suggestion", config.suggestion_cache()),
        );
        session.analysis_profile = Arc::from(config.file.analysis.profile_name());
        session.style = config.file.suggestion.style();
        session.model = Arc::from(config.file.suggestion.model.as_str());
        session
    }

    pub fn identity(&self) -> &HostIdentity {
        &self.identity
    }

    pub fn profile(&self) -> &StrategyProfile {
        &self.profile
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    /// Snapshot the current annotation positions refer to.
    pub fn analyzed(&self) -> Option<&TextSnapshot> {
        self.analyzed.as_ref()
    }

    pub fn current_annotations(&self) -> Vec<Annotation> {
        self.store.current()
    }

    pub fn annotation(&self, id: AnnotationId) -> Option<&Annotation> {
        self.store.get(id)
    }

    pub fn register_observer(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observers.register(observer);
    }

    pub fn on_replacement_settled<F>(&mut self, callback: F)
    where
        F: Fn(&ReplacementSettled) + Send + Sync + 'static,
    {
        self.observers.on_replacement_settled(callback);
    }

    pub fn observers(&self) -> &Observers {
        &self.observers
    }

    pub fn cache_metrics(&self) -> (CacheMetricsSnapshot, CacheMetricsSnapshot) {
        (self.analysis_cache.metrics(), self.suggestion_cache.metrics())
    }

    pub fn analysis_cache_len(&self) -> usize {
        self.analysis_cache.len()
    }

    pub fn suggestion_cache_len(&self) -> usize {
        self.suggestion_cache.len()
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    // -- analysis -----------------------------------------------------------

    /// Replace every annotation with `fresh`, computed against `snapshot`.
    pub fn ingest_analysis(
        &mut self,
        snapshot: TextSnapshot,
        fresh: Vec<Annotation>,
    ) -> Result<Vec<Annotation>, ReplaceError> {
        if !self.tracking {
            return Err(ReplaceError::NotTracking);
        }
        let fresh = self.assign_ids(fresh);
        let current = self.store.ingest(fresh, IngestScope::Everything)?;
        self.analyzed = Some(snapshot);
        self.observers.annotations_changed(&self.identity, &current);
        Ok(current)
    }

    /// Bring annotations up to date with `snapshot`, or queue the request if
    /// a replacement is in flight or settling.
    pub fn request_reanalysis(
        &mut self,
        snapshot: TextSnapshot,
        analyzer: &dyn Analyzer,
        now: Instant,
    ) -> Result<Reanalysis, ReplaceError> {
        if !self.tracking {
            return Err(ReplaceError::NotTracking);
        }
        self.release_stale_slot(now);
        let grace = self.grace_state(now);
        if grace.defers_analysis() {
            self.deferred.push(snapshot);
            debug!(target: "replace.session", state = ?grace, queued = self.deferred.len(), "reanalysis_deferred");
            return Ok(Reanalysis::Deferred);
        }
        self.reanalyze(snapshot, analyzer, now)
    }

    /// Run queued re-analysis requests in arrival order once the grace
    /// window has closed. Returns nothing while it is still open.
    pub fn drain_deferred_reanalysis(
        &mut self,
        analyzer: &dyn Analyzer,
        now: Instant,
    ) -> Result<Vec<Reanalysis>, ReplaceError> {
        if !self.tracking {
            return Ok(Vec::new());
        }
        self.release_stale_slot(now);
        if self.grace_state(now).defers_analysis() {
            return Ok(Vec::new());
        }
        let queued = self.deferred.drain();
        if !queued.is_empty() {
            debug!(target: "replace.session", count = queued.len(), "deferred_reanalysis_released");
        }
        queued
            .into_iter()
            .map(|snapshot| self.reanalyze(snapshot, analyzer, now))
            .collect()
    }

    pub fn grace_state(&self, now: Instant) -> GraceState {
        if let Some(f) = self.in_flight.as_ref().filter(|f| !f.progress.is_orphaned()) {
            return GraceState::InFlight {
                mutating: f.progress.in_mutation(),
            };
        }
        match self.grace.settling(now) {
            Some(until) => GraceState::Settling { until },
            None => GraceState::Idle,
        }
    }

    fn reanalyze(
        &mut self,
        snapshot: TextSnapshot,
        analyzer: &dyn Analyzer,
        now: Instant,
    ) -> Result<Reanalysis, ReplaceError> {
        let Some(old) = self.analyzed.clone() else {
            return self.full_analysis(snapshot, analyzer, now);
        };
        let region = match self.diff.diff(&old, &snapshot) {
            DiffOutcome::NoChange => return Ok(Reanalysis::Unchanged),
            DiffOutcome::Changed(region) => region,
        };
        if region.is_large() {
            info!(
                target: "replace.session",
                changed = region.changed_units(),
                threshold = self.diff.threshold(),
                "large_edit_invalidates_all"
            );
            return self.full_analysis(snapshot, analyzer, now);
        }

        let report = self
            .store
            .adjust_after_edit(region.old_range(), region.length_delta())?;
        let edited = snapshot.byte_range(region.new_range())?;
        let context = grapheme::word_context(snapshot.text(), edited);
        let scope = snapshot.range_of_bytes(context, Encoding::UnicodeScalar)?;

        let fresh: Vec<Annotation> = self
            .analyze_cached(&snapshot, analyzer, now)
            .into_iter()
            .filter(|a| a.range.intersects(&scope) || scope.contains_range(&a.range))
            .collect();
        let fresh = self.assign_ids(fresh);
        let current = self.store.ingest(fresh, IngestScope::Region(scope))?;
        self.analyzed = Some(snapshot);
        debug!(
            target: "replace.session",
            start = region.start().value,
            delta = region.length_delta(),
            shifted = report.shifted,
            dropped = report.dropped(),
            "incremental_reanalysis"
        );
        self.observers.annotations_changed(&self.identity, &current);
        Ok(Reanalysis::Incremental {
            region,
            dropped: report.dropped(),
        })
    }

    fn full_analysis(
        &mut self,
        snapshot: TextSnapshot,
        analyzer: &dyn Analyzer,
        now: Instant,
    ) -> Result<Reanalysis, ReplaceError> {
        let fresh = self.analyze_cached(&snapshot, analyzer, now);
        self.ingest_analysis(snapshot, fresh)?;
        Ok(Reanalysis::Full)
    }

    fn analyze_cached(
        &mut self,
        snapshot: &TextSnapshot,
        analyzer: &dyn Analyzer,
        now: Instant,
    ) -> Vec<Annotation> {
        let key = AnalysisKey::new(snapshot.content_hash(), self.analysis_profile.clone());
        if let Some(hit) = self.analysis_cache.get_at(&key, now.into_std()) {
            return hit;
        }
        let fresh = analyzer.analyze(snapshot, &self.analysis_profile);
        self.analysis_cache.put_at(key, fresh.clone(), now.into_std());
        fresh
    }

    fn assign_ids(&mut self, fresh: Vec<Annotation>) -> Vec<Annotation> {
        fresh
            .into_iter()
            .map(|mut a| {
                a.id = AnnotationId(self.next_annotation);
                self.next_annotation += 1;
                a
            })
            .collect()
    }

    /// Switch the analysis profile. Cached results for the old profile are
    /// dropped and the next re-analysis starts from scratch.
    pub fn set_analysis_profile(&mut self, name: impl Into<Arc<str>>) {
        let name = name.into();
        if name == self.analysis_profile {
            return;
        }
        let cleared = self.analysis_cache.clear();
        info!(target: "replace.session", profile = &*name, cleared, "analysis_profile_switched");
        self.analysis_profile = name;
        self.analyzed = None;
    }

    /// Switch suggestion style or model; clears the suggestion cache.
    pub fn set_suggestion_style(&mut self, style: StyleTemplate, model: impl Into<Arc<str>>) {
        let model = model.into();
        if style == self.style && model == self.model {
            return;
        }
        let cleared = self.suggestion_cache.clear();
        info!(target: "replace.session", style = style.as_str(), model = &*model, cleared, "suggestion_style_switched");
        self.style = style;
        self.model = model;
    }

    /// Style rewrites for the analyzed snapshot, cached per content, style
    /// and model.
    pub fn style_suggestions(
        &mut self,
        provider: &dyn SuggestionProvider,
        now: Instant,
    ) -> Result<Vec<StyleSuggestion>, ReplaceError> {
        let snapshot = self.analyzed.clone().ok_or(ReplaceError::NotAnalyzed)?;
        let key = SuggestionKey::new(snapshot.content_hash(), self.style, self.model.clone());
        if let Some(hit) = self.suggestion_cache.get_at(&key, now.into_std()) {
            return Ok(hit);
        }
        let raw = provider.suggest(snapshot.text(), self.style, &self.model);
        let located = analyzer::locate(&snapshot, raw);
        self.suggestion_cache
            .put_at(key, located.clone(), now.into_std());
        Ok(located)
    }

    /// Drop an annotation the user dismissed.
    pub fn dismiss(&mut self, id: AnnotationId) -> Option<Annotation> {
        let removed = self.store.remove_id(id)?;
        self.observers
            .annotations_changed(&self.identity, &self.store.current());
        Some(removed)
    }

    // -- replacement --------------------------------------------------------

    /// Claim the buffer's single replacement slot for `annotation`.
    pub fn begin_replacement(
        &mut self,
        annotation: AnnotationId,
        replacement: impl Into<String>,
    ) -> Result<ReplacementTask, ReplaceError> {
        if !self.tracking {
            return Err(ReplaceError::NotTracking);
        }
        self.release_stale_slot(Instant::now());
        if let Some(f) = &self.in_flight {
            debug!(target: "replace.session", busy = %f.annotation, requested = %annotation, "replacement_rejected_in_flight");
            return Err(ReplaceError::ReplacementInFlight {
                annotation: f.annotation,
            });
        }
        let analyzed = self.analyzed.clone().ok_or(ReplaceError::NotAnalyzed)?;
        let ann = self
            .store
            .get(annotation)
            .ok_or(ReplaceError::UnknownAnnotation(annotation))?;
        let original_text = analyzed
            .slice(ann.range)
            .map_err(|_| ResolveError::Unresolvable {
                reason: "annotation outside analyzed snapshot",
            })?
            .to_string();

        let id = RequestId(self.next_request);
        self.next_request += 1;
        let request = ReplacementRequest {
            id,
            annotation,
            range: ann.range,
            original_text,
            replacement: replacement.into(),
            strategy_history: Vec::new(),
        };
        let progress = Progress::new();
        self.in_flight = Some(InFlight {
            id,
            annotation,
            progress: progress.clone(),
        });
        debug!(target: "replace.session", request = %id, annotation = %annotation, "replacement_started");
        Ok(ReplacementTask::new(
            request,
            analyzed,
            self.profile.clone(),
            self.settings,
            progress,
        ))
    }

    /// Cancel the in-flight replacement if it has not started mutating.
    pub fn cancel_pending(&self) -> bool {
        self.in_flight
            .as_ref()
            .map(|f| CancelHandle::new(f.progress.clone()).cancel())
            .unwrap_or(false)
    }

    /// Free the replacement slot when its task was dropped unfinished or
    /// was cancelled; neither will deliver an outcome that touched the host.
    fn release_stale_slot(&mut self, now: Instant) {
        let Some(f) = self.in_flight.take_if(|f| f.progress.releasable()) else {
            return;
        };
        let mid_mutation = f.progress.orphaned_mid_mutation();
        if mid_mutation {
            self.grace.open(now, self.settings.grace_period);
        }
        warn!(
            target: "replace.session",
            request = %f.id,
            annotation = %f.annotation,
            orphaned = f.progress.is_orphaned(),
            mid_mutation,
            "replacement_slot_released"
        );
    }

    /// Apply a finished task's result: adjust positions, invalidate caches,
    /// notify, and open the settle window.
    pub fn complete_replacement(
        &mut self,
        outcome: ReplacementOutcome,
        now: Instant,
    ) -> Result<ReplacementSettled, ReplaceError> {
        match &self.in_flight {
            Some(f) if f.id == outcome.request.id => {}
            _ => return Err(ReplaceError::StaleOutcome),
        }
        self.in_flight = None;
        if outcome.mutation_started {
            self.grace.open(now, self.settings.grace_period);
        }

        let status = match (&outcome.status, self.tracking) {
            (OutcomeStatus::Cancelled, _) => SettleStatus::Cancelled,
            (_, false) => {
                info!(target: "replace.session", request = %outcome.request.id, "outcome_discarded_untracked");
                SettleStatus::Discarded
            }
            (OutcomeStatus::Committed, true) => {
                self.commit(&outcome);
                SettleStatus::Committed
            }
            (OutcomeStatus::UnverifiedSuccess, true) => {
                self.commit(&outcome);
                SettleStatus::UnverifiedSuccess
            }
            (OutcomeStatus::Failed(e), true) => SettleStatus::Failed {
                reason: e.to_string(),
            },
        };
        let settled = ReplacementSettled {
            buffer: self.identity.clone(),
            annotation: outcome.request.annotation,
            status,
            strategies: outcome.request.strategies_tried(),
        };
        self.observers.replacement_settled(&settled);
        Ok(settled)
    }

    fn commit(&mut self, outcome: &ReplacementOutcome) {
        let request = &outcome.request;
        let Some(analyzed) = self.analyzed.clone() else {
            self.invalidate_all("no_analyzed_snapshot");
            return;
        };
        let old_hash = analyzed.content_hash();

        match self.store.remove_id(request.annotation) {
            Some(ann) => {
                let replaced = ann.range.len() as isize;
                let delta = request.replacement.chars().count() as isize - replaced;
                match self.store.adjust_after_edit(ann.range, delta) {
                    Ok(report) => debug!(
                        target: "replace.session",
                        shifted = report.shifted,
                        dropped = report.dropped(),
                        delta,
                        "positions_adjusted"
                    ),
                    Err(e) => {
                        warn!(target: "replace.session", error = %e, "adjust_failed");
                        self.invalidate_all("adjust_failed");
                    }
                }
                self.analyzed = splice(&analyzed, &ann, &request.replacement);
                if self.analyzed.is_none() {
                    self.invalidate_all("snapshot_splice_failed");
                }
            }
            None => self.invalidate_all("annotation_vanished"),
        }

        let a = self.analysis_cache.invalidate_content(old_hash);
        let s = self.suggestion_cache.invalidate_content(old_hash);
        info!(
            target: "replace.session",
            request = %request.id,
            annotation = %request.annotation,
            delta = request.length_delta(),
            analysis_invalidated = a,
            suggestions_invalidated = s,
            "replacement_committed"
        );
        self.observers
            .replacement_applied(&self.identity, request.annotation, &request.replacement);
        self.observers
            .annotations_changed(&self.identity, &self.store.current());
    }

    fn invalidate_all(&mut self, reason: &'static str) {
        let dropped = self.store.clear();
        self.analyzed = None;
        warn!(target: "replace.session", reason, dropped, "annotations_invalidated");
    }

    /// Run a whole replacement against `host`: begin, run, complete.
    pub async fn apply_replacement(
        &mut self,
        annotation: AnnotationId,
        replacement: impl Into<String>,
        host: &dyn MutationHost,
    ) -> Result<ReplacementSettled, ReplaceError> {
        let task = self.begin_replacement(annotation, replacement)?;
        let outcome = task.run(host).await;
        self.complete_replacement(outcome, Instant::now())
    }

    // -- lifecycle ----------------------------------------------------------

    /// The host lost focus or the buffer went away. Cancels a pending
    /// replacement if it has not started mutating and frees its slot; a
    /// mutating one finishes and its outcome is discarded. Returns whether a
    /// cancel took effect.
    pub fn abandon(&mut self) -> bool {
        let cancelled = self.cancel_pending();
        self.release_stale_slot(Instant::now());
        self.tracking = false;
        self.deferred.clear();
        info!(target: "replace.session", cancelled, in_flight = self.in_flight.is_some(), "buffer_abandoned");
        cancelled
    }

    /// Track the buffer again; the next re-analysis starts from scratch.
    pub fn resume(&mut self) {
        if self.tracking {
            return;
        }
        self.release_stale_slot(Instant::now());
        self.tracking = true;
        self.analyzed = None;
        self.store.clear();
        debug!(target: "replace.session", "buffer_resumed");
    }
}

/// `analyzed` with `ann`'s range replaced by `replacement`.
fn splice(analyzed: &TextSnapshot, ann: &Annotation, replacement: &str) -> Option<TextSnapshot> {
    let bytes = analyzed.byte_range(ann.range).ok()?;
    let text = analyzed.text();
    let mut next = String::with_capacity(text.len() + replacement.len());
    next.push_str(&text[..bytes.start]);
    next.push_str(replacement);
    next.push_str(&text[bytes.end..]);
    Some(TextSnapshot::new(analyzed.host().clone(), next))
}
