mod common;

use common::*;
use core_cache::StyleTemplate;
use core_events::{ChannelObserver, SessionEvent};
use core_host::Strategy;
use core_host::memory::MemoryHost;
use core_replace::{BufferSession, RawSuggestion, Reanalysis, SuggestionProvider};
use core_text::{Encoding, HostIdentity, TextSnapshot};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

fn snap(text: &str) -> TextSnapshot {
    TextSnapshot::new(HostIdentity::new("notes"), text)
}

fn session() -> BufferSession {
    let host = MemoryHost::new("notes", "", Encoding::UnicodeScalar);
    BufferSession::new(generic(&host), settings())
}

struct Rewriter {
    calls: AtomicUsize,
}

impl SuggestionProvider for Rewriter {
    fn suggest(&self, text: &str, style: StyleTemplate, _model: &str) -> Vec<RawSuggestion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        text.contains("gonna")
            .then(|| RawSuggestion {
                original: "gonna".into(),
                suggested: "going to".into(),
                reason: style.as_str().into(),
            })
            .into_iter()
            .collect()
    }
}

#[test]
fn first_reanalysis_is_full_then_unchanged() {
    let mut s = session();
    let now = Instant::now();
    assert_eq!(s.request_reanalysis(snap("teh cat"), &typos, now).unwrap(), Reanalysis::Full);
    assert_eq!(spans(&s), vec![(0, 3)]);
    assert_eq!(
        s.request_reanalysis(snap("teh cat"), &typos, now).unwrap(),
        Reanalysis::Unchanged
    );
}

#[test]
fn small_edit_shifts_survivors_and_keeps_their_ids() {
    let mut s = session();
    let now = Instant::now();
    s.request_reanalysis(snap("teh cat saw teh dog"), &typos, now)
        .unwrap();
    let far = id_at(&s, 12);

    let r = s
        .request_reanalysis(snap("teh big cat saw teh dog"), &typos, now)
        .unwrap();
    let Reanalysis::Incremental { region, dropped } = r else {
        panic!("expected incremental, got {r:?}");
    };
    assert_eq!((region.start().value, region.inserted_len(), dropped), (4, 4, 0));
    assert_eq!(spans(&s), vec![(0, 3), (16, 19)]);
    assert_eq!(id_at(&s, 16), far);
}

#[test]
fn large_edit_replaces_everything() {
    let mut s = session();
    let now = Instant::now();
    s.request_reanalysis(snap("teh cat"), &typos, now).unwrap();
    let pasted = format!("teh cat {}recieve", "lorem ipsum ".repeat(5));
    assert_eq!(s.request_reanalysis(snap(&pasted), &typos, now).unwrap(), Reanalysis::Full);
    assert_eq!(s.current_annotations().len(), 2);
}

#[test]
fn analysis_results_are_reused_by_content() {
    let calls = AtomicUsize::new(0);
    let counting = |snapshot: &TextSnapshot, profile: &str| {
        calls.fetch_add(1, Ordering::SeqCst);
        typos(snapshot, profile)
    };
    let mut s = session();
    let now = Instant::now();
    s.request_reanalysis(snap("teh cat"), &counting, now).unwrap();
    s.request_reanalysis(snap("teh cats"), &counting, now).unwrap();
    s.request_reanalysis(snap("teh cat"), &counting, now).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let (analysis, _) = s.cache_metrics();
    assert_eq!(analysis.hits, 1);

    s.set_analysis_profile("en-GB");
    assert_eq!(s.analysis_cache_len(), 0);
    assert_eq!(s.request_reanalysis(snap("teh cat"), &counting, now).unwrap(), Reanalysis::Full);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn replacement_invalidates_results_for_the_old_content() {
    let (host, mut s) = analyzed_session("I'm gonna fix teh bug", generic, Vec::new()).await;
    let now = Instant::now();
    // A profile switch forces a fresh, cached analysis of the current content.
    s.set_analysis_profile("en-US");
    let live = core_host::MutationHost::read_current_text(&host).await.unwrap();
    s.request_reanalysis(live, &typos, now).unwrap();
    let rewriter = Rewriter { calls: AtomicUsize::new(0) };
    let suggestions = s.style_suggestions(&rewriter, now).unwrap();
    assert_eq!(suggestions[0].range.start().value, 4);
    assert_eq!((s.analysis_cache_len(), s.suggestion_cache_len()), (1, 1));

    let settled = s.apply_replacement(id_at(&s, 14), "the", &host).await.unwrap();
    assert!(settled.status.applied());
    assert_eq!(settled.strategies, vec![Strategy::ClipboardPaste]);
    assert_eq!((s.analysis_cache_len(), s.suggestion_cache_len()), (0, 0));
    let (analysis, suggestion) = s.cache_metrics();
    assert_eq!((analysis.invalidations, suggestion.invalidations), (1, 1));
}

#[test]
fn style_suggestions_are_cached_per_style() {
    let mut s = session();
    let now = Instant::now();
    let rewriter = Rewriter { calls: AtomicUsize::new(0) };
    assert_eq!(
        s.style_suggestions(&rewriter, now).unwrap_err(),
        core_replace::ReplaceError::NotAnalyzed
    );
    s.request_reanalysis(snap("we gonna win"), &typos, now).unwrap();

    let first = s.style_suggestions(&rewriter, now).unwrap();
    let again = s.style_suggestions(&rewriter, now).unwrap();
    assert_eq!(first, again);
    assert_eq!(first[0].reason, "default");
    assert_eq!(rewriter.calls.load(Ordering::SeqCst), 1);

    s.set_suggestion_style(StyleTemplate::Formal, "local-7b");
    let formal = s.style_suggestions(&rewriter, now).unwrap();
    assert_eq!(formal[0].reason, "formal");
    assert_eq!(rewriter.calls.load(Ordering::SeqCst), 2);

    // Past the max age the entry is recomputed.
    let later = now + Duration::from_secs(601);
    s.style_suggestions(&rewriter, later).unwrap();
    assert_eq!(rewriter.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn dismissal_notifies_observers() {
    let mut s = session();
    let (obs, mut rx) = ChannelObserver::channel();
    s.register_observer(Arc::new(obs));
    s.ingest_analysis(snap("teh teh"), vec![spelling(0, 0, 3, "the"), spelling(0, 4, 7, "the")])
        .unwrap();
    let _ = rx.recv().await;

    let gone = s.dismiss(id_at(&s, 0)).unwrap();
    assert_eq!(gone.range.start().value, 0);
    match rx.recv().await.unwrap() {
        SessionEvent::AnnotationsChanged { annotations, .. } => {
            assert_eq!(annotations.len(), 1);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(s.dismiss(gone.id).is_none());
}

#[test]
fn session_built_from_config() {
    let file = core_config::parse(
        r#"
        [diff]
        large_edit_threshold = 5

        [replacement]
        strategy_timeout_ms = 250
        settle_delay_ms = 10
        grace_period_ms = 20

        [analysis]
        dialect = "en-GB"

        [[profiles]]
        host = "mail"
        strategies = ["inject", "paste"]
        capabilities = ["utf16_offsets", "read_back"]
        "#,
    )
    .unwrap();
    let config = core_config::Config {
        file,
        ..Default::default()
    };
    let s = BufferSession::from_config(HostIdentity::new("mail"), &config);
    assert_eq!(
        s.profile().cascade().to_vec(),
        vec![Strategy::CharacterInjection, Strategy::ClipboardPaste]
    );
    assert_eq!(s.settings().strategy_timeout, Duration::from_millis(250));
    assert_eq!(s.settings().large_edit_threshold, 5);

    let other = BufferSession::from_config(HostIdentity::new("unknown"), &config);
    assert_eq!(other.profile(), &core_host::StrategyProfile::generic(HostIdentity::new("unknown")));
}

proptest! {
    #[test]
    fn survivors_keep_denoting_their_text(
        inserts in prop::collection::vec((0usize..40, "[a-z ]{1,3}"), 1..6)
    ) {
        let mut text = String::from("teh cat and teh dog saw teh bird");
        let mut s = session();
        let now = Instant::now();
        s.request_reanalysis(snap(&text), &typos, now).unwrap();
        for (at, insert) in inserts {
            let at = at.min(text.chars().count());
            let byte = text.char_indices().nth(at).map(|(b, _)| b).unwrap_or(text.len());
            text.insert_str(byte, &insert);
            let next = snap(&text);
            s.request_reanalysis(next.clone(), &typos, now).unwrap();
            for a in s.current_annotations() {
                prop_assert_eq!(next.slice(a.range).unwrap(), "teh");
            }
        }
    }
}
