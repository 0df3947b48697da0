#![allow(dead_code)] // Shared across integration tests; each test binary uses a subset of helpers.

use core_annotations::{Annotation, AnnotationId, Severity};
use core_host::memory::MemoryHost;
use core_host::{Capabilities, MutationHost, Strategy, StrategyProfile};
use core_replace::{BufferSession, SessionSettings};
use core_text::{Encoding, OffsetRange, TextSnapshot};
use std::time::Duration;

pub const TYPOS: [(&str, &str); 3] = [("qick", "quick"), ("teh", "the"), ("recieve", "receive")];

pub fn spelling(id: u64, start: usize, end: usize, suggestion: &str) -> Annotation {
    Annotation::new(
        AnnotationId(id),
        OffsetRange::scalar(start, end).unwrap(),
        "SPELLING",
        "Possible spelling mistake",
        Severity::Error,
    )
    .with_suggestions([suggestion])
}

pub fn style(id: u64, start: usize, end: usize) -> Annotation {
    Annotation::new(
        AnnotationId(id),
        OffsetRange::scalar(start, end).unwrap(),
        "STYLE",
        "Consider a more specific word",
        Severity::Info,
    )
}

/// Flags every occurrence of a known misspelling.
pub fn typos(snapshot: &TextSnapshot, _profile: &str) -> Vec<Annotation> {
    let text = snapshot.text();
    let mut out = Vec::new();
    for (wrong, right) in TYPOS {
        for (at, _) in text.match_indices(wrong) {
            let start = text[..at].chars().count();
            let end = start + wrong.chars().count();
            out.push(spelling(0, start, end, right).with_lint_id(format!("typo.{wrong}")));
        }
    }
    out
}

pub fn settings() -> SessionSettings {
    SessionSettings {
        strategy_timeout: Duration::from_millis(500),
        settle_delay: Duration::from_millis(100),
        grace_period: Duration::from_millis(400),
        large_edit_threshold: 40,
    }
}

pub fn profile(
    host: &MemoryHost,
    capabilities: Capabilities,
    cascade: impl IntoIterator<Item = Strategy>,
) -> StrategyProfile {
    StrategyProfile::new(host.identity(), capabilities, cascade).unwrap()
}

/// Host plus a session that has analyzed the host's current text with
/// `annotations`.
pub async fn analyzed_session(
    text: &str,
    profile_for: impl FnOnce(&MemoryHost) -> StrategyProfile,
    annotations: Vec<Annotation>,
) -> (MemoryHost, BufferSession) {
    let encoding = Encoding::UnicodeScalar;
    let host = MemoryHost::new("notes", text, encoding);
    let mut session = BufferSession::new(profile_for(&host), settings());
    let snapshot = host.read_current_text().await.unwrap();
    session.ingest_analysis(snapshot, annotations).unwrap();
    (host, session)
}

pub fn generic(host: &MemoryHost) -> StrategyProfile {
    StrategyProfile::generic(host.identity())
}

/// Id the session assigned to the annotation starting at `start`.
pub fn id_at(session: &BufferSession, start: usize) -> AnnotationId {
    session
        .current_annotations()
        .iter()
        .find(|a| a.range.start().value == start)
        .map(|a| a.id)
        .unwrap()
}

pub fn spans(session: &BufferSession) -> Vec<(usize, usize)> {
    session
        .current_annotations()
        .iter()
        .map(|a| (a.range.start().value, a.range.end().value))
        .collect()
}
