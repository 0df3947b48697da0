//! Drive one scenario through a buffer session against the in-memory host.

use crate::scenario::{Scenario, ScenarioError};
use core_annotations::{Annotation, AnnotationId};
use core_config::Config;
use core_events::{ChannelObserver, ReplacementSettled, SessionEvent};
use core_host::MutationHost;
use core_host::memory::MemoryHost;
use core_replace::{BufferSession, Reanalysis, ReplaceError};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error(transparent)]
    Session(#[from] ReplaceError),
}

/// Result of one `[[accept]]` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestReport {
    pub start: usize,
    pub replacement: String,
    pub result: Result<ReplacementSettled, String>,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub requests: Vec<RequestReport>,
    pub final_text: String,
    /// Annotations left after the closing re-analysis.
    pub remaining: Vec<Annotation>,
    pub events: Vec<SessionEvent>,
}

impl Report {
    pub fn applied(&self) -> usize {
        self.requests
            .iter()
            .filter(|r| matches!(&r.result, Ok(s) if s.status.applied()))
            .count()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in &self.requests {
            match &r.result {
                Ok(settled) => {
                    let tried: Vec<&str> = settled.strategies.iter().map(|s| s.as_str()).collect();
                    writeln!(
                        f,
                        "@{} -> {:?}: {} [{}]",
                        r.start,
                        r.replacement,
                        settled.status,
                        tried.join(", ")
                    )?;
                }
                Err(e) => writeln!(f, "@{} -> {:?}: rejected: {e}", r.start, r.replacement)?,
            }
        }
        writeln!(f, "remaining annotations: {}", self.remaining.len())?;
        write!(f, "final text: {}", self.final_text)
    }
}

pub async fn run(scenario: &Scenario, config: &Config) -> Result<Report, RunError> {
    let host = MemoryHost::new(&scenario.host, scenario.text.as_str(), scenario.encoding()?);
    for spec in &scenario.faults {
        host.script(spec.primitive()?, spec.fault()?, spec.times);
    }

    let config = scenario.overlay(config);
    let mut session = BufferSession::from_config(host.identity(), &config);
    let (observer, mut rx) = ChannelObserver::channel();
    session.register_observer(Arc::new(observer));
    info!(
        target: "runtime",
        host = scenario.host.as_str(),
        strategies = session.profile().cascade().len(),
        accepts = scenario.accept.len(),
        "scenario_start"
    );

    let analyzer = scenario.analyzer();
    let snapshot = host.read_current_text().await.map_err(ReplaceError::Host)?;
    let mut initial = scenario.annotations()?;
    initial.extend(analyzer(&snapshot, ""));
    let ingested = session.ingest_analysis(snapshot, initial)?;

    // Accepts name annotations by their start in the initial text; later
    // commits shift ranges but ids stay put.
    let targets: Vec<Option<AnnotationId>> = scenario
        .accept
        .iter()
        .map(|a| {
            ingested
                .iter()
                .find(|x| x.range.start().value == a.start)
                .map(|x| x.id)
        })
        .collect();

    let mut requests = Vec::with_capacity(scenario.accept.len());
    for (accept, target) in scenario.accept.iter().zip(targets) {
        let Some(id) = target else {
            warn!(target: "runtime", start = accept.start, "accept_without_annotation");
            requests.push(RequestReport {
                start: accept.start,
                replacement: accept.replacement.clone().unwrap_or_default(),
                result: Err(format!("no annotation starts at {}", accept.start)),
            });
            continue;
        };
        let replacement = match (&accept.replacement, session.annotation(id)) {
            (Some(r), _) => r.clone(),
            (None, Some(a)) => a.suggestions.first().cloned().unwrap_or_default(),
            (None, None) => String::new(),
        };
        let result = session
            .apply_replacement(id, replacement.clone(), &host)
            .await
            .map_err(|e| e.to_string());
        requests.push(RequestReport {
            start: accept.start,
            replacement,
            result,
        });
    }

    // Closing re-analysis once the grace window has passed.
    sleep(session.settings().grace_period).await;
    let snapshot = host.read_current_text().await.map_err(ReplaceError::Host)?;
    match session.request_reanalysis(snapshot, &analyzer, Instant::now())? {
        Reanalysis::Deferred => warn!(target: "runtime", "closing_reanalysis_deferred"),
        r => info!(target: "runtime", result = ?r, "closing_reanalysis"),
    }

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    let report = Report {
        requests,
        final_text: host.text(),
        remaining: session.current_annotations(),
        events,
    };
    info!(
        target: "runtime",
        applied = report.applied(),
        requests = report.requests.len(),
        events = report.events.len(),
        "scenario_complete"
    );
    Ok(report)
}
