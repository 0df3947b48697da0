//! Scenario files: a buffer, its findings, and the suggestions to accept.
//!
//! ```toml
//! text = "The qick fox"
//! host = "notes"
//! encoding = "utf16"        # scalar | utf16 | grapheme
//!
//! [profile]                 # optional, overrides the config profile for `host`
//! capabilities = ["read-back"]
//! strategies = ["paste", "inject"]
//!
//! [[annotations]]
//! start = 4
//! end = 8
//! suggestions = ["quick"]
//!
//! [[rules]]                 # analyzer: flag every occurrence of `wrong`
//! wrong = "teh"
//! right = "the"
//!
//! [[accept]]
//! start = 4                 # scalar start in the initial text
//!
//! [[faults]]
//! primitive = "write_clipboard"
//! kind = "no_effect"
//! times = 1
//! ```
//!
//! Offsets are Unicode scalars into `text` regardless of the host encoding.

use core_annotations::{Annotation, AnnotationId, Severity};
use core_config::{Config, ProfileConfig};
use core_host::memory::Fault;
use core_host::{HostError, Primitive};
use core_text::{Encoding, OffsetError, OffsetRange, TextSnapshot};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("cannot read scenario {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid scenario: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown encoding `{0}`")]
    UnknownEncoding(String),
    #[error("unknown host primitive `{0}`")]
    UnknownPrimitive(String),
    #[error("annotation {start}..{end} is outside the text")]
    OutOfBounds { start: usize, end: usize },
    #[error(transparent)]
    Offset(#[from] OffsetError),
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub text: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(default)]
    pub profile: Option<ProfileOverride>,
    #[serde(default)]
    pub annotations: Vec<AnnotationSpec>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub accept: Vec<Accept>,
    #[serde(default)]
    pub faults: Vec<FaultSpec>,
}

fn default_host() -> String {
    "scenario".to_string()
}

fn default_encoding() -> String {
    "scalar".to_string()
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ProfileOverride {
    pub strategies: Vec<String>,
    pub capabilities: Vec<String>,
    pub strategy_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SeverityName {
    #[default]
    Error,
    Warning,
    Info,
}

impl From<SeverityName> for Severity {
    fn from(s: SeverityName) -> Self {
        match s {
            SeverityName::Error => Severity::Error,
            SeverityName::Warning => Severity::Warning,
            SeverityName::Info => Severity::Info,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct AnnotationSpec {
    pub start: usize,
    pub end: usize,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub severity: SeverityName,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

fn default_category() -> String {
    "SPELLING".to_string()
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Rule {
    pub wrong: String,
    pub right: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Accept {
    pub start: usize,
    /// Defaults to the annotation's first suggestion.
    #[serde(default)]
    pub replacement: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Rejected,
    Unsupported,
    Timeout,
    Unavailable,
    NoEffect,
    FalseFailure,
    Delay,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct FaultSpec {
    pub primitive: String,
    pub kind: FaultKind,
    /// Omitted: the fault repeats on every call.
    #[serde(default)]
    pub times: Option<usize>,
    #[serde(default)]
    pub delay_ms: u64,
}

impl FaultSpec {
    pub fn primitive(&self) -> Result<Primitive, ScenarioError> {
        Primitive::parse(&self.primitive)
            .ok_or_else(|| ScenarioError::UnknownPrimitive(self.primitive.clone()))
    }

    pub fn fault(&self) -> Result<Fault, ScenarioError> {
        let primitive = self.primitive()?;
        Ok(match self.kind {
            FaultKind::Rejected => Fault::Error(HostError::rejected(primitive, "scripted")),
            FaultKind::Unsupported => Fault::Error(HostError::Unsupported(primitive)),
            FaultKind::Timeout => Fault::Error(HostError::Timeout(primitive)),
            FaultKind::Unavailable => Fault::Error(HostError::Unavailable),
            FaultKind::NoEffect => Fault::NoEffect,
            FaultKind::FalseFailure => Fault::FalseFailure,
            FaultKind::Delay => Fault::Delay(Duration::from_millis(self.delay_ms)),
        })
    }
}

pub fn load(path: &Path) -> Result<Scenario, ScenarioError> {
    let content = std::fs::read_to_string(path).map_err(|source| ScenarioError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<Scenario, ScenarioError> {
    Ok(toml::from_str(content)?)
}

impl Scenario {
    pub fn encoding(&self) -> Result<Encoding, ScenarioError> {
        Encoding::parse(&self.encoding).ok_or_else(|| ScenarioError::UnknownEncoding(self.encoding.clone()))
    }

    /// `config` with the scenario's profile override appended, so it wins
    /// over any `[[profiles]]` entry for the same host.
    pub fn overlay(&self, config: &Config) -> Config {
        let mut config = config.clone();
        if let Some(p) = &self.profile {
            config.file.profiles.push(ProfileConfig {
                host: self.host.clone(),
                strategies: p.strategies.clone(),
                capabilities: p.capabilities.clone(),
                strategy_timeout_ms: p.strategy_timeout_ms,
            });
        }
        config
    }

    /// Listed annotations as session input; ids are assigned on ingest.
    pub fn annotations(&self) -> Result<Vec<Annotation>, ScenarioError> {
        let len = self.text.chars().count();
        self.annotations
            .iter()
            .map(|a| {
                if a.end > len {
                    return Err(ScenarioError::OutOfBounds {
                        start: a.start,
                        end: a.end,
                    });
                }
                Ok(Annotation::new(
                    AnnotationId(0),
                    OffsetRange::scalar(a.start, a.end)?,
                    a.category.as_str(),
                    a.message.as_str(),
                    a.severity.into(),
                )
                .with_suggestions(a.suggestions.iter().cloned()))
            })
            .collect()
    }

    /// Analyzer flagging every occurrence of each rule's `wrong` text.
    pub fn analyzer(&self) -> impl Fn(&TextSnapshot, &str) -> Vec<Annotation> + Send + Sync + 'static {
        let rules = self.rules.clone();
        move |snapshot: &TextSnapshot, _profile: &str| {
            let text = snapshot.text();
            let mut out = Vec::new();
            for rule in &rules {
                if rule.wrong.is_empty() {
                    continue;
                }
                for (at, _) in text.match_indices(rule.wrong.as_str()) {
                    let start = text[..at].chars().count();
                    let end = start + rule.wrong.chars().count();
                    let Ok(range) = OffsetRange::scalar(start, end) else {
                        continue;
                    };
                    out.push(
                        Annotation::new(
                            AnnotationId(0),
                            range,
                            "SPELLING",
                            "Possible spelling mistake",
                            Severity::Error,
                        )
                        .with_lint_id(format!("rule.{}", rule.wrong))
                        .with_suggestions([rule.right.as_str()]),
                    );
                }
            }
            out
        }
    }
}
