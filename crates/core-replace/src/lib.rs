//! Replacement orchestration and per-buffer session state.
//!
//! A [`BufferSession`] owns one host buffer's annotations and caches. User
//! accepted suggestions become [`ReplacementTask`]s that resolve the live
//! target, walk the host's strategy cascade and verify the result; the
//! session then shifts the remaining annotations and invalidates cached
//! results for the old content.

pub mod analyzer;
pub mod error;
pub mod grace;
pub mod orchestrator;
pub mod request;
pub mod session;
pub mod settings;
mod strategy;

pub use analyzer::{Analyzer, RawSuggestion, StyleSuggestion, SuggestionProvider};
pub use error::{ReplaceError, StrategyFailure};
pub use grace::GraceState;
pub use orchestrator::ReplacementTask;
pub use request::{
    CancelHandle, OutcomeStatus, ReplacementOutcome, ReplacementRequest, RequestId, RequestState,
    StrategyAttempt,
};
pub use session::{BufferSession, Reanalysis};
pub use settings::SessionSettings;
