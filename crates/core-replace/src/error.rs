use core_annotations::{AnnotationId, StoreError};
use core_host::{HostError, Strategy};
use core_resolve::ResolveError;
use core_text::OffsetError;
use std::time::Duration;
use thiserror::Error;

/// Why one strategy attempt did not commit. Recovered locally by advancing
/// the cascade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyFailure {
    #[error("{strategy} timed out after {after:?}")]
    StrategyTimeout { strategy: Strategy, after: Duration },
    #[error("{strategy} rejected by host: {source}")]
    StrategyRejected {
        strategy: Strategy,
        #[source]
        source: HostError,
    },
    #[error("{strategy} could not select the target: {source}")]
    SelectionFailed {
        strategy: Strategy,
        #[source]
        source: HostError,
    },
    #[error("{strategy} reported success but the replacement is not in the buffer")]
    VerificationMismatch { strategy: Strategy },
    #[error("{strategy} left the buffer changed in an unexpected way")]
    BufferDiverged { strategy: Strategy },
}

impl StrategyFailure {
    pub fn strategy(&self) -> Strategy {
        match self {
            StrategyFailure::StrategyTimeout { strategy, .. }
            | StrategyFailure::StrategyRejected { strategy, .. }
            | StrategyFailure::SelectionFailed { strategy, .. }
            | StrategyFailure::VerificationMismatch { strategy }
            | StrategyFailure::BufferDiverged { strategy } => *strategy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplaceError {
    /// The annotated text could not be located in the live buffer.
    #[error("could not apply: {0}")]
    NoMatch(#[from] ResolveError),
    #[error("could not apply: all {attempts} strategies failed")]
    AllStrategiesExhausted { attempts: usize },
    /// The buffer changed in an unexpected way during the attempt; retrying
    /// could apply the replacement twice.
    #[error("could not apply: buffer changed underneath the replacement")]
    BufferChanged,
    #[error("replacement for {annotation} already in flight")]
    ReplacementInFlight { annotation: AnnotationId },
    #[error("unknown annotation {0}")]
    UnknownAnnotation(AnnotationId),
    #[error("buffer has not been analyzed yet")]
    NotAnalyzed,
    #[error("buffer is no longer tracked")]
    NotTracking,
    #[error("replacement cancelled")]
    Cancelled,
    #[error("outcome does not belong to the in-flight replacement")]
    StaleOutcome,
    #[error("host unavailable: {0}")]
    Host(HostError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Offset(#[from] OffsetError),
}
