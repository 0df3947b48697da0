use core_config::Config;
use core_diff::DEFAULT_LARGE_EDIT_THRESHOLD;
use std::time::Duration;

/// Timing and sizing knobs for one buffer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Upper bound for a single strategy attempt, unless the profile overrides it.
    pub strategy_timeout: Duration,
    /// Wait before the second read-back, and before accepting an unverified success.
    pub settle_delay: Duration,
    /// How long re-analysis stays deferred after a replacement settles.
    pub grace_period: Duration,
    pub large_edit_threshold: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            strategy_timeout: Duration::from_millis(1500),
            settle_delay: Duration::from_millis(150),
            grace_period: Duration::from_millis(400),
            large_edit_threshold: DEFAULT_LARGE_EDIT_THRESHOLD,
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        let r = &config.file.replacement;
        Self {
            strategy_timeout: r.strategy_timeout(),
            settle_delay: r.settle_delay(),
            grace_period: r.grace_period(),
            large_edit_threshold: config.file.diff.large_edit_threshold,
        }
    }
}
