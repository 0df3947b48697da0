//! Primitive sequences behind each mutation strategy.
//!
//! | strategy | select | mutate |
//! |---|---|---|
//! | DirectAttributeReplace | `select_range` | `set_selected_text` |
//! | ClipboardPaste | `select_range` | clipboard write + paste key |
//! | KeystrokeNavigation | start key, arrows, shift+arrows | clipboard write + paste key |
//! | CharacterInjection | `select_range` | `inject_characters` |
//!
//! Clipboard strategies put back whatever the clipboard held before.

use core_host::{
    Capabilities, HostError, Keystroke, MutationHost, Primitive, Strategy, StrategyProfile,
};
use core_resolve::ResolvedTarget;
use core_text::TextSnapshot;
use tracing::{debug, warn};

/// Prepare the host and select `target` the way `strategy` needs it.
pub(crate) async fn select(
    host: &dyn MutationHost,
    profile: &StrategyProfile,
    strategy: Strategy,
    target: &ResolvedTarget,
    live: &TextSnapshot,
) -> Result<(), HostError> {
    if profile.has(Capabilities::FOCUS_BEFORE_SELECT) {
        host.focus().await?;
    }
    if profile.has(Capabilities::CHILD_ELEMENT_SEARCH) {
        host.locate_element().await?;
    }
    match strategy {
        Strategy::KeystrokeNavigation => select_by_keys(host, target, live).await,
        _ => host.select_range(target.host).await,
    }
}

/// Arrow keys count grapheme clusters, so the target is converted to
/// cluster positions regardless of the host's offset encoding.
async fn select_by_keys(
    host: &dyn MutationHost,
    target: &ResolvedTarget,
    live: &TextSnapshot,
) -> Result<(), HostError> {
    let index = live.index();
    let (Some(start), Some(end)) = (
        index.cluster_at_scalar(target.live.start().value),
        index.cluster_at_scalar(target.live.end().value),
    ) else {
        return Err(HostError::rejected(
            Primitive::SimulateKeystroke,
            "target off cluster boundary",
        ));
    };
    host.simulate_keystroke(Keystroke::DocumentStart).await?;
    for _ in 0..start {
        host.simulate_keystroke(Keystroke::Right).await?;
    }
    for _ in start..end {
        host.simulate_keystroke(Keystroke::ShiftRight).await?;
    }
    debug!(target: "replace.orchestrator", start, len = end - start, "selected_by_keystrokes");
    Ok(())
}

/// Replace the current selection with `text`.
pub(crate) async fn mutate(
    host: &dyn MutationHost,
    strategy: Strategy,
    text: &str,
) -> Result<(), HostError> {
    match strategy {
        Strategy::DirectAttributeReplace => host.set_selected_text(text).await,
        Strategy::ClipboardPaste | Strategy::KeystrokeNavigation => {
            host.write_clipboard(text).await?;
            host.simulate_keystroke(Keystroke::Paste).await
        }
        Strategy::CharacterInjection => host.inject_characters(text).await,
    }
}

pub(crate) fn uses_clipboard(strategy: Strategy) -> bool {
    matches!(strategy, Strategy::ClipboardPaste | Strategy::KeystrokeNavigation)
}

/// Clipboard contents saved before a paste strategy runs.
pub(crate) struct SavedClipboard(Option<String>);

impl SavedClipboard {
    pub(crate) async fn take(host: &dyn MutationHost) -> Self {
        match host.read_clipboard().await {
            Ok(saved) => Self(saved),
            Err(e) => {
                debug!(target: "replace.orchestrator", error = %e, "clipboard_unreadable");
                Self(None)
            }
        }
    }

    pub(crate) async fn restore(self, host: &dyn MutationHost) {
        let Some(saved) = self.0 else {
            return;
        };
        if let Err(e) = host.write_clipboard(&saved).await {
            warn!(target: "replace.orchestrator", error = %e, "clipboard_restore_failed");
        }
    }
}
