//! Per-host strategy profiles.
//!
//! A profile is a tagged capability record plus an ordered strategy cascade.
//! It is resolved once per host identity and passed down explicitly; the
//! replacement engine consults flags, never host names.

use bitflags::bitflags;
use core_text::{Encoding, HostIdentity};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u32 {
        /// Selected text can be replaced through an attribute write.
        const DIRECT_ATTRIBUTE_EDIT = 1 << 0;
        /// The editable element must be located below the focused container.
        const CHILD_ELEMENT_SEARCH = 1 << 1;
        /// Host offsets count UTF-16 code units.
        const UTF16_OFFSETS = 1 << 2;
        /// Host offsets count grapheme clusters.
        const GRAPHEME_OFFSETS = 1 << 3;
        /// The host must be focused before a selection request.
        const FOCUS_BEFORE_SELECT = 1 << 4;
        /// Selection calls may report failure even when they worked.
        const UNRELIABLE_SELECTION = 1 << 5;
        /// Current text can be read back to verify an edit.
        const READ_BACK = 1 << 6;
        /// Offsets from analysis stay valid until the next analysis.
        const STABLE_OFFSETS = 1 << 7;
    }
}

impl Capabilities {
    const NAMES: [(&'static str, Capabilities); 8] = [
        ("direct_attribute_edit", Capabilities::DIRECT_ATTRIBUTE_EDIT),
        ("child_element_search", Capabilities::CHILD_ELEMENT_SEARCH),
        ("utf16_offsets", Capabilities::UTF16_OFFSETS),
        ("grapheme_offsets", Capabilities::GRAPHEME_OFFSETS),
        ("focus_before_select", Capabilities::FOCUS_BEFORE_SELECT),
        ("unreliable_selection", Capabilities::UNRELIABLE_SELECTION),
        ("read_back", Capabilities::READ_BACK),
        ("stable_offsets", Capabilities::STABLE_OFFSETS),
    ];

    /// Config-file spelling: case-insensitive, `-` and `_` interchangeable.
    pub fn from_config_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase().replace('-', "_");
        Self::NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, c)| *c)
    }

    pub fn from_names<I, S>(names: I) -> Result<Self, ProfileError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names.into_iter().try_fold(Capabilities::empty(), |acc, n| {
            Capabilities::from_config_name(n.as_ref())
                .map(|c| acc | c)
                .ok_or_else(|| ProfileError::UnknownCapability(n.as_ref().to_string()))
        })
    }
}

/// Mutation technique, in rough order of fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Select, then write the selected-text attribute.
    DirectAttributeReplace,
    /// Select, put the replacement on the clipboard, paste, restore clipboard.
    ClipboardPaste,
    /// Select with synthetic arrow keys from the buffer start, then paste.
    KeystrokeNavigation,
    /// Select, then type the replacement character by character.
    CharacterInjection,
}

impl Strategy {
    pub const DEFAULT_CASCADE: [Strategy; 4] = [
        Strategy::DirectAttributeReplace,
        Strategy::ClipboardPaste,
        Strategy::KeystrokeNavigation,
        Strategy::CharacterInjection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::DirectAttributeReplace => "direct_attribute_replace",
            Strategy::ClipboardPaste => "clipboard_paste",
            Strategy::KeystrokeNavigation => "keystroke_navigation",
            Strategy::CharacterInjection => "character_injection",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "direct_attribute_replace" | "direct" => Some(Strategy::DirectAttributeReplace),
            "clipboard_paste" | "paste" => Some(Strategy::ClipboardPaste),
            "keystroke_navigation" | "keystrokes" => Some(Strategy::KeystrokeNavigation),
            "character_injection" | "inject" => Some(Strategy::CharacterInjection),
            _ => None,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("unknown capability `{0}`")]
    UnknownCapability(String),
    #[error("unknown strategy `{0}`")]
    UnknownStrategy(String),
    #[error("profile `{0}` has an empty strategy cascade")]
    EmptyCascade(String),
    #[error("profile `{0}` declares both utf16 and grapheme offsets")]
    ConflictingEncodings(String),
}

pub type Cascade = SmallVec<[Strategy; 4]>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyProfile {
    pub host: HostIdentity,
    pub capabilities: Capabilities,
    cascade: Cascade,
    /// Overrides the configured per-strategy timeout for this host.
    pub strategy_timeout: Option<Duration>,
}

impl StrategyProfile {
    pub fn new(
        host: HostIdentity,
        capabilities: Capabilities,
        cascade: impl IntoIterator<Item = Strategy>,
    ) -> Result<Self, ProfileError> {
        if capabilities
            .contains(Capabilities::UTF16_OFFSETS | Capabilities::GRAPHEME_OFFSETS)
        {
            return Err(ProfileError::ConflictingEncodings(host.to_string()));
        }
        let mut ordered: Cascade = SmallVec::new();
        for s in cascade {
            if !ordered.contains(&s) {
                ordered.push(s);
            }
        }
        if ordered.is_empty() {
            return Err(ProfileError::EmptyCascade(host.to_string()));
        }
        Ok(Self {
            host,
            capabilities,
            cascade: ordered,
            strategy_timeout: None,
        })
    }

    /// Conservative profile for hosts nobody described: scalar offsets,
    /// read-back verification, every strategy except direct attribute edit.
    pub fn generic(host: HostIdentity) -> Self {
        Self {
            host,
            capabilities: Capabilities::READ_BACK,
            cascade: SmallVec::from_slice(&Strategy::DEFAULT_CASCADE),
            strategy_timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.strategy_timeout = Some(timeout);
        self
    }

    pub fn has(&self, cap: Capabilities) -> bool {
        self.capabilities.contains(cap)
    }

    pub fn offset_encoding(&self) -> Encoding {
        if self.has(Capabilities::UTF16_OFFSETS) {
            Encoding::Utf16Unit
        } else if self.has(Capabilities::GRAPHEME_OFFSETS) {
            Encoding::GraphemeCluster
        } else {
            Encoding::UnicodeScalar
        }
    }

    /// Strategies this host can actually run, in profile order.
    pub fn cascade(&self) -> Cascade {
        self.cascade
            .iter()
            .copied()
            .filter(|s| {
                *s != Strategy::DirectAttributeReplace
                    || self.has(Capabilities::DIRECT_ATTRIBUTE_EDIT)
            })
            .collect()
    }
}

/// Host identity → profile lookup with a generic fallback.
#[derive(Debug, Default, Clone)]
pub struct ProfileRegistry {
    profiles: HashMap<HostIdentity, StrategyProfile>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, profile: StrategyProfile) -> Option<StrategyProfile> {
        self.profiles.insert(profile.host.clone(), profile)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn lookup(&self, host: &HostIdentity) -> StrategyProfile {
        match self.profiles.get(host) {
            Some(p) => p.clone(),
            None => {
                debug!(target: "host", host = host.as_str(), "profile_fallback_generic");
                StrategyProfile::generic(host.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn capability_names_parse_and_reject_unknown() {
        let caps = Capabilities::from_names(["read-back", "UTF16_offsets"]).unwrap();
        assert_eq!(caps, Capabilities::READ_BACK | Capabilities::UTF16_OFFSETS);
        assert_eq!(
            Capabilities::from_names(["teleport"]).unwrap_err(),
            ProfileError::UnknownCapability("teleport".into())
        );
    }

    #[test]
    fn config_names_are_looser_than_flag_names() {
        assert_eq!(
            Capabilities::from_config_name(" Read-Back "),
            Some(Capabilities::READ_BACK)
        );
        assert_eq!(Capabilities::from_name("READ_BACK"), Some(Capabilities::READ_BACK));
        assert_eq!(Capabilities::from_name("read-back"), None);
    }

    #[test]
    fn direct_edit_filtered_without_capability() {
        let host = HostIdentity::new("notes");
        let p = StrategyProfile::new(host.clone(), Capabilities::empty(), Strategy::DEFAULT_CASCADE)
            .unwrap();
        assert_eq!(p.cascade().first(), Some(&Strategy::ClipboardPaste));
        let p = StrategyProfile::new(host, Capabilities::DIRECT_ATTRIBUTE_EDIT, Strategy::DEFAULT_CASCADE)
            .unwrap();
        assert_eq!(p.cascade().len(), 4);
    }

    #[test]
    fn duplicate_strategies_collapse_and_empty_is_rejected() {
        let host = HostIdentity::new("x");
        let p = StrategyProfile::new(
            host.clone(),
            Capabilities::empty(),
            [Strategy::ClipboardPaste, Strategy::ClipboardPaste, Strategy::CharacterInjection],
        )
        .unwrap();
        assert_eq!(p.cascade().as_slice(), &[Strategy::ClipboardPaste, Strategy::CharacterInjection]);
        assert!(StrategyProfile::new(host, Capabilities::empty(), []).is_err());
    }

    #[test]
    fn encoding_follows_flags() {
        let host = HostIdentity::new("x");
        let p = StrategyProfile::new(host.clone(), Capabilities::UTF16_OFFSETS, [Strategy::ClipboardPaste]).unwrap();
        assert_eq!(p.offset_encoding(), Encoding::Utf16Unit);
        assert!(
            StrategyProfile::new(
                host,
                Capabilities::UTF16_OFFSETS | Capabilities::GRAPHEME_OFFSETS,
                [Strategy::ClipboardPaste]
            )
            .is_err()
        );
    }

    #[test]
    fn registry_falls_back_to_generic() {
        let mut reg = ProfileRegistry::new();
        let slack = HostIdentity::new("slack");
        reg.insert(
            StrategyProfile::new(slack.clone(), Capabilities::UNRELIABLE_SELECTION, [Strategy::KeystrokeNavigation])
                .unwrap(),
        );
        assert!(reg.lookup(&slack).has(Capabilities::UNRELIABLE_SELECTION));
        let other = reg.lookup(&HostIdentity::new("unknown"));
        assert_eq!(other.capabilities, Capabilities::READ_BACK);
    }
}
