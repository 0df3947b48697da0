//! Cache keys. Every input that changes the cached value is part of the key;
//! raw offsets never are.

use std::fmt;
use std::sync::Arc;

/// Keys that can be invalidated by the content hash they were derived from.
pub trait ContentKeyed {
    fn content_hash(&self) -> u64;
}

/// Analysis results depend on the text and the active analysis profile
/// (dialect, enabled word lists, rule set), which callers fold into `profile`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnalysisKey {
    pub content_hash: u64,
    pub profile: Arc<str>,
}

impl AnalysisKey {
    pub fn new(content_hash: u64, profile: impl Into<Arc<str>>) -> Self {
        Self {
            content_hash,
            profile: profile.into(),
        }
    }
}

impl ContentKeyed for AnalysisKey {
    fn content_hash(&self) -> u64 {
        self.content_hash
    }
}

/// Rewrite tone requested from the suggestion model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StyleTemplate {
    #[default]
    Default,
    Formal,
    Informal,
    Business,
    Concise,
}

impl StyleTemplate {
    pub const ALL: [StyleTemplate; 5] = [
        StyleTemplate::Default,
        StyleTemplate::Formal,
        StyleTemplate::Informal,
        StyleTemplate::Business,
        StyleTemplate::Concise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StyleTemplate::Default => "default",
            StyleTemplate::Formal => "formal",
            StyleTemplate::Informal => "informal",
            StyleTemplate::Business => "business",
            StyleTemplate::Concise => "concise",
        }
    }

    /// Case-insensitive; `casual` is accepted for `Informal`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Some(StyleTemplate::Default),
            "formal" => Some(StyleTemplate::Formal),
            "informal" | "casual" => Some(StyleTemplate::Informal),
            "business" => Some(StyleTemplate::Business),
            "concise" => Some(StyleTemplate::Concise),
            _ => None,
        }
    }
}

impl fmt::Display for StyleTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Suggestions depend on the text, the requested style and the model that
/// produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SuggestionKey {
    pub content_hash: u64,
    pub style: StyleTemplate,
    pub model: Arc<str>,
}

impl SuggestionKey {
    pub fn new(content_hash: u64, style: StyleTemplate, model: impl Into<Arc<str>>) -> Self {
        Self {
            content_hash,
            style,
            model: model.into(),
        }
    }
}

impl ContentKeyed for SuggestionKey {
    fn content_hash(&self) -> u64 {
        self.content_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_parse_is_case_insensitive_with_alias() {
        assert_eq!(StyleTemplate::parse("FORMAL"), Some(StyleTemplate::Formal));
        assert_eq!(StyleTemplate::parse("Casual"), Some(StyleTemplate::Informal));
        assert_eq!(StyleTemplate::parse("poetic"), None);
        for s in StyleTemplate::ALL {
            assert_eq!(StyleTemplate::parse(s.as_str()), Some(s));
        }
    }

    #[test]
    fn keys_differ_by_every_input() {
        let a = SuggestionKey::new(1, StyleTemplate::Formal, "small");
        assert_ne!(a, SuggestionKey::new(2, StyleTemplate::Formal, "small"));
        assert_ne!(a, SuggestionKey::new(1, StyleTemplate::Concise, "small"));
        assert_ne!(a, SuggestionKey::new(1, StyleTemplate::Formal, "large"));
        assert_ne!(AnalysisKey::new(1, "en-US"), AnalysisKey::new(1, "en-GB"));
    }
}
