//! Configuration loading and parsing.
//!
//! Parses `mend.toml` (or an override path provided by the binary). Every
//! section and field is optional; absent values take the defaults below.
//! Unknown fields are ignored so older binaries tolerate newer files. A file
//! that fails to parse is reported at warn and replaced by defaults: a bad
//! config must never stop annotations from working.
//!
//! ```toml
//! [diff]
//! large_edit_threshold = 1000
//!
//! [cache.analysis]
//! max_entries = 64
//! max_age_secs = 300
//!
//! [replacement]
//! strategy_timeout_ms = 1500
//! settle_delay_ms = 150
//! grace_period_ms = 400
//!
//! [[profiles]]
//! host = "com.example.chat"
//! strategies = ["keystroke_navigation", "character_injection"]
//! capabilities = ["utf16_offsets", "unreliable_selection"]
//! strategy_timeout_ms = 3000
//! ```

use anyhow::Result;
use core_cache::{CachePolicy, StyleTemplate};
use core_host::{Capabilities, ProfileError, ProfileRegistry, Strategy, StrategyProfile};
use core_text::HostIdentity;
use serde::Deserialize;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::{info, warn};

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct DiffConfig {
    /// Removed + inserted scalars above which an edit invalidates everything.
    pub large_edit_threshold: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            large_edit_threshold: 1000,
        }
    }
}

/// One `[cache.*]` table. Omitted fields take the instance's own default.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: Option<usize>,
    pub max_age_secs: Option<u64>,
}

impl CacheConfig {
    pub fn policy(&self, defaults: CachePolicy) -> CachePolicy {
        CachePolicy::new(
            self.max_entries.unwrap_or(defaults.max_entries),
            self.max_age_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_age),
        )
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(default)]
pub struct CacheSection {
    pub analysis: CacheConfig,
    pub suggestion: CacheConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct ReplacementConfig {
    /// Upper bound for one strategy attempt.
    pub strategy_timeout_ms: u64,
    /// Wait before accepting an edit that cannot be read back.
    pub settle_delay_ms: u64,
    /// Re-analysis stays deferred this long after a replacement settles.
    pub grace_period_ms: u64,
}

impl Default for ReplacementConfig {
    fn default() -> Self {
        Self {
            strategy_timeout_ms: 1500,
            settle_delay_ms: 150,
            grace_period_ms: 400,
        }
    }
}

impl ReplacementConfig {
    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_millis(self.strategy_timeout_ms)
    }
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

/// Analysis profile folded into analysis cache keys.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub dialect: String,
    pub wordlists: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            dialect: "en-US".to_string(),
            wordlists: Vec::new(),
        }
    }
}

impl AnalysisConfig {
    /// Stable name covering every field that changes analysis output.
    pub fn profile_name(&self) -> String {
        let mut lists = self.wordlists.clone();
        lists.sort();
        if lists.is_empty() {
            self.dialect.clone()
        } else {
            format!("{}+{}", self.dialect, lists.join(","))
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SuggestionConfig {
    pub style: String,
    pub model: String,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            style: "default".to_string(),
            model: "none".to_string(),
        }
    }
}

impl SuggestionConfig {
    /// Unknown styles fall back to `Default` with a warning.
    pub fn style(&self) -> StyleTemplate {
        StyleTemplate::parse(&self.style).unwrap_or_else(|| {
            warn!(target: "config", style = self.style.as_str(), "unknown_style_template");
            StyleTemplate::Default
        })
    }
}

/// One `[[profiles]]` table.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ProfileConfig {
    pub host: String,
    #[serde(default)]
    pub strategies: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub strategy_timeout_ms: Option<u64>,
}

impl ProfileConfig {
    pub fn to_profile(&self) -> Result<StrategyProfile, ProfileError> {
        let capabilities = Capabilities::from_names(&self.capabilities)?;
        let strategies: Vec<Strategy> = if self.strategies.is_empty() {
            Strategy::DEFAULT_CASCADE.to_vec()
        } else {
            self.strategies
                .iter()
                .map(|s| Strategy::parse(s).ok_or_else(|| ProfileError::UnknownStrategy(s.clone())))
                .collect::<Result<_, _>>()?
        };
        let profile = StrategyProfile::new(HostIdentity::new(&self.host), capabilities, strategies)?;
        Ok(match self.strategy_timeout_ms {
            Some(ms) => profile.with_timeout(Duration::from_millis(ms)),
            None => profile,
        })
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ConfigFile {
    pub diff: DiffConfig,
    pub cache: CacheSection,
    pub replacement: ReplacementConfig,
    pub analysis: AnalysisConfig,
    pub suggestion: SuggestionConfig,
    pub profiles: Vec<ProfileConfig>,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub raw: Option<String>, // original file string (optional)
    pub path: Option<PathBuf>,
    pub file: ConfigFile, // parsed (or default) data
}

/// Best-effort config path: `mend.toml` in the working directory, then the
/// platform config dir (XDG / AppData Roaming).
pub fn discover() -> PathBuf {
    let local = PathBuf::from("mend.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("mend").join("mend.toml");
    }
    PathBuf::from("mend.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    let Ok(content) = fs::read_to_string(&path) else {
        info!(target: "config", path = %path.display(), "config_absent_using_defaults");
        return Ok(Config::default());
    };
    match parse(&content) {
        Ok(file) => {
            info!(target: "config", path = %path.display(), profiles = file.profiles.len(), "config_loaded");
            Ok(Config {
                raw: Some(content),
                path: Some(path),
                file,
            })
        }
        Err(e) => {
            warn!(target: "config", path = %path.display(), error = %e, "config_parse_failed_using_defaults");
            Ok(Config::default())
        }
    }
}

pub fn parse(content: &str) -> Result<ConfigFile> {
    Ok(toml::from_str::<ConfigFile>(content)?)
}

impl Config {
    pub fn analysis_cache(&self) -> CachePolicy {
        self.file.cache.analysis.policy(CachePolicy::analysis())
    }

    pub fn suggestion_cache(&self) -> CachePolicy {
        self.file.cache.suggestion.policy(CachePolicy::suggestion())
    }

    /// Registry of every valid `[[profiles]]` entry. Invalid entries are
    /// skipped with a warning.
    pub fn registry(&self) -> ProfileRegistry {
        let mut registry = ProfileRegistry::new();
        for p in &self.file.profiles {
            match p.to_profile() {
                Ok(profile) => {
                    registry.insert(profile);
                }
                Err(e) => {
                    warn!(target: "config", host = p.host.as_str(), error = %e, "profile_skipped");
                }
            }
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::sync::{Arc, Mutex, MutexGuard};
    use tracing::Level;
    use tracing::subscriber::with_default;
    use tracing_subscriber::fmt::MakeWriter;

    struct BufferWriter {
        inner: Arc<Mutex<Vec<u8>>>,
    }

    impl BufferWriter {
        fn new() -> (Self, Arc<Mutex<Vec<u8>>>) {
            let buf = Arc::new(Mutex::new(Vec::new()));
            (Self { inner: buf.clone() }, buf)
        }
    }

    struct LockedWriter<'a> {
        guard: MutexGuard<'a, Vec<u8>>,
    }

    impl<'a> Write for LockedWriter<'a> {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.guard.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for BufferWriter {
        type Writer = LockedWriter<'a>;

        fn make_writer(&'a self) -> Self::Writer {
            LockedWriter {
                guard: self.inner.lock().expect("log buffer poisoned"),
            }
        }
    }

    #[test]
    fn default_config_when_missing_file() {
        let cfg = load_from(Some(PathBuf::from("__nonexistent_hopefully__.toml"))).unwrap();
        assert_eq!(cfg.file, ConfigFile::default());
        assert_eq!(cfg.file.diff.large_edit_threshold, 1000);
        assert_eq!(cfg.analysis_cache(), CachePolicy::analysis());
        assert_eq!(cfg.suggestion_cache(), CachePolicy::suggestion());
        assert_eq!(cfg.file.replacement.grace_period(), Duration::from_millis(400));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "[cache.analysis]\nmax_entries = 8\nmax_age_secs = 5\n[replacement]\nsettle_delay_ms = 50\n",
        )
        .unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.analysis_cache(), CachePolicy::new(8, Duration::from_secs(5)));
        assert_eq!(cfg.suggestion_cache(), CachePolicy::suggestion());
        assert_eq!(cfg.file.replacement.settle_delay_ms, 50);
        assert_eq!(cfg.file.replacement.strategy_timeout_ms, 1500);
    }

    #[test]
    fn partial_cache_table_keeps_profiles() {
        let file = parse(
            r#"
            [cache.analysis]
            max_entries = 8

            [cache.suggestion]
            max_age_secs = 30

            [[profiles]]
            host = "chat"
            strategies = ["inject"]
            "#,
        )
        .unwrap();
        let cfg = Config {
            file,
            ..Config::default()
        };
        assert_eq!(
            cfg.analysis_cache(),
            CachePolicy::new(8, CachePolicy::analysis().max_age)
        );
        assert_eq!(
            cfg.suggestion_cache(),
            CachePolicy::new(CachePolicy::suggestion().max_entries, Duration::from_secs(30))
        );
        assert_eq!(
            cfg.registry().lookup(&HostIdentity::new("chat")).cascade().to_vec(),
            vec![Strategy::CharacterInjection]
        );
    }

    #[test]
    fn profiles_build_registry_and_skip_invalid() {
        let file = parse(
            r#"
            [[profiles]]
            host = "chat"
            strategies = ["keystroke_navigation", "inject"]
            capabilities = ["utf16_offsets", "unreliable_selection"]
            strategy_timeout_ms = 3000

            [[profiles]]
            host = "broken"
            capabilities = ["levitation"]
            "#,
        )
        .unwrap();
        let cfg = Config {
            file,
            ..Config::default()
        };
        let registry = cfg.registry();
        assert_eq!(registry.len(), 1);
        let chat = registry.lookup(&HostIdentity::new("chat"));
        assert_eq!(
            chat.cascade().as_slice(),
            &[Strategy::KeystrokeNavigation, Strategy::CharacterInjection]
        );
        assert_eq!(chat.strategy_timeout, Some(Duration::from_secs(3)));
        assert!(chat.has(Capabilities::UNRELIABLE_SELECTION));
    }

    #[test]
    fn analysis_profile_name_is_order_independent() {
        let a = AnalysisConfig {
            dialect: "en-GB".into(),
            wordlists: vec!["tech".into(), "names".into()],
        };
        let b = AnalysisConfig {
            dialect: "en-GB".into(),
            wordlists: vec!["names".into(), "tech".into()],
        };
        assert_eq!(a.profile_name(), "en-GB+names,tech");
        assert_eq!(a.profile_name(), b.profile_name());
        assert_eq!(AnalysisConfig::default().profile_name(), "en-US");
    }

    #[test]
    fn parse_error_falls_back_to_defaults_with_warning() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "[diff]\nlarge_edit_threshold = \"many\"\n").unwrap();

        let (writer, buffer) = BufferWriter::new();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_target(true)
            .with_ansi(false)
            .without_time()
            .with_writer(writer)
            .finish();

        let cfg = with_default(subscriber, || load_from(Some(tmp.path().to_path_buf())).unwrap());
        assert_eq!(cfg.file, ConfigFile::default());
        assert!(cfg.raw.is_none());

        let log_output = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(log_output.contains("WARN config:"));
        assert!(log_output.contains("config_parse_failed_using_defaults"));
    }

    #[test]
    fn unknown_style_falls_back() {
        let s = SuggestionConfig {
            style: "Casual".into(),
            model: "m".into(),
        };
        assert_eq!(s.style(), StyleTemplate::Informal);
        let s = SuggestionConfig {
            style: "baroque".into(),
            model: "m".into(),
        };
        assert_eq!(s.style(), StyleTemplate::Default);
    }
}
