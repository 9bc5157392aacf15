//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Default feature requests (camera, AI feedback, audio)
//! - Session defaults (pattern, target cycles, mobile interface)
//! - Remote sync settings
//! - Custom breathing patterns
//!
//! Configuration is stored at `~/.config/breathflow/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;
use crate::features::FeatureRequest;
use crate::pattern::{BreathingPattern, PatternLibrary};
use crate::store::StoreOptions;

/// Features requested when the caller does not say otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureDefaults {
    #[serde(default)]
    pub camera: bool,
    #[serde(default)]
    pub ai: bool,
    #[serde(default = "default_true")]
    pub audio: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDefaults {
    #[serde(default = "default_pattern_id")]
    pub pattern_id: String,
    /// 0 runs until stopped.
    #[serde(default = "default_target_cycles")]
    pub target_cycles: u32,
    #[serde(default)]
    pub allow_mobile: bool,
}

/// Remote sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the remote session store. Sync is off when unset.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/breathflow/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub features: FeatureDefaults,
    #[serde(default)]
    pub session: SessionDefaults,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub custom_patterns: Vec<BreathingPattern>,
}

// Default functions
fn default_true() -> bool {
    true
}

fn default_pattern_id() -> String {
    "box".into()
}

fn default_target_cycles() -> u32 {
    10
}

fn default_interval_secs() -> u64 {
    30
}

fn default_batch_size() -> u32 {
    25
}

fn default_max_attempts() -> u32 {
    5
}

impl Default for FeatureDefaults {
    fn default() -> Self {
        Self {
            camera: false,
            ai: false,
            audio: true,
        }
    }
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            pattern_id: default_pattern_id(),
            target_cycles: default_target_cycles(),
            allow_mobile: false,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            interval_secs: default_interval_secs(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        if key.is_empty() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut parts = key.split('.').peekable();
        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => value
                        .parse::<u64>()
                        .map(|n| serde_json::Value::Number(n.into()))
                        .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?,
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    // An empty value clears a string, set or not. Required
                    // strings then fail to deserialize in `apply`.
                    serde_json::Value::String(_) | serde_json::Value::Null if value.is_empty() => {
                        serde_json::Value::Null
                    }
                    serde_json::Value::String(_) | serde_json::Value::Null => {
                        serde_json::Value::String(value.into())
                    }
                };
                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        }

        Err(ConfigError::UnknownKey(key.to_string()))
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Update a value in memory by dot-separated key and validate the result.
    /// Nothing changes when the update is rejected.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Set a config value by key and save. Returns error if key is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(endpoint) = &self.sync.endpoint {
            let parsed = url::Url::parse(endpoint).map_err(|e| ConfigError::InvalidValue {
                key: "sync.endpoint".into(),
                message: e.to_string(),
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidValue {
                    key: "sync.endpoint".into(),
                    message: format!("unsupported scheme '{}'", parsed.scheme()),
                });
            }
        }
        if self.sync.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "sync.batch_size".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.sync.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "sync.max_attempts".into(),
                message: "must be at least 1".into(),
            });
        }
        for (i, pattern) in self.custom_patterns.iter().enumerate() {
            pattern.validate().map_err(|e| ConfigError::InvalidValue {
                key: format!("custom_patterns[{i}]"),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Built-in patterns plus any custom ones (custom wins on id clash).
    pub fn pattern_library(&self) -> PatternLibrary {
        PatternLibrary::with_custom(self.custom_patterns.iter().cloned())
    }

    pub fn feature_request(&self) -> FeatureRequest {
        FeatureRequest {
            camera: self.features.camera,
            ai: self.features.ai,
            audio: self.features.audio,
        }
    }

    pub fn target_cycles(&self) -> Option<u32> {
        (self.session.target_cycles > 0).then_some(self.session.target_cycles)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            batch_size: self.sync.batch_size as usize,
            max_attempts: self.sync.max_attempts,
        }
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "using default configuration");
            Self::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{Phase, PhaseName};

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert!(parsed.features.audio);
        assert_eq!(parsed.session.pattern_id, "box");
        assert!(parsed.sync.endpoint.is_none());
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("features.camera").as_deref(), Some("false"));
        assert_eq!(cfg.get("sync.batch_size").as_deref(), Some("25"));
        assert_eq!(cfg.get("session.pattern_id").as_deref(), Some("box"));
        assert!(cfg.get("sync.missing_key").is_none());
    }

    #[test]
    fn apply_updates_nested_values() {
        let mut cfg = Config::default();
        cfg.apply("features.camera", "true").unwrap();
        cfg.apply("sync.interval_secs", "120").unwrap();
        cfg.apply("session.pattern_id", "478").unwrap();
        assert!(cfg.features.camera);
        assert_eq!(cfg.sync.interval_secs, 120);
        assert_eq!(cfg.session.pattern_id, "478");
    }

    #[test]
    fn apply_sets_and_clears_optional_endpoint() {
        let mut cfg = Config::default();
        cfg.apply("sync.endpoint", "https://api.example.com").unwrap();
        assert_eq!(cfg.sync.endpoint.as_deref(), Some("https://api.example.com"));
        cfg.apply("sync.endpoint", "").unwrap();
        assert!(cfg.sync.endpoint.is_none());
    }

    #[test]
    fn apply_clears_api_key_but_not_required_strings() {
        let mut cfg = Config::default();
        cfg.apply("sync.api_key", "secret").unwrap();
        cfg.apply("sync.api_key", "").unwrap();
        assert!(cfg.sync.api_key.is_none());

        assert!(cfg.apply("session.pattern_id", "").is_err());
        assert_eq!(cfg.session.pattern_id, default_pattern_id());
    }

    #[test]
    fn apply_rejects_invalid_endpoint_without_mutating() {
        let mut cfg = Config::default();
        let err = cfg.apply("sync.endpoint", "ftp://example.com").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert!(cfg.sync.endpoint.is_none());
    }

    #[test]
    fn apply_rejects_unknown_key() {
        let mut cfg = Config::default();
        let err = cfg.apply("sync.nonexistent_key", "value").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(_)));
    }

    #[test]
    fn apply_rejects_invalid_type() {
        let mut cfg = Config::default();
        assert!(cfg.apply("features.camera", "not_a_bool").is_err());
        assert!(cfg.apply("sync.batch_size", "many").is_err());
        assert!(cfg.apply("sync.batch_size", "0").is_err());
    }

    #[test]
    fn custom_patterns_parse_from_toml() {
        let toml_str = r#"
            [session]
            pattern_id = "slow"

            [[custom_patterns]]
            id = "slow"
            name = "Slow Box"

            [[custom_patterns.phases]]
            name = "inhale"
            duration_ms = 6000

            [[custom_patterns.phases]]
            name = "exhale"
            duration_ms = 6000
        "#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        cfg.validate().unwrap();
        let library = cfg.pattern_library();
        let pattern = crate::pattern::PatternSource::pattern(&library, "slow").unwrap();
        assert_eq!(pattern.cycle_duration_ms(), 12_000);
        assert_eq!(cfg.sync.batch_size, 25);
    }

    #[test]
    fn invalid_custom_pattern_fails_validation() {
        let mut cfg = Config::default();
        cfg.custom_patterns.push(BreathingPattern::new(
            "broken",
            "Broken",
            vec![Phase::new(PhaseName::Inhale, 0)],
        ));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_from_missing_file_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.session.target_cycles, 10);
        assert!(path.exists());
    }

    #[test]
    fn zero_target_means_unbounded() {
        let mut cfg = Config::default();
        assert_eq!(cfg.target_cycles(), Some(10));
        cfg.session.target_cycles = 0;
        assert_eq!(cfg.target_cycles(), None);
    }
}
