//! Runtime configuration.
//!
//! Loaded from YAML, with environment overrides applied last:
//!
//! ```yaml
//! stage_timeouts:
//!   ocr: 60s
//!   qr_scan: 10s
//!   llm: 30s
//! ocr:
//!   binary: tesseract
//!   language: eng
//!   min_confidence: 35
//! qr:
//!   binary: zbarimg
//! llm:
//!   provider: groq
//!   temperature: 0.1
//! storage:
//!   database_path: verification.db
//!   uploads_dir: uploads
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::providers::CompletionConfig;

/// Environment variable holding the LLM API key.
pub const API_KEY_ENV: &str = "GROQ_API_KEY";

/// Environment variable overriding the database path.
pub const DATABASE_PATH_ENV: &str = "DOCVERIFY_DB";

/// Provider types the default registry knows how to build.
pub const KNOWN_PROVIDERS: [&str; 2] = ["groq", "openai"];

/// Model used when `llm.model` is not set, keyed by provider type.
const DEFAULT_MODELS: [(&str, &str); 2] = [
    ("groq", "llama-3.3-70b-versatile"),
    ("openai", "gpt-4o-mini"),
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub stage_timeouts: StageTimeouts,
    pub ocr: OcrConfig,
    pub qr: QrConfig,
    pub llm: LlmConfig,
    pub storage: StorageConfig,
}

/// Upper bound on each external stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTimeouts {
    #[serde(with = "duration_format")]
    pub ocr: Duration,
    #[serde(with = "duration_format")]
    pub qr_scan: Duration,
    #[serde(with = "duration_format")]
    pub llm: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            ocr: Duration::from_secs(60),
            qr_scan: Duration::from_secs(10),
            llm: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Tesseract executable, looked up on PATH when not absolute.
    pub binary: String,
    pub language: String,
    /// Lines shorter than this after trimming are dropped.
    pub min_line_chars: usize,
    /// Words below this tesseract confidence (0-100) are dropped.
    pub min_confidence: f32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            binary: "tesseract".to_string(),
            language: "eng".to_string(),
            min_line_chars: 1,
            min_confidence: 35.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QrConfig {
    pub binary: String,
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            binary: "zbarimg".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Registered provider type.
    pub provider: String,
    /// Defaults per provider when unset.
    pub model: Option<String>,
    /// Left to the provider factory when unset.
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Falls back to `GROQ_API_KEY` when unset.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "groq".to_string(),
            model: None,
            base_url: None,
            temperature: 0.1,
            max_tokens: 800,
            api_key: None,
        }
    }
}

impl LlmConfig {
    /// Provider factory input.
    ///
    /// Only keys that were set are passed, so each factory applies its own
    /// endpoint default.
    pub fn provider_json(&self) -> serde_json::Value {
        let mut config = serde_json::json!({});
        if let Some(url) = &self.base_url {
            config["base_url"] = serde_json::Value::String(url.clone());
        }
        if let Some(key) = &self.api_key {
            config["api_key"] = serde_json::Value::String(key.clone());
        }
        config
    }

    /// Configured model, or the provider's default.
    pub fn model_name(&self) -> &str {
        if let Some(model) = &self.model {
            return model;
        }
        DEFAULT_MODELS
            .iter()
            .find(|(provider, _)| *provider == self.provider)
            .map(|(_, model)| *model)
            .unwrap_or(DEFAULT_MODELS[0].1)
    }

    /// Per-request settings, bounded by the stage timeout.
    pub fn completion_config(&self, timeout: Duration) -> CompletionConfig {
        CompletionConfig {
            model: self.model_name().to_string(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout,
            json_mode: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub uploads_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("verification.db"),
            uploads_dir: PathBuf::from("uploads"),
        }
    }
}

impl RuntimeConfig {
    /// Parse YAML without environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an optional file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_yaml(&yaml)?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var(DATABASE_PATH_ENV) {
            if !path.trim().is_empty() {
                self.storage.database_path = PathBuf::from(path);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeouts = &self.stage_timeouts;
        for (name, value) in [
            ("ocr", timeouts.ocr),
            ("qr_scan", timeouts.qr_scan),
            ("llm", timeouts.llm),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "stage_timeouts.{} must be greater than zero",
                    name
                )));
            }
        }

        if !KNOWN_PROVIDERS.contains(&self.llm.provider.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "llm.provider '{}' is not one of: {}",
                self.llm.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if !(0.0..=100.0).contains(&self.ocr.min_confidence) {
            return Err(ConfigError::Invalid(format!(
                "ocr.min_confidence must be within 0..=100, got {}",
                self.ocr.min_confidence
            )));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Invalid(format!(
                "llm.temperature must be within 0.0..=2.0, got {}",
                self.llm.temperature
            )));
        }

        if let Some(url) = &self.llm.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Invalid(
                    "llm.base_url must start with http:// or https://".to_string(),
                ));
            }
        }

        if self.llm.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(ConfigError::Invalid("llm.model must not be blank".to_string()));
        }

        Ok(())
    }
}

mod duration_format {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.stage_timeouts.ocr, Duration::from_secs(60));
        assert_eq!(config.stage_timeouts.qr_scan, Duration::from_secs(10));
        assert_eq!(config.llm.model_name(), "llama-3.3-70b-versatile");
        assert_eq!(config.storage.database_path, PathBuf::from("verification.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = RuntimeConfig::from_yaml(
            r#"
stage_timeouts:
  llm: 1m 30s
ocr:
  language: eng+hin
"#,
        )
        .unwrap();

        assert_eq!(config.stage_timeouts.llm, Duration::from_secs(90));
        assert_eq!(config.stage_timeouts.ocr, Duration::from_secs(60));
        assert_eq!(config.ocr.language, "eng+hin");
        assert_eq!(config.ocr.binary, "tesseract");
        assert_eq!(config.qr.binary, "zbarimg");
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let err = RuntimeConfig::from_yaml("stage_timeouts:\n  qr_scan: 0s\n").unwrap_err();
        assert!(err.to_string().contains("qr_scan"));
    }

    #[test]
    fn test_rejects_bad_duration() {
        let result = RuntimeConfig::from_yaml("stage_timeouts:\n  ocr: soon\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_rejects_out_of_range_ocr_confidence() {
        let err = RuntimeConfig::from_yaml("ocr:\n  min_confidence: 120\n").unwrap_err();
        assert!(err.to_string().contains("min_confidence"));
        let config = RuntimeConfig::from_yaml("ocr:\n  min_confidence: 60\n").unwrap();
        assert_eq!(config.ocr.min_confidence, 60.0);
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let result = RuntimeConfig::from_yaml("llm:\n  base_url: api.groq.com\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let err = RuntimeConfig::from_yaml("llm:\n  provider: anthropic\n").unwrap_err();
        assert!(err.to_string().contains("anthropic"));
        assert!(RuntimeConfig::from_yaml("llm:\n  provider: openai\n").is_ok());
    }

    #[test]
    fn test_provider_defaults_follow_provider() {
        let config = RuntimeConfig::from_yaml("llm:\n  provider: openai\n").unwrap();
        let provider_json = config.llm.provider_json();
        assert!(provider_json.get("base_url").is_none());
        assert_eq!(config.llm.model_name(), "gpt-4o-mini");
        assert_eq!(
            config.llm.completion_config(Duration::from_secs(5)).model,
            "gpt-4o-mini"
        );
    }

    #[test]
    fn test_explicit_model_and_base_url_win() {
        let config = RuntimeConfig::from_yaml(
            "llm:\n  provider: openai\n  model: gpt-4o\n  base_url: https://proxy.internal/v1\n",
        )
        .unwrap();
        assert_eq!(config.llm.model_name(), "gpt-4o");
        assert_eq!(config.llm.provider_json()["base_url"], "https://proxy.internal/v1");
    }

    #[test]
    fn test_api_key_never_serialized() {
        let mut config = RuntimeConfig::default();
        config.llm.api_key = Some("gsk-secret".to_string());

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("gsk-secret"));
        assert_eq!(config.llm.provider_json()["api_key"], "gsk-secret");
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = RuntimeConfig::load(Some(Path::new("/nonexistent/docverify.yaml")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
