//! Configuration management for Benkyo.
//!
//! Handles loading, saving, and validating configuration from
//! platform-specific config directories.

use crate::artifact::{BookType, ProcessingMode};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application name used for config directory.
const APP_NAME: &str = "Benkyo";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Placeholder value for unconfigured API keys.
const API_KEY_PLACEHOLDER: &str = "YOUR_API_KEY_HERE";

/// Generation temperature used when the config leaves it unset.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// AI backend configuration.
    pub api: ApiConfig,

    /// Chapter extraction and generation options.
    pub processing: ProcessingConfig,

    /// Generation pacing settings.
    pub generation: GenerationConfig,

    /// File paths.
    pub paths: PathsConfig,
}

/// Which backend provider shape to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Single combined prompt + temperature, Google REST API.
    #[default]
    Gemini,
    /// Chat-completions message list, OpenAI-compatible API.
    OpenAi,
}

/// API configuration for the generative backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Backend provider.
    pub provider: Provider,

    /// API key (required).
    pub key: String,

    /// Base URL override; each provider has a sensible default.
    pub base_url: Option<String>,

    /// Model identifier override.
    pub model: Option<String>,

    /// Sampling temperature, passed through to the backend unchanged.
    pub temperature: Option<f32>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            key: API_KEY_PLACEHOLDER.to_string(),
            base_url: None,
            model: None,
            temperature: None,
        }
    }
}

impl ApiConfig {
    /// Checks if the API key is configured (not placeholder).
    pub fn is_configured(&self) -> bool {
        !self.key.is_empty() && self.key != API_KEY_PLACEHOLDER
    }

    /// Effective base URL for the configured provider.
    pub fn endpoint_base(&self) -> &str {
        if let Some(ref url) = self.base_url {
            return url.trim_end_matches('/');
        }
        match self.provider {
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Provider::OpenAi => "https://api.openai.com/v1",
        }
    }

    /// Effective model identifier for the configured provider.
    pub fn effective_model(&self) -> &str {
        if let Some(ref model) = self.model {
            return model;
        }
        match self.provider {
            Provider::Gemini => "gemini-1.5-flash",
            Provider::OpenAi => "gpt-4o-mini",
        }
    }

    /// Effective sampling temperature.
    pub fn effective_temperature(&self) -> f32 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }
}

/// Chapter extraction and generation options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Which artifact to produce.
    pub mode: ProcessingMode,

    /// Narrative vs expository summary template.
    pub book_type: BookType,

    /// Descend into nested structural entries instead of flat top-level extraction.
    pub use_smart_detection: bool,

    /// Drop front matter, indexes and similar non-essential chapters.
    pub skip_non_essential_chapters: bool,

    /// Extra nesting levels to descend under smart detection (0 = top-level only).
    pub max_sub_chapter_depth: u32,

    /// Language the backend is instructed to respond in.
    pub output_language: String,

    /// Extra directive appended verbatim to every prompt when non-empty.
    pub custom_instructions: String,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            mode: ProcessingMode::default(),
            book_type: BookType::default(),
            use_smart_detection: false,
            skip_non_essential_chapters: true,
            max_sub_chapter_depth: 0,
            output_language: "English".to_string(),
            custom_instructions: String::new(),
        }
    }
}

/// Generation pacing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Delay between backend requests in seconds.
    pub delay_between_requests_sec: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            delay_between_requests_sec: 0.0,
        }
    }
}

/// File path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory exported files are written to.
    pub output_directory: PathBuf,

    /// Directory for cached artifacts; defaults to a subdirectory of the config dir.
    pub cache_directory: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("."),
            cache_directory: None,
        }
    }
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from the default location.
    ///
    /// If the config file doesn't exist, creates a default one.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.api.is_configured() {
            return Err(ConfigError::MissingValue(
                "api.key (set your API key in config file)".to_string(),
            ));
        }

        if let Some(temperature) = self.api.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            return Err(ConfigError::InvalidValue {
                key: "api.temperature".to_string(),
                message: "must be between 0.0 and 2.0".to_string(),
            });
        }

        if self.processing.max_sub_chapter_depth > 8 {
            return Err(ConfigError::InvalidValue {
                key: "processing.max_sub_chapter_depth".to_string(),
                message: "must be at most 8".to_string(),
            });
        }

        if self.processing.output_language.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "processing.output_language".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Returns the effective cache directory, using config or default.
    pub fn cache_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref dir) = self.paths.cache_directory {
            Ok(dir.clone())
        } else {
            Ok(Self::config_dir()?.join("cache"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.api.is_configured());
        assert_eq!(config.api.provider, Provider::Gemini);
        assert_eq!(config.processing.mode, ProcessingMode::Mindmap);
        assert!(config.processing.skip_non_essential_chapters);
        assert_eq!(config.processing.max_sub_chapter_depth, 0);
    }

    #[test]
    fn test_api_configured_check() {
        let mut api = ApiConfig::default();
        assert!(!api.is_configured());

        api.key = "sk-real-key".to_string();
        assert!(api.is_configured());
    }

    #[test]
    fn test_provider_defaults() {
        let mut api = ApiConfig::default();
        assert_eq!(api.effective_model(), "gemini-1.5-flash");
        assert!(api.endpoint_base().contains("generativelanguage"));
        assert_eq!(api.effective_temperature(), DEFAULT_TEMPERATURE);

        api.provider = Provider::OpenAi;
        api.base_url = Some("https://proxy.example.com/v1/".to_string());
        api.temperature = Some(0.2);
        assert_eq!(api.effective_model(), "gpt-4o-mini");
        assert_eq!(api.endpoint_base(), "https://proxy.example.com/v1");
        assert_eq!(api.effective_temperature(), 0.2);
    }

    #[test]
    fn test_config_round_trip() {
        let mut config = Config::default();
        config.processing.mode = ProcessingMode::Quiz;
        config.processing.output_language = "French".to_string();
        let file = NamedTempFile::new().unwrap();

        config.save_to(file.path()).unwrap();

        let loaded = Config::load_from(file.path()).unwrap();
        assert_eq!(loaded.processing.mode, ProcessingMode::Quiz);
        assert_eq!(loaded.processing.output_language, "French");
        assert_eq!(loaded.api.key, API_KEY_PLACEHOLDER);
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_err()); // API key not set

        let mut config = Config::default();
        config.api.key = "real-key".to_string();
        assert!(config.validate().is_ok());

        config.api.temperature = Some(3.5);
        assert!(config.validate().is_err());

        config.api.temperature = None;
        config.processing.max_sub_chapter_depth = 20;
        assert!(config.validate().is_err());
    }
}
