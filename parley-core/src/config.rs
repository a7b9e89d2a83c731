// Process-wide configuration for the interview client

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Streaming quality requested from the avatar provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    Medium,
    High,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
        }
    }
}

/// Interview difficulty shown in the settings menu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        };
        f.write_str(label)
    }
}

/// Colour theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

/// Where and how to reach the avatar provider.
///
/// `base_url` points at the credential mediator, never at the provider
/// itself: the client holds no API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub avatar_id: String,
    pub voice_id: String,
    pub quality: Quality,
    pub request_timeout_secs: u64,
    /// How long to wait for the first media frame after negotiation
    pub first_frame_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8790/api/avatar".to_string(),
            avatar_id: "June_HR_public".to_string(),
            voice_id: "2d5b0e6cf36f460aa7fc47e3eee4ba54".to_string(),
            quality: Quality::High,
            request_timeout_secs: 30,
            first_frame_timeout_secs: 10,
        }
    }
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn first_frame_timeout(&self) -> Duration {
        Duration::from_secs(self.first_frame_timeout_secs)
    }
}

/// Render job polling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_ms: u64,
    pub max_attempts: u32,
    /// Poll until a terminal status instead of giving up after `max_attempts`
    pub unbounded: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            max_attempts: 12,
            unbounded: false,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Finished-clip rendering options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipConfig {
    pub width: u32,
    pub height: u32,
    pub background: String,
    pub avatar_style: String,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            background: "#008000".to_string(),
            avatar_style: "normal".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterviewConfig {
    pub language: String,
    pub difficulty: Difficulty,
    pub duration_minutes: u32,
    pub greeting: String,
}

impl Default for InterviewConfig {
    fn default() -> Self {
        Self {
            language: "English".to_string(),
            difficulty: Difficulty::Medium,
            duration_minutes: 30,
            greeting: "Hello! I'm your AI interviewer today. Let's begin with your introduction. \
                       Please tell me about yourself and your background."
                .to_string(),
        }
    }
}

impl InterviewConfig {
    /// How long the candidate has before the interview ends
    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(u64::from(self.duration_minutes) * 60)
    }

    /// One-line settings banner shown before the interview starts
    pub fn summary(&self) -> String {
        format!(
            "Language: {} | Difficulty: {} | Duration: {} mins",
            self.language, self.difficulty, self.duration_minutes
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub theme: Theme,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self { theme: Theme::Light }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./parley-data".to_string(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    pub provider: ProviderConfig,
    pub poll: PollConfig,
    pub clip: ClipConfig,
    pub interview: InterviewConfig,
    pub ui: UiConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
}

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

impl ParleyConfig {
    /// Load configuration from file (JSON, TOML or YAML)
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path, e)))?;
        Self::from_str(&content)
    }

    /// Load configuration from string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        if let Ok(config) = serde_json::from_str::<ParleyConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = toml::from_str::<ParleyConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = serde_yaml::from_str::<ParleyConfig>(content) {
            return Ok(config);
        }

        Err(ConfigError::ParseError("Unknown format".to_string()))
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay environment variables onto this configuration
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("PARLEY_PROVIDER_URL") {
            self.provider.base_url = url;
        }

        if let Ok(avatar_id) = std::env::var("PARLEY_AVATAR_ID") {
            self.provider.avatar_id = avatar_id;
        }

        if let Ok(voice_id) = std::env::var("PARLEY_VOICE_ID") {
            self.provider.voice_id = voice_id;
        }

        if let Ok(level) = std::env::var("PARLEY_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(data_dir) = std::env::var("PARLEY_DATA_DIR") {
            self.storage.data_dir = data_dir;
        }
    }

    /// Merge with another configuration (other takes precedence)
    pub fn merge(&mut self, other: ParleyConfig) {
        self.provider = other.provider;
        self.poll = other.poll;
        self.clip = other.clip;
        self.interview = other.interview;
        self.ui = other.ui;
        self.logging = other.logging;
        self.storage = other.storage;
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.provider.base_url.trim();
        if base_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "provider.base_url cannot be empty".to_string(),
            ));
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::ValidationError(
                "provider.base_url must be an http(s) URL".to_string(),
            ));
        }

        validate_identifier("provider.avatar_id", &self.provider.avatar_id)?;
        validate_identifier("provider.voice_id", &self.provider.voice_id)?;

        if self.provider.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "provider.request_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.poll.interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "poll.interval_ms must be > 0".to_string(),
            ));
        }
        if !self.poll.unbounded && self.poll.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "poll.max_attempts must be > 0 unless polling is unbounded".to_string(),
            ));
        }

        if self.clip.width == 0 || self.clip.height == 0 {
            return Err(ConfigError::ValidationError(
                "clip dimensions must be non-zero".to_string(),
            ));
        }

        if self.interview.greeting.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "interview.greeting cannot be empty".to_string(),
            ));
        }
        if self.interview.duration_minutes == 0 {
            return Err(ConfigError::ValidationError(
                "interview.duration_minutes must be > 0".to_string(),
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.level must be one of {:?}",
                LOG_LEVELS
            )));
        }

        Ok(())
    }
}

fn validate_identifier(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::ValidationError(format!("{} cannot be empty", field)));
    }
    if value.len() > 256 {
        return Err(ConfigError::ValidationError(format!(
            "{} too long (max 256 chars)",
            field
        )));
    }
    if value.chars().any(|c| c.is_control()) {
        return Err(ConfigError::ValidationError(format!(
            "{} contains invalid characters",
            field
        )));
    }
    Ok(())
}

#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Parse error: {}", e),
            ConfigError::ValidationError(e) => write!(f, "Validation error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Configuration(err.to_string())
    }
}
