// Mediator configuration: optional file plus PARLEY_* environment

use crate::error::MediatorError;
use parley_core::config::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    /// Provider credential. Only ever read from the environment or the
    /// mediator's own config file; never serialized back out.
    #[serde(skip_serializing)]
    pub api_key: String,
    pub api_key_header: String,
    pub timeout_secs: u64,
    /// Largest upstream body relayed back to the client
    pub max_response_bytes: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.heygen.com".to_string(),
            api_key: String::new(),
            api_key_header: "X-Api-Key".to_string(),
            timeout_secs: 30,
            max_response_bytes: 16 * 1024 * 1024,
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed browser origins; empty means any origin
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediatorConfig {
    pub listen: String,
    /// Path prefix the provider API is mounted under
    pub mount: String,
    pub upstream: UpstreamConfig,
    pub cors: CorsConfig,
    pub logging: LoggingConfig,
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8790".to_string(),
            mount: "/api/avatar".to_string(),
            upstream: UpstreamConfig::default(),
            cors: CorsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl MediatorConfig {
    /// Layer the config file (if any) and `PARLEY_` environment variables
    /// over the defaults. `PARLEY_UPSTREAM__API_KEY` sets the credential.
    pub fn load(path: Option<&str>) -> Result<Self, MediatorError> {
        let file = match path {
            Some(p) => config::File::with_name(p).required(true),
            None => config::File::with_name("parley-server").required(false),
        };

        config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix("PARLEY").separator("__"))
            .build()
            .and_then(|settings| settings.try_deserialize::<MediatorConfig>())
            .map_err(|e| MediatorError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), MediatorError> {
        let upstream = url::Url::parse(&self.upstream.base_url)
            .map_err(|e| MediatorError::Config(format!("upstream.base_url: {}", e)))?;
        if !matches!(upstream.scheme(), "http" | "https") {
            return Err(MediatorError::Config(
                "upstream.base_url must be an http(s) URL".to_string(),
            ));
        }

        let key = &self.upstream.api_key;
        if key.is_empty() {
            return Err(MediatorError::Config(
                "upstream API key missing (set PARLEY_UPSTREAM__API_KEY)".to_string(),
            ));
        }
        if key.len() > 512 || key.chars().any(|c| c.is_control()) {
            return Err(MediatorError::Config("invalid upstream API key".to_string()));
        }

        if axum::http::HeaderName::from_bytes(self.upstream.api_key_header.as_bytes()).is_err() {
            return Err(MediatorError::Config(format!(
                "invalid API key header name: {}",
                self.upstream.api_key_header
            )));
        }

        if !self.mount.starts_with('/') || self.mount.ends_with('/') {
            return Err(MediatorError::Config(
                "mount must start with '/' and not end with one".to_string(),
            ));
        }

        if self.upstream.timeout_secs == 0 {
            return Err(MediatorError::Config(
                "upstream.timeout_secs must be > 0".to_string(),
            ));
        }

        if self.upstream.max_response_bytes == 0 {
            return Err(MediatorError::Config(
                "upstream.max_response_bytes must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
