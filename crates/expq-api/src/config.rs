//! Server configuration: defaults, then an optional YAML file, then env.
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_PATH_VAR: &str = "EXPQ_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("CONFIG/io: {0}")]
    Io(String),

    #[error("CONFIG/yaml: {0}")]
    Yaml(String),

    #[error("CONFIG/invalid: {key}={value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub addr: String,
    pub max_input_chars: usize,
    pub llm_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub llm_requests_per_minute: usize,
    /// JSON array of expense records loaded into the in-memory store
    pub seed_path: Option<String>,
    pub known_categories: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8787".to_string(),
            max_input_chars: 2000,
            llm_timeout_ms: 30_000,
            request_timeout_ms: 45_000,
            llm_requests_per_minute: 30,
            seed_path: None,
            known_categories: None,
        }
    }
}

impl Config {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load with an injectable variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(CONFIG_PATH_VAR) {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        config.apply_env(lookup)?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Yaml(e.to_string()))
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("EXPQ_ADDR") {
            self.addr = addr;
        }
        if let Some(v) = lookup("EXPQ_MAX_INPUT_CHARS") {
            self.max_input_chars = parse("EXPQ_MAX_INPUT_CHARS", &v)?;
        }
        if let Some(v) = lookup("EXPQ_LLM_TIMEOUT_MS") {
            self.llm_timeout_ms = parse("EXPQ_LLM_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("EXPQ_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = parse("EXPQ_REQUEST_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("EXPQ_LLM_REQUESTS_PER_MINUTE") {
            self.llm_requests_per_minute = parse("EXPQ_LLM_REQUESTS_PER_MINUTE", &v)?;
        }
        if let Some(path) = lookup("EXPQ_SEED_PATH").filter(|p| !p.trim().is_empty()) {
            self.seed_path = Some(path);
        }
        if let Some(list) = lookup("EXPQ_KNOWN_CATEGORIES") {
            let categories: Vec<String> = list
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            self.known_categories = (!categories.is_empty()).then_some(categories);
        }
        Ok(())
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_millis(self.llm_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}
