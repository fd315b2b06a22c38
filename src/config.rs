use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::pacing::Pacing;

pub const CONFIG_PATH_ENV: &str = "STORY_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "openai_api_key", default)]
    pub openai_key: String,
    #[serde(default = "default_model")]
    pub openai_model: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_inter_set_delay_ms")]
    pub inter_set_delay_ms: u64,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_temperature() -> f32 {
    0.8
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_inter_set_delay_ms() -> u64 {
    2_000
}

fn default_retry_base_delay_ms() -> u64 {
    2_000
}

fn default_retry_max_delay_ms() -> u64 {
    60_000
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        let mut config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.as_ref().display()))?;

        if config.openai_key.is_empty() {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                config.openai_key = key;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads from `$STORY_CONFIG`, falling back to `config.json`.
    pub async fn load_default() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(path).await
    }

    pub fn validate(&self) -> Result<()> {
        if self.openai_key.is_empty() {
            anyhow::bail!("config: openai_api_key missing (or set OPENAI_API_KEY)");
        }
        if self.openai_base_url.is_empty() {
            anyhow::bail!("config: openai_base_url must not be empty");
        }
        if self.max_tokens == 0 {
            anyhow::bail!("config: max_tokens must be at least 1");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("config: request_timeout_secs must be at least 1");
        }
        Ok(())
    }

    pub fn pacing(&self) -> Pacing {
        Pacing {
            inter_set_delay: Duration::from_millis(self.inter_set_delay_ms),
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            retry_max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
