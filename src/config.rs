use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct ExtractionConfig {
    /// Restrict fallback extraction to assistant-authored messages.
    #[serde(default)]
    pub assistant_only: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "OracleConfig::default_endpoint")]
    pub endpoint: String,
    #[serde(default = "OracleConfig::default_model")]
    pub model: String,
    #[serde(default = "OracleConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "OracleConfig::default_temperature")]
    pub temperature: f32,
    #[serde(default = "OracleConfig::default_max_tokens")]
    pub max_tokens: u32,
}

impl OracleConfig {
    fn default_endpoint() -> String {
        "http://localhost:11434".to_string()
    }

    fn default_model() -> String {
        "llama3".to_string()
    }

    fn default_timeout_secs() -> u64 {
        30
    }

    fn default_temperature() -> f32 {
        0.2
    }

    fn default_max_tokens() -> u32 {
        2048
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: Self::default_endpoint(),
            model: Self::default_model(),
            timeout_secs: Self::default_timeout_secs(),
            temperature: Self::default_temperature(),
            max_tokens: Self::default_max_tokens(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?
            .join("convo-highlights");

        let config_path = config_dir.join("config.yaml");

        let config = if config_path.exists() {
            let config_content = fs::read_to_string(&config_path)?;
            serde_yaml::from_str(&config_content)?
        } else {
            // Create default config if it doesn't exist
            fs::create_dir_all(&config_dir)?;
            let default_config = Self::default();
            let config_content = serde_yaml::to_string(&default_config)?;
            fs::write(&config_path, config_content)?;
            default_config
        };

        Ok(config)
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?
            .join("convo-highlights");
        Ok(config_dir.join("config.yaml"))
    }
}

// Global config instance
use once_cell::sync::OnceCell;
static CONFIG: OnceCell<Config> = OnceCell::new();

pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(|| Config::load().unwrap_or_default())
}
