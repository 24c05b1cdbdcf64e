use crate::model::{ConfigError, Dest, ProductId, Spp};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub candidate_spp: Vec<Spp>,
    pub candidate_dest: Vec<Dest>,
    pub products: Vec<ProductId>,
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_seconds: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_min_dest_delay")]
    pub min_dest_delay_ms: u64,
    #[serde(default = "default_malformed_alert_ratio")]
    pub malformed_alert_ratio: f64,
    #[serde(default = "default_card_url")]
    pub api_base_url: String,
    #[serde(default = "default_card_url")]
    pub link_base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

fn default_cycle_interval() -> u64 {
    24 * 60 * 60
}

fn default_concurrency() -> usize {
    4
}

fn default_request_timeout() -> u64 {
    5_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    500
}

fn default_min_dest_delay() -> u64 {
    2_000
}

fn default_malformed_alert_ratio() -> f64 {
    0.2
}

fn default_card_url() -> String {
    "https://card.wb.ru/cards/v4/detail".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) SppSniperBot/0.1".to_string()
}

fn default_database_path() -> String {
    "data.db".to_string()
}

impl AppConfig {
    /// Builds a config with defaults for everything except the sampling universe.
    pub fn with_candidates(spp: Vec<Spp>, dest: Vec<Dest>, products: Vec<ProductId>) -> Self {
        Self {
            candidate_spp: spp,
            candidate_dest: dest,
            products,
            cycle_interval_seconds: default_cycle_interval(),
            concurrency: default_concurrency(),
            request_timeout_ms: default_request_timeout(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base(),
            min_dest_delay_ms: default_min_dest_delay(),
            malformed_alert_ratio: default_malformed_alert_ratio(),
            api_base_url: default_card_url(),
            link_base_url: default_card_url(),
            user_agent: default_user_agent(),
            database_path: default_database_path(),
            telegram: None,
        }
    }

    /// Checks the values a cycle depends on. Called at the start of every cycle.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.candidate_spp.is_empty() {
            return Err(ConfigError::Invalid("candidate_spp is empty".into()));
        }
        if self.candidate_dest.is_empty() {
            return Err(ConfigError::Invalid("candidate_dest is empty".into()));
        }
        if self.products.is_empty() {
            return Err(ConfigError::Invalid("products is empty".into()));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("request_timeout_ms must be positive".into()));
        }
        if self.cycle_interval_seconds == 0 {
            return Err(ConfigError::Invalid("cycle_interval_seconds must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.malformed_alert_ratio) {
            return Err(ConfigError::Invalid(format!(
                "malformed_alert_ratio {} is outside 0.0..=1.0",
                self.malformed_alert_ratio
            )));
        }
        Ok(())
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn min_dest_delay(&self) -> Duration {
        Duration::from_millis(self.min_dest_delay_ms)
    }
}

pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    Ok(config)
}
