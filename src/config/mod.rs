use serde::Deserialize;
use std::time::Duration;

use crate::db::PoolSettings;
use crate::services::lifecycle::{ManagerSettings, RetryPolicy};

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string. Jobs are kept in memory when unset.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Upper bound on open database connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Gemini API key
    pub gemini_api_key: String,

    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,

    /// Longest accepted prompt, in characters
    #[serde(default = "default_max_prompt_length")]
    pub max_prompt_length: usize,

    /// Simultaneous calls to the generation backend
    #[serde(default = "default_max_concurrent_generations")]
    pub max_concurrent_generations: usize,

    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,

    /// Attempts per job; 1 disables retries
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_retry_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_db_max_connections() -> u32 {
    20
}

fn default_db_acquire_timeout_secs() -> u64 {
    10
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_max_prompt_length() -> usize {
    2000
}

fn default_max_concurrent_generations() -> usize {
    4
}

fn default_generation_timeout_secs() -> u64 {
    120
}

fn default_retry_max_attempts() -> u32 {
    1
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

fn default_retry_backoff_max_ms() -> u64 {
    30_000
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.db_max_connections,
            acquire_timeout: Duration::from_secs(self.db_acquire_timeout_secs),
        }
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            max_prompt_length: self.max_prompt_length,
            max_concurrent_generations: self.max_concurrent_generations,
            generation_timeout: self.generation_timeout(),
            retry: RetryPolicy {
                max_attempts: self.retry_max_attempts,
                initial_backoff: Duration::from_millis(self.retry_backoff_ms),
                max_backoff: Duration::from_millis(self.retry_backoff_max_ms),
            },
        }
    }
}
