use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct VectorStoreConfig {
    pub url: String,
    #[serde(default = "default_vector_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelationalStoreConfig {
    pub url: String,
    #[serde(default = "default_sql_pool_size")]
    pub pool_size: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub vector_store: VectorStoreConfig,
    pub relational_store: RelationalStoreConfig,
    pub chat_model: ModelConfig,
    pub embedding_model: ModelConfig,
}

fn default_vector_pool_size() -> usize {
    10
}

fn default_sql_pool_size() -> u32 {
    10
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    3
}

fn default_temperature() -> f32 {
    0.3
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(Environment::with_prefix("EVENTLENS"));

        builder.build()?.try_deserialize()
    }
}
