use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    /// Transactions fetched per matcher page.
    pub page_size: u32,
    /// Deadline for each individual store operation during a run.
    pub store_timeout_ms: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let page_size = env_map
            .get("PAGE_SIZE")
            .map(|s| s.as_str())
            .unwrap_or("500")
            .parse::<u32>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "PAGE_SIZE".to_string(),
                    "must be a valid u32".to_string(),
                )
            })?;
        if page_size == 0 {
            return Err(ConfigError::InvalidValue(
                "PAGE_SIZE".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let store_timeout_ms = env_map
            .get("STORE_TIMEOUT_MS")
            .map(|s| s.as_str())
            .unwrap_or("10000")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "STORE_TIMEOUT_MS".to_string(),
                    "must be a valid u64".to_string(),
                )
            })?;

        Ok(Config {
            port,
            database_path,
            page_size,
            store_timeout_ms,
        })
    }
}
