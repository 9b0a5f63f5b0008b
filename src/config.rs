use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::store::{DEFAULT_EMBED_COLOR, DEFAULT_UPDATE_INTERVAL_SECS, MIN_UPDATE_INTERVAL_SECS};

const DEFAULT_HEALTH_PORT: u16 = 8080;
const DEFAULT_DATA_DIR: &str = "./data";
const STATE_FILE_NAME: &str = "bot-config.json";

/// All validation problems are collected and reported together so a broken
/// deployment is fixed in one pass.
#[derive(Debug, Error)]
#[error("configuration validation failed:\n{}", .0.join("\n"))]
pub struct ConfigError(pub Vec<String>);

/// Process configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub gateway_token: String,
    pub admin_user_ids: Vec<String>,
    pub event_source_url: String,
    pub event_source_username: String,
    pub event_source_password: String,
    /// Global tick cadence; per-tenant cadences gate on top of it.
    pub update_interval: Duration,
    pub embed_color: u32,
    pub health_port: u16,
    pub data_dir: PathBuf,
}

impl Config {
    /// Reads configuration from the process environment, loading a `.env`
    /// file first when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Environment-shaped lookup kept injectable for tests.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut problems = Vec::new();

        let mut required = |key: &str| match lookup(key) {
            Some(value) if !value.trim().is_empty() => value,
            _ => {
                problems.push(format!("{key} is required"));
                String::new()
            }
        };

        let gateway_token = required("GATEWAY_TOKEN");
        let event_source_url = required("EVENT_SOURCE_URL");
        let event_source_username = required("EVENT_SOURCE_USERNAME");
        let event_source_password = required("EVENT_SOURCE_PASSWORD");

        let admin_user_ids = lookup("ADMIN_USER_IDS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let update_interval_secs = match lookup("UPDATE_INTERVAL") {
            None => DEFAULT_UPDATE_INTERVAL_SECS,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs >= MIN_UPDATE_INTERVAL_SECS => secs,
                Ok(secs) => {
                    problems.push(format!(
                        "UPDATE_INTERVAL must be at least {MIN_UPDATE_INTERVAL_SECS} seconds, got {secs}"
                    ));
                    DEFAULT_UPDATE_INTERVAL_SECS
                }
                Err(_) => {
                    problems.push(format!("UPDATE_INTERVAL is not a number: {raw}"));
                    DEFAULT_UPDATE_INTERVAL_SECS
                }
            },
        };

        let embed_color = match lookup("EMBED_COLOR") {
            None => DEFAULT_EMBED_COLOR,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(color) => color,
                Err(_) => {
                    problems.push(format!("EMBED_COLOR is not a number: {raw}"));
                    DEFAULT_EMBED_COLOR
                }
            },
        };

        let health_port = match lookup("HEALTH_PORT") {
            None => DEFAULT_HEALTH_PORT,
            Some(raw) => match raw.trim().parse::<u16>() {
                Ok(port) => port,
                Err(_) => {
                    problems.push(format!("HEALTH_PORT is not a valid port: {raw}"));
                    DEFAULT_HEALTH_PORT
                }
            },
        };

        let data_dir = lookup("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        if !problems.is_empty() {
            return Err(ConfigError(problems));
        }

        Ok(Self {
            gateway_token,
            admin_user_ids,
            event_source_url,
            event_source_username,
            event_source_password,
            update_interval: Duration::from_secs(update_interval_secs),
            embed_color,
            health_port,
            data_dir,
        })
    }

    /// Where the tenant store document lives.
    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join(STATE_FILE_NAME)
    }
}
