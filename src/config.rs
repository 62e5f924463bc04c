use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, anyhow};
use dotenvy::dotenv;

#[derive(Clone, Debug)]
pub struct Config {
    // Authority
    pub server_addr: String,
    pub jwt_secret: String,
    pub rate_protected_per_min: u32,
    pub api_prefix: String,
    pub seed_file: Option<PathBuf>,

    // Client core
    pub authority_url: String,
    pub poll_interval_secs: u64,
    pub countdown_tick_millis: u64,
    pub request_timeout_secs: u64,
    pub default_validity_minutes: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let required = |key: &str| lookup(key).ok_or_else(|| anyhow!("{key} must be set"));

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            jwt_secret: required("JWT_SECRET")?,
            rate_protected_per_min: parse_or(&lookup, "RATE_PROTECTED_PER_MIN", 1000)?,
            api_prefix: lookup("API_PREFIX").unwrap_or_else(|| "/api".to_string()),
            seed_file: lookup("SEED_FILE").map(PathBuf::from),

            authority_url: lookup("AUTHORITY_URL")
                .unwrap_or_else(|| "http://localhost:4200/api".to_string()),
            poll_interval_secs: parse_or(&lookup, "POLL_INTERVAL_SECS", 10)?,
            countdown_tick_millis: parse_or(&lookup, "COUNTDOWN_TICK_MILLIS", 1000)?,
            request_timeout_secs: parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 30)?,
            default_validity_minutes: parse_or(&lookup, "DEFAULT_VALIDITY_MINUTES", 5)?,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_millis)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}
