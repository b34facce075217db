//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (feed client id, Telegram bot token) are referenced by env-var
//! name in the config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use crate::types::InstrumentSpec;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub scanner: ScannerConfig,
    pub market: MarketConfig,
    pub feed: FeedConfig,
    pub alerts: AlertsConfig,
    pub server: ServerConfig,
    pub instruments: Vec<InstrumentSpec>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    /// Sleep while no credential is armed (short, to pick up a token quickly).
    pub idle_interval_secs: u64,
    /// Sleep while the market is closed.
    pub market_closed_interval_secs: u64,
    /// Steady-state polling cadence between scan cycles.
    pub cycle_interval_secs: u64,
    /// Delay between instruments within a cycle (upstream rate limits).
    pub pacing_delay_secs: u64,

    pub volume_threshold: u64,
    pub oi_threshold: u64,
    pub volume_jump_threshold: i64,
    pub oi_jump_threshold: i64,
    /// Strict "fresh entry" mode: also require a same-cycle jump.
    #[serde(default)]
    pub require_momentum: bool,

    #[serde(default)]
    pub dedup_policy: DedupPolicy,
    /// Alert ledger file; survives restarts.
    pub ledger_path: String,
}

/// Granularity at which repeated signals are suppressed.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DedupPolicy {
    /// A key fires once per (volume, oi) reading; fresh activity re-fires.
    #[default]
    KeyAndValues,
    /// A key fires once, ever, until the ledger is reset by re-arming.
    KeyOnly,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarketConfig {
    /// Market timezone as a fixed UTC offset in minutes (IST = 330).
    pub utc_offset_minutes: i32,
    /// Session open, inclusive, `"HH:MM:SS"`.
    pub open: String,
    /// Session close, inclusive, `"HH:MM:SS"`.
    pub close: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub base_url: String,
    pub client_id_env: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    pub telegram_base_url: String,
    pub bot_token_env: String,
    pub chat_id_env: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
