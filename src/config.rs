use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub service: ServiceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrokerConfig {
    /// Base URL of the terminal bridge sidecar.
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Application tag on every order we place.
    #[serde(default = "default_magic")]
    pub magic: u64,
    /// Max acceptable slippage on placements and defensive closes, points.
    #[serde(default = "default_deviation_points")]
    pub deviation_points: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SafetyConfig {
    /// Path of the redb safety store (trading lock + cooldowns).
    #[serde(default = "default_store_path")]
    pub store_path: String,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u64,
    /// Cap on simultaneously open positions carrying our magic number.
    #[serde(default = "default_max_active_trades")]
    pub max_active_trades: usize,
    #[serde(default = "default_submit_retry_attempts")]
    pub submit_retry_attempts: usize,
    #[serde(default = "default_close_retry_attempts")]
    pub close_retry_attempts: usize,
    #[serde(default = "default_close_retry_delay_ms")]
    pub close_retry_delay_ms: u64,
    /// SL/TP verification tolerance, points.
    #[serde(default = "default_verify_tolerance_points")]
    pub verify_tolerance_points: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_nats_url")]
    pub nats_url: String,
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:8228".to_string()
}
fn default_request_timeout_ms() -> u64 {
    5_000
}
fn default_magic() -> u64 {
    880_044
}
fn default_deviation_points() -> u32 {
    20
}
fn default_store_path() -> String {
    "data/safety.redb".to_string()
}
fn default_cooldown_minutes() -> u64 {
    210
}
fn default_max_active_trades() -> usize {
    5
}
fn default_submit_retry_attempts() -> usize {
    3
}
fn default_close_retry_attempts() -> usize {
    2
}
fn default_close_retry_delay_ms() -> u64 {
    500
}
fn default_verify_tolerance_points() -> u32 {
    2
}
fn default_port() -> u16 {
    8229
}
fn default_nats_url() -> String {
    "nats://127.0.0.1:4222".to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bridge_url: default_bridge_url(),
            request_timeout_ms: default_request_timeout_ms(),
            magic: default_magic(),
            deviation_points: default_deviation_points(),
        }
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            cooldown_minutes: default_cooldown_minutes(),
            max_active_trades: default_max_active_trades(),
            submit_retry_attempts: default_submit_retry_attempts(),
            close_retry_attempts: default_close_retry_attempts(),
            close_retry_delay_ms: default_close_retry_delay_ms(),
            verify_tolerance_points: default_verify_tolerance_points(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            nats_url: default_nats_url(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            safety: SafetyConfig::default(),
            service: ServiceConfig::default(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let home = env::var("HOME").unwrap_or_else(|_| ".".into());

        let s = Config::builder()
            .add_source(File::with_name(&format!("{}/.trenda/config", home)).required(false))
            .add_source(File::with_name("config/config").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g. TRENDA_SAFETY__COOLDOWN_MINUTES
            .add_source(Environment::with_prefix("TRENDA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
