use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

/// The single YAML config file a `cortex` process is started with (spec
/// §4.9, teacher's `serde_yaml` + `load_config` pattern in
/// `rks/src/protocol/config.rs`).
#[derive(Debug, Deserialize)]
pub struct Config {
    /// ip:port the HTTP scheduler surface listens on.
    pub addr: String,
    pub store: StoreConfig,
    /// Postgres DSN for the knowledge-plane feature tables.
    pub knowledge_db_dsn: String,
    pub operator: String,
    /// "host:port" of an MQTT broker for pipeline-finished fan-out.
    /// Fan-out is skipped entirely if absent (spec §6).
    pub mqtt_broker: Option<String>,
    #[serde(default)]
    pub descheduling: DeschedulingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub endpoints: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeschedulingConfig {
    pub pipeline: String,
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for DeschedulingConfig {
    fn default() -> Self {
        Self {
            pipeline: "descheduling".to_string(),
            dry_run: false,
        }
    }
}

pub fn load_config(path: &str) -> Result<Config> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read config from {path}"))?;
    let cfg: Config = serde_yaml::from_str(&content).context("Failed to parse YAML config")?;
    Ok(cfg)
}
