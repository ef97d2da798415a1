use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tributary::FailurePolicy;

/// Demo settings. Defaults, then environment, then an optional TOML file.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// How long each click is held by the `delay` pipeline
    pub click_delay: Duration,
    /// Simulated latency of the todo loader
    pub fetch_latency: Duration,
    /// What the driver does with sibling tasks once one fails
    pub failure_policy: FailurePolicy,
    /// Emit JSON log lines instead of human-readable ones
    pub log_json: bool,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            click_delay: Duration::from_millis(100),
            fetch_latency: Duration::from_millis(1500),
            failure_policy: FailurePolicy::Abandon,
            log_json: false,
        }
    }
}

/// TOML overlay. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub click_delay_ms: Option<u64>,
    pub fetch_latency_ms: Option<u64>,
    pub failure_policy: Option<FailurePolicy>,
    pub log_json: Option<bool>,
}

impl DemoConfig {
    /// Load from `TRIBUTARY_*` environment variables (after `.env`).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(ms) = lookup("TRIBUTARY_CLICK_DELAY_MS") {
            let ms: u64 = ms
                .parse()
                .context("TRIBUTARY_CLICK_DELAY_MS must be a number")?;
            config.click_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = lookup("TRIBUTARY_FETCH_LATENCY_MS") {
            let ms: u64 = ms
                .parse()
                .context("TRIBUTARY_FETCH_LATENCY_MS must be a number")?;
            config.fetch_latency = Duration::from_millis(ms);
        }
        if let Some(policy) = lookup("TRIBUTARY_FAILURE_POLICY") {
            config.failure_policy = policy.parse()?;
        }
        if let Some(json) = lookup("TRIBUTARY_LOG_JSON") {
            config.log_json = json
                .parse()
                .context("TRIBUTARY_LOG_JSON must be true or false")?;
        }

        Ok(config)
    }

    /// Apply the keys present in `file` on top of `self`.
    pub fn overlay(mut self, file: FileConfig) -> Self {
        if let Some(ms) = file.click_delay_ms {
            self.click_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = file.fetch_latency_ms {
            self.fetch_latency = Duration::from_millis(ms);
        }
        if let Some(policy) = file.failure_policy {
            self.failure_policy = policy;
        }
        if let Some(json) = file.log_json {
            self.log_json = json;
        }
        self
    }

    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  click_delay: {:?}", self.click_delay);
        tracing::info!("  fetch_latency: {:?}", self.fetch_latency);
        tracing::info!("  failure_policy: {:?}", self.failure_policy);
        tracing::info!("  log_json: {}", self.log_json);
    }
}

/// Load and parse a TOML overlay file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: FileConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}
