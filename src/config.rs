use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::error::EngineError;
use crate::registry::{builtin_zones, ZoneRegistry};
use crate::types::Zone;

/// Longest tick interval that still meets the detection latency requirement
pub const MAX_TICK_INTERVAL_MS: u64 = 30_000;

/// Top-level configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub alerting: AlertingConfig,
    #[serde(default = "builtin_zones")]
    pub zones: Vec<Zone>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_source_timeout")]
    pub source_timeout_ms: u64,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_alert_queue")]
    pub alert_queue_size: usize,
    pub initial_zone: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            log_level: default_log_level(),
            tick_interval_ms: 2000,
            source_timeout_ms: 1000,
            history_capacity: 30,
            alert_queue_size: 256,
            initial_zone: None,
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_spike_ratio")]
    pub spike_ratio: f64,
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: u8,
    #[serde(default = "default_confidence_span")]
    pub confidence_span: u8,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            spike_ratio: 1.4,
            confidence_floor: 80,
            confidence_span: 15,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Simulated,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,
    #[serde(default = "default_spike_probability")]
    pub spike_probability: f64,
    #[serde(default = "default_spike_offset")]
    pub spike_offset: f64,
    #[serde(default = "default_spike_spread")]
    pub spike_spread: f64,
    #[serde(default = "default_noise")]
    pub noise_amplitude: f64,
    pub seed: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Simulated,
            spike_probability: 0.15,
            spike_offset: 150.0,
            spike_spread: 100.0,
            noise_amplitude: 20.0,
            seed: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertingConfig {
    #[serde(default = "default_rate_per_min")]
    pub rate_limit_per_minute: u32,
    #[serde(default = "default_dedup_window")]
    pub dedup_window_secs: u64,
    #[serde(default)]
    pub log: LogChannelConfig,
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: 10,
            dedup_window_secs: 60,
            log: LogChannelConfig::default(),
            webhook: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogChannelConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub zone_filter: Vec<String>,
}

impl Default for LogChannelConfig {
    fn default() -> Self {
        Self { enabled: true, zone_filter: vec![] }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    #[serde(default)]
    pub enabled: bool,
    pub url: String,
    #[serde(default)]
    pub headers: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub zone_filter: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            detector: DetectorConfig::default(),
            source: SourceConfig::default(),
            alerting: AlertingConfig::default(),
            zones: builtin_zones(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        // Expand environment variables
        let expanded = expand_env_vars(content)?;

        let config: Config = toml::from_str(&expanded)
            .with_context(|| "Failed to parse configuration")?;

        Ok(config)
    }

    /// Check every engine-level constraint. Zone checks happen in
    /// [`ZoneRegistry::new`], which [`Config::registry`] calls.
    pub fn validate(&self) -> Result<(), EngineError> {
        let engine = &self.engine;
        if engine.tick_interval_ms == 0 || engine.tick_interval_ms > MAX_TICK_INTERVAL_MS {
            return Err(EngineError::invalid(format!(
                "tick_interval_ms must be within 1..={}, got {}",
                MAX_TICK_INTERVAL_MS, engine.tick_interval_ms
            )));
        }
        if engine.source_timeout_ms == 0 {
            return Err(EngineError::invalid("source_timeout_ms must be greater than zero"));
        }
        if engine.history_capacity == 0 {
            return Err(EngineError::invalid("history_capacity must be greater than zero"));
        }
        if engine.alert_queue_size == 0 {
            return Err(EngineError::invalid("alert_queue_size must be greater than zero"));
        }

        let detector = &self.detector;
        if !(detector.spike_ratio.is_finite() && detector.spike_ratio > 0.0) {
            return Err(EngineError::invalid(format!(
                "spike_ratio must be positive, got {}",
                detector.spike_ratio
            )));
        }
        if detector.confidence_span == 0 {
            return Err(EngineError::invalid("confidence_span must be greater than zero"));
        }
        if detector.confidence_floor as u16 + detector.confidence_span as u16 > 101 {
            return Err(EngineError::invalid("confidence range exceeds 100%"));
        }

        let source = &self.source;
        if !(0.0..=1.0).contains(&source.spike_probability) {
            return Err(EngineError::invalid(format!(
                "spike_probability must be within [0, 1], got {}",
                source.spike_probability
            )));
        }
        if !source.spike_offset.is_finite() {
            return Err(EngineError::invalid(format!(
                "spike_offset must be finite, got {}",
                source.spike_offset
            )));
        }
        for (name, value) in [
            ("spike_spread", source.spike_spread),
            ("noise_amplitude", source.noise_amplitude),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(EngineError::invalid(format!(
                    "{} must be finite and not negative, got {}",
                    name, value
                )));
            }
        }

        if self.alerting.rate_limit_per_minute == 0 {
            return Err(EngineError::invalid("rate_limit_per_minute must be greater than zero"));
        }

        let registry = self.registry()?;
        if let Some(ref id) = engine.initial_zone {
            if registry.get(id).is_none() {
                return Err(EngineError::invalid(format!("initial_zone '{}' is not configured", id)));
            }
        }

        Ok(())
    }

    pub fn registry(&self) -> Result<ZoneRegistry, EngineError> {
        ZoneRegistry::new(self.zones.clone())
    }
}

/// Expand ${ENV_VAR} references in config string
fn expand_env_vars(input: &str) -> Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_default()
        })
        .to_string())
}

// Default value functions
fn default_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}
fn default_log_level() -> String { "info".to_string() }
fn default_tick_interval() -> u64 { 2000 }
fn default_source_timeout() -> u64 { 1000 }
fn default_history_capacity() -> usize { 30 }
fn default_alert_queue() -> usize { 256 }
fn default_spike_ratio() -> f64 { 1.4 }
fn default_confidence_floor() -> u8 { 80 }
fn default_confidence_span() -> u8 { 15 }
fn default_spike_probability() -> f64 { 0.15 }
fn default_spike_offset() -> f64 { 150.0 }
fn default_spike_spread() -> f64 { 100.0 }
fn default_noise() -> f64 { 20.0 }
fn default_true() -> bool { true }
fn default_rate_per_min() -> u32 { 10 }
fn default_dedup_window() -> u64 { 60 }
