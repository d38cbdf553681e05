// SPDX-License-Identifier: MIT
//! Telemetry configuration.
//!
//! [`TelemetryConfig::default`] holds plain defaults; [`TelemetryConfig::from_env`]
//! overlays the process environment:
//!
//! * `OTEL_EXPORTER_OTLP_ENDPOINT` – collector base URL (default `http://localhost:4318`).
//! * `OTEL_FANOUT_CONSOLE` – also log to stdout (`true`/`false`, default `true`).
//! * `OTEL_FANOUT_CONSOLE_LEVEL` / `OTEL_FANOUT_EXPORT_LEVEL` – minimum levels.
//! * `OTEL_SERVICE_NAME` – `service.name` resource attribute.
//! * `RUST_ENV` – `deployment.environment` resource attribute.
//! * `OTEL_EXPORTER_OTLP_TIMEOUT` – export timeout in milliseconds.
//! * `OTEL_METRIC_EXPORT_INTERVAL` – metric export interval in milliseconds.
use std::time::Duration;

use thiserror::Error;

use crate::handler::{Level, ParseLevelError};
use crate::probe::PROBE_TIMEOUT;

pub const ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
pub const DEFAULT_ENDPOINT: &str = "http://localhost:4318";

const CONSOLE_ENV: &str = "OTEL_FANOUT_CONSOLE";
const CONSOLE_LEVEL_ENV: &str = "OTEL_FANOUT_CONSOLE_LEVEL";
const EXPORT_LEVEL_ENV: &str = "OTEL_FANOUT_EXPORT_LEVEL";
const SERVICE_NAME_ENV: &str = "OTEL_SERVICE_NAME";
const ENVIRONMENT_ENV: &str = "RUST_ENV";
const EXPORT_TIMEOUT_ENV: &str = "OTEL_EXPORTER_OTLP_TIMEOUT";
const METRIC_INTERVAL_ENV: &str = "OTEL_METRIC_EXPORT_INTERVAL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: {source}")]
    Level {
        var: &'static str,
        #[source]
        source: ParseLevelError,
    },
    #[error("{var}: expected true or false, got `{value}`")]
    Bool { var: &'static str, value: String },
    #[error("{var}: expected a duration in milliseconds, got `{value}`")]
    Millis { var: &'static str, value: String },
}

/// Configuration used when initializing telemetry.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Collector base endpoint, without per-signal suffix.
    pub endpoint: String,
    /// Whether records are also written to stdout.
    pub console: bool,
    pub console_level: Level,
    /// Minimum level of records exported to the collector.
    pub export_level: Level,
    pub service_name: String,
    pub service_version: String,
    /// Reported as `deployment.environment`.
    pub environment: String,
    /// Upper bound on one export request. Exports are never retried.
    pub export_timeout: Duration,
    pub metric_interval: Duration,
    /// How long the startup reachability check may block.
    pub probe_timeout: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            console: true,
            console_level: Level::Debug,
            export_level: Level::Debug,
            service_name: env!("CARGO_PKG_NAME").to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "dev".to_string(),
            export_timeout: Duration::from_secs(1),
            metric_interval: Duration::from_secs(60),
            probe_timeout: PROBE_TIMEOUT,
        }
    }
}

impl TelemetryConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`TelemetryConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(endpoint) = lookup(ENDPOINT_ENV).filter(|v| !v.trim().is_empty()) {
            cfg.endpoint = endpoint.trim().to_string();
        }
        if let Some(value) = lookup(CONSOLE_ENV) {
            cfg.console = parse_bool(CONSOLE_ENV, &value)?;
        }
        if let Some(value) = lookup(CONSOLE_LEVEL_ENV) {
            cfg.console_level = parse_level(CONSOLE_LEVEL_ENV, &value)?;
        }
        if let Some(value) = lookup(EXPORT_LEVEL_ENV) {
            cfg.export_level = parse_level(EXPORT_LEVEL_ENV, &value)?;
        }
        if let Some(name) = lookup(SERVICE_NAME_ENV) {
            cfg.service_name = name;
        }
        if let Some(environment) = lookup(ENVIRONMENT_ENV) {
            cfg.environment = environment;
        }
        if let Some(value) = lookup(EXPORT_TIMEOUT_ENV) {
            cfg.export_timeout = parse_millis(EXPORT_TIMEOUT_ENV, &value)?;
        }
        if let Some(value) = lookup(METRIC_INTERVAL_ENV) {
            cfg.metric_interval = parse_millis(METRIC_INTERVAL_ENV, &value)?;
        }
        Ok(cfg)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Bool {
            var,
            value: value.to_string(),
        }),
    }
}

fn parse_level(var: &'static str, value: &str) -> Result<Level, ConfigError> {
    value
        .parse()
        .map_err(|source| ConfigError::Level { var, source })
}

fn parse_millis(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::Millis {
            var,
            value: value.to_string(),
        })
}
