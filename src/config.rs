//! JSON configuration.
//!
//! The file is a single object with three recognized keys: `application`
//! (label → `{hostname, port}`), `pmu` (event-name strings, passed through
//! to the PMU sampler unchanged), and `num_of_processes` (the top-K size).
//! Two NUMA-access events are appended to every `pmu` list so local and
//! remote memory traffic is always measured. Capacity limits are enforced
//! here, before any sampling starts.

use crate::collector::pmu::events::{NUMA_LOCAL_EVENT, NUMA_REMOTE_EVENT};
use crate::snapshot::{MAX_APPLICATIONS, MAX_EVENTS, MAX_PROCESSES};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use tracing::info;

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    /// Malformed JSON, with the position serde_json reported.
    Json {
        line: usize,
        column: usize,
        message: String,
    },
    /// Well-formed JSON that violates a constraint.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "cannot read config: {e}"),
            ConfigError::Json {
                line,
                column,
                message,
            } => write!(f, "config JSON error at line {line}, column {column}: {message}"),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::Io(e)
    }
}

#[derive(Debug, Deserialize)]
struct RawApplication {
    hostname: String,
    port: u16,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    application: BTreeMap<String, RawApplication>,
    #[serde(default)]
    pmu: Vec<String>,
    num_of_processes: usize,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// (label, hostname, port) per monitored application.
    pub applications: Vec<(String, String, u16)>,
    /// Configured PMU events plus the two fixed NUMA events.
    pub events: Vec<String>,
    /// Top-K size.
    pub num_of_processes: usize,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(json: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(json).map_err(|e| ConfigError::Json {
            line: e.line(),
            column: e.column(),
            message: e.to_string(),
        })?;

        if raw.application.len() > MAX_APPLICATIONS {
            return Err(ConfigError::Invalid(format!(
                "{} applications configured, the limit is {MAX_APPLICATIONS}",
                raw.application.len()
            )));
        }

        let mut events = raw.pmu;
        events.push(NUMA_LOCAL_EVENT.to_string());
        events.push(NUMA_REMOTE_EVENT.to_string());
        if events.len() > MAX_EVENTS {
            return Err(ConfigError::Invalid(format!(
                "{} PMU events configured (including the fixed NUMA pair), the limit is {MAX_EVENTS}",
                events.len()
            )));
        }

        if raw.num_of_processes == 0 || raw.num_of_processes > MAX_PROCESSES {
            return Err(ConfigError::Invalid(format!(
                "num_of_processes must be between 1 and {MAX_PROCESSES}, got {}",
                raw.num_of_processes
            )));
        }

        let applications: Vec<(String, String, u16)> = raw
            .application
            .into_iter()
            .map(|(label, app)| (label, app.hostname, app.port))
            .collect();

        for (label, hostname, port) in &applications {
            info!("monitoring application {label} at {hostname}:{port}");
        }
        for event in &events {
            info!("PMU event {event} registered");
        }
        info!(
            "monitoring the top {} processes",
            raw.num_of_processes
        );

        Ok(Self {
            applications,
            events,
            num_of_processes: raw.num_of_processes,
        })
    }
}
