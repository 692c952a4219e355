//! Configuration loading for statpoll.
//!
//! A single TOML file describes the monitored engines, the report types
//! to collect, per-type inclusion patterns, and the polling cadence. The
//! file is validated eagerly: any problem aborts startup.

use crate::domain::types::{Credentials, EngineEndpoint, MetricCategory};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const DEFAULT_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    /// Seconds between consecutive polls.
    interval: Option<u64>,
    /// Skip engine-internal entities in every report.
    ignore_internal_entities: Option<bool>,
    /// Directory for report files; current working directory when absent.
    report_folder: Option<PathBuf>,
    /// Report types to collect; all types when absent.
    reports: Option<Vec<String>>,
    #[serde(default, rename = "engine")]
    engines: Vec<RawEngine>,
    /// Per-report-type inclusion patterns.
    #[serde(default)]
    include: HashMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEngine {
    name: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    pid: Option<u32>,
    username: Option<String>,
    password: Option<String>,
}

/// Validated configuration the daemon runs on.
#[derive(Debug, Clone)]
pub struct Config {
    pub engines: Vec<EngineEndpoint>,
    pub categories: Vec<MetricCategory>,
    pub include: HashMap<MetricCategory, Vec<String>>,
    pub poll_interval: Duration,
    pub ignore_internal_entities: bool,
    pub report_folder: Option<PathBuf>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(text).context("Failed to parse TOML")?;

        let interval = raw.interval.unwrap_or(DEFAULT_INTERVAL_SECS);
        if interval == 0 {
            bail!("interval must be at least 1 second");
        }

        let categories = match &raw.reports {
            None => MetricCategory::all(),
            Some(names) if names.is_empty() => bail!("reports must name at least one type"),
            Some(names) => names
                .iter()
                .map(|name| name.parse())
                .collect::<Result<Vec<MetricCategory>>>()?,
        };

        if raw.engines.is_empty() {
            bail!("at least one [[engine]] must be configured");
        }
        let mut engines = Vec::with_capacity(raw.engines.len());
        let mut seen = HashSet::new();
        for raw_engine in raw.engines {
            let endpoint = parse_engine(raw_engine)?;
            if seen.insert(endpoint.key()) {
                engines.push(endpoint);
            } else {
                warn!("Duplicate engine {} ignored", endpoint);
            }
        }

        let mut include = HashMap::new();
        for (name, patterns) in raw.include {
            let category: MetricCategory = name
                .parse()
                .with_context(|| format!("Unknown report type in include table: '{}'", name))?;
            let patterns: Vec<String> =
                patterns.into_iter().filter(|p| !p.trim().is_empty()).collect();
            if !patterns.is_empty() {
                include.insert(category, patterns);
            }
        }

        Ok(Config {
            engines,
            categories,
            include,
            poll_interval: Duration::from_secs(interval),
            ignore_internal_entities: raw.ignore_internal_entities.unwrap_or(true),
            report_folder: raw.report_folder,
        })
    }
}

fn parse_engine(raw: RawEngine) -> Result<EngineEndpoint> {
    match (raw.pid, raw.host, raw.port) {
        (Some(pid), None, None) => Ok(EngineEndpoint::local(pid)),
        (None, Some(host), Some(port)) => {
            let name = raw
                .name
                .filter(|n| !n.trim().is_empty())
                .with_context(|| format!("Engine {}:{} is missing a name", host, port))?;
            // Blank user or password means the endpoint runs without
            // authentication.
            let credentials = match (raw.username, raw.password) {
                (Some(username), Some(password))
                    if !username.trim().is_empty() && !password.trim().is_empty() =>
                {
                    Some(Credentials { username, password })
                }
                _ => None,
            };
            Ok(EngineEndpoint::remote(name, host, port, credentials))
        }
        (None, _, _) => bail!("An engine needs either a pid or both host and port"),
        (Some(_), _, _) => bail!("An engine cannot carry both a pid and a host/port"),
    }
}
