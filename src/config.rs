//! Layered settings.
//!
//! Sources are applied in order, later ones winning:
//!
//! 1. built-in defaults
//! 2. an optional TOML file
//! 3. `VITALWATCH_` environment variables, with `__` between section and key
//!    (`VITALWATCH_MONITOR__LAST_N=20`)
//!
//! Command-line flags are applied on top by the binary.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Deserializer};
use vitalwatch_adapters::sth::DEFAULT_TIMEOUT;
use vitalwatch_adapters::SthAdapter;

use crate::app::MonitorSettings;
use crate::data::duration;
use crate::data::timestamp::parse_zone;
use crate::data::{Alignment, Attribute};

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "VITALWATCH";

/// Everything needed to start the monitor.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub source: SourceConfig,
    pub monitor: MonitorConfig,
}

/// Where samples come from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// STH-Comet base URL.
    pub endpoint: String,
    /// `fiware-service` header.
    pub service: String,
    /// `fiware-servicepath` header.
    pub service_path: String,
    pub entity_type: String,
    pub entity_id: String,
    #[serde(deserialize_with = "duration::deserialize")]
    pub request_timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8666".to_string(),
            service: "smart".to_string(),
            service_path: "/".to_string(),
            entity_type: "Sensor".to_string(),
            entity_id: "urn:ngsi-ld:bpm:032".to_string(),
            request_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// How and what to poll.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    #[serde(deserialize_with = "duration::deserialize")]
    pub interval: Duration,
    pub last_n: usize,
    /// IANA zone used for displayed timestamps.
    pub timezone: String,
    #[serde(deserialize_with = "deserialize_attributes")]
    pub attributes: Vec<Attribute>,
    #[serde(deserialize_with = "deserialize_attribute")]
    pub reference: Attribute,
    /// Zero disables the timestamp check; counts are always checked.
    #[serde(deserialize_with = "duration::deserialize")]
    pub max_skew: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub cycle_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let defaults = MonitorSettings::default();
        Self {
            interval: defaults.interval,
            last_n: defaults.last_n,
            timezone: defaults.zone.name().to_string(),
            attributes: defaults.tracked,
            reference: defaults.reference,
            max_skew: defaults.alignment.max_skew.unwrap_or(Duration::ZERO),
            cycle_timeout: defaults.cycle_timeout,
        }
    }
}

impl Settings {
    /// Load defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, environment())
    }

    fn load_with(path: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let config = builder
            .add_source(env)
            .build()
            .with_context(|| match path {
                Some(path) => format!("Failed to load configuration from {}", path.display()),
                None => "Failed to load configuration".to_string(),
            })?;

        config
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Track the reference plus `secondary`.
    pub fn with_secondary(mut self, secondary: Attribute) -> Self {
        self.monitor.attributes = vec![self.monitor.reference, secondary];
        self
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        let monitor = &self.monitor;
        if monitor.last_n == 0 {
            bail!("monitor.last_n must be at least 1");
        }
        if monitor.interval.is_zero() {
            bail!("monitor.interval must be greater than zero");
        }
        if monitor.cycle_timeout.is_zero() {
            bail!("monitor.cycle_timeout must be greater than zero");
        }
        if monitor.attributes.is_empty() {
            bail!("monitor.attributes must name at least one attribute");
        }
        let unique: BTreeSet<_> = monitor.attributes.iter().collect();
        if unique.len() != monitor.attributes.len() {
            bail!("monitor.attributes contains duplicates: {:?}", monitor.attributes);
        }
        if !monitor.attributes.contains(&monitor.reference) {
            bail!(
                "monitor.reference ({}) must be one of monitor.attributes",
                monitor.reference
            );
        }
        parse_zone(&monitor.timezone).map_err(anyhow::Error::msg)?;
        if self.source.endpoint.trim().is_empty() {
            bail!("source.endpoint must not be empty");
        }
        if self.source.entity_id.trim().is_empty() {
            bail!("source.entity_id must not be empty");
        }
        Ok(())
    }

    /// Settings for the poll loop.
    pub fn monitor_settings(&self) -> Result<MonitorSettings> {
        self.validate()?;
        let monitor = &self.monitor;
        Ok(MonitorSettings {
            tracked: monitor.attributes.clone(),
            reference: monitor.reference,
            last_n: monitor.last_n,
            zone: parse_zone(&monitor.timezone).map_err(anyhow::Error::msg)?,
            alignment: Alignment {
                max_skew: (!monitor.max_skew.is_zero()).then_some(monitor.max_skew),
            },
            interval: monitor.interval,
            cycle_timeout: monitor.cycle_timeout,
        })
    }

    /// Build the STH-Comet client for the configured entity.
    pub fn adapter(&self) -> Result<SthAdapter> {
        let source = &self.source;
        SthAdapter::builder()
            .endpoint(&source.endpoint)
            .service(&source.service, &source.service_path)
            .entity(&source.entity_type, &source.entity_id)
            .timeout(source.request_timeout)
            .build()
            .context("Failed to create STH-Comet client")
    }
}

/// `VITALWATCH_MONITOR__LAST_N` maps to `monitor.last_n`.
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

fn deserialize_attribute<'de, D>(deserializer: D) -> Result<Attribute, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    name.parse().map_err(serde::de::Error::custom)
}

/// Accepts a list (`["bpm", "spo2"]`) or, from the environment, `"bpm,spo2"`.
fn deserialize_attributes<'de, D>(deserializer: D) -> Result<Vec<Attribute>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Text(String),
    }

    let names = match Raw::deserialize(deserializer)? {
        Raw::List(names) => names,
        Raw::Text(text) => text
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .collect(),
    };

    names
        .iter()
        .map(|name| name.parse().map_err(serde::de::Error::custom))
        .collect()
}
