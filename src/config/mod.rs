//! Configuration for leader discovery
//!
//! Values come from defaults, a TOML file, `LEADER_FINDER_*` environment
//! variables, or the builder. Every path ends in [`FinderConfig::validate`].

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::address::Address;
use crate::election::DEFAULT_MEMBER_PREFIX;
use crate::error::{Error, Result};

/// Election directory used when neither the config nor the address names one
pub const DEFAULT_ELECTION_PATH: &str = "/aurora/scheduler";

/// Path probed on the virtual endpoint
pub const DEFAULT_PROBE_PATH: &str = "/scheduler";

const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 20;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_WATCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_STALENESS_SECS: u64 = 60;

/// Finder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinderConfig {
    /// Discovery address (`http(s)://...` or `zk://...`)
    pub address: String,

    /// Election directory; overrides a path embedded in the address
    pub election_path: Option<String>,

    /// Name prefix of election member nodes
    pub member_prefix: String,

    /// Path appended to the base URL when probing
    pub probe_path: String,

    /// Delay between refresh cycles in milliseconds
    pub poll_interval_ms: u64,

    /// Coordination connect and request timeout in seconds
    pub connect_timeout_secs: u64,

    /// HTTP probe timeout in seconds
    pub probe_timeout_secs: u64,

    /// Longest wait on a single watch before re-confirming the leader
    pub watch_timeout_secs: u64,

    /// Refuse answers older than this many seconds (`None` disables the bound)
    pub max_staleness_secs: Option<u64>,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            election_path: None,
            member_prefix: DEFAULT_MEMBER_PREFIX.to_string(),
            probe_path: DEFAULT_PROBE_PATH.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            watch_timeout_secs: DEFAULT_WATCH_TIMEOUT_SECS,
            max_staleness_secs: Some(DEFAULT_MAX_STALENESS_SECS),
        }
    }
}

fn invalid(field: &str, reason: impl std::fmt::Display) -> Error {
    Error::config(format!("Invalid value for '{field}': {reason}"))
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| invalid(name, format!("cannot parse '{value}'"))),
        Err(_) => Ok(None),
    }
}

impl FinderConfig {
    /// Create a config for `address` with default settings
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    /// Create a new config builder
    pub fn builder() -> FinderConfigBuilder {
        FinderConfigBuilder::default()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(address) = std::env::var("LEADER_FINDER_ADDRESS") {
            config.address = address;
        }
        if let Ok(path) = std::env::var("LEADER_FINDER_ELECTION_PATH") {
            config.election_path = Some(path);
        }
        if let Ok(prefix) = std::env::var("LEADER_FINDER_MEMBER_PREFIX") {
            config.member_prefix = prefix;
        }
        if let Some(ms) = env_parse("LEADER_FINDER_POLL_INTERVAL_MS")? {
            config.poll_interval_ms = ms;
        }
        if let Some(secs) = env_parse("LEADER_FINDER_CONNECT_TIMEOUT")? {
            config.connect_timeout_secs = secs;
        }
        if let Some(secs) = env_parse("LEADER_FINDER_PROBE_TIMEOUT")? {
            config.probe_timeout_secs = secs;
        }
        if let Some(secs) = env_parse("LEADER_FINDER_WATCH_TIMEOUT")? {
            config.watch_timeout_secs = secs;
        }
        if let Some(secs) = env_parse::<u64>("LEADER_FINDER_MAX_STALENESS")? {
            config.max_staleness_secs = (secs > 0).then_some(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            Error::config(format!("Failed to parse TOML config file {}: {e}", path.display()))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        Address::parse(&self.address)?;

        if let Some(path) = &self.election_path {
            if !path.starts_with('/') {
                return Err(invalid("election_path", "must be an absolute path"));
            }
        }

        if self.member_prefix.is_empty() {
            return Err(invalid("member_prefix", "must not be empty"));
        }

        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms", "must be greater than 0"));
        }

        if self.connect_timeout_secs == 0 {
            return Err(invalid("connect_timeout_secs", "must be greater than 0"));
        }

        if self.probe_timeout_secs == 0 {
            return Err(invalid("probe_timeout_secs", "must be greater than 0"));
        }

        if self.watch_timeout_secs == 0 {
            return Err(invalid("watch_timeout_secs", "must be greater than 0"));
        }

        if let Some(limit) = self.max_staleness() {
            if limit <= self.watch_timeout() + self.poll_interval() {
                return Err(invalid(
                    "max_staleness_secs",
                    "must exceed watch_timeout_secs plus one poll interval",
                ));
            }
        }

        Ok(())
    }

    /// Election directory for an ensemble address
    ///
    /// The configured path wins over one embedded in the address.
    pub fn election_path_for(&self, address_path: Option<&str>) -> String {
        self.election_path
            .as_deref()
            .or(address_path)
            .unwrap_or(DEFAULT_ELECTION_PATH)
            .to_string()
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    #[must_use]
    pub fn watch_timeout(&self) -> Duration {
        Duration::from_secs(self.watch_timeout_secs)
    }

    #[must_use]
    pub fn max_staleness(&self) -> Option<Duration> {
        self.max_staleness_secs.map(Duration::from_secs)
    }
}

/// Builder for FinderConfig
#[derive(Debug, Default)]
pub struct FinderConfigBuilder {
    address: Option<String>,
    election_path: Option<String>,
    member_prefix: Option<String>,
    probe_path: Option<String>,
    poll_interval: Option<Duration>,
    connect_timeout: Option<Duration>,
    probe_timeout: Option<Duration>,
    watch_timeout: Option<Duration>,
    max_staleness: Option<Option<Duration>>,
}

impl FinderConfigBuilder {
    /// Set discovery address
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Set election directory
    pub fn election_path(mut self, path: impl Into<String>) -> Self {
        self.election_path = Some(path.into());
        self
    }

    /// Set member name prefix
    pub fn member_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.member_prefix = Some(prefix.into());
        self
    }

    /// Set probe path
    pub fn probe_path(mut self, path: impl Into<String>) -> Self {
        self.probe_path = Some(path.into());
        self
    }

    /// Set refresh interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Set coordination connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set HTTP probe timeout
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    /// Set watch re-arm timeout
    pub fn watch_timeout(mut self, timeout: Duration) -> Self {
        self.watch_timeout = Some(timeout);
        self
    }

    /// Set or disable the staleness bound
    pub fn max_staleness(mut self, limit: Option<Duration>) -> Self {
        self.max_staleness = Some(limit);
        self
    }

    /// Build the config
    ///
    /// Durations must be whole seconds (whole milliseconds for the poll
    /// interval); anything finer is rejected rather than rounded.
    pub fn build(self) -> Result<FinderConfig> {
        let defaults = FinderConfig::default();

        let max_staleness_secs = match self.max_staleness {
            Some(Some(limit)) => Some(whole_secs("max_staleness_secs", limit)?),
            Some(None) => None,
            None => defaults.max_staleness_secs,
        };

        let config = FinderConfig {
            address: self
                .address
                .ok_or_else(|| Error::config("Missing required field: address"))?,
            election_path: self.election_path,
            member_prefix: self.member_prefix.unwrap_or(defaults.member_prefix),
            probe_path: self.probe_path.unwrap_or(defaults.probe_path),
            poll_interval_ms: self
                .poll_interval
                .map(|d| whole_millis("poll_interval_ms", d))
                .transpose()?
                .unwrap_or(defaults.poll_interval_ms),
            connect_timeout_secs: self
                .connect_timeout
                .map(|d| whole_secs("connect_timeout_secs", d))
                .transpose()?
                .unwrap_or(defaults.connect_timeout_secs),
            probe_timeout_secs: self
                .probe_timeout
                .map(|d| whole_secs("probe_timeout_secs", d))
                .transpose()?
                .unwrap_or(defaults.probe_timeout_secs),
            watch_timeout_secs: self
                .watch_timeout
                .map(|d| whole_secs("watch_timeout_secs", d))
                .transpose()?
                .unwrap_or(defaults.watch_timeout_secs),
            max_staleness_secs,
        };

        config.validate()?;
        Ok(config)
    }
}

fn whole_secs(field: &str, duration: Duration) -> Result<u64> {
    if duration.subsec_nanos() != 0 {
        return Err(invalid(
            field,
            format!("{duration:?} is not a whole number of seconds"),
        ));
    }
    Ok(duration.as_secs())
}

fn whole_millis(field: &str, duration: Duration) -> Result<u64> {
    if duration.subsec_nanos() % 1_000_000 != 0 {
        return Err(invalid(
            field,
            format!("{duration:?} is not a whole number of milliseconds"),
        ));
    }
    u64::try_from(duration.as_millis()).map_err(|_| invalid(field, "too large"))
}
