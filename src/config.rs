//! Static configuration, loaded once at startup from a YAML file.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sentry::types::Dsn;
use serde::{de, Deserialize, Deserializer};
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::policy::DEFAULT_SKIP_PATTERN;

/// Controls the log format
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified for other)
    Auto,
    /// With colors
    Pretty,
    /// Simplified log output
    Simplified,
    /// Dump out JSON lines
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level for the proxy.
    #[serde(deserialize_with = "deserialize_level_filter")]
    pub level: LevelFilter,
    /// Controls the log format.
    pub format: LogFormat,
    /// When set to true, backtraces are forced on.
    pub enable_backtraces: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
            enable_backtraces: true,
        }
    }
}

/// Control the metrics.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// host/port of statsd instance
    pub statsd: Option<String>,
    /// The prefix that should be added to all metrics.
    pub prefix: String,
    /// A map containing custom tags and their values.
    ///
    /// These tags will be appended to every metric.
    pub custom_tags: BTreeMap<String, String>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: None,
            prefix: "honey".into(),
            custom_tags: BTreeMap::new(),
        }
    }
}

/// Tuning of the cache core.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Cookie names the cache lets through, in the order they enter Vary
    /// signatures.
    pub allowed_cookies: Vec<String>,
    /// Exact paths that are never cached.
    pub skip_urls: Vec<String>,
    /// Path patterns that are never cached.
    pub skip_paths: Vec<String>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        CacheOptions {
            allowed_cookies: Vec::new(),
            skip_urls: Vec::new(),
            skip_paths: vec![DEFAULT_SKIP_PATTERN.to_owned()],
        }
    }
}

/// See `docs/` for more information on config values.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host and port to bind the HTTP webserver to.
    pub bind: String,

    /// The origin server requests are forwarded to.
    pub backend: Option<Url>,

    /// Configuration for internal logging.
    pub logging: Logging,

    /// Configuration for reporting metrics to a statsd instance.
    pub metrics: Metrics,

    /// DSN to report internal errors to
    pub sentry_dsn: Option<Dsn>,

    /// Cache tuning.
    pub cache: CacheOptions,

    /// The timeout for establishing a connection with the backend.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// The overall timeout for a single backend fetch.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// How long a coalesced waiter blocks on its flight before the watchdog
    /// converts it into a 502.
    #[serde(with = "humantime_serde")]
    pub coalesce_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: "127.0.0.1:3128".to_owned(),
            backend: None,
            logging: Logging::default(),
            metrics: Metrics::default(),
            sentry_dsn: None,
            cache: CacheOptions::default(),
            connect_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(30),
            coalesce_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn get(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            ),
            None => Ok(Config::default()),
        }
    }

    fn from_reader(reader: impl std::io::Read) -> Result<Self> {
        serde_yaml::from_reader(reader).context("failed to parse YAML")
    }
}

fn deserialize_level_filter<'de, D>(deserializer: D) -> Result<LevelFilter, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    value.parse().map_err(de::Error::custom)
}
