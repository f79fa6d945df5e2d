//! Configuration for the escrow client.
//!
//! A [`ClientConfig`] is built once at startup (from a TOML file, CLI flags or
//! both) and handed by value to every service client. Nothing reads it from
//! global state.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Ledger environment targeted by requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Network {
    /// Pre-production test network.
    #[default]
    Preprod,
    /// Main network.
    Mainnet,
}

impl Network {
    /// Name used on the wire and in query strings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Preprod => "Preprod",
            Self::Mainnet => "Mainnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "preprod" => Ok(Self::Preprod),
            "mainnet" => Ok(Self::Mainnet),
            other => Err(Error::Config(format!("unknown network: {other}"))),
        }
    }
}

/// Base URL and API key of one remote service.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Base URL, e.g. `https://payment.example.com/api/v1`.
    pub base_url: String,
    /// API key sent in the `token` header.
    pub api_key: String,
}

impl ServiceEndpoint {
    /// Create an endpoint.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Join a relative path onto the base URL.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::Config(format!("{name} base_url must be set")));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "{name} base_url must be an http(s) URL: {}",
                self.base_url
            )));
        }
        if self.api_key.trim().is_empty() {
            return Err(Error::Config(format!("{name} api_key must be set")));
        }
        Ok(())
    }
}

impl fmt::Debug for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceEndpoint")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Ledger environment.
    #[serde(default)]
    pub network: Network,

    /// Transport timeout per request, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Payment service endpoint.
    pub payment: ServiceEndpoint,

    /// Registry service endpoint, needed only for agent registration.
    #[serde(default)]
    pub registry: Option<ServiceEndpoint>,

    /// Retry policy for read-only status fetches.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Status monitor settings.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Default deadline windows for new payment requests.
    #[serde(default)]
    pub deadlines: DeadlineWindows,
}

/// Retry policy for idempotent requests.
///
/// Only GET status fetches are retried, and only on transient failures.
/// State-changing requests are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. `1` disables retries.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

/// Status monitor configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Poll interval in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Page size used when scanning list endpoints for a record.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Pages scanned before a record is reported as not found. Only the
    /// newest `page_size * max_pages` escrows can be looked up.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

/// Offsets from "now", in seconds, used to derive a deadline schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlineWindows {
    /// Offset of the pay-by deadline.
    #[serde(default = "default_pay_by")]
    pub pay_by_secs: u64,
    /// Offset of the result submission deadline.
    #[serde(default = "default_submit_result")]
    pub submit_result_secs: u64,
    /// Offset of the unlock time.
    #[serde(default = "default_unlock")]
    pub unlock_secs: u64,
    /// Offset of the external dispute unlock time.
    #[serde(default = "default_external_dispute_unlock")]
    pub external_dispute_unlock_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    /// Delay between attempts.
    #[must_use]
    pub const fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            page_size: default_page_size(),
            max_pages: default_max_pages(),
        }
    }
}

impl MonitorConfig {
    /// Poll interval as a duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for DeadlineWindows {
    fn default() -> Self {
        Self {
            pay_by_secs: default_pay_by(),
            submit_result_secs: default_submit_result(),
            unlock_secs: default_unlock(),
            external_dispute_unlock_secs: default_external_dispute_unlock(),
        }
    }
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_max_attempts() -> u32 {
    1
}

const fn default_backoff_ms() -> u64 {
    500
}

const fn default_poll_interval() -> u64 {
    30
}

const fn default_page_size() -> u32 {
    10
}

const fn default_max_pages() -> u32 {
    20
}

const fn default_pay_by() -> u64 {
    3_600 // 1 hour
}

const fn default_submit_result() -> u64 {
    43_200 // 12 hours
}

const fn default_unlock() -> u64 {
    64_800 // 18 hours
}

const fn default_external_dispute_unlock() -> u64 {
    86_400 // 24 hours
}

impl ClientConfig {
    /// Create a configuration with defaults for everything but the payment
    /// endpoint.
    #[must_use]
    pub fn new(payment: ServiceEndpoint) -> Self {
        Self {
            payment,
            registry: None,
            network: Network::default(),
            request_timeout_secs: default_request_timeout(),
            retry: RetryPolicy::default(),
            monitor: MonitorConfig::default(),
            deadlines: DeadlineWindows::default(),
        }
    }

    /// Transport timeout per request.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Default location of the config file.
    #[must_use]
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "masumi").map_or_else(
            || PathBuf::from(".masumi").join("config.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        self.payment.validate("payment")?;
        if let Some(registry) = &self.registry {
            registry.validate("registry")?;
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config("request_timeout_secs must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.monitor.poll_interval_secs == 0 {
            return Err(Error::Config("monitor.poll_interval_secs must be positive".into()));
        }
        if self.monitor.page_size == 0 {
            return Err(Error::Config("monitor.page_size must be positive".into()));
        }
        if self.monitor.max_pages == 0 {
            return Err(Error::Config("monitor.max_pages must be positive".into()));
        }
        let d = &self.deadlines;
        if !(d.pay_by_secs < d.submit_result_secs
            && d.submit_result_secs < d.unlock_secs
            && d.unlock_secs <= d.external_dispute_unlock_secs)
        {
            return Err(Error::Config(format!(
                "deadline windows out of order: {}/{}/{}/{}",
                d.pay_by_secs, d.submit_result_secs, d.unlock_secs, d.external_dispute_unlock_secs
            )));
        }
        Ok(())
    }
}
