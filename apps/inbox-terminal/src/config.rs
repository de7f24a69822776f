//! Environment-backed runtime configuration for `inbox-terminal`.

use std::{env, error::Error, fmt, path::PathBuf, time::Duration};

use inbox_core::{DEFAULT_PAGE_SIZE, DEFAULT_RECONNECT_DELAY_MS};
use inbox_http::{DEFAULT_BASE_URL, RuntimeConfig};
use url::Url;

const DEFAULT_DATA_DIR: &str = "./.inbox-terminal-store";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_MEDIA_CACHE_BYTES: u64 = 256 * 1024 * 1024;
const MEDIA_CACHE_DIRNAME: &str = "media-cache";

/// Runtime configuration used by the terminal client.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalConfig {
    /// Backend REST base URL. The push URL is derived from it.
    pub base_url: Url,
    /// History page size requested per `load older`.
    pub page_size: u16,
    /// Fixed delay between push reconnect attempts.
    pub reconnect_delay_ms: u64,
    /// Per-request REST timeout.
    pub request_timeout_ms: u64,
    /// Root directory for local state.
    pub data_dir: PathBuf,
    /// Media cache capacity in bytes.
    pub media_cache_bytes: u64,
}

impl TerminalConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let raw_base = optional_trimmed_env("INBOX_BASE_URL", &mut lookup)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        let base_url = Url::parse(&raw_base).map_err(|err| ConfigError::InvalidValue {
            key: "INBOX_BASE_URL",
            value: raw_base.clone(),
            reason: err.to_string(),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                key: "INBOX_BASE_URL",
                value: raw_base,
                reason: "scheme must be http or https".to_owned(),
            });
        }

        let page_size = parse_optional_u16("INBOX_PAGE_SIZE", &mut lookup)?
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let reconnect_delay_ms = parse_optional_u64("INBOX_RECONNECT_DELAY_MS", &mut lookup)?
            .unwrap_or(DEFAULT_RECONNECT_DELAY_MS);
        let request_timeout_ms = parse_optional_u64("INBOX_REQUEST_TIMEOUT_MS", &mut lookup)?
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);
        let media_cache_bytes = parse_optional_u64("INBOX_MEDIA_CACHE_BYTES", &mut lookup)?
            .unwrap_or(DEFAULT_MEDIA_CACHE_BYTES);
        let data_dir = optional_trimmed_env("INBOX_DATA_DIR", &mut lookup)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        for (key, value) in [
            ("INBOX_PAGE_SIZE", u64::from(page_size)),
            ("INBOX_RECONNECT_DELAY_MS", reconnect_delay_ms),
            ("INBOX_REQUEST_TIMEOUT_MS", request_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key,
                    value: "0".to_owned(),
                    reason: "must be at least 1".to_owned(),
                });
            }
        }

        Ok(Self {
            base_url,
            page_size,
            reconnect_delay_ms,
            request_timeout_ms,
            data_dir,
            media_cache_bytes,
        })
    }

    /// Settings for the transport runtime.
    pub fn runtime_config(&self) -> RuntimeConfig {
        let mut config = RuntimeConfig::new(self.base_url.clone());
        config.reconnect_delay_ms = self.reconnect_delay_ms;
        config.request_timeout = Duration::from_millis(self.request_timeout_ms);
        config
    }

    pub fn media_cache_dir(&self) -> PathBuf {
        self.data_dir.join(MEDIA_CACHE_DIRNAME)
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid {key}='{value}': {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_optional_u16<F>(key: &'static str, lookup: &mut F) -> Result<Option<u16>, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(None);
    };
    value
        .parse::<u16>()
        .map(Some)
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}

fn parse_optional_u64<F>(key: &'static str, lookup: &mut F) -> Result<Option<u64>, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(None);
    };
    value
        .parse::<u64>()
        .map(Some)
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}
