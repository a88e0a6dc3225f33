use crate::header::HEADER_LEN;
use crate::lock::SeqLock;
use crate::retry::RetryConfig;
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_REGION_NAME: &str = "/seqlock_region";

/// Payload that, together with the header, fills one 4 KiB page.
pub const DEFAULT_PAYLOAD_SIZE: usize = 4096 - HEADER_LEN;

#[derive(Debug, Clone)]
pub struct RegionConfig {
    pub name: String,
    pub payload_size: usize,
    pub retry: RetryConfig,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_REGION_NAME.to_string(),
            payload_size: DEFAULT_PAYLOAD_SIZE,
            retry: RetryConfig::default(),
        }
    }
}

impl RegionConfig {
    /// Read the region settings from the environment.
    ///
    /// Unset variables fall back to the defaults; set but malformed variables
    /// are an error.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let name = read_var("SEQLOCK_NAME")?.unwrap_or(defaults.name);

        let payload_size = parse_var("SEQLOCK_SIZE")?.unwrap_or(defaults.payload_size);

        let max_attempts =
            parse_var("SEQLOCK_RETRY_ATTEMPTS")?.unwrap_or(defaults.retry.max_attempts);

        let base_delay = parse_var("SEQLOCK_RETRY_BASE_US")?
            .map(Duration::from_micros)
            .unwrap_or(defaults.retry.base_delay);

        let max_delay = parse_var("SEQLOCK_RETRY_MAX_US")?
            .map(Duration::from_micros)
            .unwrap_or(defaults.retry.max_delay);

        Ok(Self {
            name,
            payload_size,
            retry: RetryConfig {
                max_attempts,
                base_delay,
                max_delay,
            },
        })
    }

    /// Create or attach to the configured region.
    pub fn open(&self) -> Result<SeqLock> {
        SeqLock::create(&self.name, self.payload_size)
            .with_context(|| format!("Failed to open seqlock region {}", self.name))
    }
}

/// `None` if unset, an error if set but not valid unicode.
fn read_var(key: &str) -> Result<Option<String>> {
    match env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Could not read {}", key)),
    }
}

fn parse_var<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    read_var(key)?
        .map(|value| {
            value
                .trim()
                .parse()
                .with_context(|| format!("Invalid value for {}: {:?}", key, value))
        })
        .transpose()
}
