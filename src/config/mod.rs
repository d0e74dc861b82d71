mod counter;
mod error;

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::Result;
use serde::Deserialize;

pub use self::counter::{parse_address, CounterConfig};
pub use self::error::ConfigError;

#[derive(Debug, clap::Parser)]
struct Args {
    #[clap(
        long,
        default_value = "nonce-counter.toml",
        env = "NONCE_COUNTER_CONFIG"
    )]
    config: PathBuf,
}

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub rpc: RpcConfig,
    pub counter: CounterConfig,

    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RpcConfig {
    pub url: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct SyncConfig {
    /// Wait before retrying a failed tip or log fetch
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Wait after a range that reached the chain tip
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl SyncConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    pub fn read() -> Result<Self> {
        let args = Args::parse();

        Self::read_from(args.config.as_path())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let mut config: Self = toml::from_str(&std::fs::read_to_string(path)?)?;
        config.counter.preload()?;

        Ok(config)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry_backoff_ms: default_retry_backoff_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_retry_backoff_ms() -> u64 {
    5000
}

fn default_poll_interval_ms() -> u64 {
    12000
}
