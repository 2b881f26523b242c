use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_RPC_URL: &str = "https://testnet-rpc.monad.xyz";
const DEFAULT_CONTRACT_ADDRESS: &str = "0x07169f0F890C3595421512D98DC79b8bce6E5fA6";

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_urls: Vec<String>,
    pub contract_address: Address,
    pub chain_id: u64,
    pub port: u16,
    pub start_block: u64,
    pub database_url: String,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub poll_interval: Duration,
    pub initial_delay: Duration,
    pub batch_size: u64,
    pub batch_delay: Duration,
    pub recent_window: usize,
    pub pass_timeout: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            initial_delay: Duration::from_secs(2),
            batch_size: 100,
            batch_delay: Duration::from_millis(80),
            recent_window: 200,
            pass_timeout: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let rpc_urls: Vec<String> = env_or("RPC_URL", DEFAULT_RPC_URL)
            .split(',')
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect();
        if rpc_urls.is_empty() {
            anyhow::bail!("RPC_URL must contain at least one endpoint");
        }

        let contract_address_str = env_or("CONTRACT_ADDRESS", DEFAULT_CONTRACT_ADDRESS);
        let contract_address = Address::from_str(&contract_address_str)
            .context("Invalid CONTRACT_ADDRESS format")?;

        let defaults = SyncConfig::default();
        let sync = SyncConfig {
            poll_interval: Duration::from_secs(parse_env("POLL_INTERVAL_SECS", 10)?),
            initial_delay: Duration::from_secs(parse_env("INITIAL_DELAY_SECS", 2)?),
            batch_size: parse_env("LOG_BATCH_SIZE", defaults.batch_size)?.max(1),
            batch_delay: Duration::from_millis(parse_env("LOG_BATCH_DELAY_MS", 80)?),
            recent_window: parse_env("RECENT_INSCRIPTIONS", defaults.recent_window)?,
            pass_timeout: parse_optional_env::<u64>("PASS_TIMEOUT_SECS")?
                .map(Duration::from_secs),
        };

        Ok(Config {
            rpc_urls,
            contract_address,
            chain_id: parse_env("CHAIN_ID", 10143)?,
            port: parse_env("PORT", 3000)?,
            start_block: parse_env("START_BLOCK", 0)?,
            database_url: env_or("DATABASE_URL", "sqlite:./data.db"),
            sync,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(parse_optional_env(key)?.unwrap_or(default))
}

fn parse_optional_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid {key} value: {raw}")),
        _ => Ok(None),
    }
}
