use crate::events::getTokenInfoCall;
use alloy::consensus::Transaction as _;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{BlockNumberOrTag, Filter, Log, TransactionRequest};
use alloy::sol_types::SolCall;
use alloy_primitives::{Address, B256, Bytes, U256};
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::time::timeout;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

static RANGE_LIMIT_ERROR: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(exceed|too many|too large|block range|range limit|max results|more than \d+ (results|logs)|response size|limit exceeded)",
    )
    .ok()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub max_supply: U256,
    pub limit_per_mint: U256,
    pub minted: U256,
    pub deployer: Address,
    pub holders_count: U256,
}

#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn block_number(&self) -> Result<u64>;

    async fn logs(&self, filter: &Filter, from: u64, to: u64) -> Result<Vec<Log>>;

    async fn block_timestamp(&self, number: u64) -> Result<u64>;

    async fn token_info(&self, tick: &str) -> Result<TokenInfo>;

    async fn transaction_input(&self, hash: B256) -> Result<Bytes>;

    async fn chain_id(&self) -> Result<u64>;
}

pub fn is_range_limit_error(message: &str) -> bool {
    RANGE_LIMIT_ERROR
        .as_ref()
        .is_some_and(|re| re.is_match(message))
}

#[derive(Clone)]
pub struct RpcClient {
    providers: Vec<DynProvider>,
    urls: Vec<String>,
    current_provider: Arc<AtomicUsize>,
    contract_address: Address,
    max_retries: usize,
}

impl RpcClient {
    pub fn new(rpc_urls: &[String], contract_address: Address) -> Result<Self> {
        if rpc_urls.is_empty() {
            return Err(anyhow::anyhow!("At least one RPC URL must be provided"));
        }

        let mut providers = Vec::new();
        for url in rpc_urls {
            let parsed_url = url
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid RPC URL: {}", url))?;
            let provider = ProviderBuilder::new().connect_http(parsed_url).erased();
            providers.push(provider);
        }

        Ok(RpcClient {
            providers,
            urls: rpc_urls.to_vec(),
            current_provider: Arc::new(AtomicUsize::new(0)),
            contract_address,
            max_retries: 5,
        })
    }

    fn get_provider(&self) -> &DynProvider {
        let index = self.current_provider.load(Ordering::Relaxed) % self.providers.len();
        &self.providers[index]
    }

    pub fn get_current_url(&self) -> &str {
        let index = self.current_provider.load(Ordering::Relaxed) % self.urls.len();
        &self.urls[index]
    }

    pub fn rotate_provider(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.providers.len();
        self.current_provider.store(next, Ordering::Relaxed);

        if self.providers.len() > 1 {
            debug!("Rotating to RPC provider #{}", next);
        }
    }

    fn get_retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries)
    }

    fn handle_error(&self, error_str: &str) {
        let current_url = self.get_current_url();
        warn!(
            "RPC error on {}: {}, rotating provider",
            current_url, error_str
        );
        self.rotate_provider();
    }

    fn handle_timeout(&self) -> anyhow::Error {
        let current_url = self.get_current_url();
        warn!(
            "Request timeout after {} seconds on {}, rotating provider",
            REQUEST_TIMEOUT.as_secs(),
            current_url
        );
        self.rotate_provider();
        anyhow::anyhow!(
            "Request timeout after {} seconds",
            REQUEST_TIMEOUT.as_secs()
        )
    }

    async fn request<T, E, F, Fut>(&self, request: F) -> Result<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        Retry::spawn(self.get_retry_strategy(), || {
            let client = self.clone();
            let future = request(client.get_provider().clone());
            async move {
                match timeout(REQUEST_TIMEOUT, future).await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => {
                        let error_str = e.to_string();
                        client.handle_error(&error_str);
                        Err(anyhow::anyhow!("{}", error_str))
                    }
                    Err(_) => Err(client.handle_timeout()),
                }
            }
        })
        .await
    }
}

#[async_trait]
impl ChainSource for RpcClient {
    async fn block_number(&self) -> Result<u64> {
        self.request(|provider| async move { provider.get_block_number().await })
            .await
    }

    async fn logs(&self, filter: &Filter, from: u64, to: u64) -> Result<Vec<Log>> {
        let filter = filter.clone().from_block(from).to_block(to);
        let client = self.clone();

        Retry::spawn(self.get_retry_strategy(), move || {
            let client = client.clone();
            let filter = filter.clone();
            async move {
                let provider = client.get_provider();
                match timeout(REQUEST_TIMEOUT, provider.get_logs(&filter)).await {
                    Ok(Ok(logs)) => Ok(Ok(logs)),
                    Ok(Err(e)) => {
                        let error_str = e.to_string();

                        if is_range_limit_error(&error_str) {
                            debug!(
                                "Range limit hit for blocks {}-{}, leaving split to the caller",
                                from, to
                            );
                            // not retried: a smaller range is the only fix
                            Ok(Err(anyhow::anyhow!("{}", e)))
                        } else {
                            client.handle_error(&error_str);
                            Err(anyhow::anyhow!("{}", e))
                        }
                    }
                    Err(_) => Err(client.handle_timeout()),
                }
            }
        })
        .await
        .and_then(|r| r)
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64> {
        let block = self
            .request(|provider| async move {
                provider
                    .get_block_by_number(BlockNumberOrTag::Number(number))
                    .await
            })
            .await?;
        let block = block.with_context(|| format!("Block {number} not found"))?;
        Ok(block.header.timestamp)
    }

    async fn token_info(&self, tick: &str) -> Result<TokenInfo> {
        let input: Bytes = getTokenInfoCall {
            tick: tick.to_string(),
        }
        .abi_encode()
        .into();
        let contract = self.contract_address;

        let result = self
            .request(|provider| {
                let tx = TransactionRequest::default()
                    .to(contract)
                    .input(input.clone().into());
                async move { provider.call(tx).await }
            })
            .await?;

        let decoded = getTokenInfoCall::abi_decode_returns(&result)
            .with_context(|| format!("Failed to decode getTokenInfo({tick}) result"))?;

        Ok(TokenInfo {
            max_supply: decoded.maxSupply,
            limit_per_mint: decoded.limitPerMint,
            minted: decoded.minted,
            deployer: decoded.deployer,
            holders_count: decoded.holdersCount,
        })
    }

    async fn transaction_input(&self, hash: B256) -> Result<Bytes> {
        let transaction = self
            .request(|provider| async move { provider.get_transaction_by_hash(hash).await })
            .await?
            .with_context(|| format!("Transaction {hash:?} not found"))?;
        Ok(transaction.input().clone())
    }

    async fn chain_id(&self) -> Result<u64> {
        self.request(|provider| async move { provider.get_chain_id().await })
            .await
    }
}
