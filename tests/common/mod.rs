#![allow(dead_code)]

use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::{SolCall, SolEvent};
use alloy_primitives::{Address, B256, Bytes, U256};
use anyhow::Result;
use async_trait::async_trait;
use inscription_indexer::broadcast::Broadcaster;
use inscription_indexer::config::SyncConfig;
use inscription_indexer::events::{Deploy, Inscribe, deployTokenCall, mintCall, tick_hash};
use inscription_indexer::repository::Database;
use inscription_indexer::rpc::{ChainSource, TokenInfo};
use inscription_indexer::scanner::SyncEngine;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const CONTRACT: Address = Address::new([0xc0; 20]);
pub const NOW: u64 = 1_800_000_000;

/// Scriptable chain: logs, token state, timestamps and calldata are set by
/// the test.
#[derive(Default)]
pub struct MockChain {
    pub head: Mutex<u64>,
    pub logs: Mutex<Vec<Log>>,
    pub token_infos: Mutex<HashMap<String, TokenInfo>>,
    pub timestamps: Mutex<HashMap<u64, u64>>,
    pub calldata: Mutex<HashMap<B256, Bytes>>,
    /// getLogs rejects any range containing this block.
    pub broken_block: Mutex<Option<u64>>,
    /// getLogs rejects ranges wider than this.
    pub max_range: Mutex<Option<u64>>,
    pub token_info_calls: AtomicUsize,
    next_tx: AtomicUsize,
}

impl MockChain {
    pub fn new(head: u64) -> Arc<Self> {
        let chain = MockChain::default();
        *chain.head.lock().unwrap() = head;
        Arc::new(chain)
    }

    pub fn set_head(&self, head: u64) {
        *self.head.lock().unwrap() = head;
    }

    pub fn set_token(&self, tick: &str, minted: u64, holders: u64) {
        self.token_infos.lock().unwrap().insert(
            tick.to_string(),
            TokenInfo {
                max_supply: U256::from(1_000u64),
                limit_per_mint: U256::from(10u64),
                minted: U256::from(minted),
                deployer: Address::repeat_byte(0xab),
                holders_count: U256::from(holders),
            },
        );
    }

    pub fn set_timestamp(&self, block: u64, time: u64) {
        self.timestamps.lock().unwrap().insert(block, time);
    }

    fn next_tx_hash(&self) -> B256 {
        let n = self.next_tx.fetch_add(1, Ordering::Relaxed) as u64 + 1;
        B256::left_padding_from(&n.to_be_bytes())
    }

    fn push_log(&self, data: alloy_primitives::LogData, block: u64, tx: B256, index: u64) {
        self.logs.lock().unwrap().push(Log {
            inner: alloy_primitives::Log {
                address: CONTRACT,
                data,
            },
            block_number: Some(block),
            transaction_hash: Some(tx),
            log_index: Some(index),
            ..Default::default()
        });
    }

    /// Adds a Deploy log emitted by a `deployToken` transaction.
    pub fn deploy(&self, tick: &str, block: u64) -> B256 {
        let tx = self.next_tx_hash();
        let call = deployTokenCall {
            tick: tick.to_string(),
            maxSupply: U256::from(1_000u64),
            limitPerMint: U256::from(10u64),
        };
        self.calldata
            .lock()
            .unwrap()
            .insert(tx, call.abi_encode().into());

        let event = Deploy {
            tick: tick_hash(tick),
            maxSupply: U256::from(1_000u64),
            limitPerMint: U256::from(10u64),
            deployer: Address::repeat_byte(0xab),
        };
        self.push_log(event.encode_log_data(), block, tx, 0);
        tx
    }

    /// Adds an Inscribe log. With `with_calldata` false the tick can only be
    /// resolved from already projected tokens.
    pub fn inscribe(&self, tick: &str, block: u64, number: u64, with_calldata: bool) -> B256 {
        let tx = self.next_tx_hash();
        if with_calldata {
            let call = mintCall {
                tick: tick.to_string(),
                amount: U256::from(10u64),
            };
            self.calldata
                .lock()
                .unwrap()
                .insert(tx, call.abi_encode().into());
        }

        let event = Inscribe {
            user: Address::repeat_byte(0x11),
            tick: tick_hash(tick),
            operation: "mint".to_string(),
            amount: U256::from(10u64),
            data: format!("{{\"p\":\"mrc-20\",\"op\":\"mint\",\"tick\":\"{tick}\"}}"),
            inscriptionNumber: U256::from(number),
        };
        self.push_log(event.encode_log_data(), block, tx, 1);
        tx
    }

    /// Adds a log carrying the Deploy signature but undecodable data.
    pub fn malformed_deploy(&self, block: u64) {
        let data = alloy_primitives::LogData::new_unchecked(
            vec![Deploy::SIGNATURE_HASH],
            Bytes::from_static(&[0x01, 0x02]),
        );
        let tx = self.next_tx_hash();
        self.push_log(data, block, tx, 0);
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn block_number(&self) -> Result<u64> {
        Ok(*self.head.lock().unwrap())
    }

    async fn logs(&self, filter: &Filter, from: u64, to: u64) -> Result<Vec<Log>> {
        if let Some(max) = *self.max_range.lock().unwrap() {
            if to - from + 1 > max {
                anyhow::bail!("block range too large");
            }
        }
        if let Some(block) = *self.broken_block.lock().unwrap() {
            if (from..=to).contains(&block) {
                anyhow::bail!("internal error");
            }
        }

        let mut logs: Vec<Log> = self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| {
                let block = log.block_number.unwrap_or_default();
                (from..=to).contains(&block) && filter.matches(&log.inner)
            })
            .cloned()
            .collect();
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(logs)
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64> {
        self.timestamps
            .lock()
            .unwrap()
            .get(&number)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("block {number} unavailable"))
    }

    async fn token_info(&self, tick: &str) -> Result<TokenInfo> {
        self.token_info_calls.fetch_add(1, Ordering::Relaxed);
        self.token_infos
            .lock()
            .unwrap()
            .get(tick)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("execution reverted: unknown tick {tick}"))
    }

    async fn transaction_input(&self, hash: B256) -> Result<Bytes> {
        self.calldata
            .lock()
            .unwrap()
            .get(&hash)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("transaction {hash:?} not found"))
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(10143)
    }
}

pub fn test_config() -> SyncConfig {
    SyncConfig {
        batch_delay: Duration::ZERO,
        initial_delay: Duration::ZERO,
        ..SyncConfig::default()
    }
}

pub struct Harness {
    pub chain: Arc<MockChain>,
    pub db: Database,
    pub broadcaster: Broadcaster,
    pub engine: SyncEngine,
}

pub fn harness(chain: Arc<MockChain>, start_block: u64) -> Harness {
    harness_with(chain, Database::in_memory().unwrap(), start_block, test_config())
}

pub fn harness_with(
    chain: Arc<MockChain>,
    db: Database,
    start_block: u64,
    config: SyncConfig,
) -> Harness {
    let broadcaster = Broadcaster::new(1024);
    let engine = SyncEngine::new(
        chain.clone(),
        db.clone(),
        broadcaster.clone(),
        CONTRACT,
        start_block,
        config,
    )
    .unwrap();
    Harness {
        chain,
        db,
        broadcaster,
        engine,
    }
}
