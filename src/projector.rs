use crate::events::{LogMeta, decode_deploy_event, decode_inscribe_event, tick_from_calldata};
use crate::repository::{
    Database, InscriptionRecord, InscriptionRepository, LogPosition, TokenRecord, TokenRepository,
};
use crate::rpc::{ChainSource, TokenInfo};
use alloy::rpc::types::Log;
use alloy_primitives::{B256, U256};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionSummary {
    pub applied: usize,
    pub skipped: usize,
}

impl ProjectionSummary {
    fn record(&mut self, outcome: Result<()>, kind: &str, log: &Log) {
        match outcome {
            Ok(()) => self.applied += 1,
            Err(e) => {
                self.skipped += 1;
                warn!(
                    "Skipping {} log at block {:?} (tx {:?}): {:#}",
                    kind, log.block_number, log.transaction_hash, e
                );
            }
        }
    }
}

pub struct Projector {
    source: Arc<dyn ChainSource>,
    db: Database,
}

impl Projector {
    pub fn new(source: Arc<dyn ChainSource>, db: Database) -> Self {
        Self { source, db }
    }

    pub async fn project_deploys(&self, logs: &[Log]) -> ProjectionSummary {
        let mut summary = ProjectionSummary::default();
        for log in logs {
            summary.record(self.project_deploy(log).await, "Deploy", log);
        }
        summary
    }

    pub async fn project_inscribes(&self, logs: &[Log], now: u64) -> ProjectionSummary {
        let mut summary = ProjectionSummary::default();
        let mut timestamps = HashMap::new();
        for log in logs {
            let outcome = self.project_inscribe(log, &mut timestamps, now).await;
            summary.record(outcome, "Inscribe", log);
        }
        summary
    }

    async fn project_deploy(&self, log: &Log) -> Result<()> {
        let event = decode_deploy_event(log)?;
        let tick = self.resolve_tick(&event.tick_hash, &event.meta).await?;
        let info = self
            .source
            .token_info(&tick)
            .await
            .with_context(|| format!("getTokenInfo({tick}) failed"))?;

        let record = token_record(&tick, &info, Some(event.meta.block_number));
        let conn = self.db.lock()?;
        TokenRepository::new(&conn).upsert(&record)?;
        debug!("Projected deploy of {} at block {}", tick, event.meta.block_number);
        Ok(())
    }

    async fn project_inscribe(
        &self,
        log: &Log,
        timestamps: &mut HashMap<u64, u64>,
        now: u64,
    ) -> Result<()> {
        let event = decode_inscribe_event(log)?;
        let tick = self.resolve_tick(&event.tick_hash, &event.meta).await?;
        let time = self
            .block_time(event.meta.block_number, timestamps, now)
            .await;

        let record = InscriptionRecord {
            block_number: event.meta.block_number,
            user: event.user.to_string(),
            tick: tick.clone(),
            operation: event.operation,
            amount: event.amount.to_string(),
            data: event.data,
            inscription_number: event.inscription_number.to_string(),
            time,
        };
        let position = LogPosition {
            transaction_hash: event.meta.transaction_hash.map(|h| format!("{h:?}")),
            log_index: event.meta.log_index,
        };

        let inserted = {
            let conn = self.db.lock()?;
            InscriptionRepository::new(&conn).insert(&record, &position)?
        };
        if inserted.is_none() {
            debug!(
                "Inscription {} already recorded, refreshing token only",
                record.inscription_number
            );
        }

        // the inscription stays recorded even if the refresh fails
        if let Err(e) = self.refresh_token(&tick).await {
            warn!(
                "Inscription {} stored but token {} not refreshed: {:#}",
                record.inscription_number, tick, e
            );
        }
        Ok(())
    }

    async fn refresh_token(&self, tick: &str) -> Result<()> {
        let info = self
            .source
            .token_info(tick)
            .await
            .with_context(|| format!("getTokenInfo({tick}) failed"))?;
        let conn = self.db.lock()?;
        TokenRepository::new(&conn).upsert(&token_record(tick, &info, None))?;
        Ok(())
    }

    async fn resolve_tick(&self, hash: &B256, meta: &LogMeta) -> Result<String> {
        let known = {
            let conn = self.db.lock()?;
            TokenRepository::new(&conn).find_tick_by_hash(hash)?
        };
        if let Some(tick) = known {
            return Ok(tick);
        }

        let tx_hash = meta
            .transaction_hash
            .with_context(|| format!("Unknown tick {hash:?} and log has no transaction hash"))?;
        let input = self.source.transaction_input(tx_hash).await?;
        tick_from_calldata(&input, *hash)
            .with_context(|| format!("Cannot recover tick {hash:?} from transaction {tx_hash:?}"))
    }

    async fn block_time(&self, block: u64, cache: &mut HashMap<u64, u64>, now: u64) -> u64 {
        if let Some(time) = cache.get(&block) {
            return *time;
        }
        match self.source.block_timestamp(block).await {
            Ok(time) => {
                cache.insert(block, time);
                time
            }
            Err(e) => {
                warn!(
                    "Block {} timestamp unavailable ({}), using wall clock",
                    block, e
                );
                now
            }
        }
    }
}

// largest count SQLite can store as INTEGER
const MAX_HOLDERS: u64 = i64::MAX as u64;

fn token_record(tick: &str, info: &TokenInfo, deployed_at: Option<u64>) -> TokenRecord {
    TokenRecord {
        tick: tick.to_string(),
        max_supply: info.max_supply.to_string(),
        limit_per_mint: info.limit_per_mint.to_string(),
        minted: info.minted.to_string(),
        deployer: info.deployer.to_string(),
        holders_count: u64::try_from(info.holders_count.min(U256::from(MAX_HOLDERS)))
            .unwrap_or(MAX_HOLDERS),
        deployed_at,
    }
}
