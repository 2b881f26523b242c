use crate::broadcast::Broadcaster;
use crate::config::SyncConfig;
use crate::events::{Deploy, Inscribe};
use crate::fetcher::LogFetcher;
use crate::projector::{ProjectionSummary, Projector};
use crate::repository::{Database, LAST_SYNCED_BLOCK, MetaRepository};
use crate::rpc::ChainSource;
use alloy::rpc::types::Filter;
use alloy::sol_types::SolEvent;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

#[derive(Debug, Default)]
pub struct SyncStats {
    completed_passes: AtomicU64,
    aborted_passes: AtomicU64,
    skipped_logs: AtomicU64,
    last_pass_at: AtomicU64,
    last_synced_block: AtomicI64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatsSnapshot {
    pub completed_passes: u64,
    pub aborted_passes: u64,
    pub skipped_logs: u64,
    pub last_pass_at: Option<u64>,
    pub last_synced_block: i64,
}

impl SyncStats {
    pub fn snapshot(&self) -> SyncStatsSnapshot {
        let last_pass_at = self.last_pass_at.load(Ordering::Relaxed);
        SyncStatsSnapshot {
            completed_passes: self.completed_passes.load(Ordering::Relaxed),
            aborted_passes: self.aborted_passes.load(Ordering::Relaxed),
            skipped_logs: self.skipped_logs.load(Ordering::Relaxed),
            last_pass_at: (last_pass_at > 0).then_some(last_pass_at),
            last_synced_block: self.last_synced_block.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub from: u64,
    pub to: u64,
    pub deploys: ProjectionSummary,
    pub inscriptions: ProjectionSummary,
    pub halvings: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassResult {
    UpToDate { cursor: i64, head: u64 },
    Synced(PassSummary),
}

pub struct SyncEngine {
    source: Arc<dyn ChainSource>,
    db: Database,
    broadcaster: Broadcaster,
    fetcher: LogFetcher,
    projector: Projector,
    deploy_filter: Filter,
    inscribe_filter: Filter,
    config: SyncConfig,
    stats: Arc<SyncStats>,
    cursor: i64,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn ChainSource>,
        db: Database,
        broadcaster: Broadcaster,
        contract_address: Address,
        start_block: u64,
        config: SyncConfig,
    ) -> Result<Self> {
        let initial = i64::try_from(start_block)
            .context("START_BLOCK out of range")?
            - 1;
        let cursor = {
            let conn = db.lock()?;
            MetaRepository::new(&conn).init_i64(LAST_SYNCED_BLOCK, initial)?
        };
        info!("Sync cursor at block {}", cursor);

        let stats = Arc::new(SyncStats::default());
        stats.last_synced_block.store(cursor, Ordering::Relaxed);

        Ok(SyncEngine {
            projector: Projector::new(source.clone(), db.clone()),
            fetcher: LogFetcher::new(config.batch_delay),
            deploy_filter: Filter::new()
                .address(contract_address)
                .event_signature(Deploy::SIGNATURE_HASH),
            inscribe_filter: Filter::new()
                .address(contract_address)
                .event_signature(Inscribe::SIGNATURE_HASH),
            source,
            db,
            broadcaster,
            config,
            stats,
            cursor,
        })
    }

    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    pub fn stats(&self) -> Arc<SyncStats> {
        self.stats.clone()
    }

    /// Runs one pass. An `Err` means the pass was aborted and the cursor is
    /// unchanged; per-log failures are counted, not returned.
    pub async fn run_once(&mut self, now: u64) -> Result<PassResult> {
        let head = self.source.block_number().await?;
        let from = u64::try_from(self.cursor + 1).unwrap_or(0);

        if from > head {
            return Ok(PassResult::UpToDate {
                cursor: self.cursor,
                head,
            });
        }

        info!("Indexing from {} to {}", from, head);

        let deploy_logs = self
            .fetcher
            .fetch(
                self.source.as_ref(),
                &self.deploy_filter,
                from,
                head,
                self.config.batch_size,
            )
            .await
            .context("Deploy log fetch failed")?;
        let deploys = self.projector.project_deploys(&deploy_logs.logs).await;

        let inscribe_logs = self
            .fetcher
            .fetch(
                self.source.as_ref(),
                &self.inscribe_filter,
                from,
                head,
                self.config.batch_size,
            )
            .await
            .context("Inscribe log fetch failed")?;
        let inscriptions = self
            .projector
            .project_inscribes(&inscribe_logs.logs, now)
            .await;

        self.advance_cursor(head)?;

        let summary = PassSummary {
            from,
            to: head,
            deploys,
            inscriptions,
            halvings: deploy_logs.halvings + inscribe_logs.halvings,
        };
        self.stats.completed_passes.fetch_add(1, Ordering::Relaxed);
        self.stats.skipped_logs.fetch_add(
            (deploys.skipped + inscriptions.skipped) as u64,
            Ordering::Relaxed,
        );
        self.stats.last_pass_at.store(now, Ordering::Relaxed);

        if let Err(e) = self
            .broadcaster
            .publish_pass(&self.db, self.config.recent_window)
        {
            warn!("Broadcast after pass failed: {:#}", e);
        }

        Ok(PassResult::Synced(summary))
    }

    fn advance_cursor(&mut self, to: u64) -> Result<()> {
        let to = i64::try_from(to).context("Block number out of range")?;
        if to <= self.cursor {
            return Ok(());
        }
        {
            let conn = self.db.lock()?;
            MetaRepository::new(&conn).set_i64(LAST_SYNCED_BLOCK, to)?;
        }
        self.cursor = to;
        self.stats.last_synced_block.store(to, Ordering::Relaxed);
        Ok(())
    }

    pub async fn tick(&mut self) {
        let now = unix_now();
        let outcome = match self.config.pass_timeout {
            Some(limit) => timeout(limit, self.run_once(now))
                .await
                .unwrap_or_else(|_| {
                    Err(anyhow::anyhow!(
                        "Pass timed out after {} seconds",
                        limit.as_secs()
                    ))
                }),
            None => self.run_once(now).await,
        };

        match outcome {
            Ok(PassResult::UpToDate { cursor, head }) => {
                info!("Up to date at block {} (head {})", cursor, head);
            }
            Ok(PassResult::Synced(summary)) => {
                info!(
                    "Synced blocks {} to {}: {} deploys, {} inscriptions, {} skipped logs",
                    summary.from,
                    summary.to,
                    summary.deploys.applied,
                    summary.inscriptions.applied,
                    summary.deploys.skipped + summary.inscriptions.skipped
                );
            }
            Err(e) => {
                self.stats.aborted_passes.fetch_add(1, Ordering::Relaxed);
                error!(
                    "Sync pass aborted, cursor stays at {}: {:#}",
                    self.cursor, e
                );
            }
        }
    }

    pub async fn run(mut self) {
        sleep(self.config.initial_delay).await;
        loop {
            self.tick().await;
            sleep(self.config.poll_interval).await;
        }
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
