use crate::rpc::ChainSource;
use alloy::rpc::types::{Filter, Log};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("getLogs rejected single block {block}: {source}")]
    Exhausted {
        block: u64,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Default)]
pub struct FetchedLogs {
    pub logs: Vec<Log>,
    pub halvings: usize,
    pub requests: usize,
}

impl FetchedLogs {
    pub fn recovered(&self) -> bool {
        self.halvings > 0
    }
}

pub struct LogFetcher {
    batch_delay: Duration,
}

struct Segment {
    start: u64,
    end: u64,
    batch_size: u64,
}

impl LogFetcher {
    pub fn new(batch_delay: Duration) -> Self {
        Self { batch_delay }
    }

    pub async fn fetch(
        &self,
        source: &dyn ChainSource,
        filter: &Filter,
        from: u64,
        to: u64,
        batch_size: u64,
    ) -> Result<FetchedLogs, FetchError> {
        let mut fetched = FetchedLogs::default();
        if from > to {
            return Ok(fetched);
        }

        // top of the stack is always the lowest unfetched block
        let mut pending = vec![Segment {
            start: from,
            end: to,
            batch_size: batch_size.max(1),
        }];

        while let Some(segment) = pending.pop() {
            let chunk_end = segment
                .start
                .saturating_add(segment.batch_size - 1)
                .min(segment.end);

            if chunk_end < segment.end {
                pending.push(Segment {
                    start: chunk_end + 1,
                    end: segment.end,
                    batch_size: segment.batch_size,
                });
            }

            fetched.requests += 1;
            let result = source.logs(filter, segment.start, chunk_end).await;

            match result {
                Ok(logs) => {
                    debug!(
                        "Fetched {} logs for blocks {}-{}",
                        logs.len(),
                        segment.start,
                        chunk_end
                    );
                    fetched.logs.extend(logs);
                }
                Err(e) if segment.batch_size > 1 => {
                    let halved = segment.batch_size / 2;
                    warn!(
                        "getLogs failed for blocks {}-{} ({}), retrying with batch size {}",
                        segment.start, chunk_end, e, halved
                    );
                    fetched.halvings += 1;
                    pending.push(Segment {
                        start: segment.start,
                        end: chunk_end,
                        batch_size: halved,
                    });
                }
                Err(e) => {
                    return Err(FetchError::Exhausted {
                        block: segment.start,
                        source: e,
                    });
                }
            }

            sleep(self.batch_delay).await;
        }

        Ok(fetched)
    }
}
