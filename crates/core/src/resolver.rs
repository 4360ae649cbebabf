use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use alloy::primitives::{TxHash, U64};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::Error,
    retry::{BackoffStep, RetryPolicy},
    rpc::{Connect, CorrelationChannel, MatchedResponse},
    Result,
};

pub const DEFAULT_BATCH_SIZE: usize = 80;
pub const DEFAULT_STAGGER: Duration = Duration::from_millis(10);
pub const DEFAULT_ROUND_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockNumberRecord {
    pub resolved: HashMap<TxHash, u64>,
    /// Input order, without duplicates.
    pub unresolved: Vec<TxHash>,
    /// False when the deadline or cancellation stopped resolution early.
    pub complete: bool,
    /// Number of lookups sent in each batch, across all sessions.
    pub batches: Vec<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxLocation {
    block_number: Option<U64>,
}

enum SessionEnd {
    Finished,
    Stopped,
}

/// Maps transaction hashes to the blocks that included them, in bounded
/// batches of `eth_getTransactionByHash` over one connection at a time.
pub struct BlockResolver<C> {
    connector: C,
    batch_size: usize,
    stagger: Duration,
    batch_interval: Duration,
    round_interval: Duration,
    deadline: Option<Duration>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl<C: Connect> BlockResolver<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            batch_size: DEFAULT_BATCH_SIZE,
            stagger: DEFAULT_STAGGER,
            batch_interval: DEFAULT_BATCH_INTERVAL,
            round_interval: DEFAULT_ROUND_INTERVAL,
            deadline: None,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Delay between two lookups of the same batch.
    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    /// Pause between two batches on the same connection.
    pub fn with_batch_interval(mut self, interval: Duration) -> Self {
        self.batch_interval = interval;
        self
    }

    /// Delay before reconnecting for another pass over unresolved hashes.
    pub fn with_round_interval(mut self, interval: Duration) -> Self {
        self.round_interval = interval;
        self
    }

    /// Give up on unresolved hashes after `deadline` and return what is known.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Keeps passing over the unresolved hashes until all have a block number,
    /// the deadline passes, or the run is cancelled.
    ///
    /// Only running out of reconnect attempts is an error; stopping early
    /// returns the partial record with `complete` unset.
    pub async fn resolve(&self, hashes: &[TxHash]) -> Result<BlockNumberRecord> {
        let mut seen = HashSet::new();
        let mut unresolved = hashes
            .iter()
            .copied()
            .filter(|h| seen.insert(*h))
            .collect::<Vec<_>>();
        let mut record = BlockNumberRecord::default();
        let stop = self.stop_signal();
        let mut backoff = self.retry.backoff();
        let mut pass = 0;

        let outcome = loop {
            if unresolved.is_empty() {
                record.complete = true;
                break Ok(());
            }
            if stop.is_cancelled() {
                break Ok(());
            }
            pass += 1;
            debug!("resolution pass {pass}: {} hashes unresolved", unresolved.len());

            let res = self.session(&unresolved, &mut record, &stop).await;
            unresolved.retain(|h| !record.resolved.contains_key(h));
            match res {
                Ok(SessionEnd::Stopped) => break Ok(()),
                Ok(SessionEnd::Finished) => {
                    backoff = self.retry.backoff();
                    if !unresolved.is_empty() {
                        info!(
                            "{} hashes not yet in a block, retrying in {:?}",
                            unresolved.len(),
                            self.round_interval
                        );
                        tokio::select! {
                            biased;
                            _ = stop.cancelled() => {}
                            _ = tokio::time::sleep(self.round_interval) => {}
                        }
                    }
                }
                Err(e) if e.is_connection() => match backoff.failed(&stop).await {
                    BackoffStep::Retry(delay) => {
                        warn!(
                            "lost connection to {} ({e}), reconnecting in {delay:?}",
                            self.connector.endpoint()
                        );
                    }
                    BackoffStep::Exhausted => {
                        break Err(Error::RetryExhausted {
                            label: "block resolution".to_owned(),
                            attempts: backoff.failures(),
                            last_error: e.to_string(),
                        });
                    }
                    BackoffStep::Cancelled => break Ok(()),
                },
                Err(e) => break Err(e),
            }
        };
        // stops the deadline timer
        stop.cancel();
        outcome?;

        if !record.complete {
            warn!(
                "stopped with {} of {} hashes unresolved",
                unresolved.len(),
                unresolved.len() + record.resolved.len()
            );
        }
        record.unresolved = unresolved;
        Ok(record)
    }

    /// A child of the run's token that additionally fires at the deadline.
    fn stop_signal(&self) -> CancellationToken {
        let stop = self.cancel.child_token();
        if let Some(deadline) = self.deadline {
            let timer = stop.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = timer.cancelled() => {}
                    _ = tokio::time::sleep(deadline) => {
                        info!("resolution deadline of {deadline:?} reached");
                        timer.cancel();
                    }
                }
            });
        }
        stop
    }

    async fn session(
        &self,
        unresolved: &[TxHash],
        record: &mut BlockNumberRecord,
        stop: &CancellationToken,
    ) -> Result<SessionEnd> {
        let mut channel = CorrelationChannel::open(&self.connector).await?;
        let mut res = Ok(SessionEnd::Finished);
        for (i, batch) in unresolved.chunks(self.batch_size).enumerate() {
            if i > 0 && !self.batch_interval.is_zero() {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => {
                        res = Ok(SessionEnd::Stopped);
                        break;
                    }
                    _ = tokio::time::sleep(self.batch_interval) => {}
                }
            }
            res = self.run_batch(&mut channel, batch, record, stop).await;
            if !matches!(res, Ok(SessionEnd::Finished)) {
                break;
            }
        }
        let dropped = channel.close().await;
        if !dropped.is_empty() {
            debug!("{} lookups unanswered at close", dropped.len());
        }
        res
    }

    async fn run_batch(
        &self,
        channel: &mut CorrelationChannel<C::Transport, TxHash>,
        batch: &[TxHash],
        record: &mut BlockNumberRecord,
        stop: &CancellationToken,
    ) -> Result<SessionEnd> {
        record.batches.push(batch.len());
        for (i, hash) in batch.iter().enumerate() {
            if i > 0 && !self.stagger.is_zero() {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => return Ok(SessionEnd::Stopped),
                    _ = tokio::time::sleep(self.stagger) => {}
                }
            }
            channel
                .send("eth_getTransactionByHash", json!([hash]), *hash)
                .await?;
        }

        while channel.pending_len() > 0 {
            match channel.receive_one(stop).await {
                Ok(Some(response)) => record_lookup(record, response),
                Ok(None) => return Ok(SessionEnd::Stopped),
                Err(e) if e.is_protocol() => warn!("{e}"),
                Err(e) => return Err(e),
            }
        }
        Ok(SessionEnd::Finished)
    }
}

fn record_lookup(record: &mut BlockNumberRecord, response: MatchedResponse<TxHash>) {
    let hash = response.key;
    let value = match response.result {
        Ok(value) => value,
        Err(failure) => {
            warn!("lookup of {hash} failed: {failure}");
            return;
        }
    };
    match serde_json::from_value::<Option<TxLocation>>(value) {
        Ok(Some(TxLocation {
            block_number: Some(number),
        })) => {
            record.resolved.insert(hash, number.to::<u64>());
        }
        // unknown to the node, or still in the mempool
        Ok(_) => {}
        Err(e) => warn!("unexpected transaction object for {hash}: {e}"),
    }
}
