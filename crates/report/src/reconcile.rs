use std::collections::BTreeMap;

use async_trait::async_trait;
use tpsbench_core::{provider::RetryingProvider, resolver::BlockNumberRecord};
use tracing::{debug, info};

use crate::{inclusion::InclusionRow, log_parser::SentTx, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockSummary {
    pub timestamp: u64,
    pub tx_count: usize,
}

/// Fetches the header facts the report needs for one block.
#[async_trait]
pub trait BlockSource: Sync {
    async fn block_summary(&self, number: u64) -> Result<Option<BlockSummary>>;
}

#[async_trait]
impl BlockSource for RetryingProvider {
    async fn block_summary(&self, number: u64) -> Result<Option<BlockSummary>> {
        Ok(self.block(number).await?.map(|block| BlockSummary {
            timestamp: block.header.timestamp,
            tx_count: block.transactions.len(),
        }))
    }
}

/// Joins accepted sends with their resolved block numbers, fetching each
/// distinct block once. Rows keep the order of `sends`.
pub async fn reconcile(
    sends: &[SentTx],
    record: &BlockNumberRecord,
    blocks: &impl BlockSource,
) -> Result<Vec<InclusionRow>> {
    let mut cache: BTreeMap<u64, Option<BlockSummary>> = BTreeMap::new();
    let mut rows = Vec::with_capacity(sends.len());

    for sent in sends {
        let block_num = record.resolved.get(&sent.hash).copied();
        let summary = match block_num {
            Some(number) => {
                if !cache.contains_key(&number) {
                    debug!("fetching block {number}");
                    cache.insert(number, blocks.block_summary(number).await?);
                }
                cache.get(&number).copied().flatten()
            }
            None => None,
        };
        rows.push(InclusionRow {
            sent_at_ms: sent.sent_at_ms,
            hash: sent.hash,
            block_num,
            block_timestamp: summary.map(|s| s.timestamp),
            block_all_txs: summary.map_or(0, |s| s.tx_count),
        });
    }

    info!(
        "reconciled {} transactions across {} blocks",
        rows.len(),
        cache.len()
    );
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::TxHash;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeChain {
        fetched: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl BlockSource for FakeChain {
        async fn block_summary(&self, number: u64) -> Result<Option<BlockSummary>> {
            self.fetched.lock().unwrap().push(number);
            Ok(Some(BlockSummary {
                timestamp: 1_000 + number,
                tx_count: number as usize * 2,
            }))
        }
    }

    #[tokio::test]
    async fn fetches_each_block_once_and_keeps_unresolved_rows() {
        let sends = (1..=3u8)
            .map(|i| SentTx {
                hash: TxHash::repeat_byte(i),
                sent_at_ms: i as u64 * 100,
            })
            .collect::<Vec<_>>();
        let mut record = BlockNumberRecord::default();
        record.resolved.insert(TxHash::repeat_byte(1), 5);
        record.resolved.insert(TxHash::repeat_byte(2), 5);
        record.unresolved.push(TxHash::repeat_byte(3));

        let chain = FakeChain::default();
        let rows = reconcile(&sends, &record, &chain).await.unwrap();

        assert_eq!(*chain.fetched.lock().unwrap(), vec![5]);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].block_timestamp, Some(1_005));
        assert_eq!(rows[1].block_all_txs, 10);
        assert!(!rows[2].is_included());
        assert_eq!(rows[2].block_all_txs, 0);
    }
}
