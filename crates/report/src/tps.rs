use std::{collections::BTreeMap, fmt::Display};

use chrono::DateTime;

use crate::inclusion::InclusionRow;

/// A send counts towards a block if it happened before the block timestamp
/// plus this many seconds.
pub const BLOCK_TX_OFFSET_SECS: f64 = 1.5;

#[derive(Clone, Debug, PartialEq)]
pub struct BlockLine {
    pub block_num: u64,
    pub timestamp: u64,
    pub all_txs: usize,
    pub our_txs: usize,
    /// Approximate count of our sends that happened by this block.
    pub sent_by_then: usize,
    pub cum_txs: usize,
    pub elapsed_secs: u64,
}

impl BlockLine {
    pub fn cum_tps(&self) -> Option<f64> {
        (self.elapsed_secs > 0).then(|| self.cum_txs as f64 / self.elapsed_secs as f64)
    }
}

/// Throughput of the included transactions, measured between the first and
/// last block that holds one of them.
#[derive(Clone, Debug, PartialEq)]
pub struct TpsReport {
    pub included: usize,
    pub total_secs: u64,
    pub blocks: Vec<BlockLine>,
}

impl TpsReport {
    /// `None` when no row is included in a block.
    pub fn compute(rows: &[InclusionRow]) -> Option<Self> {
        let included = rows.iter().filter(|r| r.is_included()).collect::<Vec<_>>();

        // keyed by block timestamp, like the blocks are ordered on chain
        let mut by_ts: BTreeMap<u64, (u64, usize, usize)> = BTreeMap::new();
        for row in &included {
            let (Some(ts), Some(num)) = (row.block_timestamp, row.block_num) else {
                continue;
            };
            by_ts.entry(ts).or_insert((num, row.block_all_txs, 0)).2 += 1;
        }

        let first_ts = *by_ts.keys().next()?;
        let last_ts = *by_ts.keys().next_back()?;

        let mut cum_txs = 0;
        let blocks = by_ts
            .into_iter()
            .map(|(ts, (block_num, all_txs, our_txs))| {
                cum_txs += our_txs;
                let cutoff = ts as f64 + BLOCK_TX_OFFSET_SECS;
                BlockLine {
                    block_num,
                    timestamp: ts,
                    all_txs,
                    our_txs,
                    sent_by_then: included
                        .iter()
                        .filter(|r| r.sent_at_secs() < cutoff)
                        .count(),
                    cum_txs,
                    elapsed_secs: ts - first_ts,
                }
            })
            .collect();

        Some(Self {
            included: included.len(),
            total_secs: last_ts - first_ts,
            blocks,
        })
    }

    /// `None` when every included transaction landed in the same second.
    pub fn tps(&self) -> Option<f64> {
        (self.total_secs > 0).then(|| self.included as f64 / self.total_secs as f64)
    }
}

fn utc(ts: u64) -> String {
    DateTime::from_timestamp(ts as i64, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

impl Display for TpsReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tps = self.tps().map_or_else(|| "∞".to_owned(), |t| format!("{t:.2}"));
        writeln!(
            f,
            "TPS: {tps} txs/s ({} txs in {}s)",
            self.included, self.total_secs
        )?;
        for block in &self.blocks {
            let cum_tps = block
                .cum_tps()
                .map_or_else(|| "-".to_owned(), |t| format!("{t:.2}"));
            writeln!(
                f,
                "Block #{} with ts={} ({}) | all_txs_in_block={:4}, our_txs_in_block={:4}, \
                 ~tx_sent_by_that_time={:4}, cum_txs_confirmed={:4}, cum_elapsed_secs={:3} | cum_tps={cum_tps}",
                block.block_num,
                block.timestamp,
                utc(block.timestamp),
                block.all_txs,
                block.our_txs,
                block.sent_by_then,
                block.cum_txs,
                block.elapsed_secs,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::TxHash;

    fn row(i: u8, sent_at_ms: u64, block: Option<(u64, u64)>) -> InclusionRow {
        InclusionRow {
            sent_at_ms,
            hash: TxHash::repeat_byte(i),
            block_num: block.map(|b| b.0),
            block_timestamp: block.map(|b| b.1),
            block_all_txs: 10,
        }
    }

    #[test]
    fn computes_rate_and_cumulative_lines() {
        let rows = vec![
            row(1, 99_000, Some((100, 100))),
            row(2, 100_200, Some((100, 100))),
            row(3, 101_000, Some((102, 102))),
            row(4, 103_000, Some((104, 104))),
            row(5, 103_500, None),
        ];
        let report = TpsReport::compute(&rows).unwrap();

        assert_eq!(report.included, 4);
        assert_eq!(report.total_secs, 4);
        assert_eq!(report.tps(), Some(1.0));

        let cum = report.blocks.iter().map(|b| b.cum_txs).collect::<Vec<_>>();
        assert_eq!(cum, vec![2, 3, 4]);
        // sends before 101.5s: rows 1, 2 and 3
        assert_eq!(report.blocks[0].sent_by_then, 3);
        assert_eq!(report.blocks[0].cum_tps(), None);
        assert_eq!(report.blocks[1].cum_tps(), Some(1.5));
        assert_eq!(report.blocks[2].cum_tps(), Some(1.0));
    }

    #[test]
    fn single_block_has_unbounded_rate() {
        let report = TpsReport::compute(&[row(1, 0, Some((7, 50)))]).unwrap();
        assert_eq!(report.tps(), None);
        let printed = report.to_string();
        assert!(printed.starts_with("TPS: ∞ txs/s (1 txs in 0s)"));
        assert!(printed.contains("Block #7 with ts=50 (1970-01-01 00:00:50)"));
        assert!(printed.contains("cum_tps=-"));
    }

    #[test]
    fn nothing_included_yields_no_report() {
        assert!(TpsReport::compute(&[row(1, 0, None)]).is_none());
        assert!(TpsReport::compute(&[]).is_none());
    }
}
