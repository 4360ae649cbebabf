//! Reads submission events back out of tpsbench logs.

use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use alloy::primitives::TxHash;
use tpsbench_core::spammer::{TxEvent, TxLogRecord};
use tracing::{debug, warn};

use crate::Result;

/// An accepted transaction and the time it was last sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SentTx {
    pub hash: TxHash,
    pub sent_at_ms: u64,
}

/// Pairs every accepted hash with the timestamp of its most recent send
/// before acceptance, ordered by that timestamp.
pub fn accepted_sends(reader: impl BufRead) -> Result<Vec<SentTx>> {
    let mut last_sent = HashMap::new();
    let mut accepted = HashMap::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let record = match TxLogRecord::find_in(&line) {
            Some(Ok(record)) => record,
            Some(Err(e)) => {
                warn!("skipping line {}: {e}", idx + 1);
                continue;
            }
            None => continue,
        };
        match record.event {
            TxEvent::Sent => {
                last_sent.insert(record.hash, record.timestamp_ms);
            }
            TxEvent::Accepted => match last_sent.get(&record.hash) {
                Some(sent_at_ms) => {
                    accepted.insert(record.hash, *sent_at_ms);
                }
                None => warn!("{} accepted without a preceding send", record.hash),
            },
            TxEvent::Dropped | TxEvent::Abandoned => {}
        }
    }

    let mut sends = accepted
        .into_iter()
        .map(|(hash, sent_at_ms)| SentTx { hash, sent_at_ms })
        .collect::<Vec<_>>();
    sends.sort_by_key(|s| (s.sent_at_ms, s.hash));
    debug!("found {} accepted transactions", sends.len());
    Ok(sends)
}

/// [`accepted_sends`] over several log files, e.g. one per process.
pub fn accepted_sends_in_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<SentTx>> {
    let mut all = vec![];
    for path in paths {
        let file = File::open(path)?;
        all.extend(accepted_sends(BufReader::new(file))?);
    }
    all.sort_by_key(|s| (s.sent_at_ms, s.hash));
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
    const H1: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";
    const H2: &str = "0x2222222222222222222222222222222222222222222222222222222222222222";

    fn line(ts: u64, event: &str, hash: &str, nonce: u64) -> String {
        format!(
            "2026-10-18T08:00:00.000000Z  INFO tpsbench::txlog: ts={ts} account={ACCOUNT} event={event} hash={hash} nonce={nonce} id=1\n"
        )
    }

    #[test]
    fn accepted_hash_takes_its_last_send_time() {
        let log = [
            "2026-10-18T08:00:00Z  INFO tpsbench: launching\n".to_owned(),
            line(1_000, "sent", H1, 0),
            line(1_100, "sent", H2, 1),
            line(1_200, "sent", H1, 0),
            line(1_300, "accepted", H2, 1),
            line(1_400, "accepted", H1, 0),
        ]
        .concat();

        let sends = accepted_sends(log.as_bytes()).unwrap();
        assert_eq!(
            sends,
            vec![
                SentTx {
                    hash: H2.parse().unwrap(),
                    sent_at_ms: 1_100
                },
                SentTx {
                    hash: H1.parse().unwrap(),
                    sent_at_ms: 1_200
                },
            ]
        );
    }

    #[test]
    fn dropped_and_orphan_records_are_ignored() {
        let log = [
            line(1_000, "sent", H1, 0),
            line(1_100, "dropped", H1, 0),
            line(1_200, "accepted", H2, 1),
            "ts=garbage\n".to_owned(),
        ]
        .concat();
        assert!(accepted_sends(log.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn merges_several_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("tps00.log");
        let b = dir.path().join("tps01.log");
        std::fs::write(&a, [line(2_000, "sent", H1, 0), line(2_100, "accepted", H1, 0)].concat())
            .unwrap();
        std::fs::write(&b, [line(1_000, "sent", H2, 0), line(1_100, "accepted", H2, 0)].concat())
            .unwrap();

        let sends = accepted_sends_in_files(&[a, b]).unwrap();
        assert_eq!(
            sends.iter().map(|s| s.sent_at_ms).collect::<Vec<_>>(),
            vec![1_000, 2_000]
        );
    }
}
