//! Line format for submission events.
//!
//! Each send and each terminal transition is written as one line:
//!
//! ```text
//! ts=1697616000123 account=0x… event=sent hash=0x… nonce=5 id=12
//! ts=1697616000456 account=0x… event=dropped hash=0x… nonce=6 id=13 reason="transaction underpriced"
//! ```
//!
//! The report crate reads these lines back out of whatever the log subscriber
//! wrote, so parsing ignores everything before `ts=`.

use std::{fmt::Display, str::FromStr};

use alloy::primitives::{Address, TxHash};
use strum::{Display as StrumDisplay, EnumString};
use tracing::info;

use crate::util::unix_millis;

pub const TX_LOG_TARGET: &str = "tpsbench::txlog";

#[derive(Clone, Copy, Debug, PartialEq, Eq, StrumDisplay, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum TxEvent {
    Sent,
    Accepted,
    Dropped,
    Abandoned,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxLogRecord {
    pub timestamp_ms: u64,
    pub account: Address,
    pub event: TxEvent,
    pub hash: TxHash,
    pub nonce: u64,
    pub request_id: Option<u64>,
    pub reason: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid tx log line ({0})")]
pub struct ParseTxLogError(String);

impl TxLogRecord {
    pub fn new(
        account: Address,
        event: TxEvent,
        hash: TxHash,
        nonce: u64,
        request_id: Option<u64>,
    ) -> Self {
        Self {
            timestamp_ms: unix_millis(),
            account,
            event,
            hash,
            nonce,
            request_id,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn emit(&self) {
        info!(target: TX_LOG_TARGET, "{self}");
    }

    /// Finds and parses the record embedded in an arbitrary log line.
    /// Returns `None` for lines that carry no record.
    pub fn find_in(line: &str) -> Option<Result<Self, ParseTxLogError>> {
        let start = if line.starts_with("ts=") {
            0
        } else {
            line.find(" ts=")? + 1
        };
        Some(line[start..].trim_end().parse())
    }
}

impl Display for TxLogRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ts={} account={} event={} hash={} nonce={}",
            self.timestamp_ms, self.account, self.event, self.hash, self.nonce
        )?;
        if let Some(id) = self.request_id {
            write!(f, " id={id}")?;
        }
        if let Some(reason) = &self.reason {
            let quoted = serde_json::to_string(reason).map_err(|_| std::fmt::Error)?;
            write!(f, " reason={quoted}")?;
        }
        Ok(())
    }
}

impl FromStr for TxLogRecord {
    type Err = ParseTxLogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (fields, reason) = match s.split_once(" reason=") {
            Some((fields, quoted)) => {
                let reason: String = serde_json::from_str(quoted)
                    .map_err(|e| ParseTxLogError(format!("reason: {e}")))?;
                (fields, Some(reason))
            }
            None => (s, None),
        };

        let mut timestamp_ms = None;
        let mut account = None;
        let mut event = None;
        let mut hash = None;
        let mut nonce = None;
        let mut request_id = None;
        for token in fields.split_whitespace() {
            let Some((key, value)) = token.split_once('=') else {
                return Err(ParseTxLogError(format!("unexpected token '{token}'")));
            };
            let bad = |what: &str| ParseTxLogError(format!("{what} '{value}'"));
            match key {
                "ts" => timestamp_ms = Some(value.parse().map_err(|_| bad("timestamp"))?),
                "account" => account = Some(value.parse().map_err(|_| bad("account"))?),
                "event" => event = Some(value.parse().map_err(|_| bad("event"))?),
                "hash" => hash = Some(value.parse().map_err(|_| bad("hash"))?),
                "nonce" => nonce = Some(value.parse().map_err(|_| bad("nonce"))?),
                "id" => request_id = Some(value.parse().map_err(|_| bad("id"))?),
                _ => return Err(ParseTxLogError(format!("unknown field '{key}'"))),
            }
        }
        let missing = |name: &str| ParseTxLogError(format!("missing {name}"));
        Ok(Self {
            timestamp_ms: timestamp_ms.ok_or_else(|| missing("ts"))?,
            account: account.ok_or_else(|| missing("account"))?,
            event: event.ok_or_else(|| missing("event"))?,
            hash: hash.ok_or_else(|| missing("hash"))?,
            nonce: nonce.ok_or_else(|| missing("nonce"))?,
            request_id,
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, b256};

    fn record() -> TxLogRecord {
        TxLogRecord {
            timestamp_ms: 1_697_616_000_123,
            account: address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266"),
            event: TxEvent::Sent,
            hash: b256!("1111111111111111111111111111111111111111111111111111111111111111"),
            nonce: 42,
            request_id: Some(7),
            reason: None,
        }
    }

    #[test]
    fn parses_what_it_prints() {
        let rec = record();
        assert_eq!(rec.to_string().parse::<TxLogRecord>().unwrap(), rec);

        let dropped = TxLogRecord {
            event: TxEvent::Dropped,
            ..record()
        }
        .with_reason("insufficient funds for gas * price + \"value\"");
        assert_eq!(dropped.to_string().parse::<TxLogRecord>().unwrap(), dropped);
    }

    #[test]
    fn finds_record_behind_subscriber_prefix() {
        let rec = record();
        let line = format!("2026-10-18T08:00:00.123456Z  INFO {TX_LOG_TARGET}: {rec}\n");
        assert_eq!(TxLogRecord::find_in(&line), Some(Ok(rec)));
    }

    #[test]
    fn ignores_lines_without_records() {
        assert_eq!(
            TxLogRecord::find_in("2026-10-18T08:00:00Z  INFO tpsbench: starting"),
            None
        );
        // `ts=` must start a token
        assert_eq!(TxLogRecord::find_in("counts=3"), None);
    }

    #[test]
    fn rejects_incomplete_records() {
        let err = "ts=1 event=sent nonce=1".parse::<TxLogRecord>().unwrap_err();
        assert_eq!(err, ParseTxLogError("missing account".to_owned()));
        assert!("ts=1 event=bogus".parse::<TxLogRecord>().is_err());
    }
}
