use std::{
    fmt::Display,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    str::FromStr,
};

use alloy::primitives::TxHash;
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{Error, Result};

/// Where and when one of our transactions landed.
///
/// Printed as
/// `sent_at=1697616000.123 hash=0x.. block_num=42 block_timestamp=1697616001 block_all_txs=17`,
/// with `None` for the block fields of a transaction that was never found in a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionRow {
    pub sent_at_ms: u64,
    pub hash: TxHash,
    pub block_num: Option<u64>,
    pub block_timestamp: Option<u64>,
    pub block_all_txs: usize,
}

impl InclusionRow {
    pub fn is_included(&self) -> bool {
        self.block_num.is_some() && self.block_timestamp.is_some()
    }

    /// Send time in fractional seconds.
    pub fn sent_at_secs(&self) -> f64 {
        self.sent_at_ms as f64 / 1000.0
    }
}

fn fmt_opt(value: Option<u64>) -> String {
    value.map_or_else(|| "None".to_owned(), |v| v.to_string())
}

impl Display for InclusionRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "sent_at={}.{:03} hash={} block_num={} block_timestamp={} block_all_txs={}",
            self.sent_at_ms / 1000,
            self.sent_at_ms % 1000,
            self.hash,
            fmt_opt(self.block_num),
            fmt_opt(self.block_timestamp),
            self.block_all_txs
        )
    }
}

impl FromStr for InclusionRow {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let field = |name: &str| -> std::result::Result<&str, String> {
            s.split_whitespace()
                .find_map(|token| token.strip_prefix(name)?.strip_prefix('='))
                .ok_or_else(|| format!("missing {name}"))
        };
        let opt = |name: &str| -> std::result::Result<Option<u64>, String> {
            match field(name)? {
                "None" => Ok(None),
                v => v.parse().map(Some).map_err(|_| format!("bad {name} '{v}'")),
            }
        };

        let sent_at = field("sent_at")?;
        let (secs, frac) = sent_at.split_once('.').unwrap_or((sent_at, "0"));
        let secs = secs
            .parse::<u64>()
            .map_err(|_| format!("bad sent_at '{sent_at}'"))?;
        // keep millisecond precision regardless of how many digits were written
        let padded = format!("{frac:0<3}");
        let millis = padded
            .get(..3)
            .and_then(|m| m.parse::<u64>().ok())
            .ok_or_else(|| format!("bad sent_at '{sent_at}'"))?;
        let sent_at_ms = secs
            .checked_mul(1000)
            .and_then(|ms| ms.checked_add(millis))
            .ok_or_else(|| format!("sent_at '{sent_at}' out of range"))?;

        Ok(Self {
            sent_at_ms,
            hash: field("hash")?
                .parse()
                .map_err(|_| "bad hash".to_owned())?,
            block_num: opt("block_num")?,
            block_timestamp: opt("block_timestamp")?,
            block_all_txs: field("block_all_txs")?
                .parse()
                .map_err(|_| "bad block_all_txs".to_owned())?,
        })
    }
}

/// Saves rows to `path` as CSV with a header line.
pub fn write_csv(rows: &[InclusionRow], path: impl AsRef<Path>) -> Result<()> {
    info!("exporting {} rows to {:?}", rows.len(), path.as_ref());
    let mut writer = WriterBuilder::new().has_headers(true).from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Loads rows from a `.csv` export or from the printed line format.
pub fn read_rows(path: impl AsRef<Path>) -> Result<Vec<InclusionRow>> {
    let path = path.as_ref();
    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")) {
        let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
        return Ok(reader.deserialize().collect::<std::result::Result<_, _>>()?);
    }

    let mut rows = vec![];
    for (idx, line) in BufReader::new(File::open(path)?).lines().enumerate() {
        let line = line?;
        let Some(start) = line.find("sent_at=") else {
            continue;
        };
        let row = line[start..].parse().map_err(|reason| Error::InvalidRow {
            line: idx + 1,
            reason,
        })?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(block: Option<u64>) -> InclusionRow {
        InclusionRow {
            sent_at_ms: 1_697_616_000_045,
            hash: TxHash::repeat_byte(0xab),
            block_num: block,
            block_timestamp: block.map(|b| 1_697_616_000 + b),
            block_all_txs: if block.is_some() { 17 } else { 0 },
        }
    }

    #[test]
    fn printed_rows_read_back() {
        let included = row(Some(42));
        let printed = included.to_string();
        assert!(printed.starts_with("sent_at=1697616000.045 hash=0xabab"));
        assert!(printed.ends_with("block_num=42 block_timestamp=1697616042 block_all_txs=17"));
        assert_eq!(printed.parse::<InclusionRow>().unwrap(), included);

        let missing = row(None);
        assert!(missing.to_string().contains("block_num=None block_timestamp=None"));
        assert_eq!(missing.to_string().parse::<InclusionRow>().unwrap(), missing);
    }

    #[test]
    fn sent_at_precision_is_normalised() {
        let line = format!(
            "sent_at=1697616000.5 hash={} block_num=1 block_timestamp=2 block_all_txs=3",
            TxHash::ZERO
        );
        assert_eq!(line.parse::<InclusionRow>().unwrap().sent_at_ms, 1_697_616_000_500);
    }

    #[test]
    fn sent_at_out_of_range_is_rejected() {
        let line = format!(
            "sent_at=18446744073709552.000 hash={} block_num=1 block_timestamp=2 block_all_txs=3",
            TxHash::ZERO
        );
        let err = line.parse::<InclusionRow>().unwrap_err();
        assert!(err.contains("out of range"), "{err}");
    }

    #[test]
    fn csv_and_text_files_load_the_same_rows() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![row(Some(1)), row(None)];

        let csv_path = dir.path().join("inclusions.csv");
        write_csv(&rows, &csv_path).unwrap();
        assert_eq!(read_rows(&csv_path).unwrap(), rows);

        let txt_path = dir.path().join("swaps.log");
        let text = rows
            .iter()
            .map(|r| format!("{r}\n"))
            .collect::<String>();
        std::fs::write(&txt_path, format!("header noise\n{text}")).unwrap();
        assert_eq!(read_rows(&txt_path).unwrap(), rows);
    }

    #[test]
    fn bad_text_row_reports_its_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swaps.log");
        std::fs::write(&path, "sent_at=1 hash=0x12\n").unwrap();
        assert!(matches!(
            read_rows(&path),
            Err(Error::InvalidRow { line: 1, .. })
        ));
    }
}
