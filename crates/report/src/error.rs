use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("core error")]
    Core(#[from] tpsbench_core::Error),

    #[error("csv error")]
    Csv(#[from] csv::Error),

    #[error("io error")]
    Io(#[from] io::Error),

    #[error("invalid inclusion row on line {line}: {reason}")]
    InvalidRow { line: usize, reason: String },
}
