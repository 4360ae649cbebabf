use alloy::{primitives::utils::UnitsError, signers::local::LocalSignerError};
use std::path::PathBuf;
use thiserror::Error;

use crate::util::bold;

#[derive(Debug, Error)]
pub enum ArgsError {
    #[error("mnemonic file {path:?} is empty")]
    EmptyMnemonic { path: PathBuf },

    #[error("failed to read mnemonic file {path:?}")]
    MnemonicFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid amount '{value}'. Set {} to a decimal ETH value", bold(.flag))]
    InvalidAmount {
        flag: &'static str,
        value: String,
        #[source]
        source: UnitsError,
    },

    #[error("invalid {}", bold("PRIVATE_KEY"))]
    PrivateKey(#[source] LocalSignerError),
}
