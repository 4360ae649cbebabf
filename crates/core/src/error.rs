use alloy::{
    network::{Ethereum, TransactionBuilderError},
    primitives::TxHash,
    signers::{self, local::LocalSignerError},
    sol_types,
    transports::{RpcError, TransportErrorKind},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("failed to send request: {0}")]
    Send(String),

    #[error("received a response for unknown request id {0}")]
    UnmatchedResponse(u64),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("a request for key {0} is already in flight on this channel")]
    KeyInFlight(String),

    #[error("{label} gave up after {attempts} attempt(s): {last_error}")]
    RetryExhausted {
        label: String,
        attempts: u32,
        last_error: String,
    },

    #[error("{label} was cancelled")]
    Cancelled { label: String },

    #[error("transaction {0} is not mined yet")]
    NotMined(TxHash),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("rpc error")]
    Rpc(#[from] RpcError<TransportErrorKind>),

    #[error("failed to derive signer")]
    LocalSigner(#[from] LocalSignerError),

    #[error("signer failed to sign transaction")]
    Signer(#[from] signers::Error),

    #[error("failed to build eth transaction")]
    TransactionBuilderEth(#[from] TransactionBuilderError<Ethereum>),

    #[error("failed to decode contract return data")]
    AbiDecode(#[from] sol_types::Error),

    #[error("json error")]
    Json(#[from] serde_json::Error),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Transport-level failures; the owner is expected to reopen the channel.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Send(_))
    }

    /// Bad or stray inbound messages. Logged and skipped, never fatal to a worker.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Error::UnmatchedResponse(_) | Error::MalformedResponse(_)
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Connection(e.to_string())
    }
}
