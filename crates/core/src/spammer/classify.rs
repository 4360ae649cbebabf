use alloy::primitives::TxHash;
use serde_json::Value;

use super::submitter::SignedTx;
use crate::rpc::RpcFailure;

/// Rejections the node will repeat no matter how often the tx is resent.
pub const DEFAULT_FATAL_PATTERNS: &[&str] = &["insufficient funds", "transaction underpriced"];

/// The node already has this exact tx; a resend that hits this was delivered earlier.
pub const KNOWN_TX_PATTERNS: &[&str] = &["known transaction", "already known"];

/// Decides whether a rejection message means the tx can never be accepted.
pub trait RejectionClassifier: Send + Sync {
    fn is_fatal(&self, message: &str) -> bool;
}

impl<F> RejectionClassifier for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_fatal(&self, message: &str) -> bool {
        self(message)
    }
}

/// Case-insensitive substring match against a fixed list of patterns.
#[derive(Clone, Debug)]
pub struct SubstringClassifier {
    patterns: Vec<String>,
}

impl SubstringClassifier {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .collect(),
        }
    }
}

impl Default for SubstringClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_FATAL_PATTERNS)
    }
}

impl RejectionClassifier for SubstringClassifier {
    fn is_fatal(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.patterns.iter().any(|p| message.contains(p.as_str()))
    }
}

fn is_known_tx(message: &str) -> bool {
    let message = message.to_lowercase();
    KNOWN_TX_PATTERNS.iter().any(|p| message.contains(p))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionOutcome {
    Accepted { hash: TxHash, nonce: u64 },
    TransientFailure { hash: TxHash, nonce: u64, reason: String },
    FatalFailure { hash: TxHash, nonce: u64, reason: String },
}

/// Maps the node's answer to `eth_sendRawTransaction` onto an outcome for `tx`.
pub fn classify(
    tx: &SignedTx,
    result: &Result<Value, RpcFailure>,
    classifier: &dyn RejectionClassifier,
) -> TransactionOutcome {
    let (hash, nonce) = (tx.hash, tx.nonce);
    match result {
        Ok(_) => TransactionOutcome::Accepted { hash, nonce },
        Err(failure) if is_known_tx(&failure.message) => {
            TransactionOutcome::Accepted { hash, nonce }
        }
        Err(failure) if classifier.is_fatal(&failure.message) => TransactionOutcome::FatalFailure {
            hash,
            nonce,
            reason: failure.message.to_owned(),
        },
        Err(failure) => TransactionOutcome::TransientFailure {
            hash,
            nonce,
            reason: failure.message.to_owned(),
        },
    }
}
