mod classify;
pub mod prefill;
mod submitter;
pub mod tx_log;

pub use classify::{
    classify, RejectionClassifier, SubstringClassifier, TransactionOutcome,
    DEFAULT_FATAL_PATTERNS, KNOWN_TX_PATTERNS,
};
pub use submitter::{SignedTx, SubmissionReport, TxState, TxSubmitter};
pub use tx_log::{TxEvent, TxLogRecord};
