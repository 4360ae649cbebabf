use std::{collections::BTreeMap, sync::Arc};

use alloy::primitives::{Address, Bytes, TxHash};
use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    classify::{classify, RejectionClassifier, SubstringClassifier, TransactionOutcome},
    tx_log::{TxEvent, TxLogRecord},
};
use crate::{
    error::Error,
    orchestrator::Worker,
    retry::{BackoffStep, RetryPolicy},
    rpc::{Connect, CorrelationChannel, MatchedResponse, RequestId},
    Result,
};

/// A transaction signed ahead of time, ready for `eth_sendRawTransaction`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTx {
    pub nonce: u64,
    /// EIP-2718 encoded envelope.
    pub raw: Bytes,
    pub hash: TxHash,
    pub sender: Address,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxState {
    Pending,
    Sent { request_id: RequestId },
    Accepted,
    Dropped { reason: String },
    /// Still active when the submitter was cancelled or ran out of reconnects.
    Abandoned,
}

#[derive(Debug)]
pub struct SubmissionReport {
    pub account: Address,
    pub states: BTreeMap<u64, TxState>,
    /// Total `eth_sendRawTransaction` requests written, resends included.
    pub sends: usize,
    /// Why the submitter stopped before every nonce reached a verdict.
    pub gave_up: Option<Error>,
}

impl SubmissionReport {
    fn count(&self, pred: impl Fn(&TxState) -> bool) -> usize {
        self.states.values().filter(|s| pred(s)).count()
    }

    pub fn accepted(&self) -> usize {
        self.count(|s| matches!(s, TxState::Accepted))
    }

    pub fn dropped(&self) -> usize {
        self.count(|s| matches!(s, TxState::Dropped { .. }))
    }

    pub fn abandoned(&self) -> usize {
        self.count(|s| matches!(s, TxState::Abandoned))
    }
}

/// Pushes one account's pre-signed transactions to a node until each is
/// accepted or dropped.
///
/// The nonce-ordered queue is the source of truth: a nonce leaves it only on
/// a verdict, so after a reconnect exactly the still-active nonces are resent.
pub struct TxSubmitter<C> {
    connector: C,
    account: Address,
    queue: BTreeMap<u64, SignedTx>,
    states: BTreeMap<u64, TxState>,
    sends: usize,
    classifier: Arc<dyn RejectionClassifier>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl<C> TxSubmitter<C>
where
    C: Connect,
{
    pub fn new(connector: C, account: Address, txs: impl IntoIterator<Item = SignedTx>) -> Self {
        let queue = txs
            .into_iter()
            .map(|tx| (tx.nonce, tx))
            .collect::<BTreeMap<_, _>>();
        let states = queue.keys().map(|n| (*n, TxState::Pending)).collect();
        Self {
            connector,
            account,
            queue,
            states,
            sends: 0,
            classifier: Arc::new(SubstringClassifier::default()),
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn RejectionClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn account(&self) -> Address {
        self.account
    }

    /// Runs sessions until the queue is empty, reopening the connection under
    /// the retry policy whenever it fails.
    pub async fn submit_all(mut self) -> SubmissionReport {
        let mut backoff = self.retry.backoff();
        let mut gave_up = None;

        while !self.queue.is_empty() {
            if self.cancel.is_cancelled() {
                gave_up = Some(self.cancelled());
                break;
            }
            let err = match self.run_session().await {
                Ok(()) => continue,
                Err(e) => e,
            };
            match backoff.failed(&self.cancel).await {
                BackoffStep::Retry(delay) => {
                    warn!(
                        "{}: session failed ({err}), reconnecting to {} in {delay:?}",
                        self.account,
                        self.connector.endpoint()
                    );
                }
                BackoffStep::Exhausted => {
                    gave_up = Some(Error::RetryExhausted {
                        label: format!("submission for {}", self.account),
                        attempts: backoff.failures(),
                        last_error: err.to_string(),
                    });
                    break;
                }
                BackoffStep::Cancelled => {
                    gave_up = Some(self.cancelled());
                    break;
                }
            }
        }

        self.abandon_remaining();
        let report = SubmissionReport {
            account: self.account,
            states: self.states,
            sends: self.sends,
            gave_up,
        };
        info!(
            "{}: {} accepted, {} dropped, {} abandoned ({} sends)",
            report.account,
            report.accepted(),
            report.dropped(),
            report.abandoned(),
            report.sends
        );
        report
    }

    fn cancelled(&self) -> Error {
        Error::Cancelled {
            label: format!("submission for {}", self.account),
        }
    }

    /// One connection's worth of work. Returns `Ok` once the queue drains or
    /// the run is cancelled.
    async fn run_session(&mut self) -> Result<()> {
        let mut channel = CorrelationChannel::open(&self.connector).await?;
        let res = self.drive(&mut channel).await;
        for unanswered in channel.close().await {
            if self.queue.contains_key(&unanswered.key) {
                debug!(
                    "{}: nonce {} (id {}) unanswered at close",
                    self.account, unanswered.key, unanswered.id
                );
                self.states.insert(unanswered.key, TxState::Pending);
            }
        }
        res
    }

    async fn drive(&mut self, channel: &mut CorrelationChannel<C::Transport, u64>) -> Result<()> {
        let nonces = self.queue.keys().copied().collect::<Vec<_>>();
        for nonce in nonces {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            self.send(channel, nonce).await?;
        }

        while !self.queue.is_empty() {
            let response = match channel.receive_one(&self.cancel).await {
                Ok(Some(response)) => response,
                Ok(None) => return Ok(()),
                Err(e) if e.is_protocol() => {
                    warn!("{}: {e}", self.account);
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.handle(channel, response).await?;
        }
        Ok(())
    }

    async fn send(
        &mut self,
        channel: &mut CorrelationChannel<C::Transport, u64>,
        nonce: u64,
    ) -> Result<()> {
        let Some(tx) = self.queue.get(&nonce) else {
            return Ok(());
        };
        let id = channel
            .send("eth_sendRawTransaction", json!([tx.raw]), nonce)
            .await?;
        self.sends += 1;
        self.states.insert(nonce, TxState::Sent { request_id: id });
        TxLogRecord::new(self.account, TxEvent::Sent, tx.hash, nonce, Some(id)).emit();
        Ok(())
    }

    async fn handle(
        &mut self,
        channel: &mut CorrelationChannel<C::Transport, u64>,
        response: MatchedResponse<u64>,
    ) -> Result<()> {
        let Some(tx) = self.queue.get(&response.key) else {
            debug!(
                "{}: late response for settled nonce {}",
                self.account, response.key
            );
            return Ok(());
        };

        match classify(tx, &response.result, self.classifier.as_ref()) {
            TransactionOutcome::Accepted { hash, nonce } => {
                TxLogRecord::new(self.account, TxEvent::Accepted, hash, nonce, Some(response.id))
                    .emit();
                self.queue.remove(&nonce);
                self.states.insert(nonce, TxState::Accepted);
            }
            TransactionOutcome::FatalFailure {
                hash,
                nonce,
                reason,
            } => {
                TxLogRecord::new(self.account, TxEvent::Dropped, hash, nonce, Some(response.id))
                    .with_reason(reason.as_str())
                    .emit();
                self.queue.remove(&nonce);
                self.states.insert(nonce, TxState::Dropped { reason });
            }
            TransactionOutcome::TransientFailure { nonce, reason, .. } => {
                debug!("{}: nonce {nonce} rejected ({reason}), resending", self.account);
                if !self.cancel.is_cancelled() {
                    self.send(channel, nonce).await?;
                }
            }
        }
        Ok(())
    }

    fn abandon_remaining(&mut self) {
        for (nonce, tx) in std::mem::take(&mut self.queue) {
            TxLogRecord::new(self.account, TxEvent::Abandoned, tx.hash, nonce, None).emit();
            self.states.insert(nonce, TxState::Abandoned);
        }
    }
}

#[async_trait]
impl<C> Worker for TxSubmitter<C>
where
    C: Connect + 'static,
{
    type Output = SubmissionReport;

    fn name(&self) -> String {
        self.account.to_string()
    }

    async fn run(self) -> SubmissionReport {
        self.submit_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::mock::{MockConnector, MockReply};
    use serde_json::{json, Value};
    use std::time::Duration;

    fn signed(nonce: u64) -> SignedTx {
        SignedTx {
            nonce,
            raw: Bytes::from(vec![0x02, nonce as u8]),
            hash: TxHash::with_last_byte(nonce as u8),
            sender: Address::ZERO,
        }
    }

    fn nonce_of(params: &Value) -> u64 {
        let raw = params[0].as_str().unwrap();
        u64::from_str_radix(&raw[4..], 16).unwrap()
    }

    #[tokio::test]
    async fn known_transaction_counts_as_accepted() {
        let node = MockConnector::new(|req| {
            Some(MockReply::error(format!(
                "known transaction: {}",
                nonce_of(&req.params)
            )))
        });
        let report = TxSubmitter::new(node.clone(), Address::ZERO, [signed(0)])
            .submit_all()
            .await;
        assert_eq!(report.states[&0], TxState::Accepted);
        assert_eq!(report.sends, 1);
        assert!(report.gave_up.is_none());
    }

    #[tokio::test]
    async fn transient_rejection_is_resent_until_accepted() {
        let node = MockConnector::new(|req| {
            if req.seen < 2 {
                Some(MockReply::error("txpool is full"))
            } else {
                Some(MockReply::Result(Value::String("0x".to_owned())))
            }
        });
        let report = TxSubmitter::new(node.clone(), Address::ZERO, [signed(1), signed(2)])
            .submit_all()
            .await;
        assert_eq!(report.accepted(), 2);
        assert_eq!(report.sends, 6);

        // every resend of a nonce carried a fresh request id and the same payload
        let requests = node.requests();
        let ids = requests.iter().map(|r| r.id).collect::<Vec<_>>();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), ids.len());
        assert!(requests
            .iter()
            .all(|r| r.method == "eth_sendRawTransaction" && r.connection == 0));
    }

    #[tokio::test]
    async fn error_without_code_is_classified() {
        let node = MockConnector::new(|_| {
            Some(MockReply::Raw(
                json!({ "error": { "message": "transaction underpriced" } }),
            ))
        });
        let report = TxSubmitter::new(node.clone(), Address::ZERO, [signed(3)])
            .submit_all()
            .await;
        assert_eq!(
            report.states[&3],
            TxState::Dropped {
                reason: "transaction underpriced".to_owned()
            }
        );
        assert_eq!(report.sends, 1);
    }

    #[tokio::test]
    async fn reply_without_payload_is_resent() {
        let node = MockConnector::new(|req| {
            if req.seen == 0 {
                Some(MockReply::Raw(json!({})))
            } else {
                Some(MockReply::Result(Value::String("0x".to_owned())))
            }
        });
        let report = TxSubmitter::new(node.clone(), Address::ZERO, [signed(8)])
            .submit_all()
            .await;
        assert_eq!(report.states[&8], TxState::Accepted);
        assert_eq!(report.sends, 2);
    }

    #[tokio::test]
    async fn custom_classifier_makes_rejection_fatal() {
        let node = MockConnector::new(|_| Some(MockReply::error("txpool is full")));
        let report = TxSubmitter::new(node.clone(), Address::ZERO, [signed(1)])
            .with_classifier(Arc::new(|message: &str| message.contains("txpool is full")))
            .submit_all()
            .await;
        assert!(matches!(report.states[&1], TxState::Dropped { .. }));
        assert_eq!(report.sends, 1);
        assert_eq!(node.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_and_resends_only_active_nonces() {
        // first connection answers nonce 0, then drops
        let node = MockConnector::new(|req| {
            if req.connection == 0 && nonce_of(&req.params) != 0 {
                None
            } else {
                Some(MockReply::Result(Value::String("0x".to_owned())))
            }
        })
        .close_after(0, 1);
        let report = TxSubmitter::new(node.clone(), Address::ZERO, (0..3).map(signed))
            .submit_all()
            .await;

        assert_eq!(report.accepted(), 3);
        let resent = node
            .requests_on(1)
            .iter()
            .map(|r| nonce_of(&r.params))
            .collect::<Vec<_>>();
        assert_eq!(resent, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_reconnects_abandon_remaining_nonces() {
        let node = MockConnector::new(|_| None).failing_first_connects(usize::MAX);
        let report = TxSubmitter::new(node.clone(), Address::ZERO, [signed(4), signed(5)])
            .with_retry(RetryPolicy::new(Duration::from_millis(10), 3))
            .submit_all()
            .await;
        assert_eq!(node.connect_attempts(), 3);
        assert_eq!(report.abandoned(), 2);
        assert!(matches!(
            report.gave_up,
            Some(Error::RetryExhausted { attempts: 3, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_abandons_unanswered_nonces() {
        let node = MockConnector::new(|_| None);
        let cancel = CancellationToken::new();
        let submitter = TxSubmitter::new(node.clone(), Address::ZERO, [signed(9)])
            .with_cancel(cancel.clone());
        let handle = tokio::spawn(submitter.submit_all());
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let report = handle.await.unwrap();
        assert_eq!(report.states[&9], TxState::Abandoned);
        assert!(matches!(report.gave_up, Some(Error::Cancelled { .. })));
        assert_eq!(report.sends, 1);
    }
}
