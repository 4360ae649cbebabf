//! HTTP provider for the one-shot calls around a run: nonces, gas price,
//! blocks and receipts. Every call goes through the retry policy.

use std::{future::Future, time::Duration};

use alloy::{
    eips::BlockNumberOrTag,
    network::TransactionBuilder,
    primitives::{Address, Bytes, TxHash, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::{Block, TransactionReceipt, TransactionRequest},
    transports::http::reqwest::Url,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{error::Error, retry::RetryPolicy, spammer::SignedTx, Result};

/// Receipt polling: 500 ms between polls, 21 polls in total.
pub const RECEIPT_POLL_POLICY: RetryPolicy = RetryPolicy::fixed(Duration::from_millis(500), 21);

#[derive(Clone)]
pub struct RetryingProvider {
    inner: DynProvider,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl RetryingProvider {
    pub fn new(rpc_url: &str, cancel: CancellationToken) -> Result<Self> {
        let url: Url = rpc_url
            .parse()
            .map_err(|e| Error::Config(format!("invalid rpc url '{rpc_url}': {e}")))?;
        Ok(Self {
            inner: ProviderBuilder::new().connect_http(url).erased(),
            retry: RetryPolicy::default(),
            cancel,
        })
    }

    async fn call<T, F, Fut>(&self, policy: RetryPolicy, label: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        policy
            .retry(&self.cancel, label, |_| op())
            .await
            .map_err(|e| e.into_error(label))
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let inner = &self.inner;
        self.call(self.retry, "eth_chainId", || async move {
            Ok(inner.get_chain_id().await?)
        })
        .await
    }

    /// Next nonce for `address`, counting pending transactions.
    pub async fn pending_nonce(&self, address: Address) -> Result<u64> {
        let inner = &self.inner;
        self.call(self.retry, "eth_getTransactionCount", || async move {
            Ok(inner.get_transaction_count(address).pending().await?)
        })
        .await
    }

    pub async fn gas_price(&self) -> Result<u128> {
        let inner = &self.inner;
        self.call(self.retry, "eth_gasPrice", || async move {
            Ok(inner.get_gas_price().await?)
        })
        .await
    }

    pub async fn balance(&self, address: Address) -> Result<U256> {
        let inner = &self.inner;
        self.call(self.retry, "eth_getBalance", || async move {
            Ok(inner.get_balance(address).await?)
        })
        .await
    }

    /// `eth_call` against the latest block.
    pub async fn call_contract(&self, to: Address, input: Bytes) -> Result<Bytes> {
        let inner = &self.inner;
        let req = TransactionRequest::default().with_to(to).with_input(input);
        self.call(self.retry, "eth_call", || {
            let req = req.clone();
            async move { Ok(inner.call(req).await?) }
        })
        .await
    }

    pub async fn block(&self, number: u64) -> Result<Option<Block>> {
        let inner = &self.inner;
        self.call(self.retry, "eth_getBlockByNumber", || async move {
            Ok(inner
                .get_block_by_number(BlockNumberOrTag::Number(number))
                .await?)
        })
        .await
    }

    pub async fn send_raw(&self, tx: &SignedTx) -> Result<TxHash> {
        let inner = &self.inner;
        self.call(self.retry, "eth_sendRawTransaction", || async move {
            let pending = inner.send_raw_transaction(&tx.raw).await?;
            Ok(*pending.tx_hash())
        })
        .await
    }

    /// Polls until `hash` has a receipt or [`RECEIPT_POLL_POLICY`] runs out.
    pub async fn wait_for_receipt(&self, hash: TxHash) -> Result<TransactionReceipt> {
        let inner = &self.inner;
        self.call(RECEIPT_POLL_POLICY, "receipt", || async move {
            debug!("polling receipt for {hash}");
            inner
                .get_transaction_receipt(hash)
                .await?
                .ok_or(Error::NotMined(hash))
        })
        .await
    }
}
