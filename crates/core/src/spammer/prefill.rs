//! Builds and signs an account's whole workload before the launch moment, so
//! the submitter only has to push bytes.

use alloy::{
    eips::eip2718::Encodable2718,
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, Bytes, U256},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
    sol,
    sol_types::SolCall,
};

use super::submitter::SignedTx;
use crate::{error::Error, Result};

sol! {
    function swapExactTokensForTokens(
        uint256 amountIn,
        uint256 amountOutMin,
        address[] calldata path,
        address to
    ) external payable returns (uint256 amountOut);
}

pub const SWAP_GAS_LIMIT: u64 = 250_000;
/// Above the 21k intrinsic cost; rollups such as zkSync Era charge more for a transfer.
pub const TRANSFER_GAS_LIMIT: u64 = 500_000;
/// Gas price is bid at this multiple of the node's quote.
pub const GAS_PRICE_MULTIPLIER: u128 = 2;
/// 1 gwei worth of the input token, in base units.
pub const DEFAULT_SWAP_AMOUNT_IN: u64 = 1_000_000_000;

/// A token swap repeated by every nonce of an account.
#[derive(Clone, Debug)]
pub struct SwapPlan {
    pub chain_id: u64,
    pub router: Address,
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub gas_limit: u64,
    pub gas_price: u128,
}

impl SwapPlan {
    /// Swap plan bidding [`GAS_PRICE_MULTIPLIER`] times `quoted_gas_price`.
    pub fn new(
        chain_id: u64,
        router: Address,
        token_in: Address,
        token_out: Address,
        quoted_gas_price: u128,
    ) -> Self {
        Self {
            chain_id,
            router,
            token_in,
            token_out,
            amount_in: U256::from(DEFAULT_SWAP_AMOUNT_IN),
            gas_limit: SWAP_GAS_LIMIT,
            gas_price: quoted_gas_price.saturating_mul(GAS_PRICE_MULTIPLIER),
        }
    }

    pub fn calldata(&self, recipient: Address) -> Bytes {
        swapExactTokensForTokensCall {
            amountIn: self.amount_in,
            amountOutMin: U256::ZERO,
            path: vec![self.token_in, self.token_out],
            to: recipient,
        }
        .abi_encode()
        .into()
    }

    pub fn request(&self, from: Address, nonce: u64) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(from)
            .with_to(self.router)
            .with_chain_id(self.chain_id)
            .with_nonce(nonce)
            .with_gas_limit(self.gas_limit)
            .with_gas_price(self.gas_price)
            .with_value(U256::ZERO)
            .with_input(self.calldata(from))
    }
}

/// Plain value transfer, used to fund load accounts.
pub fn transfer_request(
    chain_id: u64,
    from: Address,
    to: Address,
    value: U256,
    nonce: u64,
    gas_price: u128,
) -> TransactionRequest {
    TransactionRequest::default()
        .with_from(from)
        .with_to(to)
        .with_chain_id(chain_id)
        .with_nonce(nonce)
        .with_gas_limit(TRANSFER_GAS_LIMIT)
        .with_gas_price(gas_price)
        .with_value(value)
}

/// Signs a fully populated legacy request.
pub async fn sign_request(wallet: &EthereumWallet, req: TransactionRequest) -> Result<SignedTx> {
    let nonce = req
        .nonce
        .ok_or_else(|| Error::Config("transaction request has no nonce".to_owned()))?;
    let sender = req
        .from
        .ok_or_else(|| Error::Config("transaction request has no sender".to_owned()))?;
    let envelope = req.build(wallet).await?;
    Ok(SignedTx {
        nonce,
        hash: *envelope.tx_hash(),
        raw: envelope.encoded_2718().into(),
        sender,
    })
}

/// Signs `count` swaps for `signer`, with consecutive nonces from `first_nonce`.
pub async fn sign_swaps(
    signer: &PrivateKeySigner,
    plan: &SwapPlan,
    first_nonce: u64,
    count: u64,
) -> Result<Vec<SignedTx>> {
    let wallet = EthereumWallet::new(signer.clone());
    let from = signer.address();
    let mut txs = Vec::with_capacity(count as usize);
    for nonce in first_nonce..first_nonce + count {
        txs.push(sign_request(&wallet, plan.request(from, nonce)).await?);
    }
    Ok(txs)
}
