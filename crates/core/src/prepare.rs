//! Per-account setup before a swap run: wrap some ETH into WETH, let the
//! router spend it, and check that every account can afford its swaps.

use std::fmt::Display;

use alloy::{
    network::TransactionBuilder,
    primitives::{utils::format_ether, Address, Bytes, U256},
    rpc::types::TransactionRequest,
    sol,
    sol_types::SolCall,
};

use crate::{provider::RetryingProvider, Result};

sol! {
    interface IWETH9 {
        function deposit() external payable;
        function approve(address spender, uint256 amount) external returns (bool);
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
    }
}

pub const PREPARE_GAS_LIMIT: u64 = 2_000_000;
/// 5e-8 ETH, enough WETH for fifty 1 gwei swaps.
pub const DEFAULT_WRAP_WEI: u64 = 50_000_000_000;
/// 0.001 ETH left for gas.
pub const MIN_ETH_BALANCE_WEI: u64 = 1_000_000_000_000_000;
/// 2e-8 WETH, both as balance and as router allowance.
pub const MIN_WETH_WEI: u64 = 20_000_000_000;

fn contract_request(
    chain_id: u64,
    from: Address,
    to: Address,
    input: Bytes,
    nonce: u64,
    gas_price: u128,
) -> TransactionRequest {
    TransactionRequest::default()
        .with_from(from)
        .with_to(to)
        .with_chain_id(chain_id)
        .with_nonce(nonce)
        .with_gas_limit(PREPARE_GAS_LIMIT)
        .with_gas_price(gas_price)
        .with_input(input)
}

/// `deposit()` on the WETH contract, paying in `value` wei.
pub fn wrap_request(
    chain_id: u64,
    from: Address,
    weth: Address,
    value: U256,
    nonce: u64,
    gas_price: u128,
) -> TransactionRequest {
    let input = IWETH9::depositCall {}.abi_encode().into();
    contract_request(chain_id, from, weth, input, nonce, gas_price).with_value(value)
}

/// `approve(spender, amount)` on `token`.
pub fn approve_request(
    chain_id: u64,
    from: Address,
    token: Address,
    spender: Address,
    amount: U256,
    nonce: u64,
    gas_price: u128,
) -> TransactionRequest {
    let input = IWETH9::approveCall { spender, amount }.abi_encode().into();
    contract_request(chain_id, from, token, input, nonce, gas_price).with_value(U256::ZERO)
}

/// Balances of one account, in wei.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Readiness {
    pub eth: U256,
    pub weth: U256,
    pub allowance: U256,
}

impl Readiness {
    pub async fn fetch(
        provider: &RetryingProvider,
        owner: Address,
        weth: Address,
        router: Address,
    ) -> Result<Self> {
        let eth = provider.balance(owner).await?;
        let raw = provider
            .call_contract(weth, IWETH9::balanceOfCall { owner }.abi_encode().into())
            .await?;
        let balance = IWETH9::balanceOfCall::abi_decode_returns(&raw)?;
        let raw = provider
            .call_contract(
                weth,
                IWETH9::allowanceCall {
                    owner,
                    spender: router,
                }
                .abi_encode()
                .into(),
            )
            .await?;
        let allowance = IWETH9::allowanceCall::abi_decode_returns(&raw)?;
        Ok(Self {
            eth,
            weth: balance,
            allowance,
        })
    }

    pub fn needs_wrap(&self) -> bool {
        self.weth < U256::from(MIN_WETH_WEI)
    }

    pub fn needs_approval(&self) -> bool {
        self.allowance < U256::from(MIN_WETH_WEI)
    }

    pub fn is_ready(&self) -> bool {
        self.eth >= U256::from(MIN_ETH_BALANCE_WEI) && !self.needs_wrap() && !self.needs_approval()
    }
}

impl Display for Readiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "eth={} weth={} allowance={} ready={}",
            format_ether(self.eth),
            format_ether(self.weth),
            format_ether(self.allowance),
            self.is_ready()
        )
    }
}
