use std::path::PathBuf;

use alloy::{network::EthereumWallet, primitives::TxHash};
use tpsbench_chains::AddressKey;
use tpsbench_core::{
    agent_controller::SignerStore,
    prepare::{approve_request, wrap_request, Readiness},
    provider::RetryingProvider,
    spammer::prefill::sign_request,
    CancellationToken,
};
use tracing::{debug, info, warn};

use super::{parse_eth_amount, ChainCliArgs};
use crate::{error::CliError, util::read_mnemonic};

#[derive(Debug, clap::Args)]
pub struct PrepareCliArgs {
    #[command(flatten)]
    pub chain: ChainCliArgs,

    /// Number of mnemonic accounts to prepare, starting at index 0.
    #[arg(long, default_value_t = 100)]
    pub accounts: u32,

    /// ETH wrapped into WETH by accounts holding too little WETH.
    #[arg(long, default_value = "0.00000005", value_name = "ETH")]
    pub wrap_eth: String,

    /// WETH allowance granted to the swap router.
    #[arg(long, default_value = "1", value_name = "ETH")]
    pub approve_eth: String,

    #[arg(long, default_value = "mnemonic.txt", value_name = "PATH")]
    pub mnemonic_file: PathBuf,

    /// Only report which accounts are ready to swap.
    #[arg(long)]
    pub check_only: bool,
}

pub async fn prepare(args: PrepareCliArgs, cancel: CancellationToken) -> Result<(), CliError> {
    let network = args.chain.network()?;
    let wrap_amount = parse_eth_amount("--wrap-eth", &args.wrap_eth)?;
    let approve_amount = parse_eth_amount("--approve-eth", &args.approve_eth)?;
    let mnemonic = read_mnemonic(&args.mnemonic_file)?;
    let accounts = SignerStore::from_mnemonic(&mnemonic, 0..args.accounts)?;
    let weth = network.address(AddressKey::Weth)?;
    let router = network.address(AddressKey::PancakeSmartRouter)?;

    let provider = RetryingProvider::new(&network.http_rpc_url, cancel.clone())?;
    if !args.check_only {
        let chain_id = provider.chain_id().await?;
        let gas_price = provider.gas_price().await?;
        let mut pending: Vec<TxHash> = Vec::new();
        for signer in &accounts.signers {
            if cancel.is_cancelled() {
                warn!("cancelled, remaining accounts were not prepared");
                break;
            }
            let owner = signer.address();
            let state = Readiness::fetch(&provider, owner, weth, router).await?;
            let wallet = EthereumWallet::new(signer.clone());
            let mut nonce = provider.pending_nonce(owner).await?;
            let mut last = None;
            if state.needs_wrap() {
                let req = wrap_request(chain_id, owner, weth, wrap_amount, nonce, gas_price);
                let hash = provider.send_raw(&sign_request(&wallet, req).await?).await?;
                debug!("[{owner}] sent {hash} (wrap, nonce {nonce})");
                nonce += 1;
                last = Some(hash);
            }
            if state.needs_approval() {
                let req = approve_request(
                    chain_id,
                    owner,
                    weth,
                    router,
                    approve_amount,
                    nonce,
                    gas_price,
                );
                let hash = provider.send_raw(&sign_request(&wallet, req).await?).await?;
                debug!("[{owner}] sent {hash} (approve, nonce {nonce})");
                last = Some(hash);
            }
            pending.extend(last);
        }

        info!("waiting for {} accounts to confirm", pending.len());
        for hash in pending {
            let receipt = provider.wait_for_receipt(hash).await?;
            if !receipt.status() {
                warn!("{hash} reverted");
            }
        }
    }

    let mut ready = 0;
    for owner in accounts.addresses() {
        if cancel.is_cancelled() {
            break;
        }
        let state = Readiness::fetch(&provider, owner, weth, router).await?;
        if state.is_ready() {
            ready += 1;
            debug!("[{owner}] {state}");
        } else {
            warn!("[{owner}] {state}");
        }
    }
    info!("{ready} of {} accounts ready to swap", accounts.len());
    Ok(())
}
