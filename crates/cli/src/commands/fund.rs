use std::path::PathBuf;

use alloy::{
    network::EthereumWallet,
    primitives::utils::format_ether,
    signers::local::PrivateKeySigner,
};
use tpsbench_core::{
    agent_controller::SignerStore,
    provider::RetryingProvider,
    spammer::prefill::{sign_request, transfer_request},
    CancellationToken,
};
use tracing::{debug, info, warn};

use super::{parse_eth_amount, ArgsError, ChainCliArgs};
use crate::{error::CliError, util::read_mnemonic};

#[derive(Debug, clap::Args)]
pub struct FundCliArgs {
    #[command(flatten)]
    pub chain: ChainCliArgs,

    /// Key of the account paying for the transfers.
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    pub private_key: String,

    /// Number of mnemonic accounts to fund, starting at index 0.
    #[arg(long, default_value_t = 100)]
    pub accounts: u32,

    #[arg(long, default_value = "0.002", value_name = "ETH")]
    pub amount_eth: String,

    #[arg(long, default_value = "mnemonic.txt", value_name = "PATH")]
    pub mnemonic_file: PathBuf,
}

pub async fn fund(args: FundCliArgs, cancel: CancellationToken) -> Result<(), CliError> {
    let network = args.chain.network()?;
    let funder: PrivateKeySigner = args
        .private_key
        .trim()
        .parse()
        .map_err(ArgsError::PrivateKey)?;
    let amount = parse_eth_amount("--amount-eth", &args.amount_eth)?;
    let mnemonic = read_mnemonic(&args.mnemonic_file)?;
    let recipients = SignerStore::from_mnemonic(&mnemonic, 0..args.accounts)?;

    let provider = RetryingProvider::new(&network.http_rpc_url, cancel.clone())?;
    let chain_id = provider.chain_id().await?;
    let gas_price = provider.gas_price().await?;
    let from = funder.address();
    let mut nonce = provider.pending_nonce(from).await?;
    let wallet = EthereumWallet::new(funder);

    info!(
        "funding {} accounts with {} ETH each from {from}",
        recipients.len(),
        format_ether(amount)
    );
    let mut last = None;
    for to in recipients.addresses() {
        if cancel.is_cancelled() {
            warn!("cancelled, remaining accounts were not funded");
            break;
        }
        let tx = sign_request(
            &wallet,
            transfer_request(chain_id, from, to, amount, nonce, gas_price),
        )
        .await?;
        let hash = provider.send_raw(&tx).await?;
        debug!("sent {hash} funding {to} (nonce {nonce})");
        nonce += 1;
        last = Some(hash);
    }

    // transfers from one sender are mined in nonce order
    if let Some(hash) = last {
        info!("waiting for {hash}");
        let receipt = provider.wait_for_receipt(hash).await?;
        info!(
            "last transfer mined in block {}",
            receipt
                .block_number
                .map_or_else(|| "?".to_owned(), |n| n.to_string())
        );
    }
    Ok(())
}
