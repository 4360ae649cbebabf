use std::path::PathBuf;

use tpsbench_chains::AddressKey;
use tpsbench_core::{
    agent_controller::SignerStore,
    orchestrator::run_all,
    provider::RetryingProvider,
    rpc::WsConnector,
    spammer::{
        prefill::{sign_swaps, SwapPlan},
        TxSubmitter,
    },
    CancellationToken,
};
use tracing::{info, warn};

use super::ChainCliArgs;
use crate::{
    error::CliError,
    util::{read_mnemonic, wait_for_launch, LaunchOutcome},
};

#[derive(Debug, clap::Args)]
pub struct SpamCliArgs {
    #[command(flatten)]
    pub chain: ChainCliArgs,

    /// Index of this process. Process `n` drives mnemonic accounts
    /// `n * workers` up to `(n + 1) * workers`.
    #[arg(short = 'n', long = "index")]
    pub index: u32,

    /// Accounts driven concurrently by this process.
    #[arg(long, default_value_t = 10)]
    pub workers: u32,

    #[arg(long, default_value_t = 20)]
    pub txs_per_account: u64,

    #[arg(long, default_value = "mnemonic.txt", value_name = "PATH")]
    pub mnemonic_file: PathBuf,

    /// Launch as soon as the transactions are signed instead of at the next 5-minute mark.
    #[arg(long)]
    pub no_schedule: bool,
}

pub async fn spam(args: SpamCliArgs, cancel: CancellationToken) -> Result<(), CliError> {
    let network = args.chain.network()?;
    let mnemonic = read_mnemonic(&args.mnemonic_file)?;
    let signers = SignerStore::from_mnemonic(
        &mnemonic,
        SignerStore::worker_range(args.index, args.workers),
    )?;

    let provider = RetryingProvider::new(&network.http_rpc_url, cancel.clone())?;
    let chain_id = provider.chain_id().await?;
    if chain_id != network.chain_id {
        warn!(
            "{} reports chain id {chain_id}, expected {}",
            network.name, network.chain_id
        );
    }
    let plan = SwapPlan::new(
        chain_id,
        network.address(AddressKey::PancakeSmartRouter)?,
        network.address(AddressKey::Weth)?,
        network.address(AddressKey::Cake)?,
        provider.gas_price().await?,
    );

    info!(
        "signing {} swaps for each of {} accounts on {} (gas price {} wei)",
        args.txs_per_account,
        signers.len(),
        network.name,
        plan.gas_price
    );
    let mut workers = Vec::with_capacity(signers.len());
    for signer in &signers.signers {
        let first_nonce = provider.pending_nonce(signer.address()).await?;
        let txs = sign_swaps(signer, &plan, first_nonce, args.txs_per_account).await?;
        workers.push(
            TxSubmitter::new(
                WsConnector::new(network.ws_rpc_url.as_str()),
                signer.address(),
                txs,
            )
            .with_cancel(cancel.clone()),
        );
    }

    if !args.no_schedule {
        match wait_for_launch(&cancel).await {
            LaunchOutcome::Launched => {}
            LaunchOutcome::TooSoon | LaunchOutcome::Cancelled => return Ok(()),
        }
    }
    if cancel.is_cancelled() {
        info!("cancelled before launch");
        return Ok(());
    }

    let summary = run_all(workers).await;

    let (mut accepted, mut dropped, mut abandoned, mut sends) = (0, 0, 0, 0);
    for (name, report) in summary.completed() {
        info!(
            "{name}: {} accepted, {} dropped, {} abandoned in {} sends",
            report.accepted(),
            report.dropped(),
            report.abandoned(),
            report.sends
        );
        if let Some(e) = &report.gave_up {
            warn!("{name} gave up: {e}");
        }
        accepted += report.accepted();
        dropped += report.dropped();
        abandoned += report.abandoned();
        sends += report.sends;
    }
    info!(
        "done in {:.2}s: {accepted} accepted, {dropped} dropped, {abandoned} abandoned, {sends} sends, {} worker(s) failed",
        summary.elapsed.as_secs_f64(),
        summary.failed()
    );
    Ok(())
}
