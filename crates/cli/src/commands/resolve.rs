use std::{path::PathBuf, time::Duration};

use tpsbench_core::{
    provider::RetryingProvider, resolver::BlockResolver, rpc::WsConnector, CancellationToken,
};
use tpsbench_report::{inclusion::write_csv, log_parser::accepted_sends_in_files, reconcile};
use tracing::{info, warn};

use super::ChainCliArgs;
use crate::error::CliError;

#[derive(Debug, clap::Args)]
pub struct ResolveCliArgs {
    #[command(flatten)]
    pub chain: ChainCliArgs,

    /// Logs written by `tpsbench spam --log-file`.
    #[arg(required = true, value_name = "LOG")]
    pub logs: Vec<PathBuf>,

    /// Also export the rows as CSV.
    #[arg(long, value_name = "PATH")]
    pub csv: Option<PathBuf>,

    /// Stop looking for blocks after this many seconds.
    #[arg(long, value_name = "SECS")]
    pub deadline: Option<u64>,
}

pub async fn resolve(args: ResolveCliArgs, cancel: CancellationToken) -> Result<(), CliError> {
    let network = args.chain.network()?;
    let sends = accepted_sends_in_files(&args.logs)?;
    if sends.is_empty() {
        warn!("no accepted transactions in {:?}", args.logs);
        return Ok(());
    }
    info!("resolving {} accepted transactions", sends.len());

    let hashes = sends.iter().map(|s| s.hash).collect::<Vec<_>>();
    let mut resolver =
        BlockResolver::new(WsConnector::new(network.ws_rpc_url.as_str())).with_cancel(cancel.clone());
    if let Some(secs) = args.deadline {
        resolver = resolver.with_deadline(Duration::from_secs(secs));
    }
    let record = resolver.resolve(&hashes).await?;

    let provider = RetryingProvider::new(&network.http_rpc_url, cancel)?;
    let rows = reconcile(&sends, &record, &provider).await?;
    for row in &rows {
        println!("{row}");
    }
    if let Some(path) = &args.csv {
        write_csv(&rows, path)?;
    }
    Ok(())
}
