mod commands;
mod error;
mod util;

use commands::{TpsbenchCli, TpsbenchSubcommand};
use error::CliError;
use tpsbench_core::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> miette::Result<()> {
    let args = TpsbenchCli::parse_args();
    util::init_tracing(args.log_file.as_deref())?;
    let cancel = util::cancel_on_ctrl_c();

    match run(args.command, cancel.clone()).await {
        Err(e) if cancel.is_cancelled() && e.is_cancelled() => {
            info!("interrupted, nothing left to do");
            Ok(())
        }
        res => Ok(res?),
    }
}

async fn run(command: TpsbenchSubcommand, cancel: CancellationToken) -> Result<(), CliError> {
    match command {
        TpsbenchSubcommand::Spam { args } => commands::spam(*args, cancel).await,
        TpsbenchSubcommand::Fund { args } => commands::fund(*args, cancel).await,
        TpsbenchSubcommand::Prepare { args } => commands::prepare(*args, cancel).await,
        TpsbenchSubcommand::Resolve { args } => commands::resolve(*args, cancel).await,
        TpsbenchSubcommand::Tps { file } => commands::tps(&file),
    }
}
