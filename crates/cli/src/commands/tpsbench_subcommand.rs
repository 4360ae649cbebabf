use clap::Subcommand;
use std::path::PathBuf;

use super::{
    fund::FundCliArgs, prepare::PrepareCliArgs, resolve::ResolveCliArgs, spam::SpamCliArgs,
};

#[derive(Debug, Subcommand)]
pub enum TpsbenchSubcommand {
    #[command(
        name = "spam",
        long_about = "Pre-sign swaps for this process's accounts, wait for the next 5-minute mark and push them all over websockets."
    )]
    Spam {
        #[command(flatten)]
        args: Box<SpamCliArgs>,
    },

    #[command(
        name = "fund",
        long_about = "Send ETH from PRIVATE_KEY to the mnemonic accounts and wait for the last transfer to be mined."
    )]
    Fund {
        #[command(flatten)]
        args: Box<FundCliArgs>,
    },

    #[command(
        name = "prepare",
        long_about = "Wrap ETH into WETH and approve the swap router for each mnemonic account, then report which accounts are ready to swap."
    )]
    Prepare {
        #[command(flatten)]
        args: Box<PrepareCliArgs>,
    },

    #[command(
        name = "resolve",
        long_about = "Find the blocks that included the accepted transactions of one or more spam logs."
    )]
    Resolve {
        #[command(flatten)]
        args: Box<ResolveCliArgs>,
    },

    #[command(name = "tps", long_about = "Compute throughput from resolved inclusions.")]
    Tps {
        /// Output of `resolve`, either its printed rows or its CSV export.
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}
