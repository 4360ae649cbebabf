mod common;
mod error;
pub mod fund;
pub mod prepare;
pub mod resolve;
pub mod spam;
mod tpsbench_subcommand;
pub mod tps;

use std::path::PathBuf;

use clap::Parser;

pub use common::{parse_eth_amount, ChainCliArgs};
pub use error::ArgsError;
pub use fund::fund;
pub use prepare::prepare;
pub use resolve::resolve;
pub use spam::spam;
pub use tps::tps;
pub use tpsbench_subcommand::TpsbenchSubcommand;

#[derive(Parser, Debug)]
#[command(name = "tpsbench", version, about = "Measure the transaction throughput of an EVM chain")]
pub struct TpsbenchCli {
    #[command(subcommand)]
    pub command: TpsbenchSubcommand,

    /// Also write logs to this file (appended, without colors).
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl TpsbenchCli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        TpsbenchCli::command().debug_assert();
    }

    #[test]
    fn spam_defaults_match_a_ten_account_process() {
        let cli = TpsbenchCli::try_parse_from(["tpsbench", "spam", "-n", "3"]).unwrap();
        let TpsbenchSubcommand::Spam { args } = cli.command else {
            panic!("expected spam");
        };
        assert_eq!(args.index, 3);
        assert_eq!(args.workers, 10);
        assert_eq!(args.txs_per_account, 20);
        assert_eq!(args.chain.chain, "zksync-era");
        assert!(!args.no_schedule);
    }

    #[test]
    fn log_file_is_accepted_after_the_subcommand() {
        let cli = TpsbenchCli::try_parse_from([
            "tpsbench",
            "tps",
            "inclusions.csv",
            "--log-file",
            "tps.log",
        ])
        .unwrap();
        assert_eq!(cli.log_file, Some(PathBuf::from("tps.log")));
    }

    #[test]
    fn prepare_wraps_and_approves_by_default() {
        let cli = TpsbenchCli::try_parse_from(["tpsbench", "prepare", "--accounts", "20"]).unwrap();
        let TpsbenchSubcommand::Prepare { args } = cli.command else {
            panic!("expected prepare");
        };
        assert_eq!(args.accounts, 20);
        assert!(!args.check_only);
        assert_eq!(
            parse_eth_amount("--wrap-eth", &args.wrap_eth).unwrap(),
            alloy::primitives::U256::from(tpsbench_core::prepare::DEFAULT_WRAP_WEI)
        );
    }

    #[test]
    fn bad_amount_names_its_flag() {
        let err = parse_eth_amount("--approve-eth", "lots").unwrap_err();
        assert!(err.to_string().contains("--approve-eth"), "{err}");
    }

    #[test]
    fn resolve_needs_a_log_file() {
        assert!(TpsbenchCli::try_parse_from(["tpsbench", "resolve"]).is_err());
    }
}
