use std::path::PathBuf;

use alloy::primitives::{utils::parse_ether, U256};
use tpsbench_chains::{ChainRegistry, NetworkData};
use tracing::debug;

use super::ArgsError;
use crate::error::CliError;

/// Selects the network every subcommand talks to.
#[derive(Clone, Debug, clap::Args)]
pub struct ChainCliArgs {
    /// Name of a built-in network or of one defined in `--chains-file`.
    #[arg(long, default_value = "zksync-era")]
    pub chain: String,

    /// TOML file adding or overriding `[networks.<name>]` entries.
    #[arg(long, value_name = "PATH")]
    pub chains_file: Option<PathBuf>,

    #[arg(long, env = "DRPC_API_KEY", hide_env_values = true)]
    pub drpc_api_key: Option<String>,
}

impl ChainCliArgs {
    pub fn network(&self) -> Result<NetworkData, CliError> {
        let mut registry = ChainRegistry::builtin(self.drpc_api_key.clone());
        if let Some(path) = &self.chains_file {
            registry = registry.with_file(path)?;
        }
        let network = registry.get(&self.chain)?;
        debug!(
            "using network {} (chain id {}) at {}",
            network.name, network.chain_id, network.ws_rpc_url
        );
        Ok(network)
    }
}

/// Parses a decimal ETH amount given to `flag` into wei.
pub fn parse_eth_amount(flag: &'static str, value: &str) -> Result<U256, ArgsError> {
    parse_ether(value).map_err(|source| ArgsError::InvalidAmount {
        flag,
        value: value.to_owned(),
        source,
    })
}
