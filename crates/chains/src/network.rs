use std::collections::BTreeMap;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::{Error, Result};

/// Contracts and tokens the swap workload needs on every network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, AsRefStr, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum AddressKey {
    PancakeSmartRouter,
    Cake,
    Weth,
}

/// Defines the TOML schema of one `[networks.<name>]` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkData {
    pub chain_id: u64,
    pub http_rpc_url: String,
    pub ws_rpc_url: String,
    /// Keyed by the snake_case name of an [`AddressKey`]; extra entries are kept.
    #[serde(default)]
    pub addresses: BTreeMap<String, String>,
    /// Set once resolved by a registry.
    #[serde(skip)]
    pub name: String,
}

impl NetworkData {
    pub fn address(&self, key: AddressKey) -> Result<Address> {
        let value = self
            .addresses
            .get(key.as_ref())
            .ok_or_else(|| Error::MissingAddress {
                network: self.name.to_owned(),
                key: key.to_string(),
            })?;
        value.parse().map_err(|_| Error::InvalidAddress {
            network: self.name.to_owned(),
            key: key.to_string(),
            value: value.to_owned(),
        })
    }
}
