use std::{collections::BTreeMap, fs::read_to_string, path::Path};

use serde::Deserialize;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::{network::NetworkData, Error, Result};

/// Replaced with the DRPC API key when a network is looked up.
pub const DRPC_KEY_PLACEHOLDER: &str = "{DRPC_API_KEY}";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum BuiltinChain {
    Optimism,
    PolygonZkevm,
    ZksyncEra,
}

impl BuiltinChain {
    pub fn network(&self) -> NetworkData {
        let (chain_id, http, ws, [router, cake, weth]) = match self {
            BuiltinChain::Optimism => (
                10,
                "https://lb.drpc.org/ogrpc?network=optimism&dkey={DRPC_API_KEY}",
                "wss://lb.drpc.org/ogws?network=optimism&dkey={DRPC_API_KEY}",
                [
                    "0x4A7b5Da61326A6379179b40d00F57E5bbDC962c2",
                    "0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85",
                    "0x4200000000000000000000000000000000000006",
                ],
            ),
            BuiltinChain::PolygonZkevm => (
                1101,
                "https://lb.drpc.org/ogrpc?network=polygon-zkevm&dkey={DRPC_API_KEY}",
                "wss://lb.drpc.org/ogws?network=polygon-zkevm&dkey={DRPC_API_KEY}",
                [
                    "0x678Aa4bF4E210cf2166753e054d5b7c31cc7fa86",
                    "0x0D1E753a25eBda689453309112904807625bEFBe",
                    "0x4F9A0e7FD2Bf6067db6994CF12E4495Df938E6e9",
                ],
            ),
            BuiltinChain::ZksyncEra => (
                324,
                "https://mainnet.era.zksync.io",
                "wss://mainnet.era.zksync.io/ws",
                [
                    "0xf8b59f3c3Ab33200ec80a8A58b2aA5F5D2a8944C",
                    "0x3A287a06c66f9E95a56327185cA2BDF5f031cEcD",
                    "0x5AEa5775959fBC2557Cc8789bC1bf90A239D9a91",
                ],
            ),
        };
        NetworkData {
            chain_id,
            http_rpc_url: http.to_owned(),
            ws_rpc_url: ws.to_owned(),
            addresses: [
                ("pancake_smart_router", router),
                ("cake", cake),
                ("weth", weth),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect(),
            name: self.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct NetworksFile {
    #[serde(default)]
    networks: BTreeMap<String, NetworkData>,
}

/// Named networks: the built-in table, optionally extended or overridden by
/// TOML files.
///
/// ```toml
/// [networks.local]
/// chain_id = 31337
/// http_rpc_url = "http://localhost:8545"
/// ws_rpc_url = "ws://localhost:8545"
///
/// [networks.local.addresses]
/// pancake_smart_router = "0x..."
/// ```
#[derive(Clone, Debug)]
pub struct ChainRegistry {
    networks: BTreeMap<String, NetworkData>,
    drpc_key: Option<String>,
}

impl ChainRegistry {
    pub fn builtin(drpc_key: Option<String>) -> Self {
        Self {
            networks: BuiltinChain::iter()
                .map(|c| (c.to_string(), c.network()))
                .collect(),
            drpc_key: drpc_key.filter(|k| !k.is_empty()),
        }
    }

    pub fn with_file(self, path: impl AsRef<Path>) -> Result<Self> {
        let contents = read_to_string(path)?;
        self.with_toml(&contents)
    }

    /// Networks defined in `contents` replace built-in ones of the same name.
    pub fn with_toml(mut self, contents: &str) -> Result<Self> {
        let file: NetworksFile = toml::from_str(contents)?;
        self.networks.extend(file.networks);
        Ok(self)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.networks.keys().map(String::as_str)
    }

    /// Looks up `name` with endpoint placeholders filled in.
    pub fn get(&self, name: &str) -> Result<NetworkData> {
        let mut network = self
            .networks
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownNetwork {
                name: name.to_owned(),
                known: self.names().collect::<Vec<_>>().join(", "),
            })?;
        network.name = name.to_owned();
        for url in [&mut network.http_rpc_url, &mut network.ws_rpc_url] {
            if !url.contains(DRPC_KEY_PLACEHOLDER) {
                continue;
            }
            let key = self
                .drpc_key
                .as_deref()
                .ok_or_else(|| Error::MissingApiKey(name.to_owned()))?;
            *url = url.replace(DRPC_KEY_PLACEHOLDER, key);
        }
        Ok(network)
    }
}
