use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown network '{name}' (known: {known})")]
    UnknownNetwork { name: String, known: String },

    #[error("network '{network}' has no '{key}' address")]
    MissingAddress { network: String, key: String },

    #[error("network '{network}' has an invalid '{key}' address: {value}")]
    InvalidAddress {
        network: String,
        key: String,
        value: String,
    },

    #[error("network '{0}' is hosted on DRPC; set DRPC_API_KEY")]
    MissingApiKey(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
