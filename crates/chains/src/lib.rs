mod error;
mod network;
mod registry;

pub use error::Error;
pub use network::{AddressKey, NetworkData};
pub use registry::{BuiltinChain, ChainRegistry, DRPC_KEY_PLACEHOLDER};

pub type Result<T> = std::result::Result<T, Error>;
