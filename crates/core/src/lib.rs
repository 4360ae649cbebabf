pub mod agent_controller;
pub mod error;
pub mod orchestrator;
pub mod prepare;
pub mod provider;
pub mod resolver;
pub mod retry;
pub mod rpc;
pub mod spammer;
pub mod util;

pub use error::Error;
pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, Error>;
