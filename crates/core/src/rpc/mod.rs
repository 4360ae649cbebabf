//! Correlated JSON-RPC over a single long-lived connection.

mod channel;
pub mod mock;
mod transport;

pub use channel::{CorrelationChannel, MatchedResponse, PendingRequest, RequestId, RpcFailure};
pub use transport::{Connect, RpcTransport, WsConnector, WsTransport};
