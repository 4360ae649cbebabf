use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::{error::Error, Result};

/// A duplex, message-oriented connection carrying JSON text frames.
#[async_trait]
pub trait RpcTransport: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next inbound text frame. `None` once the remote side has closed the connection.
    async fn next_text(&mut self) -> Option<Result<String>>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens fresh transports to one endpoint. Owners call this again after a
/// connection drops.
#[async_trait]
pub trait Connect: Send + Sync {
    type Transport: RpcTransport + 'static;

    async fn connect(&self) -> Result<Self::Transport>;

    fn endpoint(&self) -> String;
}

pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl RpcTransport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| Error::Send(e.to_string()))
    }

    async fn next_text(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => {
                        return Some(Err(Error::MalformedResponse(
                            "binary frame is not valid utf-8".to_owned(),
                        )))
                    }
                },
                Ok(Message::Close(frame)) => {
                    debug!("remote closed websocket: {frame:?}");
                    return None;
                }
                // ping/pong are answered by tungstenite itself
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await.map_err(Into::into)
    }
}

#[derive(Clone, Debug)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connect for WsConnector {
    type Transport = WsTransport;

    async fn connect(&self) -> Result<WsTransport> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::Connection(format!("ws connect to {} failed: {e}", self.url)))?;
        Ok(WsTransport { stream })
    }

    fn endpoint(&self) -> String {
        self.url.to_owned()
    }
}
